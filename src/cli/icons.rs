//! Status glyphs for `reels` console output.

use std::fmt;

use console::style;

/// A status glyph printed at the start of a console line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Icon {
    Success,
    Info,
    Warn,
    Error,
    Step,
    Bullet,
}

impl Icon {
    fn glyph(self) -> &'static str {
        match self {
            Icon::Success => "✓",
            Icon::Info | Icon::Step => "→",
            Icon::Warn => "!",
            Icon::Error => "✗",
            Icon::Bullet => "•",
        }
    }
}

impl fmt::Display for Icon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let styled = match self {
            Icon::Success => style(self.glyph()).green(),
            Icon::Info => style(self.glyph()).cyan(),
            Icon::Warn => style(self.glyph()).yellow(),
            Icon::Error => style(self.glyph()).red(),
            Icon::Step | Icon::Bullet => style(self.glyph()).dim(),
        };
        write!(f, "{}", styled)
    }
}

pub fn success() -> Icon {
    Icon::Success
}

pub fn info() -> Icon {
    Icon::Info
}

pub fn warn() -> Icon {
    Icon::Warn
}

pub fn error() -> Icon {
    Icon::Error
}

/// Secondary detail under a status line.
pub fn dim_arrow() -> Icon {
    Icon::Step
}

pub fn bullet() -> Icon {
    Icon::Bullet
}
