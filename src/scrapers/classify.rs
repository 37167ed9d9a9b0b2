//! Response classification for intercepted network traffic.
//!
//! Pure string matching against a fixed allow-list; no I/O happens here so
//! every rule can be checked against literal URLs.

/// Marker present in every paginated GraphQL feed request.
const GRAPHQL_MARKER: &str = "/graphql";

/// REST endpoint fragment serving the reels-by-audio pages.
const MUSIC_REST_MARKER: &str = "/api/v1/clips/music/";

/// Output bucket of an intercepted response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseClass {
    /// A GraphQL page of the reels connection.
    GraphQlPage,
    /// A page from the music clips REST endpoint.
    MusicRestPage,
    /// Anything else; dropped without side effects.
    Irrelevant,
}

impl ResponseClass {
    /// Whether responses of this class are persisted.
    pub fn is_relevant(self) -> bool {
        !matches!(self, ResponseClass::Irrelevant)
    }

    /// Filename prefix for captured files of this class.
    pub fn file_prefix(self) -> Option<&'static str> {
        match self {
            ResponseClass::GraphQlPage => Some("query"),
            ResponseClass::MusicRestPage => Some("music"),
            ResponseClass::Irrelevant => None,
        }
    }
}

/// Classify a response by URL and HTTP status.
///
/// Only `200` responses are ever relevant.
pub fn classify(url: &str, status: u16) -> ResponseClass {
    if status != 200 {
        return ResponseClass::Irrelevant;
    }

    let path = url.split(['?', '#']).next().unwrap_or(url);
    if path.contains(GRAPHQL_MARKER) {
        ResponseClass::GraphQlPage
    } else if path.contains(MUSIC_REST_MARKER) {
        ResponseClass::MusicRestPage
    } else {
        ResponseClass::Irrelevant
    }
}
