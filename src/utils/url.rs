//! Reel URL helpers: scheme normalization, host checks, id extraction.

/// Canonical (scheme-less) reel link for a shortcode, as written to the CSV.
pub fn reel_url(code: &str) -> String {
    format!("instagram.com/reel/{}/", code)
}

/// Prefix `https://` unless the URL already carries an http(s) scheme.
pub fn ensure_scheme(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

/// Check whether the URL's host is `domain` or one of its subdomains.
///
/// Unparseable URLs never match.
pub fn host_matches(raw: &str, domain: &str) -> bool {
    url::Url::parse(raw)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
        .is_some_and(|host| host == domain || host.ends_with(&format!(".{}", domain)))
}

/// Last non-empty path segment of a URL, used as the reel identifier.
///
/// `https://instagram.com/reel/abc123/` and `.../reel/abc123` both give `abc123`.
pub fn reel_id_from_url(raw: &str) -> Option<String> {
    let without_query = raw.split(['?', '#']).next().unwrap_or(raw);
    without_query
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty() && !segment.contains(':'))
        .map(|segment| segment.to_string())
}
