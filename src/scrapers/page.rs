//! Feed page abstraction used by the capture loop.
//!
//! The capture loop only needs four things from a browser tab: navigate,
//! scroll, a stream of finished responses and a way to read a body. Keeping
//! that behind a trait lets the loop run against an in-memory page in tests.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors surfaced by a feed page.
#[derive(Debug, Error)]
pub enum PageError {
    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("Failed to read response body: {0}")]
    Body(String),
}

/// A network response that finished loading while the page was open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptedResponse {
    pub url: String,
    pub status: u16,
    /// Opaque handle passed back to [`FeedPage::response_body`].
    pub request_id: String,
}

/// A scrollable page whose network responses can be observed.
#[async_trait]
pub trait FeedPage: Send + Sync + 'static {
    /// Start observing responses. Must be called before `navigate` so the
    /// first page of results is not missed.
    async fn subscribe(&self) -> Result<mpsc::Receiver<InterceptedResponse>, PageError>;

    /// Navigate to `url` and wait for the document to load.
    async fn navigate(&self, url: &str) -> Result<(), PageError>;

    /// Scroll the document to the bottom to trigger the next page fetch.
    async fn scroll_to_bottom(&self) -> Result<(), PageError>;

    /// Read the body of a previously observed response as text.
    async fn response_body(&self, request_id: &str) -> Result<String, PageError>;

    /// Close the page. Errors are ignored.
    async fn close(&self);
}
