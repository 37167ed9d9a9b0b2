//! Browser-side pieces of the reels pipeline: session handling, the feed
//! page abstraction and response classification.

pub mod browser;
pub mod classify;
pub mod page;

#[cfg(feature = "browser")]
pub use browser::ChromeFeedPage;
pub use browser::{
    BrowserEngineConfig, BrowserEngineType, BrowserSession, Credentials, SessionError,
    SessionState,
};
pub use classify::{classify, ResponseClass};
pub use page::{FeedPage, InterceptedResponse, PageError};
