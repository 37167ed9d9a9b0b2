//! Chrome-backed [`FeedPage`] implementation.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::{
    EventLoadingFailed, EventLoadingFinished, EventResponseReceived, GetResponseBodyParams,
    RequestId,
};
use chromiumoxide::Page;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::debug;

use crate::scrapers::classify::classify;
use crate::scrapers::page::{FeedPage, InterceptedResponse, PageError};

/// Buffer between the CDP event task and the capture loop.
const RESPONSE_CHANNEL_CAPACITY: usize = 256;

const SCROLL_SCRIPT: &str = "window.scrollBy(0, document.body.scrollHeight)";

/// A Chrome tab driven over CDP.
pub struct ChromeFeedPage {
    page: Page,
    nav_timeout: Duration,
}

impl ChromeFeedPage {
    pub(crate) fn new(page: Page, nav_timeout: Duration) -> Self {
        Self { page, nav_timeout }
    }
}

/// Network events reduced to what response tracking needs.
#[derive(Debug, Clone)]
enum NetworkEvent {
    Received {
        request_id: String,
        url: String,
        status: u16,
    },
    Finished(String),
    Failed(String),
}

/// Relevant responses whose body is not readable yet.
#[derive(Debug, Default)]
struct ResponseTracker {
    pending: HashMap<String, (String, u16)>,
}

impl ResponseTracker {
    /// Feed one event; returns a response once its loading has finished.
    fn handle(&mut self, event: NetworkEvent) -> Option<InterceptedResponse> {
        match event {
            NetworkEvent::Received {
                request_id,
                url,
                status,
            } => {
                if classify(&url, status).is_relevant() {
                    self.pending.insert(request_id, (url, status));
                }
                None
            }
            NetworkEvent::Finished(request_id) => {
                let (url, status) = self.pending.remove(&request_id)?;
                Some(InterceptedResponse {
                    url,
                    status,
                    request_id,
                })
            }
            NetworkEvent::Failed(request_id) => {
                self.pending.remove(&request_id);
                None
            }
        }
    }
}

/// Forward finished relevant responses to `tx`.
///
/// Each event kind has its own listener channel, so a response's
/// `responseReceived` and `loadingFinished` can both be queued at once.
/// Received events are always drained first so the finish never overtakes
/// the headers it completes.
async fn forward_responses(
    received: impl Stream<Item = NetworkEvent>,
    finished: impl Stream<Item = NetworkEvent>,
    failed: impl Stream<Item = NetworkEvent>,
    tx: mpsc::Sender<InterceptedResponse>,
) {
    tokio::pin!(received, finished, failed);
    let mut tracker = ResponseTracker::default();

    loop {
        let event = tokio::select! {
            biased;
            Some(event) = received.next() => event,
            Some(event) = finished.next() => event,
            Some(event) = failed.next() => event,
            else => break,
        };
        if let Some(response) = tracker.handle(event) {
            if tx.send(response).await.is_err() {
                break;
            }
        }
    }
    debug!(
        "Response listener stopped ({} responses never finished)",
        tracker.pending.len()
    );
}

#[async_trait]
impl FeedPage for ChromeFeedPage {
    async fn subscribe(&self) -> Result<mpsc::Receiver<InterceptedResponse>, PageError> {
        let mut received = self
            .page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(|e| PageError::Browser(format!("Failed to set up event listener: {}", e)))?;
        let mut finished = self
            .page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(|e| PageError::Browser(format!("Failed to set up event listener: {}", e)))?;
        let mut failed = self
            .page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(|e| PageError::Browser(format!("Failed to set up event listener: {}", e)))?;

        let received = received.map(|event| NetworkEvent::Received {
            request_id: event.request_id.inner().clone(),
            url: event.response.url.clone(),
            status: u16::try_from(event.response.status).unwrap_or(0),
        });
        let finished = finished.map(|event| NetworkEvent::Finished(event.request_id.inner().clone()));
        let failed = failed.map(|event| NetworkEvent::Failed(event.request_id.inner().clone()));

        let (tx, rx) = mpsc::channel(RESPONSE_CHANNEL_CAPACITY);
        tokio::spawn(forward_responses(received, finished, failed, tx));

        Ok(rx)
    }

    async fn navigate(&self, url: &str) -> Result<(), PageError> {
        match tokio::time::timeout(self.nav_timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(PageError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            }),
            Err(_) => Err(PageError::Navigation {
                url: url.to_string(),
                message: format!("timed out after {}s", self.nav_timeout.as_secs()),
            }),
        }
    }

    async fn scroll_to_bottom(&self) -> Result<(), PageError> {
        self.page
            .evaluate(SCROLL_SCRIPT.to_string())
            .await
            .map(|_| ())
            .map_err(|e| PageError::Browser(format!("Scroll failed: {}", e)))
    }

    async fn response_body(&self, request_id: &str) -> Result<String, PageError> {
        let body = self
            .page
            .execute(GetResponseBodyParams::new(RequestId::new(request_id)))
            .await
            .map_err(|e| PageError::Body(e.to_string()))?;

        if body.base64_encoded {
            use base64::Engine;
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(&body.body)
                .map_err(|e| PageError::Body(format!("invalid base64 body: {}", e)))?;
            Ok(String::from_utf8_lossy(&decoded).into_owned())
        } else {
            Ok(body.body.clone())
        }
    }

    async fn close(&self) {
        // Close the page to prevent tab accumulation
        let _ = self.page.clone().close().await;
    }
}
