//! Notification delivery for switchwatch.
//!
//! # Architecture
//!
//! - [`Notifier`] - the one call the rest of the system needs: deliver a text once
//! - [`slack`] - Slack `chat.postMessage` implementation
//!
//! # Delivery semantics
//!
//! Every send is a single attempt. There is no retry, no queueing, and no
//! backoff in this crate; callers log the returned [`NotifyError`] and move on.
//! The HTTP client carries a total request timeout so one slow endpoint cannot
//! hold a caller for longer than the configured bound.

pub mod slack;

pub use slack::SlackNotifier;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::redirect::Policy;

pub use switchwatch_types;

const CONNECT_TIMEOUT_SECS: u64 = 5;

const POOL_IDLE_TIMEOUT_SECS: u64 = 90;

const MAX_ERROR_BODY_BYTES: usize = 4 * 1024;

/// Notification future type alias.
pub type NotifyFut<'a> = Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + 'a>>;

/// A best-effort, single-attempt message sink.
pub trait Notifier: Send + Sync {
    /// Short name used in log fields.
    fn name(&self) -> &'static str;

    fn send<'a>(&'a self, text: &'a str) -> NotifyFut<'a>;
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("delivery timed out")]
    Timeout,
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },
    #[error("API rejected message: {0}")]
    Rejected(String),
    #[error("unreadable API response: {0}")]
    Decode(String),
}

impl NotifyError {
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            NotifyError::Timeout
        } else {
            NotifyError::Transport(err)
        }
    }
}

/// Build a client whose every request is bounded by `timeout`.
pub fn http_client_with_timeout(timeout: Duration) -> Result<reqwest::Client, NotifyError> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS).min(timeout))
        .timeout(timeout)
        .redirect(Policy::none())
        .pool_idle_timeout(Some(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS)))
        .user_agent(concat!("switchwatch/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(NotifyError::Client)
}

/// Truncate an error body on a char boundary so a misbehaving endpoint can't
/// flood the log.
pub(crate) fn truncate_error_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() <= MAX_ERROR_BODY_BYTES {
        return trimmed.to_string();
    }
    let mut end = MAX_ERROR_BODY_BYTES;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &trimmed[..end])
}
