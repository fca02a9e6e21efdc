//! Hand-off between the edge monitor and the notifier.
//!
//! The monitor must never wait on the network, so it pushes messages into a
//! bounded queue with `try_send` and a single dispatcher task drains it. A
//! full queue drops the message with a warning.

use std::sync::Arc;

use switchwatch_providers::Notifier;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

pub const DISPATCH_QUEUE_CAPACITY: usize = 32;

/// Producer side of the notification queue.
#[derive(Debug, Clone)]
pub struct DispatchQueue {
    tx: mpsc::Sender<String>,
}

/// Create a queue and its receiving half for [`run_dispatcher`].
#[must_use]
pub fn dispatch_queue(capacity: usize) -> (DispatchQueue, mpsc::Receiver<String>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (DispatchQueue { tx }, rx)
}

impl DispatchQueue {
    /// Enqueue `text` without waiting. Returns `false` if it was dropped.
    pub fn submit(&self, text: String) -> bool {
        match self.tx.try_send(text) {
            Ok(()) => true,
            Err(TrySendError::Full(text)) => {
                tracing::warn!(message = %text, "Notification queue full; dropping message");
                false
            }
            Err(TrySendError::Closed(text)) => {
                tracing::warn!(message = %text, "Notification dispatcher stopped; dropping message");
                false
            }
        }
    }
}

/// Deliver queued messages one at a time until the queue closes or `cancel`
/// fires. An in-flight send is abandoned on cancellation.
pub async fn run_dispatcher(
    notifier: Arc<dyn Notifier>,
    mut rx: mpsc::Receiver<String>,
    cancel: CancellationToken,
) {
    tracing::debug!(notifier = notifier.name(), "Dispatcher started");
    loop {
        let text = tokio::select! {
            () = cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some(text) => text,
                None => break,
            },
        };

        tokio::select! {
            () = cancel.cancelled() => {
                tracing::debug!("Shutdown during delivery; abandoning message");
                break;
            }
            () = deliver(notifier.as_ref(), &text) => {}
        }
    }
    tracing::debug!("Dispatcher stopped");
}

async fn deliver(notifier: &dyn Notifier, text: &str) {
    match notifier.send(text).await {
        Ok(()) => tracing::debug!(notifier = notifier.name(), "Notification sent"),
        Err(e) => tracing::warn!(
            notifier = notifier.name(),
            error = %e,
            "Failed to send notification"
        ),
    }
}
