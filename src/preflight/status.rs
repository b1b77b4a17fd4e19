//! Preflight status reporting.
//!
//! Status updates are UI feedback only; nothing in the preflight reads them
//! back for control flow.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::info;

/// Receives human-readable status text and 0-100 progress percentages.
pub trait StatusSink: Send + Sync {
    /// A new status message.
    fn status(&self, message: &str);

    /// Overall progress, 0 to 100.
    fn progress(&self, percent: u8);
}

/// Sink that writes updates to the tracing log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl StatusSink for TracingSink {
    fn status(&self, message: &str) {
        info!("{message}");
    }

    fn progress(&self, percent: u8) {
        info!("Preflight progress: {percent}%");
    }
}

/// Updates published by a [`ChannelSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    /// Status text changed.
    Message {
        /// Human-readable status.
        text: String,
        /// When the update was emitted.
        at: DateTime<Utc>,
    },

    /// Progress changed.
    Progress {
        /// Percentage, 0 to 100.
        percent: u8,
        /// When the update was emitted.
        at: DateTime<Utc>,
    },
}

/// Channel for receiving status updates.
pub type StatusReceiver = broadcast::Receiver<StatusUpdate>;

/// Sender for status updates.
pub type StatusSender = broadcast::Sender<StatusUpdate>;

/// Create a new status channel pair.
#[must_use]
pub fn create_status_channel() -> (StatusSender, StatusReceiver) {
    broadcast::channel(64)
}

/// Sink that publishes every update on a broadcast channel.
///
/// Sending never blocks; with no subscribers left, updates are dropped.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: StatusSender,
}

impl ChannelSink {
    /// Wrap an existing sender.
    #[must_use]
    pub fn new(sender: StatusSender) -> Self {
        Self { sender }
    }

    /// Subscribe another receiver.
    #[must_use]
    pub fn subscribe(&self) -> StatusReceiver {
        self.sender.subscribe()
    }
}

impl StatusSink for ChannelSink {
    fn status(&self, message: &str) {
        let _ = self.sender.send(StatusUpdate::Message {
            text: message.to_string(),
            at: Utc::now(),
        });
    }

    fn progress(&self, percent: u8) {
        let _ = self.sender.send(StatusUpdate::Progress {
            percent: percent.min(100),
            at: Utc::now(),
        });
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sink_publishes_in_order() {
        let (tx, mut rx) = create_status_channel();
        let sink = ChannelSink::new(tx);

        sink.status("checking");
        sink.progress(150);

        match rx.recv().await.expect("message") {
            StatusUpdate::Message { text, .. } => assert_eq!(text, "checking"),
            other => panic!("unexpected update: {other:?}"),
        }
        match rx.recv().await.expect("progress") {
            StatusUpdate::Progress { percent, .. } => assert_eq!(percent, 100),
            other => panic!("unexpected update: {other:?}"),
        }
    }

    #[test]
    fn test_channel_sink_without_subscribers() {
        let (tx, rx) = create_status_channel();
        drop(rx);
        let sink = ChannelSink::new(tx);
        sink.status("nobody listening");
        let mut late = sink.subscribe();
        assert!(late.try_recv().is_err());
    }
}
