// workflow-server/src/subscriber.rs
// ============================================================================
// Module: Channel Subscriber
// Description: The one `Subscriber` impl shared by the SSE and WebSocket-
//              style framed transports.
// Purpose: Adapt `workflow_events::EventRegistry`'s fan-out to an
//          `mpsc::UnboundedSender<String>`, so either transport just drains
//          its own receiver.
// Dependencies: tokio::sync::mpsc, workflow-events::Subscriber
// ============================================================================

use tokio::sync::mpsc::UnboundedSender;
use workflow_events::Subscriber;

/// A registry subscriber backed by an unbounded channel. `send` never
/// blocks: a full or closed receiver just drops the frame, matching the
/// registry's best-effort broadcast contract.
pub struct ChannelSubscriber {
    id: String,
    sender: UnboundedSender<String>,
}

impl ChannelSubscriber {
    /// Builds a new subscriber with the given id, paired with `sender`.
    #[must_use]
    pub const fn new(id: String, sender: UnboundedSender<String>) -> Self {
        Self { id, sender }
    }
}

impl Subscriber for ChannelSubscriber {
    fn id(&self) -> &str {
        &self.id
    }

    fn send(&self, frame: &str) {
        let _ = self.sender.send(frame.to_string());
    }

    fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    #[test]
    fn send_delivers_to_receiver() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscriber = ChannelSubscriber::new("sub-1".to_string(), tx);
        subscriber.send("hello");
        assert_eq!(rx.try_recv().unwrap(), "hello");
    }

    #[test]
    fn is_open_reflects_receiver_state() {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscriber = ChannelSubscriber::new("sub-1".to_string(), tx);
        assert!(subscriber.is_open());
        drop(rx);
        subscriber.send("dropped");
        assert!(!subscriber.is_open());
    }
}
