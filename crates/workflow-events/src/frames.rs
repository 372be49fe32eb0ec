// workflow-events/src/frames.rs
// ============================================================================
// Module: Subscriber Frame Protocol
// Description: Inbound/outbound control frames for WebSocket-style
// subscriber transports.
// Purpose: Parse client subscribe/unsubscribe/ping frames and apply them to
// an EventRegistry; invalid frames are dropped silently.
// Dependencies: serde, serde_json, workflow-core::time, crate::registry
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use workflow_core::time::Timestamp;

use crate::registry::EventRegistry;

/// A control frame sent by a subscriber transport.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Join a channel.
    Subscribe {
        /// Channel to join.
        channel: String,
    },
    /// Leave a channel.
    Unsubscribe {
        /// Channel to leave.
        channel: String,
    },
    /// Liveness check.
    Ping,
}

/// A control frame sent back to a subscriber transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Acknowledges a `subscribe` frame.
    Subscribed {
        /// The channel now joined.
        channel: String,
    },
    /// Acknowledges an `unsubscribe` frame.
    Unsubscribed {
        /// The channel now left.
        channel: String,
    },
    /// Acknowledges a `ping` frame.
    Pong {
        /// Server time the pong was produced.
        timestamp: Timestamp,
    },
}

/// Parses a raw inbound frame. Invalid or non-JSON input yields `None`,
/// which callers must drop silently rather than surface as an error.
#[must_use]
pub fn parse_client_frame(raw: &str) -> Option<ClientFrame> {
    serde_json::from_str(raw).ok()
}

/// Applies a parsed client frame to the registry on behalf of
/// `subscriber_id`, returning the server frame to send back.
pub fn apply_client_frame(registry: &EventRegistry, subscriber_id: &str, frame: &ClientFrame) -> ServerFrame {
    match frame {
        ClientFrame::Subscribe { channel } => {
            registry.subscribe(subscriber_id, channel);
            ServerFrame::Subscribed { channel: channel.clone() }
        }
        ClientFrame::Unsubscribe { channel } => {
            registry.unsubscribe(subscriber_id, channel);
            ServerFrame::Unsubscribed { channel: channel.clone() }
        }
        ClientFrame::Ping => ServerFrame::Pong { timestamp: Timestamp::now() },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]
mod tests {
    use super::*;

    #[test]
    fn parses_subscribe_frame() {
        let frame = parse_client_frame(r#"{"type":"subscribe","channel":"run:1"}"#).unwrap();
        assert_eq!(frame, ClientFrame::Subscribe { channel: "run:1".to_string() });
    }

    #[test]
    fn invalid_json_yields_none() {
        assert!(parse_client_frame("not json").is_none());
    }

    #[test]
    fn unknown_type_yields_none() {
        assert!(parse_client_frame(r#"{"type":"explode"}"#).is_none());
    }

    #[test]
    fn ping_round_trips_to_pong() {
        let registry = EventRegistry::new();
        let reply = apply_client_frame(&registry, "sub-1", &ClientFrame::Ping);
        assert!(matches!(reply, ServerFrame::Pong { .. }));
    }
}
