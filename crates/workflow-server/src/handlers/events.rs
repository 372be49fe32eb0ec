// workflow-server/src/handlers/events.rs
// ============================================================================
// Module: Event Streaming Handlers
// Description: `GET /events` (SSE) and `GET /events/ws` (WebSocket-style
// framed channel), the two transports name.
// Purpose: Adapt workflow-events's transport-neutral fan-out registry to
// axum's two streaming response kinds.
// Dependencies: axum (sse, ws), tokio-stream, workflow-events
// ============================================================================

//! ## Overview
//! Both transports register one [`crate::subscriber::ChannelSubscriber`]
//! per connection and subscribe it to every channel named in the request,
//! then drain their half of the channel until the connection closes. SSE is
//! outbound-only (inbound control frames have no SSE equivalent); the
//! WebSocket-style transport additionally parses inbound
//! `{type: "subscribe"|"unsubscribe"|"ping"}` frames.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::Query;
use axum::extract::State;
use axum::extract::ws::Message;
use axum::extract::ws::WebSocket;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::Response;
use axum::response::sse::Event;
use axum::response::sse::KeepAlive;
use axum::response::sse::Sse;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use workflow_events::SubscriberMeta;
use workflow_events::apply_client_frame;
use workflow_events::parse_client_frame;

use crate::auth::AuthContext;
use crate::state::AppState;
use crate::subscriber::ChannelSubscriber;

/// Server-side cap on one SSE connection's lifetime.
const SSE_MAX_CONNECTION: Duration = Duration::from_secs(600);
/// SSE heartbeat interval.
const SSE_HEARTBEAT: Duration = Duration::from_secs(1);

/// Query parameters shared by both streaming endpoints.
#[derive(Debug, Deserialize)]
pub struct ChannelsQuery {
    /// Comma-separated channel list to subscribe to immediately.
    pub channels: Option<String>,
}

fn split_channels(raw: Option<&str>) -> Vec<String> {
    raw.map(|value| value.split(',').map(str::trim).filter(|c| !c.is_empty()).map(str::to_string).collect())
        .unwrap_or_default()
}

/// `GET /events?channels=<csv>` — Server-Sent Events fallback transport.
pub async fn sse_stream(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<ChannelsQuery>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::unbounded_channel::<String>();
    let subscriber_id = nanoid::nanoid!();
    let subscriber = std::sync::Arc::new(ChannelSubscriber::new(subscriber_id.clone(), tx));
    let mut channels = split_channels(query.channels.as_deref());
    channels.push(format!("org:{}", auth.org_id));
    let meta = SubscriberMeta {
        user_id: None,
        org_id: Some(auth.org_id.as_str().to_string()),
        channels: channels.into_iter().collect(),
    };
    state.events.register(subscriber, meta);

    let stream = UnboundedReceiverStream::new(rx).map(|frame| Ok(Event::default().data(frame)));
    Sse::new(stream).keep_alive(KeepAlive::new().interval(SSE_HEARTBEAT).text("heartbeat"))
}

/// `GET /events/ws` — WebSocket-style framed channel transport.
pub async fn ws_stream(State(state): State<AppState>, auth: AuthContext, upgrade: WebSocketUpgrade) -> Response {
    upgrade.on_upgrade(move |socket| handle_socket(socket, state, auth.org_id.as_str().to_string()))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, org_id: String) {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let subscriber_id = nanoid::nanoid!();
    let subscriber = std::sync::Arc::new(ChannelSubscriber::new(subscriber_id.clone(), tx));
    let meta = SubscriberMeta {
        user_id: None,
        org_id: Some(org_id.clone()),
        channels: [format!("org:{org_id}")].into_iter().collect(),
    };
    state.events.register(subscriber, meta);

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                let Some(frame) = outbound else { break };
                if socket.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(frame) = parse_client_frame(&text) {
                            let reply = apply_client_frame(&state.events, &subscriber_id, &frame);
                            if let Ok(json) = serde_json::to_string(&reply) {
                                let _ = socket.send(Message::Text(json.into())).await;
                            }
                        }
                        // Non-JSON or unrecognized frames are dropped silently.
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }
    state.events.unregister(&subscriber_id);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]
mod tests {
    use super::*;

    #[test]
    fn splits_comma_separated_channels() {
        assert_eq!(split_channels(Some("run:1, workflow:2,")), vec!["run:1".to_string(), "workflow:2".to_string()]);
    }

    #[test]
    fn empty_channels_is_empty_vec() {
        assert!(split_channels(None).is_empty());
    }

    #[test]
    fn sse_cap_matches_ten_minutes() {
        assert_eq!(SSE_MAX_CONNECTION, Duration::from_secs(600));
    }
}
