//! Live dashboard channel over WebSocket.
//!
//! The client sends `{"type":"subscribe","collections":[...]}`; the server
//! answers with an `initial-snapshot` followed by live hub messages. A later
//! subscribe replaces the previous subscription.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use fanout::{ClientMessage, HubMessage, Subscription};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use resource_gateway::ResourceGateway;

use crate::state::AppState;

/// GET /live: upgrades to a WebSocket session.
pub async fn connect<G: ResourceGateway + Clone + 'static>(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState<G>>>,
) -> Response {
    ws.on_upgrade(move |socket| session(socket, state))
}

#[tracing::instrument(skip_all)]
async fn session<G>(socket: WebSocket, state: Arc<AppState<G>>)
where
    G: ResourceGateway + Clone + 'static,
{
    metrics::counter!("live_sessions_total").increment(1);
    let (mut sender, mut receiver) = socket.split();
    let mut subscription: Option<Subscription> = None;

    loop {
        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let reply =
                        handle_client_message(&state, text.as_str(), &mut subscription).await;
                    if let Some(reply) = reply
                        && send(&mut sender, &reply).await.is_err()
                    {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "websocket receive failed");
                    break;
                }
            },
            outgoing = next_hub_message(&mut subscription) => match outgoing {
                Some(message) => {
                    if send(&mut sender, &message).await.is_err() {
                        break;
                    }
                }
                None => {
                    // The hub dropped this observer after a failed delivery.
                    subscription = None;
                    let notice = HubMessage::Error {
                        message: "subscription dropped; subscribe again to resume".to_string(),
                    };
                    if send(&mut sender, &notice).await.is_err() {
                        break;
                    }
                }
            },
        }
    }

    if let Some(sub) = subscription {
        state.hub.unsubscribe(sub.observer_id).await;
    }
    tracing::debug!("live session closed");
}

/// Applies one client message. Returns a message to send back, if any.
async fn handle_client_message<G: ResourceGateway + Clone + 'static>(
    state: &AppState<G>,
    text: &str,
    subscription: &mut Option<Subscription>,
) -> Option<HubMessage> {
    let request = match serde_json::from_str::<ClientMessage>(text) {
        Ok(request) => request,
        Err(e) => {
            return Some(HubMessage::Error {
                message: format!("invalid message: {e}"),
            });
        }
    };

    match request {
        ClientMessage::Subscribe { collections } => match state.hub.subscribe(collections).await {
            Ok(next) => {
                if let Some(previous) = subscription.replace(next) {
                    state.hub.unsubscribe(previous.observer_id).await;
                }
                None
            }
            Err(e) => Some(HubMessage::Error {
                message: e.to_string(),
            }),
        },
    }
}

async fn next_hub_message(subscription: &mut Option<Subscription>) -> Option<Arc<HubMessage>> {
    match subscription {
        Some(sub) => sub.recv().await,
        None => std::future::pending().await,
    }
}

async fn send(sender: &mut SplitSink<WebSocket, Message>, message: &HubMessage) -> Result<(), ()> {
    let text = match serde_json::to_string(message) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(kind = message.kind(), error = %e, "failed to encode hub message");
            return Ok(());
        }
    };
    sender.send(Message::Text(text.into())).await.map_err(|e| {
        tracing::debug!(error = %e, "websocket send failed");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::state::create_default_state;
    use resource_gateway::InMemoryResourceGateway;

    fn state() -> Arc<AppState<InMemoryResourceGateway>> {
        create_default_state(InMemoryResourceGateway::new(), &Config::default())
    }

    #[tokio::test]
    async fn test_subscribe_delivers_initial_snapshot() {
        let state = state();
        let mut subscription = None;

        let reply = handle_client_message(
            &state,
            r#"{"type":"subscribe","collections":["lodging_bookings"]}"#,
            &mut subscription,
        )
        .await;

        assert!(reply.is_none());
        let sub = subscription.as_mut().unwrap();
        assert_eq!(sub.collections, vec!["lodging_bookings".to_string()]);
        let first = sub.try_recv().unwrap();
        assert_eq!(first.kind(), "initial-snapshot");
    }

    #[tokio::test]
    async fn test_resubscribe_replaces_previous_observer() {
        let state = state();
        let mut subscription = None;

        handle_client_message(&state, r#"{"type":"subscribe"}"#, &mut subscription).await;
        let first = subscription.as_ref().unwrap().observer_id;
        handle_client_message(
            &state,
            r#"{"type":"subscribe","collections":["guides"]}"#,
            &mut subscription,
        )
        .await;

        assert_ne!(subscription.as_ref().unwrap().observer_id, first);
        assert_eq!(state.hub.observer_count().await, 1);
    }

    #[tokio::test]
    async fn test_bad_messages_answer_with_error() {
        let state = state();
        let mut subscription = None;

        let reply = handle_client_message(&state, "hello", &mut subscription).await;
        assert!(matches!(reply, Some(HubMessage::Error { .. })));

        let reply = handle_client_message(
            &state,
            r#"{"type":"subscribe","collections":["payments"]}"#,
            &mut subscription,
        )
        .await;
        assert!(matches!(reply, Some(HubMessage::Error { .. })));
        assert!(subscription.is_none());
    }
}
