//! The subscription connection actor.
//!
//! One spawned task owns the socket and the registration table. Commands
//! (start/stop/close) arrive on an mpsc channel; wire frames are dispatched
//! to observers by correlation id, strictly in arrival order. Because only
//! this task touches the table, registration mutation needs no locks and
//! never happens mid-dispatch.
//!
//! The loop is generic over the socket's sink/stream halves so tests can
//! drive it with in-memory channels instead of a real WebSocket.

use crate::transport::{OperationPayload, ResponsePayload};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

/// Lifecycle of the underlying connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Control messages on the persistent channel, keyed by correlation id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub(crate) enum WireMessage {
    Start { id: String, payload: OperationPayload },
    Stop { id: String },
    Data { id: String, payload: ResponsePayload },
    Error { id: String, payload: Value },
    Complete { id: String },
}

/// Something delivered to one subscription's observer channel.
#[derive(Debug)]
pub(crate) enum SubscriptionEvent {
    Data(ResponsePayload),
    /// Terminal server-side error for this id.
    Error(Value),
    /// Terminal: the connection went away underneath the subscription.
    Closed,
}

pub(crate) enum Command {
    Start {
        id: String,
        payload: OperationPayload,
        events: mpsc::UnboundedSender<SubscriptionEvent>,
    },
    Stop {
        id: String,
    },
    Close,
}

pub(crate) fn spawn_connection_loop<Tx, Rx>(
    mut tx: Tx,
    mut rx: Rx,
    mut command_rx: mpsc::UnboundedReceiver<Command>,
    state: Arc<RwLock<ConnectionState>>,
    ping_interval: Duration,
) where
    Tx: Sink<Message, Error = WsError> + Unpin + Send + 'static,
    Rx: Stream<Item = Result<Message, WsError>> + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut observers: HashMap<String, mpsc::UnboundedSender<SubscriptionEvent>> =
            HashMap::new();
        let mut ping_timer = tokio::time::interval(ping_interval);
        ping_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick of a tokio interval fires immediately; skip it.
        ping_timer.tick().await;

        loop {
            tokio::select! {
                frame = rx.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            handle_frame(&text, &mut observers);
                        }
                        Some(Ok(Message::Binary(bytes))) => {
                            let text = String::from_utf8_lossy(&bytes);
                            handle_frame(&text, &mut observers);
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            let _ = tx.send(Message::Pong(payload)).await;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            tracing::debug!("connection closed by server");
                            break;
                        }
                        Some(Err(err)) => {
                            tracing::error!(error = %err, "websocket error");
                            break;
                        }
                        _ => {}
                    }
                }
                cmd = command_rx.recv() => {
                    match cmd {
                        Some(Command::Start { id, payload, events }) => {
                            observers.insert(id.clone(), events);
                            let msg = WireMessage::Start { id, payload };
                            if send_wire(&mut tx, &msg).await.is_err() {
                                break;
                            }
                        }
                        Some(Command::Stop { id }) => {
                            // Local deregistration happens regardless of
                            // whether the server acknowledges the stop.
                            observers.remove(&id);
                            let msg = WireMessage::Stop { id };
                            if send_wire(&mut tx, &msg).await.is_err() {
                                break;
                            }
                        }
                        Some(Command::Close) | None => {
                            let _ = tx.close().await;
                            break;
                        }
                    }
                }
                _ = ping_timer.tick() => {
                    let _ = tx.send(Message::Ping(Vec::new())).await;
                }
            }
        }

        // Teardown: every still-registered observer gets a terminal event;
        // no registration outlives the connection.
        *state.write().await = ConnectionState::Disconnected;
        for (_, events) in observers.drain() {
            let _ = events.send(SubscriptionEvent::Closed);
        }
    });
}

async fn send_wire<Tx>(tx: &mut Tx, msg: &WireMessage) -> Result<(), WsError>
where
    Tx: Sink<Message, Error = WsError> + Unpin,
{
    let text = serde_json::to_string(msg).map_err(|_| WsError::Utf8)?;
    tx.send(Message::Text(text)).await
}

fn handle_frame(
    text: &str,
    observers: &mut HashMap<String, mpsc::UnboundedSender<SubscriptionEvent>>,
) {
    let msg = match serde_json::from_str::<WireMessage>(text) {
        Ok(msg) => msg,
        Err(err) => {
            tracing::warn!(error = %err, "ignoring unparseable frame");
            return;
        }
    };
    match msg {
        WireMessage::Data { id, payload } => {
            let stale = match observers.get(&id) {
                Some(events) => events.send(SubscriptionEvent::Data(payload)).is_err(),
                None => false,
            };
            if stale {
                // Observer gone; drop the registration.
                observers.remove(&id);
            }
        }
        WireMessage::Error { id, payload } => {
            if let Some(events) = observers.remove(&id) {
                let _ = events.send(SubscriptionEvent::Error(payload));
            }
        }
        WireMessage::Complete { id } => {
            // Dropping the sender ends the observer's stream.
            observers.remove(&id);
        }
        WireMessage::Start { .. } | WireMessage::Stop { .. } => {
            tracing::warn!("ignoring client-direction frame from server");
        }
    }
}
