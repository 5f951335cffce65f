//! Subscription multiplexing over one persistent connection.
//!
//! A [`SubscriptionClient`] owns a single WebSocket; every `subscribe` call
//! gets its own correlation id and its own event stream, all multiplexed
//! over that one socket. `unsubscribe` takes effect synchronously from the
//! caller's perspective: once it returns, the handle's stream delivers
//! nothing further, even for frames already in flight.

use crate::compile::CompiledOperation;
use crate::config::ClientConfig;
use crate::connection::{
    spawn_connection_loop, Command, ConnectionState, SubscriptionEvent,
};
use crate::error::{ClientError, SubscriptionError, TransportError};
use crate::transport::{OperationPayload, ResponsePayload};
use futures_util::{Sink, Stream, StreamExt};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

/// A handle to one persistent subscription connection.
///
/// Cheap to clone; all clones share the socket and the connection actor.
#[derive(Clone)]
pub struct SubscriptionClient {
    command_tx: mpsc::UnboundedSender<Command>,
    next_id: Arc<AtomicU64>,
    state: Arc<RwLock<ConnectionState>>,
}

impl SubscriptionClient {
    /// Resolve headers, perform the WebSocket handshake, and spawn the
    /// connection actor. Registrations flush to the wire only once the
    /// connection is established.
    pub async fn connect(config: &ClientConfig) -> Result<Self, ClientError> {
        let state = Arc::new(RwLock::new(ConnectionState::Connecting));
        let url = config.subscription_url();

        // Headers are resolved (possibly asynchronously) before the
        // handshake, same as the HTTP path.
        let headers = config.headers.resolve().await.map_err(ClientError::Transport)?;
        let mut request = url
            .into_client_request()
            .map_err(ClientError::WebSocket)?;
        for (name, value) in headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| TransportError::InvalidHeader(name.clone()))?;
            let header_value = HeaderValue::from_str(&value)
                .map_err(|_| TransportError::InvalidHeader(name.clone()))?;
            request.headers_mut().insert(header_name, header_value);
        }

        tracing::debug!(url = %request.uri(), "connecting subscription socket");
        let (socket, _) = connect_async(request).await?;
        *state.write().await = ConnectionState::Connected;

        let (tx, rx) = socket.split();
        Ok(Self::spawn(tx, rx, state, config.ping_interval))
    }

    /// Assemble a client over arbitrary socket halves. Tests use this with
    /// in-memory channels.
    pub(crate) fn spawn<Tx, Rx>(
        tx: Tx,
        rx: Rx,
        state: Arc<RwLock<ConnectionState>>,
        ping_interval: Duration,
    ) -> Self
    where
        Tx: Sink<Message, Error = WsError> + Unpin + Send + 'static,
        Rx: Stream<Item = Result<Message, WsError>> + Unpin + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        spawn_connection_loop(tx, rx, command_rx, state.clone(), ping_interval);
        Self {
            command_tx,
            next_id: Arc::new(AtomicU64::new(1)),
            state,
        }
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Register a subscription: allocate a correlation id, send `start`,
    /// and return the handle streaming this id's events.
    ///
    /// If the connection is already gone the handle's stream simply ends.
    pub fn subscribe(&self, operation: &CompiledOperation) -> SubscriptionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let _ = self.command_tx.send(Command::Start {
            id: id.clone(),
            payload: OperationPayload::from(operation),
            events: events_tx,
        });
        SubscriptionHandle {
            id,
            command_tx: self.command_tx.clone(),
            events: events_rx,
            active: true,
        }
    }

    /// Tear the connection down. Every still-registered observer receives a
    /// terminal error and the registration table is cleared.
    pub fn close(&self) {
        let _ = self.command_tx.send(Command::Close);
    }
}

/// One logical subscription: a stream of `data` payloads ending on server
/// `complete`, yielding a terminal `Err` on server `error` or teardown.
pub struct SubscriptionHandle {
    id: String,
    command_tx: mpsc::UnboundedSender<Command>,
    events: mpsc::UnboundedReceiver<SubscriptionEvent>,
    active: bool,
}

impl SubscriptionHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Deregister this subscription. Synchronous from the caller's view:
    /// after this returns the stream yields nothing, regardless of frames
    /// the server may still emit for this id. Idempotent.
    pub fn unsubscribe(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        self.events.close();
        let _ = self.command_tx.send(Command::Stop {
            id: self.id.clone(),
        });
    }
}

impl Stream for SubscriptionHandle {
    type Item = Result<ResponsePayload, SubscriptionError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if !this.active {
            return Poll::Ready(None);
        }
        match this.events.poll_recv(cx) {
            Poll::Ready(Some(SubscriptionEvent::Data(payload))) => Poll::Ready(Some(Ok(payload))),
            Poll::Ready(Some(SubscriptionEvent::Error(payload))) => {
                this.active = false;
                Poll::Ready(Some(Err(SubscriptionError::Protocol(payload))))
            }
            Poll::Ready(Some(SubscriptionEvent::Closed)) => {
                this.active = false;
                Poll::Ready(Some(Err(SubscriptionError::ConnectionClosed)))
            }
            Poll::Ready(None) => {
                this.active = false;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::OperationKind;
    use crate::connection::WireMessage;
    use futures::channel::mpsc as fmpsc;
    use futures::SinkExt as _;
    use serde_json::json;

    struct TestServer {
        to_client: fmpsc::UnboundedSender<Result<Message, WsError>>,
        from_client: fmpsc::UnboundedReceiver<Message>,
    }

    impl TestServer {
        /// Next client frame, decoded.
        async fn recv(&mut self) -> WireMessage {
            loop {
                match self.from_client.next().await.expect("client hung up") {
                    Message::Text(text) => {
                        return serde_json::from_str(&text).expect("client sent invalid frame")
                    }
                    Message::Ping(_) | Message::Pong(_) => continue,
                    other => panic!("unexpected client frame: {other:?}"),
                }
            }
        }

        fn send(&self, msg: &WireMessage) {
            let text = serde_json::to_string(msg).unwrap();
            self.to_client
                .unbounded_send(Ok(Message::Text(text)))
                .unwrap();
        }
    }

    fn test_client() -> (SubscriptionClient, TestServer) {
        let (to_client, client_rx) = fmpsc::unbounded::<Result<Message, WsError>>();
        let (client_tx, from_client) = fmpsc::unbounded::<Message>();
        let tx = client_tx.sink_map_err(|_| WsError::ConnectionClosed);
        let state = Arc::new(RwLock::new(ConnectionState::Connected));
        let client =
            SubscriptionClient::spawn(tx, client_rx, state, Duration::from_secs(60));
        (
            client,
            TestServer {
                to_client,
                from_client,
            },
        )
    }

    fn ticks_operation() -> CompiledOperation {
        CompiledOperation {
            kind: OperationKind::Subscription,
            document: "subscription { ticks }".to_string(),
            variables: serde_json::Map::new(),
            operation_name: None,
        }
    }

    #[tokio::test]
    async fn events_route_to_matching_subscription() {
        let (client, mut server) = test_client();
        let mut first = client.subscribe(&ticks_operation());
        let mut second = client.subscribe(&ticks_operation());

        let WireMessage::Start { id: first_id, .. } = server.recv().await else {
            panic!("expected start");
        };
        let WireMessage::Start { id: second_id, .. } = server.recv().await else {
            panic!("expected start");
        };
        assert_ne!(first_id, second_id);

        server.send(&WireMessage::Data {
            id: second_id,
            payload: ResponsePayload {
                data: Some(json!({"ticks": 2})),
                errors: None,
            },
        });
        server.send(&WireMessage::Data {
            id: first_id,
            payload: ResponsePayload {
                data: Some(json!({"ticks": 1})),
                errors: None,
            },
        });

        let got = second.next().await.unwrap().unwrap();
        assert_eq!(got.data, Some(json!({"ticks": 2})));
        let got = first.next().await.unwrap().unwrap();
        assert_eq!(got.data, Some(json!({"ticks": 1})));
    }

    #[tokio::test]
    async fn unsubscribe_before_data_delivers_nothing() {
        let (client, mut server) = test_client();
        let mut handle = client.subscribe(&ticks_operation());
        let WireMessage::Start { id, .. } = server.recv().await else {
            panic!("expected start");
        };

        handle.unsubscribe();
        handle.unsubscribe(); // second call is a no-op

        // Server emits data for the id anyway; none of it reaches the
        // caller.
        server.send(&WireMessage::Data {
            id: id.clone(),
            payload: ResponsePayload {
                data: Some(json!({"ticks": 99})),
                errors: None,
            },
        });
        assert!(handle.next().await.is_none());

        let WireMessage::Stop { id: stopped } = server.recv().await else {
            panic!("expected stop");
        };
        assert_eq!(stopped, id);
    }

    #[tokio::test]
    async fn server_complete_ends_the_stream() {
        let (client, mut server) = test_client();
        let mut handle = client.subscribe(&ticks_operation());
        let WireMessage::Start { id, .. } = server.recv().await else {
            panic!("expected start");
        };

        server.send(&WireMessage::Data {
            id: id.clone(),
            payload: ResponsePayload {
                data: Some(json!({"ticks": 1})),
                errors: None,
            },
        });
        server.send(&WireMessage::Complete { id });

        assert!(handle.next().await.unwrap().is_ok());
        assert!(handle.next().await.is_none());
    }

    #[tokio::test]
    async fn server_error_is_terminal_for_that_subscription_only() {
        let (client, mut server) = test_client();
        let mut failing = client.subscribe(&ticks_operation());
        let mut healthy = client.subscribe(&ticks_operation());
        let WireMessage::Start { id: failing_id, .. } = server.recv().await else {
            panic!("expected start");
        };
        let WireMessage::Start { id: healthy_id, .. } = server.recv().await else {
            panic!("expected start");
        };

        server.send(&WireMessage::Error {
            id: failing_id,
            payload: json!({"message": "boom"}),
        });
        server.send(&WireMessage::Data {
            id: healthy_id,
            payload: ResponsePayload {
                data: Some(json!({"ticks": 5})),
                errors: None,
            },
        });

        match failing.next().await {
            Some(Err(SubscriptionError::Protocol(payload))) => {
                assert_eq!(payload, json!({"message": "boom"}));
            }
            other => panic!("expected protocol error, got {other:?}"),
        }
        assert!(failing.next().await.is_none());

        // The unrelated subscription keeps flowing.
        let got = healthy.next().await.unwrap().unwrap();
        assert_eq!(got.data, Some(json!({"ticks": 5})));
    }

    #[tokio::test]
    async fn close_terminates_every_registered_observer() {
        let (client, mut server) = test_client();
        let mut first = client.subscribe(&ticks_operation());
        let mut second = client.subscribe(&ticks_operation());
        let _ = server.recv().await;
        let _ = server.recv().await;

        client.close();

        for handle in [&mut first, &mut second] {
            match handle.next().await {
                Some(Err(SubscriptionError::ConnectionClosed)) => {}
                other => panic!("expected ConnectionClosed, got {other:?}"),
            }
            assert!(handle.next().await.is_none());
        }
        assert_eq!(client.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn dropping_a_handle_sends_stop() {
        let (client, mut server) = test_client();
        let handle = client.subscribe(&ticks_operation());
        let WireMessage::Start { id, .. } = server.recv().await else {
            panic!("expected start");
        };

        drop(handle);

        let WireMessage::Stop { id: stopped } = server.recv().await else {
            panic!("expected stop");
        };
        assert_eq!(stopped, id);
    }
}
