//! Client configuration: endpoint, header negotiation, batching window.

use crate::error::TransportError;
use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Produces the headers for one dispatch.
///
/// The source is re-invoked on every call and never memoized, so a source
/// backed by a token refresher hands each request a current token. Async
/// sources are awaited before the request is dispatched.
pub trait HeaderSource: Send + Sync {
    fn resolve(&self) -> BoxFuture<'_, Result<HashMap<String, String>, TransportError>>;
}

/// Any `Fn() -> Future<Output = Result<HashMap, TransportError>>` closure is
/// a header source.
impl<F, Fut> HeaderSource for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<HashMap<String, String>, TransportError>> + Send + 'static,
{
    fn resolve(&self) -> BoxFuture<'_, Result<HashMap<String, String>, TransportError>> {
        Box::pin((self)())
    }
}

/// A fixed header map.
#[derive(Debug, Clone, Default)]
pub struct StaticHeaders(pub HashMap<String, String>);

impl HeaderSource for StaticHeaders {
    fn resolve(&self) -> BoxFuture<'_, Result<HashMap<String, String>, TransportError>> {
        let headers = self.0.clone();
        Box::pin(async move { Ok(headers) })
    }
}

/// Time-windowed request batching.
///
/// Calls arriving within one window are coalesced into a single outbound
/// request. The window is explicit and configurable rather than an implicit
/// scheduling-tick boundary.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub window: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            window: Duration::from_millis(10),
        }
    }
}

/// Configuration shared by the HTTP transport and the subscription client.
#[derive(Clone)]
pub struct ClientConfig {
    /// HTTP endpoint for queries and mutations.
    pub url: String,
    /// WebSocket endpoint for subscriptions. Derived from `url` when unset.
    pub ws_url: Option<String>,
    pub headers: Arc<dyn HeaderSource>,
    pub batch: Option<BatchOptions>,
    pub ping_interval: Duration,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ws_url: None,
            headers: Arc::new(StaticHeaders::default()),
            batch: None,
            ping_interval: Duration::from_secs(15),
        }
    }

    /// The subscription endpoint: `ws_url` if set, otherwise `url` with the
    /// scheme swapped to `ws`/`wss`.
    pub fn subscription_url(&self) -> String {
        if let Some(ws_url) = &self.ws_url {
            return ws_url.clone();
        }
        if let Some(rest) = self.url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.url.clone()
        }
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("url", &self.url)
            .field("ws_url", &self.ws_url)
            .field("batch", &self.batch)
            .field("ping_interval", &self.ping_interval)
            .finish_non_exhaustive()
    }
}
