//! The client facade: configuration, compilation, and execution in one
//! place.

use crate::compile::{compile, compile_named, CompiledOperation, OperationKind};
use crate::config::{BatchOptions, ClientConfig, HeaderSource, StaticHeaders};
use crate::error::ClientError;
use crate::selection::SelectionSet;
use crate::subscription::SubscriptionClient;
use crate::transport::{ResponsePayload, Transport};
use crate::types::TypeLinkMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// A GraphQL client bound to one endpoint.
///
/// # Example
///
/// ```rust,ignore
/// use graftql::prelude::*;
/// use serde_json::json;
///
/// let client = Client::builder("https://api.example.com/graphql")
///     .header("authorization", "Bearer token")
///     .build();
///
/// let data = client
///     .query(
///         &SelectionSet::new().field_args_nested(
///             "user",
///             Arguments::new().arg("id", "ID!", json!("u1")),
///             SelectionSet::typed("User").field("name"),
///         ),
///     )
///     .await?;
/// ```
pub struct Client {
    config: ClientConfig,
    transport: Transport,
    link_map: Arc<TypeLinkMap>,
}

impl Client {
    pub fn builder(url: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(url)
    }

    pub fn link_map(&self) -> &TypeLinkMap {
        &self.link_map
    }

    /// Compile and execute a query.
    pub async fn query(&self, selection: &SelectionSet) -> Result<Value, ClientError> {
        self.run(selection, OperationKind::Query).await
    }

    /// Compile and execute a mutation.
    pub async fn mutate(&self, selection: &SelectionSet) -> Result<Value, ClientError> {
        self.run(selection, OperationKind::Mutation).await
    }

    /// Compile and execute an operation of the given kind.
    pub async fn run(
        &self,
        selection: &SelectionSet,
        kind: OperationKind,
    ) -> Result<Value, ClientError> {
        let operation = compile(selection, kind, &self.link_map)?;
        self.transport.execute(&operation).await
    }

    /// Like [`Client::run`] with an explicit operation name.
    pub async fn run_named(
        &self,
        selection: &SelectionSet,
        kind: OperationKind,
        name: impl Into<String>,
    ) -> Result<Value, ClientError> {
        let operation = compile_named(selection, kind, name, &self.link_map)?;
        self.transport.execute(&operation).await
    }

    /// Execute an already-compiled operation.
    pub async fn execute(&self, operation: &CompiledOperation) -> Result<Value, ClientError> {
        self.transport.execute(operation).await
    }

    /// Execute keeping the raw `{data, errors}` response shape.
    pub async fn execute_raw(
        &self,
        operation: &CompiledOperation,
    ) -> Result<ResponsePayload, ClientError> {
        self.transport.execute_raw(operation).await
    }

    /// Open the persistent subscription connection.
    pub async fn subscriptions(&self) -> Result<SubscriptionClient, ClientError> {
        SubscriptionClient::connect(&self.config).await
    }
}

/// Builder for [`Client`].
pub struct ClientBuilder {
    url: String,
    ws_url: Option<String>,
    static_headers: HashMap<String, String>,
    header_source: Option<Arc<dyn HeaderSource>>,
    batch: Option<BatchOptions>,
    ping_interval: Duration,
    link_map: TypeLinkMap,
}

impl ClientBuilder {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ws_url: None,
            static_headers: HashMap::new(),
            header_source: None,
            batch: None,
            ping_interval: Duration::from_secs(15),
            link_map: TypeLinkMap::new(),
        }
    }

    /// Explicit WebSocket endpoint (otherwise derived from the HTTP url).
    pub fn ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = Some(url.into());
        self
    }

    /// Add a fixed header. Ignored if a [`ClientBuilder::header_source`] is
    /// installed.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.static_headers.insert(name.into(), value.into());
        self
    }

    /// Install a dynamic header source, invoked fresh before every dispatch.
    pub fn header_source(mut self, source: impl HeaderSource + 'static) -> Self {
        self.header_source = Some(Arc::new(source));
        self
    }

    /// Enable time-windowed request batching.
    pub fn batching(mut self, options: BatchOptions) -> Self {
        self.batch = Some(options);
        self
    }

    /// Enable batching with the given flush window.
    pub fn batch_window(self, window: Duration) -> Self {
        self.batching(BatchOptions { window })
    }

    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Install the schema-derived type link map used for `on_<T>` validation,
    /// `__scalar` expansion, and runtime type discrimination.
    pub fn type_links(mut self, link_map: TypeLinkMap) -> Self {
        self.link_map = link_map;
        self
    }

    pub fn build(self) -> Client {
        let headers: Arc<dyn HeaderSource> = match self.header_source {
            Some(source) => source,
            None => Arc::new(StaticHeaders(self.static_headers)),
        };
        let config = ClientConfig {
            url: self.url,
            ws_url: self.ws_url,
            headers,
            batch: self.batch,
            ping_interval: self.ping_interval,
        };
        let transport = Transport::http(
            config.url.clone(),
            config.headers.clone(),
            config.batch.clone(),
        );
        Client {
            config,
            transport,
            link_map: Arc::new(self.link_map),
        }
    }
}
