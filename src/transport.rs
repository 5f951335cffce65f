//! HTTP execution of compiled operations, with optional time-windowed
//! batching.
//!
//! The outbound wire sits behind the [`Dispatch`] trait so the batching and
//! header logic is independent of the HTTP stack; [`HttpDispatch`] is the
//! reqwest-backed default. In batching mode, calls are queued to a flush
//! task that coalesces everything arriving within one window into a single
//! array-bodied request and demultiplexes the response array back to each
//! caller by position.

use crate::compile::CompiledOperation;
use crate::config::{BatchOptions, HeaderSource};
use crate::error::{ClientError, GraphqlOperationError, TransportError};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// One operation as it crosses the wire: `{query, variables, operationName?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationPayload {
    pub query: String,
    pub variables: Map<String, Value>,
    #[serde(rename = "operationName", skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
}

impl From<&CompiledOperation> for OperationPayload {
    fn from(op: &CompiledOperation) -> Self {
        Self {
            query: op.document.clone(),
            variables: op.variables.clone(),
            operation_name: op.operation_name.clone(),
        }
    }
}

/// One protocol-level error from the response `errors` list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphqlError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locations: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

/// One per-operation response body: `{data?, errors?}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponsePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<GraphqlError>>,
}

impl ResponsePayload {
    /// Collapse into `data`, or a [`GraphqlOperationError`] that still
    /// carries any partial data the server resolved.
    pub fn into_result(self) -> Result<Value, GraphqlOperationError> {
        match self.errors {
            Some(errors) if !errors.is_empty() => Err(GraphqlOperationError {
                errors,
                data: self.data,
            }),
            _ => Ok(self.data.unwrap_or(Value::Null)),
        }
    }
}

/// The outbound request/response channel.
pub trait Dispatch: Send + Sync + 'static {
    fn send_single(
        &self,
        operation: OperationPayload,
        headers: HashMap<String, String>,
    ) -> BoxFuture<'static, Result<ResponsePayload, TransportError>>;

    fn send_batch(
        &self,
        operations: Vec<OperationPayload>,
        headers: HashMap<String, String>,
    ) -> BoxFuture<'static, Result<Vec<ResponsePayload>, TransportError>>;
}

/// reqwest-backed dispatch posting JSON bodies to one endpoint.
pub struct HttpDispatch {
    client: reqwest::Client,
    url: String,
}

impl HttpDispatch {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

fn to_header_map(
    headers: &HashMap<String, String>,
) -> Result<reqwest::header::HeaderMap, TransportError> {
    let mut map = reqwest::header::HeaderMap::new();
    for (name, value) in headers {
        let name = reqwest::header::HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| TransportError::InvalidHeader(name.clone()))?;
        let value = reqwest::header::HeaderValue::from_str(value)
            .map_err(|_| TransportError::InvalidHeader(name.to_string()))?;
        map.insert(name, value);
    }
    Ok(map)
}

impl Dispatch for HttpDispatch {
    fn send_single(
        &self,
        operation: OperationPayload,
        headers: HashMap<String, String>,
    ) -> BoxFuture<'static, Result<ResponsePayload, TransportError>> {
        let client = self.client.clone();
        let url = self.url.clone();
        Box::pin(async move {
            let headers = to_header_map(&headers)?;
            tracing::debug!(%url, "dispatching operation");
            let response = client
                .post(&url)
                .headers(headers)
                .json(&operation)
                .send()
                .await?;
            let status = response.status();
            if !status.is_success() {
                return Err(TransportError::Status(status.as_u16()));
            }
            response
                .json::<ResponsePayload>()
                .await
                .map_err(|e| TransportError::MalformedBody(e.to_string()))
        })
    }

    fn send_batch(
        &self,
        operations: Vec<OperationPayload>,
        headers: HashMap<String, String>,
    ) -> BoxFuture<'static, Result<Vec<ResponsePayload>, TransportError>> {
        let client = self.client.clone();
        let url = self.url.clone();
        Box::pin(async move {
            let headers = to_header_map(&headers)?;
            tracing::debug!(%url, operations = operations.len(), "dispatching batch");
            let response = client
                .post(&url)
                .headers(headers)
                .json(&operations)
                .send()
                .await?;
            let status = response.status();
            if !status.is_success() {
                return Err(TransportError::Status(status.as_u16()));
            }
            response
                .json::<Vec<ResponsePayload>>()
                .await
                .map_err(|e| TransportError::MalformedBody(e.to_string()))
        })
    }
}

struct PendingOperation {
    payload: OperationPayload,
    headers: HashMap<String, String>,
    respond: oneshot::Sender<Result<ResponsePayload, TransportError>>,
}

/// Executes compiled operations over a [`Dispatch`], resolving headers fresh
/// per call and batching when configured.
pub struct Transport {
    headers: Arc<dyn HeaderSource>,
    dispatch: Arc<dyn Dispatch>,
    batch_tx: Option<mpsc::UnboundedSender<PendingOperation>>,
}

impl Transport {
    pub fn new(
        dispatch: Arc<dyn Dispatch>,
        headers: Arc<dyn HeaderSource>,
        batch: Option<BatchOptions>,
    ) -> Self {
        let batch_tx = batch.map(|options| {
            let (tx, rx) = mpsc::unbounded_channel();
            tokio::spawn(run_batch_loop(rx, dispatch.clone(), options));
            tx
        });
        Self {
            headers,
            dispatch,
            batch_tx,
        }
    }

    /// reqwest transport against one endpoint.
    pub fn http(
        url: impl Into<String>,
        headers: Arc<dyn HeaderSource>,
        batch: Option<BatchOptions>,
    ) -> Self {
        Self::new(Arc::new(HttpDispatch::new(url)), headers, batch)
    }

    /// Execute, keeping the raw `{data, errors}` shape.
    pub async fn execute_raw(
        &self,
        operation: &CompiledOperation,
    ) -> Result<ResponsePayload, ClientError> {
        let payload = OperationPayload::from(operation);
        // Fresh headers per call, awaited before dispatch.
        let headers = self.headers.resolve().await.map_err(ClientError::Transport)?;

        let response = match &self.batch_tx {
            Some(tx) => {
                let (respond, rx) = oneshot::channel();
                tx.send(PendingOperation {
                    payload,
                    headers,
                    respond,
                })
                .map_err(|_| TransportError::ChannelClosed)?;
                rx.await.map_err(|_| TransportError::ChannelClosed)??
            }
            None => self.dispatch.send_single(payload, headers).await?,
        };
        Ok(response)
    }

    /// Execute and collapse into `data`; protocol errors surface as
    /// [`GraphqlOperationError`] with partial data attached.
    pub async fn execute(&self, operation: &CompiledOperation) -> Result<Value, ClientError> {
        self.execute_raw(operation)
            .await?
            .into_result()
            .map_err(ClientError::Graphql)
    }
}

async fn run_batch_loop(
    mut rx: mpsc::UnboundedReceiver<PendingOperation>,
    dispatch: Arc<dyn Dispatch>,
    options: BatchOptions,
) {
    while let Some(first) = rx.recv().await {
        let mut pending = vec![first];
        let deadline = tokio::time::sleep(options.window);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                next = rx.recv() => match next {
                    Some(op) => pending.push(op),
                    None => break,
                },
            }
        }
        flush(dispatch.as_ref(), pending).await;
    }
}

async fn flush(dispatch: &dyn Dispatch, pending: Vec<PendingOperation>) {
    tracing::debug!(operations = pending.len(), "flushing batch");

    // Headers were resolved per call already; merge them in enqueue order,
    // later entries winning, for the single flush request.
    let mut headers = HashMap::new();
    let mut operations = Vec::with_capacity(pending.len());
    for op in &pending {
        headers.extend(op.headers.clone());
        operations.push(op.payload.clone());
    }

    match dispatch.send_batch(operations, headers).await {
        Ok(responses) if responses.len() == pending.len() => {
            for (op, response) in pending.into_iter().zip(responses) {
                let _ = op.respond.send(Ok(response));
            }
        }
        Ok(responses) => {
            // Responses cannot be attributed; fatal for the whole flush.
            let expected = pending.len();
            let got = responses.len();
            tracing::error!(expected, got, "batch response length mismatch");
            for op in pending {
                let _ = op
                    .respond
                    .send(Err(TransportError::BatchLengthMismatch { expected, got }));
            }
        }
        Err(err) => {
            tracing::error!(error = %err, "batch dispatch failed");
            let message = err.to_string();
            for op in pending {
                let _ = op
                    .respond
                    .send(Err(TransportError::BatchFailed(message.clone())));
            }
        }
    }
}
