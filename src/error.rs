use serde_json::Value;
use thiserror::Error;

/// Errors raised while compiling a selection tree into a wire document.
///
/// These are always synchronous: `compile` either returns a complete
/// [`CompiledOperation`](crate::CompiledOperation) or one of these, never a
/// partial document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error("empty selection at `{0}`: no fields and no __scalar")]
    EmptySelection(String),

    #[error("type condition `on_{concrete}` names a type that does not implement `{abstract_type}`")]
    UnknownTypeCondition {
        concrete: String,
        abstract_type: String,
    },

    #[error("type condition `on_{0}` used in a selection with no declared type")]
    UntypedCondition(String),

    #[error("__scalar used in a selection with no declared type")]
    UntypedScalarExpansion,

    #[error("no scalar fields known for type `{0}`")]
    UnknownScalarType(String),

    #[error("reserved key `{0}` used with an invalid selection shape")]
    InvalidReservedKey(String),
}

/// Transport-level failures: the request never produced a usable per-operation
/// response body.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned status {0}")]
    Status(u16),

    #[error("malformed response body: {0}")]
    MalformedBody(String),

    #[error("invalid header `{0}`")]
    InvalidHeader(String),

    #[error("batch response length {got} does not match request length {expected}")]
    BatchLengthMismatch { expected: usize, got: usize },

    #[error("batch dispatch failed: {0}")]
    BatchFailed(String),

    #[error("transport channel closed")]
    ChannelClosed,
}

/// A well-formed response that carried a protocol-level error list.
///
/// GraphQL allows partial success: `data` holds whatever the server managed
/// to resolve alongside the errors, so callers can still read it.
#[derive(Error, Debug)]
#[error("operation failed with {} graphql error(s): {}", .errors.len(), first_message(.errors))]
pub struct GraphqlOperationError {
    pub errors: Vec<crate::transport::GraphqlError>,
    pub data: Option<Value>,
}

fn first_message(errors: &[crate::transport::GraphqlError]) -> &str {
    errors.first().map(|e| e.message.as_str()).unwrap_or("")
}

/// Errors delivered to a single subscription observer.
#[derive(Error, Debug)]
pub enum SubscriptionError {
    #[error("server error for subscription: {0}")]
    Protocol(Value),

    #[error("connection closed")]
    ConnectionClosed,
}

/// Umbrella error for the client facade.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Graphql(#[from] GraphqlOperationError),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("json error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),
}
