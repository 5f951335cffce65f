use futures_util::future::BoxFuture;
use graftql::{
    BatchOptions, ClientError, CompiledOperation, Dispatch, HeaderSource, OperationKind,
    OperationPayload, ResponsePayload, Transport, TransportError,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Records every outbound call and echoes each operation's document back as
/// its response data.
#[derive(Default)]
struct MockDispatch {
    singles: AtomicUsize,
    batches: Mutex<Vec<Vec<OperationPayload>>>,
    /// Drop the last response of each batch to simulate a length mismatch.
    truncate_batch: bool,
}

fn echo(op: &OperationPayload) -> ResponsePayload {
    ResponsePayload {
        data: Some(json!({ "echo": op.query })),
        errors: None,
    }
}

impl Dispatch for MockDispatch {
    fn send_single(
        &self,
        operation: OperationPayload,
        _headers: HashMap<String, String>,
    ) -> BoxFuture<'static, Result<ResponsePayload, TransportError>> {
        self.singles.fetch_add(1, Ordering::SeqCst);
        let response = echo(&operation);
        Box::pin(async move { Ok(response) })
    }

    fn send_batch(
        &self,
        operations: Vec<OperationPayload>,
        _headers: HashMap<String, String>,
    ) -> BoxFuture<'static, Result<Vec<ResponsePayload>, TransportError>> {
        self.batches.lock().unwrap().push(operations.clone());
        let mut responses: Vec<ResponsePayload> = operations.iter().map(echo).collect();
        if self.truncate_batch {
            responses.pop();
        }
        Box::pin(async move { Ok(responses) })
    }
}

/// Counts how many times headers were resolved.
#[derive(Clone, Default)]
struct CountingHeaders(Arc<AtomicUsize>);

impl HeaderSource for CountingHeaders {
    fn resolve(&self) -> BoxFuture<'_, Result<HashMap<String, String>, TransportError>> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Ok(HashMap::new()) })
    }
}

fn operation(document: &str) -> CompiledOperation {
    CompiledOperation {
        kind: OperationKind::Query,
        document: document.to_string(),
        variables: serde_json::Map::new(),
        operation_name: None,
    }
}

#[tokio::test]
async fn non_batched_calls_dispatch_immediately() {
    let dispatch = Arc::new(MockDispatch::default());
    let headers = CountingHeaders::default();
    let transport = Transport::new(dispatch.clone(), Arc::new(headers.clone()), None);

    let first = transport.execute(&operation("query { a }")).await.unwrap();
    let second = transport.execute(&operation("query { b }")).await.unwrap();

    assert_eq!(first, json!({ "echo": "query { a }" }));
    assert_eq!(second, json!({ "echo": "query { b }" }));
    assert_eq!(dispatch.singles.load(Ordering::SeqCst), 2);
    assert!(dispatch.batches.lock().unwrap().is_empty());
    // Headers are recomputed per call, never memoized.
    assert_eq!(headers.0.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn concurrent_calls_coalesce_into_one_batch() {
    let dispatch = Arc::new(MockDispatch::default());
    let headers = CountingHeaders::default();
    let transport = Transport::new(
        dispatch.clone(),
        Arc::new(headers.clone()),
        Some(BatchOptions {
            window: Duration::from_millis(10),
        }),
    );

    let op_a = operation("query { a }");
    let op_b = operation("query { b }");
    let (first, second) = tokio::join!(transport.execute(&op_a), transport.execute(&op_b));

    // Exactly one outbound request, carrying both operations in submission
    // order.
    let batches = dispatch.batches.lock().unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 2);
    assert_eq!(batches[0][0].query, "query { a }");
    assert_eq!(batches[0][1].query, "query { b }");

    // Each call resolves with the response at its own position.
    assert_eq!(first.unwrap(), json!({ "echo": "query { a }" }));
    assert_eq!(second.unwrap(), json!({ "echo": "query { b }" }));

    // Header source invocations track operations, not batches.
    assert_eq!(headers.0.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn calls_in_separate_windows_flush_separately() {
    let dispatch = Arc::new(MockDispatch::default());
    let transport = Transport::new(
        dispatch.clone(),
        Arc::new(CountingHeaders::default()),
        Some(BatchOptions {
            window: Duration::from_millis(10),
        }),
    );

    transport.execute(&operation("query { a }")).await.unwrap();
    transport.execute(&operation("query { b }")).await.unwrap();

    let batches = dispatch.batches.lock().unwrap();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].len(), 1);
    assert_eq!(batches[1].len(), 1);
}

#[tokio::test(start_paused = true)]
async fn batch_length_mismatch_fails_every_pending_call() {
    let dispatch = Arc::new(MockDispatch {
        truncate_batch: true,
        ..MockDispatch::default()
    });
    let transport = Transport::new(
        dispatch,
        Arc::new(CountingHeaders::default()),
        Some(BatchOptions {
            window: Duration::from_millis(10),
        }),
    );

    let op_a = operation("query { a }");
    let op_b = operation("query { b }");
    let (first, second) = tokio::join!(transport.execute(&op_a), transport.execute(&op_b));

    for result in [first, second] {
        match result {
            Err(ClientError::Transport(TransportError::BatchLengthMismatch {
                expected,
                got,
            })) => {
                assert_eq!(expected, 2);
                assert_eq!(got, 1);
            }
            other => panic!("expected length mismatch, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn protocol_errors_keep_partial_data() {
    struct FailingDispatch;
    impl Dispatch for FailingDispatch {
        fn send_single(
            &self,
            _operation: OperationPayload,
            _headers: HashMap<String, String>,
        ) -> BoxFuture<'static, Result<ResponsePayload, TransportError>> {
            Box::pin(async {
                Ok(ResponsePayload {
                    data: Some(json!({ "user": { "name": "Ada" }, "stats": null })),
                    errors: Some(vec![graftql::GraphqlError {
                        message: "stats unavailable".to_string(),
                        locations: None,
                        path: None,
                        extensions: None,
                    }]),
                })
            })
        }

        fn send_batch(
            &self,
            _operations: Vec<OperationPayload>,
            _headers: HashMap<String, String>,
        ) -> BoxFuture<'static, Result<Vec<ResponsePayload>, TransportError>> {
            unreachable!("not batched")
        }
    }

    let transport = Transport::new(
        Arc::new(FailingDispatch),
        Arc::new(CountingHeaders::default()),
        None,
    );

    match transport.execute(&operation("query { user stats }")).await {
        Err(ClientError::Graphql(err)) => {
            assert_eq!(err.errors.len(), 1);
            assert_eq!(err.errors[0].message, "stats unavailable");
            // Partial success is preserved, not collapsed.
            assert_eq!(
                err.data,
                Some(json!({ "user": { "name": "Ada" }, "stats": null }))
            );
        }
        other => panic!("expected graphql error, got {other:?}"),
    }
}

#[tokio::test]
async fn async_header_sources_are_awaited_before_dispatch() {
    #[derive(Default)]
    struct RecordingDispatch(Mutex<Vec<HashMap<String, String>>>);
    impl Dispatch for RecordingDispatch {
        fn send_single(
            &self,
            operation: OperationPayload,
            headers: HashMap<String, String>,
        ) -> BoxFuture<'static, Result<ResponsePayload, TransportError>> {
            self.0.lock().unwrap().push(headers);
            let response = echo(&operation);
            Box::pin(async move { Ok(response) })
        }

        fn send_batch(
            &self,
            _operations: Vec<OperationPayload>,
            _headers: HashMap<String, String>,
        ) -> BoxFuture<'static, Result<Vec<ResponsePayload>, TransportError>> {
            unreachable!("not batched")
        }
    }

    // A token source that must be awaited, as a per-request refresher would.
    let counter = Arc::new(AtomicUsize::new(0));
    let source = {
        let counter = counter.clone();
        move || {
            let counter = counter.clone();
            async move {
                tokio::task::yield_now().await;
                let token = counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TransportError>(HashMap::from([(
                    "authorization".to_string(),
                    format!("Bearer token-{token}"),
                )]))
            }
        }
    };

    let dispatch = Arc::new(RecordingDispatch::default());
    let transport = Transport::new(dispatch.clone(), Arc::new(source), None);

    transport.execute(&operation("query { a }")).await.unwrap();
    transport.execute(&operation("query { b }")).await.unwrap();

    let seen = dispatch.0.lock().unwrap();
    assert_eq!(seen[0]["authorization"], "Bearer token-0");
    assert_eq!(seen[1]["authorization"], "Bearer token-1");
}
