use axum::{
    body::Body,
    extract::Request,
    http::{header::CONTENT_TYPE, HeaderMap, Method, StatusCode, Version},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use futures::stream;
use http_body_logger::{
    BufferPool, CaptureStrategy, Captured, EventId, HttpLoggerLayer, LogRecord, LogSink,
    LoggerConfig, MultiSink, ServiceBuilderExt,
};
use http_body_util::BodyExt;
use serde_json::json;
use std::{
    convert::Infallible,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::{Duration, SystemTime},
};
use tokio::time::sleep;
use tower::{service_fn, ServiceBuilder, ServiceExt};
use tracing::Level;

/// Test sink that collects every record for verification
#[derive(Debug, Clone)]
struct RecordingSink {
    enabled: bool,
    enabled_checks: Arc<AtomicUsize>,
    records: Arc<Mutex<Vec<(Level, EventId, LogRecord)>>>,
}

impl RecordingSink {
    fn new() -> Self {
        Self {
            enabled: true,
            enabled_checks: Arc::new(AtomicUsize::new(0)),
            records: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new()
        }
    }

    fn records(&self) -> Vec<(Level, EventId, LogRecord)> {
        self.records.lock().unwrap().clone()
    }

    fn requests(&self) -> Vec<LogRecord> {
        self.of_kind(EventId::REQUEST_INFO)
    }

    fn responses(&self) -> Vec<LogRecord> {
        self.of_kind(EventId::RESPONSE_INFO)
    }

    fn of_kind(&self, event: EventId) -> Vec<LogRecord> {
        self.records()
            .into_iter()
            .filter(|(_, id, _)| *id == event)
            .map(|(_, _, record)| record)
            .collect()
    }

    async fn wait_for_records(&self, expected_count: usize, timeout: Duration) -> bool {
        let start = SystemTime::now();
        while start.elapsed().unwrap() < timeout {
            if self.records.lock().unwrap().len() >= expected_count {
                return true;
            }
            sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

impl LogSink for RecordingSink {
    fn is_enabled(&self, _level: Level, _event: EventId) -> bool {
        self.enabled_checks.fetch_add(1, Ordering::SeqCst);
        self.enabled
    }

    fn log(&self, level: Level, event: EventId, record: &LogRecord) {
        self.records
            .lock()
            .unwrap()
            .push((level, event, record.clone()));
    }
}

#[derive(Debug)]
struct PanickingSink;

impl LogSink for PanickingSink {
    fn is_enabled(&self, _level: Level, _event: EventId) -> bool {
        true
    }

    fn log(&self, _level: Level, _event: EventId, _record: &LogRecord) {
        panic!("sink is broken");
    }
}

// Test server handlers
async fn hello_handler() -> impl IntoResponse {
    "Hello, World!"
}

/// Echoes the body back with the request's content type
async fn echo_handler(headers: HeaderMap, body: Bytes) -> impl IntoResponse {
    let content_type = headers
        .get(CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| "application/octet-stream".parse().unwrap());
    ([(CONTENT_TYPE, content_type)], body)
}

fn png_bytes() -> Vec<u8> {
    let mut png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    png.extend((0..492).map(|i| (i % 251) as u8));
    png
}

async fn png_handler() -> impl IntoResponse {
    ([(CONTENT_TYPE, "image/png")], png_bytes())
}

async fn streaming_handler() -> impl IntoResponse {
    let stream = stream::iter(vec![
        Ok::<_, Infallible>(Bytes::from("chunk1")),
        Ok(Bytes::from("chunk2")),
        Ok(Bytes::from("chunk3")),
    ]);

    Response::builder()
        .header("content-type", "text/plain")
        .body(Body::from_stream(stream))
        .unwrap()
}

async fn events_handler() -> impl IntoResponse {
    Response::builder()
        .header("content-type", "text/event-stream")
        .body(Body::from("data: tick\n\n"))
        .unwrap()
}

async fn large_handler() -> impl IntoResponse {
    "x".repeat(2048) // 2KB
}

fn routes() -> Router {
    Router::new()
        .route("/hello", get(hello_handler))
        .route("/echo", post(echo_handler))
        .route("/png", get(png_handler))
        .route("/streaming", get(streaming_handler))
        .route("/events", get(events_handler))
        .route("/large", get(large_handler))
}

fn create_test_app(sink: RecordingSink, config: LoggerConfig) -> Router {
    routes().layer(HttpLoggerLayer::new(config, sink))
}

#[tokio::test]
async fn test_json_request_is_logged_and_still_readable() {
    let sink = RecordingSink::new();
    let app = create_test_app(sink.clone(), LoggerConfig::default());
    let server = axum_test::TestServer::new(app).unwrap();

    let response = server.post("/echo").json(&json!({"a": 1})).await;
    assert_eq!(response.status_code(), StatusCode::OK);
    // The handler still received the full body
    assert_eq!(response.text(), r#"{"a":1}"#);

    let requests = sink.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.exchange.method, Method::POST);
    assert_eq!(request.exchange.path, "/echo");
    assert_eq!(request.content_type.as_deref(), Some("application/json"));
    assert_eq!(request.content, Captured::Text(r#"{"a":1}"#.to_string()));

    let responses = sink.responses();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].status, Some(StatusCode::OK));
    assert_eq!(responses[0].content, Captured::Text(r#"{"a":1}"#.to_string()));
}

#[tokio::test]
async fn test_allow_listed_types_decode_exactly() {
    let sink = RecordingSink::new();
    let app = create_test_app(sink.clone(), LoggerConfig::default());
    let server = axum_test::TestServer::new(app).unwrap();

    let cases = [
        ("text/plain", "plain text with ünïcödé"),
        ("application/json", r#"{"list":[1,2,3]}"#),
        ("application/xml", "<root><item>1</item></root>"),
        ("application/x-www-form-urlencoded", "a=1&b=two"),
    ];

    for (content_type, body) in cases {
        let response = server
            .post("/echo")
            .bytes(Bytes::from(body))
            .content_type(content_type)
            .await;
        assert_eq!(response.text(), body);
    }

    let requests = sink.requests();
    let responses = sink.responses();
    assert_eq!(requests.len(), cases.len());
    assert_eq!(responses.len(), cases.len());

    for (i, (content_type, body)) in cases.iter().enumerate() {
        assert_eq!(requests[i].content_type.as_deref(), Some(*content_type));
        assert_eq!(requests[i].content, Captured::Text(body.to_string()));
        assert_eq!(responses[i].content, Captured::Text(body.to_string()));
    }
}

#[tokio::test]
async fn test_binary_request_is_untouched() {
    let sink = RecordingSink::new();
    let app = create_test_app(sink.clone(), LoggerConfig::default());
    let server = axum_test::TestServer::new(app).unwrap();

    let payload: Vec<u8> = (0..=255).collect();
    let response = server
        .post("/echo")
        .bytes(Bytes::from(payload.clone()))
        .content_type("application/octet-stream")
        .await;
    assert_eq!(response.as_bytes().as_ref(), payload.as_slice());

    let requests = sink.requests();
    assert_eq!(
        requests[0].content,
        Captured::Unsupported {
            content_type: Some("application/octet-stream".to_string())
        }
    );
    assert!(requests[0]
        .content
        .to_string()
        .contains("(application/octet-stream)"));
}

#[tokio::test]
async fn test_png_response_is_delivered_unchanged() {
    let sink = RecordingSink::new();
    let app = create_test_app(sink.clone(), LoggerConfig::default());
    let server = axum_test::TestServer::new(app).unwrap();

    let response = server.get("/png").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.as_bytes().len(), 500);
    assert_eq!(response.as_bytes().as_ref(), png_bytes().as_slice());

    let responses = sink.responses();
    assert_eq!(responses.len(), 1);
    assert_eq!(
        responses[0].content.to_string(),
        "Content is empty or Content-Type (image/png) is not supported for logging."
    );
    assert_eq!(responses[0].content_type.as_deref(), Some("image/png"));
    assert_eq!(responses[0].content_length, Some(500));
}

#[tokio::test]
async fn test_empty_request_body() {
    let sink = RecordingSink::new();
    let app = create_test_app(sink.clone(), LoggerConfig::default());
    let server = axum_test::TestServer::new(app).unwrap();

    let response = server.get("/hello").await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let requests = sink.requests();
    assert_eq!(requests.len(), 1);
    assert!(matches!(requests[0].content, Captured::Unsupported { .. }));

    // Response should still be captured
    let responses = sink.responses();
    assert_eq!(responses[0].content, Captured::Text("Hello, World!".to_string()));
}

#[tokio::test]
async fn test_streaming_response_is_buffered() {
    let sink = RecordingSink::new();
    let app = create_test_app(sink.clone(), LoggerConfig::default());
    let server = axum_test::TestServer::new(app).unwrap();

    let response = server.get("/streaming").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.text(), "chunk1chunk2chunk3");

    let responses = sink.responses();
    assert_eq!(
        responses[0].content,
        Captured::Text("chunk1chunk2chunk3".to_string())
    );
}

#[tokio::test]
async fn test_streaming_strategy_logs_after_delivery() {
    let sink = RecordingSink::new();
    let config = LoggerConfig::default().with_strategy(CaptureStrategy::Streaming);
    let app = create_test_app(sink.clone(), config);
    let server = axum_test::TestServer::new(app).unwrap();

    let response = server.get("/streaming").await;
    assert_eq!(response.text(), "chunk1chunk2chunk3");

    // Response records are emitted from a background task
    assert!(sink.wait_for_records(2, Duration::from_secs(1)).await);

    let responses = sink.responses();
    assert_eq!(responses.len(), 1);
    assert_eq!(
        responses[0].content,
        Captured::Text("chunk1chunk2chunk3".to_string())
    );
}

#[tokio::test]
async fn test_streaming_strategy_aborted_response_is_not_logged_as_text() {
    let sink = RecordingSink::new();
    let config = LoggerConfig::default().with_strategy(CaptureStrategy::Streaming);
    let app = create_test_app(sink.clone(), config);

    let request = http::Request::get("/streaming").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Read one chunk, then hang up
    let mut body = response.into_body();
    let first = body.frame().await.unwrap().unwrap();
    assert_eq!(first.into_data().unwrap(), "chunk1");
    drop(body);

    assert!(sink.wait_for_records(2, Duration::from_secs(1)).await);

    let responses = sink.responses();
    assert_eq!(responses.len(), 1);
    assert_eq!(
        responses[0].content,
        Captured::Unreadable {
            error: "body dropped before completion".to_string()
        }
    );
    assert_eq!(
        responses[0].content.to_string(),
        "Content could not be read: body dropped before completion"
    );
}

#[tokio::test]
async fn test_streaming_strategy_keeps_content_length() {
    let sink = RecordingSink::new();
    let config = LoggerConfig::default().with_strategy(CaptureStrategy::Streaming);
    let app = create_test_app(sink.clone(), config);

    let request = http::Request::get("/hello").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    // Known length survives the tee, so the transport can still send Content-Length
    let body = response.into_body();
    assert_eq!(http_body::Body::size_hint(&body).exact(), Some(13));
    assert_eq!(body.collect().await.unwrap().to_bytes(), "Hello, World!");

    assert!(sink.wait_for_records(2, Duration::from_secs(1)).await);
    assert_eq!(
        sink.responses()[0].content,
        Captured::Text("Hello, World!".to_string())
    );
}

#[tokio::test]
async fn test_capture_limit() {
    let sink = RecordingSink::new();
    let config = LoggerConfig::default().with_max_capture_bytes(256);
    let app = create_test_app(sink.clone(), config);
    let server = axum_test::TestServer::new(app).unwrap();

    let response = server.get("/large").await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let full_response = response.text();
    assert_eq!(full_response.len(), 2048); // Full response should come through

    let responses = sink.responses();
    assert_eq!(responses[0].content, Captured::TooLarge { limit: 256 });
}

#[tokio::test]
async fn test_disabled_level_is_a_pass_through() {
    let sink = RecordingSink::disabled();
    let pool = BufferPool::default();
    let layer = HttpLoggerLayer::new(LoggerConfig::default(), sink.clone()).with_pool(pool.clone());
    let app = routes().layer(layer);
    let server = axum_test::TestServer::new(app).unwrap();

    let response = server
        .post("/echo")
        .bytes(Bytes::from_static(b"test body"))
        .content_type("text/plain")
        .await;
    assert_eq!(response.text(), "test body");

    let response = server.get("/png").await;
    assert_eq!(response.as_bytes().as_ref(), png_bytes().as_slice());

    assert!(sink.records().is_empty());
    // One pre-check per capturer per exchange, nothing else happened
    assert_eq!(sink.enabled_checks.load(Ordering::SeqCst), 4);
    assert_eq!(pool.acquired(), 0);
}

#[tokio::test]
async fn test_records_use_configured_level() {
    let sink = RecordingSink::new();
    let app = create_test_app(sink.clone(), LoggerConfig::default().with_level(Level::TRACE));
    let server = axum_test::TestServer::new(app).unwrap();

    server.get("/hello").await;

    let records = sink.records();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|(level, _, _)| *level == Level::TRACE));
    assert_eq!(records[0].1, EventId::REQUEST_INFO);
    assert_eq!(records[1].1, EventId::RESPONSE_INFO);
    assert_eq!(records[0].1.id, 10000);
    assert_eq!(records[1].1.id, 10001);
}

#[tokio::test]
async fn test_request_only_and_response_only() {
    let request_sink = RecordingSink::new();
    let response_sink = RecordingSink::new();

    let app = routes().layer(
        ServiceBuilder::new()
            .request_logger(LoggerConfig::default(), request_sink.clone())
            .response_logger(LoggerConfig::default(), response_sink.clone()),
    );
    let server = axum_test::TestServer::new(app).unwrap();

    let response = server.post("/echo").text("both sides").await;
    assert_eq!(response.text(), "both sides");

    assert_eq!(request_sink.requests().len(), 1);
    assert!(request_sink.responses().is_empty());
    assert_eq!(response_sink.responses().len(), 1);
    assert!(response_sink.requests().is_empty());
}

#[tokio::test]
async fn test_event_stream_is_not_buffered() {
    let sink = RecordingSink::new();
    let app = create_test_app(sink.clone(), LoggerConfig::default());
    let server = axum_test::TestServer::new(app).unwrap();

    let response = server.get("/events").await;
    assert_eq!(response.text(), "data: tick\n\n");

    let responses = sink.responses();
    assert_eq!(
        responses[0].content,
        Captured::Streaming {
            content_type: Some("text/event-stream".to_string())
        }
    );
}

#[tokio::test]
async fn test_grpc_over_http2_bypasses_capture() {
    let sink = RecordingSink::new();
    let pool = BufferPool::default();
    let service = ServiceBuilder::new()
        .layer(HttpLoggerLayer::new(LoggerConfig::default(), sink.clone()).with_pool(pool.clone()))
        .service(service_fn(|request: Request| async move {
            let bytes = request.into_body().collect().await.unwrap().to_bytes();
            let response = Response::builder()
                .header(CONTENT_TYPE, "application/grpc")
                .body(Body::from(bytes))
                .unwrap();
            Ok::<_, Infallible>(response)
        }));

    let frame: &'static [u8] = &[0, 0, 0, 0, 3, 0x08, 0x96, 0x01];
    let request = http::Request::post("http://localhost/pkg.Service/Method")
        .version(Version::HTTP_2)
        .header(CONTENT_TYPE, "application/grpc")
        .body(Body::from(frame))
        .unwrap();

    let response = service.oneshot(request).await.unwrap();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body.as_ref(), frame);

    let responses = sink.responses();
    assert_eq!(
        responses[0].content,
        Captured::Streaming {
            content_type: Some("application/grpc".to_string())
        }
    );
    assert_eq!(responses[0].exchange.protocol_name(), "HTTP/2.0");
    assert_eq!(pool.acquired(), 0);
}

#[tokio::test]
async fn test_unreadable_request_body_fails_open() {
    let sink = RecordingSink::new();
    let handler_calls = Arc::new(AtomicUsize::new(0));
    let calls = handler_calls.clone();

    let service = ServiceBuilder::new()
        .http_logger(LoggerConfig::default(), sink.clone())
        .service(service_fn(move |request: Request| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                // The handler sees the same failure it would have seen without the logger
                let status = match request.into_body().collect().await {
                    Ok(_) => StatusCode::OK,
                    Err(_) => StatusCode::BAD_REQUEST,
                };
                Ok::<_, Infallible>(status.into_response())
            }
        }));

    let body = Body::from_stream(stream::iter(vec![
        Ok(Bytes::from_static(b"partial")),
        Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionAborted,
            "client went away",
        )),
    ]));
    let request = http::Request::post("http://localhost/upload")
        .header(CONTENT_TYPE, "text/plain")
        .body(body)
        .unwrap();

    let response = service.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(handler_calls.load(Ordering::SeqCst), 1);

    let requests = sink.requests();
    assert!(matches!(
        &requests[0].content,
        Captured::Unreadable { error } if error.contains("client went away")
    ));
}

#[tokio::test]
async fn test_panicking_sink_does_not_fail_requests() {
    let app = routes().layer(HttpLoggerLayer::new(LoggerConfig::default(), PanickingSink));
    let server = axum_test::TestServer::new(app).unwrap();

    let response = server.post("/echo").text("still served").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.text(), "still served");
}

#[tokio::test]
async fn test_multi_sink_receives_every_record() {
    let first = RecordingSink::new();
    let second = RecordingSink::new();
    let sink = MultiSink::new().with(first.clone()).with(second.clone());

    let app = routes().layer(HttpLoggerLayer::new(LoggerConfig::default(), sink));
    let server = axum_test::TestServer::new(app).unwrap();

    server.get("/hello").await;

    assert_eq!(first.records().len(), 2);
    assert_eq!(second.records().len(), 2);
}

#[tokio::test]
async fn test_request_line_fields() {
    let sink = RecordingSink::new();
    let service = ServiceBuilder::new()
        .http_logger(
            LoggerConfig::default().with_default_scheme("https"),
            sink.clone(),
        )
        .service(service_fn(|_request: Request| async {
            Ok::<_, Infallible>((StatusCode::CREATED, "made").into_response())
        }));

    let request = http::Request::put("/things/7?dry_run=true")
        .header("host", "api.example.com")
        .header("accept", "text/plain")
        .header("accept", "application/json")
        .body(Body::empty())
        .unwrap();
    service.oneshot(request).await.unwrap();

    let requests = sink.requests();
    let responses = sink.responses();
    let exchange = &requests[0].exchange;
    assert_eq!(exchange.method, Method::PUT);
    assert_eq!(exchange.scheme, "https");
    assert_eq!(exchange.host, "api.example.com");
    assert_eq!(exchange.path, "/things/7");
    assert_eq!(exchange.query, "?dry_run=true");
    assert!(requests[0]
        .headers
        .contains("accept: text/plain, application/json\n"));

    assert_eq!(responses[0].status, Some(StatusCode::CREATED));
    assert!(responses[0].to_string().starts_with(
        "Response Information HTTP/1.1 PUT https://api.example.com/things/7?dry_run=true - 201 4 text/plain; charset=utf-8\n"
    ));
}

#[tokio::test]
async fn test_nested_router_reports_path_base() {
    let sink = RecordingSink::new();
    let api = Router::new()
        .route("/users", get(|| async { "[]" }))
        .layer(HttpLoggerLayer::new(LoggerConfig::default(), sink.clone()));
    let app = Router::new().nest("/api", api);
    let server = axum_test::TestServer::new(app).unwrap();

    let response = server.get("/api/users").await;
    assert_eq!(response.text(), "[]");

    let requests = sink.requests();
    assert_eq!(requests[0].exchange.path_base, "/api");
    assert_eq!(requests[0].exchange.path, "/users");
}

#[tokio::test]
async fn test_multiple_concurrent_requests() {
    let sink = RecordingSink::new();
    let app = create_test_app(sink.clone(), LoggerConfig::default());
    let server = Arc::new(axum_test::TestServer::new(app).unwrap());

    // Send multiple concurrent requests using futures
    use futures::future::join_all;

    let futures: Vec<_> = (0..5)
        .map(|i| {
            let server = server.clone();
            async move { server.post("/echo").text(format!("Request {i}")).await }
        })
        .collect();

    let responses = join_all(futures).await;

    for (i, response) in responses.iter().enumerate() {
        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(response.text(), format!("Request {i}"));
    }

    let mut logged: Vec<String> = sink
        .requests()
        .into_iter()
        .map(|record| record.content.to_string())
        .collect();
    logged.sort();
    let expected: Vec<String> = (0..5).map(|i| format!("Request {i}")).collect();
    assert_eq!(logged, expected);
    assert_eq!(sink.responses().len(), 5);
}
