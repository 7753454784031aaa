//! Response body capturer.
//!
//! Logs one [`EventId::RESPONSE_INFO`] record per response produced by the inner service.
//! How the body is captured depends on the configured [`CaptureStrategy`]; either way the
//! transport receives exactly the bytes the handler produced.

use axum::extract::Request;
use axum::response::Response;
use futures::future::BoxFuture;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::{debug, instrument};

use crate::body_wrapper::{buffer_body, create_body_capture_stream};
use crate::content_type::{is_event_stream, is_grpc_request, is_loggable};
use crate::headers::format_headers;
use crate::types::{content_length, content_type, Captured, ExchangeInfo, LogRecord};
use crate::{CaptureStrategy, EventId, LogSink, LoggerConfig, Shared};

/// Tower layer for the response capturer.
///
/// # Examples
///
/// ```rust,no_run
/// use axum::{routing::get, Router};
/// use http_body_logger::{CaptureStrategy, LoggerConfig, ResponseLoggerLayer, TracingSink};
///
/// # async fn hello() -> &'static str { "Hello" }
/// let config = LoggerConfig::default().with_strategy(CaptureStrategy::Streaming);
/// let app: Router = Router::new()
///     .route("/hello", get(hello))
///     .layer(ResponseLoggerLayer::new(config, TracingSink));
/// ```
#[derive(Clone)]
pub struct ResponseLoggerLayer {
    shared: Shared,
}

impl ResponseLoggerLayer {
    pub fn new<K: LogSink>(config: LoggerConfig, sink: K) -> Self {
        Self {
            shared: Shared::new(config, sink),
        }
    }

    /// Use `pool` for scratch buffers instead of a pool private to this layer.
    pub fn with_pool(mut self, pool: crate::BufferPool) -> Self {
        self.shared.pool = pool;
        self
    }
}

impl<S> Layer<S> for ResponseLoggerLayer {
    type Service = ResponseLoggerService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ResponseLoggerService::from_shared(inner, self.shared.clone())
    }
}

/// Tower service logging each response of the inner service.
///
/// Users typically don't interact with this type directly - it's created by
/// [`ResponseLoggerLayer`] or [`HttpLoggerLayer`](crate::HttpLoggerLayer).
#[derive(Clone)]
pub struct ResponseLoggerService<S> {
    inner: S,
    shared: Shared,
}

impl<S> ResponseLoggerService<S> {
    pub(crate) fn from_shared(inner: S, shared: Shared) -> Self {
        Self { inner, shared }
    }
}

impl<S> Service<Request> for ResponseLoggerService<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
    S::Error: 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    #[instrument(skip_all)]
    fn call(&mut self, request: Request) -> Self::Future {
        if !self.shared.is_enabled(EventId::RESPONSE_INFO) {
            return Box::pin(self.inner.call(request));
        }

        let exchange = ExchangeInfo::from_request(&request, &self.shared.config.default_scheme);
        let grpc = is_grpc_request(request.version(), request.headers());
        let shared = self.shared.clone();

        debug!(method = %exchange.method, path = %exchange.path, "Forwarding request");
        let future = self.inner.call(request);

        Box::pin(async move {
            let response = future.await?;
            Ok(log_response(shared, exchange, grpc, response).await)
        })
    }
}

async fn log_response(
    shared: Shared,
    exchange: ExchangeInfo,
    grpc: bool,
    response: Response,
) -> Response {
    let status = response.status();
    let content_type = content_type(response.headers());
    let content_length = content_length(response.headers(), response.body());
    let headers = format_headers(response.headers());

    let record = {
        let content_type = content_type.clone();
        move |content| LogRecord {
            exchange,
            status: Some(status),
            content_type,
            content_length,
            headers,
            content,
        }
    };

    if grpc || is_event_stream(content_type.as_deref()) {
        debug!(content_type = ?content_type, "Streaming exchange, skipping body capture");
        shared.emit(&record(Captured::Streaming { content_type }));
        return response;
    }

    if !is_loggable(content_type.as_deref()) {
        shared.emit(&record(Captured::Unsupported { content_type }));
        return response;
    }

    let limit = shared.config.max_capture_bytes;
    let (parts, body) = response.into_parts();
    match shared.config.strategy {
        CaptureStrategy::Buffered => {
            let (body, captured) = buffer_body(body, &shared.pool, limit).await;
            shared.emit(&record(Captured::from_capture(captured, content_type)));
            Response::from_parts(parts, body)
        }
        CaptureStrategy::Streaming => {
            let (body, capture_future) =
                create_body_capture_stream(body, shared.pool.clone(), limit);

            // Outlives the response: resolves once the transport is done with the body
            tokio::spawn(async move {
                let captured = capture_future.await;
                shared.emit(&record(Captured::from_capture(captured, content_type)));
            });

            Response::from_parts(parts, body)
        }
    }
}
