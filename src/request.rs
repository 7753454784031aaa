//! Request body capturer.
//!
//! Logs one [`EventId::REQUEST_INFO`] record per request, then forwards the request with its
//! body intact.

use axum::extract::Request;
use futures::future::BoxFuture;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::{debug, instrument};

use crate::body_wrapper::buffer_body;
use crate::content_type::is_loggable;
use crate::headers::format_headers;
use crate::types::{content_length, content_type, Captured, EventId, ExchangeInfo, LogRecord};
use crate::{LogSink, LoggerConfig, Shared};

/// Tower layer for the request capturer.
///
/// # Examples
///
/// ```rust,no_run
/// use axum::{routing::post, Router};
/// use http_body_logger::{LoggerConfig, RequestLoggerLayer, TracingSink};
///
/// # async fn echo(body: String) -> String { body }
/// let app: Router = Router::new()
///     .route("/echo", post(echo))
///     .layer(RequestLoggerLayer::new(LoggerConfig::default(), TracingSink));
/// ```
#[derive(Clone)]
pub struct RequestLoggerLayer {
    shared: Shared,
}

impl RequestLoggerLayer {
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

impl<S> Layer<S> for RequestLoggerLayer {
    type Service = RequestLoggerService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLoggerService::from_shared(inner, self.shared.clone())
    }
}

/// Tower service logging each request before handing it to the inner service.
///
/// Users typically don't interact with this type directly - it's created by
/// [`RequestLoggerLayer`] or [`HttpLoggerLayer`](crate::HttpLoggerLayer).
#[derive(Clone)]
pub struct RequestLoggerService<S> {
    inner: S,
    shared: Shared,
}

impl<S> RequestLoggerService<S> {
    pub(crate) fn from_shared(inner: S, shared: Shared) -> Self {
        Self { inner, shared }
    }
}

impl<S> Service<Request> for RequestLoggerService<S>
where
    S: Service<Request> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: 'static,
    S::Error: 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    #[instrument(skip_all)]
    fn call(&mut self, request: Request) -> Self::Future {
        if !self.shared.is_enabled(EventId::REQUEST_INFO) {
            return Box::pin(self.inner.call(request));
        }

        // The body is read before the inner service is called, so take the service that was
        // driven to readiness and leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let shared = self.shared.clone();

        Box::pin(async move {
            let request = log_request(&shared, request).await;
            inner.call(request).await
        })
    }
}

async fn log_request(shared: &Shared, request: Request) -> Request {
    let exchange = ExchangeInfo::from_request(&request, &shared.config.default_scheme);
    let content_type = content_type(request.headers());
    let content_length = content_length(request.headers(), request.body());
    let headers = format_headers(request.headers());

    let (parts, body) = request.into_parts();
    let (body, content) = if is_loggable(content_type.as_deref()) {
        debug!(content_type = ?content_type, "Capturing request body");
        let (body, captured) =
            buffer_body(body, &shared.pool, shared.config.max_capture_bytes).await;
        (body, Captured::from_capture(captured, content_type.clone()))
    } else {
        (
            body,
            Captured::Unsupported {
                content_type: content_type.clone(),
            },
        )
    };

    shared.emit(&LogRecord {
        exchange,
        status: None,
        content_type,
        content_length,
        headers,
        content,
    });

    Request::from_parts(parts, body)
}
