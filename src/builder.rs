//! Registration entry points on [`tower::ServiceBuilder`].

use tower::layer::util::Stack;
use tower::ServiceBuilder;

use crate::{HttpLoggerLayer, LogSink, LoggerConfig, RequestLoggerLayer, ResponseLoggerLayer};

/// Extension methods installing the capturers on a [`ServiceBuilder`].
///
/// # Examples
///
/// ```rust
/// use axum::{body::Body, extract::Request, response::Response};
/// use http_body_logger::{LoggerConfig, ServiceBuilderExt, TracingSink};
/// use std::convert::Infallible;
/// use tower::{service_fn, ServiceBuilder};
///
/// let service = ServiceBuilder::new()
///     .http_logger(LoggerConfig::default(), TracingSink)
///     .service(service_fn(|_request: Request| async {
///         Ok::<_, Infallible>(Response::new(Body::from("ok")))
///     }));
/// ```
pub trait ServiceBuilderExt<L> {
    /// Log requests, then responses.
    fn http_logger<K: LogSink>(
        self,
        config: LoggerConfig,
        sink: K,
    ) -> ServiceBuilder<Stack<HttpLoggerLayer, L>>;

    /// Log requests only.
    fn request_logger<K: LogSink>(
        self,
        config: LoggerConfig,
        sink: K,
    ) -> ServiceBuilder<Stack<RequestLoggerLayer, L>>;

    /// Log responses only.
    fn response_logger<K: LogSink>(
        self,
        config: LoggerConfig,
        sink: K,
    ) -> ServiceBuilder<Stack<ResponseLoggerLayer, L>>;
}

impl<L> ServiceBuilderExt<L> for ServiceBuilder<L> {
    fn http_logger<K: LogSink>(
        self,
        config: LoggerConfig,
        sink: K,
    ) -> ServiceBuilder<Stack<HttpLoggerLayer, L>> {
        self.layer(HttpLoggerLayer::new(config, sink))
    }

    fn request_logger<K: LogSink>(
        self,
        config: LoggerConfig,
        sink: K,
    ) -> ServiceBuilder<Stack<RequestLoggerLayer, L>> {
        self.layer(RequestLoggerLayer::new(config, sink))
    }

    fn response_logger<K: LogSink>(
        self,
        config: LoggerConfig,
        sink: K,
    ) -> ServiceBuilder<Stack<ResponseLoggerLayer, L>> {
        self.layer(ResponseLoggerLayer::new(config, sink))
    }
}
