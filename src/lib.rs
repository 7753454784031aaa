//! # http-body-logger
//!
//! Tower/Axum middleware that logs HTTP requests and responses, headers and textual bodies
//! included, through a pluggable [`LogSink`].
//!
//! ## Features
//!
//! - **Transparent**: captured bodies are replaced by byte-identical copies, handlers and the
//!   transport never see a difference
//! - **Content-type aware**: only `text/*`, `application/json`, `application/xml` and
//!   `application/x-www-form-urlencoded` bodies are decoded, everything else is left untouched
//! - **Cheap when off**: if the sink reports the configured level as disabled, requests go
//!   straight through with no buffering at all
//! - **Fail open**: a body that cannot be read, or a sink that panics, never fails the request
//! - **Stream aware**: gRPC over HTTP/2 and server-sent events are logged without their bodies
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use axum::{routing::post, Router};
//! use http_body_logger::{HttpLoggerLayer, LoggerConfig, TracingSink};
//!
//! async fn echo(body: String) -> String {
//!     body
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let app = Router::new()
//!         .route("/echo", post(echo))
//!         .layer(HttpLoggerLayer::new(LoggerConfig::default(), TracingSink));
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```
//!
//! With a [`tower::ServiceBuilder`], the [`ServiceBuilderExt`] entry points install both
//! capturers, or only one of them:
//!
//! ```rust
//! use http_body_logger::{LoggerConfig, ServiceBuilderExt, TracingSink};
//! use tower::ServiceBuilder;
//!
//! let requests_only = ServiceBuilder::new().request_logger(LoggerConfig::default(), TracingSink);
//! let responses_only = ServiceBuilder::new().response_logger(LoggerConfig::default(), TracingSink);
//! let both = ServiceBuilder::new().http_logger(LoggerConfig::default(), TracingSink);
//! ```
//!
//! ## Custom Sinks
//!
//! Implement [`LogSink`] to send records somewhere other than `tracing`:
//!
//! ```rust
//! use http_body_logger::{EventId, LogRecord, LogSink};
//! use tracing::Level;
//!
//! #[derive(Debug)]
//! struct StdoutSink;
//!
//! impl LogSink for StdoutSink {
//!     fn is_enabled(&self, level: Level, _event: EventId) -> bool {
//!         level <= Level::INFO
//!     }
//!
//!     fn log(&self, _level: Level, event: EventId, record: &LogRecord) {
//!         println!("[{event}] {record}");
//!     }
//! }
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tower::Layer;
use tracing::{error, Level};

pub mod body_wrapper;
pub mod builder;
pub mod content_type;
pub mod error;
pub mod headers;
pub mod multi_sink;
pub mod pool;
pub mod request;
pub mod response;
pub mod tracing_sink;
pub mod types;

pub use builder::ServiceBuilderExt;
pub use error::CaptureError;
pub use multi_sink::MultiSink;
pub use pool::{BufferPool, PooledBuffer};
pub use request::{RequestLoggerLayer, RequestLoggerService};
pub use response::{ResponseLoggerLayer, ResponseLoggerService};
pub use tracing_sink::TracingSink;
pub use types::{Captured, EventId, ExchangeInfo, LogRecord};

/// How the response capturer gets at the response body.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CaptureStrategy {
    /// Read the whole body before the response leaves the middleware, log, then hand a
    /// byte-identical copy to the transport. The record is emitted before the response is
    /// returned.
    #[default]
    Buffered,
    /// Return the response right away and copy chunks as the transport pulls them. The record
    /// is emitted from a background task once the body has been fully sent (or dropped).
    Streaming,
}

/// Configuration for the logging middleware.
///
/// # Examples
///
/// ```rust
/// use http_body_logger::{CaptureStrategy, LoggerConfig};
/// use tracing::Level;
///
/// // Default configuration
/// let config = LoggerConfig::default();
///
/// // Custom configuration
/// let config = LoggerConfig::default()
///     .with_level(Level::DEBUG)
///     .with_strategy(CaptureStrategy::Streaming)
///     .with_max_capture_bytes(64 * 1024);
/// ```
#[derive(Clone, Debug)]
pub struct LoggerConfig {
    /// Level records are emitted at; also the level checked for the bypass
    pub level: Level,
    /// Response capture strategy
    pub strategy: CaptureStrategy,
    /// Largest body that is decoded; bigger bodies are forwarded untouched and not logged.
    /// `None` captures bodies of any size.
    pub max_capture_bytes: Option<usize>,
    /// Scheme reported when the request URI is not absolute
    pub default_scheme: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            strategy: CaptureStrategy::Buffered,
            max_capture_bytes: None,
            default_scheme: "http".to_owned(),
        }
    }
}

impl LoggerConfig {
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_strategy(mut self, strategy: CaptureStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_max_capture_bytes(mut self, limit: usize) -> Self {
        self.max_capture_bytes = Some(limit);
        self
    }

    pub fn with_default_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.default_scheme = scheme.into();
        self
    }
}

/// Destination for captured records.
///
/// Sinks are shared by every exchange going through a layer, so they must be safe to call
/// concurrently.
pub trait LogSink: Send + Sync + 'static {
    /// Whether a record for `event` at `level` would be kept.
    ///
    /// Called before anything is captured: returning `false` turns the middleware into a
    /// plain pass-through for that exchange.
    fn is_enabled(&self, level: Level, event: EventId) -> bool;

    /// Emit one record.
    fn log(&self, level: Level, event: EventId, record: &LogRecord);
}

impl<T: LogSink + ?Sized> LogSink for Arc<T> {
    fn is_enabled(&self, level: Level, event: EventId) -> bool {
        (**self).is_enabled(level, event)
    }

    fn log(&self, level: Level, event: EventId, record: &LogRecord) {
        (**self).log(level, event, record)
    }
}

/// State shared by the capturers of one layer.
#[derive(Clone)]
pub(crate) struct Shared {
    pub(crate) config: Arc<LoggerConfig>,
    pub(crate) sink: Arc<dyn LogSink>,
    pub(crate) pool: BufferPool,
}

impl Shared {
    pub(crate) fn new<K: LogSink>(config: LoggerConfig, sink: K) -> Self {
        Self {
            config: Arc::new(config),
            sink: Arc::new(sink),
            pool: BufferPool::default(),
        }
    }

    pub(crate) fn is_enabled(&self, event: EventId) -> bool {
        self.sink.is_enabled(self.config.level, event)
    }

    /// Hand a record to the sink. A panicking sink loses the record, never the request.
    pub(crate) fn emit(&self, record: &LogRecord) {
        let event = record.event_id();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.sink.log(self.config.level, event, record)
        }));
        if outcome.is_err() {
            error!(event_id = event.id, "Log sink panicked, record dropped");
        }
    }
}

/// Tower layer installing both the request and the response capturer.
///
/// The request capturer runs first, the response capturer sits between it and the inner
/// service. Both share one sink and one [`BufferPool`].
///
/// # Examples
///
/// ```rust,no_run
/// use axum::{routing::get, Router};
/// use http_body_logger::{BufferPool, HttpLoggerLayer, LoggerConfig, TracingSink};
///
/// # async fn hello() -> &'static str { "Hello" }
/// let layer = HttpLoggerLayer::new(LoggerConfig::default(), TracingSink)
///     .with_pool(BufferPool::new(64, 16 * 1024));
///
/// let app: Router = Router::new().route("/hello", get(hello)).layer(layer);
/// ```
#[derive(Clone)]
pub struct HttpLoggerLayer {
    shared: Shared,
}

impl HttpLoggerLayer {
    pub fn new<K: LogSink>(config: LoggerConfig, sink: K) -> Self {
        Self {
            shared: Shared::new(config, sink),
        }
    }

    /// Use `pool` for scratch buffers instead of a pool private to this layer.
    pub fn with_pool(mut self, pool: BufferPool) -> Self {
        self.shared.pool = pool;
        self
    }
}

impl<S> Layer<S> for HttpLoggerLayer {
    type Service = RequestLoggerService<ResponseLoggerService<S>>;

    fn layer(&self, inner: S) -> Self::Service {
        let inner = ResponseLoggerService::from_shared(inner, self.shared.clone());
        RequestLoggerService::from_shared(inner, self.shared.clone())
    }
}
