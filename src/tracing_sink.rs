//! [`LogSink`] backed by the `tracing` crate.
//!
//! This is the sink most applications want: records become `tracing` events that whatever
//! subscriber the application installed (fmt, JSON, OpenTelemetry, ...) formats and ships.

use tracing::Level;

use crate::{EventId, LogRecord, LogSink};

/// Target of request records.
pub const REQUEST_TARGET: &str = "http_body_logger::request";
/// Target of response records.
pub const RESPONSE_TARGET: &str = "http_body_logger::response";

/// Emits each record as a `tracing` event.
///
/// Requests go to the [`REQUEST_TARGET`] target and responses to [`RESPONSE_TARGET`], so
/// either can be filtered independently, e.g. `RUST_LOG=http_body_logger::response=info`.
///
/// The event message is the rendered record (see [`LogRecord`]); its parts are also attached
/// as structured fields:
/// - `event_id` / `event_name`
/// - `protocol`, `method`, `scheme`, `host`, `path_base`, `path`, `query`
/// - `status` (responses only), `content_type`, `content_length`
/// - `headers`, `content`
///
/// # Examples
///
/// ```rust,no_run
/// use http_body_logger::{HttpLoggerLayer, LoggerConfig, TracingSink};
///
/// let layer = HttpLoggerLayer::new(LoggerConfig::default(), TracingSink);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

// `tracing` needs the target and level of a callsite at compile time.
macro_rules! event_at {
    ($target:expr, $level:expr, $event:expr, $record:expr) => {
        tracing::event!(
            target: $target,
            $level,
            event_id = $event.id,
            event_name = $event.name,
            protocol = %$record.exchange.protocol_name(),
            method = %$record.exchange.method,
            scheme = %$record.exchange.scheme,
            host = %$record.exchange.host,
            path_base = %$record.exchange.path_base,
            path = %$record.exchange.path,
            query = %$record.exchange.query,
            status = $record.status.map(|status| status.as_u16()),
            content_type = $record.content_type.as_deref(),
            content_length = $record.content_length,
            headers = %$record.headers,
            content = %$record.content,
            "{}",
            $record
        )
    };
}

macro_rules! event_with_level {
    ($target:expr, $level:expr, $event:expr, $record:expr) => {
        match $level {
            Level::TRACE => event_at!($target, Level::TRACE, $event, $record),
            Level::DEBUG => event_at!($target, Level::DEBUG, $event, $record),
            Level::INFO => event_at!($target, Level::INFO, $event, $record),
            Level::WARN => event_at!($target, Level::WARN, $event, $record),
            _ => event_at!($target, Level::ERROR, $event, $record),
        }
    };
}

macro_rules! enabled_with_level {
    ($target:expr, $level:expr) => {
        match $level {
            Level::TRACE => tracing::enabled!(target: $target, Level::TRACE),
            Level::DEBUG => tracing::enabled!(target: $target, Level::DEBUG),
            Level::INFO => tracing::enabled!(target: $target, Level::INFO),
            Level::WARN => tracing::enabled!(target: $target, Level::WARN),
            _ => tracing::enabled!(target: $target, Level::ERROR),
        }
    };
}

impl LogSink for TracingSink {
    fn is_enabled(&self, level: Level, event: EventId) -> bool {
        if event == EventId::RESPONSE_INFO {
            enabled_with_level!(RESPONSE_TARGET, level)
        } else {
            enabled_with_level!(REQUEST_TARGET, level)
        }
    }

    fn log(&self, level: Level, event: EventId, record: &LogRecord) {
        if event == EventId::RESPONSE_INFO {
            event_with_level!(RESPONSE_TARGET, level, event, record)
        } else {
            event_with_level!(REQUEST_TARGET, level, event, record)
        }
    }
}
