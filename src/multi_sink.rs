//! Composite sink for sending records to several destinations.
//!
//! This module provides [`MultiSink`], a sink that fans every record out to an arbitrary number
//! of [`LogSink`] implementations.
//!
//! # Example
//!
//! ```rust
//! use http_body_logger::{HttpLoggerLayer, LoggerConfig, MultiSink, TracingSink};
//!
//! // Create a composite sink
//! let sink = MultiSink::new().with(TracingSink);
//!
//! let layer = HttpLoggerLayer::new(LoggerConfig::default(), sink);
//! ```

use std::sync::Arc;
use tracing::Level;

use crate::{EventId, LogRecord, LogSink};

/// A sink that delegates to multiple inner sinks.
///
/// The composite is enabled for a level as soon as one member is, and each record is only
/// handed to the members that are enabled for it.
///
/// # Thread Safety
///
/// `MultiSink` is `Send + Sync` and can be safely shared across threads.
/// Each inner sink is wrapped in an `Arc` for efficient cloning.
#[derive(Clone, Default)]
pub struct MultiSink {
    sinks: Vec<Arc<dyn LogSink>>,
}

impl MultiSink {
    /// Create a new empty MultiSink.
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    /// Add a sink to the chain. Returns self for builder pattern.
    ///
    /// # Example
    ///
    /// ```rust
    /// use http_body_logger::{MultiSink, TracingSink};
    ///
    /// let sink = MultiSink::new()
    ///     .with(TracingSink);
    /// ```
    pub fn with<K: LogSink>(mut self, sink: K) -> Self {
        self.sinks.push(Arc::new(sink));
        self
    }

    /// Returns true if no sinks have been added.
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Returns the number of sinks in the chain.
    pub fn len(&self) -> usize {
        self.sinks.len()
    }
}

impl LogSink for MultiSink {
    fn is_enabled(&self, level: Level, event: EventId) -> bool {
        self.sinks.iter().any(|sink| sink.is_enabled(level, event))
    }

    fn log(&self, level: Level, event: EventId, record: &LogRecord) {
        for sink in &self.sinks {
            if sink.is_enabled(level, event) {
                sink.log(level, event, record);
            }
        }
    }
}
