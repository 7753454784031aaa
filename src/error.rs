//! Errors raised while capturing a body.
//!
//! None of these ever reach the caller: the capturers turn them into a
//! placeholder [`Captured`](crate::types::Captured) and keep forwarding.

use thiserror::Error;

/// Error type for body capture operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// The underlying body stream failed mid-read
    #[error("body stream error: {0}")]
    Body(String),
    /// The body grew past the configured capture limit
    #[error("body exceeds the capture limit of {limit} bytes")]
    LimitExceeded { limit: usize },
    /// The body was dropped before its last frame, e.g. the client went away
    #[error("body dropped before completion")]
    Incomplete,
}
