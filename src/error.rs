//! Canonical error type for the crate.
//!
//! Only unrecoverable conditions surface here: a failing input stream or a
//! frame outgrowing the splitter's buffer. Per-field decode failures are
//! recovered locally (see [`crate::fields::FieldError`]) and sink forward
//! failures are logged by the dispatch loop without aborting it (see
//! [`crate::sink::SinkError`]).

use std::io;

use thiserror::Error;

/// Fatal errors terminating a dispatch session.
#[derive(Debug, Error)]
pub enum MeterError {
    /// The input stream failed to open or read.
    #[error("input stream error: {0}")]
    Io(#[from] io::Error),

    /// A frame grew past the splitter's configured maximum, violating the
    /// framing assumptions for the stream.
    #[error("frame exceeds max length: {size} > {max}")]
    OversizedFrame {
        /// Bytes buffered or framed when the limit was hit.
        size: usize,
        /// Configured maximum frame length.
        max: usize,
    },
}

impl MeterError {
    /// Returns the error category as a string for logging and metrics.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::OversizedFrame { .. } => "framing",
        }
    }
}
