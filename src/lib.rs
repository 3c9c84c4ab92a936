//! Public API for the `meterwire` library.
//!
//! This crate provides the frame extraction and field decoding engine for a
//! power meter's serial telemetry: a marker-delimited frame splitter, a
//! pattern-addressed field decoder, and a dispatch loop forwarding decoded
//! readings to a measurement sink.

pub mod codec;
pub mod dispatch;
pub mod error;
pub mod fields;
pub mod metrics;
pub mod sink;
pub mod source;

pub use codec::{DEFAULT_MAX_FRAME_LENGTH, FRAME_DELIMITER, FrameSplitter};
pub use dispatch::{DispatchConfig, Dispatcher};
pub use error::MeterError;
pub use fields::{DEFAULT_FIELDS, FieldError, FieldMap, FieldSpec, ValueWidth, decode_fields};
pub use sink::{MeasurementSink, SinkConfig, SinkError, UdpLineSink, encode_line};
pub use source::{ChunkSource, ReadOutcome, TimedReader};
