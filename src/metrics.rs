//! Metric helpers for `meterwire`.
//!
//! This module defines metric names and simple helper functions
//! wrapping the [`metrics`](https://docs.rs/metrics) crate.

use metrics::counter;

/// Name of the counter tracking frames produced by the splitter.
pub const FRAMES_SPLIT: &str = "meterwire_frames_split_total";
/// Name of the counter tracking fields decoded from frames.
pub const FIELDS_DECODED: &str = "meterwire_fields_decoded_total";
/// Name of the counter tracking per-field decode failures.
pub const FIELD_ERRORS: &str = "meterwire_field_errors_total";
/// Name of the counter tracking measurements forwarded to the sink.
pub const SINK_FORWARDS: &str = "meterwire_sink_forwards_total";
/// Name of the counter tracking failed sink forwards.
pub const SINK_ERRORS: &str = "meterwire_sink_errors_total";

/// Record a frame emitted by the splitter.
pub fn inc_frames_split() { counter!(FRAMES_SPLIT).increment(1); }

/// Record `count` fields decoded from one frame.
pub fn inc_fields_decoded(count: usize) { counter!(FIELDS_DECODED).increment(count as u64); }

/// Record a field skipped due to a decode failure.
pub fn inc_field_errors() { counter!(FIELD_ERRORS).increment(1); }

/// Record a measurement forwarded to the sink.
pub fn inc_sink_forwards() { counter!(SINK_FORWARDS).increment(1); }

/// Record a failed sink forward.
pub fn inc_sink_errors() { counter!(SINK_ERRORS).increment(1); }
