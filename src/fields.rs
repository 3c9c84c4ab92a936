//! Field extraction from decoded frames.
//!
//! A frame carries no structure of its own; the static [`FieldSpec`] table
//! imposes one. Each descriptor names a byte pattern, an offset past the
//! pattern where a big-endian integer starts, the integer's width, and a
//! divisor scaling it to a physical unit. Decoding is best effort per field:
//! a value region running past the frame end skips that field only, and a
//! frame matching no descriptor yields an empty map, which is a valid
//! "nothing usable here" outcome rather than an error.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::warn;

/// Decoded, scaled readings of one frame, keyed by quantity name.
pub type FieldMap = BTreeMap<&'static str, f64>;

/// Width of an encoded field value.
///
/// The meter encodes values as unsigned big-endian integers of exactly four
/// or eight bytes; other widths are unrepresentable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueWidth {
    /// Four-byte unsigned big-endian integer.
    U32,
    /// Eight-byte unsigned big-endian integer.
    U64,
}

impl ValueWidth {
    /// Size of the encoded value in bytes.
    #[must_use]
    pub const fn byte_len(self) -> usize {
        match self {
            Self::U32 => 4,
            Self::U64 => 8,
        }
    }
}

/// Per-field decode failure, recovered by skipping the field.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FieldError {
    /// The value region computed for a matched pattern runs past the end of
    /// the frame.
    #[error("field {name}: value region {start}..{end} exceeds frame length {frame_len}")]
    OutOfBounds {
        /// Name of the affected field.
        name: &'static str,
        /// First byte of the value region.
        start: usize,
        /// One past the last byte of the value region.
        end: usize,
        /// Length of the frame being decoded.
        frame_len: usize,
    },
}

/// Static descriptor locating one quantity's encoded value within a frame.
#[derive(Clone, Copy, Debug)]
pub struct FieldSpec {
    /// Quantity name used as the field key.
    pub name: &'static str,
    /// Byte sequence marking where the encoded value begins, relative to the
    /// pattern's own end.
    pub pattern: &'static [u8],
    /// Bytes between the end of the pattern and the start of the value.
    pub value_offset: usize,
    /// Width of the encoded value.
    pub width: ValueWidth,
    /// Scale factor dividing the decoded integer into a physical quantity.
    pub divisor: f64,
}

/// Descriptor table for the deployed household meter.
pub const DEFAULT_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "power",
        pattern: &[0x07, 0x01, 0x00, 0x10, 0x07, 0x00],
        value_offset: 8,
        width: ValueWidth::U32,
        divisor: 1.0,
    },
    FieldSpec {
        name: "total",
        pattern: &[0x07, 0x01, 0x00, 0x01, 0x08, 0x00],
        value_offset: 12,
        width: ValueWidth::U64,
        divisor: 10_000.0,
    },
];

impl FieldSpec {
    /// Extract this field's scaled value from `frame`.
    ///
    /// Returns `Ok(None)` when the pattern is absent, or present only at
    /// offset zero. The pattern is expected after some header bytes; a match
    /// flush at the start of the frame is treated as "not present".
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::OutOfBounds`] if the value region computed from
    /// the match runs past the frame end.
    pub fn extract(&self, frame: &[u8]) -> Result<Option<f64>, FieldError> {
        let Some(index) = find_pattern(frame, self.pattern) else {
            return Ok(None);
        };
        if index == 0 {
            return Ok(None);
        }
        let start = index + self.pattern.len() + self.value_offset;
        let end = start + self.width.byte_len();
        let Some(region) = frame.get(start..end) else {
            return Err(FieldError::OutOfBounds {
                name: self.name,
                start,
                end,
                frame_len: frame.len(),
            });
        };
        Ok(Some(self.scale(read_be(region, self.width))))
    }

    #[allow(clippy::cast_precision_loss)]
    fn scale(&self, raw: u64) -> f64 { raw as f64 / self.divisor }
}

fn find_pattern(frame: &[u8], pattern: &[u8]) -> Option<usize> {
    if pattern.is_empty() {
        return None;
    }
    frame.windows(pattern.len()).position(|window| window == pattern)
}

fn read_be(region: &[u8], width: ValueWidth) -> u64 {
    // `region` is exactly `width.byte_len()` bytes.
    match width {
        ValueWidth::U32 => u64::from(u32::from_be_bytes(
            <[u8; 4]>::try_from(region).unwrap_or_default(),
        )),
        ValueWidth::U64 => u64::from_be_bytes(<[u8; 8]>::try_from(region).unwrap_or_default()),
    }
}

/// Decode `frame` against every descriptor in `specs`.
///
/// Descriptors are applied in table order; a failing descriptor is skipped
/// with a warning and does not affect the others.
#[must_use]
pub fn decode_fields(frame: &[u8], specs: &[FieldSpec]) -> FieldMap {
    let mut fields = FieldMap::new();
    for spec in specs {
        match spec.extract(frame) {
            Ok(Some(value)) => {
                fields.insert(spec.name, value);
            }
            Ok(None) => {}
            Err(err) => {
                crate::metrics::inc_field_errors();
                warn!(error = %err, field = spec.name, "skipping undecodable field");
            }
        }
    }
    fields
}
