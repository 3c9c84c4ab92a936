//! Frame splitting for the meter's serial byte stream.
//!
//! The meter emits telemetry as opaque frames separated by a fixed 8-byte
//! marker. [`FrameSplitter`] implements [`tokio_util::codec::Decoder`] over a
//! growable [`BytesMut`] buffer: `decode` emits complete frames as bytes
//! arrive and `decode_eof` flushes a final unterminated frame once the stream
//! ends. The buffer is bounded; a frame growing past the configured maximum
//! is a fatal framing error, not a silently dropped frame.

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;

use crate::error::MeterError;

/// Marker sequence separating frames on the wire.
pub const FRAME_DELIMITER: [u8; 8] = [0x1b, 0x1b, 0x1b, 0x1b, 0x01, 0x01, 0x01, 0x01];

/// Default maximum frame length in bytes.
///
/// Sized for the meter's telegrams, which stay well under a few kilobytes.
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 4 * 1024;

// Invariant: only the first two delimiter bytes are consumed with the frame
// that precedes them. The remaining six stay at the head of the next segment
// and surface as a prefix of the following frame. Matched by the deployed
// meters; must not be normalised to the full marker width.
const DELIMITER_CONSUMED: usize = 2;

/// Splits an unbounded byte stream into delimiter-bounded frames.
///
/// Stateful across invocations: unconsumed bytes stay in the caller's
/// `BytesMut` between calls, so the splitter can be driven incrementally as
/// chunks arrive from the device.
#[derive(Clone, Debug)]
pub struct FrameSplitter {
    max_frame_length: usize,
}

impl FrameSplitter {
    /// Construct a splitter rejecting frames longer than `max_frame_length`.
    #[must_use]
    pub const fn new(max_frame_length: usize) -> Self { Self { max_frame_length } }

    /// Maximum frame length accepted by this splitter.
    #[must_use]
    pub const fn max_frame_length(&self) -> usize { self.max_frame_length }

    fn oversized(&self, size: usize) -> MeterError {
        MeterError::OversizedFrame {
            size,
            max: self.max_frame_length,
        }
    }
}

impl Default for FrameSplitter {
    fn default() -> Self { Self::new(DEFAULT_MAX_FRAME_LENGTH) }
}

fn find_delimiter(buf: &[u8]) -> Option<usize> {
    buf.windows(FRAME_DELIMITER.len())
        .position(|window| window == FRAME_DELIMITER)
}

impl Decoder for FrameSplitter {
    type Item = Bytes;
    type Error = MeterError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(index) = find_delimiter(src) {
            if index > self.max_frame_length {
                return Err(self.oversized(index));
            }
            let frame = src.split_to(index).freeze();
            src.advance(DELIMITER_CONSUMED);
            return Ok(Some(frame));
        }
        if src.len() > self.max_frame_length {
            return Err(self.oversized(src.len()));
        }
        // No complete frame yet; request more input.
        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if src.is_empty() {
            // Terminal condition: no more frames.
            return Ok(None);
        }
        // Final, non-delimited frame.
        let len = src.len();
        Ok(Some(src.split_to(len).freeze()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(bytes: &[u8]) -> BytesMut { BytesMut::from(bytes) }

    #[test]
    fn emits_frame_before_delimiter_and_advances_two_bytes() {
        let mut splitter = FrameSplitter::default();
        let mut src = buffer(&[
            0xaa, 0xbb, 0x1b, 0x1b, 0x1b, 0x1b, 0x01, 0x01, 0x01, 0x01, 0xcc, 0xdd,
        ]);

        let frame = splitter.decode(&mut src).expect("decode should succeed");
        assert_eq!(frame.as_deref(), Some(&[0xaa, 0xbb][..]));
        assert_eq!(&src[..], &[0x1b, 0x1b, 0x01, 0x01, 0x01, 0x01, 0xcc, 0xdd]);
    }

    #[test]
    fn requests_more_input_without_delimiter() {
        let mut splitter = FrameSplitter::default();
        let mut src = buffer(&[0x01, 0x02, 0x03]);

        let frame = splitter.decode(&mut src).expect("decode should succeed");
        assert!(frame.is_none());
        assert_eq!(src.len(), 3);
    }

    #[test]
    fn flushes_trailing_frame_at_eof() {
        let mut splitter = FrameSplitter::default();
        let mut src = buffer(&[0x10, 0x20, 0x30]);

        let frame = splitter
            .decode_eof(&mut src)
            .expect("decode_eof should succeed");
        assert_eq!(frame.as_deref(), Some(&[0x10, 0x20, 0x30][..]));
        assert!(src.is_empty());

        let end = splitter
            .decode_eof(&mut src)
            .expect("decode_eof should succeed");
        assert!(end.is_none());
    }

    #[test]
    fn empty_buffer_at_eof_is_terminal() {
        let mut splitter = FrameSplitter::default();
        let mut src = BytesMut::new();

        let frame = splitter
            .decode_eof(&mut src)
            .expect("decode_eof should succeed");
        assert!(frame.is_none());
    }

    #[test]
    fn rejects_oversized_frame() {
        let mut splitter = FrameSplitter::new(8);
        let mut src = buffer(&[0x55; 9]);

        let err = splitter
            .decode(&mut src)
            .expect_err("frame must be rejected");
        assert!(matches!(err, MeterError::OversizedFrame { size: 9, max: 8 }));
    }

    #[test]
    fn adjacent_delimiters_yield_empty_frame() {
        let mut splitter = FrameSplitter::default();
        let mut src = buffer(&FRAME_DELIMITER);

        let frame = splitter.decode(&mut src).expect("decode should succeed");
        assert_eq!(frame.as_deref(), Some(&[][..]));
        // Six marker bytes remain for the next segment.
        assert_eq!(&src[..], &[0x1b, 0x1b, 0x01, 0x01, 0x01, 0x01]);
    }
}
