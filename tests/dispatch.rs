//! End-to-end dispatch coverage over scripted in-memory streams.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use bytes::BytesMut;
use meterwire::{
    DEFAULT_FIELDS,
    DispatchConfig,
    Dispatcher,
    FRAME_DELIMITER,
    FieldMap,
    FrameSplitter,
    MeasurementSink,
    MeterError,
    ReadOutcome,
    SinkError,
    TimedReader,
};

/// One scripted read of the input collaborator.
enum Script {
    Chunk(Vec<u8>),
    Timeout,
    Fail,
}

struct ScriptedSource {
    events: VecDeque<Script>,
}

impl ScriptedSource {
    fn new(events: impl IntoIterator<Item = Script>) -> Self {
        Self {
            events: events.into_iter().collect(),
        }
    }
}

#[async_trait]
impl meterwire::ChunkSource for ScriptedSource {
    async fn read_chunk(&mut self, buf: &mut BytesMut) -> io::Result<ReadOutcome> {
        match self.events.pop_front() {
            Some(Script::Chunk(bytes)) => {
                buf.extend_from_slice(&bytes);
                Ok(ReadOutcome::Data(bytes.len()))
            }
            Some(Script::Timeout) => Ok(ReadOutcome::TimedOut),
            Some(Script::Fail) => Err(io::Error::other("device unplugged")),
            None => Ok(ReadOutcome::EndOfStream),
        }
    }
}

/// Sink recording every forward, optionally failing the first `fail_first`
/// attempts.
#[derive(Clone, Default)]
struct RecordingSink {
    forwards: Arc<Mutex<Vec<(FieldMap, SystemTime)>>>,
    attempts: Arc<AtomicUsize>,
    fail_first: usize,
}

impl RecordingSink {
    fn failing_first(count: usize) -> Self {
        Self {
            fail_first: count,
            ..Self::default()
        }
    }

    fn recorded(&self) -> Vec<FieldMap> {
        self.forwards
            .lock()
            .expect("sink mutex poisoned")
            .iter()
            .map(|(fields, _)| fields.clone())
            .collect()
    }
}

#[async_trait]
impl MeasurementSink for RecordingSink {
    async fn forward(&self, fields: &FieldMap, timestamp: SystemTime) -> Result<(), SinkError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_first {
            return Err(SinkError::Io(io::Error::other("sink unavailable")));
        }
        self.forwards
            .lock()
            .expect("sink mutex poisoned")
            .push((fields.clone(), timestamp));
        Ok(())
    }
}

/// Frame carrying a power reading of `watts`, pattern at a non-zero offset.
fn power_frame(watts: u32) -> Vec<u8> {
    let mut frame = vec![0x76, 0x05, 0x01, 0x62, 0x00];
    frame.extend_from_slice(&[0x07, 0x01, 0x00, 0x10, 0x07, 0x00]);
    frame.extend_from_slice(&[0x00; 8]);
    frame.extend_from_slice(&watts.to_be_bytes());
    frame
}

fn dispatcher(sink: RecordingSink, max_in_flight: usize) -> Dispatcher<RecordingSink> {
    Dispatcher::new(
        sink,
        DEFAULT_FIELDS,
        FrameSplitter::default(),
        DispatchConfig { max_in_flight },
    )
}

#[tokio::test]
async fn forwards_each_decoded_frame() {
    let mut stream = power_frame(300);
    stream.extend_from_slice(&FRAME_DELIMITER);
    stream.extend_from_slice(&power_frame(450));

    let sink = RecordingSink::default();
    let source = ScriptedSource::new([Script::Chunk(stream)]);
    dispatcher(sink.clone(), 4)
        .run(source)
        .await
        .expect("dispatch should complete");

    let mut readings: Vec<f64> = sink
        .recorded()
        .iter()
        .map(|fields| fields["power"])
        .collect();
    readings.sort_by(f64::total_cmp);
    assert_eq!(readings, vec![300.0, 450.0]);
}

#[tokio::test]
async fn frames_without_fields_are_not_forwarded() {
    let mut stream = vec![0x00, 0x11, 0x22];
    stream.extend_from_slice(&FRAME_DELIMITER);
    stream.extend_from_slice(&[0x33, 0x44]);

    let sink = RecordingSink::default();
    let source = ScriptedSource::new([Script::Chunk(stream)]);
    dispatcher(sink.clone(), 4)
        .run(source)
        .await
        .expect("dispatch should complete");

    assert!(sink.recorded().is_empty());
    assert_eq!(sink.attempts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn sink_failure_does_not_halt_later_frames() {
    let mut stream = power_frame(100);
    stream.extend_from_slice(&FRAME_DELIMITER);
    stream.extend_from_slice(&power_frame(200));

    // Serialise frame tasks so the failure deterministically hits the first
    // forward.
    let sink = RecordingSink::failing_first(1);
    let source = ScriptedSource::new([Script::Chunk(stream)]);
    dispatcher(sink.clone(), 1)
        .run(source)
        .await
        .expect("sink failures must not abort the loop");

    let recorded = sink.recorded();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0]["power"], 200.0);
    assert_eq!(sink.attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn timeouts_suspend_without_flushing_partial_frames() {
    let frame = power_frame(300);
    let (head, tail) = frame.split_at(7);
    let mut terminated_tail = tail.to_vec();
    terminated_tail.extend_from_slice(&FRAME_DELIMITER);

    let sink = RecordingSink::default();
    let source = ScriptedSource::new([
        Script::Chunk(head.to_vec()),
        Script::Timeout,
        Script::Timeout,
        Script::Chunk(terminated_tail),
    ]);
    dispatcher(sink.clone(), 4)
        .run(source)
        .await
        .expect("dispatch should complete");

    let recorded = sink.recorded();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0]["power"], 300.0);
}

#[tokio::test]
async fn trailing_unterminated_frame_is_forwarded_at_end_of_stream() {
    let sink = RecordingSink::default();
    let source = ScriptedSource::new([Script::Chunk(power_frame(750))]);
    dispatcher(sink.clone(), 4)
        .run(source)
        .await
        .expect("dispatch should complete");

    let recorded = sink.recorded();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0]["power"], 750.0);
}

#[tokio::test]
async fn stream_error_is_fatal() {
    let sink = RecordingSink::default();
    let source = ScriptedSource::new([Script::Chunk(power_frame(300)), Script::Fail]);

    let err = dispatcher(sink, 4)
        .run(source)
        .await
        .expect_err("read failure must be fatal");
    assert!(matches!(err, MeterError::Io(_)));
}

#[tokio::test]
async fn oversized_frame_is_fatal_but_drains_in_flight_work() {
    let mut stream = power_frame(300);
    stream.extend_from_slice(&FRAME_DELIMITER);
    stream.extend_from_slice(&[0x00; 96]);

    let sink = RecordingSink::default();
    let source = ScriptedSource::new([Script::Chunk(stream)]);
    let dispatcher = Dispatcher::new(
        sink.clone(),
        DEFAULT_FIELDS,
        FrameSplitter::new(64),
        DispatchConfig { max_in_flight: 1 },
    );

    let err = dispatcher
        .run(source)
        .await
        .expect_err("oversized frame must be fatal");
    assert!(matches!(err, MeterError::OversizedFrame { max: 64, .. }));
    // The frame split off before the failure was still processed.
    assert_eq!(sink.recorded().len(), 1);
}

#[tokio::test]
async fn timed_reader_end_to_end() {
    let mut stream = power_frame(300);
    stream.extend_from_slice(&FRAME_DELIMITER);

    let sink = RecordingSink::default();
    let source = TimedReader::new(io::Cursor::new(stream), Some(Duration::from_secs(3)));
    dispatcher(sink.clone(), 4)
        .run(source)
        .await
        .expect("dispatch should complete");

    assert_eq!(sink.recorded().len(), 1);
}
