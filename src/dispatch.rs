//! Dispatch loop driving the splitter and fanning frames out to workers.
//!
//! One long-lived pull task reads chunks from a [`ChunkSource`] and feeds
//! them through the [`FrameSplitter`]. Every emitted frame is handed to its
//! own spawned task, which decodes the frame and forwards any non-empty
//! result to the sink. Frame tasks run concurrently with each other and with
//! the pull loop, with no ordering guarantee between their completions; a
//! failing frame never halts the loop. In-flight tasks are capped by a
//! semaphore so bursty input cannot grow an unbounded task set.

use std::sync::Arc;
use std::time::SystemTime;

use bytes::{Bytes, BytesMut};
use tokio::sync::Semaphore;
use tokio_util::codec::Decoder;
use tokio_util::task::TaskTracker;
use tracing::{debug, trace, warn};

use crate::codec::FrameSplitter;
use crate::error::MeterError;
use crate::fields::{FieldSpec, decode_fields};
use crate::sink::MeasurementSink;
use crate::source::{ChunkSource, ReadOutcome};

const READ_BUFFER_CAPACITY: usize = 2 * 1024;

/// Tunables for the dispatch loop.
#[derive(Clone, Copy, Debug)]
pub struct DispatchConfig {
    /// Maximum number of concurrently processed frames.
    pub max_in_flight: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self { Self { max_in_flight: 8 } }
}

/// Drives a [`ChunkSource`] to completion, forwarding decoded frames.
pub struct Dispatcher<S> {
    sink: Arc<S>,
    specs: &'static [FieldSpec],
    splitter: FrameSplitter,
    limit: Arc<Semaphore>,
}

impl<S> Dispatcher<S>
where
    S: MeasurementSink + 'static,
{
    /// Assemble a dispatcher from its collaborators.
    #[must_use]
    pub fn new(
        sink: S,
        specs: &'static [FieldSpec],
        splitter: FrameSplitter,
        config: DispatchConfig,
    ) -> Self {
        Self {
            sink: Arc::new(sink),
            specs,
            splitter,
            limit: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
        }
    }

    /// Run until the source reaches end-of-stream or a fatal error occurs.
    ///
    /// In-flight frame tasks are drained before returning, in both the
    /// success and the failure case.
    ///
    /// # Errors
    ///
    /// Returns a [`MeterError`] if the source fails to read or a frame
    /// exceeds the splitter's maximum length. Per-frame decode and forward
    /// failures are logged and do not surface here.
    pub async fn run<C: ChunkSource>(mut self, mut source: C) -> Result<(), MeterError> {
        let tracker = TaskTracker::new();
        let mut buf = BytesMut::with_capacity(READ_BUFFER_CAPACITY);
        let result = self.pump(&mut source, &mut buf, &tracker).await;
        tracker.close();
        tracker.wait().await;
        result
    }

    async fn pump<C: ChunkSource>(
        &mut self,
        source: &mut C,
        buf: &mut BytesMut,
        tracker: &TaskTracker,
    ) -> Result<(), MeterError> {
        loop {
            match source.read_chunk(buf).await? {
                ReadOutcome::Data(n) => {
                    trace!(bytes = n, buffered = buf.len(), "read chunk");
                    self.drain(buf, tracker, false).await?;
                }
                ReadOutcome::TimedOut => trace!("read timed out, stream still open"),
                ReadOutcome::EndOfStream => {
                    debug!("input stream ended");
                    self.drain(buf, tracker, true).await?;
                    return Ok(());
                }
            }
        }
    }

    /// Emit every frame currently decodable from `buf`.
    async fn drain(
        &mut self,
        buf: &mut BytesMut,
        tracker: &TaskTracker,
        at_eof: bool,
    ) -> Result<(), MeterError> {
        loop {
            let frame = if at_eof {
                self.splitter.decode_eof(buf)?
            } else {
                self.splitter.decode(buf)?
            };
            let Some(frame) = frame else { return Ok(()) };
            crate::metrics::inc_frames_split();
            self.spawn_frame_task(frame, tracker).await;
        }
    }

    async fn spawn_frame_task(&self, frame: Bytes, tracker: &TaskTracker) {
        // Acquired before spawning, so a burst of frames back-pressures the
        // pull loop instead of growing the task set.
        let permit = match Arc::clone(&self.limit).acquire_owned().await {
            Ok(permit) => permit,
            // The semaphore lives as long as the dispatcher and is never
            // closed.
            Err(_) => return,
        };
        let sink = Arc::clone(&self.sink);
        let specs = self.specs;
        tracker.spawn(async move {
            let _permit = permit;
            process_frame(&frame, specs, sink.as_ref()).await;
        });
    }
}

async fn process_frame<S: MeasurementSink>(frame: &Bytes, specs: &[FieldSpec], sink: &S) {
    let fields = decode_fields(frame, specs);
    debug!(frame_len = frame.len(), ?fields, "decoded frame");
    if fields.is_empty() {
        return;
    }
    crate::metrics::inc_fields_decoded(fields.len());
    let timestamp = SystemTime::now();
    match sink.forward(&fields, timestamp).await {
        Ok(()) => crate::metrics::inc_sink_forwards(),
        Err(err) => {
            crate::metrics::inc_sink_errors();
            warn!(error = %err, "failed to forward measurement");
        }
    }
}
