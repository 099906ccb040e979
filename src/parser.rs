//! Frame parser: turns raw lines into channel vectors and applies them to the store.
//!
//! Each frame is validated in order:
//!
//! 1. **Decode**: the bytes must be UTF-8 text. Surrounding whitespace, including the line
//!    terminator, is trimmed.
//! 2. **Arity**: splitting on the delimiter must yield exactly `num_channels` fields.
//! 3. **Parse**: every field must parse as a (possibly signed) decimal integer.
//!
//! A frame failing any step is dropped as a whole, a diagnostic is logged and the loop moves
//! on. Malformed lines are expected on a noisy link, so none of these failures stops
//! ingestion.

use crate::error::{AppResult, DaqError};
use crate::label::LabelSource;
use crate::queue::{Frame, HandoffQueue, Pop};
use crate::store::ChannelStore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Parse one raw line into exactly `num_channels` integers.
///
/// # Errors
///
/// - [`DaqError::FrameParse`] if the line is not UTF-8 or any field is not an integer
/// - [`DaqError::FrameArity`] if the field count differs from `num_channels`
///
/// # Example
/// ```
/// use serial_daq::parser::parse_frame;
///
/// assert_eq!(parse_frame(b"1,-2,3\r\n", ",", 3).unwrap(), vec![1, -2, 3]);
/// assert!(parse_frame(b"1,2\n", ",", 3).is_err());
/// ```
pub fn parse_frame(raw: &[u8], delimiter: &str, num_channels: usize) -> AppResult<Vec<i64>> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| DaqError::FrameParse(format!("frame is not valid UTF-8: {e}")))?;

    let fields: Vec<&str> = text.trim().split(delimiter).collect();
    if fields.len() != num_channels {
        return Err(DaqError::FrameArity {
            expected: num_channels,
            received: fields.len(),
        });
    }

    fields
        .iter()
        .enumerate()
        .map(|(index, field)| {
            field.trim().parse::<i64>().map_err(|e| {
                DaqError::FrameParse(format!("field {index} ('{field}'): {e}"))
            })
        })
        .collect()
}

/// Running counters kept by the parser.
#[derive(Debug, Default)]
pub struct ParserStats {
    accepted: AtomicU64,
    arity_dropped: AtomicU64,
    parse_dropped: AtomicU64,
}

impl ParserStats {
    /// Frames applied to the store.
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Frames dropped for a wrong field count.
    pub fn arity_dropped(&self) -> u64 {
        self.arity_dropped.load(Ordering::Relaxed)
    }

    /// Frames dropped for a field that is not an integer, or for bad UTF-8.
    pub fn parse_dropped(&self) -> u64 {
        self.parse_dropped.load(Ordering::Relaxed)
    }

    /// Frames discarded for any reason.
    pub fn dropped(&self) -> u64 {
        self.arity_dropped() + self.parse_dropped()
    }
}

/// Outcome of handling a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Applied to the store
    Accepted,
    /// Dropped for a wrong field count
    ArityDropped,
    /// Dropped for a field that did not parse
    ParseDropped,
}

/// Sole consumer of the handoff queue and sole writer of the channel store.
pub struct FrameParser {
    queue: Arc<HandoffQueue>,
    store: Arc<ChannelStore>,
    labels: Arc<dyn LabelSource>,
    delimiter: String,
    idle_wait: Duration,
    stats: Arc<ParserStats>,
}

impl FrameParser {
    /// Parser draining `queue` into `store`, labelling frames from `labels`.
    pub fn new(
        queue: Arc<HandoffQueue>,
        store: Arc<ChannelStore>,
        labels: Arc<dyn LabelSource>,
        delimiter: impl Into<String>,
    ) -> Self {
        Self {
            queue,
            store,
            labels,
            delimiter: delimiter.into(),
            idle_wait: Duration::from_millis(2),
            stats: Arc::new(ParserStats::default()),
        }
    }

    /// Set how long the parser blocks on an empty queue before re-checking.
    pub fn with_idle_wait(mut self, idle_wait: Duration) -> Self {
        self.idle_wait = idle_wait;
        self
    }

    /// Shared handle to the parser's counters.
    pub fn stats(&self) -> Arc<ParserStats> {
        Arc::clone(&self.stats)
    }

    /// Validate one frame and, if it is well formed, apply it to the store.
    pub fn handle(&self, frame: &Frame) -> FrameOutcome {
        let values = match parse_frame(&frame.data, &self.delimiter, self.store.num_channels()) {
            Ok(values) => values,
            Err(err) => return self.reject(frame, err),
        };

        let label = self.labels.current();
        match self.store.push(&values, label) {
            Ok(()) => {
                self.stats.accepted.fetch_add(1, Ordering::Relaxed);
                FrameOutcome::Accepted
            }
            Err(err) => self.reject(frame, err),
        }
    }

    fn reject(&self, frame: &Frame, err: DaqError) -> FrameOutcome {
        match err {
            DaqError::FrameArity { expected, received } => {
                warn!(
                    seq = frame.seq,
                    expected, received, "Received more or less fields than expected, frame dropped"
                );
                self.stats.arity_dropped.fetch_add(1, Ordering::Relaxed);
                FrameOutcome::ArityDropped
            }
            other => {
                warn!(seq = frame.seq, error = %other, "Parsing failed, frame dropped");
                self.stats.parse_dropped.fetch_add(1, Ordering::Relaxed);
                FrameOutcome::ParseDropped
            }
        }
    }

    /// Drain the queue until it is closed and empty.
    ///
    /// While the queue stays open the parser idles on it indefinitely.
    pub fn run(self) -> Arc<ParserStats> {
        info!("Frame parser started");
        loop {
            match self.queue.pop_timeout(self.idle_wait) {
                Pop::Frame(frame) => {
                    self.handle(&frame);
                }
                Pop::Empty => continue,
                Pop::Closed => break,
            }
        }
        debug!(backlog = self.queue.len(), "Queue closed and drained");
        info!(
            accepted = self.stats.accepted(),
            arity_dropped = self.stats.arity_dropped(),
            parse_dropped = self.stats.parse_dropped(),
            "Frame parser stopped"
        );
        self.stats
    }

    /// Run on a dedicated named thread.
    pub fn spawn(self) -> std::io::Result<JoinHandle<Arc<ParserStats>>> {
        thread::Builder::new()
            .name("frame-parser".into())
            .spawn(move || self.run())
    }
}
