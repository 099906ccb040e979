//! Link reader: the producer side of the pipeline.
//!
//! The reader owns the serial connection, performs one blocking line read at a time and
//! pushes every complete line into the [`HandoffQueue`]. The port's read timeout bounds each
//! read, and therefore bounds how long the reader takes to notice the stop signal.
//!
//! The first `settle_lines` complete lines after the port opens are discarded, since devices
//! commonly emit a partial or banner line right after reset.

use crate::config::SerialConfig;
use crate::error::{AppResult, DaqError};
use crate::queue::{Frame, HandoffQueue};
use crate::shutdown::StopSignal;
use std::io::{BufRead, ErrorKind};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, trace};

/// Outcome of one blocking read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRead {
    /// A complete line, including its terminator
    Line(Vec<u8>),
    /// The read timed out before a full line arrived
    Timeout,
}

/// A line-oriented byte source.
///
/// Implementations return [`LineRead::Timeout`] when the per-read timeout expires, and an
/// error only for hard failures after which the link is unusable.
pub trait LineSource: Send {
    /// Block for at most one read timeout and return the next complete line.
    fn read_line(&mut self) -> AppResult<LineRead>;
}

/// [`LineSource`] over any buffered reader.
///
/// Bytes of a line that straddles a timeout are kept and completed by the next read.
pub struct ReaderLineSource<R> {
    reader: R,
    pending: Vec<u8>,
}

impl<R: BufRead + Send> ReaderLineSource<R> {
    /// Wrap a buffered reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            pending: Vec::new(),
        }
    }

    /// Give back the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: BufRead + Send> LineSource for ReaderLineSource<R> {
    fn read_line(&mut self) -> AppResult<LineRead> {
        loop {
            match self.reader.read_until(b'\n', &mut self.pending) {
                Ok(0) if self.pending.is_empty() => {
                    return Err(DaqError::Link("unexpected end of stream".into()));
                }
                // a trailing line without terminator is still a line
                Ok(_) => return Ok(LineRead::Line(std::mem::take(&mut self.pending))),
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    return Ok(LineRead::Timeout);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(DaqError::Link(e.to_string())),
            }
        }
    }
}

/// Line source over an open serial port.
#[cfg(feature = "instrument_serial")]
pub type SerialLineSource = ReaderLineSource<std::io::BufReader<Box<dyn serialport::SerialPort>>>;

/// Open the configured serial port.
///
/// # Errors
///
/// [`DaqError::Connection`] if the device cannot be opened. There is no retry.
#[cfg(feature = "instrument_serial")]
pub fn open_serial(config: &SerialConfig) -> AppResult<SerialLineSource> {
    info!(
        port = %config.port,
        baud_rate = config.baud_rate,
        "Trying to connect to serial port"
    );
    let port = serialport::new(&config.port, config.baud_rate)
        .timeout(config.read_timeout())
        .flow_control(serialport::FlowControl::None)
        .open()
        .map_err(|e| DaqError::Connection {
            port: config.port.clone(),
            baud_rate: config.baud_rate,
            reason: e.to_string(),
        })?;
    info!(port = %config.port, baud_rate = config.baud_rate, "Connected");
    Ok(ReaderLineSource::new(std::io::BufReader::new(port)))
}

/// Serial support is compiled out; always fails.
#[cfg(not(feature = "instrument_serial"))]
pub fn open_serial(_config: &SerialConfig) -> AppResult<ReaderLineSource<std::io::Empty>> {
    Err(DaqError::FeatureNotEnabled("instrument_serial".to_string()))
}

/// Counters reported by a finished reader.
#[derive(Debug, Default)]
pub struct LinkReport {
    /// Frames pushed to the queue
    pub frames_queued: u64,
    /// Lines discarded while the device settled
    pub settle_discarded: usize,
    /// Reads that timed out
    pub timeouts: u64,
    /// Hard failure that ended the loop, if any
    pub error: Option<DaqError>,
}

/// Producer thread body: reads lines and queues them until stopped.
pub struct LinkReader<S: LineSource> {
    source: S,
    queue: Arc<HandoffQueue>,
    stop: StopSignal,
    settle_lines: usize,
}

impl<S: LineSource + 'static> LinkReader<S> {
    /// Reader over `source` pushing into `queue`, stopping on `stop`.
    pub fn new(source: S, queue: Arc<HandoffQueue>, stop: StopSignal) -> Self {
        Self {
            source,
            queue,
            stop,
            settle_lines: 2,
        }
    }

    /// Number of complete lines to discard before queuing frames.
    pub fn with_settle_lines(mut self, settle_lines: usize) -> Self {
        self.settle_lines = settle_lines;
        self
    }

    /// Read until the stop signal is raised or the link fails.
    ///
    /// The queue is closed on exit, so the parser finishes once it has drained the backlog.
    /// The source is handed back so the caller decides when the connection closes.
    pub fn run(mut self) -> (S, LinkReport) {
        let mut report = LinkReport::default();
        info!(settle_lines = self.settle_lines, "Link reader started");

        while !self.stop.is_stopped() {
            match self.source.read_line() {
                Ok(LineRead::Line(line)) => {
                    if report.settle_discarded < self.settle_lines {
                        report.settle_discarded += 1;
                        debug!(len = line.len(), "Discarded settle line");
                        continue;
                    }
                    trace!(seq = report.frames_queued, len = line.len(), "Frame queued");
                    self.queue.push(Frame::new(report.frames_queued, line));
                    report.frames_queued += 1;
                }
                Ok(LineRead::Timeout) => {
                    report.timeouts += 1;
                }
                Err(err) => {
                    error!(error = %err, "Link read failed, reader stopping");
                    report.error = Some(err);
                    break;
                }
            }
        }

        self.queue.close();
        info!(
            frames = report.frames_queued,
            timeouts = report.timeouts,
            "Link reader stopped"
        );
        (self.source, report)
    }

    /// Run on a dedicated named thread.
    pub fn spawn(self) -> std::io::Result<JoinHandle<(S, LinkReport)>> {
        thread::Builder::new()
            .name("link-reader".into())
            .spawn(move || self.run())
    }
}
