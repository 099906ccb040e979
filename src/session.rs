//! Acquisition session life-cycle.
//!
//! A session ties the pipeline together:
//!
//! ```text
//!  serial ──▶ LinkReader ──▶ HandoffQueue ──▶ FrameParser ──▶ ChannelStore
//!  (thread "link-reader")              (thread "frame-parser")      │   ▲
//!                                                 LabelCell ────────┘   │
//!                                     (thread "stimulus", optional)     │
//!                                                      Visualizer ◀─────┘ (live reads)
//! ```
//!
//! Start-up order: the link is opened first (a [`DaqError::Connection`] aborts before anything
//! else happens), then the session directory is allocated, then the parser and reader
//! threads start.
//!
//! Shutdown order in [`AcquisitionSession::stop`]:
//! 1. raise the stop signal
//! 2. join the reader; its current read returns within one read timeout, and it closes the
//!    queue on exit
//! 3. join the stimulus thread, if any
//! 4. close the serial connection
//! 5. join the parser once it has drained the queue
//! 6. render the snapshot and export the session

use crate::config::Settings;
use crate::error::{AppResult, DaqError};
use crate::label::{LabelCell, StimulusController, StimulusDisplay, StimulusTiming};
use crate::link::{LineSource, LinkReader, LinkReport};
use crate::parser::{FrameParser, ParserStats};
use crate::queue::HandoffQueue;
use crate::recorder::{ArtifactNames, ExportedArtifacts, RunMetadata, SessionRecorder, Visualizer};
use crate::shutdown::StopSignal;
use crate::store::ChannelStore;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{error, info, warn};

/// What a finished session produced.
#[derive(Debug)]
pub struct SessionSummary {
    /// Directory the artifacts were written to
    pub session_dir: PathBuf,
    /// Frames applied to the store
    pub accepted: u64,
    /// Frames dropped for a wrong field count
    pub arity_dropped: u64,
    /// Frames dropped for a non-integer field
    pub parse_dropped: u64,
    /// Frames the reader queued; 0 when the reader panicked
    pub frames_queued: u64,
    /// Failure that ended ingestion early, if any. A panicked reader shows up here as
    /// [`DaqError::ThreadPanicked`].
    pub link_error: Option<DaqError>,
    /// Metadata written to the info file
    pub metadata: RunMetadata,
    /// Paths of the written artifacts
    pub artifacts: ExportedArtifacts,
}

/// A running acquisition.
pub struct AcquisitionSession<S: LineSource + 'static> {
    settings: Settings,
    store: Arc<ChannelStore>,
    queue: Arc<HandoffQueue>,
    labels: LabelCell,
    stop: StopSignal,
    stats: Arc<ParserStats>,
    recorder: Option<SessionRecorder>,
    reader: Option<JoinHandle<(S, LinkReport)>>,
    parser: Option<JoinHandle<Arc<ParserStats>>>,
    stimulus: Option<JoinHandle<u64>>,
    started_at: DateTime<Local>,
    started: Instant,
}

#[cfg(feature = "instrument_serial")]
impl AcquisitionSession<crate::link::SerialLineSource> {
    /// Open the configured serial port and start a session on it.
    pub fn open(settings: Settings, labels: LabelCell) -> AppResult<Self> {
        settings.validate()?;
        let source = crate::link::open_serial(&settings.serial)?;
        Self::start(settings, source, labels)
    }
}

impl<S: LineSource + 'static> AcquisitionSession<S> {
    /// Start a session over an already opened line source.
    pub fn start(settings: Settings, source: S, labels: LabelCell) -> AppResult<Self> {
        settings.validate()?;

        let acq = &settings.acquisition;
        let store = Arc::new(ChannelStore::new(acq.num_channels, acq.window_size));
        let recorder = SessionRecorder::allocate(&settings.storage.save_dir, Arc::clone(&store))?
            .with_names(ArtifactNames {
                table_file: settings.storage.table_file.clone(),
                info_file: settings.storage.info_file.clone(),
            });

        let queue = Arc::new(HandoffQueue::new());
        let stop = StopSignal::new();

        let parser = FrameParser::new(
            Arc::clone(&queue),
            Arc::clone(&store),
            Arc::new(labels.clone()),
            acq.delimiter.clone(),
        )
        .with_idle_wait(acq.idle_poll());
        let stats = parser.stats();
        let parser = parser.spawn()?;

        let reader = LinkReader::new(source, Arc::clone(&queue), stop.clone())
            .with_settle_lines(settings.serial.settle_lines)
            .spawn();
        let reader = match reader {
            Ok(handle) => handle,
            Err(e) => {
                queue.close();
                let _ = parser.join();
                return Err(e.into());
            }
        };

        info!(
            path = %recorder.dir().display(),
            channels = acq.num_channels,
            window = acq.window_size,
            "Session started"
        );

        Ok(Self {
            settings,
            store,
            queue,
            labels,
            stop,
            stats,
            recorder: Some(recorder),
            reader: Some(reader),
            parser: Some(parser),
            stimulus: None,
            started_at: Local::now(),
            started: Instant::now(),
        })
    }

    /// Start the stimulus controller on its own thread, driving this session's labels.
    pub fn start_stimulus<D: StimulusDisplay + 'static>(&mut self, display: D) -> AppResult<()> {
        if self.stimulus.is_some() {
            warn!("Stimulus controller already running");
            return Ok(());
        }
        let config = &self.settings.stimulus;
        let controller = StimulusController::new(
            self.labels.clone(),
            display,
            StimulusTiming::from(config),
            config.idle_label.clone(),
            self.stop.clone(),
        );
        self.stimulus = Some(controller.spawn()?);
        Ok(())
    }

    /// Live store, for visualizers.
    pub fn store(&self) -> Arc<ChannelStore> {
        Arc::clone(&self.store)
    }

    /// Label cell sampled for every accepted frame.
    pub fn labels(&self) -> LabelCell {
        self.labels.clone()
    }

    /// Live parser counters.
    pub fn stats(&self) -> Arc<ParserStats> {
        Arc::clone(&self.stats)
    }

    /// Frames read but not yet parsed.
    pub fn backlog(&self) -> usize {
        self.queue.len()
    }

    /// Directory this session exports into.
    pub fn session_dir(&self) -> Option<&Path> {
        self.recorder.as_ref().map(SessionRecorder::dir)
    }

    /// Whether the reader has exited on its own (after a link failure).
    pub fn reader_finished(&self) -> bool {
        self.reader.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Standard run metadata for this session so far.
    pub fn run_metadata(&self) -> RunMetadata {
        let acq = &self.settings.acquisition;
        let elapsed = self.started.elapsed();
        RunMetadata::new()
            .with("SAMPLES", format!("{} samples/s", acq.sample_rate_hz))
            .with("BAUD", self.settings.serial.baud_rate)
            .with("Electrodes", acq.num_channels)
            .with("Labels", format!("[{}]", acq.labels().join(", ")))
            .with(
                "Start time",
                self.started_at.format("%Y-%m-%d %H:%M:%S%.6f"),
            )
            .with("Run time (ns)", elapsed.as_nanos())
            .with("Run time (s)", elapsed.as_secs_f64())
            .with("Samples", self.store.len())
            .with("Dropped frames", self.stats.dropped())
    }

    /// Stop ingestion and export the session.
    ///
    /// `extra` entries are written after the standard metadata.
    pub fn stop(mut self, visualizer: &dyn Visualizer, extra: RunMetadata) -> AppResult<SessionSummary> {
        self.stop.stop();

        let reader = self.reader.take().map(JoinHandle::join);
        // normally already closed by the reader; a panicked reader leaves it open
        self.queue.close();
        let (source, report) = match reader {
            Some(Ok((source, report))) => (Some(source), report),
            Some(Err(_)) => {
                error!("Link reader thread panicked, exporting what was accepted");
                let report = LinkReport {
                    error: Some(DaqError::ThreadPanicked("link reader")),
                    ..LinkReport::default()
                };
                (None, report)
            }
            None => (None, LinkReport::default()),
        };

        if let Some(handle) = self.stimulus.take() {
            match handle.join() {
                Ok(published) => info!(published, "Stimulus thread joined"),
                Err(_) => warn!("Stimulus thread panicked"),
            }
        }

        drop(source);
        info!("Disconnected");

        // the reader closed the queue, so this returns once the backlog is parsed
        if let Some(handle) = self.parser.take() {
            handle
                .join()
                .map_err(|_| DaqError::ThreadPanicked("frame parser"))?;
        }

        let mut metadata = self.run_metadata();
        metadata.extend(&extra);

        let recorder = self
            .recorder
            .take()
            .ok_or_else(|| DaqError::Configuration("session already closed".into()))?;
        let snapshot = visualizer.snapshot(&self.store.windows());
        let artifacts = recorder.close(&snapshot, &metadata)?;

        Ok(SessionSummary {
            session_dir: artifacts.dir.clone(),
            accepted: self.stats.accepted(),
            arity_dropped: self.stats.arity_dropped(),
            parse_dropped: self.stats.parse_dropped(),
            frames_queued: report.frames_queued,
            link_error: report.error,
            metadata,
            artifacts,
        })
    }
}

impl<S: LineSource + 'static> Drop for AcquisitionSession<S> {
    fn drop(&mut self) {
        if self.reader.is_some() || self.stimulus.is_some() {
            warn!("Session dropped without stop(), signalling threads to exit");
            self.stop.stop();
        }
    }
}

impl<S: LineSource + 'static> std::fmt::Debug for AcquisitionSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquisitionSession")
            .field("session_dir", &self.session_dir())
            .field("store", &self.store)
            .field("stopped", &self.stop.is_stopped())
            .finish()
    }
}
