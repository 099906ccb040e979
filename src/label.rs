//! Frame labels: the shared label cell and the stimulus controller that drives it.
//!
//! The parser samples [`LabelSource::current`] once per accepted frame. Alignment is
//! best-effort: the recorded label is whatever value was set most recently, with no
//! synchronization to the moment the stimulus actually changed.

use crate::config::StimulusConfig;
use crate::shutdown::StopSignal;
use crate::store::Label;
use parking_lot::RwLock;
use rand::Rng;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info};

/// Supplies the label recorded with each accepted frame.
pub trait LabelSource: Send + Sync {
    /// Latest externally set label. Must not block.
    fn current(&self) -> Label;
}

/// Shared, thread-safe label cell.
///
/// Clones share the same value. Any thread may [`set`](LabelCell::set) it at any time.
#[derive(Clone, Debug)]
pub struct LabelCell {
    value: Arc<RwLock<Label>>,
}

impl LabelCell {
    /// Cell holding `initial` until the first [`set`](Self::set).
    pub fn new(initial: impl Into<Label>) -> Self {
        Self {
            value: Arc::new(RwLock::new(initial.into())),
        }
    }

    /// Replace the current label.
    pub fn set(&self, label: impl Into<Label>) {
        *self.value.write() = label.into();
    }
}

impl Default for LabelCell {
    fn default() -> Self {
        Self::new("-1")
    }
}

impl LabelSource for LabelCell {
    fn current(&self) -> Label {
        self.value.read().clone()
    }
}

/// Presentation side of the stimulus controller.
///
/// Implementations draw the stimulus for the subject. They are called from the stimulus
/// thread and should return quickly.
pub trait StimulusDisplay: Send {
    /// Show an empty screen.
    fn blank(&mut self);
    /// Show the given stimulus.
    fn show(&mut self, stimulus: &str);
}

/// Display that only logs what would be shown.
#[derive(Debug, Default)]
pub struct LogDisplay;

impl StimulusDisplay for LogDisplay {
    fn blank(&mut self) {
        debug!("Stimulus display blank");
    }

    fn show(&mut self, stimulus: &str) {
        info!(stimulus, "Stimulus shown");
    }
}

/// Timing of one stimulus cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StimulusTiming {
    /// Blank interval before each stimulus
    pub pause: Duration,
    /// Time from showing a stimulus until the next blank interval
    pub delay: Duration,
    /// Time between showing a stimulus and publishing it as the label
    pub reveal: Duration,
}

impl From<&StimulusConfig> for StimulusTiming {
    fn from(config: &StimulusConfig) -> Self {
        Self {
            pause: Duration::from_millis(config.pause_ms),
            delay: Duration::from_millis(config.delay_ms),
            reveal: Duration::from_millis(config.reveal_ms),
        }
    }
}

/// Presents random digits and publishes each one as the current label.
///
/// One cycle:
/// 1. publish the idle label and blank the display, wait `pause`
/// 2. draw a digit 0..=9 and show it, wait `reveal`
/// 3. publish the digit as the label, wait `delay - reveal`
///
/// Every wait returns early when the stop signal is raised.
pub struct StimulusController<D: StimulusDisplay> {
    labels: LabelCell,
    display: D,
    timing: StimulusTiming,
    idle_label: Label,
    stop: StopSignal,
}

impl<D: StimulusDisplay + 'static> StimulusController<D> {
    /// Controller publishing into `labels`, drawing on `display`, until `stop` is raised.
    pub fn new(
        labels: LabelCell,
        display: D,
        timing: StimulusTiming,
        idle_label: impl Into<Label>,
        stop: StopSignal,
    ) -> Self {
        Self {
            labels,
            display,
            timing,
            idle_label: idle_label.into(),
            stop,
        }
    }

    /// Run cycles on the calling thread until the stop signal is raised.
    ///
    /// Returns the number of stimuli published.
    pub fn run(mut self) -> u64 {
        let mut rng = rand::thread_rng();
        let mut published = 0u64;
        let hold = self.timing.delay.saturating_sub(self.timing.reveal);
        info!("Stimulus controller started");

        while !self.stop.is_stopped() {
            self.labels.set(self.idle_label.clone());
            self.display.blank();
            if self.stop.wait_timeout(self.timing.pause) {
                break;
            }

            let digit = rng.gen_range(0..=9u8).to_string();
            self.display.show(&digit);
            if self.stop.wait_timeout(self.timing.reveal) {
                break;
            }

            self.labels.set(digit);
            published += 1;
            if self.stop.wait_timeout(hold) {
                break;
            }
        }

        info!(published, "Stimulus controller stopped");
        published
    }

    /// Run on a dedicated named thread.
    pub fn spawn(self) -> std::io::Result<JoinHandle<u64>> {
        thread::Builder::new()
            .name("stimulus".into())
            .spawn(move || self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Clone, Default)]
    struct RecordingDisplay {
        events: Arc<Mutex<Vec<String>>>,
    }

    impl StimulusDisplay for RecordingDisplay {
        fn blank(&mut self) {
            self.events.lock().push("blank".into());
        }

        fn show(&mut self, stimulus: &str) {
            self.events.lock().push(stimulus.to_string());
        }
    }

    fn fast_timing() -> StimulusTiming {
        StimulusTiming {
            pause: Duration::from_millis(2),
            delay: Duration::from_millis(6),
            reveal: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_label_cell_shares_value() {
        let cell = LabelCell::default();
        let reader = cell.clone();
        assert_eq!(reader.current(), "-1");
        cell.set("left");
        assert_eq!(reader.current(), "left");
    }

    #[test]
    fn test_stimulus_config_conversion() {
        let timing = StimulusTiming::from(&StimulusConfig::default());
        assert_eq!(timing.pause, Duration::from_millis(2000));
        assert_eq!(timing.delay, Duration::from_millis(5000));
        assert_eq!(timing.reveal, Duration::from_millis(500));
    }

    #[test]
    fn test_controller_publishes_digits_and_stops() {
        let labels = LabelCell::default();
        let display = RecordingDisplay::default();
        let events = Arc::clone(&display.events);
        let stop = StopSignal::new();

        let handle = StimulusController::new(
            labels.clone(),
            display,
            fast_timing(),
            "-1",
            stop.clone(),
        )
        .spawn()
        .unwrap();

        thread::sleep(Duration::from_millis(60));
        stop.stop();
        let published = handle.join().unwrap();

        assert!(published > 0);
        let events = events.lock();
        assert_eq!(events.first().map(String::as_str), Some("blank"));
        for shown in events.iter().filter(|e| *e != "blank") {
            let digit: u8 = shown.parse().unwrap();
            assert!(digit <= 9);
        }
        let last = labels.current();
        assert!(last == "-1" || last.parse::<u8>().is_ok());
    }

    #[test]
    fn test_controller_exits_promptly_on_stop() {
        let stop = StopSignal::new();
        let timing = StimulusTiming {
            pause: Duration::from_secs(30),
            delay: Duration::from_secs(30),
            reveal: Duration::from_secs(1),
        };
        let handle = StimulusController::new(
            LabelCell::default(),
            LogDisplay,
            timing,
            "-1",
            stop.clone(),
        )
        .spawn()
        .unwrap();

        let start = std::time::Instant::now();
        stop.stop();
        assert_eq!(handle.join().unwrap(), 0);
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
