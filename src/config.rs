//! Configuration System using Figment
//!
//! Settings are assembled from three layers, later layers overriding earlier ones:
//! 1. built-in defaults ([`Settings::default`])
//! 2. a TOML file (missing files are skipped)
//! 3. environment variables prefixed with `SERIAL_DAQ_`, nested with `__`
//!
//! All values are read once at startup. Nothing is reconfigured while a session runs.
//!
//! # Example
//! ```no_run
//! use serial_daq::config::Settings;
//!
//! let settings = Settings::load_from("config/serial_daq.toml")?;
//! settings.validate()?;
//! println!("Port: {}", settings.serial.port);
//! # Ok::<(), serial_daq::error::DaqError>(())
//! ```
//!
//! Environment override example: `SERIAL_DAQ_SERIAL__BAUD_RATE=1000000`.

use crate::error::{AppResult, DaqError};
use crate::validation;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "SERIAL_DAQ_";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Application settings
    pub application: ApplicationConfig,
    /// Serial link settings
    pub serial: SerialConfig,
    /// Frame layout and live window settings
    pub acquisition: AcquisitionConfig,
    /// Session output settings
    pub storage: StorageConfig,
    /// Stimulus controller settings
    pub stimulus: StimulusConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    pub log_format: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

/// Serial link configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SerialConfig {
    /// Port identifier (e.g. "/dev/ttyUSB0", "COM6")
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Upper bound on a single blocking read, and therefore on shutdown latency
    pub read_timeout_ms: u64,
    /// Lines discarded right after the port opens while the device settles
    pub settle_lines: usize,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 38_400,
            read_timeout_ms: 1000,
            settle_lines: 2,
        }
    }
}

impl SerialConfig {
    /// Read timeout as a [`Duration`].
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Frame layout and buffering configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Number of integer fields carried by every frame
    pub num_channels: usize,
    /// Capacity of each channel's live window
    pub window_size: usize,
    /// Field delimiter inside a frame
    pub delimiter: String,
    /// Nominal device sample rate, recorded in the session metadata
    pub sample_rate_hz: u32,
    /// Display names for the channels; empty means "0".."N-1"
    pub channel_labels: Vec<String>,
    /// Upper bound on how long the parser waits on an empty queue before re-checking
    pub idle_poll_ms: u64,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            num_channels: 3,
            window_size: 100,
            delimiter: ",".to_string(),
            sample_rate_hz: 500,
            channel_labels: Vec::new(),
            idle_poll_ms: 2,
        }
    }
}

impl AcquisitionConfig {
    /// Channel labels, falling back to the channel index when none are configured.
    pub fn labels(&self) -> Vec<String> {
        if self.channel_labels.is_empty() {
            (0..self.num_channels).map(|i| i.to_string()).collect()
        } else {
            self.channel_labels.clone()
        }
    }

    /// Parser idle wait as a [`Duration`].
    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }
}

/// Session output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Base directory holding the numbered session directories
    pub save_dir: PathBuf,
    /// File name of the channel table inside a session directory
    pub table_file: String,
    /// File name of the metadata text file inside a session directory
    pub info_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            save_dir: PathBuf::from("runs"),
            table_file: "csvData.csv".to_string(),
            info_file: "info.txt".to_string(),
        }
    }
}

/// Stimulus controller configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StimulusConfig {
    /// Start the stimulus thread together with the session
    pub enabled: bool,
    /// Blank interval before each stimulus
    pub pause_ms: u64,
    /// Time from showing a stimulus until the next blank interval
    pub delay_ms: u64,
    /// Time between showing a stimulus and publishing it as the label
    pub reveal_ms: u64,
    /// Label published while no stimulus is shown
    pub idle_label: String,
}

impl Default for StimulusConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            pause_ms: 2000,
            delay_ms: 5000,
            reveal_ms: 500,
            idle_label: "-1".to_string(),
        }
    }
}

impl Settings {
    /// Load configuration from defaults and environment variables only.
    pub fn load() -> AppResult<Self> {
        Ok(Self::figment().extract()?)
    }

    /// Load configuration from a specific TOML file plus environment variables.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Ok(Self::figment_with_file(path.as_ref()).extract()?)
    }

    fn figment() -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    fn figment_with_file(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let invalid = |field: &str, reason: &str| {
            DaqError::Configuration(format!("{field}: {reason}"))
        };

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            )));
        }

        validation::is_not_empty(&self.serial.port).map_err(|e| invalid("serial.port", e))?;
        if self.serial.baud_rate == 0 {
            return Err(invalid("serial.baud_rate", "must be greater than 0"));
        }
        if self.serial.read_timeout_ms == 0 {
            return Err(invalid("serial.read_timeout_ms", "must be greater than 0"));
        }

        let acq = &self.acquisition;
        validation::is_in_range(acq.num_channels, 1..=usize::MAX)
            .map_err(|e| invalid("acquisition.num_channels", e))?;
        validation::is_in_range(acq.window_size, 1..=usize::MAX)
            .map_err(|e| invalid("acquisition.window_size", e))?;
        validation::is_valid_delimiter(&acq.delimiter)
            .map_err(|e| invalid("acquisition.delimiter", e))?;
        if !acq.channel_labels.is_empty() && acq.channel_labels.len() != acq.num_channels {
            return Err(DaqError::Configuration(format!(
                "acquisition.channel_labels: expected {} labels, got {}",
                acq.num_channels,
                acq.channel_labels.len()
            )));
        }

        validation::is_valid_path(&self.storage.save_dir.to_string_lossy())
            .map_err(|e| invalid("storage.save_dir", e))?;
        validation::is_not_empty(&self.storage.table_file)
            .map_err(|e| invalid("storage.table_file", e))?;
        validation::is_not_empty(&self.storage.info_file)
            .map_err(|e| invalid("storage.info_file", e))?;

        if self.stimulus.reveal_ms > self.stimulus.delay_ms {
            return Err(invalid(
                "stimulus.reveal_ms",
                "must not exceed stimulus.delay_ms",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.acquisition.delimiter, ",");
        assert_eq!(settings.serial.settle_lines, 2);
        assert_eq!(settings.acquisition.labels(), vec!["0", "1", "2"]);
    }

    #[test]
    #[serial]
    fn test_load_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [serial]
            port = "COM6"
            baud_rate = 1000000

            [acquisition]
            num_channels = 16
            window_size = 300
            "#
        )
        .unwrap();

        let settings = Settings::load_from(file.path()).unwrap();
        assert_eq!(settings.serial.port, "COM6");
        assert_eq!(settings.serial.baud_rate, 1_000_000);
        assert_eq!(settings.acquisition.num_channels, 16);
        assert_eq!(settings.acquisition.window_size, 300);
        // untouched sections keep their defaults
        assert_eq!(settings.storage.save_dir, PathBuf::from("runs"));
        assert!(settings.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_missing_file_falls_back_to_defaults() {
        let settings = Settings::load_from("does/not/exist.toml").unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    #[serial]
    fn test_env_overrides_defaults() {
        std::env::set_var("SERIAL_DAQ_SERIAL__BAUD_RATE", "115200");
        let result = Settings::load();
        std::env::remove_var("SERIAL_DAQ_SERIAL__BAUD_RATE");

        assert_eq!(result.unwrap().serial.baud_rate, 115_200);
    }

    #[test]
    fn test_invalid_log_level() {
        let mut settings = Settings::default();
        settings.application.log_level = "loud".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_zero_channels_rejected() {
        let mut settings = Settings::default();
        settings.acquisition.num_channels = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_zero_window_rejected() {
        let mut settings = Settings::default();
        settings.acquisition.window_size = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_label_count_must_match_channels() {
        let mut settings = Settings::default();
        settings.acquisition.channel_labels = vec!["a".into(), "b".into()];
        assert!(settings.validate().is_err());

        settings.acquisition.channel_labels.push("c".into());
        assert!(settings.validate().is_ok());
        assert_eq!(settings.acquisition.labels(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_tab_delimiter_accepted() {
        let mut settings = Settings::default();
        settings.acquisition.delimiter = "\t".to_string();
        assert!(settings.validate().is_ok());
        assert_eq!(
            crate::parser::parse_frame(b"1\t2\t3\n", &settings.acquisition.delimiter, 3).unwrap(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_line_break_delimiter_rejected() {
        let mut settings = Settings::default();
        settings.acquisition.delimiter = "\r\n".to_string();
        assert!(settings.validate().is_err());
        settings.acquisition.delimiter = String::new();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_reveal_longer_than_delay_rejected() {
        let mut settings = Settings::default();
        settings.stimulus.reveal_ms = 6000;
        assert!(settings.validate().is_err());
    }
}
