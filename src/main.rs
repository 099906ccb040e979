//! CLI Entry Point for serial-daq
//!
//! Provides a command-line interface for:
//! - Recording a session from a serial device (`run`)
//! - Checking a configuration file (`check-config`)
//!
//! # Usage
//!
//! Record until Ctrl+C:
//! ```bash
//! serial-daq run --config config/serial_daq.toml --port /dev/ttyUSB0
//! ```
//!
//! Record for one minute with the stimulus controller running:
//! ```bash
//! serial-daq run --duration 60 --stimulus
//! ```
//!
//! While recording, every line typed on stdin becomes the current label.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serial_daq::config::Settings;
use serial_daq::logging;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "serial-daq")]
#[command(about = "Serial telemetry acquisition with session capture", long_about = None)]
struct Cli {
    /// Optional configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record one session
    Run {
        /// Serial port, overrides the configuration
        #[arg(long)]
        port: Option<String>,

        /// Baud rate, overrides the configuration
        #[arg(long)]
        baud: Option<u32>,

        /// Channel count, overrides the configuration
        #[arg(long)]
        channels: Option<usize>,

        /// Base directory for session directories, overrides the configuration
        #[arg(long)]
        save_dir: Option<PathBuf>,

        /// Stop automatically after this many seconds
        #[arg(long)]
        duration: Option<u64>,

        /// Start the stimulus controller
        #[arg(long)]
        stimulus: bool,
    },

    /// Load and validate the configuration, then print it
    CheckConfig,
}

fn load_settings(path: Option<&PathBuf>) -> Result<Settings> {
    let settings = match path {
        Some(path) => Settings::load_from(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Settings::load().context("Failed to load configuration")?,
    };
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = load_settings(cli.config.as_ref())?;

    match cli.command {
        Commands::Run {
            port,
            baud,
            channels,
            save_dir,
            duration,
            stimulus,
        } => {
            if let Some(port) = port {
                settings.serial.port = port;
            }
            if let Some(baud) = baud {
                settings.serial.baud_rate = baud;
            }
            if let Some(channels) = channels {
                settings.acquisition.num_channels = channels;
            }
            if let Some(save_dir) = save_dir {
                settings.storage.save_dir = save_dir;
            }
            settings.stimulus.enabled |= stimulus;
            settings.validate()?;
            logging::init_from_settings(&settings).map_err(anyhow::Error::msg)?;
            run_session(settings, duration).await
        }
        Commands::CheckConfig => {
            settings.validate()?;
            println!("{}", toml::to_string_pretty(&settings)?);
            Ok(())
        }
    }
}

#[cfg(feature = "instrument_serial")]
async fn run_session(settings: Settings, duration: Option<u64>) -> Result<()> {
    use serial_daq::label::{LabelCell, LogDisplay};
    use serial_daq::recorder::RunMetadata;
    use serial_daq::session::AcquisitionSession;
    use serial_daq::visual::SvgVisualizer;
    use std::time::Duration;
    use tracing::{info, warn};

    let labels = LabelCell::new(settings.stimulus.idle_label.clone());
    let channel_labels = settings.acquisition.labels();
    let stimulus = settings.stimulus.enabled;

    let mut session = AcquisitionSession::open(settings, labels.clone())?;
    if stimulus {
        session.start_stimulus(LogDisplay)?;
    }
    if let Some(dir) = session.session_dir() {
        println!("Recording into {}", dir.display());
    }

    // stdin lines become labels; the thread ends with the process
    std::thread::Builder::new()
        .name("stdin-labels".into())
        .spawn(move || {
            for line in std::io::stdin().lines().map_while(|line| line.ok()) {
                let label = line.trim();
                if !label.is_empty() {
                    info!(label, "Label set");
                    labels.set(label);
                }
            }
        })?;

    let deadline = async {
        match duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    let mut status = tokio::time::interval(Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, stopping");
                break;
            }
            _ = &mut deadline => {
                info!("Duration elapsed, stopping");
                break;
            }
            _ = status.tick() => {
                let stats = session.stats();
                info!(
                    accepted = stats.accepted(),
                    dropped = stats.dropped(),
                    backlog = session.backlog(),
                    "Acquisition status"
                );
                if session.reader_finished() {
                    warn!("Link reader has stopped, ending session");
                    break;
                }
            }
        }
    }

    let summary = tokio::task::spawn_blocking(move || {
        let visualizer = SvgVisualizer::new(channel_labels);
        session.stop(&visualizer, RunMetadata::new())
    })
    .await
    .context("Shutdown task panicked")??;

    println!("Session saved to {}", summary.session_dir.display());
    println!(
        "  accepted: {}  dropped: {} (arity {}, parse {})",
        summary.accepted,
        summary.arity_dropped + summary.parse_dropped,
        summary.arity_dropped,
        summary.parse_dropped
    );
    if let Some(err) = summary.link_error {
        eprintln!("  link stopped early: {err}");
    }
    Ok(())
}

#[cfg(not(feature = "instrument_serial"))]
async fn run_session(_settings: Settings, _duration: Option<u64>) -> Result<()> {
    Err(serial_daq::DaqError::FeatureNotEnabled("instrument_serial".to_string()).into())
}
