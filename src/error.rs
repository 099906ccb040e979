//! Custom error types for the application.
//!
//! This module defines the primary error type, `DaqError`, for the whole crate. Using the
//! `thiserror` crate, it gives every failure of the acquisition pipeline a named variant,
//! from opening the serial device through to writing the session artifacts.
//!
//! ## Error Hierarchy
//!
//! - **`Connection`**: the serial device could not be opened. Fatal, the session never starts.
//! - **`Link`**: a hard I/O failure inside an established read loop. The reader stops.
//! - **`FrameArity`** / **`FrameParse`**: a malformed line. Recoverable, the frame is dropped
//!   and ingestion continues.
//! - **`DirectoryAllocation`**: the session directory could not be created. Fatal to export.
//! - **`ExportWrite`**: one session artifact failed to write. The remaining artifacts are
//!   still attempted and the failures are gathered into **`ExportFailed`**.
//! - **`Config`** / **`Configuration`**: loading or semantic validation of [`crate::config::Settings`].
//!
//! By using `#[from]`, `DaqError` can be created from the underlying error types so that
//! the `?` operator works throughout the crate.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Every failure the acquisition pipeline can report.
#[derive(Error, Debug)]
pub enum DaqError {
    /// Loading or extracting the settings failed
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// Settings loaded but failed semantic validation
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Uncategorised I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The serial device could not be opened
    #[error("Failed to open serial port '{port}' at {baud_rate} baud: {reason}")]
    Connection {
        /// Port identifier as configured
        port: String,
        /// Requested baud rate
        baud_rate: u32,
        /// Driver error text
        reason: String,
    },

    /// Hard read failure or end of stream on an open link
    #[error("Serial link failure: {0}")]
    Link(String),

    /// A frame carried the wrong number of fields
    #[error("Received more or less fields than expected: expected {expected}, received {received}")]
    FrameArity {
        /// Configured channel count
        expected: usize,
        /// Fields found in the frame
        received: usize,
    },

    /// A frame was not UTF-8 or held a non-integer field
    #[error("Frame parsing failed: {0}")]
    FrameParse(String),

    /// The session directory could not be allocated
    #[error("Failed to create session directory '{path}': {source}")]
    DirectoryAllocation {
        /// Directory that could not be created or listed
        path: PathBuf,
        /// Underlying failure
        #[source]
        source: std::io::Error,
    },

    /// One session artifact could not be written
    #[error("Failed to write {artifact} to '{path}': {reason}")]
    ExportWrite {
        /// Which artifact: `snapshot`, `table` or `metadata`
        artifact: &'static str,
        /// Target file
        path: PathBuf,
        /// Underlying failure text
        reason: String,
    },

    /// Export attempted every artifact and these failed
    #[error("Session export finished with errors")]
    ExportFailed(Vec<DaqError>),

    /// The operation needs a cargo feature this build lacks
    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),

    /// A worker thread panicked
    #[error("The {0} thread panicked")]
    ThreadPanicked(&'static str),
}

impl DaqError {
    /// Whether ingestion or export may carry on after this error.
    pub fn is_recoverable(&self) -> bool {
        match self {
            DaqError::FrameArity { .. }
            | DaqError::FrameParse(_)
            | DaqError::ExportWrite { .. } => true,
            DaqError::Config(_)
            | DaqError::Configuration(_)
            | DaqError::Io(_)
            | DaqError::Connection { .. }
            | DaqError::Link(_)
            | DaqError::DirectoryAllocation { .. }
            | DaqError::ExportFailed(_)
            | DaqError::FeatureNotEnabled(_)
            | DaqError::ThreadPanicked(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_errors_are_recoverable() {
        assert!(DaqError::FrameArity {
            expected: 3,
            received: 2
        }
        .is_recoverable());
        assert!(DaqError::FrameParse("x".into()).is_recoverable());
    }

    #[test]
    fn startup_and_shutdown_errors_are_fatal() {
        let conn = DaqError::Connection {
            port: "/dev/null0".into(),
            baud_rate: 9600,
            reason: "no such device".into(),
        };
        assert!(!conn.is_recoverable());

        let dir = DaqError::DirectoryAllocation {
            path: PathBuf::from("runs/0"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(!dir.is_recoverable());
        assert!(!DaqError::Link("broken pipe".into()).is_recoverable());
    }

    #[test]
    fn arity_message_mentions_counts() {
        let err = DaqError::FrameArity {
            expected: 16,
            received: 15,
        };
        let msg = err.to_string();
        assert!(msg.contains("more or less fields"));
        assert!(msg.contains("16"));
        assert!(msg.contains("15"));
    }
}
