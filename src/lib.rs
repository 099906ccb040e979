//! # Serial DAQ Core Library
//!
//! This crate ingests a continuous, line-delimited stream of integer telemetry from a serial
//! link, keeps a sliding window of recent samples for live display, and records each run into
//! an auto-numbered session directory (channel table, visualization snapshot, run metadata).
//!
//! ## Crate Structure
//!
//! - **`link`**: the producer. Owns the serial connection and pushes raw lines into the queue.
//! - **`queue`**: the ordered, unbounded handoff between reader and parser.
//! - **`parser`**: the consumer. Validates frames all-or-nothing and applies them to the store.
//! - **`store`**: per-channel sliding windows and full histories, plus the per-frame labels.
//! - **`label`**: the shared label cell and the optional stimulus controller driving it.
//! - **`recorder`**: session directory allocation and end-of-session export.
//! - **`session`**: wires the above into a running acquisition with an ordered shutdown.
//! - **`visual`**: a static SVG renderer used for the session snapshot.
//! - **`config`**: `figment`-based settings (defaults, TOML file, `SERIAL_DAQ_` environment).
//! - **`logging`**: `tracing-subscriber` initialisation.
//! - **`error`**: the crate-wide `DaqError`.
//! - **`shutdown`**: the stop signal shared by the worker threads.
//! - **`validation`**: small helpers used when validating configuration.

pub mod config;
pub mod error;
pub mod label;
pub mod link;
pub mod logging;
pub mod parser;
pub mod queue;
pub mod recorder;
pub mod session;
pub mod shutdown;
pub mod store;
pub mod validation;
pub mod visual;

pub use error::{AppResult, DaqError};
