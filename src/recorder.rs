//! Session recorder: numbered session directories and end-of-session export.
//!
//! Layout of one recorded session:
//!
//! ```text
//! <save_dir>/
//!   0/
//!   1/
//!   2/                  <- allocated for this session
//!     plot.svg          visualization snapshot (name chosen by the visualizer)
//!     csvData.csv       one row per channel history, then one row of labels, no header
//!     info.txt          "key : value" per metadata entry, in insertion order
//! ```
//!
//! Directory names are the next integer after the largest numeric entry already present,
//! so session ids keep increasing across runs and stray non-numeric entries are ignored.

use crate::error::{AppResult, DaqError};
use crate::store::{ChannelStore, StoreSnapshot};
use std::fmt::Display;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Create and return the next numbered session directory under `base_dir`.
///
/// `base_dir` is created if missing. Entries whose names are not non-negative integers are
/// ignored. The new directory is `max + 1`, or `0` when no numbered entry exists.
///
/// # Errors
///
/// [`DaqError::DirectoryAllocation`] if `base_dir` cannot be created or listed, or the
/// session directory cannot be created.
pub fn allocate_session_dir(base_dir: &Path) -> AppResult<PathBuf> {
    let alloc_err = |path: &Path, source: std::io::Error| DaqError::DirectoryAllocation {
        path: path.to_path_buf(),
        source,
    };

    fs::create_dir_all(base_dir).map_err(|e| alloc_err(base_dir, e))?;

    let mut highest: Option<u64> = None;
    for entry in fs::read_dir(base_dir).map_err(|e| alloc_err(base_dir, e))? {
        let entry = entry.map_err(|e| alloc_err(base_dir, e))?;
        let Some(id) = entry
            .file_name()
            .to_str()
            .and_then(|name| name.parse::<u64>().ok())
        else {
            continue;
        };
        highest = Some(highest.map_or(id, |h| h.max(id)));
    }

    let next = match highest {
        None => 0,
        Some(h) => h.checked_add(1).ok_or_else(|| {
            alloc_err(
                base_dir,
                std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("session id {h} is the largest possible, no next id"),
                ),
            )
        })?,
    };
    let dir = base_dir.join(next.to_string());
    fs::create_dir(&dir).map_err(|e| alloc_err(&dir, e))?;
    info!(path = %dir.display(), "Allocated session directory");
    Ok(dir)
}

/// Opaque rendering artifact produced by a [`Visualizer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisualSnapshot {
    /// File name inside the session directory, e.g. `plot.svg`
    pub file_name: String,
    /// Encoded document
    pub bytes: Vec<u8>,
}

/// Renders the live windows into a static document at session close.
pub trait Visualizer {
    /// `windows[c]` holds channel `c`'s window, oldest first.
    fn snapshot(&self, windows: &[Vec<i64>]) -> VisualSnapshot;
}

/// Ordered key/value run metadata.
///
/// Keys keep their insertion order. Setting an existing key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunMetadata {
    entries: Vec<(String, String)>,
}

impl RunMetadata {
    /// Empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key`, keeping its position if it already exists.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Display) {
        let key = key.into();
        let value = value.to_string();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: impl Display) -> Self {
        self.insert(key, value);
        self
    }

    /// Append every entry of `other`, in its order.
    pub fn extend(&mut self, other: &RunMetadata) {
        for (key, value) in &other.entries {
            self.insert(key.clone(), value);
        }
    }

    /// Value stored for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// All entries in insertion order.
    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Text form written to the info file: one `key : value` line per entry.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|(k, v)| format!("{k} : {v}\n"))
            .collect()
    }
}

/// File names used inside a session directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNames {
    /// Channel table file name
    pub table_file: String,
    /// Metadata file name
    pub info_file: String,
}

impl Default for ArtifactNames {
    fn default() -> Self {
        Self {
            table_file: "csvData.csv".to_string(),
            info_file: "info.txt".to_string(),
        }
    }
}

/// Paths of the artifacts written by [`SessionRecorder::close`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedArtifacts {
    /// Session directory
    pub dir: PathBuf,
    /// Visualization snapshot
    pub snapshot: PathBuf,
    /// Channel table
    pub table: PathBuf,
    /// Metadata text file
    pub info: PathBuf,
}

/// Owns one session directory and writes its artifacts when the session ends.
#[derive(Debug)]
pub struct SessionRecorder {
    dir: PathBuf,
    names: ArtifactNames,
    store: Arc<ChannelStore>,
}

impl SessionRecorder {
    /// Allocate a fresh session directory under `base_dir`.
    pub fn allocate(base_dir: &Path, store: Arc<ChannelStore>) -> AppResult<Self> {
        Ok(Self::with_dir(allocate_session_dir(base_dir)?, store))
    }

    /// Record into an existing directory.
    pub fn with_dir(dir: PathBuf, store: Arc<ChannelStore>) -> Self {
        Self {
            dir,
            names: ArtifactNames::default(),
            store,
        }
    }

    /// Use custom artifact file names.
    pub fn with_names(mut self, names: ArtifactNames) -> Self {
        self.names = names;
        self
    }

    /// Session directory owned by this recorder.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Session id, i.e. the numeric directory name.
    pub fn session_id(&self) -> Option<u64> {
        self.dir.file_name()?.to_str()?.parse().ok()
    }

    /// Export the snapshot, the channel table and the metadata.
    ///
    /// Call once, after ingestion has stopped. Every artifact is attempted even if an
    /// earlier one fails; failures are logged and returned together as
    /// [`DaqError::ExportFailed`].
    pub fn close(self, snapshot: &VisualSnapshot, metadata: &RunMetadata) -> AppResult<ExportedArtifacts> {
        if !self.dir.is_dir() {
            fs::create_dir_all(&self.dir).map_err(|source| DaqError::DirectoryAllocation {
                path: self.dir.clone(),
                source,
            })?;
        }

        let artifacts = ExportedArtifacts {
            dir: self.dir.clone(),
            snapshot: self.dir.join(&snapshot.file_name),
            table: self.dir.join(&self.names.table_file),
            info: self.dir.join(&self.names.info_file),
        };
        let data = self.store.snapshot();

        let results = [
            write_snapshot(&artifacts.snapshot, snapshot),
            write_table(&artifacts.table, &data),
            write_info(&artifacts.info, metadata),
        ];

        let errors: Vec<DaqError> = results.into_iter().filter_map(Result::err).collect();
        for err in &errors {
            error!(error = %err, "Session artifact export failed");
        }
        if !errors.is_empty() {
            return Err(DaqError::ExportFailed(errors));
        }

        info!(
            path = %artifacts.dir.display(),
            samples = data.sample_count(),
            "Session exported"
        );
        Ok(artifacts)
    }
}

fn export_err(artifact: &'static str, path: &Path, reason: impl Display) -> DaqError {
    DaqError::ExportWrite {
        artifact,
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn write_snapshot(path: &Path, snapshot: &VisualSnapshot) -> AppResult<()> {
    fs::write(path, &snapshot.bytes).map_err(|e| export_err("snapshot", path, e))
}

/// Write histories as rows, in channel order, followed by the label row. No header.
pub fn write_table(path: &Path, data: &StoreSnapshot) -> AppResult<()> {
    if data.history.iter().any(|h| h.len() != data.labels.len()) {
        warn!(path = %path.display(), "Channel histories and labels differ in length");
    }

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| export_err("table", path, e))?;

    for channel in &data.history {
        let row: Vec<String> = channel.iter().map(|v| v.to_string()).collect();
        write_row(&mut writer, &row).map_err(|e| export_err("table", path, e))?;
    }
    write_row(&mut writer, &data.labels).map_err(|e| export_err("table", path, e))?;
    writer.flush().map_err(|e| export_err("table", path, e))
}

/// Write one table row. An empty row is a bare line terminator, since `csv` would write a
/// quoted empty field and the row would read back as one column.
fn write_row<W: Write>(writer: &mut csv::Writer<W>, fields: &[String]) -> csv::Result<()>
where
    for<'a> &'a W: Write,
{
    if fields.is_empty() {
        writer.flush()?;
        let mut inner: &W = writer.get_ref();
        inner.write_all(b"\n")?;
        Ok(())
    } else {
        writer.write_record(fields)
    }
}

fn write_info(path: &Path, metadata: &RunMetadata) -> AppResult<()> {
    let mut file = fs::File::create(path).map_err(|e| export_err("metadata", path, e))?;
    file.write_all(metadata.render().as_bytes())
        .and_then(|_| file.flush())
        .map_err(|e| export_err("metadata", path, e))
}
