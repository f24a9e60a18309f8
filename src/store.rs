//! Dedupe store: the log of article identifiers already notified.
//!
//! # File Format
//!
//! One record per line:
//!
//! ```text
//! M.1700000001.A.001|2026-03-10T12:00:00+08:00
//! M.1700000002.A.002
//! ```
//!
//! The second form (no timestamp) is what older versions wrote; such lines
//! are accepted when the identifier looks like a board article id. Any other
//! line that can't be read is skipped with a warning.
//!
//! # Append vs Replace
//!
//! The store is read once per run and written once, by appending the new
//! lines to the end of the file. Existing lines are never rewritten.

use crate::models::ProcessedRecord;
use crate::utils::board_offset;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument, warn};

static LEGACY_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]\.\d+\.A(\.[0-9A-Fa-f]+)?$").unwrap());

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("dedupe store I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Key-value log of processed identifiers.
///
/// `append` only touches memory; nothing reaches the backing storage until
/// `flush`.
pub trait DedupeStore {
    /// Whether `id` has been recorded, flushed or not.
    fn contains(&self, id: &str) -> bool;

    /// Whether `id` has never been notified.
    fn is_new(&self, id: &str) -> bool {
        !self.contains(id)
    }

    /// Record `record`. Returns `false` (and changes nothing) if its
    /// identifier is already known.
    fn append(&mut self, record: ProcessedRecord) -> bool;

    /// Persist everything appended since the last flush. Returns how many
    /// records were written.
    async fn flush(&mut self) -> Result<usize, StoreError>;
}

/// [`DedupeStore`] backed by a plain text file.
#[derive(Debug)]
pub struct FlatFileStore {
    /// Backing file, created on the first flush if it doesn't exist.
    path: PathBuf,
    /// Records already on disk, in file order.
    records: Vec<ProcessedRecord>,
    /// Every known identifier, flushed or pending.
    ids: HashSet<String>,
    /// Appended since the last flush.
    pending: Vec<ProcessedRecord>,
    /// The file exists and doesn't end in a newline.
    needs_newline: bool,
}

impl FlatFileStore {
    /// Load the store at `path`. A missing file is an empty store.
    ///
    /// # Arguments
    ///
    /// * `path` - The dedupe log to read and later append to.
    ///
    /// # Returns
    ///
    /// The loaded store, or [`StoreError::Io`] if the file exists but can't
    /// be read. Unreadable lines are skipped, not reported as errors.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let mut store = Self {
            path,
            records: Vec::new(),
            ids: HashSet::new(),
            pending: Vec::new(),
            needs_newline: false,
        };

        let bytes = match fs::read(&store.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No dedupe store yet; starting empty");
                return Ok(store);
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: store.path,
                    source,
                });
            }
        };

        let raw = String::from_utf8_lossy(&bytes);
        store.needs_newline = !raw.is_empty() && !raw.ends_with('\n');

        let mut skipped = 0usize;
        for (lineno, line) in raw.lines().enumerate() {
            match parse_line(line) {
                Ok(Some(record)) => {
                    if store.ids.insert(record.id.clone()) {
                        store.records.push(record);
                    }
                }
                Ok(None) => {}
                Err(reason) => {
                    skipped += 1;
                    warn!(line = lineno + 1, content = %line, reason, "Skipping malformed dedupe record");
                }
            }
        }

        info!(records = store.records.len(), skipped, "Loaded dedupe store");
        Ok(store)
    }

    /// The backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of known identifiers, including ones not yet flushed.
    pub fn len(&self) -> usize {
        self.ids.len()
    }
}

impl DedupeStore for FlatFileStore {
    fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    fn append(&mut self, record: ProcessedRecord) -> bool {
        if !self.ids.insert(record.id.clone()) {
            return false;
        }
        self.pending.push(record);
        true
    }

    #[instrument(level = "info", skip_all, fields(path = %self.path.display(), pending = self.pending.len()))]
    async fn flush(&mut self) -> Result<usize, StoreError> {
        let mut out = String::new();
        if self.needs_newline && !self.pending.is_empty() {
            out.push('\n');
        }
        for record in &self.pending {
            let _ = writeln!(out, "{record}");
        }

        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(io_err)?;
        file.write_all(out.as_bytes()).await.map_err(io_err)?;
        file.sync_all().await.map_err(io_err)?;

        let written = self.pending.len();
        if written > 0 {
            self.needs_newline = false;
        }
        self.records.append(&mut self.pending);
        info!(written, total = self.records.len(), "Flushed dedupe store");
        Ok(written)
    }
}

/// Parse one line. `Ok(None)` for blank lines.
fn parse_line(line: &str) -> Result<Option<ProcessedRecord>, &'static str> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    match line.split_once('|') {
        Some((id, ts)) => {
            let id = id.trim();
            if id.is_empty() || id.contains(char::is_whitespace) {
                return Err("bad identifier");
            }
            let notified_at = parse_timestamp(ts.trim()).ok_or("bad timestamp")?;
            Ok(Some(ProcessedRecord::new(id, notified_at)))
        }
        None if LEGACY_ID_RE.is_match(line) => Ok(Some(ProcessedRecord {
            id: line.to_string(),
            notified_at: None,
        })),
        None => Err("no separator"),
    }
}

/// RFC 3339, or a naive ISO-8601 timestamp taken as board local time.
fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts);
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    board_offset().from_local_datetime(&naive).single()
}
