//! Append-only text log.
//!
//! The file has no header, checksum or length prefix; its whole content must
//! parse from offset 0 as newline-terminated records.

use crate::error::Result;
use crate::records::Record;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// Append-only record log.
pub struct RecordLog {
    /// Path to the log file.
    path: PathBuf,

    /// Log file handle, opened for append.
    file: File,

    /// Current file size.
    file_size: u64,

    /// Number of appends since last sync.
    writes_since_sync: u64,

    /// Sync every N appends.
    sync_interval: u64,
}

impl RecordLog {
    /// Sync after every append.
    pub const DEFAULT_SYNC_INTERVAL: u64 = 1;

    /// Open or create a record log with default sync interval.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_sync_interval(path, Self::DEFAULT_SYNC_INTERVAL)
    }

    /// Open or create a record log with custom sync interval.
    /// - sync_interval = 0 or 1: sync every append
    /// - sync_interval = N: sync every N appends
    pub fn open_with_sync_interval(path: impl AsRef<Path>, sync_interval: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)?;
        let file_size = file.metadata()?.len();

        Ok(Self {
            path,
            file,
            file_size,
            writes_since_sync: 0,
            sync_interval: sync_interval.max(1),
        })
    }

    /// Read the raw content of the log at `path`, `None` when it does not exist.
    pub fn read_contents(path: impl AsRef<Path>) -> Result<Option<Vec<u8>>> {
        match fs::read(path.as_ref()) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Append records in a single write.
    ///
    /// On failure the file is cut back to its previous length so a torn line
    /// never reaches replay.
    pub fn append(&mut self, records: &[Record]) -> Result<()> {
        let encoded: String = records.iter().map(Record::encode).collect();

        if let Err(e) = self.write_and_sync(encoded.as_bytes()) {
            error!(path = %self.path.display(), error = %e, "log append failed");
            if let Err(truncate_err) = self.roll_back() {
                error!(error = %truncate_err, "failed to roll back torn log append");
            }
            return Err(e.into());
        }

        self.file_size += encoded.len() as u64;
        debug!(records = records.len(), size = self.file_size, "log append");
        Ok(())
    }

    /// Cut the file back to the last fully appended record.
    fn roll_back(&mut self) -> std::io::Result<()> {
        self.file.set_len(self.file_size)
    }

    fn write_and_sync(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.file.write_all(bytes)?;
        self.writes_since_sync += 1;
        if self.writes_since_sync >= self.sync_interval {
            self.file.sync_data()?;
            self.writes_since_sync = 0;
        }
        Ok(())
    }

    /// Force sync all pending writes to disk.
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        self.writes_since_sync = 0;
        Ok(())
    }

    /// Current file size.
    pub fn size(&self) -> u64 {
        self.file_size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Split log content into `(line number, line)` pairs, 1-based. A final
/// record without its newline is still returned.
pub fn lines(data: &[u8]) -> impl Iterator<Item = (usize, &[u8])> {
    let body = data.strip_suffix(b"\n").unwrap_or(data);
    let mut lines = body.split(|&b| b == b'\n');
    if body.is_empty() {
        // empty file has no records
        lines.next();
    }
    lines.enumerate().map(|(i, line)| (i + 1, line))
}
