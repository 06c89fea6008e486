//! Crash-safe bounded history ring backed by an append-biased log file.
//!
//! Records are appended with a write barrier (frame fully written and
//! flushed before the append reports success), so an abrupt termination can
//! only tear the final record. The torn tail is detected on reopen via the
//! frame checksum and truncated away; every previously committed entry
//! survives. Once the log holds twice the ring capacity it is compacted by
//! rewriting the live window to a staging file and atomically renaming it
//! over the log.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::ProbeResult;

use super::error::{HistoryError, HistoryResult};
use super::record::{
    FILE_HEADER_LEN, FRAME_HEADER_LEN, check_file_header, decode_record, encode_record,
    file_header,
};

/// Bounded, newest-first sequence of probe results with a durable backing
/// file. Owned exclusively by one probe; not safe for concurrent external
/// access.
pub struct HistoryStore {
    path: PathBuf,
    file: File,
    entries: VecDeque<ProbeResult>,
    capacity: usize,
    disk_records: usize,
}

impl HistoryStore {
    /// Open (or create) the ring at `path` with a fixed capacity.
    ///
    /// Reopening reconstructs the exact prior sequence; a torn final record
    /// is truncated away with a warning. An unknown file or record version
    /// fails the open with a diagnostic.
    pub fn open(path: impl AsRef<Path>, capacity: usize) -> HistoryResult<Self> {
        let path = path.as_ref().to_path_buf();
        let capacity = capacity.max(1);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let (records, disk_records) = if path.exists() {
            Self::scan(&path)?
        } else {
            let mut file = File::create(&path)?;
            file.write_all(&file_header())?;
            file.sync_all()?;
            (Vec::new(), 0)
        };

        let mut entries = VecDeque::with_capacity(capacity);
        for record in records {
            entries.push_front(record);
        }
        entries.truncate(capacity);

        let file = OpenOptions::new().append(true).open(&path)?;

        Ok(Self {
            path,
            file,
            entries,
            capacity,
            disk_records,
        })
    }

    /// Append a result, evicting the oldest entry once over capacity.
    pub fn append(&mut self, result: &ProbeResult) -> HistoryResult<()> {
        let frame = encode_record(result)?;
        self.file.write_all(&frame)?;
        self.file.sync_data()?;
        self.disk_records += 1;

        self.entries.push_front(result.clone());
        if self.entries.len() > self.capacity {
            self.entries.pop_back();
        }

        if self.disk_records >= self.capacity * 2 {
            self.compact()?;
        }

        Ok(())
    }

    /// All retained results, newest first.
    pub fn list(&self) -> Vec<ProbeResult> {
        self.entries.iter().cloned().collect()
    }

    /// The most recent result, if any run has happened yet.
    pub fn latest(&self) -> Option<&ProbeResult> {
        self.entries.front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read committed records back, truncating a torn tail.
    ///
    /// Returns the records in append (oldest first) order and the on-disk
    /// record count after truncation.
    fn scan(path: &Path) -> HistoryResult<(Vec<ProbeResult>, usize)> {
        let bytes = std::fs::read(path)?;

        if bytes.len() < FILE_HEADER_LEN {
            // Crash between create and header flush; nothing was committed.
            warn!("history file {} has a torn header, reinitializing", path.display());
            let mut file = File::create(path)?;
            file.write_all(&file_header())?;
            file.sync_all()?;
            return Ok((Vec::new(), 0));
        }

        check_file_header(&bytes[..FILE_HEADER_LEN])?;

        let mut records = Vec::new();
        let mut offset = FILE_HEADER_LEN;
        let mut torn_at = None;

        while offset + FRAME_HEADER_LEN <= bytes.len() {
            let body_len =
                u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap()) as usize;
            let crc = u32::from_le_bytes(bytes[offset + 4..offset + 8].try_into().unwrap());
            let body_start = offset + FRAME_HEADER_LEN;

            if body_start + body_len > bytes.len() {
                torn_at = Some(offset);
                break;
            }

            let body = &bytes[body_start..body_start + body_len];
            if super::record::crc32(body) != crc {
                torn_at = Some(offset);
                break;
            }

            records.push(decode_record(body)?);
            offset = body_start + body_len;
        }

        if torn_at.is_none() && offset < bytes.len() {
            // Trailing partial frame header.
            torn_at = Some(offset);
        }

        if let Some(cut) = torn_at {
            warn!(
                "history file {} has a torn record at byte {}, truncating ({} entries intact)",
                path.display(),
                cut,
                records.len()
            );
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(cut as u64)?;
            file.sync_all()?;
        }

        let count = records.len();
        Ok((records, count))
    }

    /// Rewrite the log with only the live window, via staging + rename.
    fn compact(&mut self) -> HistoryResult<()> {
        let staging = staging_path(&self.path);

        let mut out = File::create(&staging)?;
        out.write_all(&file_header())?;
        for result in self.entries.iter().rev() {
            out.write_all(&encode_record(result)?)?;
        }
        out.sync_all()?;

        std::fs::rename(&staging, &self.path)?;

        self.file = OpenOptions::new().append(true).open(&self.path)?;
        self.disk_records = self.entries.len();

        debug!(
            "compacted history {} down to {} records",
            self.path.display(),
            self.disk_records
        );

        Ok(())
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".new");
    PathBuf::from(os)
}
