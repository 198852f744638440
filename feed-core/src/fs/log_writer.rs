//! Rotating raw packet writer.
//!
//! Payloads are appended back-to-back, exactly as received, with no framing.
//! Each category has at most one open file, and that file always belongs to
//! the date of the last message written to it.

use crate::fs::paths::LogPaths;
use crate::model::Category;
use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// When buffered bytes are handed to the operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushPolicy {
    /// Flush after every append. A killed process loses nothing already appended.
    EveryWrite,
    /// Flush and fsync after every append. Survives power loss.
    Sync,
    /// Flush after `max_pending` appends and whenever the caller is idle.
    Batched { max_pending: usize },
}

impl Default for FlushPolicy {
    fn default() -> Self {
        FlushPolicy::EveryWrite
    }
}

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("Failed to create log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to open log file {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write log file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to close log file {path}: {source}")]
    Close {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// The open file of one category.
#[derive(Debug)]
struct LogFileHandle {
    date: NaiveDate,
    path: PathBuf,
    writer: BufWriter<File>,
    /// Appends not yet flushed to the OS.
    pending: usize,
    /// File length after the last successful flush. Always ends on a payload boundary.
    committed: u64,
    /// Bytes appended since then.
    buffered: u64,
}

impl LogFileHandle {
    fn open(path: PathBuf, date: NaiveDate) -> Result<Self, WriteError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|source| WriteError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| WriteError::Open {
                path: path.clone(),
                source,
            })?;
        let committed = file
            .metadata()
            .map_err(|source| WriteError::Open {
                path: path.clone(),
                source,
            })?
            .len();

        Ok(Self {
            date,
            path,
            writer: BufWriter::new(file),
            pending: 0,
            committed,
            buffered: 0,
        })
    }

    fn write(&mut self, payload: &[u8], policy: FlushPolicy) -> std::io::Result<()> {
        self.writer.write_all(payload)?;
        self.pending += 1;
        self.buffered += payload.len() as u64;

        match policy {
            FlushPolicy::EveryWrite => self.flush(),
            FlushPolicy::Sync => {
                self.flush()?;
                self.writer.get_ref().sync_data()
            }
            FlushPolicy::Batched { max_pending } => {
                if self.pending >= max_pending {
                    self.flush()
                } else {
                    Ok(())
                }
            }
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()?;
        self.pending = 0;
        self.committed += self.buffered;
        self.buffered = 0;
        Ok(())
    }

    /// Drops unflushed bytes and truncates the file back to the last flush,
    /// so a half-written payload never stays in the log.
    fn discard(self) -> std::io::Result<()> {
        // into_parts hands back the file without flushing the buffer.
        let (file, _) = self.writer.into_parts();
        file.set_len(self.committed)
    }

    /// Flushes and syncs to durable storage. The file is closed when dropped.
    fn close(mut self) -> Result<(), WriteError> {
        let path = self.path.clone();
        self.flush()
            .and_then(|_| self.writer.get_ref().sync_all())
            .map_err(|source| WriteError::Close { path, source })
    }
}

/// Per-category, per-day file handle manager.
#[derive(Debug)]
pub struct LogWriter {
    paths: LogPaths,
    policy: FlushPolicy,
    handles: HashMap<Category, LogFileHandle>,
}

impl LogWriter {
    /// Creates a new LogWriter.
    ///
    /// No file is opened until the first append.
    ///
    /// # Arguments
    ///
    /// * `paths` - Layout of the log directory.
    /// * `policy` - When buffered bytes are flushed.
    pub fn new(paths: LogPaths, policy: FlushPolicy) -> Self {
        Self {
            paths,
            policy,
            handles: HashMap::new(),
        }
    }

    pub fn policy(&self) -> FlushPolicy {
        self.policy
    }

    /// Path of the currently open file of `category`, if any.
    pub fn open_path(&self, category: Category) -> Option<&Path> {
        self.handles.get(&category).map(|h| h.path.as_path())
    }

    /// Appends `payload` to the file of `category` for the date of `timestamp`.
    ///
    /// # Arguments
    ///
    /// * `category` - Which file family to write.
    /// * `timestamp` - Wall-clock time of the message. Only its date is used.
    /// * `payload` - Raw bytes, written without any framing.
    ///
    /// # Returns
    ///
    /// * `Ok(())` once the bytes are written under the configured flush policy.
    /// * `Err(WriteError)` on any IO failure. The failed handle is discarded and
    ///   the next append re-opens the file.
    pub fn append(
        &mut self,
        category: Category,
        timestamp: NaiveDateTime,
        payload: &[u8],
    ) -> Result<(), WriteError> {
        let date = timestamp.date();

        // 1. Rotate when the open handle belongs to another date.
        if self.handles.get(&category).is_some_and(|h| h.date != date) {
            if let Some(old) = self.handles.remove(&category) {
                info!(
                    "Rotating {} from {} to {}",
                    category.file_name(),
                    old.date,
                    date
                );
                old.close()?;
            }
        }

        // 2. Open (or create) the file for this date.
        let handle = match self.handles.entry(category) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                let path = self.paths.file_path(category, date);
                debug!("Opening {}", path.display());
                entry.insert(LogFileHandle::open(path, date)?)
            }
        };

        // 3. Write.
        if let Err(source) = handle.write(payload, self.policy) {
            let path = handle.path.clone();
            self.discard(category);
            return Err(WriteError::Write { path, source });
        }
        Ok(())
    }

    /// Closes the handle of `category` without keeping any partial write.
    fn discard(&mut self, category: Category) {
        if let Some(handle) = self.handles.remove(&category) {
            let path = handle.path.clone();
            if let Err(e) = handle.discard() {
                warn!("Failed to roll back {}: {}", path.display(), e);
            }
        }
    }

    /// Flushes any appends still sitting in a buffer.
    ///
    /// Only meaningful under [`FlushPolicy::Batched`]; the other policies never
    /// leave pending data.
    pub fn flush_pending(&mut self) -> Result<(), WriteError> {
        let mut failed = None;
        for (category, handle) in self.handles.iter_mut() {
            if handle.pending == 0 {
                continue;
            }
            if let Err(source) = handle.flush() {
                failed = Some((
                    *category,
                    WriteError::Write {
                        path: handle.path.clone(),
                        source,
                    },
                ));
                break;
            }
        }

        match failed {
            Some((category, err)) => {
                self.discard(category);
                Err(err)
            }
            None => Ok(()),
        }
    }

    /// Flushes, syncs and closes every open handle.
    ///
    /// Every handle is attempted; the first error is returned.
    pub fn close_all(&mut self) -> Result<(), WriteError> {
        let mut first_err = None;
        for (_, handle) in self.handles.drain() {
            if let Err(e) = handle.close() {
                warn!("{}", e);
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        for handle in self.handles.values_mut() {
            if let Err(e) = handle.flush() {
                warn!("Failed to flush {} on drop: {}", handle.path.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn writer(dir: &Path, policy: FlushPolicy) -> LogWriter {
        LogWriter::new(LogPaths::new(dir), policy)
    }

    #[test]
    fn test_payloads_are_concatenated_raw() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = writer(dir.path(), FlushPolicy::EveryWrite);

        w.append(Category::FuturesIndex, at(4, 9, 0), b"A301F\x00\x01")
            .unwrap();
        w.append(Category::FuturesIndex, at(4, 9, 1), b"B604F\n\xff")
            .unwrap();

        // Visible before close under every_write.
        let path = dir.path().join("2024-03-04").join("futures_index.log");
        assert_eq!(fs::read(&path).unwrap(), b"A301F\x00\x01B604F\n\xff");
        w.close_all().unwrap();
    }

    #[test]
    fn test_categories_never_share_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = writer(dir.path(), FlushPolicy::Sync);

        for (i, category) in Category::ALL.into_iter().enumerate() {
            w.append(category, at(4, 10, 0), &[i as u8; 3]).unwrap();
        }
        w.close_all().unwrap();

        for (i, category) in Category::ALL.into_iter().enumerate() {
            let path = dir.path().join("2024-03-04").join(category.file_name());
            assert_eq!(fs::read(path).unwrap(), vec![i as u8; 3]);
        }
    }

    #[test]
    fn test_rotates_on_date_change() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = writer(dir.path(), FlushPolicy::EveryWrite);

        w.append(Category::OptionsCallStock, at(4, 23, 59), b"day1")
            .unwrap();
        w.append(Category::OptionsCallStock, at(5, 0, 0), b"day2")
            .unwrap();
        assert!(w
            .open_path(Category::OptionsCallStock)
            .unwrap()
            .starts_with(dir.path().join("2024-03-05")));

        // A late message for the previous day goes to that day's file.
        w.append(Category::OptionsCallStock, at(4, 23, 59), b"late")
            .unwrap();
        w.close_all().unwrap();

        let day1 = dir.path().join("2024-03-04").join("options_call_stock.log");
        let day2 = dir.path().join("2024-03-05").join("options_call_stock.log");
        assert_eq!(fs::read(day1).unwrap(), b"day1late");
        assert_eq!(fs::read(day2).unwrap(), b"day2");
    }

    #[test]
    fn test_reopening_appends() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut w = writer(dir.path(), FlushPolicy::EveryWrite);
            w.append(Category::OptionsPutStock, at(4, 9, 0), b"first").unwrap();
            w.close_all().unwrap();
        }
        let mut w = writer(dir.path(), FlushPolicy::EveryWrite);
        w.append(Category::OptionsPutStock, at(4, 9, 5), b"second").unwrap();
        w.close_all().unwrap();

        let path = dir.path().join("2024-03-04").join("options_put_stock.log");
        assert_eq!(fs::read(path).unwrap(), b"firstsecond");
    }

    #[test]
    fn test_batched_flushes_on_threshold_and_idle() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = writer(dir.path(), FlushPolicy::Batched { max_pending: 3 });
        let path = dir.path().join("2024-03-04").join("futures_stock.log");

        w.append(Category::FuturesStock, at(4, 9, 0), b"a").unwrap();
        w.append(Category::FuturesStock, at(4, 9, 0), b"b").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"");

        w.append(Category::FuturesStock, at(4, 9, 0), b"c").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"abc");

        w.append(Category::FuturesStock, at(4, 9, 0), b"d").unwrap();
        w.flush_pending().unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"abcd");
    }

    #[test]
    fn test_drop_flushes_buffered_data() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut w = writer(dir.path(), FlushPolicy::Batched { max_pending: 100 });
            w.append(Category::FuturesStock, at(4, 9, 0), b"buffered").unwrap();
        }
        let path = dir.path().join("2024-03-04").join("futures_stock.log");
        assert_eq!(fs::read(path).unwrap(), b"buffered");
    }

    #[test]
    fn test_open_failure_is_reported_and_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = writer(dir.path(), FlushPolicy::EveryWrite);

        // A directory where the file should be makes the open fail.
        let blocked = dir.path().join("2024-03-04").join("futures_stock.log");
        fs::create_dir_all(&blocked).unwrap();

        let err = w
            .append(Category::FuturesStock, at(4, 9, 0), b"x")
            .unwrap_err();
        assert!(matches!(err, WriteError::Open { .. }));
        assert!(w.open_path(Category::FuturesStock).is_none());

        // Other categories keep working.
        w.append(Category::FuturesIndex, at(4, 9, 0), b"ok").unwrap();

        fs::remove_dir(&blocked).unwrap();
        w.append(Category::FuturesStock, at(4, 9, 1), b"y").unwrap();
        w.close_all().unwrap();
        assert_eq!(fs::read(&blocked).unwrap(), b"y");
    }

    #[test]
    fn test_failed_write_leaves_no_partial_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2024-03-04").join("futures_stock.log");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"old").unwrap();

        let mut w = writer(dir.path(), FlushPolicy::EveryWrite);
        w.append(Category::FuturesStock, at(4, 9, 0), b"first").unwrap();

        // Half a payload reached the file and the rest is still buffered.
        let handle = w.handles.get_mut(&Category::FuturesStock).unwrap();
        handle.writer.get_mut().write_all(b"PAR").unwrap();
        handle.writer.write_all(b"TIAL").unwrap();
        w.discard(Category::FuturesStock);

        assert!(w.open_path(Category::FuturesStock).is_none());
        assert_eq!(fs::read(&path).unwrap(), b"oldfirst");

        w.append(Category::FuturesStock, at(4, 9, 1), b"next").unwrap();
        w.close_all().unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"oldfirstnext");
    }
}
