use crate::config::ConfigError;
use crate::model::Category;
use chrono::NaiveDate;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::fs;

/// Name of the throwaway file used to check that the base directory accepts writes.
const PROBE_FILE: &str = ".write_probe";

/// Lays out the per-day, per-category log files.
///
/// ```text
/// {base_dir}/{YYYY-MM-DD}/{category file}
/// ```
#[derive(Debug, Clone)]
pub struct LogPaths {
    base_dir: PathBuf,
}

impl LogPaths {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// The directory holding every file of one calendar date.
    pub fn date_dir(&self, date: NaiveDate) -> PathBuf {
        self.base_dir.join(date.format("%Y-%m-%d").to_string())
    }

    /// The log file of `category` for `date`.
    ///
    /// # Arguments
    ///
    /// * `category` - The category being written.
    /// * `date` - Wall-clock date of the message.
    ///
    /// # Returns
    ///
    /// The full path. Two distinct categories never share a path.
    pub fn file_path(&self, category: Category, date: NaiveDate) -> PathBuf {
        self.date_dir(date).join(category.file_name())
    }

    /// Creates the base directory if it does not exist yet.
    pub fn ensure_base_dir(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.base_dir)
    }

    /// Ensures the base directory exists and accepts writes.
    ///
    /// # Returns
    ///
    /// * `Ok(())` if a probe file could be written and removed.
    /// * `Err(ConfigError::LogDirUnwritable)` otherwise.
    pub fn probe_writable(&self) -> Result<(), ConfigError> {
        let unwritable = |source| ConfigError::LogDirUnwritable {
            path: self.base_dir.clone(),
            source,
        };

        self.ensure_base_dir().map_err(unwritable)?;

        let probe = self.base_dir.join(PROBE_FILE);
        let mut file = fs::File::create(&probe).map_err(unwritable)?;
        file.write_all(b"probe").map_err(unwritable)?;
        drop(file);
        fs::remove_file(&probe).map_err(unwritable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let paths = LogPaths::new("/data/krx");
        let date = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        assert_eq!(paths.date_dir(date), PathBuf::from("/data/krx/2024-03-04"));
        assert_eq!(
            paths.file_path(Category::OptionsPutIndex, date),
            PathBuf::from("/data/krx/2024-03-04/options_put_index.log")
        );
    }

    #[test]
    fn test_probe_creates_missing_base() {
        let dir = tempfile::tempdir().unwrap();
        let paths = LogPaths::new(dir.path().join("nested").join("logs"));
        paths.probe_writable().unwrap();
        assert!(paths.base_dir().is_dir());
        assert!(!paths.base_dir().join(PROBE_FILE).exists());
    }

    #[test]
    fn test_probe_fails_when_base_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("logs");
        fs::write(&blocker, b"not a directory").unwrap();

        let paths = LogPaths::new(&blocker);
        assert!(matches!(
            paths.probe_writable(),
            Err(ConfigError::LogDirUnwritable { .. })
        ));
    }
}
