/// Append-only monthly log files.
///
/// One file per calendar month: `<dir>/<YYYY>-<MM>.log`. Every append writes a
/// block of the form
///
/// ```text
/// \r\n>> [19/10/2026, 14:03:22] <message>\r\n
/// ```
///
/// The file is opened fresh for each append; no handle is held between calls.
use chrono::{DateTime, Datelike, Local};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Result, UpdaterError};

/// en-GB `toLocaleString` layout.
pub const TIMESTAMP_FORMAT: &str = "%d/%m/%Y, %H:%M:%S";

#[derive(Debug, Clone)]
pub struct LogStore {
    dir: PathBuf,
}

impl LogStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the file that entries written at `now` go to.
    pub fn file_for(&self, now: DateTime<Local>) -> PathBuf {
        self.dir
            .join(format!("{:04}-{:02}.log", now.year(), now.month()))
    }

    /// Appends `message` stamped with the current local time.
    ///
    /// Returns the block that was written, or `None` when `message` is empty.
    pub fn append(&self, message: &str, timestamp: bool) -> Result<Option<String>> {
        self.append_at(Local::now(), message, timestamp)
    }

    pub fn append_at(
        &self,
        now: DateTime<Local>,
        message: &str,
        timestamp: bool,
    ) -> Result<Option<String>> {
        if message.is_empty() {
            return Ok(None);
        }

        let block = format_block(now, message, timestamp);
        let path = self.file_for(now);
        let write_err = |source| UpdaterError::LogWrite {
            path: path.clone(),
            source,
        };

        std::fs::create_dir_all(&self.dir).map_err(write_err)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(write_err)?;
        file.write_all(block.as_bytes()).map_err(write_err)?;

        Ok(Some(block))
    }
}

/// Renders one log block.
pub fn format_block(now: DateTime<Local>, message: &str, timestamp: bool) -> String {
    if timestamp {
        format!("\r\n>> [{}] {message}\r\n", now.format(TIMESTAMP_FORMAT))
    } else {
        format!("\r\n>> {message}\r\n")
    }
}

/// Formats `time` the way log blocks and "next check" banners show it.
pub fn format_timestamp(time: DateTime<Local>) -> String {
    time.format(TIMESTAMP_FORMAT).to_string()
}
