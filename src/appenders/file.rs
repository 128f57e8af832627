//! File appender implementation
//!
//! Appends batches to a single file held under an exclusive advisory lock,
//! so only one appender in any process writes a given file at a time.

use crate::core::{Appender, LoggerError, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Buffer size for the file writer (64 KB)
const BUFFER_SIZE: usize = 64 * 1024;

pub struct FileAppender {
    writer: Option<BufWriter<File>>,
    path: PathBuf,
}

impl FileAppender {
    /// Open `path` for appending, creating it and its parent directories.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be opened or another appender holds it.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let writer = Self::open(&path)?;
        Ok(Self {
            writer: Some(writer),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(path: &Path) -> Result<BufWriter<File>> {
        let display = path.display().to_string();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| LoggerError::file_appender(&display, e.to_string()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| LoggerError::file_appender(&display, e.to_string()))?;
        FileExt::try_lock_exclusive(&file).map_err(|_| LoggerError::file_lock(&display))?;

        Ok(BufWriter::with_capacity(BUFFER_SIZE, file))
    }

    /// Flush what is buffered, then unlock and close.
    fn close(mut writer: BufWriter<File>) {
        if let Err(e) = writer.flush() {
            eprintln!("[LOGGER ERROR] Failed to flush log file on close: {}", e);
        }
        let (file, _unwritten) = writer.into_parts();
        let _ = FileExt::unlock(&file);
    }

    /// Throw away bytes the writer could not hand to the file.
    ///
    /// A failed batch is retried or dropped as a whole, so leftovers must
    /// not be written ahead of the next attempt.
    fn discard_buffered(&mut self) {
        if let Some(writer) = self.writer.take() {
            let (file, _unwritten) = writer.into_parts();
            self.writer = Some(BufWriter::with_capacity(BUFFER_SIZE, file));
        }
    }
}

impl Appender for FileAppender {
    fn append_batch(&mut self, batch: &[u8]) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| LoggerError::writer("File writer not initialized"))?;
        if let Err(e) = writer.write_all(batch) {
            self.discard_buffered();
            return Err(e.into());
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let result = match self.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => return Ok(()),
        };
        if let Err(e) = result {
            self.discard_buffered();
            return Err(e.into());
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "file"
    }

    /// Open and lock `path`, then release the current file.
    ///
    /// The new file is opened before the old one is closed, so a failure
    /// leaves the appender writing where it was. A broken old file does
    /// not block the switch. Reopening the current path is a no-op.
    fn reopen(&mut self, path: &Path) -> Result<()> {
        if path == self.path && self.writer.is_some() {
            return Ok(());
        }

        if let Err(e) = self.flush() {
            eprintln!(
                "[LOGGER WARNING] Leaving '{}' with unflushed data: {}",
                self.path.display(),
                e
            );
        }
        let writer = Self::open(path)?;
        if let Some(old) = self.writer.replace(writer) {
            Self::close(old);
        }
        self.path = path.to_path_buf();
        Ok(())
    }

    fn supports_reopen(&self) -> bool {
        true
    }
}

impl Drop for FileAppender {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            Self::close(writer);
        }
    }
}
