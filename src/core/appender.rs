//! Appender trait for batch destinations

use super::error::{LoggerError, Result};
use std::path::Path;

/// A destination the batch writer appends encoded batches to.
///
/// `batch` is a run of complete, newline-terminated lines. Implementations
/// must write it as a unit so lines from different batches never
/// interleave.
pub trait Appender: Send {
    fn append_batch(&mut self, batch: &[u8]) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
    fn name(&self) -> &str;

    /// Switch to a different destination path. Only file-backed appenders
    /// support this.
    fn reopen(&mut self, path: &Path) -> Result<()> {
        Err(LoggerError::writer(format!(
            "appender '{}' cannot switch to {}",
            self.name(),
            path.display()
        )))
    }

    fn supports_reopen(&self) -> bool {
        false
    }
}
