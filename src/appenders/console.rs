//! Console appender implementation
//!
//! Echoes persisted batches to stdout. Lines are already rendered, so color
//! codes (when enabled) come through as they were formatted.

use crate::core::{Appender, Result};
use std::io::Write;

#[derive(Debug, Default)]
pub struct ConsoleAppender;

impl ConsoleAppender {
    pub fn new() -> Self {
        Self
    }
}

impl Appender for ConsoleAppender {
    fn append_batch(&mut self, batch: &[u8]) -> Result<()> {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(batch)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        std::io::stdout().flush()?;
        Ok(())
    }

    fn name(&self) -> &str {
        "console"
    }
}
