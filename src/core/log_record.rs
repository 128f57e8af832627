//! Log record structure

use super::formatter::Formatter;
use super::log_level::LogLevel;
use chrono::{DateTime, Utc};

// Per-thread source tag, computed on first use
thread_local! {
    static SOURCE_TAG: String = {
        let current = std::thread::current();
        match current.name() {
            Some(name) => name.to_string(),
            None => format!("{:?}", current.id()),
        }
    };
}

/// Source tag of the calling thread: its name if set, otherwise its id
pub fn current_source() -> String {
    SOURCE_TAG.with(Clone::clone)
}

/// One fully rendered log event.
///
/// Fields are private so a record cannot change after construction; the
/// `text` is what gets forwarded and persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    timestamp: DateTime<Utc>,
    level: LogLevel,
    source: String,
    text: String,
}

impl LogRecord {
    /// Capture the current instant and thread and render `message`
    pub fn new(level: LogLevel, message: &str, formatter: &Formatter) -> Self {
        let timestamp = Utc::now();
        let source = current_source();
        let text = formatter.format_line(&timestamp, level, &source, message);
        Self {
            timestamp,
            level,
            source,
            text,
        }
    }

    /// Rebuild a record from a line received over the wire.
    ///
    /// The line is kept verbatim. The level is read from its tag when one
    /// is present and defaults to INFO otherwise.
    pub fn received(line: impl Into<String>, peer: impl Into<String>) -> Self {
        let text = line.into();
        Self {
            timestamp: Utc::now(),
            level: LogLevel::sniff(&text).unwrap_or_default(),
            source: peer.into(),
            text,
        }
    }

    pub fn timestamp(&self) -> &DateTime<Utc> {
        &self.timestamp
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

/// Concatenate records into one newline-terminated buffer
pub fn encode_lines(records: &[LogRecord]) -> Vec<u8> {
    let len = records.iter().map(|r| r.text.len() + 1).sum();
    let mut buf = Vec::with_capacity(len);
    for record in records {
        buf.extend_from_slice(record.text.as_bytes());
        buf.push(b'\n');
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_renders_once() {
        let record = LogRecord::new(LogLevel::Warn, "disk low", &Formatter::default());
        assert_eq!(record.level(), LogLevel::Warn);
        assert!(record.text().contains("[WARN]"));
        assert!(record.text().ends_with("disk low"));
        assert!(record.text().contains(&format!("[{}]", record.source())));
    }

    #[test]
    fn test_named_thread_source() {
        let source = std::thread::Builder::new()
            .name("producer-7".into())
            .spawn(current_source)
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(source, "producer-7");
    }

    #[test]
    fn test_received_keeps_line_verbatim() {
        let line = "[2025-01-08 10:30:45.123] [ERROR] [main] failed";
        let record = LogRecord::received(line, "127.0.0.1:5000");
        assert_eq!(record.text(), line);
        assert_eq!(record.level(), LogLevel::Error);
        assert_eq!(record.source(), "127.0.0.1:5000");

        let record = LogRecord::received("no tag here", "peer");
        assert_eq!(record.level(), LogLevel::Info);
    }

    #[test]
    fn test_encode_lines() {
        let records = vec![
            LogRecord::received("a", "p"),
            LogRecord::received("bc", "p"),
        ];
        assert_eq!(encode_lines(&records), b"a\nbc\n".to_vec());
        assert!(encode_lines(&[]).is_empty());
    }
}
