//! Line formatting for log records
//!
//! A record is rendered once, on the producer thread, into
//! `[<timestamp>] [<LEVEL>] [<source>] <message>`. Everything downstream
//! (queues, the wire, the log file) carries that text unchanged.

use super::error::{LoggerError, Result};
use super::log_level::LogLevel;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write};

const DATE_TIME_PATTERN: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Timestamp rendering options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimestampFormat {
    /// `2025-01-08 10:30:45.123`
    #[default]
    DateTime,

    /// ISO 8601 with milliseconds: `2025-01-08T10:30:45.123Z`
    Iso8601,

    /// RFC 3339 format: `2025-01-08T10:30:45.123+00:00`
    Rfc3339,

    /// Unix timestamp in milliseconds: `1736332245123`
    UnixMillis,

    /// Custom strftime format
    Custom(String),
}

impl TimestampFormat {
    #[must_use]
    pub fn format(&self, datetime: &DateTime<Utc>) -> String {
        match self {
            TimestampFormat::DateTime => datetime.format(DATE_TIME_PATTERN).to_string(),
            TimestampFormat::Iso8601 => datetime.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
            TimestampFormat::Rfc3339 => {
                datetime.to_rfc3339_opts(chrono::SecondsFormat::Millis, false)
            }
            TimestampFormat::UnixMillis => datetime.timestamp_millis().to_string(),
            TimestampFormat::Custom(format_str) => {
                let mut out = String::new();
                let items = StrftimeItems::new(format_str);
                if write!(out, "{}", datetime.format_with_items(items)).is_err() {
                    // Unvalidated pattern; render something rather than fail the caller
                    out.clear();
                    let _ = write!(out, "{}", datetime.format(DATE_TIME_PATTERN));
                }
                out
            }
        }
    }

    /// Reject custom patterns chrono cannot render.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError::InvalidConfiguration`] for an unknown or
    /// incomplete strftime specifier.
    pub fn validate(&self) -> Result<()> {
        if let TimestampFormat::Custom(format_str) = self {
            if StrftimeItems::new(format_str).any(|item| matches!(item, Item::Error)) {
                return Err(LoggerError::config(
                    "timestamp_format",
                    format!("invalid strftime pattern '{}'", format_str),
                ));
            }
        }
        Ok(())
    }

    /// Parse a timestamp previously produced by [`TimestampFormat::format`].
    ///
    /// Returns `None` for custom formats and for input that does not match.
    pub fn parse(&self, s: &str) -> Option<DateTime<Utc>> {
        match self {
            TimestampFormat::DateTime => NaiveDateTime::parse_from_str(s, DATE_TIME_PATTERN)
                .ok()
                .map(|naive| naive.and_utc()),
            TimestampFormat::Iso8601 | TimestampFormat::Rfc3339 => {
                DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.with_timezone(&Utc))
            }
            TimestampFormat::UnixMillis => s
                .parse::<i64>()
                .ok()
                .and_then(DateTime::<Utc>::from_timestamp_millis),
            TimestampFormat::Custom(_) => None,
        }
    }
}

/// Renders records into their final line text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Formatter {
    timestamp_format: TimestampFormat,
    color: bool,
}

impl Formatter {
    pub fn new(timestamp_format: TimestampFormat, color: bool) -> Self {
        Self {
            timestamp_format,
            color,
        }
    }

    #[must_use]
    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    pub fn color(&self) -> bool {
        self.color
    }

    pub fn timestamp_format(&self) -> &TimestampFormat {
        &self.timestamp_format
    }

    /// Build the full line for one event. The result never contains a
    /// newline: line breaks in the source and message are escaped so one
    /// record is always one line on the wire and in the file.
    pub fn format_line(
        &self,
        timestamp: &DateTime<Utc>,
        level: LogLevel,
        source: &str,
        message: &str,
    ) -> String {
        let timestamp = self.timestamp_format.format(timestamp);
        let mut line = String::with_capacity(timestamp.len() + source.len() + message.len() + 24);

        line.push('[');
        line.push_str(&timestamp);
        line.push_str("] [");
        if self.color {
            let _ = write!(
                line,
                "\u{1b}[{}m{}\u{1b}[0m",
                level.color_code().to_fg_str(),
                level.to_str()
            );
        } else {
            line.push_str(level.to_str());
        }
        line.push_str("] [");
        push_sanitized(&mut line, source);
        line.push_str("] ");
        push_sanitized(&mut line, message);
        line
    }
}

/// Escape characters that would break line framing
fn push_sanitized(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
}

/// Substitute `{}` markers in `template` with `args`, left to right.
///
/// `{{` and `}}` produce literal braces and extra arguments are ignored.
/// When there are more markers than arguments, debug builds return
/// [`LoggerError::ArgumentMismatch`]; release builds leave the unmatched
/// markers in the output.
pub fn substitute(template: &str, args: &[&dyn fmt::Display]) -> Result<String> {
    let mut out = String::with_capacity(template.len() + args.len() * 8);
    let mut args_iter = args.iter();
    let mut markers = 0usize;
    let mut missing = false;
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, chars.peek()) {
            ('{', Some('{')) => {
                chars.next();
                out.push('{');
            }
            ('}', Some('}')) => {
                chars.next();
                out.push('}');
            }
            ('{', Some('}')) => {
                chars.next();
                markers += 1;
                match args_iter.next() {
                    Some(arg) => {
                        let _ = write!(out, "{}", arg);
                    }
                    None => {
                        missing = true;
                        out.push_str("{}");
                    }
                }
            }
            (c, _) => out.push(c),
        }
    }

    if missing && cfg!(debug_assertions) {
        return Err(LoggerError::argument_mismatch(markers, args.len()));
    }
    Ok(out)
}
