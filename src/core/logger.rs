//! Producer API
//!
//! [`Logger`] is the handle application threads log through. It filters by
//! level, renders the record on the calling thread and offers it to the
//! dispatch queue; it never does I/O and never blocks.

use super::{
    error::Result,
    formatter::{substitute, Formatter, TimestampFormat},
    log_level::LogLevel,
    log_record::LogRecord,
    metrics::LoggerMetrics,
    queue::{BoundedQueue, DEFAULT_QUEUE_CAPACITY},
};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Cheaply clonable producer handle; clones share level, formatter, queue
/// and metrics.
#[derive(Clone)]
pub struct Logger {
    min_level: Arc<RwLock<LogLevel>>,
    formatter: Arc<RwLock<Formatter>>,
    queue: BoundedQueue<LogRecord>,
    metrics: Arc<LoggerMetrics>,
}

impl Logger {
    /// Logger feeding `queue`, with default level and formatting
    #[must_use]
    pub fn new(queue: BoundedQueue<LogRecord>, metrics: Arc<LoggerMetrics>) -> Self {
        Self {
            min_level: Arc::new(RwLock::new(LogLevel::default())),
            formatter: Arc::new(RwLock::new(Formatter::default())),
            queue,
            metrics,
        }
    }

    pub fn builder() -> LoggerBuilder {
        LoggerBuilder::new()
    }

    pub fn set_min_level(&self, level: LogLevel) {
        *self.min_level.write() = level;
    }

    pub fn min_level(&self) -> LogLevel {
        *self.min_level.read()
    }

    #[inline]
    pub fn is_enabled(&self, level: LogLevel) -> bool {
        level >= *self.min_level.read()
    }

    pub fn set_color(&self, color: bool) {
        let mut formatter = self.formatter.write();
        *formatter = formatter.clone().with_color(color);
    }

    /// Log `template` with `{}` markers replaced by `args`.
    ///
    /// Never fails from the caller's point of view. A template/argument
    /// mismatch in a debug build is reported on stderr and the record is
    /// skipped.
    pub fn log(&self, level: LogLevel, template: &str, args: &[&dyn fmt::Display]) {
        if let Err(e) = self.try_log(level, template, args) {
            eprintln!("[LOGGER ERROR] {} in template {:?}", e, template);
        }
    }

    /// Like [`Logger::log`] but surfaces template errors.
    ///
    /// Returns `Ok(true)` if the record was queued, `Ok(false)` if it was
    /// filtered out or dropped because the queue was full.
    pub fn try_log(
        &self,
        level: LogLevel,
        template: &str,
        args: &[&dyn fmt::Display],
    ) -> Result<bool> {
        if !self.is_enabled(level) {
            return Ok(false);
        }

        let message = substitute(template, args)?;
        let record = LogRecord::new(level, &message, &self.formatter.read());
        Ok(self.submit(record))
    }

    /// Offer an already built record, applying the drop policy on overflow
    pub fn submit(&self, record: LogRecord) -> bool {
        if self.queue.enqueue(record) {
            self.metrics.record_enqueued();
            true
        } else {
            self.metrics.record_dropped();
            false
        }
    }

    #[inline]
    pub fn trace(&self, template: &str, args: &[&dyn fmt::Display]) {
        self.log(LogLevel::Trace, template, args);
    }

    #[inline]
    pub fn debug(&self, template: &str, args: &[&dyn fmt::Display]) {
        self.log(LogLevel::Debug, template, args);
    }

    #[inline]
    pub fn info(&self, template: &str, args: &[&dyn fmt::Display]) {
        self.log(LogLevel::Info, template, args);
    }

    #[inline]
    pub fn warn(&self, template: &str, args: &[&dyn fmt::Display]) {
        self.log(LogLevel::Warn, template, args);
    }

    #[inline]
    pub fn error(&self, template: &str, args: &[&dyn fmt::Display]) {
        self.log(LogLevel::Error, template, args);
    }

    /// Number of records dropped because the dispatch queue was full
    pub fn dropped_count(&self) -> u64 {
        self.metrics.dropped_count()
    }

    pub fn metrics(&self) -> &LoggerMetrics {
        &self.metrics
    }

    /// The dispatch queue this logger feeds
    pub fn queue(&self) -> &BoundedQueue<LogRecord> {
        &self.queue
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("min_level", &self.min_level())
            .field("queued", &self.queue.len())
            .field("capacity", &self.queue.capacity())
            .finish()
    }
}

/// Builder for constructing a standalone Logger and its dispatch queue
///
/// # Example
/// ```
/// use logpipe::prelude::*;
///
/// let logger = Logger::builder()
///     .min_level(LogLevel::Debug)
///     .queue_capacity(1000)
///     .color(false)
///     .build()
///     .unwrap();
/// logger.debug("cache warmed in {} ms", &[&12]);
/// assert_eq!(logger.queue().len(), 1);
/// ```
pub struct LoggerBuilder {
    min_level: LogLevel,
    queue_capacity: usize,
    timestamp_format: TimestampFormat,
    color: bool,
    metrics: Option<Arc<LoggerMetrics>>,
}

impl LoggerBuilder {
    pub fn new() -> Self {
        Self {
            min_level: LogLevel::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            timestamp_format: TimestampFormat::default(),
            color: false,
            metrics: None,
        }
    }

    #[must_use]
    pub fn min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    #[must_use]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    #[must_use]
    pub fn timestamp_format(mut self, format: TimestampFormat) -> Self {
        self.timestamp_format = format;
        self
    }

    #[must_use]
    pub fn color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    /// Share an existing metrics instance instead of creating one
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<LoggerMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Result<Logger> {
        self.timestamp_format.validate()?;
        let queue = BoundedQueue::new(self.queue_capacity)?;
        let metrics = self.metrics.unwrap_or_default();
        let logger = Logger::new(queue, metrics);
        logger.set_min_level(self.min_level);
        *logger.formatter.write() = Formatter::new(self.timestamp_format, self.color);
        Ok(logger)
    }
}

impl Default for LoggerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn logger(capacity: usize) -> Logger {
        Logger::builder().queue_capacity(capacity).build().unwrap()
    }

    #[test]
    fn test_below_threshold_is_noop() {
        let logger = logger(10);
        logger.trace("hidden {}", &[&1]);
        logger.debug("hidden", &[]);
        assert!(logger.queue().is_empty());
        assert_eq!(logger.metrics().total_enqueued(), 0);
        assert_eq!(logger.dropped_count(), 0);
    }

    #[test]
    fn test_filtered_call_skips_template_check() {
        let logger = logger(10);
        // Too few args, but the level gate runs first
        assert!(!logger.try_log(LogLevel::Debug, "{} {}", &[]).unwrap());
    }

    #[test]
    fn test_accepted_record_is_rendered() {
        let logger = logger(10);
        logger.info("user {} logged in", &[&"alice"]);
        let batch = logger.queue().drain_batch(10, Duration::from_millis(10));
        assert_eq!(batch.len(), 1);
        assert!(batch[0].text().contains("[INFO]"));
        assert!(batch[0].text().ends_with("user alice logged in"));
    }

    #[test]
    fn test_set_min_level_shared_between_clones() {
        let logger = logger(10);
        let clone = logger.clone();
        clone.set_min_level(LogLevel::Error);
        assert!(!logger.is_enabled(LogLevel::Warn));
        logger.warn("dropped by filter", &[]);
        assert!(logger.queue().is_empty());
    }

    #[test]
    fn test_overflow_drops_newest_and_counts() {
        let logger = logger(2);
        for i in 0..5 {
            logger.error("message {}", &[&i]);
        }
        assert_eq!(logger.queue().len(), 2);
        assert_eq!(logger.dropped_count(), 3);
        assert_eq!(logger.metrics().total_enqueued(), 2);

        let kept = logger.queue().drain_batch(10, Duration::from_millis(10));
        assert!(kept[0].text().ends_with("message 0"));
        assert!(kept[1].text().ends_with("message 1"));
    }

    #[test]
    fn test_set_color_applies_to_new_records() {
        let logger = logger(10);
        logger.set_color(true);
        logger.warn("colored", &[]);
        let batch = logger.queue().drain_batch(1, Duration::from_millis(10));
        assert!(batch[0].text().contains("\u{1b}["));
    }

    #[test]
    #[cfg(debug_assertions)]
    fn test_argument_mismatch_surfaces_in_debug() {
        let logger = logger(10);
        assert!(logger.try_log(LogLevel::Error, "{} {}", &[&1]).is_err());
        // log() swallows it
        logger.error("{} {}", &[&1]);
        assert!(logger.queue().is_empty());
    }

    #[test]
    fn test_builder_rejects_bad_timestamp_pattern() {
        let err = Logger::builder()
            .timestamp_format(TimestampFormat::Custom("%Q".into()))
            .build()
            .unwrap_err();
        assert!(err.is_configuration());
    }
}
