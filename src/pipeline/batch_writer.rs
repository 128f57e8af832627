//! Batch writer
//!
//! Worker threads drain a record queue in batches and append each batch to
//! the attached appenders through one mutex-guarded write path, so batches
//! from different workers never interleave and a file switch never cuts a
//! batch in half.

use super::{join_all, panic_message};
use crate::core::{
    encode_lines, Appender, BatchConfig, BoundedQueue, LogRecord, LoggerError, LoggerMetrics,
    Result, DEFAULT_SHUTDOWN_TIMEOUT,
};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Time allowed past the drain deadline for a batch already being written
const WRITE_GRACE: Duration = Duration::from_millis(50);

type SharedAppenders = Arc<Mutex<Vec<Box<dyn Appender>>>>;

/// Set once on shutdown; workers stop draining when it passes
type DrainDeadline = Arc<Mutex<Option<Instant>>>;

pub struct BatchWriter {
    queue: BoundedQueue<LogRecord>,
    appenders: SharedAppenders,
    deadline: DrainDeadline,
    handles: Vec<JoinHandle<()>>,
    metrics: Arc<LoggerMetrics>,
}

impl BatchWriter {
    /// Spawn `config.workers` threads draining `queue` into `appenders`.
    pub fn start(
        queue: BoundedQueue<LogRecord>,
        appenders: Vec<Box<dyn Appender>>,
        config: &BatchConfig,
        metrics: Arc<LoggerMetrics>,
    ) -> Result<Self> {
        config.validate()?;
        if appenders.is_empty() {
            return Err(LoggerError::config("batch writer", "no appenders attached"));
        }

        let mut writer = Self {
            queue,
            appenders: Arc::new(Mutex::new(appenders)),
            deadline: Arc::new(Mutex::new(None)),
            handles: Vec::with_capacity(config.workers),
            metrics,
        };

        for id in 0..config.workers {
            let worker = Worker {
                queue: writer.queue.clone(),
                appenders: Arc::clone(&writer.appenders),
                deadline: Arc::clone(&writer.deadline),
                metrics: Arc::clone(&writer.metrics),
                max_batch: config.max_batch,
                max_wait: config.max_wait,
                write_attempts: config.write_attempts,
            };
            let spawned = thread::Builder::new()
                .name(format!("logpipe-writer-{}", id))
                .spawn(move || worker.run());
            match spawned {
                Ok(handle) => writer.handles.push(handle),
                Err(e) => {
                    writer.shutdown(DEFAULT_SHUTDOWN_TIMEOUT);
                    return Err(LoggerError::io_operation(
                        "spawning batch writer",
                        format!("worker {}", id),
                        e,
                    ));
                }
            }
        }

        Ok(writer)
    }

    /// Point file appenders at `path`.
    ///
    /// Takes the write lock, so a batch already being written finishes in
    /// the old file and every later batch goes to the new one.
    pub fn set_log_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut appenders = self.appenders.lock();
        let mut switched = false;
        for appender in appenders.iter_mut().filter(|a| a.supports_reopen()) {
            appender.reopen(path)?;
            switched = true;
        }
        if !switched {
            return Err(LoggerError::config(
                "batch writer",
                "no file appender to switch",
            ));
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        !self.handles.is_empty() && self.deadline.lock().is_none()
    }

    /// Ask workers to drain the queue and stop, wait up to `timeout`, then
    /// flush and close the appenders.
    ///
    /// Workers stop at the deadline even if producers keep the queue busy.
    /// Returns `true` if every worker finished and the queue was empty.
    pub fn shutdown(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        *self.deadline.lock() = Some(deadline);
        let finished = join_all(&mut self.handles, deadline + WRITE_GRACE, "batch writer");

        let left = self.queue.len();
        if left > 0 {
            eprintln!(
                "[LOGGER WARNING] Batch writer stopped with {} records still queued",
                left
            );
        }

        let mut appenders = self.appenders.lock();
        for appender in appenders.iter_mut() {
            if let Err(e) = appender.flush() {
                eprintln!(
                    "[LOGGER ERROR] Appender '{}' flush failed during shutdown: {}",
                    appender.name(),
                    e
                );
            }
        }
        // Dropping the appenders closes files and releases their locks
        appenders.clear();
        finished && left == 0
    }
}

impl Drop for BatchWriter {
    fn drop(&mut self) {
        if self.deadline.lock().is_none() {
            self.shutdown(DEFAULT_SHUTDOWN_TIMEOUT);
        }
    }
}

struct Worker {
    queue: BoundedQueue<LogRecord>,
    appenders: SharedAppenders,
    deadline: DrainDeadline,
    metrics: Arc<LoggerMetrics>,
    max_batch: usize,
    max_wait: Duration,
    write_attempts: u32,
}

impl Worker {
    fn run(self) {
        loop {
            let deadline = *self.deadline.lock();
            if deadline.is_some_and(|d| Instant::now() >= d) {
                break;
            }

            let batch = self.queue.drain_batch(self.max_batch, self.max_wait);
            if batch.is_empty() {
                // Before the deadline, stop only once a drain comes back empty
                if deadline.is_some() {
                    break;
                }
                continue;
            }
            write_batch(&self.appenders, &batch, self.write_attempts, &self.metrics);
        }
    }
}

/// Append one batch to every appender, retrying each up to
/// `write_attempts` times without delay.
///
/// **Per-Appender Panic Isolation**: a panicking appender loses this batch
/// but the others still receive it.
fn write_batch(
    appenders: &SharedAppenders,
    batch: &[LogRecord],
    write_attempts: u32,
    metrics: &LoggerMetrics,
) {
    let buf = encode_lines(batch);
    let mut appenders = appenders.lock();
    if appenders.is_empty() {
        metrics.record_batch_dropped();
        return;
    }

    let mut has_error = false;
    for appender in appenders.iter_mut() {
        let mut attempt = 1;
        loop {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                appender.append_batch(&buf)?;
                appender.flush()
            }));

            match result {
                Ok(Ok(())) => break,
                Ok(Err(_)) if attempt < write_attempts => {
                    metrics.record_write_retry();
                    attempt += 1;
                }
                Ok(Err(e)) => {
                    eprintln!(
                        "[LOGGER ERROR] Appender '{}' dropped a batch of {} records after {} attempts: {}",
                        appender.name(),
                        batch.len(),
                        attempt,
                        e
                    );
                    has_error = true;
                    break;
                }
                Err(panic_info) => {
                    eprintln!(
                        "[LOGGER CRITICAL] Appender '{}' panicked: {}. \
                         Other appenders continue to function.",
                        appender.name(),
                        panic_message(panic_info.as_ref())
                    );
                    has_error = true;
                    break;
                }
            }
        }
    }

    if has_error {
        metrics.record_batch_dropped();
    } else {
        metrics.record_batch_written(batch.len());
    }
}
