//! Stress tests for the bounded queue and drop policy
//!
//! These tests verify:
//! - The drop counter equals the number of rejected enqueues
//! - Queue length never exceeds capacity under concurrent producers
//! - Producers never block while the writer is slow or absent
//! - Thread safety under concurrent high-volume logging

use logpipe::core::{LogLevel, PipelineConfig};
use logpipe::pipeline::Pipeline;
use logpipe::{BoundedQueue, LogRecord, Logger};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Drop counter must match exactly the number of `false` results
#[test]
fn test_drop_counter_matches_rejected_enqueues() {
    // Nobody drains this queue, so most records overflow
    let logger = Logger::builder()
        .queue_capacity(64)
        .min_level(LogLevel::Trace)
        .build()
        .expect("Failed to build logger");

    let rejected = Arc::new(AtomicU64::new(0));
    let accepted = Arc::new(AtomicU64::new(0));
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let logger = logger.clone();
            let rejected = Arc::clone(&rejected);
            let accepted = Arc::clone(&accepted);
            thread::spawn(move || {
                for i in 0..1000 {
                    match logger.try_log(LogLevel::Info, "thread {} message {}", &[&t, &i]) {
                        Ok(true) => accepted.fetch_add(1, Ordering::Relaxed),
                        Ok(false) => rejected.fetch_add(1, Ordering::Relaxed),
                        Err(e) => panic!("unexpected error: {}", e),
                    };
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("Producer panicked");
    }

    assert_eq!(accepted.load(Ordering::Relaxed), 64);
    assert_eq!(logger.dropped_count(), rejected.load(Ordering::Relaxed));
    assert_eq!(logger.dropped_count(), 8 * 1000 - 64);
    assert_eq!(logger.metrics().total_enqueued(), 64);
    assert_eq!(logger.queue().len(), 64);
}

/// Queue length stays within capacity while producers and a consumer race
#[test]
fn test_queue_never_exceeds_capacity() {
    const CAPACITY: usize = 128;
    let queue = BoundedQueue::new(CAPACITY).expect("Failed to create queue");
    let stop = Arc::new(AtomicBool::new(false));
    let max_seen = Arc::new(AtomicUsize::new(0));
    let false_enqueues = Arc::new(AtomicUsize::new(0));

    let producers: Vec<_> = (0..6)
        .map(|_| {
            let queue = queue.clone();
            let false_enqueues = Arc::clone(&false_enqueues);
            let max_seen = Arc::clone(&max_seen);
            thread::spawn(move || {
                for i in 0..5000 {
                    if !queue.enqueue(LogRecord::received(format!("line {}", i), "stress")) {
                        false_enqueues.fetch_add(1, Ordering::Relaxed);
                    }
                    max_seen.fetch_max(queue.len(), Ordering::Relaxed);
                }
            })
        })
        .collect();

    let consumer = {
        let queue = queue.clone();
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut received = 0usize;
            loop {
                let batch = queue.drain_batch(32, Duration::from_millis(5));
                if batch.is_empty() && stop.load(Ordering::Acquire) {
                    break;
                }
                received += batch.len();
                // Slow consumer so the queue keeps filling up
                thread::sleep(Duration::from_micros(200));
            }
            received
        })
    };

    for producer in producers {
        producer.join().expect("Producer panicked");
    }
    stop.store(true, Ordering::Release);
    let received = consumer.join().expect("Consumer panicked");

    assert!(max_seen.load(Ordering::Relaxed) <= CAPACITY);
    // Nothing is lost except through the drop policy, and nothing twice
    assert_eq!(received + false_enqueues.load(Ordering::Relaxed), 6 * 5000);
}

/// Logging calls return promptly even with the queue permanently full
#[test]
fn test_producers_never_block_on_full_queue() {
    let logger = Logger::builder()
        .queue_capacity(1)
        .build()
        .expect("Failed to build logger");
    logger.info("fills the queue", &[]);

    let start = Instant::now();
    for i in 0..100_000 {
        logger.info("overflow {}", &[&i]);
    }
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(logger.dropped_count(), 100_000);
}

/// Concurrent logging through a running pipeline
#[test]
fn test_concurrent_pipeline_logging() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("concurrent.log");

    let config = PipelineConfig::local(&log_file).with_queue_capacity(100_000);
    let mut pipeline = Pipeline::start(config).expect("Failed to start pipeline");

    let handles: Vec<_> = (0..10)
        .map(|t| {
            let logger = pipeline.logger().clone();
            thread::spawn(move || {
                for i in 0..1000 {
                    logger.warn("thread {} iteration {}", &[&t, &i]);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("Thread panicked");
    }
    assert!(pipeline.shutdown(Duration::from_secs(10)));

    let content = std::fs::read_to_string(&log_file).expect("Failed to read log file");
    let written = content.lines().count() as u64;
    let metrics = pipeline.metrics();
    assert_eq!(written + metrics.dropped_count(), 10_000);
    assert_eq!(metrics.total_written(), written);
    assert!(content.lines().all(|l| l.contains("] [WARN] [")));
}

/// Small queue with a live writer: accounting stays exact
#[test]
fn test_overflow_accounting_with_live_writer() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let log_file = temp_dir.path().join("overflow.log");

    let config = PipelineConfig::local(&log_file).with_queue_capacity(16);
    let mut pipeline = Pipeline::start(config).expect("Failed to start pipeline");
    let logger = pipeline.logger().clone();

    for i in 0..20_000 {
        logger.error("burst {}", &[&i]);
    }
    assert!(pipeline.shutdown(Duration::from_secs(10)));

    let written = std::fs::read_to_string(&log_file)
        .expect("Failed to read log file")
        .lines()
        .count() as u64;
    assert_eq!(written + pipeline.metrics().dropped_count(), 20_000);
    assert_eq!(pipeline.metrics().total_enqueued(), written);
}
