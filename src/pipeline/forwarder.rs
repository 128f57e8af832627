//! Network forwarder
//!
//! A single worker thread owns the connection to the ingestion server. It
//! drains the dispatch queue in batches while connected and leaves records
//! queued while it is reconnecting, so a server outage turns into producer
//! side drops rather than unbounded memory.

use super::backoff::Backoff;
use crate::appenders::NetworkConnection;
use crate::core::{
    BoundedQueue, ForwarderConfig, LogRecord, LoggerError, LoggerMetrics, Result,
    DEFAULT_SHUTDOWN_TIMEOUT,
};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Extra time allowed for the worker to close its socket after the drain
/// deadline passes
const CLOSE_GRACE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForwarderState {
    Disconnected,
    Connecting,
    Connected,
    Draining,
    Closed,
}

impl fmt::Display for ForwarderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ForwarderState::Disconnected => "DISCONNECTED",
            ForwarderState::Connecting => "CONNECTING",
            ForwarderState::Connected => "CONNECTED",
            ForwarderState::Draining => "DRAINING",
            ForwarderState::Closed => "CLOSED",
        };
        write!(f, "{}", s)
    }
}

pub struct Forwarder {
    address: String,
    state: Arc<Mutex<ForwarderState>>,
    /// Carries the drain deadline to the worker
    stop_tx: Sender<Instant>,
    handle: Option<JoinHandle<()>>,
}

impl Forwarder {
    /// Start the worker. The first connection attempt happens on the worker
    /// thread, so an unreachable server does not fail startup.
    pub fn start(
        queue: BoundedQueue<LogRecord>,
        address: impl Into<String>,
        config: &ForwarderConfig,
        metrics: Arc<LoggerMetrics>,
    ) -> Result<Self> {
        config.validate()?;
        let address = address.into();
        let state = Arc::new(Mutex::new(ForwarderState::Disconnected));
        let (stop_tx, stop_rx) = bounded(1);

        let worker = Worker {
            queue,
            address: address.clone(),
            config: config.clone(),
            metrics,
            state: Arc::clone(&state),
            stop_rx,
            connection: None,
            backoff: Backoff::new(config.backoff_base, config.backoff_cap),
            connected_once: false,
        };
        let handle = thread::Builder::new()
            .name("logpipe-forwarder".to_string())
            .spawn(move || worker.run())
            .map_err(|e| LoggerError::io_operation("spawning forwarder", address.clone(), e))?;

        Ok(Self {
            address,
            state,
            stop_tx,
            handle: Some(handle),
        })
    }

    pub fn state(&self) -> ForwarderState {
        *self.state.lock()
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Drain what is already queued within `timeout`, then close.
    ///
    /// Returns `true` if the worker finished before the deadline.
    pub fn shutdown(&mut self, timeout: Duration) -> bool {
        let Some(handle) = self.handle.take() else {
            return true;
        };

        let deadline = Instant::now() + timeout;
        // A full channel means a deadline was already sent
        let _ = self.stop_tx.try_send(deadline);

        let mut handles = vec![handle];
        super::join_all(&mut handles, deadline + CLOSE_GRACE, "forwarder")
    }
}

impl Drop for Forwarder {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.shutdown(DEFAULT_SHUTDOWN_TIMEOUT);
        }
    }
}

struct Worker {
    queue: BoundedQueue<LogRecord>,
    address: String,
    config: ForwarderConfig,
    metrics: Arc<LoggerMetrics>,
    state: Arc<Mutex<ForwarderState>>,
    stop_rx: Receiver<Instant>,
    connection: Option<NetworkConnection>,
    backoff: Backoff,
    connected_once: bool,
}

impl Worker {
    fn run(mut self) {
        let deadline = loop {
            match self.stop_rx.try_recv() {
                Ok(deadline) => break deadline,
                Err(TryRecvError::Disconnected) => {
                    break Instant::now() + DEFAULT_SHUTDOWN_TIMEOUT
                }
                Err(TryRecvError::Empty) => {}
            }

            if self.connection.is_none() {
                if let Err(e) = self.connect() {
                    let delay = self.backoff.next_delay();
                    eprintln!(
                        "[LOGGER WARNING] Forwarder cannot reach {}: {}. Retrying in {:?}",
                        self.address, e, delay
                    );
                    // Sleep on the stop channel so shutdown interrupts the backoff
                    match self.stop_rx.recv_timeout(delay) {
                        Ok(deadline) => break deadline,
                        Err(RecvTimeoutError::Disconnected) => {
                            break Instant::now() + DEFAULT_SHUTDOWN_TIMEOUT
                        }
                        Err(RecvTimeoutError::Timeout) => continue,
                    }
                }
            }

            let batch = self
                .queue
                .drain_batch(self.config.max_batch, self.config.max_wait);
            if !batch.is_empty() {
                self.send(&batch);
            }
        };

        self.drain(deadline);
    }

    fn set_state(&self, state: ForwarderState) {
        *self.state.lock() = state;
    }

    fn connect(&mut self) -> Result<()> {
        self.set_state(ForwarderState::Connecting);
        match NetworkConnection::connect(
            &self.address,
            self.config.connect_timeout,
            self.config.write_timeout,
        ) {
            Ok(connection) => {
                if self.connected_once {
                    self.metrics.record_reconnect();
                }
                self.connected_once = true;
                self.backoff.reset();
                self.connection = Some(connection);
                self.set_state(ForwarderState::Connected);
                Ok(())
            }
            Err(e) => {
                self.set_state(ForwarderState::Disconnected);
                Err(e)
            }
        }
    }

    /// Write one batch. On failure the connection is dropped and the batch
    /// is lost.
    fn send(&mut self, batch: &[LogRecord]) -> bool {
        let Some(connection) = self.connection.as_mut() else {
            self.metrics.record_lost_in_flight(batch.len());
            return false;
        };

        match connection.send_batch(batch) {
            Ok(()) => {
                self.metrics.record_forwarded(batch.len());
                true
            }
            Err(e) => {
                eprintln!(
                    "[LOGGER ERROR] Forwarder lost {} records sending to {}: {}",
                    batch.len(),
                    self.address,
                    e
                );
                self.metrics.record_lost_in_flight(batch.len());
                self.connection = None;
                // Keep Draining visible once shutdown has started
                let mut state = self.state.lock();
                if *state != ForwarderState::Draining {
                    *state = ForwarderState::Disconnected;
                }
                false
            }
        }
    }

    fn drain(mut self, deadline: Instant) {
        self.set_state(ForwarderState::Draining);

        if self.connection.is_none() && !self.queue.is_empty() {
            // One attempt only; a dead server must not hold up shutdown
            let timeout = deadline
                .saturating_duration_since(Instant::now())
                .clamp(Duration::from_millis(1), self.config.connect_timeout);
            match NetworkConnection::connect(&self.address, timeout, self.config.write_timeout) {
                Ok(connection) => self.connection = Some(connection),
                Err(e) => eprintln!(
                    "[LOGGER ERROR] Forwarder could not reconnect to {} during shutdown: {}",
                    self.address, e
                ),
            }
        }

        while Instant::now() < deadline {
            let batch = self.queue.drain_batch(self.config.max_batch, Duration::ZERO);
            if batch.is_empty() {
                break;
            }
            if !self.send(&batch) {
                break;
            }
        }

        let left = self.queue.len();
        if left > 0 {
            eprintln!(
                "[LOGGER WARNING] Forwarder closed with {} records still queued",
                left
            );
        }

        if let Some(connection) = self.connection.take() {
            if let Err(e) = connection.close() {
                eprintln!("[LOGGER ERROR] Forwarder close failed: {}", e);
            }
        }
        self.set_state(ForwarderState::Closed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;

    fn fast_config() -> ForwarderConfig {
        ForwarderConfig {
            max_wait: Duration::from_millis(5),
            backoff_base: Duration::from_millis(20),
            backoff_cap: Duration::from_millis(100),
            connect_timeout: Duration::from_millis(200),
            ..ForwarderConfig::default()
        }
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_forwards_queued_records_in_order() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let reader = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            BufReader::new(stream)
                .lines()
                .collect::<std::io::Result<Vec<_>>>()
                .unwrap()
        });

        let queue = BoundedQueue::new(100).unwrap();
        let metrics = Arc::new(LoggerMetrics::new());
        let mut forwarder =
            Forwarder::start(queue.clone(), addr, &fast_config(), Arc::clone(&metrics)).unwrap();
        for i in 0..50 {
            assert!(queue.enqueue(LogRecord::received(format!("record {}", i), "test")));
        }

        assert!(forwarder.shutdown(Duration::from_secs(5)));
        assert_eq!(forwarder.state(), ForwarderState::Closed);

        let lines = reader.join().unwrap();
        let expected: Vec<String> = (0..50).map(|i| format!("record {}", i)).collect();
        assert_eq!(lines, expected);
        assert_eq!(metrics.total_forwarded(), 50);
    }

    #[test]
    fn test_unreachable_server_keeps_records_queued() {
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let queue = BoundedQueue::new(10).unwrap();
        let mut forwarder = Forwarder::start(
            queue.clone(),
            format!("127.0.0.1:{}", port),
            &fast_config(),
            Arc::new(LoggerMetrics::new()),
        )
        .unwrap();

        assert!(queue.enqueue(LogRecord::received("waiting", "test")));
        assert!(wait_for(|| forwarder.state() == ForwarderState::Disconnected));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(queue.len(), 1);

        // Shutdown is not held up by the dead server
        let start = Instant::now();
        assert!(forwarder.shutdown(Duration::from_millis(300)));
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(forwarder.state(), ForwarderState::Closed);
    }

    #[test]
    fn test_shutdown_twice() {
        let queue = BoundedQueue::new(10).unwrap();
        let mut forwarder = Forwarder::start(
            queue,
            "127.0.0.1:1",
            &fast_config(),
            Arc::new(LoggerMetrics::new()),
        )
        .unwrap();
        assert!(forwarder.shutdown(Duration::from_millis(200)));
        assert!(forwarder.shutdown(Duration::from_millis(200)));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ForwarderState::Connected.to_string(), "CONNECTED");
        assert_eq!(ForwarderState::Draining.to_string(), "DRAINING");
    }
}
