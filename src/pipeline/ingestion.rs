//! Ingestion server
//!
//! Accepts TCP connections from forwarders, reads `\n`-delimited lines on
//! pool workers and hands them to a batch writer through the ingestion
//! queue.

use super::batch_writer::BatchWriter;
use super::worker_pool::WorkerPool;
use crate::appenders::{ConsoleAppender, FileAppender};
use crate::core::{
    Appender, BoundedQueue, LogRecord, LoggerError, LoggerMetrics, Result, ServerConfig,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How often the accept loop checks the stop flag
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Wait for handlers to exit after their sockets are force-closed
const FORCE_CLOSE_GRACE: Duration = Duration::from_millis(200);

/// The writer always gets at least this long to drain
const MIN_WRITER_DRAIN: Duration = Duration::from_millis(100);

/// Overflow is reported on the first drop and then every this many
const DROP_REPORT_INTERVAL: u64 = 1000;

/// Longest accepted line; a peer exceeding it is disconnected
const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Open connections, kept so shutdown can close the ones that linger
#[derive(Default)]
struct ConnectionRegistry {
    next_id: AtomicU64,
    streams: Mutex<HashMap<u64, TcpStream>>,
}

impl ConnectionRegistry {
    fn register(&self, stream: &TcpStream) -> Option<u64> {
        let handle = stream.try_clone().ok()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.streams.lock().insert(id, handle);
        Some(id)
    }

    fn remove(&self, id: u64) {
        self.streams.lock().remove(&id);
    }

    fn len(&self) -> usize {
        self.streams.lock().len()
    }

    /// Shut down every registered socket so blocked reads return
    fn close_all(&self) -> usize {
        let streams: Vec<TcpStream> = self.streams.lock().drain().map(|(_, s)| s).collect();
        for stream in &streams {
            let _ = stream.shutdown(Shutdown::Both);
        }
        streams.len()
    }
}

/// Unregisters a connection when its handler returns or unwinds
struct Registration {
    registry: Arc<ConnectionRegistry>,
    id: Option<u64>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(id) = self.id {
            self.registry.remove(id);
        }
    }
}

pub struct IngestionServer {
    local_addr: SocketAddr,
    stop: Arc<AtomicBool>,
    accept_handle: Option<JoinHandle<()>>,
    pool: Arc<WorkerPool>,
    connections: Arc<ConnectionRegistry>,
    writer: Option<BatchWriter>,
    queue: BoundedQueue<LogRecord>,
    metrics: Arc<LoggerMetrics>,
    shutdown_timeout: Duration,
}

impl IngestionServer {
    /// Bind, open the log file and start accepting.
    ///
    /// # Errors
    ///
    /// Invalid configuration, a bind failure or a log file held by another
    /// appender are returned here, before the first connection is accepted.
    pub fn start(config: ServerConfig) -> Result<Self> {
        config.validate()?;

        let listener = TcpListener::bind(&config.listen_addr).map_err(|e| {
            LoggerError::config(
                "server",
                format!("cannot listen on {}: {}", config.listen_addr, e),
            )
        })?;
        let local_addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let mut appenders: Vec<Box<dyn Appender>> =
            vec![Box::new(FileAppender::new(&config.log_file)?)];
        if config.console_echo {
            appenders.push(Box::new(ConsoleAppender::new()));
        }

        let metrics = Arc::new(LoggerMetrics::new());
        let queue = BoundedQueue::new(config.queue_capacity)?;
        let writer = BatchWriter::start(
            queue.clone(),
            appenders,
            &config.batch,
            Arc::clone(&metrics),
        )?;
        let pool = Arc::new(WorkerPool::new("logpipe-ingest", config.pool.clone())?);
        let connections = Arc::new(ConnectionRegistry::default());
        let stop = Arc::new(AtomicBool::new(false));

        let acceptor = Acceptor {
            listener,
            stop: Arc::clone(&stop),
            pool: Arc::clone(&pool),
            connections: Arc::clone(&connections),
            queue: queue.clone(),
            metrics: Arc::clone(&metrics),
        };
        let accept_handle = thread::Builder::new()
            .name("logpipe-accept".to_string())
            .spawn(move || acceptor.run())
            .map_err(|e| {
                LoggerError::io_operation("spawning accept loop", local_addr.to_string(), e)
            })?;

        Ok(Self {
            local_addr,
            stop,
            accept_handle: Some(accept_handle),
            pool,
            connections,
            writer: Some(writer),
            queue,
            metrics,
            shutdown_timeout: config.shutdown_timeout,
        })
    }

    /// The bound address, with the real port when 0 was requested
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn metrics(&self) -> &LoggerMetrics {
        &self.metrics
    }

    /// Connections currently being read
    pub fn open_connections(&self) -> usize {
        self.connections.len()
    }

    /// Lines waiting for the writer
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn is_accepting(&self) -> bool {
        self.accept_handle.is_some()
    }

    /// Switch the persisted log file; see [`BatchWriter::set_log_file`]
    pub fn set_log_file(&self, path: impl AsRef<Path>) -> Result<()> {
        match &self.writer {
            Some(writer) => writer.set_log_file(path),
            None => Err(LoggerError::Stopped("ingestion server")),
        }
    }

    /// Stop the accept loop and close the listening socket. Connections
    /// already accepted keep being read.
    pub fn stop_accepting(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.accept_handle.take() {
            let mut handles = vec![handle];
            super::join_all(
                &mut handles,
                Instant::now() + ACCEPT_POLL_INTERVAL * 10,
                "accept loop",
            );
        }
    }

    /// Stop accepting, give open connections half of `timeout` to reach
    /// EOF, force-close the rest, then drain the writer.
    ///
    /// Returns `true` if nothing had to be forced.
    pub fn shutdown(&mut self, timeout: Duration) -> bool {
        let start = Instant::now();
        let deadline = start + timeout;
        self.stop_accepting();

        let mut clean = self.pool.shutdown(start + timeout / 2);
        if !clean {
            let closed = self.connections.close_all();
            eprintln!(
                "[LOGGER WARNING] Force-closing {} ingestion connection(s) at shutdown",
                closed
            );
            let grace = (Instant::now() + FORCE_CLOSE_GRACE).min(deadline);
            self.pool.shutdown(grace);
        }

        if let Some(mut writer) = self.writer.take() {
            let remaining = deadline
                .saturating_duration_since(Instant::now())
                .max(MIN_WRITER_DRAIN);
            clean &= writer.shutdown(remaining);
        }

        let dropped = self.metrics.ingest_dropped_count();
        if dropped > 0 {
            eprintln!(
                "[LOGGER WARNING] Ingestion server dropped {} lines due to a full queue",
                dropped
            );
        }
        clean
    }
}

impl Drop for IngestionServer {
    fn drop(&mut self) {
        if self.writer.is_some() {
            self.shutdown(self.shutdown_timeout);
        }
    }
}

struct Acceptor {
    listener: TcpListener,
    stop: Arc<AtomicBool>,
    pool: Arc<WorkerPool>,
    connections: Arc<ConnectionRegistry>,
    queue: BoundedQueue<LogRecord>,
    metrics: Arc<LoggerMetrics>,
}

impl Acceptor {
    fn run(self) {
        while !self.stop.load(Ordering::Acquire) {
            match self.listener.accept() {
                Ok((stream, peer)) => self.dispatch(stream, peer),
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    eprintln!("[LOGGER ERROR] Ingestion accept failed: {}", e);
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }

        // Connections the kernel completed before the stop are still served
        while let Ok((stream, peer)) = self.listener.accept() {
            self.dispatch(stream, peer);
        }
    }

    fn dispatch(&self, stream: TcpStream, peer: SocketAddr) {
        // Accepted sockets inherit non-blocking mode on some platforms
        if let Err(e) = stream.set_nonblocking(false) {
            eprintln!("[LOGGER ERROR] Dropping connection from {}: {}", peer, e);
            return;
        }
        self.metrics.record_connection_accepted();

        let registration = Registration {
            registry: Arc::clone(&self.connections),
            id: self.connections.register(&stream),
        };
        let queue = self.queue.clone();
        let metrics = Arc::clone(&self.metrics);
        let job = move || {
            let _registration = registration;
            read_lines(stream, peer, &queue, &metrics);
        };

        if let Err(e) = self.pool.execute(job) {
            eprintln!("[LOGGER ERROR] Dropping connection from {}: {}", peer, e);
        }
    }
}

/// Read lines from one connection until EOF, a socket error or a line
/// longer than [`MAX_LINE_BYTES`]
fn read_lines(
    stream: TcpStream,
    peer: SocketAddr,
    queue: &BoundedQueue<LogRecord>,
    metrics: &LoggerMetrics,
) {
    let source = peer.to_string();
    let mut reader = BufReader::new(stream);
    let mut line = Vec::with_capacity(256);

    loop {
        line.clear();
        // One byte past the limit leaves room for the terminator
        let mut limited = reader.by_ref().take(MAX_LINE_BYTES as u64 + 1);
        match limited.read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(n) if n > MAX_LINE_BYTES && line.last() != Some(&b'\n') => {
                eprintln!(
                    "[LOGGER WARNING] Connection from {} closed: line exceeds {} bytes",
                    peer, MAX_LINE_BYTES
                );
                break;
            }
            Ok(_) => {
                while matches!(line.last(), Some(b'\n') | Some(b'\r')) {
                    line.pop();
                }
                if line.is_empty() {
                    continue;
                }
                let text = String::from_utf8_lossy(&line).into_owned();
                if !queue.enqueue(LogRecord::received(text, source.as_str())) {
                    let previous = metrics.record_ingest_dropped();
                    if previous % DROP_REPORT_INTERVAL == 0 {
                        eprintln!(
                            "[LOGGER WARNING] Ingestion queue full, {} lines dropped so far",
                            previous + 1
                        );
                    }
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => {
                eprintln!("[LOGGER WARNING] Connection from {} closed: {}", peer, e);
                break;
            }
        }
    }
}
