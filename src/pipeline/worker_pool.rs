//! Elastic thread pool for connection handlers
//!
//! Keeps `min_workers` threads alive, grows up to `max_workers` while jobs
//! wait for a free worker, and retires threads above the minimum after
//! `idle_timeout` without work.

use super::{join_all, panic_message};
use crate::core::{LoggerError, PoolConfig, Result};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct WorkerPool {
    name: String,
    config: PoolConfig,
    sender: Mutex<Option<Sender<Job>>>,
    receiver: Receiver<Job>,
    live: Arc<AtomicUsize>,
    idle: Arc<AtomicUsize>,
    next_id: AtomicUsize,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Create the pool and spawn its core workers
    pub fn new(name: impl Into<String>, config: PoolConfig) -> Result<Self> {
        config.validate()?;
        let (sender, receiver) = unbounded();
        let pool = Self {
            name: name.into(),
            config,
            sender: Mutex::new(Some(sender)),
            receiver,
            live: Arc::new(AtomicUsize::new(0)),
            idle: Arc::new(AtomicUsize::new(0)),
            next_id: AtomicUsize::new(0),
            handles: Mutex::new(Vec::new()),
        };

        for _ in 0..pool.config.min_workers {
            if !pool.try_spawn()? {
                break;
            }
        }
        Ok(pool)
    }

    /// Queue `job` and add a worker if every live one is busy.
    ///
    /// # Errors
    ///
    /// Fails once the pool has been shut down.
    pub fn execute<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let sender = self.sender.lock();
            let sender = sender.as_ref().ok_or(LoggerError::Stopped("worker pool"))?;
            sender
                .send(Box::new(job))
                .map_err(|_| LoggerError::Stopped("worker pool"))?;
        }

        if self.receiver.len() > self.idle.load(Ordering::Acquire) {
            self.try_spawn()?;
        }
        Ok(())
    }

    pub fn live_workers(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    pub fn idle_workers(&self) -> usize {
        self.idle.load(Ordering::Acquire)
    }

    /// Jobs waiting for a worker
    pub fn queued_jobs(&self) -> usize {
        self.receiver.len()
    }

    /// Stop taking jobs and wait until `deadline` for running ones.
    ///
    /// Queued jobs still run. Can be called again after a timeout to keep
    /// waiting; returns `true` once every worker has exited.
    pub fn shutdown(&self, deadline: Instant) -> bool {
        self.sender.lock().take();
        let mut handles = std::mem::take(&mut *self.handles.lock());
        let finished = join_all(&mut handles, deadline, &self.name);
        self.handles.lock().extend(handles);
        finished
    }

    /// Spawn one worker unless `max_workers` are already live
    fn try_spawn(&self) -> Result<bool> {
        let max = self.config.max_workers;
        let reserved = self
            .live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1))
            .is_ok();
        if !reserved {
            return Ok(false);
        }

        let worker = Worker {
            receiver: self.receiver.clone(),
            live: Arc::clone(&self.live),
            idle: Arc::clone(&self.idle),
            min_workers: self.config.min_workers,
            idle_timeout: self.config.idle_timeout,
        };
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let spawned = thread::Builder::new()
            .name(format!("{}-{}", self.name, id))
            .spawn(move || worker.run());

        match spawned {
            Ok(handle) => {
                let mut handles = self.handles.lock();
                // Retired workers leave finished handles behind
                handles.retain(|h| !h.is_finished());
                handles.push(handle);
                Ok(true)
            }
            Err(e) => {
                self.live.fetch_sub(1, Ordering::AcqRel);
                Err(LoggerError::io_operation(
                    "spawning pool worker",
                    self.name.clone(),
                    e,
                ))
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.sender.lock().take();
    }
}

struct Worker {
    receiver: Receiver<Job>,
    live: Arc<AtomicUsize>,
    idle: Arc<AtomicUsize>,
    min_workers: usize,
    idle_timeout: Duration,
}

impl Worker {
    fn run(self) {
        loop {
            self.idle.fetch_add(1, Ordering::AcqRel);
            let next = self.receiver.recv_timeout(self.idle_timeout);
            self.idle.fetch_sub(1, Ordering::AcqRel);

            match next {
                Ok(job) => {
                    if let Err(panic_info) =
                        std::panic::catch_unwind(std::panic::AssertUnwindSafe(job))
                    {
                        eprintln!(
                            "[LOGGER CRITICAL] Pool job panicked: {}. Worker continues.",
                            panic_message(panic_info.as_ref())
                        );
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    let min = self.min_workers;
                    let retired = self
                        .live
                        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                            (n > min).then(|| n - 1)
                        })
                        .is_ok();
                    if retired {
                        return;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}
