//! Pipeline lifecycle
//!
//! [`Pipeline`] wires a [`Logger`] to its delivery worker (a local batch
//! writer or a network forwarder), optionally runs an ingestion server in
//! the same process, and tears everything down in order.

use super::batch_writer::BatchWriter;
use super::forwarder::{Forwarder, ForwarderState};
use super::ingestion::IngestionServer;
use crate::appenders::{ConsoleAppender, FileAppender};
use crate::core::{Appender, Logger, LoggerError, LoggerMetrics, PipelineConfig, Result};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

enum Delivery {
    Local(BatchWriter),
    Remote(Forwarder),
}

/// A running pipeline.
///
/// # Example
/// ```no_run
/// use logpipe::prelude::*;
/// use std::time::Duration;
///
/// let mut pipeline = Pipeline::start(PipelineConfig::local("/var/log/app.log")).unwrap();
/// let logger = pipeline.logger().clone();
/// logger.info("listening on port {}", &[&8080]);
/// assert!(pipeline.shutdown(Duration::from_secs(5)));
/// ```
pub struct Pipeline {
    logger: Logger,
    metrics: Arc<LoggerMetrics>,
    delivery: Option<Delivery>,
    server: Option<IngestionServer>,
    shutdown_timeout: Duration,
    stopped: bool,
}

impl Pipeline {
    /// Validate `config` and start every component it describes.
    ///
    /// The embedded server, when configured, starts first so a remote
    /// forwarder in the same pipeline has something to connect to.
    ///
    /// # Errors
    ///
    /// Configuration errors (bad address, bind failure, locked log file)
    /// are returned synchronously; nothing is left running.
    pub fn start(config: PipelineConfig) -> Result<Self> {
        config.validate()?;

        let server = match &config.server {
            Some(server_config) => Some(IngestionServer::start(server_config.clone())?),
            None => None,
        };

        let metrics = Arc::new(LoggerMetrics::new());
        let logger = Logger::builder()
            .min_level(config.min_level)
            .queue_capacity(config.queue_capacity)
            .timestamp_format(config.timestamp_format.clone())
            .color(config.color)
            .metrics(Arc::clone(&metrics))
            .build()?;

        let delivery = if config.remote_enabled {
            let address = match &server {
                Some(server) => connectable(server.local_addr()).to_string(),
                None => config.server_addr.clone(),
            };
            Delivery::Remote(Forwarder::start(
                logger.queue().clone(),
                address,
                &config.forwarder,
                Arc::clone(&metrics),
            )?)
        } else {
            let mut appenders: Vec<Box<dyn Appender>> =
                vec![Box::new(FileAppender::new(&config.log_file)?)];
            if config.console_echo {
                appenders.push(Box::new(ConsoleAppender::new()));
            }
            Delivery::Local(BatchWriter::start(
                logger.queue().clone(),
                appenders,
                &config.batch,
                Arc::clone(&metrics),
            )?)
        };

        Ok(Self {
            logger,
            metrics,
            delivery: Some(delivery),
            server,
            shutdown_timeout: config.shutdown_timeout,
            stopped: false,
        })
    }

    /// Producer handle; clone it into every thread that logs
    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn metrics(&self) -> &LoggerMetrics {
        &self.metrics
    }

    pub fn server(&self) -> Option<&IngestionServer> {
        self.server.as_ref()
    }

    /// State of the forwarder, `None` in the local topology
    pub fn forwarder_state(&self) -> Option<ForwarderState> {
        match &self.delivery {
            Some(Delivery::Remote(forwarder)) => Some(forwarder.state()),
            _ => None,
        }
    }

    pub fn is_running(&self) -> bool {
        !self.stopped
    }

    /// Switch the file this pipeline persists to: the local log file, or
    /// the embedded server's file when records are shipped remotely.
    pub fn set_log_file(&self, path: impl AsRef<Path>) -> Result<()> {
        match (&self.delivery, &self.server) {
            (Some(Delivery::Local(writer)), _) => writer.set_log_file(path),
            (_, Some(server)) => server.set_log_file(path),
            (None, None) => Err(LoggerError::Stopped("pipeline")),
            (Some(Delivery::Remote(_)), None) => Err(LoggerError::config(
                "pipeline",
                "remote pipeline has no local log file",
            )),
        }
    }

    /// Stop accepting, drain the dispatch queue, then drain and stop the
    /// embedded server. Producers are not stopped; records logged after
    /// this call stay queued.
    ///
    /// Returns `true` if every component finished within `timeout`.
    pub fn shutdown(&mut self, timeout: Duration) -> bool {
        if self.stopped {
            return true;
        }
        self.stopped = true;
        let deadline = Instant::now() + timeout;

        if let Some(server) = self.server.as_mut() {
            server.stop_accepting();
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        let mut clean = match self.delivery.take() {
            Some(Delivery::Local(mut writer)) => writer.shutdown(remaining),
            Some(Delivery::Remote(mut forwarder)) => forwarder.shutdown(remaining),
            None => true,
        };

        if let Some(mut server) = self.server.take() {
            clean &= server.shutdown(deadline.saturating_duration_since(Instant::now()));
        }

        let dropped = self.metrics.dropped_count();
        if dropped > 0 {
            eprintln!(
                "[LOGGER WARNING] Pipeline shutting down with {} dropped logs (drop rate: {:.2}%)",
                dropped,
                self.metrics.drop_rate()
            );
        }
        clean
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.shutdown(self.shutdown_timeout);
    }
}

/// Address a local client can reach a listener bound to `addr` on
fn connectable(addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port())
        }
        IpAddr::V6(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), addr.port())
        }
        _ => addr,
    }
}
