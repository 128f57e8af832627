//! Pipeline configuration
//!
//! One explicitly owned struct per pipeline instance, so several
//! independently configured pipelines can live in one process. All structs
//! deserialize from JSON with every field optional; durations are given in
//! milliseconds.

use super::error::{LoggerError, Result};
use super::formatter::TimestampFormat;
use super::log_level::LogLevel;
use super::queue::DEFAULT_QUEUE_CAPACITY;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default shutdown timeout for pipeline cleanup (5 seconds)
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Port the ingestion server listens on unless configured otherwise
pub const DEFAULT_INGEST_PORT: u16 = 46666;

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Batch writer settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Most records written in one batch
    pub max_batch: usize,
    /// How long a writer waits for the first record of a batch
    #[serde(with = "duration_ms")]
    pub max_wait: Duration,
    /// Attempts per batch before it is dropped
    pub write_attempts: u32,
    /// Writer threads sharing the single write path
    pub workers: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch: 1000,
            max_wait: Duration::from_millis(10),
            write_attempts: 3,
            workers: 1,
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_batch == 0 {
            return Err(LoggerError::config("batch", "max_batch must be at least 1"));
        }
        if self.write_attempts == 0 {
            return Err(LoggerError::config("batch", "write_attempts must be at least 1"));
        }
        if self.workers == 0 {
            return Err(LoggerError::config("batch", "workers must be at least 1"));
        }
        Ok(())
    }
}

/// Ingestion worker pool sizing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub min_workers: usize,
    pub max_workers: usize,
    /// Idle time after which workers above `min_workers` retire
    #[serde(with = "duration_ms")]
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_workers: 4,
            max_workers: 16,
            idle_timeout: Duration::from_secs(60),
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(LoggerError::config("pool", "max_workers must be at least 1"));
        }
        if self.min_workers > self.max_workers {
            return Err(LoggerError::config(
                "pool",
                format!(
                    "min_workers ({}) exceeds max_workers ({})",
                    self.min_workers, self.max_workers
                ),
            ));
        }
        Ok(())
    }
}

/// Network forwarder settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwarderConfig {
    pub max_batch: usize,
    #[serde(with = "duration_ms")]
    pub max_wait: Duration,
    #[serde(with = "duration_ms")]
    pub backoff_base: Duration,
    #[serde(with = "duration_ms")]
    pub backoff_cap: Duration,
    #[serde(with = "duration_ms")]
    pub connect_timeout: Duration,
    #[serde(with = "duration_ms")]
    pub write_timeout: Duration,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            max_batch: 1000,
            max_wait: Duration::from_millis(10),
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
        }
    }
}

impl ForwarderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_batch == 0 {
            return Err(LoggerError::config("forwarder", "max_batch must be at least 1"));
        }
        if self.backoff_base.is_zero() {
            return Err(LoggerError::config("forwarder", "backoff_base must be positive"));
        }
        if self.backoff_cap < self.backoff_base {
            return Err(LoggerError::config(
                "forwarder",
                "backoff_cap must not be smaller than backoff_base",
            ));
        }
        if self.connect_timeout.is_zero() || self.write_timeout.is_zero() {
            return Err(LoggerError::config("forwarder", "timeouts must be positive"));
        }
        Ok(())
    }
}

/// Ingestion server settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// `host:port` to listen on; port 0 picks a free port
    pub listen_addr: String,
    pub log_file: PathBuf,
    pub queue_capacity: usize,
    pub pool: PoolConfig,
    pub batch: BatchConfig,
    /// Also echo persisted lines to stdout
    pub console_echo: bool,
    #[serde(with = "duration_ms")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: format!("0.0.0.0:{}", DEFAULT_INGEST_PORT),
            log_file: PathBuf::from("logpipe-server.log"),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            pool: PoolConfig::default(),
            batch: BatchConfig::default(),
            console_echo: false,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl ServerConfig {
    pub fn new(listen_addr: impl Into<String>, log_file: impl Into<PathBuf>) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            log_file: log_file.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    #[must_use]
    pub fn with_batch(mut self, batch: BatchConfig) -> Self {
        self.batch = batch;
        self
    }

    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_addr("server", &self.listen_addr, true)?;
        validate_path("server", &self.log_file)?;
        if self.queue_capacity == 0 {
            return Err(LoggerError::config("server", "queue_capacity must be at least 1"));
        }
        self.pool.validate()?;
        self.batch.validate()
    }
}

/// Top-level configuration of a producing pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// File written by the local batch writer
    pub log_file: PathBuf,
    pub min_level: LogLevel,
    /// Wrap level tags in ANSI colors
    pub color: bool,
    pub timestamp_format: TimestampFormat,
    pub queue_capacity: usize,
    /// Echo persisted lines to stdout (local topology)
    pub console_echo: bool,
    /// Ship records to `server_addr` instead of writing `log_file` locally
    pub remote_enabled: bool,
    pub server_addr: String,
    pub batch: BatchConfig,
    pub forwarder: ForwarderConfig,
    /// Run an ingestion server inside this pipeline
    pub server: Option<ServerConfig>,
    #[serde(with = "duration_ms")]
    pub shutdown_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            log_file: PathBuf::from("logpipe.log"),
            min_level: LogLevel::Info,
            color: false,
            timestamp_format: TimestampFormat::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            console_echo: false,
            remote_enabled: false,
            server_addr: format!("127.0.0.1:{}", DEFAULT_INGEST_PORT),
            batch: BatchConfig::default(),
            forwarder: ForwarderConfig::default(),
            server: None,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl PipelineConfig {
    /// Local topology writing to `log_file`
    pub fn local(log_file: impl Into<PathBuf>) -> Self {
        Self {
            log_file: log_file.into(),
            ..Self::default()
        }
    }

    /// Remote topology shipping to `server_addr`
    pub fn remote(server_addr: impl Into<String>) -> Self {
        Self {
            remote_enabled: true,
            server_addr: server_addr.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    #[must_use]
    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_batch(mut self, batch: BatchConfig) -> Self {
        self.batch = batch;
        self
    }

    #[must_use]
    pub fn with_forwarder(mut self, forwarder: ForwarderConfig) -> Self {
        self.forwarder = forwarder;
        self
    }

    #[must_use]
    pub fn with_server(mut self, server: ServerConfig) -> Self {
        self.server = Some(server);
        self
    }

    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            LoggerError::io_operation(
                "reading configuration",
                format!("cannot read {}", path.display()),
                e,
            )
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(LoggerError::config("pipeline", "queue_capacity must be at least 1"));
        }
        self.timestamp_format.validate()?;
        if self.remote_enabled {
            validate_addr("pipeline", &self.server_addr, false)?;
            self.forwarder.validate()?;
        } else {
            validate_path("pipeline", &self.log_file)?;
            self.batch.validate()?;
        }
        if let Some(server) = &self.server {
            server.validate()?;
        }
        Ok(())
    }
}

/// Check a `host:port` string. Port 0 is only meaningful for listeners.
fn validate_addr(component: &str, addr: &str, allow_port_zero: bool) -> Result<()> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| LoggerError::config(component, format!("'{}' is not host:port", addr)))?;
    if host.is_empty() {
        return Err(LoggerError::config(component, format!("'{}' has no host", addr)));
    }
    let port: u16 = port
        .parse()
        .map_err(|_| LoggerError::config(component, format!("invalid port in '{}'", addr)))?;
    if port == 0 && !allow_port_zero {
        return Err(LoggerError::config(component, format!("port 0 in '{}'", addr)));
    }
    Ok(())
}

fn validate_path(component: &str, path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(LoggerError::config(component, "log file path is empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.min_level, LogLevel::Info);
        assert_eq!(config.queue_capacity, 10_000);
        assert_eq!(config.batch.max_batch, 1000);
        assert_eq!(config.batch.max_wait, Duration::from_millis(10));
        assert_eq!(config.batch.write_attempts, 3);
        assert_eq!(config.forwarder.backoff_base, Duration::from_secs(1));
        assert_eq!(config.forwarder.backoff_cap, Duration::from_secs(30));
        assert!(!config.remote_enabled);
        assert!(config.validate().is_ok());

        let pool = PoolConfig::default();
        assert_eq!((pool.min_workers, pool.max_workers), (4, 16));
        assert_eq!(pool.idle_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_from_json_partial() {
        let config = PipelineConfig::from_json_str(
            r#"{
                "log_file": "/tmp/app.log",
                "min_level": "DEBUG",
                "color": true,
                "remote_enabled": true,
                "server_addr": "logs.internal:9000",
                "forwarder": { "backoff_base": 250 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.log_file, PathBuf::from("/tmp/app.log"));
        assert_eq!(config.min_level, LogLevel::Debug);
        assert!(config.color);
        assert_eq!(config.forwarder.backoff_base, Duration::from_millis(250));
        assert_eq!(config.forwarder.backoff_cap, Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_port_rejected() {
        for addr in ["localhost", "localhost:http", "localhost:70000", ":80", "host:0"] {
            let err = PipelineConfig::remote(addr).validate().unwrap_err();
            assert!(
                matches!(err, LoggerError::InvalidConfiguration { .. }),
                "{} accepted",
                addr
            );
        }
    }

    #[test]
    fn test_listener_port_zero_allowed() {
        assert!(ServerConfig::new("127.0.0.1:0", "/tmp/x.log").validate().is_ok());
    }

    #[test]
    fn test_pool_bounds_checked() {
        let pool = PoolConfig {
            min_workers: 8,
            max_workers: 2,
            ..PoolConfig::default()
        };
        assert!(pool.validate().is_err());
    }

    #[test]
    fn test_bad_timestamp_pattern_rejected() {
        let mut config = PipelineConfig::local("/tmp/app.log");
        config.timestamp_format = TimestampFormat::Custom("%Q".into());
        assert!(config.validate().unwrap_err().is_configuration());

        config.timestamp_format = TimestampFormat::Custom("%d/%m %H:%M".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        let err = PipelineConfig::from_json_str("{ not json").unwrap_err();
        assert!(err.is_configuration());
    }
}
