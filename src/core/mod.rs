//! Core logger types and traits

pub mod appender;
pub mod config;
pub mod error;
pub mod formatter;
pub mod log_level;
pub mod log_record;
pub mod logger;
pub mod metrics;
pub mod queue;

pub use appender::Appender;
pub use config::{
    BatchConfig, ForwarderConfig, PipelineConfig, PoolConfig, ServerConfig,
    DEFAULT_INGEST_PORT, DEFAULT_SHUTDOWN_TIMEOUT,
};
pub use error::{LoggerError, Result};
pub use formatter::{substitute, Formatter, TimestampFormat};
pub use log_level::LogLevel;
pub use log_record::{current_source, encode_lines, LogRecord};
pub use logger::{Logger, LoggerBuilder};
pub use metrics::LoggerMetrics;
pub use queue::{BoundedQueue, DEFAULT_QUEUE_CAPACITY};
