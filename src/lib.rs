//! # logpipe
//!
//! An in-process logging pipeline. Application threads log through a
//! non-blocking [`Logger`]; records flow through a bounded dispatch queue
//! to either a local batch writer or a network forwarder that ships them,
//! one line per record, to an ingestion server which persists them.
//!
//! ## Features
//!
//! - **Never blocks the caller**: a full queue drops the newest record and
//!   counts it
//! - **Local or remote**: write a file directly or forward over TCP with
//!   reconnect and backoff
//! - **Ingestion server**: elastic worker pool, batched appends, file
//!   switching at runtime
//! - **Ordered shutdown**: every component drains within a bounded timeout

pub mod appenders;
pub mod core;
pub mod macros;
pub mod pipeline;

pub mod prelude {
    pub use crate::appenders::{ConsoleAppender, FileAppender};
    pub use crate::core::{
        Appender, BatchConfig, ForwarderConfig, LogLevel, Logger, LoggerBuilder, LoggerError,
        LoggerMetrics, PipelineConfig, PoolConfig, Result, ServerConfig, TimestampFormat,
        DEFAULT_SHUTDOWN_TIMEOUT,
    };
    pub use crate::pipeline::{ForwarderState, IngestionServer, Pipeline};
}

pub use appenders::{ConsoleAppender, FileAppender, NetworkConnection};
pub use core::{
    Appender, BatchConfig, BoundedQueue, ForwarderConfig, Formatter, LogLevel, LogRecord, Logger,
    LoggerBuilder, LoggerError, LoggerMetrics, PipelineConfig, PoolConfig, Result, ServerConfig,
    TimestampFormat, DEFAULT_QUEUE_CAPACITY, DEFAULT_SHUTDOWN_TIMEOUT,
};
pub use pipeline::{
    BatchWriter, Forwarder, ForwarderState, IngestionServer, Pipeline, WorkerPool,
};
