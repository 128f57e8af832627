//! Logging macros.
//!
//! The macros take a logger, a template with `{}` markers and the values
//! to substitute. The level is checked before any argument is touched, so a
//! filtered call costs one comparison.
//!
//! # Examples
//!
//! ```
//! use logpipe::prelude::*;
//! use logpipe::info;
//!
//! let logger = Logger::builder().build().unwrap();
//!
//! // Basic logging
//! info!(logger, "Server started");
//!
//! // With arguments
//! let port = 8080;
//! info!(logger, "Server listening on port {}", port);
//!
//! let user_id = 42;
//! let action = "login";
//! info!(logger, "User {} performed action: {}", user_id, action);
//! assert_eq!(logger.queue().len(), 3);
//! ```

/// Log at an explicit level.
///
/// # Examples
///
/// ```
/// # use logpipe::prelude::*;
/// # let logger = Logger::builder().build().unwrap();
/// use logpipe::log;
/// log!(logger, LogLevel::Info, "Simple message");
/// log!(logger, LogLevel::Error, "Error code: {}", 500);
/// ```
#[macro_export]
macro_rules! log {
    ($logger:expr, $level:expr, $template:expr $(, $arg:expr)* $(,)?) => {{
        let level = $level;
        if $logger.is_enabled(level) {
            $logger.log(level, $template, &[$(&$arg as &dyn ::std::fmt::Display),*]);
        }
    }};
}

/// Log a trace-level message.
///
/// # Examples
///
/// ```
/// # use logpipe::prelude::*;
/// # let logger = Logger::builder().min_level(LogLevel::Trace).build().unwrap();
/// use logpipe::trace;
/// trace!(logger, "Entering function: calculate()");
/// trace!(logger, "Variable value: {}", 42);
/// ```
#[macro_export]
macro_rules! trace {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::LogLevel::Trace, $($arg)+)
    };
}

/// Log a debug-level message.
#[macro_export]
macro_rules! debug {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::LogLevel::Debug, $($arg)+)
    };
}

/// Log an info-level message.
///
/// # Examples
///
/// ```
/// # use logpipe::prelude::*;
/// # let logger = Logger::builder().build().unwrap();
/// use logpipe::info;
/// info!(logger, "Application started");
/// info!(logger, "Processing {} items", 100);
/// ```
#[macro_export]
macro_rules! info {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::LogLevel::Info, $($arg)+)
    };
}

/// Log a warning-level message.
#[macro_export]
macro_rules! warn {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::LogLevel::Warn, $($arg)+)
    };
}

/// Log an error-level message.
///
/// # Examples
///
/// ```
/// # use logpipe::prelude::*;
/// # let logger = Logger::builder().build().unwrap();
/// use logpipe::error;
/// error!(logger, "Failed to connect to database");
/// error!(logger, "Error code: {}, message: {}", 500, "Internal error");
/// ```
#[macro_export]
macro_rules! error {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::LogLevel::Error, $($arg)+)
    };
}
