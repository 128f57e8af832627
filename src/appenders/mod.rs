//! Appender implementations

pub mod console;
pub mod file;
pub mod network;

pub use console::ConsoleAppender;
pub use file::FileAppender;
pub use network::NetworkConnection;

pub use crate::core::Appender;
