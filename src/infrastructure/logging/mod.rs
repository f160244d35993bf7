//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber, with an
//! optional rolling JSON log file via tracing-appender.

pub mod logger;

pub use logger::{LogFormat, LoggerImpl};
