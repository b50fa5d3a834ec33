//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber, with optional
//! rotated JSON files through tracing-appender.

pub mod config;
pub mod logger;

pub use config::{LogConfig, LogFormat, RotationPolicy};
pub use logger::LoggerImpl;
