//! Tracing/logging setup shared by every binary and test harness.

/// Tracing subscriber configuration (filters, output format).
pub mod tracing;

pub use self::tracing::{LogConfig, LogFormat, init};
