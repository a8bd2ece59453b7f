//! Tracing and logging setup shared by gateway binaries.

/// Initialize process-wide logging with JSON output.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init_with(LogFormat::Json);
}

/// Initialize process-wide logging in the given format. Returns whether
/// this call installed the subscriber.
pub fn init_with(format: LogFormat) -> bool {
    tracing::init_with(format)
}

/// Tracing configuration (filters, formatters).
pub mod tracing;

pub use self::tracing::{LogFormat, UnknownLogFormat};
