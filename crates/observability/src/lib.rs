//! Tracing/logging setup shared by the binaries and tests.

pub mod tracing;

pub use self::tracing::LogFormat;

/// Initialize process-wide tracing in the given format.
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init(format: LogFormat) {
    self::tracing::init(format);
}
