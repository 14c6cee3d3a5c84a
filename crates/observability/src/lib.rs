//! Process-wide logging setup.

pub mod tracing;

pub use self::tracing::LogFormat;

/// Initialize tracing with JSON output.
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(LogFormat::Json);
}

/// Initialize tracing with an explicit output format.
pub fn init_with(format: LogFormat) {
    tracing::init(format);
}
