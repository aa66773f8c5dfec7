//! Process-wide logging setup shared by the MyDuka binaries.

/// Initialize tracing with the format chosen by `MYDUKA_LOG_FORMAT`.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init(tracing::LogFormat::from_env());
}

/// Subscriber construction (filters, output format).
pub mod tracing;
