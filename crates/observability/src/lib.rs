//! Process-wide tracing setup shared by the binaries.

/// Initialize process-wide logging.
///
/// Safe to call multiple times; later calls are no-ops.
pub fn init() {
    tracing::init();
}

/// Subscriber configuration (filter, output format).
pub mod tracing;
