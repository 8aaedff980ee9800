//! Tracing / logging setup shared by keel processes and tests.

/// Initialize process-wide logging from the environment.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    logging::init();
}

/// Subscriber configuration and installation.
pub mod logging;

pub use logging::{LogConfig, LogConfigError, LogFormat, init_for_tests, init_with};
