//! Logging configuration
//!
//! Initializes tracing for the application. `RUST_LOG` wins over the
//! configured level.

use tracing_subscriber::{EnvFilter, fmt};

/// Initializes logging with the specified level
///
/// Returns false when a global subscriber was already installed.
pub fn init_logging(level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_line_number(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_twice() {
        init_logging("debug");
        assert!(!init_logging("info"));
    }
}
