//! Tracing setup for the wrapper binary
//!
//! The wrapper shares stderr with the compiler it wraps, so logging is off
//! unless `SCCACHE_LOG` asks for it.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the tracing filter (`RUST_LOG` syntax).
pub const LOG_ENV: &str = "SCCACHE_LOG";

const DEFAULT_FILTER: &str = "off";

/// Filter built from `value`, or the silent default when absent or invalid.
#[must_use]
pub fn filter_from(value: Option<&str>) -> EnvFilter {
    value
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the stderr subscriber.
///
/// Safe to call more than once; only the first call installs anything.
pub fn init() {
    let filter = filter_from(std::env::var(LOG_ENV).ok().as_deref());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_is_off() {
        assert_eq!(filter_from(None).to_string(), "off");
    }

    #[test]
    fn test_filter_from_directives() {
        assert_eq!(filter_from(Some("sccache=debug")).to_string(), "sccache=debug");
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        temp_env::with_var(LOG_ENV, Some("warn"), || {
            init();
            init();
        });
    }
}
