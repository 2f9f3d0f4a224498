//! Runtime configuration read from the environment
//!
//! The argument vector belongs to the wrapped compiler, so every knob is an
//! environment variable. [`Config`] is built once at startup and passed down.

use sccache_store::StoreConfig;
use sccache_store::config::{DEFAULT_ENDPOINT, parse_nameserver};
use std::net::SocketAddr;
use tracing::warn;

/// Bucket to cache into; unset or empty disables the store.
pub const BUCKET_ENV: &str = "SCCACHE_BUCKET";
/// Host suffix the bucket is prefixed to, optionally with `:port`.
pub const ENDPOINT_ENV: &str = "SCCACHE_ENDPOINT";
/// Presence skips lookups while still storing fresh objects.
pub const RECACHE_ENV: &str = "SCCACHE_RECACHE";
/// Alternate DNS server for the store host, `ip` or `ip:port`.
pub const NAMESERVER_ENV: &str = "SCCACHE_NAMESERVER";
/// Inherited descriptor diagnostics go to.
pub const DIAGNOSTICS_FD_ENV: &str = "SCCACHE_DIAGNOSTICS_FD";

/// Descriptor build tools such as configure leave open for their log.
pub const DEFAULT_DIAGNOSTICS_FD: i32 = 5;

/// Wrapper configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Remote store settings
    pub store: StoreConfig,
    /// Skip lookups and always compile
    pub recache: bool,
    /// Descriptor to write diagnostics to, `None` for stderr
    pub diagnostics_fd: Option<i32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            recache: false,
            diagnostics_fd: Some(DEFAULT_DIAGNOSTICS_FD),
        }
    }
}

impl Config {
    /// Read the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let store = StoreConfig {
            bucket: lookup(BUCKET_ENV).filter(|bucket| !bucket.is_empty()),
            endpoint: lookup(ENDPOINT_ENV)
                .filter(|endpoint| !endpoint.is_empty())
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            nameserver: lookup(NAMESERVER_ENV).and_then(|value| nameserver(&value)),
        };

        Self {
            store,
            recache: lookup(RECACHE_ENV).is_some(),
            diagnostics_fd: lookup(DIAGNOSTICS_FD_ENV)
                .map_or(Some(DEFAULT_DIAGNOSTICS_FD), |value| parse_fd(&value)),
        }
    }
}

fn nameserver(value: &str) -> Option<SocketAddr> {
    let parsed = parse_nameserver(value);
    if parsed.is_none() {
        warn!(value, "Ignoring {NAMESERVER_ENV}, using system resolution");
    }
    parsed
}

fn parse_fd(value: &str) -> Option<i32> {
    match value.trim().parse::<i32>() {
        Ok(fd) if fd >= 0 => Some(fd),
        Ok(_) => None,
        Err(e) => {
            warn!(value, error = %e, "Ignoring {DIAGNOSTICS_FD_ENV}");
            Some(DEFAULT_DIAGNOSTICS_FD)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_VARS: [&str; 5] = [
        BUCKET_ENV,
        ENDPOINT_ENV,
        RECACHE_ENV,
        NAMESERVER_ENV,
        DIAGNOSTICS_FD_ENV,
    ];

    #[test]
    fn test_empty_environment() {
        let config = temp_env::with_vars_unset(ALL_VARS, Config::from_env);
        assert_eq!(config, Config::default());
        assert_eq!(config.store.bucket(), None);
        assert_eq!(config.diagnostics_fd, Some(5));
    }

    #[test]
    fn test_full_environment() {
        let config = temp_env::with_vars(
            [
                (BUCKET_ENV, Some("objects")),
                (ENDPOINT_ENV, Some("minio.local:9000")),
                (RECACHE_ENV, Some("")),
                (NAMESERVER_ENV, Some("10.0.0.2")),
                (DIAGNOSTICS_FD_ENV, Some("9")),
            ],
            Config::from_env,
        );

        assert_eq!(config.store.bucket(), Some("objects"));
        assert_eq!(
            config.store.authority().as_deref(),
            Some("objects.minio.local:9000")
        );
        assert!(config.recache, "presence alone enables recache");
        assert_eq!(
            config.store.nameserver,
            Some(SocketAddr::from(([10, 0, 0, 2], 53)))
        );
        assert_eq!(config.diagnostics_fd, Some(9));
    }

    #[test]
    fn test_empty_bucket_disables_store() {
        let config = Config::from_lookup(|name| (name == BUCKET_ENV).then(String::new));
        assert_eq!(config.store.bucket, None);
    }

    #[test]
    fn test_nameserver_with_port() {
        let config =
            Config::from_lookup(|name| (name == NAMESERVER_ENV).then(|| "127.0.0.1:5353".into()));
        assert_eq!(
            config.store.nameserver,
            Some(SocketAddr::from(([127, 0, 0, 1], 5353)))
        );
    }

    #[test]
    fn test_bad_nameserver_is_ignored() {
        let config =
            Config::from_lookup(|name| (name == NAMESERVER_ENV).then(|| "dns.example".into()));
        assert_eq!(config.store.nameserver, None);
    }

    #[test]
    fn test_diagnostics_fd_parsing() {
        let with_fd = |value: &'static str| {
            Config::from_lookup(move |name| (name == DIAGNOSTICS_FD_ENV).then(|| value.into()))
                .diagnostics_fd
        };
        assert_eq!(with_fd("3"), Some(3));
        assert_eq!(with_fd("-1"), None);
        assert_eq!(with_fd("stderr"), Some(DEFAULT_DIAGNOSTICS_FD));
    }
}
