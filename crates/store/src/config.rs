//! Configuration types for the blob store client

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};

/// Endpoint used when none is configured.
pub const DEFAULT_ENDPOINT: &str = "s3.amazonaws.com";

/// Port a nameserver given without one is queried on.
pub const DNS_PORT: u16 = 53;

/// Configuration for the remote blob store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreConfig {
    /// Bucket name; `None` disables the store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,

    /// Host suffix the bucket name is prefixed to, optionally with `:port`
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Alternate DNS server to resolve the store host with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nameserver: Option<SocketAddr>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            endpoint: default_endpoint(),
            nameserver: None,
        }
    }
}

impl StoreConfig {
    /// Configuration for `bucket` at the default endpoint.
    #[must_use]
    pub fn for_bucket(bucket: impl Into<String>) -> Self {
        Self {
            bucket: Some(bucket.into()),
            ..Default::default()
        }
    }

    /// Override the endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Bucket name, if the store is enabled.
    #[must_use]
    pub fn bucket(&self) -> Option<&str> {
        self.bucket.as_deref().filter(|name| !name.is_empty())
    }

    /// `<bucket>.<endpoint>`, if the store is enabled.
    #[must_use]
    pub fn authority(&self) -> Option<String> {
        self.bucket()
            .map(|bucket| format!("{bucket}.{}", self.endpoint))
    }
}

/// Parse a nameserver given as `ip` or `ip:port`.
#[must_use]
pub fn parse_nameserver(value: &str) -> Option<SocketAddr> {
    let value = value.trim();
    value.parse().ok().or_else(|| {
        value
            .parse::<IpAddr>()
            .ok()
            .map(|ip| SocketAddr::new(ip, DNS_PORT))
    })
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_disabled() {
        let config = StoreConfig::default();
        assert_eq!(config.bucket(), None);
        assert_eq!(config.authority(), None);
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
    }

    #[test]
    fn test_empty_bucket_is_disabled() {
        let config = StoreConfig::for_bucket("");
        assert_eq!(config.bucket(), None);
    }

    #[test]
    fn test_authority() {
        let config = StoreConfig::for_bucket("objects");
        assert_eq!(
            config.authority().as_deref(),
            Some("objects.s3.amazonaws.com")
        );

        let config = config.with_endpoint("cache.internal:8080");
        assert_eq!(
            config.authority().as_deref(),
            Some("objects.cache.internal:8080")
        );
    }

    #[test]
    fn test_deserialize_applies_defaults() {
        let config: StoreConfig = serde_json::from_str(r#"{"bucket": "objects"}"#).unwrap();
        assert_eq!(config, StoreConfig::for_bucket("objects"));

        let config: StoreConfig =
            serde_json::from_str(r#"{"endpoint": "minio:9000", "nameserver": "10.0.0.2:53"}"#)
                .unwrap();
        assert_eq!(config.bucket(), None);
        assert_eq!(config.endpoint, "minio:9000");
        assert_eq!(config.nameserver, Some("10.0.0.2:53".parse().unwrap()));
    }

    #[test]
    fn test_parse_nameserver() {
        assert_eq!(
            parse_nameserver("10.0.0.2"),
            Some(SocketAddr::from(([10, 0, 0, 2], DNS_PORT)))
        );
        assert_eq!(
            parse_nameserver(" 127.0.0.1:5353 "),
            Some(SocketAddr::from(([127, 0, 0, 1], 5353)))
        );
        assert_eq!(
            parse_nameserver("::1"),
            Some(SocketAddr::new(IpAddr::from([0, 0, 0, 0, 0, 0, 0, 1]), DNS_PORT))
        );
        assert_eq!(parse_nameserver("[::1]:5353").map(|addr| addr.port()), Some(5353));
        assert_eq!(parse_nameserver("dns.example"), None);
    }
}
