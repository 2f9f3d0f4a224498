//! Name resolution for the store host
//!
//! The resolver is picked once from [`StoreConfig`] and handed to the client;
//! the transport only ever sees the [`Resolve`] trait.

use crate::config::StoreConfig;
use crate::{Result, StoreError};
use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::debug;

/// Turns a host name into an address to connect to.
#[async_trait]
pub trait Resolve: Send + Sync {
    /// Resolve `host` to a single address.
    async fn resolve(&self, host: &str) -> Result<IpAddr>;
}

/// Resolution through the operating system's resolver.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

#[async_trait]
impl Resolve for SystemResolver {
    async fn resolve(&self, host: &str) -> Result<IpAddr> {
        if let Ok(ip) = host.parse() {
            return Ok(ip);
        }
        let mut addrs = tokio::net::lookup_host((host, 0))
            .await
            .map_err(|e| StoreError::resolve(host, e.to_string()))?;
        addrs
            .next()
            .map(|addr| addr.ip())
            .ok_or_else(|| StoreError::resolve(host, "no addresses returned"))
    }
}

/// Resolution by querying one specific nameserver.
pub struct NameserverResolver {
    nameserver: SocketAddr,
    inner: TokioAsyncResolver,
}

impl NameserverResolver {
    /// Query `nameserver` over UDP, falling back to TCP.
    #[must_use]
    pub fn new(nameserver: SocketAddr) -> Self {
        let servers =
            NameServerConfigGroup::from_ips_clear(&[nameserver.ip()], nameserver.port(), true);
        let config = ResolverConfig::from_parts(None, Vec::new(), servers);
        Self {
            nameserver,
            inner: TokioAsyncResolver::tokio(config, ResolverOpts::default()),
        }
    }
}

#[async_trait]
impl Resolve for NameserverResolver {
    async fn resolve(&self, host: &str) -> Result<IpAddr> {
        if let Ok(ip) = host.parse() {
            return Ok(ip);
        }
        debug!(host, nameserver = %self.nameserver, "Resolving through nameserver");
        let lookup = self
            .inner
            .lookup_ip(host)
            .await
            .map_err(|e| StoreError::resolve(host, e.to_string()))?;
        lookup
            .iter()
            .next()
            .ok_or_else(|| StoreError::resolve(host, "no addresses returned"))
    }
}

/// Pick the resolver the configuration asks for.
#[must_use]
pub fn resolver_for(config: &StoreConfig) -> Arc<dyn Resolve> {
    match config.nameserver {
        Some(nameserver) => Arc::new(NameserverResolver::new(nameserver)),
        None => Arc::new(SystemResolver),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::stub_dns::StubNameserver;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn test_system_resolver_passes_ip_literals_through() {
        let ip = SystemResolver.resolve("127.0.0.1").await.unwrap();
        assert_eq!(ip, IpAddr::from([127, 0, 0, 1]));
    }

    #[tokio::test]
    async fn test_system_resolver_resolves_localhost() {
        let ip = SystemResolver.resolve("localhost").await.unwrap();
        assert!(ip.is_loopback());
    }

    #[tokio::test]
    async fn test_nameserver_resolver_queries_configured_server() {
        let stub = StubNameserver::answering(Ipv4Addr::new(10, 9, 8, 7))
            .await
            .unwrap();
        let resolver = NameserverResolver::new(stub.addr());

        let ip = resolver.resolve("objects.store.test").await.unwrap();
        assert_eq!(ip, IpAddr::from([10, 9, 8, 7]));
        assert!(stub.queries() >= 1);
    }

    #[tokio::test]
    async fn test_nameserver_resolver_passes_ip_literals_through() {
        let resolver = NameserverResolver::new(SocketAddr::from(([192, 0, 2, 1], 53)));
        let ip = resolver.resolve("10.1.2.3").await.unwrap();
        assert_eq!(ip, IpAddr::from([10, 1, 2, 3]));
    }

    #[tokio::test]
    async fn test_resolver_for_config() {
        let mut config = StoreConfig::for_bucket("objects");
        let stub = StubNameserver::answering(Ipv4Addr::new(10, 0, 0, 42))
            .await
            .unwrap();
        config.nameserver = Some(stub.addr());
        let resolver = resolver_for(&config);
        assert_eq!(
            resolver.resolve("objects.s3.amazonaws.com").await.unwrap(),
            IpAddr::from([10, 0, 0, 42])
        );

        let resolver = resolver_for(&StoreConfig::default());
        assert!(resolver.resolve("127.0.0.1").await.unwrap().is_loopback());
    }
}
