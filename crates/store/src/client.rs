//! Blob store client
//!
//! `get` never fails: anything short of a complete object is a miss.
//! `put` reports failures so the caller can log them, but callers must not
//! turn them into build failures.

use crate::config::StoreConfig;
use crate::error::NO_STATUS;
use crate::object::CachedObject;
use crate::resolve::{Resolve, resolver_for};
use crate::transport::TimedConnection;
use crate::{Result, StoreError};
use async_trait::async_trait;
use bytes::Bytes;
use http::header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, HOST, HeaderMap};
use http::uri::Authority;
use http::{Method, Request};
use http_body_util::Full;
use sccache_timing::Timer;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use tracing::{debug, info, trace};

const OBJECT_CONTENT_TYPE: &str = "application/octet-stream";
/// Two weeks.
const OBJECT_CACHE_CONTROL: &str = "max-age=1296000";
const ACL_HEADER: &str = "x-amz-acl";
const PUBLIC_READ: &str = "public-read";

/// Last outcome observed by a store, for diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStatus {
    /// HTTP status of the last exchange, `-1` when there was none
    pub code: i32,
    /// Logical store name (the bucket), empty when disabled; shown in logs,
    /// not in the diagnostic line
    pub name: String,
}

impl fmt::Display for StoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)
    }
}

/// Content-addressed object storage keyed by fingerprint.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch the object stored under `key`; `None` on any failure.
    async fn get(&self, key: &str, timer: &mut Timer) -> Option<CachedObject>;

    /// Store `object` under `key`.
    async fn put(&self, key: &str, object: &CachedObject, timer: &mut Timer) -> Result<()>;

    /// Outcome of the most recent `get` or `put`.
    fn status(&self) -> StoreStatus;
}

/// [`BlobStore`] over plain HTTP against `http://<bucket>.<endpoint>/<key>`.
pub struct HttpBlobStore {
    config: StoreConfig,
    resolver: Arc<dyn Resolve>,
    status: AtomicI32,
}

struct Target {
    authority: Authority,
    path: String,
    url: String,
}

impl HttpBlobStore {
    /// Create a client resolving hosts through `resolver`.
    #[must_use]
    pub fn new(config: StoreConfig, resolver: Arc<dyn Resolve>) -> Self {
        Self {
            config,
            resolver,
            status: AtomicI32::new(NO_STATUS),
        }
    }

    /// Create a client with the resolver the configuration selects.
    #[must_use]
    pub fn from_config(config: StoreConfig) -> Self {
        let resolver = resolver_for(&config);
        Self::new(config, resolver)
    }

    /// Bucket name, empty when the store is disabled.
    #[must_use]
    pub fn name(&self) -> &str {
        self.config.bucket().unwrap_or_default()
    }

    /// URL an object with `key` lives at.
    pub fn url_for(&self, key: &str) -> Result<String> {
        self.target(key).map(|target| target.url)
    }

    fn record(&self, code: i32) {
        self.status.store(code, Ordering::Relaxed);
    }

    fn target(&self, key: &str) -> Result<Target> {
        let authority = self
            .config
            .authority()
            .ok_or(StoreError::NoStoreConfigured)?;
        let url = format!("http://{authority}/{key}");
        let authority = authority
            .parse::<Authority>()
            .map_err(|e| StoreError::invalid_url(&url, e.to_string()))?;
        Ok(Target {
            authority,
            path: format!("/{key}"),
            url,
        })
    }

    fn request(
        target: &Target,
        method: Method,
        headers: &[(&str, &str)],
        body: Bytes,
    ) -> Result<Request<Full<Bytes>>> {
        let mut builder = Request::builder()
            .method(method)
            .uri(target.path.as_str())
            .header(HOST, target.authority.as_str());
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder
            .body(Full::new(body))
            .map_err(|e| StoreError::invalid_url(&target.url, e.to_string()))
    }

    async fn fetch(&self, key: &str, timer: &mut Timer) -> Result<Bytes> {
        let target = self.target(key)?;
        debug!(url = %target.url, "GET");

        let mut connection =
            TimedConnection::open(&target.authority, self.resolver.as_ref(), timer).await?;
        let request = Self::request(&target, Method::GET, &[], Bytes::new())?;
        let response = connection.send(request, timer).await?;

        let status = response.status();
        self.record(i32::from(status.as_u16()));
        if !status.is_success() {
            return Err(StoreError::http_status("GET", target.url, status.as_u16()));
        }

        let expected = content_length(response.headers());
        let body = TimedConnection::receive(response.into_body(), timer).await?;
        match expected {
            Some(expected) if expected != body.len() => {
                return Err(StoreError::BodySize {
                    expected,
                    actual: body.len(),
                });
            }
            _ => {}
        }

        info!(bytes = body.len(), url = %target.url, "Read object from store");
        Ok(body)
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn get(&self, key: &str, timer: &mut Timer) -> Option<CachedObject> {
        self.record(NO_STATUS);
        self.config.bucket()?;
        match self.fetch(key, timer).await {
            Ok(body) if body.is_empty() => None,
            Ok(body) => Some(CachedObject::Compressed(body.to_vec())),
            Err(e) => {
                debug!(key, error = %e, "Store lookup missed");
                None
            }
        }
    }

    async fn put(&self, key: &str, object: &CachedObject, timer: &mut Timer) -> Result<()> {
        self.record(NO_STATUS);
        let target = self.target(key)?;
        let body = Bytes::from(object.compressed()?.into_owned());
        debug!(url = %target.url, bytes = body.len(), "PUT");

        let mut connection =
            TimedConnection::open(&target.authority, self.resolver.as_ref(), timer).await?;
        let length = body.len().to_string();
        let request = Self::request(
            &target,
            Method::PUT,
            &[
                (CONTENT_TYPE.as_str(), OBJECT_CONTENT_TYPE),
                (CONTENT_LENGTH.as_str(), length.as_str()),
                (CACHE_CONTROL.as_str(), OBJECT_CACHE_CONTROL),
                (ACL_HEADER, PUBLIC_READ),
            ],
            body,
        )?;
        let response = connection.send(request, timer).await?;

        let status = response.status();
        self.record(i32::from(status.as_u16()));
        // Drain so the exchange is complete before the connection drops.
        TimedConnection::receive(response.into_body(), timer).await?;

        if status.is_success() {
            trace!("PUT succeeded");
            Ok(())
        } else {
            trace!(%status, "PUT failed with HTTP status");
            Err(StoreError::http_status("PUT", target.url, status.as_u16()))
        }
    }

    fn status(&self) -> StoreStatus {
        StoreStatus {
            code: self.status.load(Ordering::Relaxed),
            name: self.name().to_string(),
        }
    }
}

fn content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
}
