//! Remote blob store client for sccache
//!
//! Objects live in an S3-style bucket addressed as
//! `http://<bucket>.<endpoint>/<key>` and are stored gzip-compressed.
//!
//! - [`BlobStore`] is the get/put surface the compile pipeline talks to;
//!   [`HttpBlobStore`] implements it over HTTP
//! - [`TimedConnection`] wraps the HTTP connection and books `dns`, `conn`,
//!   `send` and `resp` phases on the caller's [`Timer`](sccache_timing::Timer)
//! - [`Resolve`] is the name resolution seam, chosen once from
//!   [`StoreConfig`]
//! - [`CachedObject`] converts between object bytes and the compressed
//!   transport encoding

pub mod config;
pub mod error;
pub mod resolve;

mod client;
#[cfg(any(test, feature = "test-utils"))]
mod memory;
mod object;
#[cfg(any(test, feature = "test-utils"))]
mod stub_dns;
mod transport;

pub use client::{BlobStore, HttpBlobStore, StoreStatus};
pub use config::StoreConfig;
pub use error::{Result, StoreError};
#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemoryBlobStore;
pub use object::CachedObject;
pub use resolve::{NameserverResolver, Resolve, SystemResolver, resolver_for};
#[cfg(any(test, feature = "test-utils"))]
pub use stub_dns::StubNameserver;
pub use transport::TimedConnection;
