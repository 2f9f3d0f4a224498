//! Error types for blob store operations

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::Path;
use thiserror::Error;

/// Status code reported when no HTTP exchange produced one.
pub const NO_STATUS: i32 = -1;

/// Error type for blob store operations
#[derive(Error, Debug, Diagnostic)]
pub enum StoreError {
    /// No bucket configured
    #[error("No store configured")]
    #[diagnostic(
        code(sccache::store::no_store),
        help("Set SCCACHE_BUCKET to the name of the bucket to cache into")
    )]
    NoStoreConfigured,

    /// The store answered with a non-success status
    #[error("Store rejected {method} {url}: HTTP {status}")]
    #[diagnostic(code(sccache::store::http_status))]
    HttpStatus {
        /// Request method
        method: String,
        /// Request URL
        url: String,
        /// HTTP status code
        status: u16,
    },

    /// Name resolution failed
    #[error("Failed to resolve {host}: {message}")]
    #[diagnostic(
        code(sccache::store::resolve),
        help("Check SCCACHE_NAMESERVER and SCCACHE_ENDPOINT")
    )]
    Resolve {
        /// Host that could not be resolved
        host: String,
        /// Resolver error message
        message: String,
    },

    /// TCP connection could not be established
    #[error("Failed to connect to {address}")]
    #[diagnostic(code(sccache::store::connection))]
    Connection {
        /// Address that refused or timed out
        address: String,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// HTTP protocol failure on an established connection
    #[error("HTTP transport error: {0}")]
    #[diagnostic(code(sccache::store::transport))]
    Transport(#[from] hyper::Error),

    /// The store URL could not be built
    #[error("Invalid store URL {url}: {message}")]
    #[diagnostic(code(sccache::store::invalid_url))]
    InvalidUrl {
        /// Offending URL
        url: String,
        /// Parse error message
        message: String,
    },

    /// Response body shorter or longer than announced
    #[error("Bad HTTP body size read: {actual}, expected {expected}")]
    #[diagnostic(code(sccache::store::body_size))]
    BodySize {
        /// Content-Length header value
        expected: usize,
        /// Bytes actually received
        actual: usize,
    },

    /// I/O error while encoding or materializing an object
    #[error("I/O {operation} failed{}", path.as_ref().map_or(String::new(), |p| format!(": {}", p.display())))]
    #[diagnostic(code(sccache::store::io))]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Path that caused the error, if available
        path: Option<Box<Path>>,
        /// Operation that failed (e.g., "compress", "write")
        operation: String,
    },
}

impl StoreError {
    /// Create a non-success status error
    #[must_use]
    pub fn http_status(method: impl Into<String>, url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            method: method.into(),
            url: url.into(),
            status,
        }
    }

    /// Create a resolution error
    #[must_use]
    pub fn resolve(host: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Resolve {
            host: host.into(),
            message: message.into(),
        }
    }

    /// Create an invalid URL error
    #[must_use]
    pub fn invalid_url(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create an I/O error with path context
    #[must_use]
    pub fn io(
        source: std::io::Error,
        path: impl AsRef<Path>,
        operation: impl Into<String>,
    ) -> Self {
        Self::Io {
            source,
            path: Some(path.as_ref().into()),
            operation: operation.into(),
        }
    }

    /// Create an I/O error without path context
    #[must_use]
    pub fn io_no_path(source: std::io::Error, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            path: None,
            operation: operation.into(),
        }
    }

    /// HTTP status carried by this error, or [`NO_STATUS`].
    #[must_use]
    pub fn status_code(&self) -> i32 {
        match self {
            Self::HttpStatus { status, .. } => i32::from(*status),
            _ => NO_STATUS,
        }
    }
}

/// Result type for blob store operations
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_store_message() {
        assert_eq!(
            StoreError::NoStoreConfigured.to_string(),
            "No store configured"
        );
        assert_eq!(StoreError::NoStoreConfigured.status_code(), NO_STATUS);
    }

    #[test]
    fn test_http_status_code() {
        let err = StoreError::http_status("PUT", "http://b.example/k", 403);
        assert_eq!(err.status_code(), 403);
        assert_eq!(err.to_string(), "Store rejected PUT http://b.example/k: HTTP 403");
    }

    #[test]
    fn test_body_size_message() {
        let err = StoreError::BodySize {
            expected: 10,
            actual: 4,
        };
        assert_eq!(err.to_string(), "Bad HTTP body size read: 4, expected 10");
    }

    #[test]
    fn test_io_error_with_and_without_path() {
        let err = StoreError::io(
            std::io::Error::other("disk full"),
            "/tmp/a.o",
            "write",
        );
        assert_eq!(err.to_string(), "I/O write failed: /tmp/a.o");

        let err = StoreError::io_no_path(std::io::Error::other("boom"), "compress");
        assert_eq!(err.to_string(), "I/O compress failed");
    }
}
