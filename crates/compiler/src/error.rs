//! Error types for the compiler crate

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::Path;
use thiserror::Error;

/// Error type for fingerprint derivation
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// I/O error while inspecting the compiler
    #[error("I/O {operation} failed{}", path.as_ref().map_or(String::new(), |p| format!(": {}", p.display())))]
    #[diagnostic(
        code(sccache::compiler::io),
        help("The compiler binary may have been moved or replaced during the build")
    )]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Path that caused the error, if available
        path: Option<Box<Path>>,
        /// Operation that failed (e.g., "stat", "read")
        operation: String,
    },

    /// The compiler identity could not be turned into key material
    #[error("Fingerprint error: {message}")]
    #[diagnostic(code(sccache::compiler::fingerprint))]
    Fingerprint {
        /// Error message describing the problem
        message: String,
    },
}

impl Error {
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

    /// Create a fingerprint error
    #[must_use]
    pub fn fingerprint(msg: impl Into<String>) -> Self {
        Self::Fingerprint {
            message: msg.into(),
        }
    }
}

/// Result type for compiler operations
pub type Result<T> = std::result::Result<T, Error>;
