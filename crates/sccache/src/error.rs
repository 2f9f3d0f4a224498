//! Error types for the sccache wrapper

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::Path;
use thiserror::Error;

/// Error type for running the wrapped compiler
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// The compiler process could not be started
    #[error("Failed to run {program}")]
    #[diagnostic(
        code(sccache::spawn),
        help("Check that the compiler exists and is executable")
    )]
    Spawn {
        /// Program that failed to start
        program: String,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// I/O error while talking to the compiler or touching its output
    #[error("I/O {operation} failed{}", path.as_ref().map_or(String::new(), |p| format!(": {}", p.display())))]
    #[diagnostic(code(sccache::io))]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Path that caused the error, if available
        path: Option<Box<Path>>,
        /// Operation that failed (e.g., "write stdin", "wait")
        operation: String,
    },

    /// The background store worker could not be handed its job
    #[error("Store worker failed: {message}")]
    #[diagnostic(code(sccache::worker))]
    Worker {
        /// What went wrong
        message: String,
    },
}

impl Error {
    /// Create a spawn error for `program`
    #[must_use]
    pub fn spawn(program: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Spawn {
            program: program.as_ref().display().to_string(),
            source,
        }
    }

    /// Create an I/O error without path context
    #[must_use]
    pub fn io(source: std::io::Error, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            path: None,
            operation: operation.into(),
        }
    }

    /// Create a worker error
    #[must_use]
    pub fn worker(message: impl Into<String>) -> Self {
        Self::Worker {
            message: message.into(),
        }
    }

    /// Exit code to report when the compiler never produced one.
    ///
    /// Mirrors the shell convention for a command that could not be run.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Spawn { .. } => 127,
            Self::Io { .. } | Self::Worker { .. } => 1,
        }
    }
}

/// Result type for the sccache wrapper
pub type Result<T> = std::result::Result<T, Error>;
