//! The `sccache:` diagnostic line
//!
//! Every terminal outcome produces exactly one line of the form
//!
//! ```text
//! sccache: <outcome> [<timings>( <bytes>B)?( <store status>)?]
//! ```
//!
//! written to a descriptor inherited from the calling build tool when one is
//! open (configure keeps `config.log` on descriptor 5), stderr otherwise.
//! These lines are not log records and are emitted regardless of
//! `SCCACHE_LOG`.

use sccache_compiler::Fingerprint;
use sccache_store::StoreStatus;
use sccache_timing::Timer;
use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// What a run (or a background store) ended with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing to run
    NoCommand,
    /// The command was not cacheable and ran as given
    Passthrough {
        /// Program as written on the command line
        program: String,
    },
    /// Preprocessing exited non-zero
    PreprocessorFailed,
    /// The object was served from the store
    CacheHit {
        /// Store key
        key: Fingerprint,
        /// Output path
        output: String,
    },
    /// Compilation exited non-zero or left no output
    CompilationFailed {
        /// Output path
        output: String,
    },
    /// Compiled and handed to the background store
    Caching {
        /// Output path
        output: String,
        /// Store key
        key: Fingerprint,
    },
    /// Compiled without a key to store under
    Compiled {
        /// Output path
        output: String,
    },
    /// The background store succeeded
    Cached {
        /// Output path
        output: String,
        /// Store key
        key: Fingerprint,
    },
    /// The background store failed
    CacheFailure {
        /// Output path
        output: String,
        /// Store key
        key: Fingerprint,
    },
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCommand => f.write_str("No command"),
            Self::Passthrough { program } => write!(f, "Passthrough for {program}"),
            Self::PreprocessorFailed => f.write_str("Preprocessor failed"),
            Self::CacheHit { key, output } => write!(f, "Using cache {key} for {output}"),
            Self::CompilationFailed { output } => write!(f, "Compilation failed for {output}"),
            Self::Caching { output, key } => write!(f, "Caching {output} as {key}"),
            Self::Compiled { output } => write!(f, "Compiled {output}"),
            Self::Cached { output, key } => write!(f, "Cached {output} as {key}"),
            Self::CacheFailure { output, key } => {
                write!(f, "Failure caching {output} as {key} to cache")
            }
        }
    }
}

/// One diagnostic line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    outcome: Outcome,
    timing: String,
    bytes: Option<usize>,
    status: Option<i32>,
}

impl Report {
    /// Report `outcome`, stopping `timer` and capturing its summary.
    #[must_use]
    pub fn new(outcome: Outcome, timer: &mut Timer) -> Self {
        Self {
            outcome,
            timing: timer.summary(),
            bytes: None,
            status: None,
        }
    }

    /// Attach a byte count; zero is not shown.
    #[must_use]
    pub fn with_bytes(mut self, bytes: usize) -> Self {
        self.bytes = (bytes > 0).then_some(bytes);
        self
    }

    /// Attach the store status observed during the run.
    #[must_use]
    pub fn with_status(mut self, status: Option<StoreStatus>) -> Self {
        self.status = status.map(|status| status.code);
        self
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}", self.outcome, self.timing)?;
        if let Some(bytes) = self.bytes {
            write!(f, " {bytes}B")?;
        }
        if let Some(status) = self.status {
            write!(f, " {status}")?;
        }
        f.write_str("]")
    }
}

/// Shared destination for diagnostic lines.
///
/// Cloned into background store workers; lines are written whole under a
/// lock so concurrent reports never interleave.
#[derive(Clone)]
pub struct DiagnosticSink {
    out: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl fmt::Debug for DiagnosticSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticSink").finish_non_exhaustive()
    }
}

impl DiagnosticSink {
    /// Write diagnostics to `writer`.
    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            out: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Write diagnostics to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self::from_writer(io::stderr())
    }

    /// Write diagnostics to the inherited descriptor `fd` if it is open.
    ///
    /// Falls back to stderr when `fd` is `None`, closed, or the platform has
    /// no notion of inherited descriptors. Must run before anything else in
    /// the process opens files, or `fd` may name one of ours.
    #[must_use]
    pub fn open(fd: Option<i32>) -> Self {
        match fd.and_then(inherited) {
            Some(file) => Self::from_writer(io::LineWriter::new(file)),
            None => Self::stderr(),
        }
    }

    /// Write `report` as one line.
    ///
    /// Failures are logged and otherwise ignored; diagnostics never decide
    /// the exit code.
    pub fn emit(&self, report: &Report) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(out, "sccache: {report}").and_then(|()| out.flush()) {
            debug!(error = %e, "Failed to write diagnostic line");
        }
    }
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn inherited(fd: i32) -> Option<std::fs::File> {
    use std::os::fd::FromRawFd;

    // SAFETY: F_GETFD only inspects the descriptor table entry.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags == -1 {
        return None;
    }
    // SAFETY: the descriptor is open and was inherited for us to write to;
    // nothing else in this process owns it.
    Some(unsafe { std::fs::File::from_raw_fd(fd) })
}

#[cfg(not(unix))]
fn inherited(_fd: i32) -> Option<std::fs::File> {
    None
}
