//! Compiler invocation handling for sccache
//!
//! This crate decides whether a compiler command line can be served from the
//! cache and derives the cache key for it:
//! - [`classify`] turns a raw argument vector into an [`Invocation`] or a
//!   [`Reject`] explaining why the command must run unmodified
//! - [`SourceKind`] maps source extensions to the language the compiler
//!   expects for already-preprocessed input
//! - [`Fingerprint`] hashes the compiler identity, the arguments and the
//!   preprocessed translation unit into a store key

mod classify;
mod error;
mod fingerprint;
mod kind;

pub use classify::{Invocation, Reject, classify, classify_with};
pub use error::{Error, Result};
pub use fingerprint::{Fingerprint, ProgramIdentity};
pub use kind::SourceKind;
