//! Cache key derivation
//!
//! The key is a SHA-1 over the compiler identity (modification time, size
//! and path), the argument list and the preprocessed translation unit.
//! Preprocessing folds headers and macros into the hashed bytes, so include
//! paths and header timestamps never need to be part of the key.

use crate::{Error, Result};
use sha1::{Digest, Sha1};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, UNIX_EPOCH};

/// Hex length of a SHA-1 digest.
const DIGEST_HEX_LEN: usize = 40;

/// What identifies a compiler binary for caching purposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramIdentity {
    /// Absolute path of the binary
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
    /// Modification time since the Unix epoch
    pub modified: Duration,
}

impl ProgramIdentity {
    /// Read the identity of the binary at `path` from the filesystem.
    pub fn of(path: &Path) -> Result<Self> {
        let metadata = fs::metadata(path).map_err(|e| Error::io(e, path, "stat"))?;
        let modified = metadata
            .modified()
            .map_err(|e| Error::io(e, path, "read modification time of"))?
            .duration_since(UNIX_EPOCH)
            .map_err(|e| Error::fingerprint(format!("{} predates the epoch: {e}", path.display())))?;
        Ok(Self {
            path: path.to_path_buf(),
            size: metadata.len(),
            modified,
        })
    }
}

/// Store key for a compiled object.
///
/// Rendered as `a/b/c/abc...`: the first three hex digits of the digest as
/// nested path segments, then the full digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Identify `program` and derive the key for `args` and `preprocessed`.
    pub fn derive(program: &Path, args: &[String], preprocessed: &[u8]) -> Result<Self> {
        let identity = ProgramIdentity::of(program)?;
        Ok(Self::compute(&identity, args, preprocessed))
    }

    /// Derive the key from an already read identity.
    #[must_use]
    pub fn compute(identity: &ProgramIdentity, args: &[String], preprocessed: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(
            format!(
                "{}.{:09}",
                identity.modified.as_secs(),
                identity.modified.subsec_nanos()
            )
            .as_bytes(),
        );
        hasher.update(identity.size.to_string().as_bytes());
        hasher.update(identity.path.as_os_str().as_encoded_bytes());
        // NUL-terminated so ["-a", "b"] and ["-ab"] hash differently
        for arg in args {
            hasher.update(arg.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update(preprocessed);

        let digest = hex::encode(hasher.finalize());
        Self(format!(
            "{}/{}/{}/{}",
            &digest[0..1],
            &digest[1..2],
            &digest[2..3],
            digest
        ))
    }

    /// The key as a store path.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The bare hex digest.
    #[must_use]
    pub fn digest(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parses a key previously rendered by [`Fingerprint`]'s `Display`.
impl FromStr for Fingerprint {
    type Err = Error;

    fn from_str(key: &str) -> Result<Self> {
        let malformed = || Error::fingerprint(format!("malformed key `{key}`"));
        let segments: Vec<&str> = key.split('/').collect();
        let [a, b, c, digest] = segments.as_slice() else {
            return Err(malformed());
        };
        let well_formed = digest.len() == DIGEST_HEX_LEN
            && digest.bytes().all(|byte| matches!(byte, b'0'..=b'9' | b'a'..=b'f'))
            && *a == &digest[0..1]
            && *b == &digest[1..2]
            && *c == &digest[2..3];
        if well_formed {
            Ok(Self(key.to_string()))
        } else {
            Err(malformed())
        }
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
