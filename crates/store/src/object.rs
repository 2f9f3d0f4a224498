//! Object bytes and their compressed transport encoding

use crate::{Result, StoreError};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::borrow::Cow;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

const COMPRESSION_LEVEL: u32 = 6;

/// A compiled object, held either as raw bytes or gzip-compressed as it
/// travels to and from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedObject {
    /// Raw object file contents
    Object(Vec<u8>),
    /// Gzip transport encoding
    Compressed(Vec<u8>),
}

impl CachedObject {
    /// Read a compiled object from disk.
    pub fn read(path: &Path) -> Result<Self> {
        std::fs::read(path)
            .map(Self::Object)
            .map_err(|e| StoreError::io(e, path, "read"))
    }

    /// Size of the representation currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Object(bytes) | Self::Compressed(bytes) => bytes.len(),
        }
    }

    /// Whether the held representation is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The transport encoding, compressing if needed.
    pub fn compressed(&self) -> Result<Cow<'_, [u8]>> {
        match self {
            Self::Compressed(bytes) => Ok(Cow::Borrowed(bytes)),
            Self::Object(bytes) => {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::new(COMPRESSION_LEVEL));
                encoder
                    .write_all(bytes)
                    .map_err(|e| StoreError::io_no_path(e, "compress"))?;
                encoder
                    .finish()
                    .map(Cow::Owned)
                    .map_err(|e| StoreError::io_no_path(e, "compress"))
            }
        }
    }

    /// The raw object bytes, decompressing if needed.
    pub fn object(&self) -> Result<Cow<'_, [u8]>> {
        match self {
            Self::Object(bytes) => Ok(Cow::Borrowed(bytes)),
            Self::Compressed(bytes) => {
                let mut object = Vec::new();
                GzDecoder::new(bytes.as_slice())
                    .read_to_end(&mut object)
                    .map_err(|e| StoreError::io_no_path(e, "decompress"))?;
                Ok(Cow::Owned(object))
            }
        }
    }

    /// Write the raw object to `path`, streaming through the decoder.
    ///
    /// Returns the number of object bytes written.
    pub fn write_to(&self, path: &Path) -> Result<u64> {
        let file = File::create(path).map_err(|e| StoreError::io(e, path, "create"))?;
        let mut out = BufWriter::new(file);
        let written = match self {
            Self::Object(bytes) => io::copy(&mut bytes.as_slice(), &mut out),
            Self::Compressed(bytes) => io::copy(&mut GzDecoder::new(bytes.as_slice()), &mut out),
        }
        .map_err(|e| StoreError::io(e, path, "write"))?;
        out.flush().map_err(|e| StoreError::io(e, path, "flush"))?;
        Ok(written)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        (0..4096u32).flat_map(|i| (i % 251).to_le_bytes()).collect()
    }

    #[test]
    fn test_compress_then_decompress_is_lossless() {
        let object = CachedObject::Object(sample());
        let compressed = object.compressed().unwrap().into_owned();
        assert_ne!(compressed, sample());

        let fetched = CachedObject::Compressed(compressed);
        assert_eq!(fetched.object().unwrap().as_ref(), sample().as_slice());
    }

    #[test]
    fn test_compressed_is_gzip() {
        let compressed = CachedObject::Object(b"obj".to_vec())
            .compressed()
            .unwrap()
            .into_owned();
        assert_eq!(&compressed[..2], &[0x1f, 0x8b]);
    }

    #[test]
    fn test_empty_object_round_trips() {
        let compressed = CachedObject::Object(Vec::new())
            .compressed()
            .unwrap()
            .into_owned();
        let fetched = CachedObject::Compressed(compressed);
        assert!(fetched.object().unwrap().is_empty());
        assert!(!fetched.is_empty());
    }

    #[test]
    fn test_write_to_materializes_object() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.o");
        std::fs::write(&source, sample()).unwrap();

        let compressed = CachedObject::read(&source)
            .unwrap()
            .compressed()
            .unwrap()
            .into_owned();
        let target = dir.path().join("b.o");
        let written = CachedObject::Compressed(compressed)
            .write_to(&target)
            .unwrap();

        assert_eq!(written, sample().len() as u64);
        assert_eq!(std::fs::read(&target).unwrap(), sample());
    }

    #[test]
    fn test_corrupt_transport_data() {
        let dir = tempfile::tempdir().unwrap();
        let fetched = CachedObject::Compressed(b"not gzip at all".to_vec());
        assert!(fetched.object().is_err());
        assert!(fetched.write_to(&dir.path().join("bad.o")).is_err());
    }

    #[test]
    fn test_read_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = CachedObject::read(&dir.path().join("missing.o")).unwrap_err();
        assert!(err.to_string().starts_with("I/O read failed"));
    }
}
