//! Recognized source kinds

use std::fmt;
use std::path::Path;

/// Kind of translation unit the cache knows how to handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// C source (`.c`)
    C,
    /// C++ source (`.cc`, `.cpp`, `.cxx`)
    Cxx,
}

impl SourceKind {
    /// Look up a kind from a file extension without the leading dot.
    #[must_use]
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            "c" => Some(Self::C),
            "cc" | "cpp" | "cxx" => Some(Self::Cxx),
            _ => None,
        }
    }

    /// Look up a kind from a path's extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Value for `-x` when feeding already-preprocessed source on stdin.
    #[must_use]
    pub const fn preprocessed_language(self) -> &'static str {
        match self {
            Self::C => "cpp-output",
            Self::Cxx => "c++-cpp-output",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.preprocessed_language())
    }
}
