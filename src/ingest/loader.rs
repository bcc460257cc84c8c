use std::fmt;
use std::fs::File;
use std::io::Read;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::scan::FileDescriptor;

/// Default maximum file size: 10 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Default number of leading bytes inspected for NUL bytes.
pub const DEFAULT_BINARY_SNIFF_BYTES: usize = 8000;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Stable document identity: blake3 over the relative path and the decoded content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentId(String);

impl TryFrom<String> for DocumentId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value).ok_or_else(|| format!("invalid document id {value:?}"))
    }
}

impl From<DocumentId> for String {
    fn from(id: DocumentId) -> Self {
        id.0
    }
}

impl DocumentId {
    #[must_use]
    pub fn compute(relative_path: &str, content: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        // Length prefix keeps ("ab", "c") and ("a", "bc") apart.
        hasher.update(&(relative_path.len() as u64).to_le_bytes());
        hasher.update(relative_path.as_bytes());
        hasher.update(content.as_bytes());
        Self(hasher.finalize().to_hex().to_string())
    }

    /// Rebuild an id read back from storage. Returns `None` unless it is 64 hex chars.
    #[must_use]
    pub fn from_hex(hex: &str) -> Option<Self> {
        let valid = hex.len() == 64 && hex.bytes().all(|b| b.is_ascii_hexdigit());
        valid.then(|| Self(hex.to_ascii_lowercase()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, used in chunk ids.
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedDocument {
    pub id: DocumentId,
    pub relative_path: String,
    pub content: String,
    pub size_bytes: u64,
    pub extension: String,
}

/// Why a file was left out of the index. Never fatal to a build.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    #[error("file too large: {size} bytes (limit {limit})")]
    TooLarge { size: u64, limit: u64 },

    #[error("binary content")]
    Binary,

    #[error("not valid UTF-8")]
    InvalidUtf8,

    #[error("unreadable: {message}")]
    Unreadable { message: String },

    #[error("embedding failed: {message}")]
    Embedding { message: String },
}

/// Reads descriptors into decoded documents.
#[derive(Debug, Clone)]
pub struct DocumentLoader {
    pub max_file_size: u64,
    pub binary_sniff_bytes: usize,
}

impl Default for DocumentLoader {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            binary_sniff_bytes: DEFAULT_BINARY_SNIFF_BYTES,
        }
    }
}

impl DocumentLoader {
    #[must_use]
    pub fn new(max_file_size: u64, binary_sniff_bytes: usize) -> Self {
        Self {
            max_file_size,
            binary_sniff_bytes,
        }
    }

    /// Load one file. Oversize files are skipped whole, never truncated.
    pub fn load(&self, file: &FileDescriptor) -> Result<LoadedDocument, SkipReason> {
        if file.size_bytes > self.max_file_size {
            return Err(SkipReason::TooLarge {
                size: file.size_bytes,
                limit: self.max_file_size,
            });
        }

        let unreadable = |e: std::io::Error| SkipReason::Unreadable {
            message: e.to_string(),
        };

        // Read one byte past the limit so growth since the walk is caught.
        let mut bytes = Vec::new();
        File::open(&file.absolute_path)
            .map_err(unreadable)?
            .take(self.max_file_size.saturating_add(1))
            .read_to_end(&mut bytes)
            .map_err(unreadable)?;

        if bytes.len() as u64 > self.max_file_size {
            return Err(SkipReason::TooLarge {
                size: bytes.len() as u64,
                limit: self.max_file_size,
            });
        }

        let mut doc = self.decode(&file.relative_path, bytes)?;
        doc.extension.clone_from(&file.extension);
        debug!("Loaded {} ({} bytes)", doc.relative_path, doc.size_bytes);
        Ok(doc)
    }

    /// Classify and decode raw bytes for `relative_path`.
    pub fn decode(&self, relative_path: &str, bytes: Vec<u8>) -> Result<LoadedDocument, SkipReason> {
        if self.is_binary(&bytes) {
            return Err(SkipReason::Binary);
        }

        let size_bytes = bytes.len() as u64;
        let mut content = String::from_utf8(bytes).map_err(|_| SkipReason::InvalidUtf8)?;
        if content.as_bytes().starts_with(UTF8_BOM) {
            content.replace_range(..UTF8_BOM.len(), "");
        }

        let extension = std::path::Path::new(relative_path)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        Ok(LoadedDocument {
            id: DocumentId::compute(relative_path, &content),
            relative_path: relative_path.to_string(),
            content,
            size_bytes,
            extension,
        })
    }

    fn is_binary(&self, bytes: &[u8]) -> bool {
        let sniff = bytes.len().min(self.binary_sniff_bytes);
        bytes[..sniff].contains(&0)
    }
}
