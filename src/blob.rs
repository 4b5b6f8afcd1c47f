//! Storage for uploaded candidate material bytes.
//!
//! The database only keeps metadata and a relative blob path; the bytes go
//! through a [`BlobStore`].

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use parking_lot::RwLock;
use thiserror::Error;

/// Longest filename kept after sanitizing.
pub const MAX_FILENAME_LEN: usize = 120;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid blob path '{0}'")]
    InvalidPath(String),
}

/// Byte storage addressed by a relative path.
///
/// Implementations are called from blocking contexts.
pub trait BlobStore: Send + Sync {
    fn put(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<(), BlobError>;

    /// Remove a blob. A missing blob is not an error.
    fn delete(&self, path: &str) -> Result<(), BlobError>;

    fn exists(&self, path: &str) -> bool;
}

// ---------------------------------------------------------------------------
// Local filesystem
// ---------------------------------------------------------------------------

/// Blobs as plain files below a root directory.
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, BlobError> {
        let relative = Path::new(path);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if path.is_empty() || !safe {
            return Err(BlobError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl BlobStore for LocalBlobStore {
    fn put(&self, path: &str, bytes: &[u8], _content_type: &str) -> Result<(), BlobError> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&full, bytes)?;
        tracing::debug!(path = %full.display(), size = bytes.len(), "blob written");
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<(), BlobError> {
        let full = self.resolve(path)?;
        match std::fs::remove_file(&full) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).map(|p| p.is_file()).unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Blobs held in a map. Used by tests and ephemeral servers.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.blobs.read().get(path).cloned()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, path: &str, bytes: &[u8], _content_type: &str) -> Result<(), BlobError> {
        self.blobs.write().insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<(), BlobError> {
        self.blobs.write().remove(path);
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        self.blobs.read().contains_key(path)
    }
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// Reduce an uploaded filename to `[A-Za-z0-9._-]`.
///
/// Directory components are dropped, other characters become `_`, and the
/// result is capped at [`MAX_FILENAME_LEN`]. An empty result becomes `file`.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILENAME_LEN)
        .collect();
    let trimmed = cleaned.trim_matches('.');
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Relative blob path for one material.
pub fn blob_path(candidate_id: &str, material_id: &str, filename: &str) -> String {
    format!("candidates/{}/{}_{}", candidate_id, material_id, filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("report.pdf"), "report.pdf");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\docs\\my cv (1).docx"), "my_cv__1_.docx");
        assert_eq!(sanitize_filename(""), "file");
        assert_eq!(sanitize_filename(".."), "file");
        assert_eq!(sanitize_filename(&"a".repeat(300)).len(), MAX_FILENAME_LEN);
    }

    #[test]
    fn test_blob_path() {
        assert_eq!(blob_path("c1", "m1", "cv.pdf"), "candidates/c1/m1_cv.pdf");
    }

    #[test]
    fn test_local_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());
        let path = blob_path("c1", "m1", "notes.txt");

        store.put(&path, b"hello", "text/plain").unwrap();
        assert!(store.exists(&path));
        let on_disk = std::fs::read(dir.path().join(&path)).unwrap();
        assert_eq!(on_disk, b"hello");

        store.delete(&path).unwrap();
        assert!(!store.exists(&path));
        // Second delete is a no-op.
        store.delete(&path).unwrap();
    }

    #[test]
    fn test_local_store_rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());
        assert!(matches!(
            store.put("../outside", b"x", "text/plain"),
            Err(BlobError::InvalidPath(_))
        ));
        assert!(matches!(
            store.put("/abs/path", b"x", "text/plain"),
            Err(BlobError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryBlobStore::new();
        store.put("a/b", b"123", "application/octet-stream").unwrap();
        assert_eq!(store.get("a/b").unwrap(), b"123");
        assert_eq!(store.len(), 1);
        store.delete("a/b").unwrap();
        store.delete("a/b").unwrap();
        assert!(store.is_empty());
    }
}
