//! Object storage for immutable static assets.
//!
//! # Responsibilities
//! - Resolve a content key to bytes plus metadata
//! - Derive a strong ETag from the content hash
//!
//! # Design Decisions
//! - Keys are relative paths; absolute paths and `..` segments are rejected
//! - Content type comes from stored metadata; unknown types stay `None`
//!   and the caller picks a generic default

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use sha2::{Digest, Sha256};

use crate::store::StoreError;

/// An object as returned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Bytes,
    pub content_type: Option<String>,
    /// Hex SHA-256 of `body`.
    pub content_hash: String,
}

impl StoredObject {
    pub fn new(body: Bytes, content_type: Option<String>) -> Self {
        let content_hash = hex::encode(Sha256::digest(&body));
        Self {
            body,
            content_type,
            content_hash,
        }
    }

    /// Quoted strong entity tag.
    pub fn etag(&self) -> String {
        format!("\"{}\"", self.content_hash)
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object by key. `Ok(None)` when absent.
    async fn get(&self, key: &str) -> Result<Option<StoredObject>, StoreError>;
}

/// Validate a content key and split it into safe path segments.
fn safe_segments(key: &str) -> Result<Vec<&str>, StoreError> {
    if key.is_empty() || key.starts_with('/') || key.contains('\\') {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    let mut segments = Vec::new();
    for component in Path::new(key).components() {
        match component {
            Component::Normal(part) => {
                segments.push(part.to_str().ok_or_else(|| StoreError::InvalidKey(key.to_string()))?)
            }
            _ => return Err(StoreError::InvalidKey(key.to_string())),
        }
    }
    Ok(segments)
}

/// In-process object store, mostly for tests and embedded deployments.
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<DashMap<String, StoredObject>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, body: impl Into<Bytes>, content_type: Option<&str>) {
        self.objects.insert(
            key.into(),
            StoredObject::new(body.into(), content_type.map(str::to_string)),
        );
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, key: &str) -> Result<Option<StoredObject>, StoreError> {
        safe_segments(key)?;
        Ok(self.objects.get(key).map(|r| r.value().clone()))
    }
}

/// Object store rooted at a directory on local disk.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, StoreError> {
        let mut path = self.root.clone();
        for segment in safe_segments(key)? {
            path.push(segment);
        }
        Ok(path)
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn get(&self, key: &str) -> Result<Option<StoredObject>, StoreError> {
        let path = self.resolve(key)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let body = tokio::fs::read(&path).await?;
        let content_type = content_type_for(&path).map(str::to_string);
        Ok(Some(StoredObject::new(Bytes::from(body), content_type)))
    }
}

/// Extension metadata for files written without an explicit type.
fn content_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "application/javascript",
        "json" => "application/json",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "txt" => "text/plain; charset=utf-8",
        "wasm" => "application/wasm",
        "pdf" => "application/pdf",
        _ => return None,
    };
    Some(mime)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_etag_is_content_hash() {
        let a = StoredObject::new(Bytes::from_static(b"hello"), None);
        let b = StoredObject::new(Bytes::from_static(b"hello"), Some("text/plain".into()));
        assert_eq!(a.etag(), b.etag());
        assert_eq!(
            a.content_hash,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert!(a.etag().starts_with('"') && a.etag().ends_with('"'));
    }

    #[test]
    fn test_rejects_traversal() {
        assert!(safe_segments("../etc/passwd").is_err());
        assert!(safe_segments("/abs").is_err());
        assert!(safe_segments("a/../../b").is_err());
        assert!(safe_segments("").is_err());
        assert_eq!(safe_segments("css/app.css").unwrap(), vec!["css", "app.css"]);
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryObjectStore::new();
        store.insert("logo.svg", "<svg/>", Some("image/svg+xml"));
        let obj = store.get("logo.svg").await.unwrap().unwrap();
        assert_eq!(obj.content_type.as_deref(), Some("image/svg+xml"));
        assert!(store.get("other.svg").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fs_store() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("css")).unwrap();
        std::fs::write(dir.path().join("css/app.css"), "body{}").unwrap();
        std::fs::write(dir.path().join("blob"), [0u8, 1, 2]).unwrap();

        let store = FsObjectStore::new(dir.path());
        let css = store.get("css/app.css").await.unwrap().unwrap();
        assert_eq!(css.body, Bytes::from_static(b"body{}"));
        assert_eq!(css.content_type.as_deref(), Some("text/css; charset=utf-8"));

        let blob = store.get("blob").await.unwrap().unwrap();
        assert_eq!(blob.content_type, None);

        assert!(store.get("css").await.unwrap().is_none());
        assert!(store.get("missing.js").await.unwrap().is_none());
        assert!(store.get("../secret").await.is_err());
    }
}
