//! Document storage: trait plus in-memory and filesystem implementations.
//!
//! Paths are vault-relative with `/` separators (`Contacts/Jane Doe.md`).
//! Every call is an await point; the coordinator never holds graph state
//! across one.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use crate::error::StoreError;

const DOCUMENT_EXTENSION: &str = "md";

/// A listed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMeta {
    pub path: String,
    pub size: u64,
}

/// Host document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn read(&self, path: &str) -> Result<String, StoreError>;

    /// Replace the whole content of `path`, creating it if needed.
    async fn write(&self, path: &str, text: &str) -> Result<(), StoreError>;

    /// Markdown documents under `folder`, recursively, sorted by path.
    async fn list(&self, folder: &str) -> Result<Vec<DocumentMeta>, StoreError>;

    /// Move a document. Fails with `AlreadyExists` if `to` is taken.
    async fn rename(&self, from: &str, to: &str) -> Result<(), StoreError>;

    async fn exists(&self, path: &str) -> Result<bool, StoreError> {
        match self.read(path).await {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

pub(crate) fn in_folder(path: &str, folder: &str) -> bool {
    let folder = folder.trim_matches('/');
    folder.is_empty()
        || path
            .strip_prefix(folder)
            .is_some_and(|rest| rest.starts_with('/'))
}

pub(crate) fn is_document(path: &str) -> bool {
    Path::new(path)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(DOCUMENT_EXTENSION))
}

// ── In-memory ─────────────────────────────────────────────────────

/// Store backed by a map. Records every write for assertions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: RwLock<BTreeMap<String, String>>,
    writes: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents<P, T>(docs: impl IntoIterator<Item = (P, T)>) -> Self
    where
        P: Into<String>,
        T: Into<String>,
    {
        let store = Self::new();
        for (path, text) in docs {
            store.insert(path, text);
        }
        store
    }

    /// Seed a document without recording a write.
    pub fn insert(&self, path: impl Into<String>, text: impl Into<String>) {
        self.docs.write().insert(path.into(), text.into());
    }

    pub fn remove(&self, path: &str) -> Option<String> {
        self.docs.write().remove(path)
    }

    pub fn get(&self, path: &str) -> Option<String> {
        self.docs.read().get(path).cloned()
    }

    /// Paths written since creation or the last [`clear_writes`](Self::clear_writes).
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().clone()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().len()
    }

    pub fn clear_writes(&self) {
        self.writes.lock().clear();
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn read(&self, path: &str) -> Result<String, StoreError> {
        tokio::task::yield_now().await;
        self.get(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    async fn write(&self, path: &str, text: &str) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        self.docs.write().insert(path.to_string(), text.to_string());
        self.writes.lock().push(path.to_string());
        Ok(())
    }

    async fn list(&self, folder: &str) -> Result<Vec<DocumentMeta>, StoreError> {
        Ok(self
            .docs
            .read()
            .iter()
            .filter(|(path, _)| in_folder(path, folder) && is_document(path))
            .map(|(path, text)| DocumentMeta {
                path: path.clone(),
                size: text.len() as u64,
            })
            .collect())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        let mut docs = self.docs.write();
        if docs.contains_key(to) {
            return Err(StoreError::AlreadyExists(to.to_string()));
        }
        let text = docs
            .remove(from)
            .ok_or_else(|| StoreError::NotFound(from.to_string()))?;
        docs.insert(to.to_string(), text);
        Ok(())
    }
}

// ── Filesystem ────────────────────────────────────────────────────

/// Store rooted at a vault directory on disk.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }

    fn relative(&self, full: &Path) -> Option<String> {
        let rel = full.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }
}

fn not_found(path: &str, err: std::io::Error) -> StoreError {
    if err.kind() == ErrorKind::NotFound {
        StoreError::NotFound(path.to_string())
    } else {
        StoreError::Io(err)
    }
}

#[async_trait]
impl DocumentStore for FsStore {
    async fn read(&self, path: &str) -> Result<String, StoreError> {
        tokio::fs::read_to_string(self.resolve(path))
            .await
            .map_err(|e| not_found(path, e))
    }

    async fn write(&self, path: &str, text: &str) -> Result<(), StoreError> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, text).await?;
        tracing::debug!(path, bytes = text.len(), "Wrote document");
        Ok(())
    }

    async fn list(&self, folder: &str) -> Result<Vec<DocumentMeta>, StoreError> {
        let start = self.resolve(folder);
        let mut pending = vec![start];
        let mut found = Vec::new();

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                let full = entry.path();
                if file_type.is_dir() {
                    pending.push(full);
                    continue;
                }
                let Some(path) = self.relative(&full) else {
                    continue;
                };
                if is_document(&path) {
                    let size = entry.metadata().await?.len();
                    found.push(DocumentMeta { path, size });
                }
            }
        }
        found.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(found)
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), StoreError> {
        let target = self.resolve(to);
        if tokio::fs::try_exists(&target).await? {
            return Err(StoreError::AlreadyExists(to.to_string()));
        }
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(self.resolve(from), &target)
            .await
            .map_err(|e| not_found(from, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStore::with_documents([("Contacts/A.md", "a"), ("Notes/x.md", "x"), ("Contacts/img.png", "")]);
        store.write("Contacts/B.md", "b").await.unwrap();

        let listed: Vec<String> = store.list("Contacts").await.unwrap().into_iter().map(|m| m.path).collect();
        assert_eq!(listed, vec!["Contacts/A.md", "Contacts/B.md"]);
        assert_eq!(store.read("Contacts/B.md").await.unwrap(), "b");
        assert_eq!(store.writes(), vec!["Contacts/B.md"]);
        assert!(matches!(store.read("nope.md").await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_memory_store_rename() {
        let store = MemoryStore::with_documents([("a.md", "1"), ("b.md", "2")]);
        assert!(matches!(store.rename("a.md", "b.md").await, Err(StoreError::AlreadyExists(_))));
        store.rename("a.md", "c.md").await.unwrap();
        assert!(!store.exists("a.md").await.unwrap());
        assert_eq!(store.get("c.md").as_deref(), Some("1"));
    }

    #[test]
    fn test_folder_matching() {
        assert!(in_folder("Contacts/A.md", "Contacts"));
        assert!(in_folder("Contacts/Family/A.md", "Contacts/"));
        assert!(!in_folder("ContactsOld/A.md", "Contacts"));
        assert!(in_folder("A.md", ""));
    }

    #[tokio::test]
    async fn test_fs_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());

        store.write("Contacts/Family/Jane.md", "jane").await.unwrap();
        store.write("Contacts/Bob.md", "bob").await.unwrap();
        store.write("Contacts/notes.txt", "skip").await.unwrap();

        let listed: Vec<String> = store.list("Contacts").await.unwrap().into_iter().map(|m| m.path).collect();
        assert_eq!(listed, vec!["Contacts/Bob.md", "Contacts/Family/Jane.md"]);

        store.rename("Contacts/Bob.md", "Contacts/Robert.md").await.unwrap();
        assert_eq!(store.read("Contacts/Robert.md").await.unwrap(), "bob");
        assert!(matches!(store.read("Contacts/Bob.md").await, Err(StoreError::NotFound(_))));
        assert!(matches!(
            store.rename("Contacts/Robert.md", "Contacts/Family/Jane.md").await,
            Err(StoreError::AlreadyExists(_))
        ));
        assert!(store.list("Missing").await.unwrap().is_empty());
    }
}
