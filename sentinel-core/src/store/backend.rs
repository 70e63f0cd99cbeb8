//! Persistence media for the trust store
//!
//! The store addresses documents by `/`-separated keys. Backends map keys onto a
//! medium: a directory tree for real use, a map in memory for tests and embedders.

use crate::error::StoreError;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

/// Prefix used by in-flight temporary files
const TEMP_PREFIX: &str = ".sentinel-tmp";

/// Key-value namespace the trust store persists into
pub trait StoreBackend: Send + Sync {
    /// Read a document, `None` if absent
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Replace a document atomically
    fn write(&self, key: &str, content: &[u8]) -> Result<(), StoreError>;

    /// All document keys under a prefix, sorted
    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Make sure a key prefix exists as a container (no-op where meaningless)
    fn ensure_dir(&self, key: &str) -> Result<(), StoreError>;

    /// Remove everything, irreversibly
    fn wipe(&self) -> Result<(), StoreError>;

    /// Where the data lives, for display
    fn location(&self) -> String;
}

/// Split a key into components, refusing anything that could escape the root
pub fn validate_key(key: &str) -> Result<Vec<&str>, StoreError> {
    let invalid = || StoreError::InvalidKey {
        key: key.to_string(),
    };

    if key.is_empty() || key.starts_with('/') || key.contains('\\') || key.contains('\0') {
        return Err(invalid());
    }

    let components: Vec<&str> = key.split('/').collect();
    for component in &components {
        if component.is_empty() || *component == "." || *component == ".." {
            return Err(invalid());
        }
        // Drive prefixes such as `C:` would make the joined path absolute on Windows
        if cfg!(windows) && component.contains(':') {
            return Err(invalid());
        }
    }

    Ok(components)
}

/// Directory-backed store
#[derive(Debug, Clone)]
pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let mut path = self.root.clone();
        for component in validate_key(key)? {
            path.push(component);
        }
        Ok(path)
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl StoreBackend for FsBackend {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path_for(key)?;
        match std::fs::read(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path)(e)),
        }
    }

    fn write(&self, key: &str, content: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let parent = path.parent().unwrap_or(&self.root);
        std::fs::create_dir_all(parent).map_err(io_error(parent))?;

        let mut temp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(parent)
            .map_err(io_error(parent))?;
        temp.write_all(content).map_err(io_error(&path))?;
        temp.as_file().sync_all().map_err(io_error(&path))?;
        persist(temp, &path)
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let base = if prefix.is_empty() {
            self.root.clone()
        } else {
            self.path_for(prefix)?
        };
        if !base.exists() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        for entry in WalkDir::new(&base) {
            let entry = entry.map_err(|e| StoreError::Io {
                path: e.path().unwrap_or(&base).to_path_buf(),
                source: e.into(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX) {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            keys.push(
                relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/"),
            );
        }

        keys.sort();
        Ok(keys)
    }

    fn ensure_dir(&self, key: &str) -> Result<(), StoreError> {
        let path = if key.is_empty() {
            self.root.clone()
        } else {
            self.path_for(key)?
        };
        std::fs::create_dir_all(&path).map_err(io_error(&path))
    }

    fn wipe(&self) -> Result<(), StoreError> {
        match std::fs::remove_dir_all(&self.root) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&self.root)(e)),
        }
    }

    fn location(&self) -> String {
        self.root.display().to_string()
    }
}

fn persist(temp: NamedTempFile, path: &Path) -> Result<(), StoreError> {
    temp.persist(path)
        .map(|_| ())
        .map_err(|e| io_error(path)(e.error))
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryBackend {
    documents: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn documents(&self) -> MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.documents.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl StoreBackend for MemoryBackend {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        validate_key(key)?;
        Ok(self.documents().get(key).cloned())
    }

    fn write(&self, key: &str, content: &[u8]) -> Result<(), StoreError> {
        validate_key(key)?;
        self.documents().insert(key.to_string(), content.to_vec());
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let documents = self.documents();
        if prefix.is_empty() {
            return Ok(documents.keys().cloned().collect());
        }
        validate_key(prefix)?;
        let dir_prefix = format!("{prefix}/");
        Ok(documents
            .keys()
            .filter(|key| key.as_str() == prefix || key.starts_with(&dir_prefix))
            .cloned()
            .collect())
    }

    fn ensure_dir(&self, _key: &str) -> Result<(), StoreError> {
        Ok(())
    }

    fn wipe(&self) -> Result<(), StoreError> {
        self.documents().clear();
        Ok(())
    }

    fn location(&self) -> String {
        "<memory>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_key() {
        assert_eq!(validate_key("hf/org/m@main").unwrap(), vec!["hf", "org", "m@main"]);

        for bad in ["", "/etc/passwd", "a/../b", "a//b", "./a", "a/", "a\\b"] {
            assert!(
                matches!(validate_key(bad), Err(StoreError::InvalidKey { .. })),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn test_fs_write_read_list() {
        let temp = TempDir::new().unwrap();
        let backend = FsBackend::new(temp.path().join("store"));

        assert_eq!(backend.read("registry.json").unwrap(), None);

        backend.write("local/m/metadata.json", b"{}").unwrap();
        backend.write("local/m/files/sub/a.py", b"x").unwrap();
        backend.write("registry.json", b"{}").unwrap();

        assert_eq!(backend.read("local/m/files/sub/a.py").unwrap(), Some(b"x".to_vec()));
        assert_eq!(
            backend.list("local").unwrap(),
            vec!["local/m/files/sub/a.py", "local/m/metadata.json"]
        );
        assert_eq!(backend.list("hf").unwrap(), Vec::<String>::new());
    }

    #[test]
    fn test_fs_write_replaces_without_leftovers() {
        let temp = TempDir::new().unwrap();
        let backend = FsBackend::new(temp.path());

        backend.write("doc.json", b"one").unwrap();
        backend.write("doc.json", b"two").unwrap();

        assert_eq!(backend.read("doc.json").unwrap(), Some(b"two".to_vec()));
        let entries: Vec<_> = std::fs::read_dir(temp.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_fs_rejects_escaping_keys() {
        let temp = TempDir::new().unwrap();
        let backend = FsBackend::new(temp.path().join("store"));

        let result = backend.write("../outside.json", b"x");
        assert!(matches!(result, Err(StoreError::InvalidKey { .. })));
        assert!(!temp.path().join("outside.json").exists());
    }

    #[test]
    fn test_fs_wipe() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("store");
        let backend = FsBackend::new(&root);

        backend.write("hf/a/metadata.json", b"{}").unwrap();
        backend.wipe().unwrap();
        assert!(!root.exists());

        // Wiping an absent store is fine
        backend.wipe().unwrap();
    }

    #[test]
    fn test_memory_list_respects_component_boundaries() {
        let backend = MemoryBackend::new();
        backend.write("local/model/metadata.json", b"{}").unwrap();
        backend.write("local/model2/metadata.json", b"{}").unwrap();

        assert_eq!(backend.list("local/model").unwrap(), vec!["local/model/metadata.json"]);
        assert_eq!(backend.list("").unwrap().len(), 2);

        backend.wipe().unwrap();
        assert!(backend.list("").unwrap().is_empty());
    }
}
