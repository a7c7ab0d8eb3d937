//! JSON file storage backend.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{trace, warn};

use super::{Storage, StorageError};

/// Storage backed by a single JSON document on disk.
///
/// The document is an object mapping storage keys to string values. Writes
/// go to a sibling temp file that is renamed over the document, so a crash
/// mid-write leaves the previous contents intact.
#[derive(Debug)]
pub struct FileStorage {
    /// Path of the JSON document
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl FileStorage {
    /// Create a store backed by the document at `path`.
    ///
    /// The file does not need to exist yet; it is created on the first write.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    fn read_document(&self) -> Result<HashMap<String, String>, StorageError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(HashMap::new()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_document(&self, document: &HashMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "store".to_string());
        let tmp_path = self
            .path
            .with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

        let contents = serde_json::to_string_pretty(document)?;
        fs::write(&tmp_path, contents)?;
        if let Err(e) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        trace!(path = %self.path.display(), keys = document.len(), "Wrote storage document");
        Ok(())
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let mut document = self.read_document()?;
        Ok(document.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock();
        let mut document = match self.read_document() {
            Ok(document) => document,
            Err(StorageError::Serialization(e)) => {
                warn!(path = %self.path.display(), error = %e, "Replacing unreadable storage document");
                HashMap::new()
            }
            Err(e) => return Err(e),
        };
        document.insert(key.to_string(), value.to_string());
        self.write_document(&document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("kobo-ratelimit-{}", uuid::Uuid::new_v4()))
            .join(name)
    }

    fn cleanup(path: &Path) {
        if let Some(dir) = path.parent() {
            let _ = fs::remove_dir_all(dir);
        }
    }

    #[test]
    fn test_missing_file_reads_as_empty() {
        let path = scratch_path("store.json");
        let storage = FileStorage::new(&path);

        assert_eq!(storage.get("anything").unwrap(), None);
        assert!(!path.exists());
    }

    #[test]
    fn test_set_then_get() {
        let path = scratch_path("store.json");
        let storage = FileStorage::new(&path);

        storage.set("limits", "{\"a\":1}").unwrap();
        storage.set("other", "value").unwrap();

        assert_eq!(storage.get("limits").unwrap().as_deref(), Some("{\"a\":1}"));
        assert_eq!(storage.get("other").unwrap().as_deref(), Some("value"));

        cleanup(&path);
    }

    #[test]
    fn test_values_survive_new_instance() {
        let path = scratch_path("store.json");
        FileStorage::new(&path).set("limits", "persisted").unwrap();

        let reopened = FileStorage::new(&path);
        assert_eq!(reopened.get("limits").unwrap().as_deref(), Some("persisted"));

        cleanup(&path);
    }

    #[test]
    fn test_corrupt_document_is_an_error() {
        let path = scratch_path("store.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "not json").unwrap();

        let storage = FileStorage::new(&path);
        assert!(matches!(
            storage.get("limits"),
            Err(StorageError::Serialization(_))
        ));

        cleanup(&path);
    }

    #[test]
    fn test_write_replaces_corrupt_document() {
        let path = scratch_path("store.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{{{").unwrap();

        let storage = FileStorage::new(&path);
        storage.set("limits", "fresh").unwrap();

        assert_eq!(storage.get("limits").unwrap().as_deref(), Some("fresh"));

        cleanup(&path);
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let path = scratch_path("store.json");
        let storage = FileStorage::new(&path);
        storage.set("limits", "value").unwrap();

        let entries: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0], "store.json");

        cleanup(&path);
    }
}
