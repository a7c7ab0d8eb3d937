//! In-memory storage backend.

use dashmap::DashMap;

use super::{Storage, StorageError};

/// Storage held entirely in process memory.
///
/// Nothing survives the process; share it through an `Arc` to hand the same
/// contents to several limiters.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: DashMap<String, String>,
}

impl MemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove the value stored under `key`.
    pub fn remove(&self, key: &str) -> Option<String> {
        self.values.remove(key).map(|(_, value)| value)
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.values.get(key).map(|value| value.clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_missing_key() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get("missing").unwrap(), None);
        assert!(storage.is_empty());
    }

    #[test]
    fn test_set_overwrites() {
        let storage = MemoryStorage::new();

        storage.set("key", "first").unwrap();
        storage.set("key", "second").unwrap();

        assert_eq!(storage.get("key").unwrap().as_deref(), Some("second"));
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn test_remove() {
        let storage = MemoryStorage::new();
        storage.set("key", "value").unwrap();

        assert_eq!(storage.remove("key").as_deref(), Some("value"));
        assert_eq!(storage.get("key").unwrap(), None);
    }
}
