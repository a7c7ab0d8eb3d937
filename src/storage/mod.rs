//! Durable key-value storage for limiter snapshots.
//!
//! The limiter only needs two operations, so any backend that can read and
//! write a string under a key can hold its state: memory for tests, a JSON
//! file on disk for the CLI, or a host-provided store when embedded.

mod file;
mod memory;

use std::sync::Arc;

use thiserror::Error;

pub use file::FileStorage;
pub use memory::MemoryStorage;

/// Errors raised by storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing the backing medium failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing document could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backend refused the operation (quota, disabled storage, ...)
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// A string key-value store.
pub trait Storage: Send + Sync {
    /// Read the value stored under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

impl<S: Storage + ?Sized> Storage for Arc<S> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }
}
