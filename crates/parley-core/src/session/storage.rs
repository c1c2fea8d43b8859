//! Key-value storage port for persisted sessions.
//!
//! Defines the interface the session store writes through to.
//! The file-backed implementation lives in parley-infra; `MemoryStorage`
//! here backs tests and ephemeral sessions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use parley_types::error::StorageError;

/// String-keyed persistent storage for serialized session layouts.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait SessionStorage: Send + Sync {
    /// Read a value. Returns None if the key does not exist.
    fn read(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Option<String>, StorageError>> + Send;

    /// Write a value for a key (upsert).
    fn write(
        &self,
        key: &str,
        value: &str,
    ) -> impl std::future::Future<Output = Result<(), StorageError>> + Send;

    /// Delete a key. No-op if the key does not exist.
    fn remove(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<(), StorageError>> + Send;
}

/// In-memory storage. Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
    writes: Arc<Mutex<u64>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Synchronous read, for inspection.
    pub fn get(&self, key: &str) -> Option<String> {
        self.lock_entries().get(key).cloned()
    }

    /// Seed a value without counting it as a write.
    pub fn insert(&self, key: &str, value: &str) {
        self.lock_entries().insert(key.to_string(), value.to_string());
    }

    /// Number of writes performed through the storage port.
    pub fn write_count(&self) -> u64 {
        *self.writes.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SessionStorage for MemoryStorage {
    async fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.get(key))
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.insert(key, value);
        *self.writes.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.lock_entries().remove(key);
        Ok(())
    }
}
