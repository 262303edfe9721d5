//! In-memory collection store for tests and ephemeral runs

use super::{check_asset_key, CollectionStore, StorageResult};
use crate::error::StorageError;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Default)]
pub struct MemoryStore {
    collections: DashMap<String, Vec<Value>>,
    assets: DashMap<String, Vec<u8>>,
    reads: AtomicUsize,
    fail: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with an I/O error
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// How many times `read_collection` has been called
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn asset(&self, key: &str) -> Option<Vec<u8>> {
        self.assets.get(key).map(|a| a.clone())
    }

    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    fn check_available(&self) -> StorageResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "memory store unavailable",
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl CollectionStore for MemoryStore {
    async fn read_collection(&self, name: &str) -> StorageResult<Vec<Value>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self
            .collections
            .get(name)
            .map(|records| records.clone())
            .unwrap_or_default())
    }

    async fn write_collection(&self, name: &str, records: &[Value]) -> StorageResult<()> {
        self.check_available()?;
        self.collections.insert(name.to_string(), records.to_vec());
        Ok(())
    }

    async fn put_asset(&self, key: &str, bytes: &[u8]) -> StorageResult<String> {
        self.check_available()?;
        check_asset_key(key)?;
        self.assets.insert(key.to_string(), bytes.to_vec());
        Ok(format!("/uploads/{}", key))
    }
}
