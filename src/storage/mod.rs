//! Persistence collaborator: named JSON collections and uploaded assets

pub mod file;
pub mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use crate::error::StorageError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Trait for collection storage operations.
///
/// Writes replace the whole collection; read-modify-write atomicity across
/// concurrent requests is up to the implementation.
#[async_trait]
pub trait CollectionStore: Send + Sync {
    /// All records in a collection; empty if it has never been written
    async fn read_collection(&self, name: &str) -> StorageResult<Vec<Value>>;

    /// Replace a collection's records
    async fn write_collection(&self, name: &str, records: &[Value]) -> StorageResult<()>;

    /// Persist an uploaded asset and return its public URL path
    async fn put_asset(&self, key: &str, bytes: &[u8]) -> StorageResult<String>;
}

/// Content collections managed by the site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Blog,
    Recipes,
    Restaurants,
    Stores,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Blog,
        Collection::Recipes,
        Collection::Restaurants,
        Collection::Stores,
    ];

    /// Storage name, also the URL segment
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Blog => "blog",
            Collection::Recipes => "recipes",
            Collection::Restaurants => "restaurants",
            Collection::Stores => "stores",
        }
    }

    /// Field every record must carry as a non-empty string
    pub fn required_field(&self) -> &'static str {
        match self {
            Collection::Blog | Collection::Recipes => "title",
            Collection::Restaurants | Collection::Stores => "name",
        }
    }

    /// Key under which the collection's records are cached
    pub fn cache_key(&self) -> String {
        format!("collection:{}", self.name())
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Collection::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| format!("Unknown collection: {}", s))
    }
}

/// Reject asset keys that could escape the uploads directory
pub(crate) fn check_asset_key(key: &str) -> StorageResult<()> {
    let valid = !key.is_empty()
        && key.len() <= 128
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');

    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}
