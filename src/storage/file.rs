//! JSON-file collection store

use super::{check_asset_key, CollectionStore, StorageResult};
use crate::error::StorageError;
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Stores each collection as `<data_dir>/<name>.json` and assets under
/// `<uploads_dir>`.
pub struct JsonFileStore {
    data_dir: PathBuf,
    uploads_dir: PathBuf,
    public_prefix: String,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Create the store, making both directories if needed
    pub async fn new(data_dir: impl Into<PathBuf>, uploads_dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let data_dir = data_dir.into();
        let uploads_dir = uploads_dir.into();

        tokio::fs::create_dir_all(&data_dir).await?;
        tokio::fs::create_dir_all(&uploads_dir).await?;
        info!(
            "JSON file store at {} (uploads in {})",
            data_dir.display(),
            uploads_dir.display()
        );

        Ok(Self {
            data_dir,
            uploads_dir,
            public_prefix: "/uploads".to_string(),
            write_lock: Mutex::new(()),
        })
    }

    fn collection_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(format!("{}.json", name))
    }
}

/// Write via a sibling temp file and rename so readers never see a torn file
async fn write_atomic(path: &Path, contents: &[u8]) -> StorageResult<()> {
    let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4().simple()));
    tokio::fs::write(&tmp, contents).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

#[async_trait]
impl CollectionStore for JsonFileStore {
    async fn read_collection(&self, name: &str) -> StorageResult<Vec<Value>> {
        let path = self.collection_path(name);

        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Collection {} not written yet", name);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<Value>(&raw)? {
            Value::Array(records) => {
                debug!("Read {} records from {}", records.len(), name);
                Ok(records)
            }
            _ => Err(StorageError::Corrupt(name.to_string())),
        }
    }

    async fn write_collection(&self, name: &str, records: &[Value]) -> StorageResult<()> {
        let contents = serde_json::to_vec_pretty(records)?;

        let _guard = self.write_lock.lock().await;
        write_atomic(&self.collection_path(name), &contents).await?;

        debug!("Wrote {} records to {}", records.len(), name);
        Ok(())
    }

    async fn put_asset(&self, key: &str, bytes: &[u8]) -> StorageResult<String> {
        check_asset_key(key)?;

        write_atomic(&self.uploads_dir.join(key), bytes).await?;
        info!("Stored asset {} ({} bytes)", key, bytes.len());

        Ok(format!("{}/{}", self.public_prefix, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn store(dir: &tempfile::TempDir) -> JsonFileStore {
        JsonFileStore::new(dir.path().join("data"), dir.path().join("uploads"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_missing_collection_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        assert!(store.read_collection("blog").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        let records = vec![json!({"id": "1", "title": "Hello"})];

        store.write_collection("blog", &records).await.unwrap();

        assert_eq!(store.read_collection("blog").await.unwrap(), records);
        assert!(dir.path().join("data/blog.json").exists());
    }

    #[tokio::test]
    async fn test_corrupt_collection() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        tokio::fs::write(dir.path().join("data/stores.json"), b"{\"not\": \"an array\"}")
            .await
            .unwrap();

        assert!(matches!(
            store.read_collection("stores").await,
            Err(StorageError::Corrupt(_))
        ));
    }

    #[tokio::test]
    async fn test_put_asset() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        let url = store.put_asset("abc.png", b"\x89PNG").await.unwrap();
        assert_eq!(url, "/uploads/abc.png");
        assert_eq!(
            tokio::fs::read(dir.path().join("uploads/abc.png")).await.unwrap(),
            b"\x89PNG"
        );

        assert!(store.put_asset("../escape.png", b"x").await.is_err());
    }
}
