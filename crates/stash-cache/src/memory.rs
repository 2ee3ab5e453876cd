//! In-memory storage backend for tests and dry runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use stash_core::{ByteStream, Error, Result, Storage, StorageEntry};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct Object {
    data: Vec<u8>,
    modified: DateTime<Utc>,
}

/// Flat key/value store keeping whole objects in memory.
///
/// An object only becomes visible once its stream has been read to the
/// end, so a failed upload leaves nothing behind.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    objects: RwLock<BTreeMap<String, Object>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the object stored at `path`.
    pub async fn object(&self, path: &str) -> Option<Vec<u8>> {
        self.objects.read().await.get(path).map(|o| o.data.clone())
    }

    /// Paths of every stored object, sorted.
    pub async fn paths(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }
}

fn in_subtree(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    prefix.is_empty()
        || path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn list(&self, prefix: &str) -> Result<Vec<StorageEntry>> {
        Ok(self
            .objects
            .read()
            .await
            .iter()
            .filter(|(path, _)| in_subtree(path, prefix))
            .map(|(path, object)| StorageEntry {
                name: path.clone(),
                size: object.data.len() as u64,
                modified: Some(object.modified),
                is_dir: false,
            })
            .collect())
    }

    async fn get(&self, path: &str) -> Result<ByteStream> {
        let data = self
            .object(path)
            .await
            .ok_or_else(|| Error::NotFound(path.to_string()))?;
        Ok(Box::pin(std::io::Cursor::new(data)))
    }

    async fn put(&self, path: &str, _ttl: Option<Duration>, mut src: ByteStream) -> Result<()> {
        let mut data = Vec::new();
        src.read_to_end(&mut data)
            .await
            .map_err(|e| Error::Backend(format!("Failed to read upload for {}: {}", path, e)))?;

        self.objects.write().await.insert(
            path.to_string(),
            Object {
                data,
                modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<()> {
        self.objects
            .write()
            .await
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
