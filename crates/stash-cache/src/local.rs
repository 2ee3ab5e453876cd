//! Local-disk storage backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use stash_core::{
    ByteStream, Error, Hierarchy, NodeKind, Result, Storage, StorageEntry, create_ancestors,
};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Filesystem-based storage rooted at a local directory.
///
/// Backend paths are resolved beneath the root, so `/var/cache/x` and
/// `var/cache/x` address the same object.
#[derive(Debug, Clone)]
pub struct FilesystemStorage {
    root_dir: PathBuf,
}

impl FilesystemStorage {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(Error::Backend(format!("Path escapes storage root: {}", path)));
        }
        Ok(self.root_dir.join(relative))
    }
}

impl Hierarchy for FilesystemStorage {
    fn probe(&self, path: &str) -> Result<Option<NodeKind>> {
        match std::fs::metadata(self.resolve(path)?) {
            Ok(m) if m.is_dir() => Ok(Some(NodeKind::Directory)),
            Ok(_) => Ok(Some(NodeKind::File)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Backend(format!("Failed to stat {}: {}", path, e))),
        }
    }

    fn make_dir(&self, path: &str) -> Result<()> {
        std::fs::create_dir(self.resolve(path)?)
            .map_err(|e| Error::Backend(format!("Failed to create dir {}: {}", path, e)))
    }
}

fn entry(name: String, metadata: &std::fs::Metadata) -> StorageEntry {
    StorageEntry {
        name,
        size: metadata.len(),
        modified: metadata.modified().ok().map(DateTime::<Utc>::from),
        is_dir: metadata.is_dir(),
    }
}

#[async_trait]
impl Storage for FilesystemStorage {
    async fn list(&self, prefix: &str) -> Result<Vec<StorageEntry>> {
        let root = self.resolve(prefix)?;
        let metadata = match tokio::fs::metadata(&root).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => {
                return Err(Error::Backend(format!("Failed to stat {}: {}", prefix, e)));
            }
        };

        let mut entries = vec![entry(prefix.to_string(), &metadata)];
        let mut pending = vec![];
        if metadata.is_dir() {
            pending.push((root, prefix.trim_end_matches('/').to_string()));
        }

        while let Some((dir, name)) = pending.pop() {
            let mut read_dir = match tokio::fs::read_dir(&dir).await {
                Ok(rd) => rd,
                Err(e) => {
                    debug!(dir = %dir.display(), error = %e, "Skipping unreadable directory");
                    continue;
                }
            };

            while let Ok(Some(child)) = read_dir.next_entry().await {
                let child_name = format!("{}/{}", name, child.file_name().to_string_lossy());
                let metadata = match child.metadata().await {
                    Ok(m) => m,
                    Err(e) => {
                        debug!(entry = %child_name, error = %e, "Skipping unreadable entry");
                        continue;
                    }
                };
                if metadata.is_dir() {
                    pending.push((child.path(), child_name.clone()));
                }
                entries.push(entry(child_name, &metadata));
            }
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn get(&self, path: &str) -> Result<ByteStream> {
        let file_path = self.resolve(path)?;
        match tokio::fs::metadata(&file_path).await {
            Ok(m) if m.is_dir() => {
                return Err(Error::Backend(format!("{} is a directory", path)));
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(path.to_string()));
            }
            Err(e) => return Err(Error::Backend(format!("Failed to stat {}: {}", path, e))),
        }

        let file = tokio::fs::File::open(&file_path)
            .await
            .map_err(|e| Error::Backend(format!("Failed to open {}: {}", path, e)))?;
        Ok(Box::pin(file))
    }

    async fn put(&self, path: &str, _ttl: Option<Duration>, mut src: ByteStream) -> Result<()> {
        // Entries live until removed; the TTL hint is not tracked here.
        let file_path = self.resolve(path)?;
        let tree = self.clone();
        let object = path.to_string();
        tokio::task::spawn_blocking(move || create_ancestors(&tree, &object)).await??;

        let mut file = tokio::fs::File::create(&file_path)
            .await
            .map_err(|e| Error::Backend(format!("Failed to create {}: {}", path, e)))?;
        let written = tokio::io::copy(&mut src, &mut file)
            .await
            .map_err(|e| Error::Backend(format!("Failed to write {}: {}", path, e)))?;
        file.flush()
            .await
            .map_err(|e| Error::Backend(format!("Failed to flush {}: {}", path, e)))?;

        debug!(path = %path, bytes = written, "Stored object");
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<()> {
        let file_path = self.resolve(path)?;
        let metadata = match tokio::fs::metadata(&file_path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(path.to_string()));
            }
            Err(e) => return Err(Error::Backend(format!("Failed to stat {}: {}", path, e))),
        };

        let removed = if metadata.is_dir() {
            tokio::fs::remove_dir(&file_path).await
        } else {
            tokio::fs::remove_file(&file_path).await
        };
        removed.map_err(|e| Error::Backend(format!("Failed to delete {}: {}", path, e)))
    }

    fn name(&self) -> &str {
        "filesystem"
    }
}
