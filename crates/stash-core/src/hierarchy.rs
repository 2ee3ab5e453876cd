//! Recursive ancestor creation for hierarchical backends.
//!
//! Backends that store objects in a directory tree (SFTP, local disk)
//! must create every missing ancestor before writing an object. Several
//! pipeline runs may do so concurrently for overlapping prefixes, so a
//! `make_dir` failure is re-checked: if the directory exists afterwards a
//! concurrent creator won the race and the step succeeds.

use crate::{Error, Result};
use tracing::debug;

/// Kind of node found at a backend path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Directory,
    File,
}

/// Minimal directory operations of a hierarchical backend.
pub trait Hierarchy {
    /// Kind of node at `path`, or `None` when nothing exists there.
    fn probe(&self, path: &str) -> Result<Option<NodeKind>>;

    /// Create one directory whose parent already exists.
    fn make_dir(&self, path: &str) -> Result<()>;
}

/// Parent directory of an object path, if it has one.
pub fn parent_dir(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&trimmed[..idx]),
        None => None,
    }
}

/// Create every missing ancestor directory of the object at `path`.
pub fn create_ancestors<H: Hierarchy + ?Sized>(backend: &H, path: &str) -> Result<()> {
    match parent_dir(path) {
        Some(dir) => create_dir_all(backend, dir),
        None => Ok(()),
    }
}

/// Create `dir` and all of its missing ancestors, walking from the root.
pub fn create_dir_all<H: Hierarchy + ?Sized>(backend: &H, dir: &str) -> Result<()> {
    let mut prefix = String::with_capacity(dir.len());
    if dir.starts_with('/') {
        prefix.push('/');
    }

    for segment in dir.split('/').filter(|s| !s.is_empty() && *s != ".") {
        if !prefix.is_empty() && !prefix.ends_with('/') {
            prefix.push('/');
        }
        prefix.push_str(segment);

        match backend.probe(&prefix)? {
            Some(NodeKind::Directory) => continue,
            Some(NodeKind::File) => {
                return Err(Error::Backend(format!(
                    "{} exists and is not a directory",
                    prefix
                )));
            }
            None => {}
        }

        if let Err(err) = backend.make_dir(&prefix) {
            match backend.probe(&prefix) {
                Ok(Some(NodeKind::Directory)) => {
                    debug!(path = %prefix, "Directory created concurrently");
                }
                _ => return Err(err),
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};

    /// Directory tree rooted in a scratch directory.
    struct ScratchTree {
        root: PathBuf,
    }

    impl ScratchTree {
        fn resolve(&self, path: &str) -> PathBuf {
            self.root.join(path.trim_start_matches('/'))
        }
    }

    impl Hierarchy for ScratchTree {
        fn probe(&self, path: &str) -> Result<Option<NodeKind>> {
            match std::fs::metadata(self.resolve(path)) {
                Ok(m) if m.is_dir() => Ok(Some(NodeKind::Directory)),
                Ok(_) => Ok(Some(NodeKind::File)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            }
        }

        fn make_dir(&self, path: &str) -> Result<()> {
            Ok(std::fs::create_dir(self.resolve(path))?)
        }
    }

    /// Reports every directory as missing once, then lets a "concurrent"
    /// actor create it right before our own `make_dir` call.
    struct RacingTree {
        inner: ScratchTree,
        made: Mutex<Vec<String>>,
    }

    impl Hierarchy for RacingTree {
        fn probe(&self, path: &str) -> Result<Option<NodeKind>> {
            if self.made.lock().unwrap().iter().any(|p| p == path) {
                self.inner.probe(path)
            } else {
                Ok(None)
            }
        }

        fn make_dir(&self, path: &str) -> Result<()> {
            // The other actor wins.
            let _ = std::fs::create_dir(self.inner.resolve(path));
            self.made.lock().unwrap().push(path.to_string());
            self.inner.make_dir(path)
        }
    }

    fn is_dir(root: &Path, rel: &str) -> bool {
        root.join(rel).is_dir()
    }

    #[test]
    fn test_parent_dir() {
        assert_eq!(parent_dir("/var/cache/repo/abc"), Some("/var/cache/repo"));
        assert_eq!(parent_dir("cache/abc"), Some("cache"));
        assert_eq!(parent_dir("/abc"), Some("/"));
        assert_eq!(parent_dir("abc"), None);
    }

    #[test]
    fn test_create_ancestors_nested() {
        let dir = tempfile::tempdir().unwrap();
        let tree = ScratchTree {
            root: dir.path().to_path_buf(),
        };

        create_ancestors(&tree, "/base/repo/deadbeef").unwrap();
        assert!(is_dir(dir.path(), "base/repo"));
        assert!(!dir.path().join("base/repo/deadbeef").exists());
    }

    #[test]
    fn test_create_ancestors_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let tree = ScratchTree {
            root: dir.path().to_path_buf(),
        };

        create_ancestors(&tree, "a/b/c/object").unwrap();
        create_ancestors(&tree, "a/b/c/object").unwrap();
        assert!(is_dir(dir.path(), "a/b/c"));
    }

    #[test]
    fn test_lost_race_is_success() {
        let dir = tempfile::tempdir().unwrap();
        let tree = RacingTree {
            inner: ScratchTree {
                root: dir.path().to_path_buf(),
            },
            made: Mutex::new(Vec::new()),
        };

        create_ancestors(&tree, "x/y/z/object").unwrap();
        assert!(is_dir(dir.path(), "x/y/z"));
    }

    #[test]
    fn test_file_in_the_way() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("blocker"), b"not a dir").unwrap();
        let tree = ScratchTree {
            root: dir.path().to_path_buf(),
        };

        let err = create_ancestors(&tree, "blocker/inner/object").unwrap_err();
        assert!(matches!(err, Error::Backend(_)));
    }

    #[test]
    fn test_concurrent_overlapping_prefixes() {
        let dir = tempfile::tempdir().unwrap();
        let tree = Arc::new(ScratchTree {
            root: dir.path().to_path_buf(),
        });

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let tree = Arc::clone(&tree);
                std::thread::spawn(move || {
                    create_ancestors(tree.as_ref(), &format!("/shared/repo/{}/object", i % 4))
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap().unwrap();
        }
        for i in 0..4 {
            assert!(is_dir(dir.path(), &format!("shared/repo/{}", i)));
        }
    }
}
