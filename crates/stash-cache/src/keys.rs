//! Cache key derivation and remote path composition.

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Deterministic 128-bit cache key, rendered as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive a key from an ordered sequence of parts.
    ///
    /// Parts are hashed back to back without a separator, so `["ab", "c"]`
    /// and `["a", "bc"]` yield the same key. Stored entries depend on this
    /// exact byte layout.
    pub fn derive<S: AsRef<str>>(parts: &[S]) -> Self {
        let mut hasher = Md5::new();
        for part in parts {
            hasher.update(part.as_ref().as_bytes());
        }
        Self(hex::encode(hasher.finalize()))
    }

    /// Derive the key for a mount, optionally isolated per branch.
    pub fn for_mount(mount: &str, branch: Option<&str>) -> Self {
        match branch {
            Some(branch) => Self::derive(&[mount, branch]),
            None => Self::derive(&[mount]),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Backend location of a cache entry: `base / namespace / key`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemotePath(String);

impl RemotePath {
    /// Join path segments with `/`, dropping empty segments and duplicate
    /// separators. A leading `/` on `base` is kept.
    pub fn compose(base: &str, namespace: &str, key: &CacheKey) -> Self {
        let mut path = String::new();
        if base.starts_with('/') {
            path.push('/');
        }

        let segments = base
            .split('/')
            .chain(namespace.split('/'))
            .chain(std::iter::once(key.as_str()))
            .filter(|s| !s.is_empty() && *s != ".");
        for segment in segments {
            if !path.is_empty() && !path.ends_with('/') {
                path.push('/');
            }
            path.push_str(segment);
        }
        Self(path)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RemotePath {
    fn from(path: &str) -> Self {
        Self(path.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_derive_known_digests() {
        assert_eq!(
            CacheKey::derive::<&str>(&[]).as_str(),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
        assert_eq!(
            CacheKey::derive(&["/data", "main"]).as_str(),
            "1ffbf54b5b5d53a8110f993bf7f14658"
        );
        assert_eq!(
            CacheKey::derive(&["/data"]).as_str(),
            "4caa791091d21d23e63637080226f370"
        );
    }

    #[test]
    fn test_derive_is_deterministic() {
        let a = CacheKey::derive(&["/cache/node_modules", "feature/x"]);
        let b = CacheKey::derive(&["/cache/node_modules", "feature/x"]);
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }

    #[test]
    fn test_branch_and_mount_change_key() {
        let main = CacheKey::for_mount("/data", Some("main"));
        let dev = CacheKey::for_mount("/data", Some("dev"));
        let other = CacheKey::for_mount("/other", Some("main"));
        let ignored = CacheKey::for_mount("/data", None);

        assert_ne!(main, dev);
        assert_ne!(main, other);
        assert_ne!(main, ignored);
        assert_eq!(dev.as_str(), "fe8e76943f05b144d3d86ea695a58323");
    }

    #[test]
    fn test_concatenation_has_no_separator() {
        assert_eq!(CacheKey::derive(&["ab", "c"]), CacheKey::derive(&["a", "bc"]));
        assert_eq!(CacheKey::derive(&["abc"]).as_str(), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn test_compose_remote_path() {
        let key = CacheKey::derive(&["/data", "main"]);
        let path = RemotePath::compose("/var/lib/cache/drone/", "octocat/hello", &key);
        assert_eq!(
            path.as_str(),
            "/var/lib/cache/drone/octocat/hello/1ffbf54b5b5d53a8110f993bf7f14658"
        );

        let relative = RemotePath::compose("base", "", &key);
        assert_eq!(relative.as_str(), "base/1ffbf54b5b5d53a8110f993bf7f14658");
    }
}
