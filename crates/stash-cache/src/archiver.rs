//! Archive codecs: directory tree to tar stream and back.

use crate::compression::{Decoder, Encoder};
use crate::types::CompressionType;
use stash_core::{Error, Result};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Serializes a directory tree into a byte stream and restores it.
///
/// Entries are named after the normalized absolute source path without its
/// root, so extracting into `/` puts the tree back where it came from.
pub trait ArchiveCodec: Send + Sync {
    /// Write an archive of `src` to `writer`.
    fn archive(&self, src: &Path, writer: &mut dyn Write) -> Result<()>;

    /// Unpack the archive read from `reader` beneath `root`.
    fn extract(&self, root: &Path, reader: &mut dyn Read) -> Result<()>;

    /// Write an archive of `src` into the file at `dst`.
    fn archive_to_file(&self, src: &Path, dst: &Path) -> Result<()> {
        let mut file = File::create(dst)?;
        self.archive(src, &mut file)?;
        file.sync_all()?;
        Ok(())
    }

    /// Unpack the archive file at `archive` beneath `root`.
    fn extract_from_file(&self, archive: &Path, root: &Path) -> Result<()> {
        let mut file = File::open(archive)?;
        self.extract(root, &mut file)
    }

    /// Codec name for logging.
    fn name(&self) -> &str;
}

/// Resolve `src` to a clean absolute path that exists.
pub fn normalize_source(src: &Path) -> Result<PathBuf> {
    let absolute = std::path::absolute(src)
        .map_err(|e| Error::SourceNotFound(format!("{}: {}", src.display(), e)))?;

    let mut clean = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::ParentDir => {
                clean.pop();
            }
            Component::CurDir => {}
            other => clean.push(other.as_os_str()),
        }
    }

    if !clean.exists() {
        return Err(Error::SourceNotFound(clean.display().to_string()));
    }
    Ok(clean)
}

/// Archive entry name for a normalized absolute path.
pub fn entry_name(src: &Path) -> PathBuf {
    let name: PathBuf = src
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect();
    if name.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        name
    }
}

/// In-process tar codec; never materializes the whole archive.
#[derive(Debug, Clone, Default)]
pub struct TarCodec {
    compression: CompressionType,
}

impl TarCodec {
    pub fn new(compression: CompressionType) -> Self {
        Self { compression }
    }

    pub fn compression(&self) -> CompressionType {
        self.compression
    }
}

fn append_source<W: Write>(builder: &mut tar::Builder<W>, src: &Path, name: &Path) -> io::Result<()> {
    if src.is_dir() {
        builder.append_dir_all(name, src)
    } else {
        builder.append_path_with_name(src, name)
    }
}

impl ArchiveCodec for TarCodec {
    fn archive(&self, src: &Path, writer: &mut dyn Write) -> Result<()> {
        let src = normalize_source(src)?;
        let name = entry_name(&src);
        debug!(src = %src.display(), entry = %name.display(), compression = ?self.compression, "Archiving");

        let encoder = Encoder::new(writer, self.compression)?;
        let mut builder = tar::Builder::new(encoder);
        builder.follow_symlinks(false);

        append_source(&mut builder, &src, &name).map_err(|e| {
            Error::ArchiveFailed(format!("Failed to pack {}: {}", src.display(), e))
        })?;
        let encoder = builder
            .into_inner()
            .map_err(|e| Error::ArchiveFailed(format!("Failed to finish tar: {}", e)))?;
        let writer = encoder.finish()?;
        writer
            .flush()
            .map_err(|e| Error::ArchiveFailed(format!("Failed to flush archive: {}", e)))
    }

    fn extract(&self, root: &Path, reader: &mut dyn Read) -> Result<()> {
        std::fs::create_dir_all(root).map_err(|e| {
            Error::ExtractionFailed(format!("Cannot create {}: {}", root.display(), e))
        })?;

        let decoder = Decoder::new(reader, self.compression)?;
        let mut archive = tar::Archive::new(decoder);
        archive.set_preserve_permissions(true);
        archive.set_preserve_mtime(true);
        archive.set_overwrite(true);
        archive.unpack(root).map_err(|e| {
            Error::ExtractionFailed(format!("Failed to unpack archive into {}: {}", root.display(), e))
        })
    }

    fn name(&self) -> &str {
        "tar"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_tree(root: &Path) -> PathBuf {
        let src = root.join("node_modules");
        std::fs::create_dir_all(src.join("left-pad/lib")).unwrap();
        std::fs::write(src.join("left-pad/package.json"), br#"{"name":"left-pad"}"#).unwrap();
        std::fs::write(src.join("left-pad/lib/index.js"), b"module.exports = pad;").unwrap();
        std::fs::create_dir_all(src.join("empty")).unwrap();
        src
    }

    #[test]
    fn test_roundtrip_into_empty_destination() {
        let scratch = tempfile::tempdir().unwrap();
        let src = sample_tree(scratch.path());
        let entry = entry_name(&normalize_source(&src).unwrap());

        for compression in [
            CompressionType::None,
            CompressionType::Gzip,
            CompressionType::Zstd,
            CompressionType::Lz4,
        ] {
            let dest = tempfile::tempdir().unwrap();
            let codec = TarCodec::new(compression);
            let mut archive = Vec::new();
            codec.archive(&src, &mut archive).unwrap();
            codec.extract(dest.path(), &mut archive.as_slice()).unwrap();

            let restored = dest.path().join(&entry);
            assert_eq!(
                std::fs::read_to_string(restored.join("left-pad/lib/index.js")).unwrap(),
                "module.exports = pad;",
                "{:?}",
                compression
            );
            assert_eq!(
                std::fs::read_to_string(restored.join("left-pad/package.json")).unwrap(),
                r#"{"name":"left-pad"}"#,
                "{:?}",
                compression
            );
            assert!(restored.join("empty").is_dir(), "{:?}", compression);
        }
    }

    #[test]
    fn test_file_based_roundtrip() {
        let scratch = tempfile::tempdir().unwrap();
        let src = sample_tree(scratch.path());
        let archive = scratch.path().join("archive.tar");
        let dest = tempfile::tempdir().unwrap();

        let codec = TarCodec::default();
        codec.archive_to_file(&src, &archive).unwrap();
        codec.extract_from_file(&archive, dest.path()).unwrap();

        let restored = dest.path().join(entry_name(&normalize_source(&src).unwrap()));
        assert!(restored.join("left-pad/lib/index.js").is_file());
    }

    #[test]
    fn test_missing_source() {
        let scratch = tempfile::tempdir().unwrap();
        let err = TarCodec::default()
            .archive(&scratch.path().join("absent"), &mut Vec::new())
            .unwrap_err();
        assert!(matches!(err, Error::SourceNotFound(_)));
    }

    #[test]
    fn test_corrupt_stream() {
        let dest = tempfile::tempdir().unwrap();
        let garbage = vec![0xAB_u8; 1024];
        let err = TarCodec::default()
            .extract(dest.path(), &mut garbage.as_slice())
            .unwrap_err();
        assert!(matches!(err, Error::ExtractionFailed(_)));
    }

    #[test]
    fn test_truncated_stream() {
        let scratch = tempfile::tempdir().unwrap();
        let src = sample_tree(scratch.path());
        let mut archive = Vec::new();
        TarCodec::default().archive(&src, &mut archive).unwrap();

        // Cut in the middle of the first file's data block.
        let truncated = &archive[..512 + 100];
        let dest = tempfile::tempdir().unwrap();
        let result = TarCodec::default().extract(dest.path(), &mut &truncated[..]);
        assert!(matches!(result, Err(Error::ExtractionFailed(_))));
    }

    #[test]
    fn test_normalize_source_resolves_dots() {
        let scratch = tempfile::tempdir().unwrap();
        let src = sample_tree(scratch.path());
        let dotted = src.join("left-pad").join("..").join(".");
        assert_eq!(normalize_source(&dotted).unwrap(), normalize_source(&src).unwrap());
    }

    #[test]
    fn test_entry_name_strips_root() {
        assert_eq!(entry_name(Path::new("/data/cache")), PathBuf::from("data/cache"));
        assert_eq!(entry_name(Path::new("/")), PathBuf::from("."));
    }
}
