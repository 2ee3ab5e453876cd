//! Archive codec delegating to the system `tar` binary.
//!
//! The external tool works on real files, so the stream half of the codec
//! contract stages through a private temporary file.

use crate::archiver::{ArchiveCodec, entry_name, normalize_source};
use crate::types::CompressionType;
use stash_core::{Error, Result};
use std::io::{self, Read, Write};
use std::path::Path;
use std::process::{Command, Output};
use tracing::{debug, warn};

/// Codec that shells out to `tar`.
#[derive(Debug, Clone)]
pub struct TarCommand {
    program: String,
    compression: CompressionType,
}

impl Default for TarCommand {
    fn default() -> Self {
        Self::new(CompressionType::None)
    }
}

impl TarCommand {
    pub fn new(compression: CompressionType) -> Self {
        Self {
            program: "tar".to_string(),
            compression,
        }
    }

    /// Use a different tar executable.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn compression_flag(&self) -> Result<Option<&'static str>> {
        match self.compression {
            CompressionType::None => Ok(None),
            CompressionType::Gzip => Ok(Some("-z")),
            CompressionType::Zstd => Ok(Some("--zstd")),
            CompressionType::Lz4 => Err(Error::Config(
                "lz4 compression is not supported by the tar command codec".to_string(),
            )),
        }
    }

    fn run(&self, command: &mut Command) -> io::Result<Output> {
        debug!(command = ?command, "Running tar");
        command.output()
    }

    fn failure(&self, output: &Output) -> String {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(status = %output.status, stderr = %stderr.trim(), "tar failed");
        format!("{} exited with {}: {}", self.program, output.status, stderr.trim())
    }
}

impl ArchiveCodec for TarCommand {
    fn archive(&self, src: &Path, writer: &mut dyn Write) -> Result<()> {
        let staged = tempfile::Builder::new()
            .prefix("stash-")
            .suffix(".tar")
            .tempfile()?;
        self.archive_to_file(src, staged.path())?;

        let mut file = staged.reopen()?;
        io::copy(&mut file, writer)
            .map_err(|e| Error::ArchiveFailed(format!("Failed to stream archive: {}", e)))?;
        Ok(())
    }

    fn extract(&self, root: &Path, reader: &mut dyn Read) -> Result<()> {
        let mut staged = tempfile::Builder::new()
            .prefix("stash-")
            .suffix(".tar")
            .tempfile()?;
        io::copy(reader, staged.as_file_mut())
            .map_err(|e| Error::ExtractionFailed(format!("Failed to read archive: {}", e)))?;
        staged.as_file().sync_all()?;

        self.extract_from_file(staged.path(), root)
    }

    fn archive_to_file(&self, src: &Path, dst: &Path) -> Result<()> {
        let src = normalize_source(src)?;
        let name = entry_name(&src);
        let root = src.ancestors().last().unwrap_or(Path::new("/"));

        let mut command = Command::new(&self.program);
        command.arg("-c");
        if let Some(flag) = self.compression_flag()? {
            command.arg(flag);
        }
        command.arg("-f").arg(dst).arg("-C").arg(root).arg(&name);

        let output = self.run(&mut command).map_err(|e| {
            Error::ArchiveFailed(format!("Failed to spawn {}: {}", self.program, e))
        })?;
        if !output.status.success() {
            return Err(Error::ArchiveFailed(self.failure(&output)));
        }
        Ok(())
    }

    fn extract_from_file(&self, archive: &Path, root: &Path) -> Result<()> {
        std::fs::create_dir_all(root).map_err(|e| {
            Error::ExtractionFailed(format!("Cannot create {}: {}", root.display(), e))
        })?;

        let mut command = Command::new(&self.program);
        command.arg("-x");
        if let Some(flag) = self.compression_flag()? {
            command.arg(flag);
        }
        command.arg("-f").arg(archive).arg("-C").arg(root);

        let output = self.run(&mut command).map_err(|e| {
            Error::ExtractionFailed(format!("Failed to spawn {}: {}", self.program, e))
        })?;
        if !output.status.success() {
            return Err(Error::ExtractionFailed(self.failure(&output)));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "tar-command"
    }
}
