//! Build-artifact cache: key derivation, archiving and transfer pipeline.

pub mod archiver;
pub mod command;
pub mod compression;
pub mod config;
pub mod keys;
pub mod local;
pub mod memory;
pub mod orchestrator;
pub mod skip;
pub mod transfer;
pub mod types;

pub use archiver::{ArchiveCodec, TarCodec};
pub use command::TarCommand;
pub use config::CacheConfig;
pub use keys::{CacheKey, RemotePath};
pub use local::FilesystemStorage;
pub use memory::MemoryStorage;
pub use orchestrator::Orchestrator;
pub use skip::{should_skip, skip_marker};
pub use transfer::{BufferedTransfer, StreamingTransfer, Transfer, transfer_for};
pub use types::{
    CompressionType, Mode, ModeReport, MountResult, RunPlan, RunReport, TransferStrategy,
};
