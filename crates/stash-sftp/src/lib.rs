//! SFTP storage backend.
//!
//! Objects are plain files on a remote host reached over SSH. Paths given
//! to the [`Storage`](stash_core::Storage) methods are used verbatim as
//! remote paths.

pub mod config;
pub mod storage;

pub use config::SftpConfig;
pub use storage::SftpStorage;
