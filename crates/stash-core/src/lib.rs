//! Stash Core
//!
//! Core types, traits, and error handling for the stash build cache.
//! This crate has minimal dependencies and defines the shared vocabulary
//! used by the cache pipeline and every storage backend.

pub mod error;
pub mod hierarchy;
pub mod pipe;
pub mod ports;

pub use error::{Error, Result};
pub use hierarchy::{Hierarchy, NodeKind, create_ancestors, create_dir_all, parent_dir};
pub use pipe::{PipeReader, PipeWriter, pipe};
pub use ports::{ByteStream, Storage, StorageEntry};
