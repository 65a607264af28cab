//! stackfs: one filesystem contract, many interchangeable backends.
//!
//! This crate provides:
//!
//! - **Contract**: the [`Filesystem`] and [`File`] traits, [`OpenFlags`] and a
//!   shared error taxonomy ([`FsError`])
//! - **Backends**: [`MemoryFs`], [`LocalFs`], [`ReadOnlyFs`], [`ArchiveFs`]
//! - **Overlay**: [`OverlayFs`], copy-on-write composition of any two backends
//! - **Config**: TOML descriptions of backend stacks ([`config`])
//! - **Helpers**: whole-file and tree utilities over any backend ([`helpers`])
//!
//! Calls are synchronous and every backend is `Send + Sync`, so one instance can
//! be shared across threads behind an `Arc`.

pub mod config;
pub mod error;
pub mod helpers;
pub mod path;
pub mod vfs;

pub use error::{ErrorKind, FsError, FsResult};
pub use vfs::{
    ArchiveError, ArchiveFs, ArchiveSource, EntryKind, File, Filesystem, LocalFs, MemFile, MemoryFs, Metadata, OpenFlags,
    OverlayFs, ReadOnlyFs, mode,
};
