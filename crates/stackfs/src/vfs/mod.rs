//! Virtual Filesystem (VFS) backends for stackfs.
//!
//! Every backend implements the same [`Filesystem`] contract:
//!
//! - **MemoryFs**: In-memory ephemeral storage (tests, scratch layers)
//! - **LocalFs**: Real filesystem access under a root directory
//! - **ReadOnlyFs**: Wraps any backend and refuses every mutation
//! - **ArchiveFs**: Read-only view of a zip archive
//! - **OverlayFs**: Copy-on-write union of a read-only base and a writable layer
//!
//! # Design
//!
//! Backends stack. A typical writable sandbox over a pristine tree looks like:
//!
//! ```text
//! OverlayFs
//! ├── base:  ReadOnlyFs(LocalFs("/srv/project"))
//! └── layer: MemoryFs
//! ```
//!
//! Reads fall through to the base; the first write to a base file copies it
//! into the layer, and everything after that happens in the layer.

mod archive;
mod local;
mod memory;
mod overlay;
mod read_only;
mod traits;

pub use archive::{ArchiveError, ArchiveFs, ArchiveSource};
pub use local::LocalFs;
pub use memory::{MemFile, MemoryFs};
pub use overlay::OverlayFs;
pub use read_only::ReadOnlyFs;
pub use traits::{EntryKind, File, Filesystem, Metadata, OpenFlags, mode};
