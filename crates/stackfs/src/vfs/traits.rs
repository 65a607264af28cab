//! Core VFS traits and types.

use std::fmt;
use std::io::{Read, Seek, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::FsResult;

/// Mode bits, laid out the way POSIX `st_mode` does.
pub mod mode {
    /// Mask of the file type bits.
    pub const S_IFMT: u32 = 0o170_000;
    /// Directory type bit.
    pub const S_IFDIR: u32 = 0o040_000;
    /// Regular file type bit.
    pub const S_IFREG: u32 = 0o100_000;
    pub const S_ISUID: u32 = 0o4000;
    pub const S_ISGID: u32 = 0o2000;
    pub const S_ISVTX: u32 = 0o1000;
    /// rwx for user, group and other.
    pub const PERM: u32 = 0o777;
    /// The bits `chmod` may change: permissions plus setuid, setgid and sticky.
    pub const CHMOD_BITS: u32 = PERM | S_ISUID | S_ISGID | S_ISVTX;
    /// Default permissions for `create`.
    pub const DEFAULT_FILE_PERM: u32 = 0o666;
    /// Default permissions for directories created implicitly.
    pub const DEFAULT_DIR_PERM: u32 = 0o777;
}

/// Kind of entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Directory,
}

/// Metadata for a file or directory, as returned by `stat` and directory listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Base name of the entry (not full path); `/` for the root.
    pub name: String,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Type and permission bits.
    pub mode: u32,
    /// Last modification time.
    pub modified: SystemTime,
}

impl Metadata {
    pub fn kind(&self) -> EntryKind {
        if self.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        }
    }

    pub fn is_dir(&self) -> bool {
        self.mode & mode::S_IFMT == mode::S_IFDIR
    }

    pub fn is_file(&self) -> bool {
        !self.is_dir()
    }

    /// Permission bits including setuid, setgid and sticky.
    pub fn permissions(&self) -> u32 {
        self.mode & mode::CHMOD_BITS
    }
}

/// How a file should be opened.
///
/// Works like `std::fs::OpenOptions`, but as a value that can be handed to any
/// backend:
///
/// ```
/// use stackfs::OpenFlags;
///
/// let flags = OpenFlags::write_only().create(true).append(true);
/// assert!(flags.has_write_intent());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenFlags {
    read: bool,
    write: bool,
    create: bool,
    excl: bool,
    append: bool,
    truncate: bool,
}

impl OpenFlags {
    pub fn read_only() -> Self {
        Self {
            read: true,
            ..Self::default()
        }
    }

    pub fn write_only() -> Self {
        Self {
            write: true,
            ..Self::default()
        }
    }

    pub fn read_write() -> Self {
        Self {
            read: true,
            write: true,
            ..Self::default()
        }
    }

    /// Create the file if it does not exist.
    pub fn create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    /// Together with `create`, fail if the file already exists.
    pub fn excl(mut self, excl: bool) -> Self {
        self.excl = excl;
        self
    }

    /// Position the handle at end of file after opening.
    pub fn append(mut self, append: bool) -> Self {
        self.append = append;
        self
    }

    /// Truncate to zero length, if the access mode allows writing.
    pub fn truncate(mut self, truncate: bool) -> Self {
        self.truncate = truncate;
        self
    }

    pub fn is_readable(&self) -> bool {
        self.read
    }

    pub fn is_writable(&self) -> bool {
        self.write
    }

    pub fn is_create(&self) -> bool {
        self.create
    }

    pub fn is_excl(&self) -> bool {
        self.excl
    }

    pub fn is_append(&self) -> bool {
        self.append
    }

    pub fn is_truncate(&self) -> bool {
        self.truncate
    }

    /// True if opening with these flags may modify the filesystem.
    pub fn has_write_intent(&self) -> bool {
        self.write || self.create || self.append || self.truncate
    }
}

/// An open file or directory.
///
/// Dropping the handle closes it.
pub trait File: Read + Write + Seek + Send + fmt::Debug {
    /// The path this handle was opened with, in canonical form.
    fn name(&self) -> &str;

    /// Metadata for the underlying entry.
    fn stat(&self) -> FsResult<Metadata>;

    /// Read the next batch of directory entries, in name order.
    ///
    /// `Some(n)` returns at most `n` entries; `None` returns everything left. An
    /// empty batch means the listing is exhausted.
    fn read_dir(&mut self, count: Option<usize>) -> FsResult<Vec<Metadata>>;

    /// Like [`read_dir`](File::read_dir), returning only names.
    fn read_dir_names(&mut self, count: Option<usize>) -> FsResult<Vec<String>> {
        Ok(self.read_dir(count)?.into_iter().map(|m| m.name).collect())
    }

    /// Read at an absolute offset without moving the cursor.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> FsResult<usize>;

    /// Write at an absolute offset without moving the cursor.
    fn write_at(&self, buf: &[u8], offset: u64) -> FsResult<usize>;

    /// Truncate or zero-extend the file to `size` bytes.
    fn set_len(&self, size: u64) -> FsResult<()>;

    /// Flush content to durable storage, where the backend has any.
    fn sync(&self) -> FsResult<()>;
}

/// Abstract filesystem interface.
///
/// Every backend honors the same contract, so code written against
/// `dyn Filesystem` behaves identically over memory, a real directory, an
/// archive or an overlay of two other filesystems.
pub trait Filesystem: Send + Sync + fmt::Debug {
    /// Short backend name, for logs.
    fn name(&self) -> &'static str;

    /// Create (or truncate) a file and open it read-write.
    ///
    /// Fails `ParentMissing` if the parent directory does not exist and
    /// `IsADirectory` if a directory is in the way.
    fn create(&self, path: &Path) -> FsResult<Box<dyn File>>;

    /// Create a single directory.
    fn mkdir(&self, path: &Path, perm: u32) -> FsResult<()>;

    /// Create a directory and all missing ancestors. Succeeds if it already exists.
    fn mkdir_all(&self, path: &Path, perm: u32) -> FsResult<()>;

    /// Open for reading.
    fn open(&self, path: &Path) -> FsResult<Box<dyn File>> {
        self.open_file(path, OpenFlags::read_only(), 0)
    }

    /// Open with explicit flags; `perm` applies only when the file is created.
    fn open_file(&self, path: &Path, flags: OpenFlags, perm: u32) -> FsResult<Box<dyn File>>;

    /// Remove a file or an empty directory.
    fn remove(&self, path: &Path) -> FsResult<()>;

    /// Remove a path and everything below it. Succeeds if nothing is there.
    fn remove_all(&self, path: &Path) -> FsResult<()>;

    /// Move a file or directory, replacing whatever is at the destination.
    fn rename(&self, from: &Path, to: &Path) -> FsResult<()>;

    /// Get metadata for a file or directory.
    fn stat(&self, path: &Path) -> FsResult<Metadata>;

    /// Change permission bits; type bits are preserved.
    fn chmod(&self, path: &Path, mode: u32) -> FsResult<()>;

    /// Change access and modification times.
    fn chtimes(&self, path: &Path, atime: SystemTime, mtime: SystemTime) -> FsResult<()>;
}

macro_rules! forward_filesystem {
    ($ty:ty) => {
        impl<T: Filesystem + ?Sized> Filesystem for $ty {
            fn name(&self) -> &'static str {
                (**self).name()
            }
            fn create(&self, path: &Path) -> FsResult<Box<dyn File>> {
                (**self).create(path)
            }
            fn mkdir(&self, path: &Path, perm: u32) -> FsResult<()> {
                (**self).mkdir(path, perm)
            }
            fn mkdir_all(&self, path: &Path, perm: u32) -> FsResult<()> {
                (**self).mkdir_all(path, perm)
            }
            fn open(&self, path: &Path) -> FsResult<Box<dyn File>> {
                (**self).open(path)
            }
            fn open_file(&self, path: &Path, flags: OpenFlags, perm: u32) -> FsResult<Box<dyn File>> {
                (**self).open_file(path, flags, perm)
            }
            fn remove(&self, path: &Path) -> FsResult<()> {
                (**self).remove(path)
            }
            fn remove_all(&self, path: &Path) -> FsResult<()> {
                (**self).remove_all(path)
            }
            fn rename(&self, from: &Path, to: &Path) -> FsResult<()> {
                (**self).rename(from, to)
            }
            fn stat(&self, path: &Path) -> FsResult<Metadata> {
                (**self).stat(path)
            }
            fn chmod(&self, path: &Path, mode: u32) -> FsResult<()> {
                (**self).chmod(path, mode)
            }
            fn chtimes(&self, path: &Path, atime: SystemTime, mtime: SystemTime) -> FsResult<()> {
                (**self).chtimes(path, atime, mtime)
            }
        }
    };
}

forward_filesystem!(Arc<T>);
forward_filesystem!(Box<T>);
