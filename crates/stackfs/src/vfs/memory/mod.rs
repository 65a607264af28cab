//! In-memory filesystem implementation.
//!
//! Used for tests and as the writable layer of an overlay. All data is
//! ephemeral.
//!
//! The whole tree lives in one entry table behind a single `RwLock`. Lookups
//! take the shared lock; every mutation takes the exclusive lock for its whole
//! duration, recursive renames and removals included, so no caller ever sees a
//! half-moved subtree. File content sits behind a per-entry lock so open handles
//! can read and write without touching the table.

mod file;
mod table;

use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::RwLock;

pub use file::MemFile;
use table::Table;

use crate::error::{ErrorKind, FsError, FsResult};
use crate::path::{self, ROOT};
use crate::vfs::traits::{File, Filesystem, Metadata, OpenFlags, mode};

/// In-memory filesystem.
///
/// Thread-safe via internal `RwLock`. Cloning yields another handle on the same
/// tree. All data is lost when the last clone is dropped.
///
/// ```
/// use std::io::{Read, Write};
/// use std::path::Path;
/// use stackfs::{Filesystem, MemoryFs};
///
/// let fs = MemoryFs::new();
/// fs.mkdir_all(Path::new("/a/b"), 0o755).unwrap();
///
/// let mut f = fs.create(Path::new("/a/b/hello.txt")).unwrap();
/// f.write_all(b"hello").unwrap();
///
/// let mut contents = String::new();
/// fs.open(Path::new("/a/b/hello.txt")).unwrap().read_to_string(&mut contents).unwrap();
/// assert_eq!(contents, "hello");
/// ```
#[derive(Debug, Clone)]
pub struct MemoryFs {
    table: Arc<RwLock<Table>>,
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFs {
    /// Create a new filesystem holding only the root directory (mode 0755).
    pub fn new() -> Self {
        Self::with_root_mode(0o755)
    }

    /// Create a new filesystem whose root has the given permission bits.
    pub fn with_root_mode(perm: u32) -> Self {
        Self {
            table: Arc::new(RwLock::new(Table::new(perm))),
        }
    }

    fn handle(&self, canonical: String, inode: table::SharedInode, readable: bool, writable: bool) -> MemFile {
        MemFile::new(canonical, inode, Arc::clone(&self.table), readable, writable)
    }

    /// Number of entries, the root included.
    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 1
    }
}

impl Filesystem for MemoryFs {
    fn name(&self) -> &'static str {
        "MemoryFs"
    }

    fn create(&self, path: &Path) -> FsResult<Box<dyn File>> {
        let canonical = path::normalize(path);
        let mut table = self.table.write();
        table.require_parent_dir("open", path, &canonical)?;

        let inode = match table.get(&canonical) {
            None => table.insert_file(&canonical, mode::DEFAULT_FILE_PERM),
            Some(entry) if entry.is_dir() => {
                return Err(FsError::new(ErrorKind::IsADirectory, "open", path));
            }
            Some(entry) => {
                // Truncate in place: other handles on this file see it too.
                let inode = Arc::clone(entry.inode());
                {
                    let mut content = inode.write();
                    content.data.clear();
                    content.modified = SystemTime::now();
                }
                inode
            }
        };
        drop(table);
        Ok(Box::new(self.handle(canonical, inode, true, true)))
    }

    fn mkdir(&self, path: &Path, perm: u32) -> FsResult<()> {
        let canonical = path::normalize(path);
        let mut table = self.table.write();
        if table.get(&canonical).is_some() {
            return Err(FsError::new(ErrorKind::AlreadyExists, "mkdir", path));
        }
        table.require_parent_dir("mkdir", path, &canonical)?;
        table.insert_dir(&canonical, perm);
        Ok(())
    }

    fn mkdir_all(&self, path: &Path, perm: u32) -> FsResult<()> {
        let canonical = path::normalize(path);
        let mut table = self.table.write();

        // Walk up from the target collecting what is missing, stopping at the
        // first directory that already exists.
        let mut missing = Vec::new();
        let mut current = canonical.as_str();
        while current != ROOT {
            match table.get(current) {
                None => missing.push(current.to_string()),
                Some(entry) if entry.is_dir() => break,
                Some(_) => return Err(FsError::new(ErrorKind::NotADirectory, "mkdir_all", current)),
            }
            current = path::parent(current);
        }

        for dir in missing.iter().rev() {
            table.insert_dir(dir, perm);
        }
        Ok(())
    }

    fn open_file(&self, path: &Path, flags: OpenFlags, perm: u32) -> FsResult<Box<dyn File>> {
        let canonical = path::normalize(path);
        let mut table = self.table.write();

        let inode = match table.get(&canonical) {
            Some(_) if flags.is_create() && flags.is_excl() => {
                return Err(FsError::new(ErrorKind::AlreadyExists, "open", path));
            }
            Some(entry) => {
                if entry.is_dir() && flags.has_write_intent() {
                    return Err(FsError::new(ErrorKind::IsADirectory, "open", path));
                }
                Arc::clone(entry.inode())
            }
            None if flags.is_create() => {
                table.require_parent_dir("open", path, &canonical)?;
                table.insert_file(&canonical, perm)
            }
            None => return Err(FsError::not_found("open", path)),
        };
        drop(table);

        if flags.is_truncate() && flags.is_writable() {
            let mut content = inode.write();
            content.data.clear();
            content.modified = SystemTime::now();
        }

        let mut handle = self.handle(canonical, inode, flags.is_readable(), flags.is_writable());
        if flags.is_append() {
            handle.set_append();
        }
        Ok(Box::new(handle))
    }

    fn remove(&self, path: &Path) -> FsResult<()> {
        let canonical = path::normalize(path);
        if canonical == ROOT {
            return Err(FsError::permission_denied("remove", path));
        }
        let mut table = self.table.write();
        match table.get(&canonical) {
            None => Err(FsError::not_found("remove", path)),
            Some(entry) if entry.has_children() => Err(FsError::new(ErrorKind::NotEmpty, "remove", path)),
            Some(_) => {
                table.remove_entry(&canonical);
                Ok(())
            }
        }
    }

    fn remove_all(&self, path: &Path) -> FsResult<()> {
        let canonical = path::normalize(path);
        self.table.write().remove_all(&canonical);
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> FsResult<()> {
        let old = path::normalize(from);
        let new = path::normalize(to);
        if old == new {
            return Ok(());
        }
        if path::is_strict_descendant(&new, &old) {
            return Err(FsError::new(ErrorKind::InvalidArgument, "rename", to));
        }
        // The destination holds the source, so it cannot be replaced.
        if path::is_strict_descendant(&old, &new) {
            return Err(FsError::new(ErrorKind::NotEmpty, "rename", to));
        }

        let mut table = self.table.write();
        if table.get(&old).is_none() {
            return Err(FsError::not_found("rename", from));
        }
        match table.get(path::parent(&new)) {
            None => return Err(FsError::not_found("rename", to)),
            Some(parent) if !parent.is_dir() => {
                return Err(FsError::new(ErrorKind::NotADirectory, "rename", to));
            }
            Some(_) => {}
        }
        // Neither path lies inside the other, so clearing the destination cannot
        // touch the source.
        table.remove_all(&new);
        table.rename(&old, &new);
        Ok(())
    }

    fn stat(&self, path: &Path) -> FsResult<Metadata> {
        let canonical = path::normalize(path);
        self.table
            .read()
            .get(&canonical)
            .map(|entry| entry.metadata())
            .ok_or_else(|| FsError::not_found("stat", path))
    }

    fn chmod(&self, path: &Path, mode: u32) -> FsResult<()> {
        let canonical = path::normalize(path);
        let table = self.table.write();
        let entry = table
            .get(&canonical)
            .ok_or_else(|| FsError::not_found("chmod", path))?;
        let mut inode = entry.inode().write();
        inode.mode = (inode.mode & !mode::CHMOD_BITS) | (mode & mode::CHMOD_BITS);
        Ok(())
    }

    fn chtimes(&self, path: &Path, _atime: SystemTime, mtime: SystemTime) -> FsResult<()> {
        let canonical = path::normalize(path);
        let table = self.table.write();
        let entry = table
            .get(&canonical)
            .ok_or_else(|| FsError::not_found("chtimes", path))?;
        entry.inode().write().modified = mtime;
        Ok(())
    }
}
