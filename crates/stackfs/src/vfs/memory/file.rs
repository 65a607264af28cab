//! Open handles on [`MemoryFs`](super::MemoryFs) entries.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::RwLock;

use super::table::{SharedInode, Table};
use crate::error::{ErrorKind, FsError, FsResult};
use crate::path;
use crate::vfs::traits::{File, Metadata};

/// A handle on a file or directory in a [`MemoryFs`](super::MemoryFs).
///
/// The handle shares the entry's content with the table and with every other
/// handle, so writes and truncations are visible everywhere immediately. Handles
/// opened read-only share the content too but refuse to mutate it.
#[derive(Debug)]
pub struct MemFile {
    path: String,
    inode: SharedInode,
    table: Arc<RwLock<Table>>,
    is_dir: bool,
    readable: bool,
    writable: bool,
    append: bool,
    offset: u64,
    /// Last name returned by `read_dir`.
    dir_cursor: Option<String>,
}

impl MemFile {
    pub(crate) fn new(
        path: String,
        inode: SharedInode,
        table: Arc<RwLock<Table>>,
        readable: bool,
        writable: bool,
    ) -> Self {
        let is_dir = inode.read().is_dir();
        Self {
            path,
            inode,
            table,
            is_dir,
            readable,
            writable,
            append: false,
            offset: 0,
            dir_cursor: None,
        }
    }

    /// Position at end of file and keep writing there.
    pub(crate) fn set_append(&mut self) {
        self.append = true;
        self.offset = self.inode.read().data.len() as u64;
    }

    fn check_file(&self, op: &'static str) -> FsResult<()> {
        if self.is_dir {
            return Err(FsError::new(ErrorKind::IsADirectory, op, &self.path));
        }
        Ok(())
    }

    fn check_writable(&self, op: &'static str) -> FsResult<()> {
        self.check_file(op)?;
        if !self.writable {
            return Err(FsError::permission_denied(op, &self.path));
        }
        Ok(())
    }

    /// Write `buf` at `at`, or at end of file when `at` is `None`. Returns the end offset.
    fn write_bytes(&self, buf: &[u8], at: Option<u64>) -> FsResult<u64> {
        self.check_writable("write")?;
        let mut inode = self.inode.write();
        let start = match at {
            Some(at) => usize::try_from(at)
                .map_err(|_| FsError::new(ErrorKind::InvalidArgument, "write", &self.path))?,
            None => inode.data.len(),
        };
        let end = start
            .checked_add(buf.len())
            .ok_or_else(|| FsError::new(ErrorKind::InvalidArgument, "write", &self.path))?;
        if inode.data.len() < end {
            inode.data.resize(end, 0);
        }
        inode.data[start..end].copy_from_slice(buf);
        inode.modified = SystemTime::now();
        Ok(end as u64)
    }
}

impl File for MemFile {
    fn name(&self) -> &str {
        &self.path
    }

    fn stat(&self) -> FsResult<Metadata> {
        Ok(self.inode.read().metadata(path::base_name(&self.path)))
    }

    fn read_dir(&mut self, count: Option<usize>) -> FsResult<Vec<Metadata>> {
        if !self.is_dir {
            return Err(FsError::new(ErrorKind::NotADirectory, "readdir", &self.path));
        }
        let batch = self
            .table
            .read()
            .list(&self.path, self.dir_cursor.as_deref(), count)
            .ok_or_else(|| FsError::not_found("readdir", &self.path))?;
        if let Some(last) = batch.last() {
            self.dir_cursor = Some(last.name.clone());
        }
        Ok(batch)
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> FsResult<usize> {
        self.check_file("read")?;
        if !self.readable {
            return Err(FsError::permission_denied("read", &self.path));
        }
        let inode = self.inode.read();
        let Ok(start) = usize::try_from(offset) else {
            return Ok(0);
        };
        if start >= inode.data.len() {
            return Ok(0);
        }
        let n = buf.len().min(inode.data.len() - start);
        buf[..n].copy_from_slice(&inode.data[start..start + n]);
        Ok(n)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> FsResult<usize> {
        self.write_bytes(buf, Some(offset))?;
        Ok(buf.len())
    }

    fn set_len(&self, size: u64) -> FsResult<()> {
        self.check_writable("truncate")?;
        let size = usize::try_from(size)
            .map_err(|_| FsError::new(ErrorKind::InvalidArgument, "truncate", &self.path))?;
        let mut inode = self.inode.write();
        inode.data.resize(size, 0);
        inode.modified = SystemTime::now();
        Ok(())
    }

    fn sync(&self) -> FsResult<()> {
        Ok(())
    }
}

impl Read for MemFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.read_at(buf, self.offset)?;
        self.offset += n as u64;
        Ok(n)
    }
}

impl Write for MemFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let at = if self.append { None } else { Some(self.offset) };
        self.offset = self.write_bytes(buf, at)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for MemFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let (base, delta) = match pos {
            SeekFrom::Start(n) => (0, n as i128),
            SeekFrom::End(d) => (self.inode.read().data.len() as i128, d as i128),
            SeekFrom::Current(d) => (self.offset as i128, d as i128),
        };
        let target = base + delta;
        if target < 0 || target > u64::MAX as i128 {
            return Err(FsError::new(ErrorKind::InvalidArgument, "seek", &self.path).into());
        }
        self.offset = target as u64;
        Ok(self.offset)
    }
}
