//! ArchiveFs: read-only view of a zip archive.
//!
//! The central directory is parsed once, at construction, into the same
//! path→entry and directory→child-names shape `MemoryFs` uses. Parent
//! directories the archive only implies (`a/b/c.txt` with no `a/` entry) are
//! synthesized. Content is decompressed on open.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use zip::{DateTime, ZipArchive};
use zip::result::ZipError;

use crate::error::{ErrorKind, FsError, FsResult};
use crate::path::{self, ROOT};
use crate::vfs::traits::{File, Filesystem, Metadata, OpenFlags, mode};

/// Errors building an [`ArchiveFs`].
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("cannot open archive {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid zip archive: {0}")]
    Zip(#[from] ZipError),
}

/// Anything a zip archive can be read from.
pub trait ArchiveSource: Read + Seek + Send + fmt::Debug {}

impl<T: Read + Seek + Send + fmt::Debug> ArchiveSource for T {}

#[derive(Debug)]
struct ArchiveEntry {
    /// Position in the archive; `None` for synthesized directories.
    index: Option<usize>,
    size: u64,
    mode: u32,
    modified: SystemTime,
    /// Names of direct children; `Some` exactly for directories.
    children: Option<BTreeSet<String>>,
}

impl ArchiveEntry {
    fn dir(index: Option<usize>, perm: u32, modified: SystemTime) -> Self {
        Self {
            index,
            size: 0,
            mode: mode::S_IFDIR | perm,
            modified,
            children: Some(BTreeSet::new()),
        }
    }

    fn metadata(&self, name: &str) -> Metadata {
        Metadata {
            name: name.to_string(),
            size: self.size,
            mode: self.mode,
            modified: self.modified,
        }
    }
}

/// A read-only filesystem over the contents of a zip archive.
///
/// Every mutating call fails `PermissionDenied`.
#[derive(Debug)]
pub struct ArchiveFs {
    archive: Mutex<ZipArchive<Box<dyn ArchiveSource>>>,
    entries: HashMap<String, ArchiveEntry>,
}

impl ArchiveFs {
    /// Open a zip file on the host.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ArchiveError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|source| ArchiveError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(io::BufReader::new(file))
    }

    /// Read an archive from any seekable source.
    pub fn from_reader<R: ArchiveSource + 'static>(reader: R) -> Result<Self, ArchiveError> {
        let source: Box<dyn ArchiveSource> = Box::new(reader);
        let mut archive = ZipArchive::new(source)?;

        let mut entries = HashMap::new();
        entries.insert(ROOT.to_string(), ArchiveEntry::dir(None, 0o755, SystemTime::UNIX_EPOCH));

        for index in 0..archive.len() {
            let file = archive.by_index_raw(index)?;
            let canonical = path::normalize(Path::new(file.name()));
            if canonical == ROOT {
                continue;
            }
            let unix_mode = file.unix_mode();
            let modified = file.last_modified().map_or(SystemTime::UNIX_EPOCH, to_system_time);
            let entry = if file.is_dir() {
                let perm = unix_mode.map_or(0o755, |m| m & mode::CHMOD_BITS);
                ArchiveEntry::dir(Some(index), perm, modified)
            } else {
                let perm = unix_mode.map_or(0o644, |m| m & mode::CHMOD_BITS);
                ArchiveEntry {
                    index: Some(index),
                    size: file.size(),
                    mode: mode::S_IFREG | perm,
                    modified,
                    children: None,
                }
            };
            drop(file);
            insert_entry(&mut entries, canonical, entry);
        }

        tracing::debug!(entries = entries.len(), "built archive index");
        Ok(Self {
            archive: Mutex::new(archive),
            entries,
        })
    }

    fn entry(&self, op: &'static str, path: &Path) -> FsResult<(String, &ArchiveEntry)> {
        let canonical = path::normalize(path);
        match self.entries.get(&canonical) {
            Some(entry) => Ok((canonical, entry)),
            None => Err(FsError::not_found(op, path)),
        }
    }

    fn read_content(&self, canonical: &str, index: usize) -> FsResult<Vec<u8>> {
        let mut archive = self.archive.lock();
        let mut file = archive
            .by_index(index)
            .map_err(|err| FsError::new(ErrorKind::Io(err.to_string()), "open", canonical))?;
        let mut data = Vec::with_capacity(usize::try_from(file.size()).unwrap_or(0));
        file.read_to_end(&mut data)
            .map_err(|err| FsError::from_io("open", canonical, err))?;
        Ok(data)
    }

    fn list(&self, dir: &str) -> Vec<Metadata> {
        let Some(children) = self.entries.get(dir).and_then(|e| e.children.as_ref()) else {
            return Vec::new();
        };
        children
            .iter()
            .filter_map(|name| {
                self.entries
                    .get(&path::join(dir, name))
                    .map(|entry| entry.metadata(name))
            })
            .collect()
    }
}

/// Insert an entry, synthesizing missing parent directories. Returns false if
/// the entry was skipped.
///
/// An explicit directory entry that arrives after its implied twin replaces the
/// synthesized one but keeps the children already registered. Members below a
/// file, and files named like an existing directory, are skipped so every
/// entry stays reachable from the root.
fn insert_entry(entries: &mut HashMap<String, ArchiveEntry>, canonical: String, mut entry: ArchiveEntry) -> bool {
    let parent = path::parent(&canonical).to_string();
    if !entries.contains_key(&parent)
        && !insert_entry(entries, parent.clone(), ArchiveEntry::dir(None, 0o755, SystemTime::UNIX_EPOCH))
    {
        return false;
    }
    if entries.get(&parent).is_some_and(|p| p.children.is_none()) {
        tracing::warn!(path = %canonical, parent = %parent, "skipping archive member below a file");
        return false;
    }
    if let Some(existing) = entries.get_mut(&canonical) {
        match (existing.children.take(), entry.children.as_mut()) {
            (Some(kept), Some(children)) => children.extend(kept),
            (Some(kept), None) => {
                existing.children = Some(kept);
                tracing::warn!(path = %canonical, "skipping archive file that shadows a directory");
                return false;
            }
            (None, _) => {}
        }
    }
    if let Some(children) = entries.get_mut(&parent).and_then(|p| p.children.as_mut()) {
        children.insert(path::base_name(&canonical).to_string());
    }
    entries.insert(canonical, entry);
    true
}

/// Zip header times carry no zone; read them as UTC.
fn to_system_time(dt: DateTime) -> SystemTime {
    let days = days_from_civil(i64::from(dt.year()), i64::from(dt.month()), i64::from(dt.day()));
    let secs = days * 86_400 + i64::from(dt.hour()) * 3_600 + i64::from(dt.minute()) * 60 + i64::from(dt.second());
    u64::try_from(secs).map_or(SystemTime::UNIX_EPOCH, |secs| SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
}

/// Days since 1970-01-01 in the proleptic Gregorian calendar.
fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
    let year = if month <= 2 { year - 1 } else { year };
    let era = year.div_euclid(400);
    let yoe = year - era * 400;
    let mp = (month + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

impl Filesystem for ArchiveFs {
    fn name(&self) -> &'static str {
        "ArchiveFs"
    }

    fn create(&self, path: &Path) -> FsResult<Box<dyn File>> {
        Err(FsError::permission_denied("open", path))
    }

    fn mkdir(&self, path: &Path, _perm: u32) -> FsResult<()> {
        Err(FsError::permission_denied("mkdir", path))
    }

    fn mkdir_all(&self, path: &Path, _perm: u32) -> FsResult<()> {
        Err(FsError::permission_denied("mkdir_all", path))
    }

    fn open_file(&self, path: &Path, flags: OpenFlags, _perm: u32) -> FsResult<Box<dyn File>> {
        if flags.has_write_intent() {
            return Err(FsError::permission_denied("open", path));
        }
        let (canonical, entry) = self.entry("open", path)?;
        let meta = entry.metadata(path::base_name(&canonical));
        match (entry.children.is_some(), entry.index) {
            (true, _) => {
                let listing = self.list(&canonical);
                Ok(Box::new(ArchiveDir {
                    path: canonical,
                    meta,
                    listing,
                    cursor: None,
                }))
            }
            (false, Some(index)) => {
                let data = self.read_content(&canonical, index)?;
                Ok(Box::new(ArchiveFile {
                    path: canonical,
                    meta,
                    content: Cursor::new(data),
                }))
            }
            (false, None) => Err(FsError::not_found("open", path)),
        }
    }

    fn remove(&self, path: &Path) -> FsResult<()> {
        Err(FsError::permission_denied("remove", path))
    }

    fn remove_all(&self, path: &Path) -> FsResult<()> {
        Err(FsError::permission_denied("remove_all", path))
    }

    fn rename(&self, from: &Path, _to: &Path) -> FsResult<()> {
        Err(FsError::permission_denied("rename", from))
    }

    fn stat(&self, path: &Path) -> FsResult<Metadata> {
        let (canonical, entry) = self.entry("stat", path)?;
        Ok(entry.metadata(path::base_name(&canonical)))
    }

    fn chmod(&self, path: &Path, _mode: u32) -> FsResult<()> {
        Err(FsError::permission_denied("chmod", path))
    }

    fn chtimes(&self, path: &Path, _atime: SystemTime, _mtime: SystemTime) -> FsResult<()> {
        Err(FsError::permission_denied("chtimes", path))
    }
}

/// A decompressed archive member.
#[derive(Debug)]
struct ArchiveFile {
    path: String,
    meta: Metadata,
    content: Cursor<Vec<u8>>,
}

impl File for ArchiveFile {
    fn name(&self) -> &str {
        &self.path
    }

    fn stat(&self) -> FsResult<Metadata> {
        Ok(self.meta.clone())
    }

    fn read_dir(&mut self, _count: Option<usize>) -> FsResult<Vec<Metadata>> {
        Err(FsError::new(ErrorKind::NotADirectory, "readdir", &self.path))
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> FsResult<usize> {
        let data = self.content.get_ref();
        let Ok(start) = usize::try_from(offset) else {
            return Ok(0);
        };
        if start >= data.len() {
            return Ok(0);
        }
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }

    fn write_at(&self, _buf: &[u8], _offset: u64) -> FsResult<usize> {
        Err(FsError::permission_denied("write", &self.path))
    }

    fn set_len(&self, _size: u64) -> FsResult<()> {
        Err(FsError::permission_denied("truncate", &self.path))
    }

    fn sync(&self) -> FsResult<()> {
        Ok(())
    }
}

impl Read for ArchiveFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.content.read(buf)
    }
}

impl Write for ArchiveFile {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(FsError::permission_denied("write", &self.path).into())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for ArchiveFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.content.seek(pos)
    }
}

/// A directory in the archive. The index never changes, so the listing is
/// captured at open.
#[derive(Debug)]
struct ArchiveDir {
    path: String,
    meta: Metadata,
    listing: Vec<Metadata>,
    cursor: Option<String>,
}

impl ArchiveDir {
    fn is_a_directory(&self, op: &'static str) -> FsError {
        FsError::new(ErrorKind::IsADirectory, op, &self.path)
    }
}

impl File for ArchiveDir {
    fn name(&self) -> &str {
        &self.path
    }

    fn stat(&self) -> FsResult<Metadata> {
        Ok(self.meta.clone())
    }

    fn read_dir(&mut self, count: Option<usize>) -> FsResult<Vec<Metadata>> {
        let start = match self.cursor.as_deref() {
            Some(last) => self.listing.partition_point(|m| m.name.as_str() <= last),
            None => 0,
        };
        let rest = &self.listing[start..];
        let end = count.map_or(rest.len(), |n| n.min(rest.len()));
        let batch = rest[..end].to_vec();
        if let Some(last) = batch.last() {
            self.cursor = Some(last.name.clone());
        }
        Ok(batch)
    }

    fn read_at(&self, _buf: &mut [u8], _offset: u64) -> FsResult<usize> {
        Err(self.is_a_directory("read"))
    }

    fn write_at(&self, _buf: &[u8], _offset: u64) -> FsResult<usize> {
        Err(self.is_a_directory("write"))
    }

    fn set_len(&self, _size: u64) -> FsResult<()> {
        Err(self.is_a_directory("truncate"))
    }

    fn sync(&self) -> FsResult<()> {
        Ok(())
    }
}

impl Read for ArchiveDir {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(self.is_a_directory("read").into())
    }
}

impl Write for ArchiveDir {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(self.is_a_directory("write").into())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for ArchiveDir {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(self.is_a_directory("seek").into())
    }
}
