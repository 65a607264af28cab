//! Local filesystem backend.
//!
//! Provides access to a real directory tree. Virtual paths are normalized before
//! they touch the host, so `..` can never climb out of the root.

use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::{ErrorKind, FsError, FsResult};
use crate::path::{self, ROOT};
use crate::vfs::traits::{File, Filesystem, Metadata, OpenFlags, mode};

/// Local filesystem backend.
///
/// All operations are relative to `root`. For example, if `root` is
/// `/home/amy/project`, then `open("src/main.rs")` opens
/// `/home/amy/project/src/main.rs`.
///
/// Parent checks, rename overwrite and permission bits are handled here rather
/// than left to the host, so errors classify the same way `MemoryFs` does.
#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    /// Create a new local filesystem rooted at the given path.
    ///
    /// The path must exist and be a directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Get the root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a virtual path to its canonical form and the host path under the root.
    fn resolve(&self, path: &Path) -> (String, PathBuf) {
        let canonical = path::normalize(path);
        let full = self.host_path(&canonical);
        (canonical, full)
    }

    fn host_path(&self, canonical: &str) -> PathBuf {
        self.root.join(canonical.trim_start_matches('/'))
    }

    /// Host metadata, following symlinks; `None` if absent.
    fn probe(&self, op: &'static str, shown: &Path, full: &Path) -> FsResult<Option<fs::Metadata>> {
        match fs::metadata(full) {
            Ok(meta) => Ok(Some(meta)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            // "/file/child": the child cannot exist.
            Err(err) if err.kind() == io::ErrorKind::NotADirectory => Ok(None),
            Err(err) => Err(FsError::from_io(op, shown, err)),
        }
    }

    fn require_parent_dir(&self, op: &'static str, shown: &Path, canonical: &str) -> FsResult<()> {
        let parent = self.host_path(path::parent(canonical));
        match self.probe(op, shown, &parent)? {
            None => Err(FsError::new(ErrorKind::ParentMissing, op, shown)),
            Some(meta) if !meta.is_dir() => Err(FsError::new(ErrorKind::NotADirectory, op, shown)),
            Some(_) => Ok(()),
        }
    }

    /// Create a fresh empty file with exactly `perm` as its permission bits.
    fn create_new(&self, shown: &Path, full: &Path, perm: u32) -> FsResult<()> {
        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(perm & mode::PERM);
        }
        options.open(full).map_err(|err| FsError::from_io("open", shown, err))?;
        set_mode(full, perm).map_err(|err| FsError::from_io("open", shown, err))
    }

    fn open_dir(&self, canonical: String, full: PathBuf) -> Box<dyn File> {
        Box::new(LocalDir {
            path: canonical,
            full,
            cursor: None,
        })
    }
}

/// Convert host metadata into the contract's shape.
fn to_metadata(name: &str, meta: &fs::Metadata) -> Metadata {
    Metadata {
        name: name.to_string(),
        size: if meta.is_dir() { 0 } else { meta.len() },
        mode: host_mode(meta),
        modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
    }
}

#[cfg(unix)]
fn host_mode(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::MetadataExt;
    let kind = if meta.is_dir() { mode::S_IFDIR } else { mode::S_IFREG };
    kind | (meta.mode() & mode::CHMOD_BITS)
}

#[cfg(not(unix))]
fn host_mode(meta: &fs::Metadata) -> u32 {
    let perm = if meta.permissions().readonly() { 0o555 } else { 0o777 };
    if meta.is_dir() {
        mode::S_IFDIR | perm
    } else {
        mode::S_IFREG | (perm & 0o666)
    }
}

#[cfg(unix)]
fn set_mode(full: &Path, perm: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(full, fs::Permissions::from_mode(perm & mode::CHMOD_BITS))
}

#[cfg(not(unix))]
fn set_mode(full: &Path, perm: u32) -> io::Result<()> {
    let mut permissions = fs::metadata(full)?.permissions();
    permissions.set_readonly(perm & 0o200 == 0);
    fs::set_permissions(full, permissions)
}

impl Filesystem for LocalFs {
    fn name(&self) -> &'static str {
        "LocalFs"
    }

    fn create(&self, path: &Path) -> FsResult<Box<dyn File>> {
        self.open_file(
            path,
            OpenFlags::read_write().create(true).truncate(true),
            mode::DEFAULT_FILE_PERM,
        )
    }

    fn mkdir(&self, path: &Path, perm: u32) -> FsResult<()> {
        let (canonical, full) = self.resolve(path);
        if self.probe("mkdir", path, &full)?.is_some() {
            return Err(FsError::new(ErrorKind::AlreadyExists, "mkdir", path));
        }
        self.require_parent_dir("mkdir", path, &canonical)?;
        fs::create_dir(&full).map_err(|err| FsError::from_io("mkdir", path, err))?;
        set_mode(&full, perm).map_err(|err| FsError::from_io("mkdir", path, err))
    }

    fn mkdir_all(&self, path: &Path, perm: u32) -> FsResult<()> {
        let (canonical, _) = self.resolve(path);
        for dir in path::lineage(&canonical) {
            let full = self.host_path(dir);
            match self.probe("mkdir_all", Path::new(dir), &full)? {
                Some(meta) if meta.is_dir() => continue,
                Some(_) => return Err(FsError::new(ErrorKind::NotADirectory, "mkdir_all", dir)),
                None => {}
            }
            match fs::create_dir(&full) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(FsError::from_io("mkdir_all", dir, err)),
            }
            set_mode(&full, perm).map_err(|err| FsError::from_io("mkdir_all", dir, err))?;
        }
        Ok(())
    }

    fn open_file(&self, path: &Path, flags: OpenFlags, perm: u32) -> FsResult<Box<dyn File>> {
        let (canonical, full) = self.resolve(path);

        match self.probe("open", path, &full)? {
            Some(_) if flags.is_create() && flags.is_excl() => {
                return Err(FsError::new(ErrorKind::AlreadyExists, "open", path));
            }
            Some(meta) if meta.is_dir() => {
                if flags.has_write_intent() {
                    return Err(FsError::new(ErrorKind::IsADirectory, "open", path));
                }
                return Ok(self.open_dir(canonical, full));
            }
            Some(_) => {}
            None if flags.is_create() => {
                self.require_parent_dir("open", path, &canonical)?;
                self.create_new(path, &full, perm)?;
            }
            None => return Err(FsError::not_found("open", path)),
        }

        let writable = flags.is_writable();
        let file = fs::OpenOptions::new()
            .read(flags.is_readable())
            .write(writable)
            .append(writable && flags.is_append())
            .truncate(writable && flags.is_truncate())
            .open(&full)
            .map_err(|err| FsError::from_io("open", path, err))?;

        Ok(Box::new(LocalFile {
            path: canonical,
            file,
            readable: flags.is_readable(),
            writable,
        }))
    }

    fn remove(&self, path: &Path) -> FsResult<()> {
        let (canonical, full) = self.resolve(path);
        if canonical == ROOT {
            return Err(FsError::permission_denied("remove", path));
        }
        let result = match self.probe("remove", path, &full)? {
            None => return Err(FsError::not_found("remove", path)),
            Some(meta) if meta.is_dir() => fs::remove_dir(&full),
            Some(_) => fs::remove_file(&full),
        };
        result.map_err(|err| FsError::from_io("remove", path, err))
    }

    fn remove_all(&self, path: &Path) -> FsResult<()> {
        let (canonical, full) = self.resolve(path);
        if canonical == ROOT {
            // Empty the root but keep it.
            let entries = fs::read_dir(&full).map_err(|err| FsError::from_io("remove_all", path, err))?;
            for entry in entries {
                let entry = entry.map_err(|err| FsError::from_io("remove_all", path, err))?;
                self.remove_all(Path::new(&path::join(ROOT, &entry.file_name().to_string_lossy())))?;
            }
            return Ok(());
        }
        let result = match self.probe("remove_all", path, &full)? {
            None => return Ok(()),
            Some(meta) if meta.is_dir() => fs::remove_dir_all(&full),
            Some(_) => fs::remove_file(&full),
        };
        match result {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(FsError::from_io("remove_all", path, err)),
        }
    }

    fn rename(&self, from: &Path, to: &Path) -> FsResult<()> {
        let (old, old_full) = self.resolve(from);
        let (new, new_full) = self.resolve(to);
        if old == new {
            return Ok(());
        }
        if path::is_strict_descendant(&new, &old) {
            return Err(FsError::new(ErrorKind::InvalidArgument, "rename", to));
        }
        if self.probe("rename", from, &old_full)?.is_none() {
            return Err(FsError::not_found("rename", from));
        }
        match self.probe("rename", to, &self.host_path(path::parent(&new)))? {
            None => return Err(FsError::not_found("rename", to)),
            Some(meta) if !meta.is_dir() => {
                return Err(FsError::new(ErrorKind::NotADirectory, "rename", to));
            }
            Some(_) => {}
        }
        if path::is_strict_descendant(&old, &new) {
            return Err(FsError::new(ErrorKind::NotEmpty, "rename", to));
        }
        // The host refuses to replace a non-empty directory; the contract overwrites.
        self.remove_all(to)?;
        fs::rename(&old_full, &new_full).map_err(|err| FsError::from_io("rename", from, err))
    }

    fn stat(&self, path: &Path) -> FsResult<Metadata> {
        let (canonical, full) = self.resolve(path);
        let meta = fs::metadata(&full).map_err(|err| match err.kind() {
            io::ErrorKind::NotADirectory => FsError::not_found("stat", path),
            _ => FsError::from_io("stat", path, err),
        })?;
        Ok(to_metadata(path::base_name(&canonical), &meta))
    }

    fn chmod(&self, path: &Path, mode: u32) -> FsResult<()> {
        let (_, full) = self.resolve(path);
        if self.probe("chmod", path, &full)?.is_none() {
            return Err(FsError::not_found("chmod", path));
        }
        set_mode(&full, mode).map_err(|err| FsError::from_io("chmod", path, err))
    }

    fn chtimes(&self, path: &Path, atime: SystemTime, mtime: SystemTime) -> FsResult<()> {
        let (_, full) = self.resolve(path);
        if self.probe("chtimes", path, &full)?.is_none() {
            return Err(FsError::not_found("chtimes", path));
        }
        let times = fs::FileTimes::new().set_accessed(atime).set_modified(mtime);
        fs::File::open(&full)
            .and_then(|file| file.set_times(times))
            .map_err(|err| FsError::from_io("chtimes", path, err))
    }
}

/// An open host file.
#[derive(Debug)]
pub struct LocalFile {
    path: String,
    file: fs::File,
    readable: bool,
    writable: bool,
}

impl LocalFile {
    fn check_readable(&self) -> FsResult<()> {
        if !self.readable {
            return Err(FsError::permission_denied("read", &self.path));
        }
        Ok(())
    }

    fn check_writable(&self, op: &'static str) -> FsResult<()> {
        if !self.writable {
            return Err(FsError::permission_denied(op, &self.path));
        }
        Ok(())
    }
}

impl File for LocalFile {
    fn name(&self) -> &str {
        &self.path
    }

    fn stat(&self) -> FsResult<Metadata> {
        let meta = self
            .file
            .metadata()
            .map_err(|err| FsError::from_io("stat", &self.path, err))?;
        Ok(to_metadata(path::base_name(&self.path), &meta))
    }

    fn read_dir(&mut self, _count: Option<usize>) -> FsResult<Vec<Metadata>> {
        Err(FsError::new(ErrorKind::NotADirectory, "readdir", &self.path))
    }

    #[cfg(unix)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> FsResult<usize> {
        use std::os::unix::fs::FileExt;
        self.check_readable()?;
        self.file
            .read_at(buf, offset)
            .map_err(|err| FsError::from_io("read", &self.path, err))
    }

    #[cfg(windows)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> FsResult<usize> {
        use std::os::windows::fs::FileExt;
        self.check_readable()?;
        self.file
            .seek_read(buf, offset)
            .map_err(|err| FsError::from_io("read", &self.path, err))
    }

    #[cfg(unix)]
    fn write_at(&self, buf: &[u8], offset: u64) -> FsResult<usize> {
        use std::os::unix::fs::FileExt;
        self.check_writable("write")?;
        self.file
            .write_at(buf, offset)
            .map_err(|err| FsError::from_io("write", &self.path, err))
    }

    #[cfg(windows)]
    fn write_at(&self, buf: &[u8], offset: u64) -> FsResult<usize> {
        use std::os::windows::fs::FileExt;
        self.check_writable("write")?;
        self.file
            .seek_write(buf, offset)
            .map_err(|err| FsError::from_io("write", &self.path, err))
    }

    fn set_len(&self, size: u64) -> FsResult<()> {
        self.check_writable("truncate")?;
        self.file
            .set_len(size)
            .map_err(|err| FsError::from_io("truncate", &self.path, err))
    }

    fn sync(&self) -> FsResult<()> {
        self.file
            .sync_all()
            .map_err(|err| FsError::from_io("sync", &self.path, err))
    }
}

impl Read for LocalFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.check_readable()?;
        self.file.read(buf)
    }
}

impl Write for LocalFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check_writable("write")?;
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Seek for LocalFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

/// An open host directory. Listings are read fresh for every batch.
#[derive(Debug)]
pub struct LocalDir {
    path: String,
    full: PathBuf,
    cursor: Option<String>,
}

impl LocalDir {
    fn is_a_directory(&self, op: &'static str) -> FsError {
        FsError::new(ErrorKind::IsADirectory, op, &self.path)
    }
}

impl File for LocalDir {
    fn name(&self) -> &str {
        &self.path
    }

    fn stat(&self) -> FsResult<Metadata> {
        let meta = fs::metadata(&self.full).map_err(|err| FsError::from_io("stat", &self.path, err))?;
        Ok(to_metadata(path::base_name(&self.path), &meta))
    }

    fn read_dir(&mut self, count: Option<usize>) -> FsResult<Vec<Metadata>> {
        let entries = fs::read_dir(&self.full).map_err(|err| FsError::from_io("readdir", &self.path, err))?;
        let mut listing = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| FsError::from_io("readdir", &self.path, err))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if self.cursor.as_deref().is_some_and(|last| name.as_str() <= last) {
                continue;
            }
            // Follows symlinks, like stat.
            match fs::metadata(entry.path()) {
                Ok(meta) => listing.push(to_metadata(&name, &meta)),
                // Removed between listing and stat.
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(FsError::from_io("readdir", &self.path, err)),
            }
        }
        listing.sort_by(|a, b| a.name.cmp(&b.name));
        if let Some(n) = count {
            listing.truncate(n);
        }
        if let Some(last) = listing.last() {
            self.cursor = Some(last.name.clone());
        }
        Ok(listing)
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

impl Read for LocalDir {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(self.is_a_directory("read").into())
    }
}

impl Write for LocalDir {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(self.is_a_directory("write").into())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for LocalDir {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(self.is_a_directory("seek").into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::{read_file, write_file};
    use std::time::Duration;
    use tempfile::TempDir;

    fn make_fs() -> (TempDir, LocalFs) {
        let dir = TempDir::new().unwrap();
        let fs = LocalFs::new(dir.path());
        (dir, fs)
    }

    #[test]
    fn test_write_lands_under_root() {
        let (dir, fs) = make_fs();
        write_file(&fs, Path::new("/hello.txt"), b"hi", 0o644).unwrap();
        assert_eq!(std::fs::read(dir.path().join("hello.txt")).unwrap(), b"hi");
        assert_eq!(read_file(&fs, Path::new("hello.txt")).unwrap(), b"hi");
    }

    #[test]
    fn test_dotdot_cannot_escape_root() {
        let (dir, fs) = make_fs();
        write_file(&fs, Path::new("/../../escape.txt"), b"x", 0o644).unwrap();
        assert!(dir.path().join("escape.txt").exists());
    }

    #[test]
    fn test_create_missing_parent() {
        let (_dir, fs) = make_fs();
        let err = fs.create(Path::new("foo/bar")).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::ParentMissing);
        assert_eq!(err.path(), Path::new("foo/bar"));
    }

    #[test]
    fn test_stat_reports_kind_and_size() {
        let (_dir, fs) = make_fs();
        fs.mkdir(Path::new("/d"), 0o755).unwrap();
        write_file(&fs, Path::new("/d/f"), b"12345", 0o644).unwrap();

        let dir = fs.stat(Path::new("/d")).unwrap();
        assert!(dir.is_dir());
        assert_eq!(dir.size, 0);
        let file = fs.stat(Path::new("/d/f")).unwrap();
        assert!(file.is_file());
        assert_eq!(file.size, 5);
        assert_eq!(file.name, "f");
        assert_eq!(fs.stat(Path::new("/d/f/x")).unwrap_err().kind(), &ErrorKind::NotFound);
    }

    #[cfg(unix)]
    #[test]
    fn test_modes_are_exact() {
        let (_dir, fs) = make_fs();
        fs.mkdir(Path::new("/d"), 0o750).unwrap();
        assert_eq!(fs.stat(Path::new("/d")).unwrap().permissions(), 0o750);

        fs.open_file(Path::new("/f"), OpenFlags::write_only().create(true), 0o640)
            .unwrap();
        assert_eq!(fs.stat(Path::new("/f")).unwrap().permissions(), 0o640);

        fs.chmod(Path::new("/f"), mode::S_IFDIR | 0o600).unwrap();
        let meta = fs.stat(Path::new("/f")).unwrap();
        assert!(meta.is_file());
        assert_eq!(meta.permissions(), 0o600);
    }

    #[test]
    fn test_rename_overwrites_directory() {
        let (_dir, fs) = make_fs();
        write_file(&fs, Path::new("/src"), b"new", 0o644).unwrap();
        fs.mkdir_all(Path::new("/dst/inner"), 0o755).unwrap();
        fs.rename(Path::new("/src"), Path::new("/dst")).unwrap();
        assert_eq!(read_file(&fs, Path::new("/dst")).unwrap(), b"new");

        fs.mkdir(Path::new("/a"), 0o755).unwrap();
        let err = fs.rename(Path::new("/a"), Path::new("/a/b")).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_remove_all_root_keeps_root() {
        let (dir, fs) = make_fs();
        fs.mkdir_all(Path::new("/a/b"), 0o755).unwrap();
        write_file(&fs, Path::new("/f"), b"", 0o644).unwrap();
        fs.remove_all(Path::new("/")).unwrap();
        assert!(dir.path().is_dir());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_chtimes_sets_mtime() {
        let (_dir, fs) = make_fs();
        write_file(&fs, Path::new("/f"), b"", 0o644).unwrap();
        let when = SystemTime::UNIX_EPOCH + Duration::from_secs(1_234_567);
        fs.chtimes(Path::new("/f"), when, when).unwrap();
        assert_eq!(fs.stat(Path::new("/f")).unwrap().modified, when);
    }

    #[test]
    fn test_dir_listing_batches() {
        let (_dir, fs) = make_fs();
        for name in ["c", "a", "b"] {
            write_file(&fs, &Path::new("/").join(name), b"", 0o644).unwrap();
        }
        let mut dir = fs.open(Path::new("/")).unwrap();
        assert_eq!(dir.read_dir_names(Some(2)).unwrap(), vec!["a", "b"]);
        assert_eq!(dir.read_dir_names(None).unwrap(), vec!["c"]);
        assert!(dir.read_dir(None).unwrap().is_empty());
    }

    #[test]
    fn test_read_only_handle_refuses_write() {
        let (_dir, fs) = make_fs();
        write_file(&fs, Path::new("/f"), b"data", 0o644).unwrap();
        let mut f = fs.open(Path::new("/f")).unwrap();
        let err = f.write(b"x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }
}
