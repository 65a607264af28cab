//! ReadOnlyFs: presents any filesystem without write access.

use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use crate::error::{FsError, FsResult};
use crate::vfs::traits::{File, Filesystem, Metadata, OpenFlags};

/// Wraps a filesystem and refuses every mutation with `PermissionDenied`.
///
/// Reads, stats and read-only opens go straight to the inner filesystem. The
/// refusal does not depend on the arguments: removing a path that does not
/// exist is denied just like removing one that does.
#[derive(Debug, Clone)]
pub struct ReadOnlyFs {
    inner: Arc<dyn Filesystem>,
}

impl ReadOnlyFs {
    pub fn new(inner: Arc<dyn Filesystem>) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &Arc<dyn Filesystem> {
        &self.inner
    }
}

impl Filesystem for ReadOnlyFs {
    fn name(&self) -> &'static str {
        "ReadOnlyFs"
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

    fn open_file(&self, path: &Path, flags: OpenFlags, perm: u32) -> FsResult<Box<dyn File>> {
        if flags.has_write_intent() {
            return Err(FsError::permission_denied("open", path));
        }
        self.inner.open_file(path, flags, perm)
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
        self.inner.stat(path)
    }

    fn chmod(&self, path: &Path, _mode: u32) -> FsResult<()> {
        Err(FsError::permission_denied("chmod", path))
    }

    fn chtimes(&self, path: &Path, _atime: SystemTime, _mtime: SystemTime) -> FsResult<()> {
        Err(FsError::permission_denied("chtimes", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::helpers::{read_file, write_file};
    use crate::vfs::MemoryFs;
    use std::io::Write;

    fn make_fs() -> ReadOnlyFs {
        let inner = MemoryFs::new();
        write_file(&inner, Path::new("/data.txt"), b"payload", 0o644).unwrap();
        ReadOnlyFs::new(Arc::new(inner))
    }

    #[test]
    fn test_reads_pass_through() {
        let fs = make_fs();
        assert_eq!(read_file(&fs, Path::new("/data.txt")).unwrap(), b"payload");
        assert_eq!(fs.stat(Path::new("/data.txt")).unwrap().size, 7);
        assert_eq!(fs.stat(Path::new("/nope")).unwrap_err().kind(), &ErrorKind::NotFound);
    }

    #[test]
    fn test_every_mutation_is_denied() {
        let fs = make_fs();
        let now = SystemTime::now();
        let path = Path::new("/data.txt");
        let missing = Path::new("/missing/too");

        for target in [path, missing] {
            let results = [
                fs.create(target).map(|_| ()),
                fs.mkdir(target, 0o755),
                fs.mkdir_all(target, 0o755),
                fs.open_file(target, OpenFlags::write_only(), 0).map(|_| ()),
                fs.open_file(target, OpenFlags::read_only().create(true), 0o644).map(|_| ()),
                fs.remove(target),
                fs.remove_all(target),
                fs.rename(target, Path::new("/elsewhere")),
                fs.chmod(target, 0o600),
                fs.chtimes(target, now, now),
            ];
            for result in results {
                assert_eq!(result.unwrap_err().kind(), &ErrorKind::PermissionDenied);
            }
        }
        assert_eq!(read_file(&fs, path).unwrap(), b"payload");
    }

    #[test]
    fn test_read_only_handle_cannot_write() {
        let fs = make_fs();
        let mut f = fs.open(Path::new("/data.txt")).unwrap();
        assert!(f.write_all(b"sneaky").is_err());
    }
}
