//! Copy-on-write overlay of two filesystems.
//!
//! - Base: consulted for reads, never written through the overlay
//! - Layer: receives every new entry and every modification
//! - Result: merged view where the layer wins on name collisions
//!
//! The first mutation of a base-only entry copies it up into the layer, parent
//! directories first. The overlay holds no lock of its own; each backend locks
//! itself, and a copy-up racing another writer on the same path may copy twice.
//! Both layers stay well-formed either way.

use std::collections::BTreeMap;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::ops::Bound;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use crate::error::{ErrorKind, FsError, FsResult};
use crate::path;
use crate::vfs::traits::{File, Filesystem, Metadata, OpenFlags, mode};

/// Copy-on-write union of a read-only `base` and a writable `layer`.
///
/// ```
/// use std::path::Path;
/// use std::sync::Arc;
/// use stackfs::{Filesystem, MemoryFs, OverlayFs, ReadOnlyFs, helpers};
///
/// let base = Arc::new(MemoryFs::new());
/// helpers::write_file(&*base, Path::new("/motd"), b"hello", 0o644).unwrap();
///
/// let layer = Arc::new(MemoryFs::new());
/// let fs = OverlayFs::new(Arc::new(ReadOnlyFs::new(base.clone())), layer.clone());
/// helpers::write_file(&fs, Path::new("/motd"), b"changed", 0o644).unwrap();
///
/// assert_eq!(helpers::read_file(&*base, Path::new("/motd")).unwrap(), b"hello");
/// assert_eq!(helpers::read_file(&*layer, Path::new("/motd")).unwrap(), b"changed");
/// ```
#[derive(Debug, Clone)]
pub struct OverlayFs {
    base: Arc<dyn Filesystem>,
    layer: Arc<dyn Filesystem>,
}

/// Stat that treats "not there" as `None` rather than an error.
///
/// A path through a file (`/file/x`) is not there either.
fn lookup(fs: &dyn Filesystem, path: &Path) -> FsResult<Option<Metadata>> {
    match fs.stat(path) {
        Ok(meta) => Ok(Some(meta)),
        Err(err) if err.is_not_found() || err.kind() == &ErrorKind::NotADirectory => Ok(None),
        Err(err) => Err(err),
    }
}

impl OverlayFs {
    pub fn new(base: Arc<dyn Filesystem>, layer: Arc<dyn Filesystem>) -> Self {
        Self { base, layer }
    }

    pub fn base(&self) -> &Arc<dyn Filesystem> {
        &self.base
    }

    pub fn layer(&self) -> &Arc<dyn Filesystem> {
        &self.layer
    }

    /// True if `canonical` exists in the base and not in the layer.
    fn is_base_only(&self, canonical: &str) -> FsResult<bool> {
        let p = Path::new(canonical);
        if lookup(&*self.layer, p)?.is_some() {
            return Ok(false);
        }
        Ok(lookup(&*self.base, p)?.is_some())
    }

    /// Layer metadata if present, else base metadata.
    fn merged_lookup(&self, p: &Path) -> FsResult<Option<Metadata>> {
        match lookup(&*self.layer, p)? {
            Some(meta) => Ok(Some(meta)),
            None => lookup(&*self.base, p),
        }
    }

    /// Make sure every directory from the root down to `canonical` exists in
    /// the layer, copying modes and times from the base.
    fn materialize_dirs(&self, canonical: &str) -> FsResult<()> {
        for dir in path::lineage(canonical) {
            let p = Path::new(dir);
            match lookup(&*self.layer, p)? {
                Some(meta) if meta.is_dir() => continue,
                Some(_) => return Err(FsError::new(ErrorKind::NotADirectory, "mkdir", p)),
                None => {}
            }
            let meta = match lookup(&*self.base, p)? {
                Some(meta) if meta.is_dir() => meta,
                Some(_) => return Err(FsError::new(ErrorKind::NotADirectory, "mkdir", p)),
                None => return Err(FsError::not_found("mkdir", p)),
            };

            tracing::debug!(path = dir, mode = meta.permissions(), "materializing base directory");
            match self.layer.mkdir(p, meta.permissions()) {
                Ok(()) => {}
                Err(err) if err.kind() == &ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(err),
            }
            self.layer.chmod(p, meta.permissions())?;
            self.layer.chtimes(p, meta.modified, meta.modified)?;
        }
        Ok(())
    }

    /// Require `dir` to be a directory in the layer, materializing it from the
    /// base if only the base has it. Errors report `shown`.
    fn ensure_layer_dir(&self, op: &'static str, shown: &Path, dir: &str) -> FsResult<()> {
        let p = Path::new(dir);
        match lookup(&*self.layer, p)? {
            Some(meta) if meta.is_dir() => return Ok(()),
            Some(_) => return Err(FsError::new(ErrorKind::NotADirectory, op, shown)),
            None => {}
        }
        match lookup(&*self.base, p)? {
            Some(meta) if meta.is_dir() => self.materialize_dirs(dir),
            Some(_) => Err(FsError::new(ErrorKind::NotADirectory, op, shown)),
            None => Err(FsError::new(ErrorKind::ParentMissing, op, shown)),
        }
    }

    /// Copy a base-only entry into the layer.
    fn copy_up(&self, canonical: &str) -> FsResult<()> {
        let p = Path::new(canonical);
        let meta = self.base.stat(p)?;
        if meta.is_dir() {
            return self.materialize_dirs(canonical);
        }
        self.materialize_dirs(path::parent(canonical))?;

        tracing::debug!(path = canonical, size = meta.size, "copying base file up to layer");
        if let Err(err) = self.copy_file_up(p, &meta) {
            tracing::warn!(path = canonical, error = %err, "copy-up failed, removing partial layer file");
            if let Err(cleanup) = self.layer.remove_all(p) {
                tracing::warn!(path = canonical, error = %cleanup, "could not remove partial layer file");
            }
            return Err(err);
        }
        Ok(())
    }

    fn copy_file_up(&self, p: &Path, meta: &Metadata) -> FsResult<()> {
        let mut src = self.base.open(p)?;
        let flags = OpenFlags::write_only().create(true).truncate(true);
        let mut dst = self.layer.open_file(p, flags, meta.permissions())?;
        io::copy(&mut src, &mut dst).map_err(|err| FsError::from_io("copy_up", p, err))?;
        dst.sync()?;
        drop(dst);
        self.layer.chmod(p, meta.permissions())?;
        self.layer.chtimes(p, meta.modified, meta.modified)
    }
}

impl Filesystem for OverlayFs {
    fn name(&self) -> &'static str {
        "OverlayFs"
    }

    fn create(&self, path: &Path) -> FsResult<Box<dyn File>> {
        self.open_file(
            path,
            OpenFlags::read_write().create(true).truncate(true),
            mode::DEFAULT_FILE_PERM,
        )
    }

    fn mkdir(&self, path: &Path, perm: u32) -> FsResult<()> {
        // Existing in either layer counts, so the overlay answers like a plain
        // filesystem would. Nothing is materialized for a base-only directory.
        if self.merged_lookup(path)?.is_some() {
            return Err(FsError::new(ErrorKind::AlreadyExists, "mkdir", path));
        }
        let canonical = path::normalize(path);
        self.ensure_layer_dir("mkdir", path, path::parent(&canonical))?;
        self.layer.mkdir(path, perm)
    }

    fn mkdir_all(&self, path: &Path, perm: u32) -> FsResult<()> {
        let canonical = path::normalize(path);
        for dir in path::lineage(&canonical) {
            let p = Path::new(dir);
            match lookup(&*self.layer, p)? {
                Some(meta) if meta.is_dir() => continue,
                Some(_) => return Err(FsError::new(ErrorKind::NotADirectory, "mkdir_all", p)),
                None => {}
            }
            match lookup(&*self.base, p)? {
                Some(meta) if meta.is_dir() => {
                    // Already there in the merged view; the layer only needs it
                    // if something below has to be created.
                    if dir == canonical {
                        return Ok(());
                    }
                    self.materialize_dirs(dir)?;
                }
                Some(_) => return Err(FsError::new(ErrorKind::NotADirectory, "mkdir_all", p)),
                None => match self.layer.mkdir(p, perm) {
                    Ok(()) => {}
                    Err(err) if err.kind() == &ErrorKind::AlreadyExists => {}
                    Err(err) => return Err(err),
                },
            }
        }
        Ok(())
    }

    fn open_file(&self, path: &Path, flags: OpenFlags, perm: u32) -> FsResult<Box<dyn File>> {
        let canonical = path::normalize(path);

        if flags.has_write_intent() {
            // Settle every failure against the merged view before the layer changes.
            let in_layer = lookup(&*self.layer, path)?;
            let existing = match in_layer {
                Some(meta) => Some((meta, false)),
                None => lookup(&*self.base, path)?.map(|meta| (meta, true)),
            };
            match existing {
                Some(_) if flags.is_create() && flags.is_excl() => {
                    return Err(FsError::new(ErrorKind::AlreadyExists, "open", path));
                }
                Some((meta, _)) if meta.is_dir() => {
                    return Err(FsError::new(ErrorKind::IsADirectory, "open", path));
                }
                Some((_, true)) => self.copy_up(&canonical)?,
                Some((_, false)) => {}
                None if !flags.is_create() => return Err(FsError::not_found("open", path)),
                None => self.ensure_layer_dir("open", path, path::parent(&canonical))?,
            }
            return self.layer.open_file(path, flags, perm);
        }

        let in_layer = lookup(&*self.layer, path)?;
        let in_base = lookup(&*self.base, path)?;
        match (in_layer, in_base) {
            (Some(layer), Some(base)) if layer.is_dir() && base.is_dir() => Ok(Box::new(UnionDir {
                path: canonical,
                base: Arc::clone(&self.base),
                layer: Arc::clone(&self.layer),
                cursor: None,
            })),
            (Some(_), _) => self.layer.open_file(path, flags, perm),
            (None, Some(_)) => self.base.open_file(path, flags, perm),
            (None, None) => Err(FsError::not_found("open", path)),
        }
    }

    fn remove(&self, path: &Path) -> FsResult<()> {
        if lookup(&*self.layer, path)?.is_some() {
            return self.layer.remove(path);
        }
        if lookup(&*self.base, path)?.is_some() {
            return Err(FsError::permission_denied("remove", path));
        }
        Err(FsError::not_found("remove", path))
    }

    fn remove_all(&self, path: &Path) -> FsResult<()> {
        if lookup(&*self.layer, path)?.is_some() {
            return self.layer.remove_all(path);
        }
        if lookup(&*self.base, path)?.is_some() {
            return Err(FsError::permission_denied("remove_all", path));
        }
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
        if path::is_strict_descendant(&old, &new) {
            return Err(FsError::new(ErrorKind::NotEmpty, "rename", to));
        }

        if lookup(&*self.layer, from)?.is_none() {
            if lookup(&*self.base, from)?.is_some() {
                return Err(FsError::permission_denied("rename", from));
            }
            return Err(FsError::not_found("rename", from));
        }
        self.ensure_layer_dir("rename", to, path::parent(&new))
            .map_err(|err| match err.kind() {
                ErrorKind::ParentMissing => FsError::not_found("rename", to),
                _ => err,
            })?;
        self.layer.rename(from, to)
    }

    fn stat(&self, path: &Path) -> FsResult<Metadata> {
        self.merged_lookup(path)?
            .ok_or_else(|| FsError::not_found("stat", path))
    }

    fn chmod(&self, path: &Path, mode: u32) -> FsResult<()> {
        let canonical = path::normalize(path);
        if self.is_base_only(&canonical)? {
            self.copy_up(&canonical)?;
        }
        self.layer.chmod(path, mode)
    }

    fn chtimes(&self, path: &Path, atime: SystemTime, mtime: SystemTime) -> FsResult<()> {
        let canonical = path::normalize(path);
        if self.is_base_only(&canonical)? {
            self.copy_up(&canonical)?;
        }
        self.layer.chtimes(path, atime, mtime)
    }
}

/// Directory handle over a path that is a directory in both layers.
///
/// Each batch re-lists both layers and resumes after the last name returned, so
/// every merged name is reported exactly once even if the batches interleave
/// with changes underneath.
#[derive(Debug)]
struct UnionDir {
    path: String,
    base: Arc<dyn Filesystem>,
    layer: Arc<dyn Filesystem>,
    cursor: Option<String>,
}

impl UnionDir {
    fn merged(&self) -> FsResult<BTreeMap<String, Metadata>> {
        let mut merged = BTreeMap::new();
        let p = Path::new(&self.path);
        // Layer last, so its entries replace base entries of the same name.
        for fs in [&self.base, &self.layer] {
            let mut dir = match fs.open(p) {
                Ok(dir) => dir,
                Err(err) if err.is_not_found() => continue,
                Err(err) => return Err(err),
            };
            match dir.read_dir(None) {
                Ok(entries) => merged.extend(entries.into_iter().map(|m| (m.name.clone(), m))),
                // Replaced by a file since open: the other layer still lists.
                Err(err) if err.kind() == &ErrorKind::NotADirectory || err.is_not_found() => {}
                Err(err) => return Err(err),
            }
        }
        Ok(merged)
    }

    fn not_a_file(&self, op: &'static str) -> FsError {
        FsError::new(ErrorKind::IsADirectory, op, &self.path)
    }
}

impl File for UnionDir {
    fn name(&self) -> &str {
        &self.path
    }

    fn stat(&self) -> FsResult<Metadata> {
        let p = Path::new(&self.path);
        match lookup(&*self.layer, p)? {
            Some(meta) => Ok(meta),
            None => self.base.stat(p),
        }
    }

    fn read_dir(&mut self, count: Option<usize>) -> FsResult<Vec<Metadata>> {
        let merged = self.merged()?;
        let lower = match self.cursor.as_deref() {
            Some(name) => Bound::Excluded(name),
            None => Bound::Unbounded,
        };
        let rest = merged.range::<str, _>((lower, Bound::Unbounded)).map(|(_, m)| m.clone());
        let batch: Vec<Metadata> = match count {
            Some(n) => rest.take(n).collect(),
            None => rest.collect(),
        };
        if let Some(last) = batch.last() {
            self.cursor = Some(last.name.clone());
        }
        Ok(batch)
    }

    fn read_at(&self, _buf: &mut [u8], _offset: u64) -> FsResult<usize> {
        Err(self.not_a_file("read"))
    }

    fn write_at(&self, _buf: &[u8], _offset: u64) -> FsResult<usize> {
        Err(self.not_a_file("write"))
    }

    fn set_len(&self, _size: u64) -> FsResult<()> {
        Err(self.not_a_file("truncate"))
    }

    fn sync(&self) -> FsResult<()> {
        Ok(())
    }
}

impl Read for UnionDir {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(self.not_a_file("read").into())
    }
}

impl Write for UnionDir {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(self.not_a_file("write").into())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for UnionDir {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(self.not_a_file("seek").into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::{read_file, write_file};
    use crate::vfs::{MemoryFs, ReadOnlyFs};
    use std::time::Duration;

    fn p(s: &str) -> &Path {
        Path::new(s)
    }

    /// Base with `/base.txt` and `/dir/inner.txt`; empty layer.
    fn setup() -> (Arc<MemoryFs>, Arc<MemoryFs>, OverlayFs) {
        let base = Arc::new(MemoryFs::new());
        write_file(&*base, p("/base.txt"), b"base", 0o644).unwrap();
        base.mkdir(p("/dir"), 0o750).unwrap();
        write_file(&*base, p("/dir/inner.txt"), b"inner", 0o600).unwrap();

        let layer = Arc::new(MemoryFs::new());
        let fs = OverlayFs::new(Arc::new(ReadOnlyFs::new(base.clone())), layer.clone());
        (base, layer, fs)
    }

    #[test]
    fn test_stat_base_file_leaves_layer_untouched() {
        let (_base, layer, fs) = setup();
        let meta = fs.stat(p("base.txt")).unwrap();
        assert!(meta.is_file());
        assert_eq!(meta.size, 4);
        assert!(layer.is_empty());
    }

    #[test]
    fn test_read_falls_through_to_base() {
        let (_base, layer, fs) = setup();
        assert_eq!(read_file(&fs, p("/dir/inner.txt")).unwrap(), b"inner");
        assert!(layer.is_empty());
        assert_eq!(fs.stat(p("/nope")).unwrap_err().kind(), &ErrorKind::NotFound);
        assert_eq!(fs.open(p("/nope")).unwrap_err().kind(), &ErrorKind::NotFound);
    }

    #[test]
    fn test_create_without_parent_reports_caller_path() {
        let base = Arc::new(MemoryFs::new());
        let fs = OverlayFs::new(Arc::new(ReadOnlyFs::new(base)), Arc::new(MemoryFs::new()));
        let err = fs.create(p("foo/bar")).unwrap_err();
        assert_eq!(err.op(), "open");
        assert!(err.is_not_found());
        assert_eq!(err.path(), p("foo/bar"));
    }

    #[test]
    fn test_mkdir_matches_plain_filesystem() {
        let plain = MemoryFs::new();
        let (_base, _layer, overlay) = setup();
        let fss: [&dyn Filesystem; 2] = [&plain, &overlay];

        for fs in fss {
            fs.mkdir_all(p("/some/path"), 0o744).unwrap();
            fs.create(p("/some/path/newfile")).unwrap();

            let err = fs.mkdir(p("/some/path"), 0o744).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::AlreadyExists, "{}", fs.name());
            fs.mkdir_all(p("/some/path"), 0o744).unwrap();
        }
    }

    #[test]
    fn test_mkdir_base_only_dir_is_not_materialized() {
        let (_base, layer, fs) = setup();
        let err = fs.mkdir(p("/dir"), 0o700).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::AlreadyExists);
        fs.mkdir_all(p("/dir"), 0o700).unwrap();
        assert!(layer.is_empty());
    }

    #[test]
    fn test_mkdir_missing_parent() {
        let (_base, _layer, fs) = setup();
        let err = fs.mkdir(p("/missing/child"), 0o700).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_mkdir_all_through_base_dirs() {
        let (base, layer, fs) = setup();
        fs.mkdir_all(p("/dir/a/b"), 0o700).unwrap();

        let dir = layer.stat(p("/dir")).unwrap();
        assert_eq!(dir.permissions(), 0o750, "materialized with the base mode");
        assert_eq!(layer.stat(p("/dir/a/b")).unwrap().permissions(), 0o700);
        assert!(base.stat(p("/dir/a")).is_err());

        let err = fs.mkdir_all(p("/base.txt/x"), 0o700).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::NotADirectory);
    }

    #[test]
    fn test_readdir_in_single_entry_batches() {
        let base = Arc::new(MemoryFs::new());
        let fs = OverlayFs::new(Arc::new(ReadOnlyFs::new(base)), Arc::new(MemoryFs::new()));
        fs.create(p("/foo")).unwrap();
        fs.mkdir(p("/bar"), 0o700).unwrap();

        let mut dir = fs.open(p("/")).unwrap();
        let first = dir.read_dir(Some(1)).unwrap();
        let second = dir.read_dir(Some(1)).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(first[0].name, "bar");
        assert_eq!(second[0].name, "foo");
        assert!(dir.read_dir(Some(1)).unwrap().is_empty());
    }

    #[test]
    fn test_merged_listing_prefers_layer() {
        let (_base, layer, fs) = setup();
        layer.mkdir(p("/dir"), 0o755).unwrap();
        write_file(&*layer, p("/dir/inner.txt"), b"layer copy", 0o644).unwrap();
        write_file(&*layer, p("/dir/new.txt"), b"", 0o644).unwrap();

        let mut dir = fs.open(p("/dir")).unwrap();
        let mut seen = Vec::new();
        loop {
            let batch = dir.read_dir(Some(1)).unwrap();
            if batch.is_empty() {
                break;
            }
            seen.extend(batch);
        }
        let names: Vec<_> = seen.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["inner.txt", "new.txt"]);
        assert_eq!(seen[0].size, 10);
    }

    #[test]
    fn test_first_write_copies_up() {
        let (base, layer, fs) = setup();
        let mut f = fs
            .open_file(p("/dir/inner.txt"), OpenFlags::write_only().append(true), 0)
            .unwrap();
        f.write_all(b"+more").unwrap();
        drop(f);

        assert_eq!(read_file(&fs, p("/dir/inner.txt")).unwrap(), b"inner+more");
        assert_eq!(read_file(&*base, p("/dir/inner.txt")).unwrap(), b"inner");
        assert_eq!(layer.stat(p("/dir/inner.txt")).unwrap().permissions(), 0o600);
        assert_eq!(layer.stat(p("/dir")).unwrap().permissions(), 0o750);
    }

    #[test]
    fn test_copy_up_keeps_mtime() {
        let base = Arc::new(MemoryFs::new());
        write_file(&*base, p("/old"), b"x", 0o644).unwrap();
        let when = SystemTime::UNIX_EPOCH + Duration::from_secs(86_400);
        base.chtimes(p("/old"), when, when).unwrap();

        let layer = Arc::new(MemoryFs::new());
        let fs = OverlayFs::new(base, layer.clone());
        fs.chmod(p("/old"), 0o400).unwrap();

        let meta = layer.stat(p("/old")).unwrap();
        assert_eq!(meta.modified, when);
        assert_eq!(meta.permissions(), 0o400);
        assert_eq!(read_file(&*layer, p("/old")).unwrap(), b"x");
    }

    #[test]
    fn test_create_in_base_only_dir_materializes_parent() {
        let (base, layer, fs) = setup();
        write_file(&fs, p("/dir/fresh.txt"), b"fresh", 0o644).unwrap();
        assert!(layer.stat(p("/dir")).unwrap().is_dir());
        assert!(layer.stat(p("/dir/inner.txt")).is_err(), "siblings are not copied");
        assert!(base.stat(p("/dir/fresh.txt")).is_err());
    }

    #[test]
    fn test_create_over_directory_fails() {
        let (_base, _layer, fs) = setup();
        let err = fs.create(p("/dir")).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::IsADirectory);
    }

    #[test]
    fn test_remove_rules() {
        let (_base, layer, fs) = setup();
        assert_eq!(fs.remove(p("/base.txt")).unwrap_err().kind(), &ErrorKind::PermissionDenied);
        assert_eq!(fs.remove_all(p("/dir")).unwrap_err().kind(), &ErrorKind::PermissionDenied);
        assert_eq!(fs.remove(p("/nope")).unwrap_err().kind(), &ErrorKind::NotFound);
        fs.remove_all(p("/does/not/exist")).unwrap();

        write_file(&fs, p("/base.txt"), b"mine", 0o644).unwrap();
        assert_eq!(read_file(&fs, p("/base.txt")).unwrap(), b"mine");
        fs.remove(p("/base.txt")).unwrap();
        assert!(layer.stat(p("/base.txt")).is_err());
        assert_eq!(read_file(&fs, p("/base.txt")).unwrap(), b"base", "base shows through again");
    }

    #[test]
    fn test_rename_rules() {
        let (_base, layer, fs) = setup();
        assert_eq!(
            fs.rename(p("/base.txt"), p("/moved.txt")).unwrap_err().kind(),
            &ErrorKind::PermissionDenied
        );
        assert_eq!(fs.rename(p("/nope"), p("/x")).unwrap_err().kind(), &ErrorKind::NotFound);

        write_file(&fs, p("/mine.txt"), b"mine", 0o644).unwrap();
        fs.rename(p("/mine.txt"), p("/dir/mine.txt")).unwrap();
        assert_eq!(read_file(&fs, p("/dir/mine.txt")).unwrap(), b"mine");
        assert!(layer.stat(p("/dir")).unwrap().is_dir());

        assert_eq!(
            fs.rename(p("/dir/mine.txt"), p("/absent/mine.txt")).unwrap_err().kind(),
            &ErrorKind::NotFound
        );
    }

    #[test]
    fn test_failed_write_opens_leave_layer_untouched() {
        let (_base, layer, fs) = setup();

        let excl = OpenFlags::read_write().create(true).excl(true);
        let err = fs.open_file(p("/base.txt"), excl, 0o644).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::AlreadyExists);

        let err = fs.open_file(p("/dir/missing"), OpenFlags::write_only(), 0).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::NotFound);

        let err = fs.open_file(p("/dir"), OpenFlags::write_only(), 0).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::IsADirectory);

        assert!(layer.is_empty());
    }

    #[test]
    fn test_write_open_without_create_classifies_like_memory() {
        let plain = MemoryFs::new();
        let (_base, layer, overlay) = setup();
        let fss: [&dyn Filesystem; 2] = [&plain, &overlay];

        for fs in fss {
            let err = fs.open_file(p("/nope/x"), OpenFlags::write_only(), 0).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::NotFound, "{}", fs.name());
        }
        assert!(layer.is_empty());
    }

    #[test]
    fn test_rename_path_checks_come_first() {
        let (_base, layer, fs) = setup();
        fs.rename(p("/base.txt"), p("/base.txt")).unwrap();
        assert_eq!(
            fs.rename(p("/dir"), p("/dir/sub")).unwrap_err().kind(),
            &ErrorKind::InvalidArgument
        );
        assert_eq!(
            fs.rename(p("/dir/inner.txt"), p("/dir")).unwrap_err().kind(),
            &ErrorKind::NotEmpty
        );
        assert!(layer.is_empty());
    }

    #[test]
    fn test_chtimes_copies_up_directory() {
        let (base, layer, fs) = setup();
        let when = SystemTime::UNIX_EPOCH + Duration::from_secs(42);
        fs.chtimes(p("/dir"), when, when).unwrap();
        assert_eq!(layer.stat(p("/dir")).unwrap().modified, when);
        assert_ne!(base.stat(p("/dir")).unwrap().modified, when);
    }

    #[test]
    fn test_union_dir_rejects_file_io() {
        let (_base, layer, fs) = setup();
        layer.mkdir(p("/dir"), 0o755).unwrap();
        let mut dir = fs.open(p("/dir")).unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(dir.read(&mut buf).unwrap_err().kind(), io::ErrorKind::IsADirectory);
        assert_eq!(dir.stat().unwrap().permissions(), 0o755);
    }
}
