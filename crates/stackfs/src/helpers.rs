//! Convenience operations built on the [`Filesystem`] contract.
//!
//! These work over any backend, stacked or not.

use std::io::{Read, Write};
use std::path::Path;

use crate::error::{FsError, FsResult};
use crate::path;
use crate::vfs::{Filesystem, Metadata, OpenFlags};

/// Read a whole file.
pub fn read_file(fs: &dyn Filesystem, path: &Path) -> FsResult<Vec<u8>> {
    let mut file = fs.open(path)?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)
        .map_err(|err| FsError::from_io("read", path, err))?;
    Ok(data)
}

/// Write a whole file, creating it with `perm` or truncating it.
pub fn write_file(fs: &dyn Filesystem, path: &Path, data: &[u8], perm: u32) -> FsResult<()> {
    let flags = OpenFlags::write_only().create(true).truncate(true);
    let mut file = fs.open_file(path, flags, perm)?;
    file.write_all(data)
        .map_err(|err| FsError::from_io("write", path, err))?;
    file.sync()
}

/// True if `path` exists. Errors other than "not there" count as absent too.
pub fn exists(fs: &dyn Filesystem, path: &Path) -> bool {
    fs.stat(path).is_ok()
}

pub fn is_dir(fs: &dyn Filesystem, path: &Path) -> bool {
    fs.stat(path).is_ok_and(|meta| meta.is_dir())
}

/// Every entry of a directory, in name order.
pub fn read_dir_all(fs: &dyn Filesystem, path: &Path) -> FsResult<Vec<Metadata>> {
    fs.open(path)?.read_dir(None)
}

/// Visit `root` and everything below it, parents before children, siblings in
/// name order.
///
/// The visitor receives the canonical virtual path and the entry's metadata.
/// An error from the visitor stops the walk and is returned.
pub fn walk<F>(fs: &dyn Filesystem, root: &Path, mut visitor: F) -> FsResult<()>
where
    F: FnMut(&str, &Metadata) -> FsResult<()>,
{
    let canonical = path::normalize(root);
    let meta = fs.stat(root)?;
    walk_inner(fs, &canonical, &meta, &mut visitor)
}

fn walk_inner<F>(fs: &dyn Filesystem, current: &str, meta: &Metadata, visitor: &mut F) -> FsResult<()>
where
    F: FnMut(&str, &Metadata) -> FsResult<()>,
{
    visitor(current, meta)?;
    if !meta.is_dir() {
        return Ok(());
    }
    for child in read_dir_all(fs, Path::new(current))? {
        let child_path = path::join(current, &child.name);
        walk_inner(fs, &child_path, &child, visitor)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::vfs::MemoryFs;

    fn tree() -> MemoryFs {
        let fs = MemoryFs::new();
        fs.mkdir_all(Path::new("/src/bin"), 0o755).unwrap();
        write_file(&fs, Path::new("/src/lib.rs"), b"pub mod x;", 0o644).unwrap();
        write_file(&fs, Path::new("/src/bin/main.rs"), b"fn main() {}", 0o644).unwrap();
        write_file(&fs, Path::new("/README"), b"", 0o644).unwrap();
        fs
    }

    #[test]
    fn test_write_then_read() {
        let fs = MemoryFs::new();
        write_file(&fs, Path::new("/f"), b"first, longer", 0o600).unwrap();
        write_file(&fs, Path::new("/f"), b"second", 0o600).unwrap();
        assert_eq!(read_file(&fs, Path::new("/f")).unwrap(), b"second");
        assert_eq!(fs.stat(Path::new("/f")).unwrap().permissions(), 0o600);
    }

    #[test]
    fn test_exists_and_is_dir() {
        let fs = tree();
        assert!(exists(&fs, Path::new("/src/lib.rs")));
        assert!(!is_dir(&fs, Path::new("/src/lib.rs")));
        assert!(is_dir(&fs, Path::new("/src")));
        assert!(!exists(&fs, Path::new("/nope")));
    }

    #[test]
    fn test_walk_is_preorder_and_sorted() {
        let fs = tree();
        let mut seen = Vec::new();
        walk(&fs, Path::new("/"), |path, _| {
            seen.push(path.to_string());
            Ok(())
        })
        .unwrap();
        assert_eq!(
            seen,
            vec!["/", "/README", "/src", "/src/bin", "/src/bin/main.rs", "/src/lib.rs"]
        );
    }

    #[test]
    fn test_walk_stops_on_visitor_error() {
        let fs = tree();
        let mut visited = 0;
        let err = walk(&fs, Path::new("/src"), |path, _| {
            visited += 1;
            if path == "/src/bin" {
                return Err(FsError::new(ErrorKind::InvalidArgument, "walk", path));
            }
            Ok(())
        })
        .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidArgument);
        assert_eq!(visited, 2);
    }

    #[test]
    fn test_walk_missing_root() {
        let fs = MemoryFs::new();
        let err = walk(&fs, Path::new("/missing"), |_, _| Ok(())).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::NotFound);
    }
}
