//! The directory-entry table behind [`MemoryFs`](super::MemoryFs).
//!
//! One map from canonical path to [`Entry`]. Directories record the names of
//! their direct children; a child finds its parent by looking up its parent path,
//! never through a pointer. Invariants kept by every mutation here:
//!
//! - the root exists and is a directory;
//! - every non-root entry's parent exists and is a directory;
//! - a directory's child set is exactly the set of entries whose parent it is.
//!
//! Nothing in this module locks; callers hold the table's `RwLock`.

use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::RwLock;

use crate::error::{ErrorKind, FsError, FsResult};
use crate::path::{self, ROOT};
use crate::vfs::traits::{Metadata, mode};

/// Content and attributes of one file or directory.
///
/// Shared between the table and every open handle on the entry, so a truncate
/// through one handle is visible through all of them.
#[derive(Debug)]
pub(crate) struct Inode {
    pub data: Vec<u8>,
    pub mode: u32,
    pub modified: SystemTime,
}

impl Inode {
    pub fn is_dir(&self) -> bool {
        self.mode & mode::S_IFMT == mode::S_IFDIR
    }

    pub fn metadata(&self, name: &str) -> Metadata {
        Metadata {
            name: name.to_string(),
            size: if self.is_dir() { 0 } else { self.data.len() as u64 },
            mode: self.mode,
            modified: self.modified,
        }
    }
}

pub(crate) type SharedInode = Arc<RwLock<Inode>>;

#[derive(Debug)]
pub(crate) struct Entry {
    path: String,
    inode: SharedInode,
    /// Names of direct children; `Some` exactly for directories.
    children: Option<BTreeSet<String>>,
}

impl Entry {
    pub fn inode(&self) -> &SharedInode {
        &self.inode
    }

    pub fn is_dir(&self) -> bool {
        self.children.is_some()
    }

    pub fn has_children(&self) -> bool {
        self.children.as_ref().is_some_and(|c| !c.is_empty())
    }

    pub fn metadata(&self) -> Metadata {
        self.inode.read().metadata(path::base_name(&self.path))
    }
}

#[derive(Debug)]
pub(crate) struct Table {
    entries: HashMap<String, Entry>,
}

impl Table {
    /// A table holding only the root directory.
    pub fn new(root_perm: u32) -> Self {
        let mut entries = HashMap::new();
        entries.insert(
            ROOT.to_string(),
            Entry {
                path: ROOT.to_string(),
                inode: Arc::new(RwLock::new(Inode {
                    data: Vec::new(),
                    mode: mode::S_IFDIR | (root_perm & mode::CHMOD_BITS),
                    modified: SystemTime::now(),
                })),
                children: Some(BTreeSet::new()),
            },
        );
        Self { entries }
    }

    pub fn get(&self, canonical: &str) -> Option<&Entry> {
        self.entries.get(canonical)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Require that the parent of `canonical` exists and is a directory.
    ///
    /// Errors report `shown`, the path as the caller spelled it.
    pub fn require_parent_dir(&self, op: &'static str, shown: &Path, canonical: &str) -> FsResult<()> {
        match self.get(path::parent(canonical)) {
            None => Err(FsError::new(ErrorKind::ParentMissing, op, shown)),
            Some(parent) if !parent.is_dir() => Err(FsError::new(ErrorKind::NotADirectory, op, shown)),
            Some(_) => Ok(()),
        }
    }

    /// Insert an empty file. The parent must already be a directory.
    pub fn insert_file(&mut self, canonical: &str, perm: u32) -> SharedInode {
        self.insert(canonical, mode::S_IFREG | (perm & mode::CHMOD_BITS), None)
    }

    /// Insert an empty directory. The parent must already be a directory.
    pub fn insert_dir(&mut self, canonical: &str, perm: u32) -> SharedInode {
        self.insert(
            canonical,
            mode::S_IFDIR | (perm & mode::CHMOD_BITS),
            Some(BTreeSet::new()),
        )
    }

    fn insert(&mut self, canonical: &str, mode: u32, children: Option<BTreeSet<String>>) -> SharedInode {
        let inode = Arc::new(RwLock::new(Inode {
            data: Vec::new(),
            mode,
            modified: SystemTime::now(),
        }));
        self.entries.insert(
            canonical.to_string(),
            Entry {
                path: canonical.to_string(),
                inode: Arc::clone(&inode),
                children,
            },
        );
        self.register_with_parent(canonical);
        inode
    }

    /// Remove a single entry. The caller has checked it exists and has no children.
    pub fn remove_entry(&mut self, canonical: &str) {
        self.unregister_with_parent(canonical);
        self.entries.remove(canonical);
    }

    /// Remove `canonical` and every descendant. Absent paths are ignored.
    ///
    /// The root itself is emptied but never removed.
    pub fn remove_all(&mut self, canonical: &str) {
        let Some(entry) = self.entries.get(canonical) else {
            return;
        };
        let children: Vec<String> = entry.children.iter().flatten().cloned().collect();
        for child in children {
            self.remove_all(&path::join(canonical, &child));
        }
        if canonical != ROOT {
            tracing::trace!(path = canonical, "removing entry");
            self.remove_entry(canonical);
        }
    }

    /// Move the subtree at `old` to `new`.
    ///
    /// The caller has validated the move: `old` exists, `new` is absent, `new`'s
    /// parent is a directory and `new` is not inside `old`.
    pub fn rename(&mut self, old: &str, new: &str) {
        // Snapshot the children before anything moves; the recursion below works
        // from this list, not from the table being rewritten.
        let Some(mut entry) = self.entries.remove(old) else {
            panic!("rename source {old} vanished from the entry table");
        };
        let children: Vec<String> = entry.children.iter().flatten().cloned().collect();

        self.unregister_with_parent(old);
        entry.path = new.to_string();
        self.entries.insert(new.to_string(), entry);
        self.register_with_parent(new);
        tracing::trace!(from = old, to = new, "renamed entry");

        for child in children {
            let from = path::join(old, &child);
            let to = path::join(new, &child);
            self.rename_descendant(&from, &to);
        }
    }

    // Descendants keep their parent's child set untouched: the parent moved as a
    // whole, so only the key and stored path change.
    fn rename_descendant(&mut self, old: &str, new: &str) {
        let Some(mut entry) = self.entries.remove(old) else {
            panic!("descendant {old} missing from the entry table during rename");
        };
        let children: Vec<String> = entry.children.iter().flatten().cloned().collect();
        entry.path = new.to_string();
        self.entries.insert(new.to_string(), entry);
        for child in children {
            self.rename_descendant(&path::join(old, &child), &path::join(new, &child));
        }
    }

    /// Entries of directory `dir` whose names sort after `after`, at most `count`.
    ///
    /// Returns `None` if `dir` is not a directory in the table.
    pub fn list(&self, dir: &str, after: Option<&str>, count: Option<usize>) -> Option<Vec<Metadata>> {
        let children = self.get(dir)?.children.as_ref()?;
        let lower = match after {
            Some(name) => Bound::Excluded(name),
            None => Bound::Unbounded,
        };
        let names = children.range::<str, _>((lower, Bound::Unbounded));
        let names: Vec<&String> = match count {
            Some(n) => names.take(n).collect(),
            None => names.collect(),
        };
        Some(
            names
                .into_iter()
                .filter_map(|name| self.get(&path::join(dir, name)).map(Entry::metadata))
                .collect(),
        )
    }

    fn register_with_parent(&mut self, canonical: &str) {
        if canonical == ROOT {
            return;
        }
        let parent = path::parent(canonical);
        let name = path::base_name(canonical).to_string();
        match self.entries.get_mut(parent).and_then(|p| p.children.as_mut()) {
            Some(children) => {
                children.insert(name);
            }
            None => panic!("parent directory {parent} of {canonical} is missing from the entry table"),
        }
    }

    fn unregister_with_parent(&mut self, canonical: &str) {
        if canonical == ROOT {
            return;
        }
        let parent = path::parent(canonical);
        let name = path::base_name(canonical);
        match self.entries.get_mut(parent).and_then(|p| p.children.as_mut()) {
            Some(children) => {
                children.remove(name);
            }
            None => panic!("parent directory {parent} of {canonical} is missing from the entry table"),
        }
    }

    /// Check the parent/child symmetry invariants. Test support only.
    #[cfg(test)]
    pub fn assert_consistent(&self) {
        let root = self.get(ROOT).expect("root entry");
        assert!(root.is_dir(), "root must be a directory");
        for (key, entry) in &self.entries {
            assert_eq!(key, &entry.path, "stored path must match its key");
            if key != ROOT {
                let parent = self.get(path::parent(key)).expect("parent entry");
                let siblings = parent.children.as_ref().expect("parent is a directory");
                assert!(siblings.contains(path::base_name(key)), "{key} not registered with its parent");
            }
            for child in entry.children.iter().flatten() {
                assert!(
                    self.entries.contains_key(&path::join(key, child)),
                    "{key} lists missing child {child}"
                );
            }
        }
    }
}
