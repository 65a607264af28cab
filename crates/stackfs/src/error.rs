//! Error taxonomy shared by every backend.
//!
//! Each failure carries the operation name and the path the caller asked about, so
//! the same misuse reads the same way no matter which backend produced it. Errors
//! convert losslessly into [`std::io::Error`] (the `FsError` rides along as the
//! inner error) and back again via [`FsError::from_io`].

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// Result alias used throughout the crate.
pub type FsResult<T> = Result<T, FsError>;

/// Kind of filesystem failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The path does not exist.
    NotFound,
    /// The path already exists.
    AlreadyExists,
    /// A directory was required but something else was found.
    NotADirectory,
    /// A file operation was attempted on a directory.
    IsADirectory,
    /// The directory still has children.
    NotEmpty,
    /// The parent directory of the path does not exist.
    ParentMissing,
    /// The arguments are contradictory (e.g. renaming a directory into itself).
    InvalidArgument,
    /// The backend or handle does not allow this mutation.
    PermissionDenied,
    /// A host failure with no contract meaning; keeps the host's message.
    Io(String),
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::NotFound => f.write_str("no such file or directory"),
            ErrorKind::AlreadyExists => f.write_str("file exists"),
            ErrorKind::NotADirectory => f.write_str("not a directory"),
            ErrorKind::IsADirectory => f.write_str("is a directory"),
            ErrorKind::NotEmpty => f.write_str("directory not empty"),
            ErrorKind::ParentMissing => f.write_str("parent directory does not exist"),
            ErrorKind::InvalidArgument => f.write_str("invalid argument"),
            ErrorKind::PermissionDenied => f.write_str("permission denied"),
            ErrorKind::Io(msg) => write!(f, "i/o error: {msg}"),
        }
    }
}

impl ErrorKind {
    fn io_kind(&self) -> io::ErrorKind {
        match self {
            ErrorKind::NotFound | ErrorKind::ParentMissing => io::ErrorKind::NotFound,
            ErrorKind::AlreadyExists => io::ErrorKind::AlreadyExists,
            ErrorKind::NotADirectory => io::ErrorKind::NotADirectory,
            ErrorKind::IsADirectory => io::ErrorKind::IsADirectory,
            ErrorKind::NotEmpty => io::ErrorKind::DirectoryNotEmpty,
            ErrorKind::InvalidArgument => io::ErrorKind::InvalidInput,
            ErrorKind::PermissionDenied => io::ErrorKind::PermissionDenied,
            ErrorKind::Io(_) => io::ErrorKind::Other,
        }
    }
}

/// A failed filesystem operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{op} {}: {kind}", .path.display())]
pub struct FsError {
    kind: ErrorKind,
    op: &'static str,
    path: PathBuf,
}

impl FsError {
    pub fn new(kind: ErrorKind, op: &'static str, path: impl AsRef<Path>) -> Self {
        Self {
            kind,
            op,
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn not_found(op: &'static str, path: impl AsRef<Path>) -> Self {
        Self::new(ErrorKind::NotFound, op, path)
    }

    pub fn permission_denied(op: &'static str, path: impl AsRef<Path>) -> Self {
        Self::new(ErrorKind::PermissionDenied, op, path)
    }

    /// Classify a host I/O error.
    ///
    /// If `err` wraps an `FsError` (as produced by the `From` impl below), that
    /// error is returned unchanged so the original op and path survive a trip
    /// through `Read`/`Write`.
    pub fn from_io(op: &'static str, path: impl AsRef<Path>, err: io::Error) -> Self {
        if let Some(inner) = err.get_ref().and_then(|e| e.downcast_ref::<FsError>()) {
            return inner.clone();
        }
        let kind = match err.kind() {
            io::ErrorKind::NotFound => ErrorKind::NotFound,
            io::ErrorKind::AlreadyExists => ErrorKind::AlreadyExists,
            io::ErrorKind::NotADirectory => ErrorKind::NotADirectory,
            io::ErrorKind::IsADirectory => ErrorKind::IsADirectory,
            io::ErrorKind::DirectoryNotEmpty => ErrorKind::NotEmpty,
            io::ErrorKind::InvalidInput => ErrorKind::InvalidArgument,
            io::ErrorKind::PermissionDenied | io::ErrorKind::ReadOnlyFilesystem => {
                ErrorKind::PermissionDenied
            }
            _ => ErrorKind::Io(err.to_string()),
        };
        Self::new(kind, op, path)
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn op(&self) -> &'static str {
        self.op
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True for both `NotFound` and `ParentMissing`; a missing parent is a missing path too.
    pub fn is_not_found(&self) -> bool {
        matches!(self.kind, ErrorKind::NotFound | ErrorKind::ParentMissing)
    }
}

impl From<FsError> for io::Error {
    fn from(err: FsError) -> Self {
        io::Error::new(err.kind.io_kind(), err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_op_and_path() {
        let err = FsError::new(ErrorKind::NotEmpty, "remove", "/a/b");
        assert_eq!(err.to_string(), "remove /a/b: directory not empty");
    }

    #[test]
    fn test_parent_missing_is_not_found() {
        let err = FsError::new(ErrorKind::ParentMissing, "open", "foo/bar");
        assert!(err.is_not_found());
        assert_eq!(err.path(), Path::new("foo/bar"));

        let io_err: io::Error = err.into();
        assert_eq!(io_err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_round_trip_through_io_error_keeps_original() {
        let err = FsError::new(ErrorKind::IsADirectory, "read", "/dir");
        let io_err: io::Error = err.clone().into();
        assert_eq!(FsError::from_io("other", "/elsewhere", io_err), err);
    }

    #[test]
    fn test_host_errors_are_classified() {
        let host = io::Error::from(io::ErrorKind::DirectoryNotEmpty);
        assert_eq!(
            FsError::from_io("remove", "/x", host).kind(),
            &ErrorKind::NotEmpty
        );

        let host = io::Error::other("disk on fire");
        let err = FsError::from_io("write", "/x", host);
        assert!(matches!(err.kind(), ErrorKind::Io(msg) if msg.contains("disk on fire")));
    }
}
