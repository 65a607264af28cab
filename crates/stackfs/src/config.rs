//! Backend stacks described in TOML.
//!
//! A stack is a tree of backends. The classic sandbox, a read-only checkout
//! with a scratch layer in memory:
//!
//! ```toml
//! [backend]
//! type = "overlay"
//!
//! [backend.base]
//! type = "read_only"
//! inner = { type = "local", root = "/srv/project" }
//!
//! [backend.layer]
//! type = "memory"
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::vfs::{ArchiveError, ArchiveFs, Filesystem, LocalFs, MemoryFs, OverlayFs, ReadOnlyFs};

/// Errors loading a configuration or building the stack it describes.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("local root {} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

/// Top-level configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VfsConfig {
    pub backend: BackendConfig,
}

/// One node of a backend stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Empty in-memory filesystem.
    Memory,

    /// A host directory.
    Local { root: PathBuf },

    /// Any backend with writes refused.
    ReadOnly { inner: Box<BackendConfig> },

    /// Copy-on-write union; `layer` takes every write.
    Overlay {
        base: Box<BackendConfig>,
        layer: Box<BackendConfig>,
    },

    /// A zip file on the host, read-only.
    Archive { path: PathBuf },
}

impl VfsConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn build(&self) -> Result<Arc<dyn Filesystem>, ConfigError> {
        self.backend.build()
    }
}

impl Default for VfsConfig {
    /// The current directory, unwrapped.
    fn default() -> Self {
        Self {
            backend: BackendConfig::Local {
                root: PathBuf::from("."),
            },
        }
    }
}

impl BackendConfig {
    /// Build the described stack, innermost backends first.
    pub fn build(&self) -> Result<Arc<dyn Filesystem>, ConfigError> {
        let fs: Arc<dyn Filesystem> = match self {
            BackendConfig::Memory => Arc::new(MemoryFs::new()),
            BackendConfig::Local { root } => {
                if !root.is_dir() {
                    return Err(ConfigError::NotADirectory(root.clone()));
                }
                Arc::new(LocalFs::new(root.clone()))
            }
            BackendConfig::ReadOnly { inner } => Arc::new(ReadOnlyFs::new(inner.build()?)),
            BackendConfig::Overlay { base, layer } => Arc::new(OverlayFs::new(base.build()?, layer.build()?)),
            BackendConfig::Archive { path } => Arc::new(ArchiveFs::open(path)?),
        };
        tracing::debug!(backend = fs.name(), "built backend");
        Ok(fs)
    }
}
