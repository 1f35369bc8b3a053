use std::path::{Path, PathBuf};

use cbrowse_config::TypeCacheConfig;
use cbrowse_core::{collect_files_with_extensions, Project};

use crate::error::{Result, TypeCacheError};

/// Where the fallback locator gets source text from.
///
/// Editors substitute an implementation that serves unsaved buffers; the default reads the
/// file system.
pub trait SourceProvider: Send + Sync {
    /// Every source file of `project`, in a stable order.
    fn source_files(&self, project: &Project) -> Result<Vec<PathBuf>>;

    fn read(&self, path: &Path) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct FsSourceProvider {
    extensions: Vec<String>,
}

impl FsSourceProvider {
    pub fn new(extensions: Vec<String>) -> Self {
        Self { extensions }
    }

    pub fn from_config(config: &TypeCacheConfig) -> Self {
        Self::new(config.source_extensions.clone())
    }
}

impl SourceProvider for FsSourceProvider {
    fn source_files(&self, project: &Project) -> Result<Vec<PathBuf>> {
        collect_files_with_extensions(project.root(), &self.extensions).map_err(|source| {
            TypeCacheError::Io {
                path: project.root().to_path_buf(),
                source,
            }
        })
    }

    fn read(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path).map_err(|source| TypeCacheError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
