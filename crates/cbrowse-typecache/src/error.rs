use std::path::PathBuf;

use cbrowse_index::IndexError;
use cbrowse_parser::ParseError;
use cbrowse_scheduler::{Cancelled, TaskError};

pub type Result<T, E = TypeCacheError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum TypeCacheError {
    #[error("operation cancelled")]
    Cancelled,

    #[error("symbol index query failed: {0}")]
    Index(#[from] IndexError),

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("job failed: {0}")]
    Job(TaskError),
}

impl From<Cancelled> for TypeCacheError {
    fn from(_: Cancelled) -> Self {
        TypeCacheError::Cancelled
    }
}

impl From<TaskError> for TypeCacheError {
    fn from(err: TaskError) -> Self {
        match err {
            TaskError::Cancelled => TypeCacheError::Cancelled,
            other => TypeCacheError::Job(other),
        }
    }
}

impl TypeCacheError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TypeCacheError::Cancelled)
    }
}
