use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Missing, not a directory, or not resolvable.  Nothing was changed.
    #[error("{0}")]
    InvalidFolder(String),

    /// Body that is not JSON or not the expected shape.
    #[error("invalid request body: {0}")]
    BadRequest(String),

    #[error("failed to watch {path:?}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("failed to save folder record: {0}")]
    Persist(#[from] std::io::Error),

    /// The core loop is gone (daemon shutting down).
    #[error("daemon is shutting down")]
    Unavailable,
}
