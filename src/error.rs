//! Error types for the storage backends and the Wikimedia client.

use thiserror::Error;

/// A failure while reading from or writing to a storage backend.
///
/// Any of these aborts the run with a non-zero exit status. The relational
/// backend rolls back its transaction before returning one.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt row in {path}: {reason}")]
    Corrupt { path: String, reason: String },
}

impl StorageError {
    pub(crate) fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }
}

/// A failure talking to one of the Wikimedia endpoints.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("invalid endpoint URL {url}: {source}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid header value for {0}")]
    Header(&'static str),
}
