use thiserror::Error;

/// Core error type shared across inboxforge crates.
#[derive(Debug, Error)]
pub enum Error {
    /// Database error or driver failure.
    #[error("database error: {0}")]
    Db(String),
    /// The provisioned schema cannot hold the archive model.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
    /// A requested feature is not yet supported.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Db(err.to_string())
    }
}

/// Convenience alias for results returned by inboxforge crates.
pub type Result<T> = std::result::Result<T, Error>;
