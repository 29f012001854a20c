use thiserror::Error;

/// Errors emitted by the verifier.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("invalid store: {0}")]
    InvalidStore(String),
    #[error("verification failed with {0} violation(s)")]
    Violations(u64),
    #[error("core error: {0}")]
    Core(#[from] inboxforge_core::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
