use thiserror::Error;

/// Errors emitted by the generation engine.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("schema error: {0}")]
    Schema(String),
    #[error("integrity violation: {0}")]
    Integrity(String),
    #[error("core error: {0}")]
    Core(#[from] inboxforge_core::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
