use thiserror::Error;

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("short code already exists: {0}")]
    ShortCodeTaken(String),
    #[error("original url already shortened: {0}")]
    UrlExists(String),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
    #[error("journal i/o failed: {0}")]
    Journal(String),
    #[error("schema migration failed: {0}")]
    Migration(String),
    #[error("storage is closed")]
    Closed,
}

impl StorageError {
    /// Returns `true` for the two unique-constraint variants.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ShortCodeTaken(_) | Self::UrlExists(_))
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Journal(err.to_string())
    }
}

#[derive(Debug, Clone, Error)]
pub enum CoreError {
    #[error("invalid short code: {0}")]
    InvalidShortCode(String),
}
