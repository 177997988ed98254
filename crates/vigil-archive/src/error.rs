/// Errors raised by the archive and rule storage layer.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Archive: database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Archive: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Archive: IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored row carries a timestamp outside the representable range.
    #[error("Archive: invalid timestamp in row {0}")]
    InvalidTimestamp(String),
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
