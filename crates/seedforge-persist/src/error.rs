use thiserror::Error;

/// Errors emitted by persistence sinks.
#[derive(Debug, Error)]
pub enum PersistError {
    /// The destination store could not be reached. Checked before any
    /// generation begins when persistence is requested.
    #[error("connection unavailable: {0}")]
    Connection(String),
    /// Query-level failure other than a handled conflict. Fatal for the
    /// whole table: the transaction is rolled back before this propagates.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported: {0}")]
    Unsupported(String),
}
