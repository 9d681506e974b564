use thiserror::Error;

/// Errors emitted by the generation orchestrator and run engine.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// A single batch failed after its retry. Fatal for that batch only;
    /// sibling batches in the same chunk keep their results.
    #[error("batch of {count} rows for table '{table}' failed: {reason}")]
    BatchFailed {
        table: String,
        count: usize,
        reason: String,
    },
    /// A generator returned zero rows; treated exactly like a failure.
    #[error("generator returned no rows for table '{0}'")]
    EmptyBatch(String),
    /// Primary and fallback generation both failed for a table.
    #[error("generation exhausted for table '{table}': {reason}")]
    Exhausted { table: String, reason: String },
    /// Generator-internal failure (network, malformed response).
    #[error("generator error: {0}")]
    Generator(String),
    /// Failure reported by the persistence sink.
    #[error("sink error: {0}")]
    Sink(String),
    #[error("core error: {0}")]
    Core(#[from] seedforge_core::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
