use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unknown subject/tier combination: {subject}/{tier}")]
    InvalidSubject { subject: String, tier: String },

    /// A ledger commit found its preconditions no longer hold. Consumed by
    /// the delivery engine's retry loop; never surfaced to callers directly.
    #[error("Ledger commit precondition failed")]
    PreconditionFailed,

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ProbeError>;
