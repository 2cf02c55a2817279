use thiserror::Error;

pub type MarginResult<T> = Result<T, MarginError>;

#[derive(Error, Debug)]
pub enum MarginError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Data source error: {0}")]
    Source(String),

    #[error("Snapshot store error: {0}")]
    Snapshot(String),

    #[error("Computation error: {0}")]
    Compute(String),

    #[error("Report error: {0}")]
    Report(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
