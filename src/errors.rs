/// Domain-specific error types for the analytics core.
/// Only programmer errors and I/O surface here:
/// - Mismatched inputs are fatal and returned immediately
/// - Unsolvable searches are `None`, never an error
/// - Degenerate numerics are handled by explicit branches
#[derive(Debug, thiserror::Error)]
pub enum QuantError {
    #[error("size mismatch: {left} vs {right}")]
    SizeMismatch { left: usize, right: usize },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("csv error: {0}")]
    Csv(String),

    #[error("worker error: {0}")]
    Worker(String),
}

impl From<rusqlite::Error> for QuantError {
    fn from(e: rusqlite::Error) -> Self {
        QuantError::Database(e.to_string())
    }
}

impl From<std::io::Error> for QuantError {
    fn from(e: std::io::Error) -> Self {
        QuantError::Io(e.to_string())
    }
}

impl From<csv::Error> for QuantError {
    fn from(e: csv::Error) -> Self {
        QuantError::Csv(e.to_string())
    }
}

impl From<serde_json::Error> for QuantError {
    fn from(e: serde_json::Error) -> Self {
        QuantError::InvalidInput(e.to_string())
    }
}

pub type QuantResult<T> = Result<T, QuantError>;
