use thiserror::Error;

/// Stage dwell processing error types
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("Record {index} has neither a 'position' nor a 'position_raw' value")]
    MissingPosition { index: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for processing operations
pub type Result<T> = std::result::Result<T, ProcessingError>;
