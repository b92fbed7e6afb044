use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecoderError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TSV Parsing Error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON Parsing Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Data Validation Error: {0}")]
    Validation(String),

    /// A search invariant was violated. Indicates a bug in option generation
    /// or in the search itself, never bad user input.
    #[error("Invariant Violation: {0}")]
    Invariant(String),
}

pub type DecResult<T> = Result<T, DecoderError>;
