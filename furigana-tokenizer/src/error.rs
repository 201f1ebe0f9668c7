use thiserror::Error;

/// Errors that can be produced by tokenizer operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenizerError {
    #[error("invalid tokenizer configuration: {message}")]
    InvalidConfiguration { message: String },
    #[error("input text exceeds max length of {max_length} chars, actual length: {actual_length}")]
    InputTooLong {
        max_length: usize,
        actual_length: usize,
    },
    #[error("analyzer failure: {message}")]
    Analyzer { message: String },
}
