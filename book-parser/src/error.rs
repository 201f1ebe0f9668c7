use std::io;

/// Errors that abort parsing of a book or one of its sections.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("not a readable zip container: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("failed to parse xml in {file}: {message}")]
    Xml { file: String, message: String },

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("invalid book structure: {0}")]
    InvalidStructure(String),

    #[error("undecodable text in {0}")]
    Encoding(String),
}

/// Why a markdown image reference was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImagePathError {
    #[error("empty image reference")]
    Empty,
    #[error("image path escapes the image root: {0}")]
    Unsafe(String),
}
