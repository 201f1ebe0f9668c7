use std::io;

/// Failures talking to the conversion service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("upload failed: {0}")]
    Upload(String),

    #[error("conversion service error: {0}")]
    Processing(String),

    /// The request never got an answer: connection, TLS or timeout trouble.
    #[error("network request failed: {0}")]
    Network(String),

    #[error("conversion timed out after {attempts} polls ({waited_secs}s)")]
    Timeout { attempts: u32, waited_secs: u64 },
}

/// Failures fetching the result archive.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// Network, TLS, timeout or server-side trouble; worth another attempt.
    #[error("transient transfer failure: {0}")]
    Transient(String),

    #[error("transfer failed: {0}")]
    Fatal(String),

    #[error("could not obtain download url: {0}")]
    Url(#[source] ClientError),

    #[error("download gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl DownloadError {
    pub fn is_transient(&self) -> bool {
        matches!(self, DownloadError::Transient(_))
    }
}

/// Failures unpacking and collecting the result archive.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("unsafe archive member path: {member}")]
    UnsafePath { member: String },

    #[error("no markdown content in archive: {0}")]
    NoMarkdown(String),

    #[error("corrupt archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Single error type for a whole document conversion.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("markdown parse failed: {0}")]
    Parse(#[from] book_parser::ParseError),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}
