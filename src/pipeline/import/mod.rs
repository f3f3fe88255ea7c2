pub mod format;

pub use format::*;

use thiserror::Error;

/// Reasons an upload is not admitted into a session. Never surfaced to the
/// user: rejected files are dropped from the batch.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("File too large: {size_mb:.1}MB exceeds {max_mb}MB limit")]
    FileTooLarge { size_mb: f64, max_mb: u64 },

    #[error("File name says {declared} but content is {detected}")]
    FormatMismatch {
        declared: ScanFormat,
        detected: ScanFormat,
    },
}
