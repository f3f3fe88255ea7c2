//! Structuring: turn recognized text into an `ExtractedDocument`.
//!
//! Two extractors share one output schema:
//! - `AiExtractor` asks a remote chat-completion model for the JSON record.
//! - `fallback::extract_fallback` is a pure pattern matcher used whenever the
//!   remote stage fails for any reason.
//!
//! `resolve::resolve_extraction` is the single place that decides which one ran.

pub mod types;
pub mod prompt;
pub mod parser;
pub mod client;
pub mod extractor;
pub mod fallback;
pub mod resolve;

pub use types::*;
pub use prompt::*;
pub use parser::*;
pub use client::*;
pub use extractor::*;
pub use fallback::*;
pub use resolve::*;

use thiserror::Error;

/// Failures of the remote extraction stage. All of them are recoverable:
/// the orchestrator answers every variant with the fallback extractor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteExtractionError {
    #[error("No API credential configured for remote extraction")]
    MissingCredential,

    #[error("Could not reach extraction endpoint at {0}")]
    Connection(String),

    #[error("Extraction request timed out")]
    Timeout,

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Extraction endpoint returned error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Malformed extraction response: {0}")]
    MalformedResponse(String),

    #[error("JSON parsing error: {0}")]
    JsonParsing(String),

    #[error("Response does not match the extraction schema: {0}")]
    SchemaMismatch(String),
}
