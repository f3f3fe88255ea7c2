use serde::Serialize;

use super::fallback::extract_fallback;
use super::types::ExtractedDocument;
use super::RemoteExtractionError;

/// Result of the remote stage, tagged so the failure reason is never lost.
#[derive(Debug)]
pub enum AiOutcome {
    Success(ExtractedDocument),
    RemoteFailure(RemoteExtractionError),
}

/// Which extractor produced the final document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionSource {
    Remote,
    Fallback,
}

#[derive(Debug, Clone)]
pub struct ResolvedExtraction {
    pub document: ExtractedDocument,
    pub source: ExtractionSource,
}

/// Pick the structured result for a document: the remote one when it
/// succeeded, otherwise the fallback over the same text.
pub fn resolve_extraction(outcome: AiOutcome, raw_text: &str) -> ResolvedExtraction {
    match outcome {
        AiOutcome::Success(document) => ResolvedExtraction {
            document,
            source: ExtractionSource::Remote,
        },
        AiOutcome::RemoteFailure(reason) => {
            tracing::info!(reason = %reason, "Using fallback extraction");
            ResolvedExtraction {
                document: extract_fallback(raw_text),
                source: ExtractionSource::Fallback,
            }
        }
    }
}
