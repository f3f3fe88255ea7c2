use uuid::Uuid;

use super::parser::parse_extraction_response;
use super::prompt::{build_extraction_prompt, EXTRACTION_SYSTEM_PROMPT};
use super::resolve::AiOutcome;
use super::types::{ExtractedDocument, LlmClient};
use super::RemoteExtractionError;

/// Remote extraction stage: prompt → chat completion → parse.
///
/// One request per document, no retry. Any failure is reported to the caller,
/// which substitutes the fallback extractor.
pub struct AiExtractor {
    llm: Box<dyn LlmClient + Send + Sync>,
}

impl AiExtractor {
    pub fn new(llm: Box<dyn LlmClient + Send + Sync>) -> Self {
        Self { llm }
    }

    pub async fn extract(&self, raw_text: &str) -> Result<ExtractedDocument, RemoteExtractionError> {
        let prompt = build_extraction_prompt(raw_text);
        let content = self.llm.complete(EXTRACTION_SYSTEM_PROMPT, &prompt).await?;
        parse_extraction_response(&content)
    }

    /// Same as `extract`, with the failure folded into a tagged outcome.
    pub async fn attempt(&self, document_id: &Uuid, raw_text: &str) -> AiOutcome {
        match self.extract(raw_text).await {
            Ok(document) => {
                tracing::debug!(
                    doc_id = %document_id,
                    document_type = %document.document_type,
                    "Remote extraction succeeded"
                );
                AiOutcome::Success(document)
            }
            Err(e) => {
                tracing::warn!(doc_id = %document_id, error = %e, "Remote extraction failed");
                AiOutcome::RemoteFailure(e)
            }
        }
    }
}
