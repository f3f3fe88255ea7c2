//! Document processing orchestrator.
//!
//! Drives one admitted scan through the pipeline:
//! recognize → remote extraction → (fallback on remote failure) → persist.
//!
//! Every failure is absorbed into a terminal persisted status; `process`
//! itself never returns an error. Engines are injected (`EngineLauncher`,
//! `LlmClient`, `DocumentStore`) so the whole flow runs against mocks in tests.

use std::sync::Arc;

use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::db::{DatabaseError, DocumentStore, ExtractionRecord};
use crate::models::enums::ProcessingStatus;
use crate::pipeline::extraction::{RecognitionError, RecognizerSession, TesseractLauncher};
use crate::pipeline::import::RawScan;
use crate::pipeline::structuring::{
    resolve_extraction, AiExtractor, ChatCompletionClient, ExtractedDocument, ExtractionSource,
    RemoteExtractionError,
};

/// Errors that end processing of a single document.
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("Text recognition failed: {0}")]
    Recognition(#[from] RecognitionError),

    #[error("Could not save extraction result: {0}")]
    Persistence(#[from] DatabaseError),
}

/// Named progress milestones of one document, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Checkpoint {
    Queued,
    Recognized,
    Extracted,
    Persisted,
}

impl Checkpoint {
    pub const ALL: [Checkpoint; 4] = [
        Checkpoint::Queued,
        Checkpoint::Recognized,
        Checkpoint::Extracted,
        Checkpoint::Persisted,
    ];

    pub fn position(&self) -> usize {
        match self {
            Self::Queued => 0,
            Self::Recognized => 1,
            Self::Extracted => 2,
            Self::Persisted => 3,
        }
    }

    /// Display percentage derived from position: 25, 50, 75, 100.
    pub fn percent(&self) -> u8 {
        ((self.position() + 1) * 100 / Self::ALL.len()) as u8
    }
}

/// What happened to one document.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingOutcome {
    pub document_id: Uuid,
    /// `Completed` or `Failed`.
    pub status: ProcessingStatus,
    pub result: Option<ExtractedDocument>,
    pub source: Option<ExtractionSource>,
    pub ocr_confidence: Option<f32>,
    pub message: String,
}

impl ProcessingOutcome {
    pub fn is_completed(&self) -> bool {
        self.status == ProcessingStatus::Completed
    }
}

/// Orchestrates recognition, extraction and persistence for a session's documents.
///
/// Owns the session's `RecognizerSession`; call `shutdown` when the session ends.
pub struct DocumentProcessor {
    recognizer: RecognizerSession,
    extractor: AiExtractor,
    store: Arc<dyn DocumentStore>,
}

impl DocumentProcessor {
    pub fn new(recognizer: RecognizerSession, extractor: AiExtractor, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            recognizer,
            extractor,
            store,
        }
    }

    /// Run one document through the pipeline. `on_progress` is called at each
    /// checkpoint reached, in order.
    pub async fn process(
        &mut self,
        document_id: &Uuid,
        scan: &RawScan,
        on_progress: &mut (dyn FnMut(Checkpoint) + Send),
    ) -> ProcessingOutcome {
        let span = tracing::info_span!(
            "process_document",
            doc_id = %document_id,
            file = %scan.filename,
            mime = scan.mime_type(),
        );
        self.run(document_id, scan, on_progress).instrument(span).await
    }

    async fn run(
        &mut self,
        document_id: &Uuid,
        scan: &RawScan,
        on_progress: &mut (dyn FnMut(Checkpoint) + Send),
    ) -> ProcessingOutcome {
        on_progress(Checkpoint::Queued);

        if let Err(e) = self.store.set_status(document_id, ProcessingStatus::Processing) {
            tracing::warn!(error = %e, "Failed to mark document processing, continuing");
        }

        let recognition = match self.recognizer.recognize(scan).await {
            Ok(r) => r,
            Err(e) => return self.fail(document_id, e.into()),
        };
        tracing::info!(
            confidence = recognition.confidence,
            text_length = recognition.text.len(),
            "Text recognized"
        );
        on_progress(Checkpoint::Recognized);

        let outcome = self.extractor.attempt(document_id, &recognition.text).await;
        let resolved = resolve_extraction(outcome, &recognition.text);
        on_progress(Checkpoint::Extracted);

        let record = ExtractionRecord {
            extracted_text: &recognition.text,
            ocr_confidence: recognition.confidence,
            result: &resolved.document,
        };
        if let Err(e) = self.store.complete(document_id, &record) {
            return self.fail(document_id, e.into());
        }
        on_progress(Checkpoint::Persisted);

        tracing::info!(
            source = ?resolved.source,
            document_type = %resolved.document.document_type,
            tracking_number = resolved.document.tracking_number.as_deref().unwrap_or("-"),
            "Document processed"
        );

        ProcessingOutcome {
            document_id: *document_id,
            status: ProcessingStatus::Completed,
            message: resolved.document.message.clone(),
            ocr_confidence: Some(recognition.confidence),
            source: Some(resolved.source),
            result: Some(resolved.document),
        }
    }

    fn fail(&self, document_id: &Uuid, error: ProcessingError) -> ProcessingOutcome {
        let message = error.to_string();
        tracing::warn!(error = %message, "Document processing failed");

        if let Err(e) = self.store.mark_failed(document_id, &message) {
            tracing::error!(error = %e, "Could not record failed status");
        }

        ProcessingOutcome {
            document_id: *document_id,
            status: ProcessingStatus::Failed,
            result: None,
            source: None,
            ocr_confidence: None,
            message,
        }
    }

    /// Release the recognition engine. Idempotent.
    pub async fn shutdown(&mut self) {
        self.recognizer.terminate().await;
    }
}

/// Build a `DocumentProcessor` with production implementations.
///
/// - OCR: Tesseract CLI (`TesseractLauncher`), started on first image
/// - LLM: `ChatCompletionClient` (remote failures fall back to pattern extraction)
pub fn build_processor(
    cfg: &AppConfig,
    store: Arc<dyn DocumentStore>,
) -> Result<DocumentProcessor, RemoteExtractionError> {
    let client = ChatCompletionClient::from_config(cfg)?;
    if client.has_credential() {
        tracing::info!(model = %cfg.model, url = %cfg.api_url, "Remote extraction enabled");
    } else {
        tracing::warn!("No API key configured, every document will use fallback extraction");
    }

    let recognizer = RecognizerSession::new(Box::new(TesseractLauncher::from_config(cfg)));
    let extractor = AiExtractor::new(Box::new(client));
    Ok(DocumentProcessor::new(recognizer, extractor, store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteDocumentStore;
    use crate::models::enums::DocumentKind;
    use crate::models::{Document, NewDocument};
    use crate::pipeline::extraction::{MockEngineLauncher, MockOcrEngine};
    use crate::pipeline::import::ScanFormat;
    use crate::pipeline::structuring::{LlmClient, MockLlmClient};

    const LABEL_TEXT: &str = "UPS GROUND\nTRACKING #: 1Z12345E0291980026\nFROM:\nJohn Smith\n123 Main St\nNew York, NY 10001";

    const REMOTE_REPLY: &str = r#"{
        "documentType": "SHIPPING_LABEL",
        "isShippingLabel": true,
        "trackingNumber": "1Z12345E0291980026",
        "originAddress": {"name": "John Smith", "phone": null, "street": "123 Main St",
                          "city": "New York", "state": "NY", "zip": "10001", "country": "US"},
        "destinationAddress": null,
        "message": "N/A"
    }"#;

    /// Wraps the SQLite store and fails selected writes.
    struct FlakyStore {
        inner: SqliteDocumentStore,
        fail_set_status: bool,
        fail_complete: bool,
    }

    impl FlakyStore {
        fn new() -> Self {
            Self {
                inner: SqliteDocumentStore::in_memory().unwrap(),
                fail_set_status: false,
                fail_complete: false,
            }
        }
    }

    impl DocumentStore for FlakyStore {
        fn create(&self, new: NewDocument) -> Result<Document, DatabaseError> {
            self.inner.create(new)
        }

        fn set_status(&self, id: &Uuid, status: ProcessingStatus) -> Result<(), DatabaseError> {
            if self.fail_set_status {
                return Err(DatabaseError::ConstraintViolation("disk full".into()));
            }
            self.inner.set_status(id, status)
        }

        fn complete(&self, id: &Uuid, record: &ExtractionRecord<'_>) -> Result<(), DatabaseError> {
            if self.fail_complete {
                return Err(DatabaseError::ConstraintViolation("disk full".into()));
            }
            self.inner.complete(id, record)
        }

        fn mark_failed(&self, id: &Uuid, message: &str) -> Result<(), DatabaseError> {
            self.inner.mark_failed(id, message)
        }

        fn get(&self, id: &Uuid) -> Result<Option<Document>, DatabaseError> {
            self.inner.get(id)
        }
    }

    fn png_scan(name: &str) -> RawScan {
        RawScan {
            filename: name.to_string(),
            format: ScanFormat::Png,
            bytes: vec![0x89, 0x50, 0x4E, 0x47],
        }
    }

    fn build(
        ocr: MockEngineLauncher,
        llm: impl LlmClient + 'static,
        store: Arc<dyn DocumentStore>,
    ) -> DocumentProcessor {
        DocumentProcessor::new(
            RecognizerSession::new(Box::new(ocr)),
            AiExtractor::new(Box::new(llm)),
            store,
        )
    }

    fn new_document(store: &dyn DocumentStore) -> Uuid {
        store
            .create(NewDocument {
                owner_id: "alice".into(),
                filename: "label.png".into(),
                file_size: Some(4),
                file_type: Some("image/png".into()),
            })
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn remote_success_is_persisted() {
        let store: Arc<dyn DocumentStore> = Arc::new(SqliteDocumentStore::in_memory().unwrap());
        let id = new_document(store.as_ref());
        let mut processor = build(
            MockEngineLauncher::new(MockOcrEngine::new(LABEL_TEXT, 91.0)),
            MockLlmClient::new(REMOTE_REPLY),
            store.clone(),
        );

        let mut seen = Vec::new();
        let outcome = processor
            .process(&id, &png_scan("label.png"), &mut |cp| seen.push(cp))
            .await;

        assert!(outcome.is_completed());
        assert_eq!(outcome.source, Some(ExtractionSource::Remote));
        assert_eq!(seen, Checkpoint::ALL.to_vec());

        let doc = store.get(&id).unwrap().unwrap();
        assert_eq!(doc.processing_status, ProcessingStatus::Completed);
        assert_eq!(doc.document_type, Some(DocumentKind::ShippingLabel));
        assert_eq!(doc.is_shipping_label, Some(true));
        assert_eq!(doc.tracking_number.as_deref(), Some("1Z12345E0291980026"));
        assert_eq!(doc.extracted_text.as_deref(), Some(LABEL_TEXT));
        assert_eq!(doc.processing_message.as_deref(), Some("N/A"));
        assert!((doc.ocr_confidence.unwrap() - 91.0).abs() < f32::EPSILON);
        processor.shutdown().await;
    }

    #[tokio::test]
    async fn remote_failure_falls_back_and_completes() {
        let failures = [
            RemoteExtractionError::Connection("http://api".into()),
            RemoteExtractionError::Timeout,
            RemoteExtractionError::Api { status: 503, body: "busy".into() },
            RemoteExtractionError::MissingCredential,
        ];
        for failure in failures {
            let store: Arc<dyn DocumentStore> = Arc::new(SqliteDocumentStore::in_memory().unwrap());
            let id = new_document(store.as_ref());
            let mut processor = build(
                MockEngineLauncher::new(MockOcrEngine::new(LABEL_TEXT, 80.0)),
                MockLlmClient::failing(failure),
                store.clone(),
            );

            let outcome = processor.process(&id, &png_scan("label.png"), &mut |_| {}).await;
            assert!(outcome.is_completed());
            assert_eq!(outcome.source, Some(ExtractionSource::Fallback));
            let result = outcome.result.unwrap();
            assert_eq!(result.tracking_number.as_deref(), Some("1Z12345E0291980026"));

            let doc = store.get(&id).unwrap().unwrap();
            assert_eq!(doc.processing_status, ProcessingStatus::Completed);
            assert_eq!(doc.origin_address.unwrap().city.as_deref(), Some("New York"));
            processor.shutdown().await;
        }
    }

    #[tokio::test]
    async fn malformed_reply_falls_back() {
        let store: Arc<dyn DocumentStore> = Arc::new(SqliteDocumentStore::in_memory().unwrap());
        let id = new_document(store.as_ref());
        let mut processor = build(
            MockEngineLauncher::new(MockOcrEngine::new("Dinner menu\nSoup\nSalad", 70.0)),
            MockLlmClient::new("Sure! Here is the data you asked for."),
            store.clone(),
        );

        let outcome = processor.process(&id, &png_scan("menu.png"), &mut |_| {}).await;
        assert!(outcome.is_completed());
        assert_eq!(outcome.source, Some(ExtractionSource::Fallback));
        let doc = store.get(&id).unwrap().unwrap();
        assert_eq!(doc.document_type, Some(DocumentKind::Other));
        assert_eq!(doc.is_shipping_label, Some(false));
        assert_ne!(doc.processing_message.as_deref(), Some("N/A"));
    }

    #[tokio::test]
    async fn recognition_failure_marks_failed_without_fields() {
        let store: Arc<dyn DocumentStore> = Arc::new(SqliteDocumentStore::in_memory().unwrap());
        let id = new_document(store.as_ref());
        let llm = Arc::new(MockLlmClient::new(REMOTE_REPLY));
        let mut processor = build(MockEngineLauncher::unavailable(), llm.clone(), store.clone());

        let mut seen = Vec::new();
        let outcome = processor
            .process(&id, &png_scan("label.png"), &mut |cp| seen.push(cp))
            .await;

        assert_eq!(outcome.status, ProcessingStatus::Failed);
        assert!(outcome.result.is_none());
        assert!(outcome.message.contains("OCR engine unavailable"));
        assert_eq!(seen, vec![Checkpoint::Queued]);
        assert_eq!(llm.call_count(), 0, "no remote call after recognition failure");

        let doc = store.get(&id).unwrap().unwrap();
        assert_eq!(doc.processing_status, ProcessingStatus::Failed);
        assert!(doc.processing_message.unwrap().contains("recognition failed"));
        assert!(doc.document_type.is_none());
        assert!(doc.tracking_number.is_none());
        assert!(doc.extracted_text.is_none());
    }

    #[tokio::test]
    async fn final_write_failure_marks_failed() {
        let store = Arc::new(FlakyStore {
            fail_complete: true,
            ..FlakyStore::new()
        });
        let id = new_document(store.as_ref());
        let mut processor = build(
            MockEngineLauncher::new(MockOcrEngine::new(LABEL_TEXT, 90.0)),
            MockLlmClient::new(REMOTE_REPLY),
            store.clone(),
        );

        let mut seen = Vec::new();
        let outcome = processor
            .process(&id, &png_scan("label.png"), &mut |cp| seen.push(cp))
            .await;

        assert_eq!(outcome.status, ProcessingStatus::Failed);
        assert!(outcome.message.contains("Could not save"));
        assert_eq!(seen, vec![Checkpoint::Queued, Checkpoint::Recognized, Checkpoint::Extracted]);

        let doc = store.get(&id).unwrap().unwrap();
        assert_eq!(doc.processing_status, ProcessingStatus::Failed);
        assert!(doc.document_type.is_none());
    }

    #[tokio::test]
    async fn status_write_failure_does_not_stop_processing() {
        let store = Arc::new(FlakyStore {
            fail_set_status: true,
            ..FlakyStore::new()
        });
        let id = new_document(store.as_ref());
        let mut processor = build(
            MockEngineLauncher::new(MockOcrEngine::new(LABEL_TEXT, 90.0)),
            MockLlmClient::new(REMOTE_REPLY),
            store.clone(),
        );

        let outcome = processor.process(&id, &png_scan("label.png"), &mut |_| {}).await;
        assert!(outcome.is_completed());
    }

    #[tokio::test]
    async fn engine_shared_across_documents_and_released_once() {
        let store: Arc<dyn DocumentStore> = Arc::new(SqliteDocumentStore::in_memory().unwrap());
        let launcher = MockEngineLauncher::new(MockOcrEngine::new(LABEL_TEXT, 90.0));
        let stats = launcher.stats();
        let mut processor = build(launcher, MockLlmClient::new(REMOTE_REPLY), store.clone());

        for name in ["a.png", "b.png", "c.png"] {
            let id = new_document(store.as_ref());
            processor.process(&id, &png_scan(name), &mut |_| {}).await;
        }
        processor.shutdown().await;
        processor.shutdown().await;

        assert_eq!(stats.launches(), 1);
        assert_eq!(stats.recognitions(), 3);
        assert_eq!(stats.terminations(), 1);
    }

    #[test]
    fn checkpoints_are_ordered_with_derived_percent() {
        assert!(Checkpoint::Queued < Checkpoint::Recognized);
        assert!(Checkpoint::Recognized < Checkpoint::Extracted);
        assert!(Checkpoint::Extracted < Checkpoint::Persisted);
        let percents: Vec<u8> = Checkpoint::ALL.iter().map(|c| c.percent()).collect();
        assert_eq!(percents, vec![25, 50, 75, 100]);
    }

    #[test]
    fn outcome_serializes() {
        let outcome = ProcessingOutcome {
            document_id: Uuid::nil(),
            status: ProcessingStatus::Completed,
            result: None,
            source: Some(ExtractionSource::Fallback),
            ocr_confidence: Some(88.0),
            message: "N/A".into(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["source"], "fallback");
        assert_eq!(json["message"], "N/A");
    }

    #[test]
    fn build_processor_without_key_uses_fallback_only() {
        let store: Arc<dyn DocumentStore> = Arc::new(SqliteDocumentStore::in_memory().unwrap());
        let cfg = AppConfig::default();
        assert!(build_processor(&cfg, store).is_ok());
    }
}
