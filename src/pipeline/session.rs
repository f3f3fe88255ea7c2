//! Upload session: a batch of admitted scans processed strictly in order.
//!
//! Each item moves `pending → processing → {success, error}` and never leaves a
//! terminal state. A failure in one item is recorded on that item only.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::db::DocumentStore;
use crate::models::NewDocument;
use crate::pipeline::import::{admit_paths, RawScan};
use crate::pipeline::processor::{Checkpoint, DocumentProcessor};
use crate::pipeline::structuring::{ExtractedDocument, ExtractionSource};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("No upload item with id {0}")]
    NotFound(Uuid),

    #[error("Upload item {id} is {status} and can no longer be removed")]
    NotRemovable { id: Uuid, status: ItemStatus },

    #[error("Invalid item transition from {from} to {to}")]
    InvalidTransition { from: ItemStatus, to: ItemStatus },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Processing,
    Success,
    Error,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Success => "success",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }

    fn can_transition_to(&self, next: ItemStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Success)
                | (Self::Processing, Self::Error)
        )
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One file in the session.
#[derive(Debug)]
pub struct UploadItem {
    pub id: Uuid,
    pub file: RawScan,
    status: ItemStatus,
    /// Display percentage, 0..=100. Never decreases.
    pub progress: u8,
    pub checkpoint: Option<Checkpoint>,
    pub document_id: Option<Uuid>,
    pub result: Option<ExtractedDocument>,
    pub source: Option<ExtractionSource>,
    pub error: Option<String>,
}

impl UploadItem {
    fn new(file: RawScan) -> Self {
        Self {
            id: Uuid::new_v4(),
            file,
            status: ItemStatus::Pending,
            progress: 0,
            checkpoint: None,
            document_id: None,
            result: None,
            source: None,
            error: None,
        }
    }

    pub fn status(&self) -> ItemStatus {
        self.status
    }

    fn transition(&mut self, next: ItemStatus) -> Result<(), SessionError> {
        if !self.status.can_transition_to(next) {
            return Err(SessionError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    fn reach(&mut self, checkpoint: Checkpoint) {
        self.checkpoint = Some(checkpoint);
        self.progress = self.progress.max(checkpoint.percent());
    }

    fn fail(&mut self, message: String) -> Result<(), SessionError> {
        self.transition(ItemStatus::Error)?;
        self.error = Some(message);
        self.progress = 100;
        Ok(())
    }

    pub fn summary(&self) -> ItemSummary {
        ItemSummary {
            id: self.id,
            filename: self.file.filename.clone(),
            status: self.status,
            progress: self.progress,
            document_id: self.document_id,
            source: self.source,
            result: self.result.clone(),
            error: self.error.clone(),
        }
    }
}

/// Serializable view of an item, without the file bytes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSummary {
    pub id: Uuid,
    pub filename: String,
    pub status: ItemStatus,
    pub progress: u8,
    pub document_id: Option<Uuid>,
    pub source: Option<ExtractionSource>,
    pub result: Option<ExtractedDocument>,
    pub error: Option<String>,
}

/// Progress notification for one item, emitted on every state change and checkpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub item_id: Uuid,
    pub filename: String,
    /// 1-based position within this batch run.
    pub current: usize,
    pub total: usize,
    pub status: ItemStatus,
    pub checkpoint: Option<Checkpoint>,
    pub progress: u8,
}

impl ProgressEvent {
    fn for_item(item: &UploadItem, current: usize, total: usize) -> Self {
        Self {
            item_id: item.id,
            filename: item.file.filename.clone(),
            current,
            total,
            status: item.status,
            checkpoint: item.checkpoint,
            progress: item.progress,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Upload session for one owner. Owns the processor, and with it the
/// session's recognition engine; call `close` to release it.
pub struct UploadSession {
    owner_id: String,
    items: Vec<UploadItem>,
    processor: DocumentProcessor,
    store: Arc<dyn DocumentStore>,
}

impl UploadSession {
    pub fn new(owner_id: &str, processor: DocumentProcessor, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            items: Vec::new(),
            processor,
            store,
        }
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Queue an admitted scan. Returns the item id.
    pub fn add(&mut self, scan: RawScan) -> Uuid {
        let item = UploadItem::new(scan);
        let id = item.id;
        tracing::debug!(item_id = %id, file = %item.file.filename, "Item queued");
        self.items.push(item);
        id
    }

    /// Admit files from disk and queue the accepted ones. Rejected files are dropped.
    pub fn add_paths<P: AsRef<Path>>(&mut self, paths: &[P]) -> Vec<Uuid> {
        admit_paths(paths).into_iter().map(|scan| self.add(scan)).collect()
    }

    /// Remove an item that has not started processing.
    pub fn remove(&mut self, id: &Uuid) -> Result<RawScan, SessionError> {
        let index = self
            .items
            .iter()
            .position(|item| item.id == *id)
            .ok_or(SessionError::NotFound(*id))?;

        let status = self.items[index].status;
        if status != ItemStatus::Pending {
            return Err(SessionError::NotRemovable { id: *id, status });
        }
        Ok(self.items.remove(index).file)
    }

    pub fn items(&self) -> &[UploadItem] {
        &self.items
    }

    pub fn get(&self, id: &Uuid) -> Option<&UploadItem> {
        self.items.iter().find(|item| item.id == *id)
    }

    pub fn summaries(&self) -> Vec<ItemSummary> {
        self.items.iter().map(UploadItem::summary).collect()
    }

    /// Process every pending item in submission order.
    pub async fn process_all(&mut self, on_event: &mut (dyn FnMut(&ProgressEvent) + Send)) -> BatchSummary {
        let total = self
            .items
            .iter()
            .filter(|item| item.status == ItemStatus::Pending)
            .count();
        let mut summary = BatchSummary {
            total,
            ..Default::default()
        };
        if total == 0 {
            return summary;
        }

        tracing::info!(owner = %self.owner_id, total, "Processing upload batch");

        let mut current = 0;
        for item in self.items.iter_mut() {
            if item.status != ItemStatus::Pending {
                continue;
            }
            current += 1;

            let succeeded = process_item(
                item,
                &self.owner_id,
                &mut self.processor,
                self.store.as_ref(),
                current,
                total,
                on_event,
            )
            .await;

            if succeeded {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
            }
        }

        tracing::info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Upload batch finished"
        );
        summary
    }

    /// End the session: release the recognition engine and hand back the items.
    pub async fn close(mut self) -> Vec<UploadItem> {
        self.processor.shutdown().await;
        std::mem::take(&mut self.items)
    }
}

async fn process_item(
    item: &mut UploadItem,
    owner_id: &str,
    processor: &mut DocumentProcessor,
    store: &dyn DocumentStore,
    current: usize,
    total: usize,
    on_event: &mut (dyn FnMut(&ProgressEvent) + Send),
) -> bool {
    if let Err(e) = item.transition(ItemStatus::Processing) {
        tracing::warn!(item_id = %item.id, error = %e, "Skipping item");
        return false;
    }
    on_event(&ProgressEvent::for_item(item, current, total));

    let document = match store.create(NewDocument {
        owner_id: owner_id.to_string(),
        filename: item.file.filename.clone(),
        file_size: Some(item.file.size_bytes()),
        file_type: Some(item.file.mime_type().to_string()),
    }) {
        Ok(doc) => doc,
        Err(e) => {
            tracing::warn!(item_id = %item.id, error = %e, "Could not create document record");
            finish(item, Err(format!("Could not create document record: {e}")));
            on_event(&ProgressEvent::for_item(item, current, total));
            return false;
        }
    };
    item.document_id = Some(document.id);

    let item_id = item.id;
    let outcome = {
        let UploadItem {
            file,
            progress,
            checkpoint,
            status,
            ..
        } = &mut *item;
        let file: &RawScan = file;
        let mut on_checkpoint = |cp: Checkpoint| {
            *checkpoint = Some(cp);
            *progress = (*progress).max(cp.percent());
            on_event(&ProgressEvent {
                item_id,
                filename: file.filename.clone(),
                current,
                total,
                status: *status,
                checkpoint: Some(cp),
                progress: *progress,
            });
        };
        processor.process(&document.id, file, &mut on_checkpoint).await
    };

    let succeeded = outcome.is_completed();
    if succeeded {
        item.result = outcome.result;
        item.source = outcome.source;
        finish(item, Ok(()));
    } else {
        tracing::warn!(item_id = %item.id, error = %outcome.message, "Item failed, continuing batch");
        finish(item, Err(outcome.message));
    }
    on_event(&ProgressEvent::for_item(item, current, total));
    succeeded
}

fn finish(item: &mut UploadItem, result: Result<(), String>) {
    let transition = match result {
        Ok(()) => item.transition(ItemStatus::Success),
        Err(message) => item.fail(message),
    };
    if transition.is_ok() && item.status == ItemStatus::Success {
        item.reach(Checkpoint::Persisted);
    }
    if let Err(e) = transition {
        tracing::error!(item_id = %item.id, error = %e, "Item state not updated");
    }
}
