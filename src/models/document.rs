use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{DocumentKind, ProcessingStatus};
use crate::pipeline::structuring::types::Address;

/// Persisted document record: the upload metadata plus whatever the pipeline extracted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub owner_id: String,
    pub filename: String,
    pub file_size: Option<u64>,
    pub file_type: Option<String>,
    pub upload_date: NaiveDateTime,
    pub processing_status: ProcessingStatus,
    pub ocr_confidence: Option<f32>,
    pub extracted_text: Option<String>,
    pub document_type: Option<DocumentKind>,
    pub is_shipping_label: Option<bool>,
    pub tracking_number: Option<String>,
    pub origin_address: Option<Address>,
    pub destination_address: Option<Address>,
    pub processing_message: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Fields supplied when a document is accepted for processing.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub owner_id: String,
    pub filename: String,
    pub file_size: Option<u64>,
    pub file_type: Option<String>,
}

impl Document {
    /// A fresh `pending` record with no extraction results.
    pub fn new_pending(new: NewDocument) -> Self {
        let now = chrono::Local::now().naive_local();
        Self {
            id: Uuid::new_v4(),
            owner_id: new.owner_id,
            filename: new.filename,
            file_size: new.file_size,
            file_type: new.file_type,
            upload_date: now,
            processing_status: ProcessingStatus::Pending,
            ocr_confidence: None,
            extracted_text: None,
            document_type: None,
            is_shipping_label: None,
            tracking_number: None,
            origin_address: None,
            destination_address: None,
            processing_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}
