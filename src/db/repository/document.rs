use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use crate::authorization::Viewer;
use crate::db::DatabaseError;
use crate::models::enums::*;
use crate::models::*;
use crate::pipeline::structuring::types::{Address, ExtractedDocument};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

const DOCUMENT_COLUMNS: &str = "id, owner_id, filename, file_size, file_type, upload_date,
     processing_status, ocr_confidence, extracted_text, document_type, is_shipping_label,
     tracking_number, origin_address, destination_address, processing_message,
     created_at, updated_at";

/// Everything written when a document completes.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionRecord<'a> {
    pub extracted_text: &'a str,
    pub ocr_confidence: f32,
    pub result: &'a ExtractedDocument,
}

/// Optional narrowing for `list_documents`.
#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    pub status: Option<ProcessingStatus>,
}

pub fn insert_document(conn: &Connection, doc: &Document) -> Result<(), DatabaseError> {
    conn.execute(
        &format!(
            "INSERT INTO documents ({DOCUMENT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
        ),
        params![
            doc.id.to_string(),
            doc.owner_id,
            doc.filename,
            doc.file_size.map(|s| s as i64),
            doc.file_type,
            format_timestamp(&doc.upload_date),
            doc.processing_status.as_str(),
            doc.ocr_confidence,
            doc.extracted_text,
            doc.document_type.map(|t| t.as_str()),
            doc.is_shipping_label.map(|b| b as i32),
            doc.tracking_number,
            address_to_json(doc.origin_address.as_ref())?,
            address_to_json(doc.destination_address.as_ref())?,
            doc.processing_message,
            format_timestamp(&doc.created_at),
            format_timestamp(&doc.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_document(conn: &Connection, id: &Uuid) -> Result<Option<Document>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1"
    ))?;

    let result = stmt.query_row(params![id.to_string()], read_row);

    match result {
        Ok(row) => Ok(Some(document_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Update only the processing_status of a document.
pub fn update_processing_status(
    conn: &Connection,
    document_id: &Uuid,
    status: ProcessingStatus,
) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE documents SET processing_status = ?2, updated_at = ?3 WHERE id = ?1",
        params![document_id.to_string(), status.as_str(), now_timestamp()],
    )?;
    ensure_updated(rows, document_id)
}

/// Write the extraction result and mark the document `completed` in one statement.
pub fn apply_extraction(
    conn: &Connection,
    document_id: &Uuid,
    record: &ExtractionRecord<'_>,
) -> Result<(), DatabaseError> {
    let result = record.result;
    let rows = conn.execute(
        "UPDATE documents SET
            processing_status = ?2,
            extracted_text = ?3,
            ocr_confidence = ?4,
            document_type = ?5,
            is_shipping_label = ?6,
            tracking_number = ?7,
            origin_address = ?8,
            destination_address = ?9,
            processing_message = ?10,
            updated_at = ?11
         WHERE id = ?1",
        params![
            document_id.to_string(),
            ProcessingStatus::Completed.as_str(),
            record.extracted_text,
            record.ocr_confidence,
            result.document_type.as_str(),
            result.is_shipping_label() as i32,
            result.tracking_number,
            address_to_json(result.origin_address.as_ref())?,
            address_to_json(result.destination_address.as_ref())?,
            result.message,
            now_timestamp(),
        ],
    )?;
    ensure_updated(rows, document_id)
}

/// Mark a document `failed` with an explanation. Structured fields are left untouched.
pub fn mark_failed(conn: &Connection, document_id: &Uuid, message: &str) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE documents SET processing_status = ?2, processing_message = ?3, updated_at = ?4
         WHERE id = ?1",
        params![
            document_id.to_string(),
            ProcessingStatus::Failed.as_str(),
            message,
            now_timestamp()
        ],
    )?;
    ensure_updated(rows, document_id)
}

/// Documents visible to `viewer`, newest upload first.
pub fn list_documents(
    conn: &Connection,
    viewer: &Viewer,
    filter: &DocumentFilter,
) -> Result<Vec<Document>, DatabaseError> {
    let mut sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE 1=1");
    let mut params: Vec<String> = Vec::new();

    if !viewer.can_view_all() {
        params.push(viewer.user_id.clone());
        sql.push_str(&format!(" AND owner_id = ?{}", params.len()));
    }
    if let Some(status) = filter.status {
        params.push(status.as_str().to_string());
        sql.push_str(&format!(" AND processing_status = ?{}", params.len()));
    }
    sql.push_str(" ORDER BY upload_date DESC, created_at DESC");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), read_row)?;

    let mut documents = Vec::new();
    for row in rows {
        documents.push(document_from_row(row?)?);
    }
    Ok(documents)
}

/// Delete a document on behalf of `viewer`. Only the owner or an approved
/// admin may delete; the pipeline itself never calls this.
pub fn delete_document(conn: &Connection, viewer: &Viewer, document_id: &Uuid) -> Result<(), DatabaseError> {
    let owner: Option<String> = match conn.query_row(
        "SELECT owner_id FROM documents WHERE id = ?1",
        params![document_id.to_string()],
        |row| row.get(0),
    ) {
        Ok(owner) => Some(owner),
        Err(rusqlite::Error::QueryReturnedNoRows) => None,
        Err(e) => return Err(e.into()),
    };

    let Some(owner) = owner else {
        return Err(not_found(document_id));
    };
    if !viewer.can_delete(&owner) {
        return Err(DatabaseError::AccessDenied {
            entity_type: "Document".into(),
            id: document_id.to_string(),
        });
    }

    conn.execute(
        "DELETE FROM documents WHERE id = ?1",
        params![document_id.to_string()],
    )?;
    Ok(())
}

// Internal row type for mapping
struct DocumentRow {
    id: String,
    owner_id: String,
    filename: String,
    file_size: Option<i64>,
    file_type: Option<String>,
    upload_date: String,
    processing_status: String,
    ocr_confidence: Option<f32>,
    extracted_text: Option<String>,
    document_type: Option<String>,
    is_shipping_label: Option<i32>,
    tracking_number: Option<String>,
    origin_address: Option<String>,
    destination_address: Option<String>,
    processing_message: Option<String>,
    created_at: String,
    updated_at: String,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<DocumentRow> {
    Ok(DocumentRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        filename: row.get(2)?,
        file_size: row.get(3)?,
        file_type: row.get(4)?,
        upload_date: row.get(5)?,
        processing_status: row.get(6)?,
        ocr_confidence: row.get(7)?,
        extracted_text: row.get(8)?,
        document_type: row.get(9)?,
        is_shipping_label: row.get(10)?,
        tracking_number: row.get(11)?,
        origin_address: row.get(12)?,
        destination_address: row.get(13)?,
        processing_message: row.get(14)?,
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
    })
}

fn document_from_row(row: DocumentRow) -> Result<Document, DatabaseError> {
    Ok(Document {
        id: Uuid::parse_str(&row.id).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
        owner_id: row.owner_id,
        filename: row.filename,
        file_size: row.file_size.map(|s| s.max(0) as u64),
        file_type: row.file_type,
        upload_date: parse_timestamp(&row.upload_date),
        processing_status: ProcessingStatus::from_str(&row.processing_status)?,
        ocr_confidence: row.ocr_confidence,
        extracted_text: row.extracted_text,
        document_type: row
            .document_type
            .as_deref()
            .map(DocumentKind::from_str)
            .transpose()?,
        is_shipping_label: row.is_shipping_label.map(|v| v != 0),
        tracking_number: row.tracking_number,
        origin_address: address_from_json(row.origin_address.as_deref())?,
        destination_address: address_from_json(row.destination_address.as_deref())?,
        processing_message: row.processing_message,
        created_at: parse_timestamp(&row.created_at),
        updated_at: parse_timestamp(&row.updated_at),
    })
}

fn address_to_json(address: Option<&Address>) -> Result<Option<String>, DatabaseError> {
    Ok(address.map(|a| serde_json::to_string(a)).transpose()?)
}

fn address_from_json(json: Option<&str>) -> Result<Option<Address>, DatabaseError> {
    Ok(json.map(|s| serde_json::from_str::<Address>(s)).transpose()?)
}

fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn now_timestamp() -> String {
    format_timestamp(&chrono::Local::now().naive_local())
}

fn parse_timestamp(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .unwrap_or_default()
}

fn ensure_updated(rows: usize, document_id: &Uuid) -> Result<(), DatabaseError> {
    if rows == 0 {
        return Err(not_found(document_id));
    }
    Ok(())
}

fn not_found(document_id: &Uuid) -> DatabaseError {
    DatabaseError::NotFound {
        entity_type: "Document".into(),
        id: document_id.to_string(),
    }
}
