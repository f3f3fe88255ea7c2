//! Repository layer: document-scoped database operations and the store
//! seam the pipeline writes through.

mod document;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use uuid::Uuid;

use super::DatabaseError;
use crate::authorization::Viewer;
use crate::models::{Document, NewDocument, ProcessingStatus};

pub use document::*;

/// Persistence boundary used by the pipeline. Writes are partial updates keyed by id.
pub trait DocumentStore: Send + Sync {
    /// Insert a new `pending` record and return it.
    fn create(&self, new: NewDocument) -> Result<Document, DatabaseError>;

    fn set_status(&self, id: &Uuid, status: ProcessingStatus) -> Result<(), DatabaseError>;

    fn complete(&self, id: &Uuid, record: &ExtractionRecord<'_>) -> Result<(), DatabaseError>;

    fn mark_failed(&self, id: &Uuid, message: &str) -> Result<(), DatabaseError>;

    fn get(&self, id: &Uuid) -> Result<Option<Document>, DatabaseError>;
}

/// SQLite-backed store. The connection is serialized behind a mutex.
pub struct SqliteDocumentStore {
    conn: Mutex<Connection>,
}

impl SqliteDocumentStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        Ok(Self::new(super::sqlite::open_database(path)?))
    }

    pub fn in_memory() -> Result<Self, DatabaseError> {
        Ok(Self::new(super::sqlite::open_memory_database()?))
    }

    /// Run `f` with the locked connection.
    pub fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, DatabaseError>,
    ) -> Result<T, DatabaseError> {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&conn)
    }

    pub fn list(&self, viewer: &Viewer, filter: &DocumentFilter) -> Result<Vec<Document>, DatabaseError> {
        self.with_connection(|conn| list_documents(conn, viewer, filter))
    }

    pub fn delete(&self, viewer: &Viewer, id: &Uuid) -> Result<(), DatabaseError> {
        self.with_connection(|conn| delete_document(conn, viewer, id))
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn create(&self, new: NewDocument) -> Result<Document, DatabaseError> {
        let doc = Document::new_pending(new);
        self.with_connection(|conn| insert_document(conn, &doc))?;
        Ok(doc)
    }

    fn set_status(&self, id: &Uuid, status: ProcessingStatus) -> Result<(), DatabaseError> {
        self.with_connection(|conn| update_processing_status(conn, id, status))
    }

    fn complete(&self, id: &Uuid, record: &ExtractionRecord<'_>) -> Result<(), DatabaseError> {
        self.with_connection(|conn| apply_extraction(conn, id, record))
    }

    fn mark_failed(&self, id: &Uuid, message: &str) -> Result<(), DatabaseError> {
        self.with_connection(|conn| mark_failed(conn, id, message))
    }

    fn get(&self, id: &Uuid) -> Result<Option<Document>, DatabaseError> {
        self.with_connection(|conn| get_document(conn, id))
    }
}
