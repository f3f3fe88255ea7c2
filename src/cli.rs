//! Command-line surface: run an upload session over files, browse stored documents.

use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use uuid::Uuid;

use crate::authorization::Viewer;
use crate::config::AppConfig;
use crate::db::{DatabaseError, DocumentFilter, DocumentStore, SqliteDocumentStore};
use crate::models::enums::{AccountStatus, ProcessingStatus, UserRole};
use crate::pipeline::processor::build_processor;
use crate::pipeline::session::{BatchSummary, ItemSummary, ProgressEvent, UploadSession};
use crate::pipeline::structuring::RemoteExtractionError;

#[derive(Parser, Debug)]
#[command(name = "labelscan", version, about = "Extract shipping-label data from scans and PDFs")]
pub struct Cli {
    /// Database file (overrides LABELSCAN_DB)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Process files as one upload session and print the results
    Process {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Owner recorded on every created document
        #[arg(long, default_value = "local")]
        owner: String,
    },
    /// List documents visible to a user, newest first
    List {
        #[arg(long)]
        user: String,

        #[arg(long, default_value = "user")]
        role: String,

        #[arg(long, default_value = "approved")]
        account_status: String,

        /// Only documents in this processing status
        #[arg(long)]
        status: Option<String>,
    },
    /// Print one stored document
    Show { id: String },
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No file could be admitted (accepted: JPEG, PNG, PDF up to 5 MB)")]
    NothingToProcess,

    #[error("Document {0} not found")]
    DocumentNotFound(Uuid),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("Cannot initialize extraction client: {0}")]
    Client(#[from] RemoteExtractionError),

    #[error("Output error: {0}")]
    Output(String),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidArgument(_) => 2,
            Self::NothingToProcess | Self::DocumentNotFound(_) => 3,
            _ => 1,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProcessReport {
    summary: BatchSummary,
    items: Vec<ItemSummary>,
}

/// Run one parsed command. JSON results go to `out`, progress goes to the log.
pub async fn execute(args: Cli, mut cfg: AppConfig, out: &mut dyn Write) -> Result<(), CliError> {
    if let Some(db) = args.db {
        cfg.db_path = db;
    }
    let store = Arc::new(SqliteDocumentStore::open(&cfg.db_path)?);

    match args.command {
        Command::Process { files, owner } => {
            let report = process_files(&cfg, store, &files, &owner).await?;
            write_json(out, &report)
        }
        Command::List {
            user,
            role,
            account_status,
            status,
        } => {
            let viewer = Viewer::new(
                &user,
                parse_arg::<UserRole>(&role)?,
                parse_arg::<AccountStatus>(&account_status)?,
            );
            let filter = DocumentFilter {
                status: status.as_deref().map(parse_arg::<ProcessingStatus>).transpose()?,
            };
            let documents = store.list(&viewer, &filter)?;
            write_json(out, &documents)
        }
        Command::Show { id } => {
            let id = Uuid::parse_str(&id).map_err(|e| CliError::InvalidArgument(format!("{id}: {e}")))?;
            let document = store.get(&id)?.ok_or(CliError::DocumentNotFound(id))?;
            write_json(out, &document)
        }
    }
}

async fn process_files(
    cfg: &AppConfig,
    store: Arc<SqliteDocumentStore>,
    files: &[PathBuf],
    owner: &str,
) -> Result<ProcessReport, CliError> {
    let processor = build_processor(cfg, store.clone())?;
    let mut session = UploadSession::new(owner, processor, store);

    let accepted = session.add_paths(files);
    if accepted.len() < files.len() {
        tracing::info!(
            dropped = files.len() - accepted.len(),
            "Some files were not admitted"
        );
    }
    if accepted.is_empty() {
        session.close().await;
        return Err(CliError::NothingToProcess);
    }

    let summary = session
        .process_all(&mut |event: &ProgressEvent| {
            tracing::info!(
                item = event.current,
                total = event.total,
                file = %event.filename,
                status = %event.status,
                progress = event.progress,
                "Progress"
            );
        })
        .await;
    let items = session.summaries();
    session.close().await;

    Ok(ProcessReport { summary, items })
}

fn parse_arg<T>(value: &str) -> Result<T, CliError>
where
    T: FromStr<Err = DatabaseError>,
{
    T::from_str(value).map_err(|e| CliError::InvalidArgument(e.to_string()))
}

fn write_json<T: Serialize + ?Sized>(out: &mut dyn Write, value: &T) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| CliError::Output(e.to_string()))?;
    writeln!(out, "{json}").map_err(|e| CliError::Output(e.to_string()))
}
