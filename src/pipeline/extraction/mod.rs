//! Text recognition: image OCR through a scoped engine, PDF text layers directly.

pub mod types;
pub mod ocr;
pub mod pdf;
pub mod session;

pub use types::*;
pub use ocr::*;
pub use pdf::*;
pub use session::*;

use thiserror::Error;

/// Fatal for the item being recognized: the document ends `failed`.
#[derive(Error, Debug)]
pub enum RecognitionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("OCR engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("OCR processing failed: {0}")]
    OcrProcessing(String),

    #[error("PDF parsing failed: {0}")]
    PdfParsing(String),

    #[error("PDF has no readable text layer")]
    NoTextLayer,

    #[error("Recognizer session already terminated")]
    Terminated,
}
