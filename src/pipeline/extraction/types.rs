use async_trait::async_trait;
use serde::Serialize;

use super::RecognitionError;
use crate::pipeline::import::RawScan;

/// Recognized text for one scan. `confidence` is on a 0–100 scale and is
/// informational only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecognitionResult {
    pub text: String,
    pub confidence: f32,
}

/// A word reported by the OCR engine, with the line it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrWord {
    pub text: String,
    /// 0–100; negative means the engine assigned none.
    pub confidence: f32,
    pub line: LineKey,
}

/// Position of a text line within the page layout (page, block, paragraph, line).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LineKey {
    pub page: u32,
    pub block: u32,
    pub paragraph: u32,
    pub line: u32,
}

/// A running OCR engine (allows mocking for tests).
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize_image(&self, scan: &RawScan) -> Result<RecognitionResult, RecognitionError>;

    /// Release the engine's resources. Called once, at session teardown.
    async fn terminate(&mut self) -> Result<(), RecognitionError>;
}

/// Starts an `OcrEngine`. Launching is the expensive step.
#[async_trait]
pub trait EngineLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn OcrEngine>, RecognitionError>;
}
