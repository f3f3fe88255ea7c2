use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::process::Command;

use super::types::{EngineLauncher, LineKey, OcrEngine, OcrWord, RecognitionResult};
use super::RecognitionError;
use crate::config::AppConfig;
use crate::pipeline::import::RawScan;

/// Characters Tesseract may emit. Letters, digits and the punctuation found
/// on shipping labels.
pub const CHARACTER_WHITELIST: &str =
    "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz .,()-/:#";

/// Starts the Tesseract CLI engine.
pub struct TesseractLauncher {
    binary: String,
    language: String,
}

impl TesseractLauncher {
    pub fn new(binary: &str, language: &str) -> Self {
        Self {
            binary: binary.to_string(),
            language: language.to_string(),
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new(&cfg.tesseract_path, &cfg.ocr_language)
    }
}

#[async_trait]
impl EngineLauncher for TesseractLauncher {
    async fn launch(&self) -> Result<Box<dyn OcrEngine>, RecognitionError> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .output()
            .await
            .map_err(|e| {
                RecognitionError::EngineUnavailable(format!(
                    "failed to run '{}' (is tesseract installed?): {e}",
                    self.binary
                ))
            })?;

        if !output.status.success() {
            return Err(RecognitionError::EngineUnavailable(format!(
                "'{} --version' exited with {}",
                self.binary,
                output.status.code().unwrap_or(-1)
            )));
        }

        // Older releases print the banner on stderr.
        let banner = if output.stdout.is_empty() {
            String::from_utf8_lossy(&output.stderr).to_string()
        } else {
            String::from_utf8_lossy(&output.stdout).to_string()
        };
        let version = banner.lines().next().unwrap_or("unknown").trim().to_string();

        let workspace = tempfile::Builder::new().prefix("labelscan-ocr-").tempdir()?;

        tracing::info!(
            version = %version,
            language = %self.language,
            workspace = %workspace.path().display(),
            "Tesseract engine started"
        );

        Ok(Box::new(TesseractEngine {
            binary: self.binary.clone(),
            language: self.language.clone(),
            workspace: Some(workspace),
            next_input: AtomicU64::new(0),
        }))
    }
}

/// A launched Tesseract engine. Owns a scratch workspace that input images are
/// written to; the workspace is removed on `terminate`.
pub struct TesseractEngine {
    binary: String,
    language: String,
    workspace: Option<TempDir>,
    next_input: AtomicU64,
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    async fn recognize_image(&self, scan: &RawScan) -> Result<RecognitionResult, RecognitionError> {
        let workspace = self.workspace.as_ref().ok_or(RecognitionError::Terminated)?;
        let n = self.next_input.fetch_add(1, Ordering::Relaxed);
        let input = workspace
            .path()
            .join(format!("scan-{n}.{}", scan.format.extension()));
        tokio::fs::write(&input, &scan.bytes).await?;

        let output = Command::new(&self.binary)
            .arg(&input)
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .arg("-c")
            .arg(format!("tessedit_char_whitelist={CHARACTER_WHITELIST}"))
            .arg("tsv")
            .kill_on_drop(true)
            .output()
            .await;

        if let Err(e) = tokio::fs::remove_file(&input).await {
            tracing::debug!(file = %input.display(), error = %e, "Could not remove OCR input");
        }

        let output = output.map_err(|e| {
            RecognitionError::EngineUnavailable(format!("failed to run '{}': {e}", self.binary))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RecognitionError::OcrProcessing(format!(
                "tesseract exited with {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        let tsv = String::from_utf8_lossy(&output.stdout);
        let words = parse_tsv_words(&tsv);
        let result = RecognitionResult {
            text: assemble_text(&words),
            confidence: mean_confidence(&words),
        };

        tracing::debug!(
            file = %scan.filename,
            words = words.len(),
            confidence = result.confidence,
            "Image recognized"
        );
        Ok(result)
    }

    async fn terminate(&mut self) -> Result<(), RecognitionError> {
        if let Some(workspace) = self.workspace.take() {
            workspace.close()?;
        }
        Ok(())
    }
}

/// Parse Tesseract TSV output into words.
/// TSV columns: level page_num block_num par_num line_num word_num left top width height conf text
/// Level 5 = individual word entries.
pub fn parse_tsv_words(tsv: &str) -> Vec<OcrWord> {
    let mut words = Vec::new();

    for line in tsv.lines().skip(1) {
        // Skip header row
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }

        let level: u32 = match fields[0].parse() {
            Ok(l) => l,
            Err(_) => continue,
        };
        if level != 5 {
            continue;
        }

        let text = fields[11].trim();
        if text.is_empty() {
            continue;
        }

        // Tesseract 4+ reports fractional confidences
        let confidence: f32 = match fields[10].trim().parse() {
            Ok(c) => c,
            Err(_) => continue,
        };

        let Some(line) = parse_line_key(fields[1], fields[2], fields[3], fields[4]) else {
            continue;
        };

        words.push(OcrWord {
            text: text.to_string(),
            confidence,
            line,
        });
    }

    words
}

fn parse_line_key(page: &str, block: &str, paragraph: &str, line: &str) -> Option<LineKey> {
    Some(LineKey {
        page: page.parse().ok()?,
        block: block.parse().ok()?,
        paragraph: paragraph.parse().ok()?,
        line: line.parse().ok()?,
    })
}

/// Rebuild the page text: words on the same layout line joined by spaces,
/// one output line per layout line, in reading order.
pub fn assemble_text(words: &[OcrWord]) -> String {
    let mut text = String::new();
    let mut current: Option<LineKey> = None;

    for word in words {
        match current {
            Some(key) if key == word.line => text.push(' '),
            Some(_) => text.push('\n'),
            None => {}
        }
        text.push_str(&word.text);
        current = Some(word.line);
    }

    text
}

/// Mean of the word confidences the engine actually assigned (0 when none).
pub fn mean_confidence(words: &[OcrWord]) -> f32 {
    let scored: Vec<f32> = words
        .iter()
        .map(|w| w.confidence)
        .filter(|c| *c >= 0.0)
        .collect();
    if scored.is_empty() {
        return 0.0;
    }
    scored.iter().sum::<f32>() / scored.len() as f32
}

/// Shared counters for mock engines, readable after the engine is gone.
#[derive(Debug, Clone, Default)]
pub struct MockEngineStats {
    launches: Arc<AtomicUsize>,
    recognitions: Arc<AtomicUsize>,
    terminations: Arc<AtomicUsize>,
}

impl MockEngineStats {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn recognitions(&self) -> usize {
        self.recognitions.load(Ordering::SeqCst)
    }

    pub fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }
}

/// Mock OCR engine for unit testing without Tesseract.
#[derive(Clone)]
pub struct MockOcrEngine {
    text: String,
    confidence: f32,
    per_file: HashMap<String, String>,
    failing: HashSet<String>,
    stats: MockEngineStats,
}

impl MockOcrEngine {
    pub fn new(text: &str, confidence: f32) -> Self {
        Self {
            text: text.to_string(),
            confidence,
            per_file: HashMap::new(),
            failing: HashSet::new(),
            stats: MockEngineStats::default(),
        }
    }

    /// Return `text` for the scan named `filename` instead of the default.
    pub fn with_text_for(mut self, filename: &str, text: &str) -> Self {
        self.per_file.insert(filename.to_string(), text.to_string());
        self
    }

    /// Fail recognition of the scan named `filename`.
    pub fn failing_on(mut self, filename: &str) -> Self {
        self.failing.insert(filename.to_string());
        self
    }

    pub fn stats(&self) -> MockEngineStats {
        self.stats.clone()
    }
}

#[async_trait]
impl OcrEngine for MockOcrEngine {
    async fn recognize_image(&self, scan: &RawScan) -> Result<RecognitionResult, RecognitionError> {
        self.stats.recognitions.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(&scan.filename) {
            return Err(RecognitionError::OcrProcessing(format!(
                "unreadable image: {}",
                scan.filename
            )));
        }
        let text = self
            .per_file
            .get(&scan.filename)
            .cloned()
            .unwrap_or_else(|| self.text.clone());
        Ok(RecognitionResult {
            text,
            confidence: self.confidence,
        })
    }

    async fn terminate(&mut self) -> Result<(), RecognitionError> {
        self.stats.terminations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Launches clones of a template `MockOcrEngine`.
pub struct MockEngineLauncher {
    template: Option<MockOcrEngine>,
    stats: MockEngineStats,
}

impl MockEngineLauncher {
    pub fn new(template: MockOcrEngine) -> Self {
        let stats = template.stats();
        Self {
            template: Some(template),
            stats,
        }
    }

    /// A launcher whose engine can never be started.
    pub fn unavailable() -> Self {
        Self {
            template: None,
            stats: MockEngineStats::default(),
        }
    }

    pub fn stats(&self) -> MockEngineStats {
        self.stats.clone()
    }
}

#[async_trait]
impl EngineLauncher for MockEngineLauncher {
    async fn launch(&self) -> Result<Box<dyn OcrEngine>, RecognitionError> {
        self.stats.launches.fetch_add(1, Ordering::SeqCst);
        match &self.template {
            Some(engine) => Ok(Box::new(engine.clone())),
            None => Err(RecognitionError::EngineUnavailable(
                "mock engine unavailable".into(),
            )),
        }
    }
}
