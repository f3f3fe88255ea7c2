use super::types::RecognitionResult;
use super::RecognitionError;

/// Confidence reported for text read from an embedded text layer.
pub const PDF_TEXT_LAYER_CONFIDENCE: f32 = 95.0;

/// Read the embedded text layer of a digital PDF.
///
/// Runs on the blocking pool; a panic inside the PDF parser surfaces as
/// `PdfParsing` instead of taking the session down. A PDF without any text
/// (a scanned image wrapped in PDF) is unreadable input.
pub async fn recognize_pdf(bytes: Vec<u8>) -> Result<RecognitionResult, RecognitionError> {
    let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|e| RecognitionError::PdfParsing(format!("PDF parser aborted: {e}")))?
        .map_err(|e| RecognitionError::PdfParsing(e.to_string()))?;

    let text = normalize_layout(&text);
    if text.is_empty() {
        return Err(RecognitionError::NoTextLayer);
    }

    Ok(RecognitionResult {
        text,
        confidence: PDF_TEXT_LAYER_CONFIDENCE,
    })
}

/// Trim every line and collapse runs of blank lines left by the layout engine.
fn normalize_layout(text: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for line in text.lines().map(str::trim) {
        if line.is_empty() && out.last().map_or(true, |l| l.is_empty()) {
            continue;
        }
        out.push(line);
    }
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out.join("\n")
}
