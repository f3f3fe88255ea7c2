use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::ImportError;
use crate::config::MAX_UPLOAD_BYTES;

/// Upload formats the pipeline accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanFormat {
    Jpeg,
    Png,
    Pdf,
}

impl ScanFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Pdf => "application/pdf",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Pdf => "pdf",
        }
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "application/pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Self::Jpeg | Self::Png)
    }
}

impl fmt::Display for ScanFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime_type())
    }
}

/// Detect format from magic bytes.
pub fn detect_format(bytes: &[u8]) -> Option<ScanFormat> {
    match bytes {
        // %PDF
        [0x25, 0x50, 0x44, 0x46, ..] => Some(ScanFormat::Pdf),
        [0xFF, 0xD8, 0xFF, ..] => Some(ScanFormat::Jpeg),
        [0x89, 0x50, 0x4E, 0x47, ..] => Some(ScanFormat::Png),
        _ => None,
    }
}

/// An admitted upload. Immutable once built; dropped after recognition.
#[derive(Clone)]
pub struct RawScan {
    pub filename: String,
    pub format: ScanFormat,
    pub bytes: Vec<u8>,
}

impl RawScan {
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }
}

impl fmt::Debug for RawScan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawScan")
            .field("filename", &self.filename)
            .field("format", &self.format)
            .field("size_bytes", &self.size_bytes())
            .finish()
    }
}

/// Admission check for an in-memory upload.
///
/// The type declared by the file name must be jpeg, png or pdf, the content
/// must carry the same type's magic bytes, and the payload must fit the
/// upload limit.
pub fn admit_bytes(filename: &str, bytes: Vec<u8>) -> Result<RawScan, ImportError> {
    check_size(bytes.len() as u64)?;

    let declared_mime = mime_guess::from_path(filename)
        .first_raw()
        .unwrap_or("application/octet-stream");
    let declared = ScanFormat::from_mime(declared_mime)
        .ok_or_else(|| ImportError::UnsupportedFormat(declared_mime.to_string()))?;

    let detected = detect_format(&bytes)
        .ok_or_else(|| ImportError::UnsupportedFormat("unrecognized file content".into()))?;

    if declared != detected {
        return Err(ImportError::FormatMismatch { declared, detected });
    }

    Ok(RawScan {
        filename: sanitize_filename(filename),
        format: detected,
        bytes,
    })
}

/// Admission check for a file on disk. Oversized files are rejected before
/// being read.
pub fn admit_path(path: &Path) -> Result<RawScan, ImportError> {
    let metadata = std::fs::metadata(path)?;
    check_size(metadata.len())?;

    let bytes = std::fs::read(path)?;
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document");
    admit_bytes(filename, bytes)
}

/// Admit every path that passes; rejected files are dropped without error.
pub fn admit_paths<P: AsRef<Path>>(paths: &[P]) -> Vec<RawScan> {
    paths
        .iter()
        .filter_map(|path| {
            let path = path.as_ref();
            match admit_path(path) {
                Ok(scan) => Some(scan),
                Err(e) => {
                    tracing::debug!(file = %path.display(), reason = %e, "Upload not admitted");
                    None
                }
            }
        })
        .collect()
}

fn check_size(size: u64) -> Result<(), ImportError> {
    if size > MAX_UPLOAD_BYTES {
        return Err(ImportError::FileTooLarge {
            size_mb: size as f64 / (1024.0 * 1024.0),
            max_mb: MAX_UPLOAD_BYTES / (1024 * 1024),
        });
    }
    Ok(())
}

/// Sanitize a filename: strip path components, limit length.
pub fn sanitize_filename(original: &str) -> String {
    let name = Path::new(original)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document");

    let clean: String = name
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | '\0'))
        .take(255)
        .collect();

    if clean.is_empty() {
        "document".to_string()
    } else {
        clean
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
    const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
    const PDF: &[u8] = b"%PDF-1.4 minimal";

    #[test]
    fn detect_from_magic_bytes() {
        assert_eq!(detect_format(JPEG), Some(ScanFormat::Jpeg));
        assert_eq!(detect_format(PNG), Some(ScanFormat::Png));
        assert_eq!(detect_format(PDF), Some(ScanFormat::Pdf));
        assert_eq!(detect_format(&[0x4D, 0x5A, 0x90, 0x00]), None);
        assert_eq!(detect_format(&[]), None);
    }

    #[test]
    fn admits_accepted_types() {
        let scan = admit_bytes("label.jpg", JPEG.to_vec()).unwrap();
        assert_eq!(scan.format, ScanFormat::Jpeg);
        assert_eq!(scan.mime_type(), "image/jpeg");
        assert_eq!(scan.size_bytes(), JPEG.len() as u64);

        assert_eq!(admit_bytes("label.JPEG", JPEG.to_vec()).unwrap().format, ScanFormat::Jpeg);
        assert_eq!(admit_bytes("scan.png", PNG.to_vec()).unwrap().format, ScanFormat::Png);
        assert_eq!(admit_bytes("doc.pdf", PDF.to_vec()).unwrap().format, ScanFormat::Pdf);
    }

    #[test]
    fn rejects_other_types() {
        let result = admit_bytes("photo.tiff", vec![0x49, 0x49, 0x2A, 0x00]);
        assert!(matches!(result, Err(ImportError::UnsupportedFormat(_))));

        let result = admit_bytes("notes.txt", b"SHIP TO: Jane".to_vec());
        assert!(matches!(result, Err(ImportError::UnsupportedFormat(_))));

        let result = admit_bytes("no_extension", JPEG.to_vec());
        assert!(matches!(result, Err(ImportError::UnsupportedFormat(_))));
    }

    #[test]
    fn rejects_content_that_does_not_match_name() {
        let result = admit_bytes("misleading.pdf", JPEG.to_vec());
        assert!(matches!(
            result,
            Err(ImportError::FormatMismatch {
                declared: ScanFormat::Pdf,
                detected: ScanFormat::Jpeg
            })
        ));

        let result = admit_bytes("garbage.png", vec![0u8; 32]);
        assert!(matches!(result, Err(ImportError::UnsupportedFormat(_))));
    }

    #[test]
    fn size_limit_is_inclusive() {
        let mut at_limit = PNG.to_vec();
        at_limit.resize(MAX_UPLOAD_BYTES as usize, 0);
        assert!(admit_bytes("big.png", at_limit).is_ok());

        let mut over = PNG.to_vec();
        over.resize(MAX_UPLOAD_BYTES as usize + 1, 0);
        assert!(matches!(
            admit_bytes("big.png", over),
            Err(ImportError::FileTooLarge { max_mb: 5, .. })
        ));
    }

    #[test]
    fn oversized_file_rejected_before_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.png");
        let file = std::fs::File::create(&path).unwrap();
        file.set_len(MAX_UPLOAD_BYTES + 1).unwrap();
        assert!(matches!(admit_path(&path), Err(ImportError::FileTooLarge { .. })));
    }

    #[test]
    fn admit_paths_drops_rejected_files() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("a.png");
        let bad = dir.path().join("b.txt");
        let missing = dir.path().join("c.jpg");
        std::fs::write(&good, PNG).unwrap();
        std::fs::write(&bad, "hello").unwrap();

        let scans = admit_paths(&[good, bad, missing]);
        assert_eq!(scans.len(), 1);
        assert_eq!(scans[0].filename, "a.png");
    }

    #[test]
    fn debug_output_omits_payload() {
        let scan = admit_bytes("a.png", PNG.to_vec()).unwrap();
        let rendered = format!("{scan:?}");
        assert!(rendered.contains("a.png"));
        assert!(rendered.contains("size_bytes"));
        assert!(!rendered.contains("bytes: ["));
    }

    #[test]
    fn sanitize_path_traversal() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("normal_file.pdf"), "normal_file.pdf");
        assert_eq!(sanitize_filename(""), "document");
        assert_eq!(sanitize_filename("file\0name.pdf"), "filename.pdf");
    }

    #[test]
    fn admitted_name_is_sanitized() {
        let scan = admit_bytes("../uploads/label.png", PNG.to_vec()).unwrap();
        assert_eq!(scan.filename, "label.png");
    }
}
