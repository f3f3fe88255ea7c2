use super::pdf::recognize_pdf;
use super::types::{EngineLauncher, OcrEngine, RecognitionResult};
use super::RecognitionError;
use crate::pipeline::import::{RawScan, ScanFormat};

/// Scoped owner of the OCR engine for one upload session.
///
/// The engine is launched on the first image, reused for every later one and
/// released exactly once by `terminate`. PDFs never start the engine.
pub struct RecognizerSession {
    launcher: Box<dyn EngineLauncher>,
    engine: Option<Box<dyn OcrEngine>>,
    terminated: bool,
}

impl RecognizerSession {
    pub fn new(launcher: Box<dyn EngineLauncher>) -> Self {
        Self {
            launcher,
            engine: None,
            terminated: false,
        }
    }

    pub async fn recognize(&mut self, scan: &RawScan) -> Result<RecognitionResult, RecognitionError> {
        if self.terminated {
            return Err(RecognitionError::Terminated);
        }

        match scan.format {
            ScanFormat::Pdf => recognize_pdf(scan.bytes.clone()).await,
            ScanFormat::Jpeg | ScanFormat::Png => {
                if self.engine.is_none() {
                    tracing::info!("Starting OCR engine");
                    self.engine = Some(self.launcher.launch().await?);
                }
                let Some(engine) = self.engine.as_ref() else {
                    return Err(RecognitionError::EngineUnavailable(
                        "engine slot empty after launch".into(),
                    ));
                };
                engine.recognize_image(scan).await
            }
        }
    }

    /// True while a launched engine is held.
    pub fn is_engine_running(&self) -> bool {
        self.engine.is_some()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Release the engine. Later calls are no-ops; later `recognize` calls fail.
    pub async fn terminate(&mut self) {
        if self.terminated {
            tracing::debug!("Recognizer session already terminated");
            return;
        }
        self.terminated = true;

        if let Some(mut engine) = self.engine.take() {
            match engine.terminate().await {
                Ok(()) => tracing::info!("OCR engine released"),
                Err(e) => tracing::warn!(error = %e, "OCR engine did not shut down cleanly"),
            }
        }
    }
}

impl Drop for RecognizerSession {
    fn drop(&mut self) {
        if self.engine.is_some() {
            tracing::warn!("Recognizer session dropped without terminate, engine released on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extraction::ocr::{MockEngineLauncher, MockOcrEngine};

    fn png_scan(name: &str) -> RawScan {
        RawScan {
            filename: name.to_string(),
            format: ScanFormat::Png,
            bytes: vec![0x89, 0x50, 0x4E, 0x47],
        }
    }

    #[tokio::test]
    async fn engine_launched_lazily_and_reused() {
        let launcher = MockEngineLauncher::new(MockOcrEngine::new("SHIP TO", 88.0));
        let stats = launcher.stats();
        let mut session = RecognizerSession::new(Box::new(launcher));

        assert!(!session.is_engine_running());
        assert_eq!(stats.launches(), 0);

        session.recognize(&png_scan("a.png")).await.unwrap();
        session.recognize(&png_scan("b.png")).await.unwrap();
        session.recognize(&png_scan("c.png")).await.unwrap();

        assert!(session.is_engine_running());
        assert_eq!(stats.launches(), 1);
        assert_eq!(stats.recognitions(), 3);
        session.terminate().await;
    }

    #[tokio::test]
    async fn terminate_releases_exactly_once() {
        let launcher = MockEngineLauncher::new(MockOcrEngine::new("x", 50.0));
        let stats = launcher.stats();
        let mut session = RecognizerSession::new(Box::new(launcher));

        session.recognize(&png_scan("a.png")).await.unwrap();
        session.terminate().await;
        session.terminate().await;

        assert_eq!(stats.terminations(), 1);
        assert!(session.is_terminated());
        assert!(!session.is_engine_running());
    }

    #[tokio::test]
    async fn terminate_without_engine_launches_nothing() {
        let launcher = MockEngineLauncher::new(MockOcrEngine::new("x", 50.0));
        let stats = launcher.stats();
        let mut session = RecognizerSession::new(Box::new(launcher));
        session.terminate().await;
        assert_eq!(stats.launches(), 0);
        assert_eq!(stats.terminations(), 0);
    }

    #[tokio::test]
    async fn recognize_after_terminate_fails() {
        let launcher = MockEngineLauncher::new(MockOcrEngine::new("x", 50.0));
        let mut session = RecognizerSession::new(Box::new(launcher));
        session.terminate().await;
        let result = session.recognize(&png_scan("a.png")).await;
        assert!(matches!(result, Err(RecognitionError::Terminated)));
    }

    #[tokio::test]
    async fn launch_failure_is_retried_on_next_image() {
        let launcher = MockEngineLauncher::unavailable();
        let stats = launcher.stats();
        let mut session = RecognizerSession::new(Box::new(launcher));

        let first = session.recognize(&png_scan("a.png")).await;
        assert!(matches!(first, Err(RecognitionError::EngineUnavailable(_))));
        let second = session.recognize(&png_scan("b.png")).await;
        assert!(second.is_err());
        assert_eq!(stats.launches(), 2);
        assert!(!session.is_engine_running());
    }

    #[tokio::test]
    async fn pdf_does_not_start_engine() {
        let launcher = MockEngineLauncher::new(MockOcrEngine::new("x", 50.0));
        let stats = launcher.stats();
        let mut session = RecognizerSession::new(Box::new(launcher));

        let scan = RawScan {
            filename: "broken.pdf".into(),
            format: ScanFormat::Pdf,
            bytes: b"%PDF-1.4 truncated".to_vec(),
        };
        assert!(session.recognize(&scan).await.is_err());
        assert_eq!(stats.launches(), 0);
    }
}
