use std::path::PathBuf;
use std::time::Duration;

/// Application-level constants
pub const APP_NAME: &str = "Labelscan";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Chat-completion endpoint used when `LABELSCAN_API_URL` is not set.
pub const DEFAULT_API_URL: &str = "https://api.mistral.ai/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "mistral-small-latest";

/// Near-deterministic sampling for structured extraction.
pub const EXTRACTION_TEMPERATURE: f32 = 0.1;
/// Output budget for a single extraction call.
pub const EXTRACTION_MAX_TOKENS: u32 = 1000;

/// Uploads larger than this are dropped before they reach the pipeline.
pub const MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;

/// Get the application data directory.
/// Falls back to the working directory when the platform has no data dir.
pub fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("labelscan")
}

/// Default location of the document database.
pub fn default_db_path() -> PathBuf {
    app_data_dir().join("labelscan.db")
}

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "labelscan_lib=info,labelscan=info,warn"
}

/// Runtime settings read from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Bearer credential for the extraction endpoint. `None` disables remote extraction.
    pub api_key: Option<String>,
    pub api_url: String,
    pub model: String,
    /// `None` leaves the HTTP transport default in place.
    pub ai_timeout: Option<Duration>,
    pub tesseract_path: String,
    pub ocr_language: String,
    pub db_path: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: DEFAULT_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            ai_timeout: None,
            tesseract_path: "tesseract".to_string(),
            ocr_language: "eng".to_string(),
            db_path: default_db_path(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (environment in production, a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let ai_timeout = non_empty("LABELSCAN_AI_TIMEOUT_SECS").and_then(|v| {
            match v.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Some(Duration::from_secs(secs)),
                _ => {
                    tracing::warn!(value = %v, "Ignoring invalid LABELSCAN_AI_TIMEOUT_SECS");
                    None
                }
            }
        });

        Self {
            api_key: non_empty("LABELSCAN_API_KEY").or_else(|| non_empty("MISTRAL_API_KEY")),
            api_url: non_empty("LABELSCAN_API_URL").unwrap_or(defaults.api_url),
            model: non_empty("LABELSCAN_MODEL").unwrap_or(defaults.model),
            ai_timeout,
            tesseract_path: non_empty("LABELSCAN_TESSERACT").unwrap_or(defaults.tesseract_path),
            ocr_language: non_empty("LABELSCAN_OCR_LANG").unwrap_or(defaults.ocr_language),
            db_path: non_empty("LABELSCAN_DB")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn app_data_dir_ends_with_app_folder() {
        assert!(app_data_dir().ends_with("labelscan"));
        assert!(default_db_path().starts_with(app_data_dir()));
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = AppConfig::from_lookup(|_| None);
        assert!(config.api_key.is_none());
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert!(config.ai_timeout.is_none());
        assert_eq!(config.tesseract_path, "tesseract");
        assert_eq!(config.ocr_language, "eng");
    }

    #[test]
    fn labelscan_key_takes_precedence_over_mistral_key() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("LABELSCAN_API_KEY", "primary"),
            ("MISTRAL_API_KEY", "secondary"),
        ]));
        assert_eq!(config.api_key.as_deref(), Some("primary"));

        let config = AppConfig::from_lookup(lookup_from(&[("MISTRAL_API_KEY", "secondary")]));
        assert_eq!(config.api_key.as_deref(), Some("secondary"));
    }

    #[test]
    fn blank_values_are_ignored() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("LABELSCAN_API_KEY", "   "),
            ("LABELSCAN_MODEL", ""),
        ]));
        assert!(config.api_key.is_none());
        assert_eq!(config.model, DEFAULT_MODEL);
    }

    #[test]
    fn timeout_parses_positive_seconds_only() {
        let config = AppConfig::from_lookup(lookup_from(&[("LABELSCAN_AI_TIMEOUT_SECS", "30")]));
        assert_eq!(config.ai_timeout, Some(Duration::from_secs(30)));

        let config = AppConfig::from_lookup(lookup_from(&[("LABELSCAN_AI_TIMEOUT_SECS", "0")]));
        assert!(config.ai_timeout.is_none());

        let config = AppConfig::from_lookup(lookup_from(&[("LABELSCAN_AI_TIMEOUT_SECS", "soon")]));
        assert!(config.ai_timeout.is_none());
    }

    #[test]
    fn db_path_override() {
        let config = AppConfig::from_lookup(lookup_from(&[("LABELSCAN_DB", "/tmp/custom.db")]));
        assert_eq!(config.db_path, PathBuf::from("/tmp/custom.db"));
    }

    #[test]
    fn upload_limit_is_five_mebibytes() {
        assert_eq!(MAX_UPLOAD_BYTES, 5_242_880);
    }
}
