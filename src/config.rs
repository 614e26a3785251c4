//! Service configuration from environment variables (`.env` is loaded first).

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};

use crate::ocr::OcrProviderKind;

/// Value shipped in `.env.example`; treated as unset.
const PLACEHOLDER_API_KEY: &str = "your_openai_api_key_here";

const DEFAULT_PORT: u16 = 3001;
const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MAX_FILE_SIZE: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// `None` when unset, empty, or the placeholder.
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_api_url: String,
    pub max_file_size: usize,
    pub upload_dir: PathBuf,
    pub data_dir: PathBuf,
    pub ocr_provider: OcrProviderKind,
    pub tesseract_path: String,
    pub tesseract_lang: String,
    pub mistral_api_key: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let secret = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match lookup("PORT") {
            Some(v) => v.trim().parse().with_context(|| format!("Invalid PORT: {:?}", v))?,
            None => DEFAULT_PORT,
        };

        let max_file_size = match lookup("MAX_FILE_SIZE") {
            Some(v) => v
                .trim()
                .parse()
                .with_context(|| format!("Invalid MAX_FILE_SIZE: {:?}", v))?,
            None => DEFAULT_MAX_FILE_SIZE,
        };

        let provider_name = var("OCR_PROVIDER", OcrProviderKind::Tesseract.as_str());
        let ocr_provider = OcrProviderKind::from_str(provider_name.trim())
            .ok_or_else(|| anyhow!("Unknown OCR_PROVIDER: {:?}. Available: tesseract, mistral_ocr", provider_name))?;

        let mistral_api_key = secret("MISTRAL_API_KEY");
        if ocr_provider == OcrProviderKind::MistralOcr && mistral_api_key.is_none() {
            anyhow::bail!("MISTRAL_API_KEY not set (required by OCR_PROVIDER=mistral_ocr)");
        }

        Ok(Self {
            port,
            openai_api_key: secret("OPENAI_API_KEY").filter(|k| k != PLACEHOLDER_API_KEY),
            openai_model: var("OPENAI_MODEL", DEFAULT_MODEL),
            openai_api_url: var("OPENAI_API_URL", DEFAULT_API_URL),
            max_file_size,
            upload_dir: PathBuf::from(var("UPLOAD_DIR", "./uploads")),
            data_dir: PathBuf::from(var("DATA_DIR", "./data")),
            ocr_provider,
            tesseract_path: var("TESSERACT_PATH", "tesseract"),
            tesseract_lang: var("TESSERACT_LANG", "eng"),
            mistral_api_key,
        })
    }

    pub fn has_vision_credential(&self) -> bool {
        self.openai_api_key.is_some()
    }
}
