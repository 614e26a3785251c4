//! OCR provider abstraction.
//!
//! Defines the [`OcrProvider`] trait so the local Tesseract engine and the
//! hosted Mistral OCR API can be swapped via `OCR_PROVIDER`.

pub mod mistral;
pub mod tesseract;

use std::path::Path;

use crate::error::OcrError;

/// Recognized text with an overall confidence in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrText {
    pub text: String,
    pub confidence: f64,
}

#[async_trait::async_trait]
pub trait OcrProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn extract_text(&self, image: &Path) -> Result<OcrText, OcrError>;

    /// Tear down any engine held by the provider. Called once on shutdown.
    async fn release(&self) {}
}

/// Known provider identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OcrProviderKind {
    Tesseract,
    MistralOcr,
}

impl OcrProviderKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "tesseract" => Some(Self::Tesseract),
            "mistral_ocr" => Some(Self::MistralOcr),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tesseract => "tesseract",
            Self::MistralOcr => "mistral_ocr",
        }
    }
}
