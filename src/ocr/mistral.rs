//! Mistral OCR provider (hosted OCR API, image sent inline as a data URL).

use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{OcrProvider, OcrText};
use crate::documents::image_mime_type;
use crate::error::OcrError;
use crate::schema::default_confidence;

const MISTRAL_OCR_URL: &str = "https://api.mistral.ai/v1/ocr";
const MISTRAL_OCR_MODEL: &str = "mistral-ocr-latest";


pub struct MistralOcrProvider {
    api_key: String,
    client: reqwest::Client,
}

impl MistralOcrProvider {
    pub fn new(api_key: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            api_key: api_key.into(),
            client,
        }
    }
}

#[derive(Serialize)]
struct OcrRequest {
    model: String,
    document: DocumentSource,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum DocumentSource {
    ImageUrl { image_url: String },
}

#[derive(Deserialize)]
struct OcrResponse {
    pages: Vec<MistralPage>,
}

#[derive(Deserialize)]
struct MistralPage {
    markdown: String,
}

#[async_trait::async_trait]
impl OcrProvider for MistralOcrProvider {
    fn name(&self) -> &str {
        "mistral_ocr"
    }

    async fn extract_text(&self, image: &Path) -> Result<OcrText, OcrError> {
        let data = tokio::fs::read(image).await?;
        let data_url = format!("data:{};base64,{}", image_mime_type(image), BASE64.encode(&data));

        let body = OcrRequest {
            model: MISTRAL_OCR_MODEL.to_string(),
            document: DocumentSource::ImageUrl { image_url: data_url },
        };

        info!("MistralOcrProvider: calling OCR API for {:?} ({} bytes)", image, data.len());

        let resp = self
            .client
            .post(MISTRAL_OCR_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(OcrError::Recognition(format!("Mistral OCR API error ({}): {}", status, text)));
        }

        let raw = resp.text().await?;
        debug!(
            "MistralOcrProvider: raw response ({} bytes): {}",
            raw.len(),
            raw.chars().take(500).collect::<String>()
        );

        parse_response(&raw)
    }
}

/// Page markdown joined by blank lines. The API reports no score, so the
/// confidence is the neutral default.
fn parse_response(raw: &str) -> Result<OcrText, OcrError> {
    let ocr: OcrResponse = serde_json::from_str(raw)?;
    let text = ocr
        .pages
        .into_iter()
        .map(|p| p.markdown)
        .collect::<Vec<_>>()
        .join("\n\n");
    Ok(OcrText {
        text,
        confidence: default_confidence(),
    })
}
