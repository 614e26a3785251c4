//! OpenAI-compatible chat client for vision extraction and JSON repair.

use std::path::Path;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::documents::image_mime_type;
use crate::error::{ChatError, ExtractionError, RepairError};
use crate::schema::RawTimetable;

const MAX_TOKENS: u32 = 4096;
const TEMPERATURE: f64 = 0.1;

const EXTRACTION_PROMPT: &str = r#"You are an expert at extracting structured timetable data from images and documents.

Your task is to analyze the provided timetable image and extract ALL schedule information into a structured JSON format.

CRITICAL RULES:
1. Extract EVERY time block you can see
2. Convert all times to HH:MM format (24-hour)
3. Identify the subject/class name for each block
4. Assign a confidence score (0.0-1.0) based on how clearly you can read each entry
5. If a day has no classes, include it with an empty blocks array
6. Preserve the exact day names as shown (Monday, Tuesday, etc.)

OUTPUT FORMAT (JSON):
{
  "timetableId": "00000000-0000-0000-0000-000000000000",
  "days": [
    {
      "day": "Monday",
      "blocks": [
        {
          "start": "08:55",
          "end": "10:10",
          "subject": "Mathematics",
          "notes": "",
          "confidence": 0.95
        }
      ]
    }
  ]
}

EXAMPLE INPUT: A timetable showing Monday with Math at 9:00-10:00 and English at 10:15-11:15

EXAMPLE OUTPUT:
{
  "timetableId": "00000000-0000-0000-0000-000000000000",
  "days": [
    {
      "day": "Monday",
      "blocks": [
        {
          "start": "09:00",
          "end": "10:00",
          "subject": "Mathematics",
          "notes": "",
          "confidence": 0.98
        },
        {
          "start": "10:15",
          "end": "11:15",
          "subject": "English",
          "notes": "",
          "confidence": 0.97
        }
      ]
    }
  ]
}

Now analyze the provided timetable image and return ONLY the JSON output, no other text."#;

const REPAIR_SCHEMA: &str = r#"Required schema:
{
  "timetableId": "uuid",
  "days": [
    {
      "day": "Monday|Tuesday|Wednesday|Thursday|Friday|Saturday|Sunday",
      "blocks": [
        {
          "start": "HH:MM",
          "end": "HH:MM",
          "subject": "string",
          "notes": "string",
          "confidence": 0.0-1.0
        }
      ]
    }
  ]
}

Return ONLY the corrected JSON, no other text."#;

fn repair_prompt(invalid_json: &str) -> String {
    format!(
        "The following JSON is invalid or doesn't match the required schema. Please fix it and return a valid timetable JSON:\n\n{}\n\n{}",
        invalid_json, REPAIR_SCHEMA
    )
}

/// Image in, raw (possibly malformed) timetable out.
#[async_trait]
pub trait VisionExtractor: Send + Sync {
    async fn extract_from_image(&self, image: &Path) -> Result<RawTimetable, ExtractionError>;
}

/// One-shot correction of a candidate that failed validation.
#[async_trait]
pub trait JsonRepairer: Send + Sync {
    async fn repair_json(&self, invalid_json: &str) -> Result<RawTimetable, RepairError>;
}

/// Chat completions client.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
    model: String,
    api_url: String,
}

impl LlmClient {
    /// `None` when no usable credential is configured.
    pub fn from_config(config: &AppConfig, client: Client) -> Option<Self> {
        let api_key = config.openai_api_key.clone()?;
        Some(Self {
            client,
            api_key,
            model: config.openai_model.clone(),
            api_url: config.openai_api_url.clone(),
        })
    }

    async fn chat(&self, messages: Vec<Message>) -> Result<Option<String>, ChatError> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        };
        debug!("Sending chat request: model={}", request.model);

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(ChatError::Send)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Status { status, body });
        }

        let response: ChatCompletionResponse = response.json().await.map_err(ChatError::Decode)?;

        if let Some(usage) = &response.usage {
            info!(
                "LLM response: {} tokens (prompt: {}, completion: {})",
                usage.total_tokens, usage.prompt_tokens, usage.completion_tokens
            );
        }

        Ok(response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.is_empty()))
    }
}

#[async_trait]
impl VisionExtractor for LlmClient {
    async fn extract_from_image(&self, image: &Path) -> Result<RawTimetable, ExtractionError> {
        info!("Extracting timetable from image using LLM: {:?}", image);

        let data = tokio::fs::read(image).await?;
        let message = Message::user_with_image(EXTRACTION_PROMPT, image_mime_type(image), &data);

        let content = self
            .chat(vec![message])
            .await
            .map_err(|e| {
                error!("LLM extraction failed: {}", e);
                ExtractionError::Request(e)
            })?
            .ok_or(ExtractionError::EmptyResponse)?;

        info!("LLM extraction completed successfully");

        let json = extract_json_object(&content).ok_or(ExtractionError::NoJson)?;
        Ok(parse_raw_timetable(json)?)
    }
}

#[async_trait]
impl JsonRepairer for LlmClient {
    async fn repair_json(&self, invalid_json: &str) -> Result<RawTimetable, RepairError> {
        info!("Attempting to repair invalid JSON using LLM...");

        let content = self
            .chat(vec![Message::user(repair_prompt(invalid_json))])
            .await
            .map_err(|e| {
                error!("JSON repair failed: {}", e);
                RepairError::Request(e)
            })?
            .unwrap_or_default();

        let json = extract_json_object(&content).ok_or(RepairError::NoJson)?;
        Ok(parse_raw_timetable(json)?)
    }
}

/// Outermost `{ ... }` span of a model reply, ignoring code fences and prose.
pub fn extract_json_object(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (end > start).then(|| &content[start..=end])
}

/// Parse a model-produced candidate. The nil UUID is the placeholder the
/// prompt shows, so it is treated as "no id".
pub fn parse_raw_timetable(json: &str) -> Result<RawTimetable, serde_json::Error> {
    let mut raw: RawTimetable = serde_json::from_str(json)?;
    if raw
        .timetable_id
        .as_deref()
        .and_then(|id| Uuid::parse_str(id).ok())
        .is_some_and(|id| id.is_nil())
    {
        raw.timetable_id = None;
    }
    Ok(raw)
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

// ============================================================================
// Message types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(content.into()),
        }
    }

    /// A user message with a prompt and one inline base64 image.
    pub fn user_with_image(text: impl Into<String>, mime_type: &str, image_data: &[u8]) -> Self {
        let data_url = format!("data:{};base64,{}", mime_type, BASE64.encode(image_data));
        Self {
            role: Role::User,
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: text.into() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl { url: data_url },
                },
            ]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_from_fenced_reply() {
        let reply = "Here you go:\n```json\n{\"days\": [{\"day\": \"Monday\", \"blocks\": []}]}\n```\nLet me know!";
        assert_eq!(
            extract_json_object(reply),
            Some("{\"days\": [{\"day\": \"Monday\", \"blocks\": []}]}")
        );
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("} backwards {"), None);
    }

    #[test]
    fn test_parse_drops_placeholder_id() {
        let raw = parse_raw_timetable(
            r#"{"timetableId": "00000000-0000-0000-0000-000000000000", "days": [{"day": "Monday", "blocks": [{"start": "9:00", "end": "10:00", "subject": "maths", "confidence": 0.9}]}]}"#,
        )
        .unwrap();
        assert_eq!(raw.timetable_id, None);
        assert_eq!(raw.days[0].blocks[0].start.as_deref(), Some("9:00"));

        let kept = parse_raw_timetable(r#"{"timetableId": "3f2b8c1e-9d4a-4e6b-8a7c-1b2d3e4f5a6b", "days": []}"#).unwrap();
        assert_eq!(kept.timetable_id.as_deref(), Some("3f2b8c1e-9d4a-4e6b-8a7c-1b2d3e4f5a6b"));
    }

    #[test]
    fn test_parse_rejects_non_json() {
        assert!(parse_raw_timetable("{not json}").is_err());
    }

    #[test]
    fn test_image_message_shape() {
        let msg = Message::user_with_image("prompt", "image/jpeg", b"abc");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"][0]["type"], "text");
        assert_eq!(json["content"][1]["type"], "image_url");
        assert_eq!(json["content"][1]["image_url"]["url"], "data:image/jpeg;base64,YWJj");
    }

    #[test]
    fn test_repair_prompt_embeds_candidate() {
        let prompt = repair_prompt("{\"days\": 5}");
        assert!(prompt.contains("{\"days\": 5}"));
        assert!(prompt.ends_with("Return ONLY the corrected JSON, no other text."));
    }

    #[test]
    fn test_errors_keep_their_cause() {
        use std::error::Error as _;

        let err = ExtractionError::from(parse_raw_timetable("{not json}").unwrap_err());
        assert!(matches!(err, ExtractionError::Parse(_)));
        assert!(err.source().is_some());

        let err = RepairError::from(ChatError::Status {
            status: reqwest::StatusCode::TOO_MANY_REQUESTS,
            body: "slow down".to_string(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.source().unwrap().to_string().contains("slow down"));
    }

    #[tokio::test]
    async fn test_transport_failure_keeps_reqwest_error() {
        use std::error::Error as _;

        let client = LlmClient {
            client: Client::new(),
            api_key: "sk-test".to_string(),
            model: "gpt-4o".to_string(),
            api_url: "not a url".to_string(),
        };
        let err = client.repair_json("{}").await.unwrap_err();

        let RepairError::Request(chat) = &err else {
            panic!("expected request error, got {err:?}");
        };
        assert!(matches!(chat, ChatError::Send(_)));
        let cause = chat.source().unwrap();
        assert!(cause.downcast_ref::<reqwest::Error>().is_some());
    }

    #[test]
    fn test_request_body() {
        let req = ChatCompletionRequest {
            model: "gpt-4o".to_string(),
            messages: vec![Message::user("hi")],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["max_tokens"], 4096);
        assert_eq!(json["messages"][0]["content"], "hi");
    }
}
