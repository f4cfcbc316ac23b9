use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use super::backend::{MediaResolution, ReasoningBackend, ReasoningReply, ReasoningRequest};
use super::InferenceError;
use crate::models::{status::truncate_chars, InferenceResult};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Gemini `generateContent` over REST.
pub struct GeminiBackend {
    client: Client,
    base_url: String,
}

impl GeminiBackend {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }
}

impl Default for GeminiBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReasoningBackend for GeminiBackend {
    async fn generate(&self, request: &ReasoningRequest<'_>) -> Result<ReasoningReply, InferenceError> {
        let body = request_body(request);
        let response = self
            .client
            .post(self.endpoint(request.model))
            .header("x-goog-api-key", request.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let message = format!("{} {}", status.as_u16(), truncate_chars(error_text.trim(), 500));
            return Err(if status == StatusCode::TOO_MANY_REQUESTS {
                InferenceError::RateLimited(message)
            } else {
                InferenceError::Other(message)
            });
        }

        let json: Value = response.json().await?;
        Ok(reply_from_response(&json))
    }
}

pub fn request_body(request: &ReasoningRequest<'_>) -> Value {
    let media_resolution = match request.media_resolution {
        MediaResolution::Low => "MEDIA_RESOLUTION_LOW",
        MediaResolution::Medium => "MEDIA_RESOLUTION_MEDIUM",
    };

    json!({
        "systemInstruction": {
            "parts": [{ "text": request.system_prompt }]
        },
        "contents": [{
            "role": "user",
            "parts": [
                {
                    "inlineData": {
                        "mimeType": "video/mp4",
                        "data": general_purpose::STANDARD.encode(&request.clip.bytes)
                    },
                    "videoMetadata": { "fps": request.fps }
                },
                { "text": request.prompt }
            ]
        }],
        "generationConfig": {
            "temperature": request.temperature,
            "responseMimeType": "application/json",
            "responseSchema": response_schema(),
            "mediaResolution": media_resolution,
            "thinkingConfig": { "thinkingLevel": "low" }
        }
    })
}

/// Structured-output schema mirroring `InferenceResult`.
pub fn response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "reasoning": { "type": "STRING" },
            "actions": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "action": {
                            "type": "STRING",
                            "enum": [
                                "key_press", "key_down", "key_up", "mouse_move",
                                "mouse_click", "mouse_down", "mouse_up", "wait"
                            ]
                        },
                        "key": { "type": "STRING", "nullable": true },
                        "bbox": {
                            "type": "ARRAY",
                            "items": { "type": "INTEGER" },
                            "nullable": true
                        },
                        "dx": { "type": "INTEGER", "nullable": true },
                        "dy": { "type": "INTEGER", "nullable": true },
                        "button": {
                            "type": "STRING",
                            "enum": ["left", "right", "middle"],
                            "nullable": true
                        },
                        "duration": { "type": "NUMBER", "nullable": true }
                    },
                    "required": ["action"]
                }
            }
        },
        "required": ["reasoning", "actions"]
    })
}

/// Pull the answer text out of a `generateContent` response. Thought parts
/// are skipped.
pub fn reply_from_response(json: &Value) -> ReasoningReply {
    let text: String = json
        .get("candidates")
        .and_then(|v| v.get(0))
        .and_then(|v| v.get("content"))
        .and_then(|v| v.get("parts"))
        .and_then(|v| v.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter(|part| !part.get("thought").and_then(Value::as_bool).unwrap_or(false))
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        if let Some(reason) = json
            .get("promptFeedback")
            .and_then(|v| v.get("blockReason"))
            .and_then(Value::as_str)
        {
            log::warn!("Gemini blocked the request: {reason}");
        }
        return ReasoningReply::default();
    }

    ReasoningReply {
        parsed: serde_json::from_str::<InferenceResult>(&text).ok(),
        text: Some(text),
    }
}
