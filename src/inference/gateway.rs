use std::{sync::Arc, time::Duration};

use tokio::time::{timeout, Instant};

use super::backend::{MediaResolution, ReasoningBackend, ReasoningReply, ReasoningRequest};
use super::prompt::{estimate_video_tokens, user_prompt, SYSTEM_PROMPT};
use super::InferenceError;
use crate::actions::ScreenInfo;
use crate::capture::container::{header_hex, looks_like_mp4, MIN_CONTAINER_BYTES};
use crate::models::{status::truncate_chars, Clip, InferenceResult};
use crate::settings::AppConfig;

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

pub const CAPTURE_FAILED: &str = "Capture failed: empty or corrupt video";
pub const API_TIMEOUT: &str = "API timeout";
pub const NO_RESPONSE: &str = "No response from model";
pub const MAX_RETRIES_EXCEEDED: &str = "Max retries exceeded";
const ERROR_DETAIL_CHARS: usize = 200;

/// Delay before retry `attempt` (0-based) after a rate limit: `base * 2^(attempt+1)`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt + 1))
}

/// Wraps a [`ReasoningBackend`] with pre-flight checks, timeout, retry and
/// response validation. [`analyze`](Self::analyze) always produces a result.
#[derive(Clone)]
pub struct InferenceGateway {
    backend: Arc<dyn ReasoningBackend>,
    backoff_base: Duration,
}

impl InferenceGateway {
    pub fn new(backend: Arc<dyn ReasoningBackend>) -> Self {
        Self {
            backend,
            backoff_base: Duration::from_secs(1),
        }
    }

    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    pub async fn analyze(
        &self,
        clip: &Clip,
        config: &AppConfig,
        screen: &ScreenInfo,
        history: Option<&InferenceResult>,
    ) -> InferenceResult {
        let valid_mp4 = looks_like_mp4(&clip.bytes);
        let est_tokens = estimate_video_tokens(
            config.capture_duration,
            config.capture_fps,
            &config.media_resolution,
        );
        log_info!(
            "Gemini request: model={}, video={}KB, fps={}, res={}, ~{} video tokens, valid_mp4={}, header={}, screen={}x{}+{}+{}",
            config.model,
            clip.len() / 1024,
            config.capture_fps,
            config.media_resolution,
            est_tokens,
            valid_mp4,
            header_hex(&clip.bytes),
            screen.real_width,
            screen.real_height,
            screen.offset_x,
            screen.offset_y
        );

        if clip.len() < MIN_CONTAINER_BYTES || !valid_mp4 {
            log_error!(
                "Skipping Gemini call: video too small or invalid ({} bytes, valid={})",
                clip.len(),
                valid_mp4
            );
            return InferenceResult::synthetic(CAPTURE_FAILED);
        }

        let request = ReasoningRequest {
            api_key: &config.gemini_api_key,
            model: &config.model,
            clip,
            fps: config.capture_fps,
            system_prompt: SYSTEM_PROMPT,
            prompt: user_prompt(history, &config.game_context),
            temperature: config.temperature,
            media_resolution: MediaResolution::from_config(&config.media_resolution),
        };

        let retries = config.max_retries;
        let limit = config.request_timeout();
        for attempt in 0..=retries {
            let started = Instant::now();
            match timeout(limit, self.backend.generate(&request)).await {
                Ok(Ok(reply)) => {
                    log_info!("Gemini responded in {}ms", started.elapsed().as_millis());
                    return interpret(reply);
                }
                Ok(Err(InferenceError::RateLimited(detail))) if attempt < retries => {
                    let wait = backoff_delay(self.backoff_base, attempt);
                    log_warn!(
                        "Rate limited ({}), retrying in {:?} (attempt {})",
                        truncate_chars(&detail, ERROR_DETAIL_CHARS),
                        wait,
                        attempt + 1
                    );
                    tokio::time::sleep(wait).await;
                }
                Ok(Err(InferenceError::Timeout(_))) | Err(_) => {
                    log_error!(
                        "Gemini API timed out after {:?} (attempt {})",
                        limit,
                        attempt + 1
                    );
                    if attempt >= retries {
                        return InferenceResult::synthetic(API_TIMEOUT);
                    }
                }
                Ok(Err(err)) => {
                    log_error!("Gemini API error: {err}");
                    return api_error(&err.to_string());
                }
            }
        }

        InferenceResult::synthetic(MAX_RETRIES_EXCEEDED)
    }
}

fn api_error(detail: &str) -> InferenceResult {
    InferenceResult::synthetic(format!(
        "API error: {}",
        truncate_chars(detail, ERROR_DETAIL_CHARS)
    ))
}

fn interpret(reply: ReasoningReply) -> InferenceResult {
    if let Some(parsed) = reply.parsed {
        log::debug!("Parsed response: {parsed:?}");
        return parsed;
    }
    match reply.text.filter(|text| !text.trim().is_empty()) {
        Some(text) => {
            log_info!("Falling back to text parse, text length={}", text.len());
            parse_result_text(&text).unwrap_or_else(|err| {
                log_error!("Unparseable model response: {err}");
                api_error(&err.to_string())
            })
        }
        None => {
            log_warn!("Gemini returned empty response");
            InferenceResult::synthetic(NO_RESPONSE)
        }
    }
}

/// Parse a raw model payload as an [`InferenceResult`], tolerating code
/// fences or prose around the JSON object.
pub fn parse_result_text(text: &str) -> Result<InferenceResult, serde_json::Error> {
    let trimmed = text.trim();
    match serde_json::from_str(trimmed) {
        Ok(result) => Ok(result),
        Err(err) => match (trimmed.find('{'), trimmed.rfind('}')) {
            (Some(start), Some(end)) if start < end => serde_json::from_str(&trimmed[start..=end]),
            _ => Err(err),
        },
    }
}
