//! Gemini gateway.
//!
//! Implements the three tour stages against the Gemini REST
//! `models/{model}:generateContent` endpoint:
//!
//! - **Identify**: image inline as base64 plus an instruction, with a JSON
//!   response schema for [`LandmarkInfo`].
//! - **History**: a plain-text prompt with the `googleSearch` tool enabled;
//!   citations come from the candidate's grounding metadata.
//! - **Speech**: a narration prompt with audio-only output and a prebuilt voice.
//!
//! # Examples
//!
//! ```rust,no_run
//! use geonarrator::gateway::{GeminiConfig, GeminiGateway, TourGateway};
//!
//! # async fn example() -> geonarrator::Result<()> {
//! let gateway = GeminiGateway::new(GeminiConfig::new("AIza..."));
//! let history = gateway.fetch_history("Eiffel Tower").await?;
//! println!("{}", history.text);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::audio::codec::encode_base64;
use crate::config::GatewayConfig;
use crate::error::{NarratorError, Result};
use crate::gateway::types::GenerateContentResponse;
use crate::gateway::{SpeechPayload, TourGateway};
use crate::redact::{RedactedString, redact_secret};
use crate::tour::{
    CapturedImage, GroundingSource, HistorySummary, LandmarkInfo, NO_HISTORY_FALLBACK,
};

/// Instruction sent alongside the photo.
pub const IDENTIFY_PROMPT: &str = "Identify the famous landmark in this image. \
Return a JSON object with two fields: \
1. 'name': The name of the landmark. \
2. 'shortDescription': A very brief, one-sentence description of what it is. \
If no famous landmark is detected, set 'name' to \"Unknown\" and 'shortDescription' to \"Could not identify a landmark.\"";

/// History prompt for `landmark_name`.
pub fn history_prompt(landmark_name: &str) -> String {
    format!(
        "Write an engaging, 100-word historical summary for tourists about \"{landmark_name}\". \
         Focus on interesting facts or legends. \
         Do not use markdown formatting like asterisks or hash symbols in the output text, \
         keep it plain text for easier reading."
    )
}

/// Narration instruction wrapping `text`.
pub fn narration_prompt(text: &str) -> String {
    format!("Narrate this guide clearly and enthusiastically: {text}")
}

// ── Configuration ─────────────────────────────────────────────

/// Configuration for the Gemini gateway.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API key sent in the `x-goog-api-key` header.
    pub api_key: RedactedString,
    /// Base URL (defaults to `https://generativelanguage.googleapis.com`).
    pub base_url: String,
    pub identify_model: String,
    pub history_model: String,
    pub speech_model: String,
    /// Prebuilt voice for narration.
    pub voice_name: String,
}

impl GeminiConfig {
    /// Create a config with default models and voice.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::from_gateway_config(&GatewayConfig::default(), RedactedString::new(api_key))
    }

    /// Build from the file configuration and a resolved key.
    pub fn from_gateway_config(config: &GatewayConfig, api_key: RedactedString) -> Self {
        Self {
            api_key,
            base_url: config.base_url.clone(),
            identify_model: config.identify_model.clone(),
            history_model: config.history_model.clone(),
            speech_model: config.speech_model.clone(),
            voice_name: config.voice_name.clone(),
        }
    }

    /// Set a custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the narration voice.
    pub fn with_voice(mut self, voice_name: impl Into<String>) -> Self {
        self.voice_name = voice_name.into();
        self
    }

    /// Full `generateContent` URL for `model`.
    pub fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{model}:generateContent",
            self.base_url.trim_end_matches('/')
        )
    }
}

// ── Request Builders ──────────────────────────────────────────

/// Build the identify request body.
pub fn build_identify_request(image: &CapturedImage) -> serde_json::Value {
    serde_json::json!({
        "contents": [{
            "parts": [
                {
                    "inlineData": {
                        "mimeType": image.mime_type(),
                        "data": encode_base64(image.bytes()),
                    }
                },
                { "text": IDENTIFY_PROMPT },
            ]
        }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": {
                "type": "OBJECT",
                "properties": {
                    "name": { "type": "STRING" },
                    "shortDescription": { "type": "STRING" },
                },
                "required": ["name", "shortDescription"],
            }
        }
    })
}

/// Build the grounded history request body.
pub fn build_history_request(landmark_name: &str) -> serde_json::Value {
    serde_json::json!({
        "contents": [{
            "parts": [{ "text": history_prompt(landmark_name) }]
        }],
        "tools": [{ "googleSearch": {} }],
    })
}

/// Build the speech synthesis request body.
pub fn build_speech_request(text: &str, voice_name: &str) -> serde_json::Value {
    serde_json::json!({
        "contents": [{
            "parts": [{ "text": narration_prompt(text) }]
        }],
        "generationConfig": {
            "responseModalities": ["AUDIO"],
            "speechConfig": {
                "voiceConfig": {
                    "prebuiltVoiceConfig": { "voiceName": voice_name }
                }
            }
        }
    })
}

// ── Response Parsing ──────────────────────────────────────────

/// Parse the identify response text as [`LandmarkInfo`].
///
/// # Errors
///
/// Returns [`NarratorError::Identify`] if there is no text, the text is not the
/// expected JSON object, or the name is blank.
pub fn parse_identify_response(response: &GenerateContentResponse) -> Result<LandmarkInfo> {
    let text = response.text().ok_or_else(|| {
        NarratorError::Identify(with_finish_reason("Failed to identify landmark.", response))
    })?;
    let info: LandmarkInfo = serde_json::from_str(text.trim()).map_err(|e| {
        NarratorError::Identify(format!("Failed to identify landmark: malformed response: {e}"))
    })?;
    if info.name.trim().is_empty() {
        return Err(NarratorError::Identify(
            "Failed to identify landmark: response has an empty name".into(),
        ));
    }
    Ok(info)
}

/// Extract the history text and grounding citations.
///
/// Missing text falls back to [`NO_HISTORY_FALLBACK`]. Citations without a
/// usable URI are dropped; order is preserved.
pub fn parse_history_response(response: &GenerateContentResponse) -> HistorySummary {
    let text = response
        .text()
        .unwrap_or_else(|| NO_HISTORY_FALLBACK.to_string());

    let sources = response
        .first_candidate()
        .and_then(|c| c.grounding_metadata.as_ref())
        .map(|meta| {
            meta.grounding_chunks
                .iter()
                .filter_map(|chunk| chunk.web.as_ref())
                .filter_map(|web| {
                    let uri = web.uri.as_deref()?.trim();
                    if uri.is_empty() {
                        return None;
                    }
                    Some(GroundingSource {
                        uri: uri.to_string(),
                        title: web.title.clone().filter(|t| !t.trim().is_empty()),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    HistorySummary { text, sources }
}

/// Extract the first inline audio part of the first candidate.
///
/// # Errors
///
/// Returns [`NarratorError::Synthesis`] if no part carries inline data.
pub fn parse_speech_response(response: &GenerateContentResponse) -> Result<SpeechPayload> {
    response
        .first_candidate()
        .and_then(|c| c.content.as_ref())
        .and_then(|content| {
            content
                .parts
                .iter()
                .filter_map(|p| p.inline_data.as_ref())
                .find(|d| !d.data.is_empty())
        })
        .map(|d| SpeechPayload {
            mime_type: d.mime_type.clone(),
            data: d.data.clone(),
        })
        .ok_or_else(|| {
            NarratorError::Synthesis(with_finish_reason("Failed to generate audio.", response))
        })
}

/// Append an abnormal finish reason, e.g. `(blocked: SAFETY)`, to `message`.
fn with_finish_reason(message: &str, response: &GenerateContentResponse) -> String {
    match response.abnormal_finish() {
        Some(reason) => format!("{message} (blocked: {reason})"),
        None => message.to_string(),
    }
}

/// Extract the provider's error message from an error body.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| {
            if body.is_empty() {
                "no response body".to_string()
            } else {
                body.chars().take(500).collect()
            }
        })
}

// ── Adapter ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Stage {
    Identify,
    History,
    Speech,
}

impl Stage {
    fn name(self) -> &'static str {
        match self {
            Self::Identify => "identify",
            Self::History => "history",
            Self::Speech => "speech",
        }
    }

    fn error(self, message: String) -> NarratorError {
        match self {
            Self::Identify => NarratorError::Identify(message),
            Self::History => NarratorError::HistoryFetch(message),
            Self::Speech => NarratorError::Synthesis(message),
        }
    }
}

/// Gemini implementation of [`TourGateway`].
pub struct GeminiGateway {
    config: GeminiConfig,
    client: reqwest::Client,
}

impl GeminiGateway {
    /// Create a gateway with the given configuration.
    pub fn new(config: GeminiConfig) -> Self {
        let client = reqwest::Client::new();
        Self { config, client }
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    /// Map an HTTP error status to the stage's error.
    fn map_http_error(stage: Stage, status: reqwest::StatusCode, body: &str) -> NarratorError {
        let message = extract_error_message(body);
        let detail = match status.as_u16() {
            400 => format!("Gemini rejected the {} request: {message}", stage.name()),
            401 | 403 => format!("Gemini authentication failed: {message}"),
            429 => format!("Gemini rate limited: {message}"),
            code => format!("Gemini HTTP {code}: {message}"),
        };
        stage.error(detail)
    }

    async fn generate(
        &self,
        stage: Stage,
        model: &str,
        body: &serde_json::Value,
    ) -> Result<GenerateContentResponse> {
        let url = self.config.endpoint(model);
        debug!(stage = stage.name(), model, "sending generateContent request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", self.config.api_key.as_str())
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                let message = redact_secret(&e.to_string(), self.config.api_key.as_str());
                stage.error(format!("{} request failed: {message}", stage.name()))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            warn!(stage = stage.name(), status = status.as_u16(), "generateContent failed");
            return Err(Self::map_http_error(stage, status, &body_text));
        }

        response
            .json::<GenerateContentResponse>()
            .await
            .map_err(|e| stage.error(format!("{} response was not valid JSON: {e}", stage.name())))
    }
}

#[async_trait]
impl TourGateway for GeminiGateway {
    async fn identify(&self, image: &CapturedImage) -> Result<LandmarkInfo> {
        let body = build_identify_request(image);
        let response = self
            .generate(Stage::Identify, &self.config.identify_model, &body)
            .await?;
        let info = parse_identify_response(&response)?;
        debug!(name = %info.name, "landmark identified");
        Ok(info)
    }

    async fn fetch_history(&self, landmark_name: &str) -> Result<HistorySummary> {
        let body = build_history_request(landmark_name);
        let response = self
            .generate(Stage::History, &self.config.history_model, &body)
            .await?;
        let summary = parse_history_response(&response);
        debug!(sources = summary.sources.len(), "history fetched");
        Ok(summary)
    }

    async fn synthesize_speech(&self, text: &str) -> Result<SpeechPayload> {
        let body = build_speech_request(text, &self.config.voice_name);
        let response = self
            .generate(Stage::Speech, &self.config.speech_model, &body)
            .await?;
        let payload = parse_speech_response(&response)?;
        debug!(
            mime_type = payload.mime_type.as_deref().unwrap_or("<none>"),
            encoded_len = payload.data.len(),
            "speech synthesized"
        );
        Ok(payload)
    }
}
