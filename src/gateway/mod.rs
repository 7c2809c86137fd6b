//! Remote inference gateway.
//!
//! Defines the [`TourGateway`] trait the pipeline drives: one request/response
//! round trip per stage. Implementations perform no retries and enforce no
//! timeouts; every failure comes back as the stage's [`NarratorError`]
//! variant with a human-readable message.
//!
//! [`NarratorError`]: crate::error::NarratorError

pub mod gemini;
pub mod types;

use async_trait::async_trait;

use crate::error::Result;
use crate::tour::{CapturedImage, HistorySummary, LandmarkInfo};

pub use gemini::{GeminiConfig, GeminiGateway};

/// Inline audio returned by the speech stage, still base64 encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechPayload {
    /// MIME type reported by the service, e.g. `audio/L16;codec=pcm;rate=24000`.
    pub mime_type: Option<String>,
    /// Base64 encoded PCM16 samples.
    pub data: String,
}

/// The three remote stages of a tour.
#[async_trait]
pub trait TourGateway: Send + Sync {
    /// Identify the landmark in `image`.
    ///
    /// An unrecognized landmark is a successful response whose name is
    /// [`UNKNOWN_LANDMARK`](crate::tour::UNKNOWN_LANDMARK).
    async fn identify(&self, image: &CapturedImage) -> Result<LandmarkInfo>;

    /// Fetch a short, search-grounded history of `landmark_name`.
    async fn fetch_history(&self, landmark_name: &str) -> Result<HistorySummary>;

    /// Synthesize narration of `text`.
    async fn synthesize_speech(&self, text: &str) -> Result<SpeechPayload>;
}
