//! Tour artifacts produced by the pipeline stages.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::audio::codec::DecodedAudio;
use crate::error::{NarratorError, Result};

/// Landmark name returned by the identify stage when nothing was recognized.
pub const UNKNOWN_LANDMARK: &str = "Unknown";

/// History text used when the history stage returns no text.
pub const NO_HISTORY_FALLBACK: &str = "No history available.";

/// A captured photo ready for identification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedImage {
    bytes: Vec<u8>,
    mime_type: String,
}

impl CapturedImage {
    /// Wrap raw image bytes with an explicit MIME type.
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    /// Wrap raw image bytes, detecting the MIME type from the image header.
    ///
    /// # Errors
    ///
    /// Returns [`NarratorError::FileRead`] if the bytes are not a supported image.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let mime_type = sniff_mime_type(&bytes, None)?;
        Ok(Self { bytes, mime_type })
    }

    /// Read an image file.
    ///
    /// The MIME type comes from the file header, falling back to the extension.
    ///
    /// # Errors
    ///
    /// Returns [`NarratorError::FileRead`] if the file cannot be read, is
    /// empty, or is not a supported image type.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            NarratorError::FileRead(format!("Failed to read {}: {e}", path.display()))
        })?;
        if bytes.is_empty() {
            return Err(NarratorError::FileRead(format!(
                "{} is empty",
                path.display()
            )));
        }
        let mime_type = sniff_mime_type(&bytes, Some(path))?;
        Ok(Self { bytes, mime_type })
    }

    /// Raw image bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// MIME type, e.g. `image/jpeg`.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }
}

fn sniff_mime_type(bytes: &[u8], path: Option<&Path>) -> Result<String> {
    let format = image::guess_format(bytes).ok().or_else(|| {
        path.and_then(|p| p.extension())
            .and_then(image::ImageFormat::from_extension)
    });
    match format {
        Some(
            f @ (image::ImageFormat::Jpeg
            | image::ImageFormat::Png
            | image::ImageFormat::WebP
            | image::ImageFormat::Gif),
        ) => Ok(f.to_mime_type().to_string()),
        Some(other) => Err(NarratorError::FileRead(format!(
            "unsupported image type: {}",
            other.to_mime_type()
        ))),
        None => Err(NarratorError::FileRead(
            "Failed to process image: unrecognized format".into(),
        )),
    }
}

/// Result of the identify stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LandmarkInfo {
    /// Landmark name, or [`UNKNOWN_LANDMARK`].
    pub name: String,
    /// One-sentence description.
    pub short_description: String,
}

impl LandmarkInfo {
    /// Whether the identify stage reported that no landmark was found.
    pub fn is_unknown(&self) -> bool {
        self.name == UNKNOWN_LANDMARK
    }
}

/// A web citation backing the history summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingSource {
    pub uri: String,
    pub title: Option<String>,
}

impl GroundingSource {
    /// Title for display, falling back to the URI.
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&self.uri)
    }
}

/// Result of the history stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySummary {
    pub text: String,
    /// Citations in the order the service returned them.
    pub sources: Vec<GroundingSource>,
}

/// The completed artifact of a successful run.
#[derive(Debug, Clone)]
pub struct TourResult {
    landmark: LandmarkInfo,
    history: HistorySummary,
    audio: Arc<DecodedAudio>,
}

impl TourResult {
    /// Assemble a tour result.
    ///
    /// # Errors
    ///
    /// Returns [`NarratorError::Identify`] if the landmark is the unknown sentinel.
    pub fn new(
        landmark: LandmarkInfo,
        history: HistorySummary,
        audio: DecodedAudio,
    ) -> Result<Self> {
        if landmark.is_unknown() {
            return Err(NarratorError::Identify(
                "cannot build a tour for an unidentified landmark".into(),
            ));
        }
        Ok(Self {
            landmark,
            history,
            audio: Arc::new(audio),
        })
    }

    pub fn landmark(&self) -> &LandmarkInfo {
        &self.landmark
    }

    pub fn history(&self) -> &HistorySummary {
        &self.history
    }

    /// Decoded narration, shared so the playback controller can hold it.
    pub fn audio(&self) -> &Arc<DecodedAudio> {
        &self.audio
    }
}
