//! Error types for the narration pipeline.
//!
//! Each variant carries a stable error code (SCREAMING_SNAKE_CASE) that is
//! included in the Display output and accessible via [`NarratorError::code()`].
//! The bare message, without the code, is what the user gets to see.

/// Stable error codes for programmatic error handling.
pub mod error_codes {
    /// Landmark identification failed or found no landmark.
    pub const IDENTIFY_FAILED: &str = "IDENTIFY_FAILED";

    /// Grounded history request failed.
    pub const HISTORY_FETCH_FAILED: &str = "HISTORY_FETCH_FAILED";

    /// Speech synthesis failed or returned no audio.
    pub const SYNTHESIS_FAILED: &str = "SYNTHESIS_FAILED";

    /// Synthesized audio payload could not be decoded.
    pub const DECODE_FAILED: &str = "DECODE_FAILED";

    /// Input image could not be read.
    pub const FILE_READ_FAILED: &str = "FILE_READ_FAILED";

    /// Audio device or stream error.
    pub const AUDIO_FAILED: &str = "AUDIO_FAILED";

    /// Invalid or missing configuration.
    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";

    /// A tour is already in progress or awaiting reset.
    pub const PIPELINE_BUSY: &str = "PIPELINE_BUSY";
}

/// Top-level error type for the narrator.
#[derive(Debug, thiserror::Error)]
pub enum NarratorError {
    /// Remote identification failure, malformed response, or unknown landmark.
    #[error("[{}] {}", error_codes::IDENTIFY_FAILED, .0)]
    Identify(String),

    /// Remote or transport failure while fetching the history summary.
    #[error("[{}] {}", error_codes::HISTORY_FETCH_FAILED, .0)]
    HistoryFetch(String),

    /// Remote failure or missing audio payload during synthesis.
    #[error("[{}] {}", error_codes::SYNTHESIS_FAILED, .0)]
    Synthesis(String),

    /// Malformed audio payload.
    #[error("[{}] {}", error_codes::DECODE_FAILED, .0)]
    Decode(String),

    /// Input image unreadable or of an unsupported type.
    #[error("[{}] {}", error_codes::FILE_READ_FAILED, .0)]
    FileRead(String),

    /// Audio device or stream error.
    #[error("[{}] {}", error_codes::AUDIO_FAILED, .0)]
    Audio(String),

    /// Invalid or missing configuration.
    #[error("[{}] {}", error_codes::CONFIG_INVALID, .0)]
    Config(String),

    /// A run was submitted while another one is active or not yet reset.
    #[error("[{}] {}", error_codes::PIPELINE_BUSY, .0)]
    PipelineBusy(String),
}

impl NarratorError {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Identify(_) => error_codes::IDENTIFY_FAILED,
            Self::HistoryFetch(_) => error_codes::HISTORY_FETCH_FAILED,
            Self::Synthesis(_) => error_codes::SYNTHESIS_FAILED,
            Self::Decode(_) => error_codes::DECODE_FAILED,
            Self::FileRead(_) => error_codes::FILE_READ_FAILED,
            Self::Audio(_) => error_codes::AUDIO_FAILED,
            Self::Config(_) => error_codes::CONFIG_INVALID,
            Self::PipelineBusy(_) => error_codes::PIPELINE_BUSY,
        }
    }

    /// Returns the inner message without the code prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Identify(m)
            | Self::HistoryFetch(m)
            | Self::Synthesis(m)
            | Self::Decode(m)
            | Self::FileRead(m)
            | Self::Audio(m)
            | Self::Config(m)
            | Self::PipelineBusy(m) => m,
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, NarratorError>;
