//! GeoNarrator: photograph a landmark, hear its story.
//!
//! This crate runs a strictly sequential tour pipeline:
//! Photo → Identify → Grounded history → Speech → Decode → Playback
//!
//! # Architecture
//!
//! - **Gateway**: the three remote stages behind the [`TourGateway`] trait,
//!   implemented for Gemini by [`GeminiGateway`](gateway::GeminiGateway)
//! - **Pipeline**: [`TourPipeline`] advances the observable
//!   [`PipelineState`] and guards against results of abandoned runs
//! - **Audio**: PCM16 decoding and a [`PlaybackController`] that plays,
//!   pauses and resumes narration via `cpal`

pub mod audio;
pub mod config;
pub mod error;
pub mod gateway;
pub mod pipeline;
pub mod presentation;
pub mod redact;
pub mod tour;

pub use audio::{DecodedAudio, PlaybackController};
pub use config::NarratorConfig;
pub use error::{NarratorError, Result};
pub use gateway::TourGateway;
pub use pipeline::{PipelineState, RunOutcome, TourPipeline, TourSnapshot};
pub use tour::{CapturedImage, GroundingSource, HistorySummary, LandmarkInfo, TourResult};
