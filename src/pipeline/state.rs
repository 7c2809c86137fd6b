//! Observable pipeline state.

use std::fmt;
use std::sync::Arc;

use crate::tour::{CapturedImage, TourResult};

/// Which step of a tour the pipeline is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PipelineState {
    #[default]
    Idle,
    AnalyzingImage,
    FetchingHistory,
    GeneratingAudio,
    ShowingResult,
    Error,
}

impl PipelineState {
    /// Whether a run is in flight.
    pub fn is_busy(self) -> bool {
        matches!(
            self,
            Self::AnalyzingImage | Self::FetchingHistory | Self::GeneratingAudio
        )
    }

    /// Whether the state waits for an explicit reset.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::ShowingResult | Self::Error)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// Stages only move forward. Any state other than `Error` may fail into
    /// `Error`, and reset returns to `Idle` from anywhere.
    pub fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (_, Self::Idle) => true,
            (Self::Error, Self::Error) => false,
            (_, Self::Error) => true,
            (Self::Idle, Self::AnalyzingImage)
            | (Self::AnalyzingImage, Self::FetchingHistory)
            | (Self::FetchingHistory, Self::GeneratingAudio)
            | (Self::GeneratingAudio, Self::ShowingResult) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AnalyzingImage => "analyzing_image",
            Self::FetchingHistory => "fetching_history",
            Self::GeneratingAudio => "generating_audio",
            Self::ShowingResult => "showing_result",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything presentation needs to render the current session.
#[derive(Debug, Clone, Default)]
pub struct TourSnapshot {
    pub state: PipelineState,
    /// Bumped on every submit and every reset.
    pub generation: u64,
    /// Photo of the current run, kept for display.
    pub image: Option<Arc<CapturedImage>>,
    /// Set only in `ShowingResult`.
    pub result: Option<Arc<TourResult>>,
    /// Set only in `Error`.
    pub error: Option<String>,
}
