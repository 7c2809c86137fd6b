//! Text labels for each pipeline state, shared by front ends.

use crate::pipeline::state::PipelineState;

/// Heading and detail line shown while a state is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageLabel {
    pub title: &'static str,
    pub detail: &'static str,
}

/// Label for `state`.
pub fn stage_label(state: PipelineState) -> StageLabel {
    let (title, detail) = match state {
        PipelineState::Idle => ("READY", "Select a landmark photo to begin."),
        PipelineState::AnalyzingImage => ("ANALYZING STRUCTURE", "Vision model processing..."),
        PipelineState::FetchingHistory => ("RETRIEVING DATA", "Accessing global archives..."),
        PipelineState::GeneratingAudio => ("SYNTHESIZING VOICE", "Generating neural speech..."),
        PipelineState::ShowingResult => ("TOUR READY", "Narration loaded."),
        PipelineState::Error => ("SYSTEM FAILURE", "Reset to start a new scan."),
    };
    StageLabel { title, detail }
}

/// Format seconds as `m:ss`.
pub fn format_clock(secs: f64) -> String {
    let total = secs.max(0.0).floor() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}
