//! Tour pipeline coordinator.
//!
//! Drives one strictly sequential run per photo:
//! identify → fetch history → synthesize speech → decode. Progress is
//! published as a [`TourSnapshot`] on a `watch` channel.
//!
//! Every run is tagged with the snapshot generation it started under.
//! `reset` bumps the generation, so a run that resolves after a reset finds
//! a mismatch and its results are dropped instead of applied.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::audio::codec::{decode_base64, decode_pcm16};
use crate::config::AudioConfig;
use crate::error::{NarratorError, Result};
use crate::gateway::TourGateway;
use crate::pipeline::state::{PipelineState, TourSnapshot};
use crate::tour::{CapturedImage, TourResult};

/// Shown when the identify stage reports no landmark.
pub const UNIDENTIFIED_MESSAGE: &str = "Could not identify a landmark. Please try a clearer photo.";

/// Shown when a failure carries no message of its own.
pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong during analysis.";

/// How a submitted run ended.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// The run reached `ShowingResult`.
    Completed(Arc<TourResult>),
    /// The run moved the pipeline to `Error` with this message.
    Failed(String),
    /// A reset happened while the run was in flight; nothing was applied.
    Abandoned,
}

/// Why a run stopped early.
enum Interrupt {
    Stale,
    Failed(NarratorError),
}

impl From<NarratorError> for Interrupt {
    fn from(err: NarratorError) -> Self {
        Self::Failed(err)
    }
}

/// Sequential tour pipeline over a [`TourGateway`].
pub struct TourPipeline<G> {
    gateway: G,
    sample_rate: u32,
    channels: u16,
    snapshot: watch::Sender<TourSnapshot>,
}

impl<G: TourGateway> TourPipeline<G> {
    /// Create an idle pipeline.
    pub fn new(gateway: G, audio: &AudioConfig) -> Self {
        let (snapshot, _) = watch::channel(TourSnapshot::default());
        Self {
            gateway,
            sample_rate: audio.sample_rate,
            channels: audio.channels,
            snapshot,
        }
    }

    /// Receive every snapshot change.
    pub fn subscribe(&self) -> watch::Receiver<TourSnapshot> {
        self.snapshot.subscribe()
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> TourSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn state(&self) -> PipelineState {
        self.snapshot.borrow().state
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Run a full tour for `image`.
    ///
    /// # Errors
    ///
    /// Returns [`NarratorError::PipelineBusy`] unless the pipeline is `Idle`.
    /// Stage failures are not errors here; they end in
    /// [`RunOutcome::Failed`] with the pipeline in `Error`.
    pub async fn submit(&self, image: CapturedImage) -> Result<RunOutcome> {
        let image = Arc::new(image);
        let generation = self.begin(Some(Arc::clone(&image)))?;
        info!(generation, mime_type = image.mime_type(), "tour started");
        Ok(self.run(generation, &image).await)
    }

    /// Read `path` and run a tour for it.
    ///
    /// The read happens in `AnalyzingImage` under the run's generation, so a
    /// reset during the read abandons the run. An unreadable file moves the
    /// pipeline to `Error`.
    ///
    /// # Errors
    ///
    /// Returns [`NarratorError::PipelineBusy`] unless the pipeline is `Idle`.
    pub async fn submit_file(&self, path: &Path) -> Result<RunOutcome> {
        let generation = self.begin(None)?;
        info!(generation, path = %path.display(), "tour started");

        let image = match CapturedImage::from_path(path).await {
            Ok(image) => Arc::new(image),
            Err(err) => {
                warn!(path = %path.display(), "cannot read image: {}", err.message());
                return Ok(self.conclude(generation, Err(Interrupt::Failed(err))));
            }
        };

        if !self.attach_image(generation, Arc::clone(&image)) {
            return Ok(self.conclude(generation, Err(Interrupt::Stale)));
        }
        Ok(self.run(generation, &image).await)
    }

    /// Return to `Idle`, clearing the image, result and error.
    ///
    /// Any run still in flight is abandoned.
    pub fn reset(&self) {
        self.snapshot.send_modify(|snap| {
            let was = snap.state;
            snap.generation += 1;
            snap.state = PipelineState::Idle;
            snap.image = None;
            snap.result = None;
            snap.error = None;
            info!(generation = snap.generation, from = %was, "pipeline reset");
        });
    }

    async fn execute(
        &self,
        generation: u64,
        image: &CapturedImage,
    ) -> std::result::Result<TourResult, Interrupt> {
        let landmark = self.gateway.identify(image).await?;
        self.ensure_current(generation)?;
        if landmark.is_unknown() {
            return Err(NarratorError::Identify(UNIDENTIFIED_MESSAGE.into()).into());
        }
        info!(generation, landmark = %landmark.name, "landmark identified");

        self.advance(generation, PipelineState::FetchingHistory)?;
        let history = self.gateway.fetch_history(&landmark.name).await?;
        info!(generation, sources = history.sources.len(), "history fetched");

        self.advance(generation, PipelineState::GeneratingAudio)?;
        let payload = self.gateway.synthesize_speech(&history.text).await?;
        self.ensure_current(generation)?;

        let (sample_rate, channels) = (self.sample_rate, self.channels);
        let audio = tokio::task::spawn_blocking(move || {
            decode_base64(&payload.data).map(|raw| decode_pcm16(&raw, sample_rate, channels))
        })
        .await
        .map_err(|e| NarratorError::Decode(format!("audio decode task failed: {e}")))??;
        info!(
            generation,
            frames = audio.frames(),
            seconds = audio.duration_secs(),
            "narration decoded"
        );

        Ok(TourResult::new(landmark, history, audio)?)
    }

    async fn run(&self, generation: u64, image: &CapturedImage) -> RunOutcome {
        let result = self.execute(generation, image).await;
        self.conclude(generation, result)
    }

    /// Publish the end of a run, unless it has been abandoned.
    fn conclude(
        &self,
        generation: u64,
        result: std::result::Result<TourResult, Interrupt>,
    ) -> RunOutcome {
        let outcome = match result {
            Ok(result) => {
                let result = Arc::new(result);
                if self.complete(generation, Arc::clone(&result)) {
                    info!(generation, landmark = %result.landmark().name, "tour ready");
                    RunOutcome::Completed(result)
                } else {
                    RunOutcome::Abandoned
                }
            }
            Err(Interrupt::Failed(err)) => {
                let message = user_message(&err);
                if self.fail(generation, message.clone()) {
                    warn!(generation, code = err.code(), "tour failed: {}", err.message());
                    RunOutcome::Failed(message)
                } else {
                    RunOutcome::Abandoned
                }
            }
            Err(Interrupt::Stale) => RunOutcome::Abandoned,
        };

        if matches!(outcome, RunOutcome::Abandoned) {
            info!(generation, "discarding results of abandoned tour");
        }
        outcome
    }

    /// Enter `AnalyzingImage` under a fresh generation.
    fn begin(&self, image: Option<Arc<CapturedImage>>) -> Result<u64> {
        let mut started = Err(PipelineState::Idle);
        self.snapshot.send_if_modified(|snap| {
            if snap.state != PipelineState::Idle {
                started = Err(snap.state);
                return false;
            }
            snap.generation += 1;
            snap.state = PipelineState::AnalyzingImage;
            snap.image = image;
            snap.result = None;
            snap.error = None;
            started = Ok(snap.generation);
            true
        });
        started.map_err(busy)
    }

    fn ensure_current(&self, generation: u64) -> std::result::Result<(), Interrupt> {
        if self.snapshot.borrow().generation == generation {
            Ok(())
        } else {
            Err(Interrupt::Stale)
        }
    }

    /// Store the photo read for a still-current run.
    fn attach_image(&self, generation: u64, image: Arc<CapturedImage>) -> bool {
        self.snapshot.send_if_modified(|snap| {
            if snap.generation != generation || snap.state != PipelineState::AnalyzingImage {
                return false;
            }
            snap.image = Some(image);
            true
        })
    }

    /// Move to `next` if the run is still current and the move is legal.
    fn advance(&self, generation: u64, next: PipelineState) -> std::result::Result<(), Interrupt> {
        let mut applied = false;
        self.snapshot.send_if_modified(|snap| {
            if snap.generation != generation || !snap.state.can_transition_to(next) {
                return false;
            }
            snap.state = next;
            applied = true;
            true
        });
        if applied {
            info!(generation, state = %next, "pipeline advanced");
            Ok(())
        } else {
            Err(Interrupt::Stale)
        }
    }

    fn complete(&self, generation: u64, result: Arc<TourResult>) -> bool {
        self.snapshot.send_if_modified(|snap| {
            if snap.generation != generation
                || !snap.state.can_transition_to(PipelineState::ShowingResult)
            {
                return false;
            }
            snap.state = PipelineState::ShowingResult;
            snap.result = Some(result);
            true
        })
    }

    fn fail(&self, generation: u64, message: String) -> bool {
        self.snapshot.send_if_modified(|snap| {
            if snap.generation != generation || !snap.state.can_transition_to(PipelineState::Error)
            {
                return false;
            }
            snap.state = PipelineState::Error;
            snap.result = None;
            snap.error = Some(message);
            true
        })
    }
}

fn busy(state: PipelineState) -> NarratorError {
    let message = if state.is_terminal() {
        format!("the last tour ended in {state}; reset first")
    } else if state.is_busy() {
        format!("a tour is already in progress ({state})")
    } else {
        format!("cannot start a tour while {state}")
    };
    NarratorError::PipelineBusy(message)
}

fn user_message(err: &NarratorError) -> String {
    let message = err.message().trim();
    if message.is_empty() {
        GENERIC_FAILURE_MESSAGE.to_string()
    } else {
        message.to_string()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use async_trait::async_trait;

    use crate::gateway::SpeechPayload;
    use crate::tour::{HistorySummary, LandmarkInfo};

    /// Gateway whose identify stage fails; later stages must never run.
    struct FailingIdentify;

    #[async_trait]
    impl TourGateway for FailingIdentify {
        async fn identify(&self, _image: &CapturedImage) -> Result<LandmarkInfo> {
            Err(NarratorError::Identify(String::new()))
        }

        async fn fetch_history(&self, _landmark_name: &str) -> Result<HistorySummary> {
            panic!("history must not be requested");
        }

        async fn synthesize_speech(&self, _text: &str) -> Result<SpeechPayload> {
            panic!("speech must not be requested");
        }
    }

    fn image() -> CapturedImage {
        CapturedImage::new(vec![0xFF, 0xD8, 0xFF], "image/jpeg")
    }

    #[tokio::test]
    async fn empty_error_message_gets_generic_text() {
        let pipeline = TourPipeline::new(FailingIdentify, &AudioConfig::default());
        let outcome = pipeline.submit(image()).await.unwrap();
        match outcome {
            RunOutcome::Failed(message) => assert_eq!(message, GENERIC_FAILURE_MESSAGE),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(pipeline.state(), PipelineState::Error);
    }

    #[tokio::test]
    async fn submit_in_error_state_is_busy() {
        let pipeline = TourPipeline::new(FailingIdentify, &AudioConfig::default());
        pipeline.submit(image()).await.unwrap();
        let err = pipeline.submit(image()).await.unwrap_err();
        assert!(matches!(err, NarratorError::PipelineBusy(_)));
        assert!(err.message().contains("reset first"));

        let err = pipeline
            .submit_file(Path::new("/nonexistent/landmark.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, NarratorError::PipelineBusy(_)));

        pipeline.reset();
        assert!(pipeline.submit(image()).await.is_ok());
    }

    #[tokio::test]
    async fn reset_bumps_generation() {
        let pipeline = TourPipeline::new(FailingIdentify, &AudioConfig::default());
        let before = pipeline.snapshot().generation;
        pipeline.reset();
        assert_eq!(pipeline.snapshot().generation, before + 1);
        assert_eq!(pipeline.state(), PipelineState::Idle);
    }

    #[tokio::test]
    async fn unreadable_file_moves_to_error() {
        let pipeline = TourPipeline::new(FailingIdentify, &AudioConfig::default());
        let outcome = pipeline
            .submit_file(Path::new("/nonexistent/landmark.jpg"))
            .await
            .unwrap();
        assert!(matches!(outcome, RunOutcome::Failed(_)));
        let snapshot = pipeline.snapshot();
        assert_eq!(snapshot.state, PipelineState::Error);
        assert!(snapshot.error.unwrap().contains("Failed to read"));
        assert!(snapshot.image.is_none());
    }
}
