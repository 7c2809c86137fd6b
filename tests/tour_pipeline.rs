//! Tour pipeline behavior tests.
//!
//! These drive [`TourPipeline`] with a scripted gateway to verify:
//! - Stage ordering and the states visible while each stage runs
//! - Failure handling for every stage, including the unknown landmark
//! - The generation guard: results of a run abandoned by `reset` are dropped

use std::sync::{Mutex, OnceLock};

use async_trait::async_trait;
use geonarrator::audio::codec::encode_base64;
use geonarrator::config::AudioConfig;
use geonarrator::error::{NarratorError, Result};
use geonarrator::gateway::{SpeechPayload, TourGateway};
use geonarrator::pipeline::coordinator::UNIDENTIFIED_MESSAGE;
use geonarrator::tour::{NO_HISTORY_FALLBACK, UNKNOWN_LANDMARK};
use geonarrator::{
    CapturedImage, GroundingSource, HistorySummary, LandmarkInfo, PipelineState, RunOutcome,
    TourPipeline, TourSnapshot,
};
use tokio::sync::{Notify, watch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Identify,
    History,
    Speech,
}

/// Gateway returning canned results and recording every call.
struct ScriptedGateway {
    landmark: std::result::Result<LandmarkInfo, String>,
    history: std::result::Result<HistorySummary, String>,
    speech: std::result::Result<SpeechPayload, String>,
    /// Stage that blocks until `release` is notified.
    hold: Option<Stage>,
    entered: Notify,
    release: Notify,
    calls: Mutex<Vec<(Stage, String, PipelineState)>>,
    observer: OnceLock<watch::Receiver<TourSnapshot>>,
}

impl ScriptedGateway {
    fn eiffel(pcm: &[i16]) -> Self {
        let raw: Vec<u8> = pcm.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self {
            landmark: Ok(LandmarkInfo {
                name: "Eiffel Tower".into(),
                short_description: "A wrought-iron lattice tower in Paris.".into(),
            }),
            history: Ok(HistorySummary {
                text: "The Eiffel Tower was built in 1889...".into(),
                sources: vec![GroundingSource {
                    uri: "https://x".into(),
                    title: Some("X".into()),
                }],
            }),
            speech: Ok(SpeechPayload {
                mime_type: Some("audio/L16;codec=pcm;rate=24000".into()),
                data: encode_base64(&raw),
            }),
            hold: None,
            entered: Notify::new(),
            release: Notify::new(),
            calls: Mutex::new(Vec::new()),
            observer: OnceLock::new(),
        }
    }

    fn holding(mut self, stage: Stage) -> Self {
        self.hold = Some(stage);
        self
    }

    fn calls(&self) -> Vec<(Stage, String, PipelineState)> {
        self.calls.lock().unwrap().clone()
    }

    fn stages(&self) -> Vec<Stage> {
        self.calls().into_iter().map(|(stage, _, _)| stage).collect()
    }

    async fn enter(&self, stage: Stage, arg: &str) {
        let state = self
            .observer
            .get()
            .map(|rx| rx.borrow().state)
            .unwrap_or_default();
        self.calls
            .lock()
            .unwrap()
            .push((stage, arg.to_string(), state));
        if self.hold == Some(stage) {
            self.entered.notify_one();
            self.release.notified().await;
        }
    }
}

#[async_trait]
impl TourGateway for ScriptedGateway {
    async fn identify(&self, image: &CapturedImage) -> Result<LandmarkInfo> {
        self.enter(Stage::Identify, image.mime_type()).await;
        self.landmark.clone().map_err(NarratorError::Identify)
    }

    async fn fetch_history(&self, landmark_name: &str) -> Result<HistorySummary> {
        self.enter(Stage::History, landmark_name).await;
        self.history.clone().map_err(NarratorError::HistoryFetch)
    }

    async fn synthesize_speech(&self, text: &str) -> Result<SpeechPayload> {
        self.enter(Stage::Speech, text).await;
        self.speech.clone().map_err(NarratorError::Synthesis)
    }
}

fn pipeline(gateway: ScriptedGateway) -> TourPipeline<ScriptedGateway> {
    let pipeline = TourPipeline::new(gateway, &AudioConfig::default());
    let _ = pipeline.gateway().observer.set(pipeline.subscribe());
    pipeline
}

fn photo() -> CapturedImage {
    CapturedImage::new(vec![0xFF, 0xD8, 0xFF, 0xE0], "image/jpeg")
}

fn assert_cleared(snapshot: &TourSnapshot) {
    assert_eq!(snapshot.state, PipelineState::Idle);
    assert!(snapshot.image.is_none());
    assert!(snapshot.result.is_none());
    assert!(snapshot.error.is_none());
}

// ────────────────────────────────────────────────────────────────────────────
// Successful Runs
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn full_tour_reaches_showing_result() {
    let pcm: Vec<i16> = (0..4_800).map(|i| (i % 200) as i16 - 100).collect();
    let pipeline = pipeline(ScriptedGateway::eiffel(&pcm));

    let outcome = pipeline.submit(photo()).await.unwrap();
    let result = match outcome {
        RunOutcome::Completed(result) => result,
        other => panic!("expected completed tour, got {other:?}"),
    };

    assert_eq!(result.landmark().name, "Eiffel Tower");
    assert_eq!(
        result.history().text,
        "The Eiffel Tower was built in 1889..."
    );
    assert_eq!(result.history().sources.len(), 1);
    assert_eq!(result.history().sources[0].uri, "https://x");
    assert_eq!(result.audio().samples.len(), pcm.len());
    assert_eq!(result.audio().sample_rate, 24_000);
    assert_eq!(result.audio().channels, 1);
    assert_eq!(result.audio().samples[0], -100.0 / 32768.0);

    let snapshot = pipeline.snapshot();
    assert_eq!(snapshot.state, PipelineState::ShowingResult);
    assert!(snapshot.error.is_none());
    assert_eq!(snapshot.image.as_deref(), Some(&photo()));
    assert!(snapshot.result.is_some());
}

#[tokio::test]
async fn stages_run_in_order_with_matching_states() {
    let pipeline = pipeline(ScriptedGateway::eiffel(&[1, 2, 3]));
    pipeline.submit(photo()).await.unwrap();

    let calls = pipeline.gateway().calls();
    assert_eq!(
        calls,
        vec![
            (
                Stage::Identify,
                "image/jpeg".to_string(),
                PipelineState::AnalyzingImage
            ),
            (
                Stage::History,
                "Eiffel Tower".to_string(),
                PipelineState::FetchingHistory
            ),
            (
                Stage::Speech,
                "The Eiffel Tower was built in 1889...".to_string(),
                PipelineState::GeneratingAudio
            ),
        ]
    );
}

#[tokio::test]
async fn fallback_history_text_is_narrated() {
    let mut gateway = ScriptedGateway::eiffel(&[0; 8]);
    gateway.history = Ok(HistorySummary {
        text: NO_HISTORY_FALLBACK.into(),
        sources: Vec::new(),
    });
    let pipeline = pipeline(gateway);

    let outcome = pipeline.submit(photo()).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Completed(_)));

    let calls = pipeline.gateway().calls();
    assert_eq!(calls[2].0, Stage::Speech);
    assert_eq!(calls[2].1, NO_HISTORY_FALLBACK);
    assert_eq!(calls[2].2, PipelineState::GeneratingAudio);
}

#[tokio::test]
async fn empty_audio_payload_still_completes() {
    let mut gateway = ScriptedGateway::eiffel(&[]);
    gateway.speech = Ok(SpeechPayload {
        mime_type: None,
        data: String::new(),
    });
    let pipeline = pipeline(gateway);

    let outcome = pipeline.submit(photo()).await.unwrap();
    let result = match outcome {
        RunOutcome::Completed(result) => result,
        other => panic!("expected completed tour, got {other:?}"),
    };
    assert!(result.audio().is_empty());
}

// ────────────────────────────────────────────────────────────────────────────
// Failures
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_landmark_stops_before_history() {
    let mut gateway = ScriptedGateway::eiffel(&[1]);
    gateway.landmark = Ok(LandmarkInfo {
        name: UNKNOWN_LANDMARK.into(),
        short_description: "Could not identify a landmark.".into(),
    });
    let pipeline = pipeline(gateway);

    let outcome = pipeline.submit(photo()).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Failed(ref m) if m == UNIDENTIFIED_MESSAGE));
    assert_eq!(pipeline.gateway().stages(), vec![Stage::Identify]);

    let snapshot = pipeline.snapshot();
    assert_eq!(snapshot.state, PipelineState::Error);
    assert_eq!(snapshot.error.as_deref(), Some(UNIDENTIFIED_MESSAGE));
    assert!(snapshot.result.is_none());
}

#[tokio::test]
async fn identify_transport_error_then_reset() {
    let mut gateway = ScriptedGateway::eiffel(&[1]);
    gateway.landmark = Err("identify request failed: connection refused".into());
    let pipeline = pipeline(gateway);

    let outcome = pipeline.submit(photo()).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Failed(_)));

    let snapshot = pipeline.snapshot();
    assert_eq!(snapshot.state, PipelineState::Error);
    let message = snapshot.error.clone().unwrap();
    assert!(!message.is_empty());
    assert!(message.contains("connection refused"));
    assert!(snapshot.result.is_none());
    assert!(snapshot.image.is_some());

    pipeline.reset();
    assert_cleared(&pipeline.snapshot());
}

#[tokio::test]
async fn history_failure_moves_to_error() {
    let mut gateway = ScriptedGateway::eiffel(&[1]);
    gateway.history = Err("Gemini HTTP 503: overloaded".into());
    let pipeline = pipeline(gateway);

    let outcome = pipeline.submit(photo()).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Failed(ref m) if m.contains("503")));
    assert_eq!(
        pipeline.gateway().stages(),
        vec![Stage::Identify, Stage::History]
    );
    assert_eq!(pipeline.state(), PipelineState::Error);
}

#[tokio::test]
async fn missing_audio_moves_to_error_without_result() {
    let mut gateway = ScriptedGateway::eiffel(&[1]);
    gateway.speech = Err("Failed to generate audio.".into());
    let pipeline = pipeline(gateway);

    let outcome = pipeline.submit(photo()).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Failed(ref m) if m == "Failed to generate audio."));

    let snapshot = pipeline.snapshot();
    assert_eq!(snapshot.state, PipelineState::Error);
    assert!(snapshot.result.is_none());
}

#[tokio::test]
async fn malformed_audio_payload_moves_to_error() {
    let mut gateway = ScriptedGateway::eiffel(&[1]);
    gateway.speech = Ok(SpeechPayload {
        mime_type: None,
        data: "%%% not base64 %%%".into(),
    });
    let pipeline = pipeline(gateway);

    let outcome = pipeline.submit(photo()).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Failed(ref m) if m.contains("base64")));
    assert!(pipeline.snapshot().result.is_none());
}

// ────────────────────────────────────────────────────────────────────────────
// Generation Guard
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn reset_during_history_discards_late_result() {
    let pipeline = pipeline(ScriptedGateway::eiffel(&[1, 2]).holding(Stage::History));
    let gateway = pipeline.gateway();

    let (outcome, ()) = tokio::join!(pipeline.submit(photo()), async {
        gateway.entered.notified().await;
        assert_eq!(pipeline.state(), PipelineState::FetchingHistory);
        pipeline.reset();
        gateway.release.notify_one();
    });

    assert!(matches!(outcome.unwrap(), RunOutcome::Abandoned));
    assert_cleared(&pipeline.snapshot());
    assert_eq!(gateway.stages(), vec![Stage::Identify, Stage::History]);
}

#[tokio::test]
async fn reset_during_speech_ignores_late_failure() {
    let mut gateway = ScriptedGateway::eiffel(&[1]).holding(Stage::Speech);
    gateway.speech = Err("Failed to generate audio.".into());
    let pipeline = pipeline(gateway);
    let gateway = pipeline.gateway();

    let (outcome, ()) = tokio::join!(pipeline.submit(photo()), async {
        gateway.entered.notified().await;
        pipeline.reset();
        gateway.release.notify_one();
    });

    assert!(matches!(outcome.unwrap(), RunOutcome::Abandoned));
    assert_cleared(&pipeline.snapshot());
}

#[tokio::test]
async fn reset_during_identify_skips_remaining_stages() {
    let pipeline = pipeline(ScriptedGateway::eiffel(&[1]).holding(Stage::Identify));
    let gateway = pipeline.gateway();
    let generation_before = pipeline.snapshot().generation;

    let (outcome, ()) = tokio::join!(pipeline.submit(photo()), async {
        gateway.entered.notified().await;
        pipeline.reset();
        gateway.release.notify_one();
    });

    assert!(matches!(outcome.unwrap(), RunOutcome::Abandoned));
    assert_eq!(gateway.stages(), vec![Stage::Identify]);
    let snapshot = pipeline.snapshot();
    assert_cleared(&snapshot);
    assert_eq!(snapshot.generation, generation_before + 2);
}

#[cfg(unix)]
#[tokio::test]
async fn reset_during_file_read_abandons_run() {
    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F', b'I', b'F'];

    let dir = tempfile::tempdir().unwrap();
    let fifo = dir.path().join("landmark.jpg");
    let status = std::process::Command::new("mkfifo")
        .arg(&fifo)
        .status()
        .unwrap();
    assert!(status.success());

    let pipeline = pipeline(ScriptedGateway::eiffel(&[1]));
    let mut updates = pipeline.subscribe();

    let (outcome, ()) = tokio::join!(pipeline.submit_file(&fifo), async {
        // The read blocks until a writer opens the FIFO.
        updates
            .wait_for(|snap| snap.state == PipelineState::AnalyzingImage)
            .await
            .unwrap();
        assert!(pipeline.snapshot().image.is_none());
        pipeline.reset();
        tokio::fs::write(&fifo, JPEG).await.unwrap();
    });

    assert!(matches!(outcome.unwrap(), RunOutcome::Abandoned));
    assert_cleared(&pipeline.snapshot());
    assert!(pipeline.gateway().stages().is_empty());
}

#[tokio::test]
async fn file_tour_stores_image_after_read() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tower.png");
    let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
    std::fs::write(&path, png).unwrap();

    let pipeline = pipeline(ScriptedGateway::eiffel(&[1]));
    let outcome = pipeline.submit_file(&path).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Completed(_)));

    let snapshot = pipeline.snapshot();
    assert_eq!(snapshot.state, PipelineState::ShowingResult);
    assert_eq!(snapshot.image.unwrap().mime_type(), "image/png");
    assert_eq!(pipeline.gateway().calls()[0].1, "image/png");
}

#[tokio::test]
async fn submit_while_running_is_rejected() {
    let pipeline = pipeline(ScriptedGateway::eiffel(&[1]).holding(Stage::Identify));
    let gateway = pipeline.gateway();

    let (outcome, second) = tokio::join!(pipeline.submit(photo()), async {
        gateway.entered.notified().await;
        let second = pipeline.submit(photo()).await;
        gateway.release.notify_one();
        second
    });

    assert!(matches!(second, Err(NarratorError::PipelineBusy(_))));
    assert!(matches!(outcome.unwrap(), RunOutcome::Completed(_)));
    assert_eq!(gateway.stages().len(), 3);
}

#[tokio::test]
async fn submit_after_result_requires_reset() {
    let pipeline = pipeline(ScriptedGateway::eiffel(&[1]));
    pipeline.submit(photo()).await.unwrap();

    let err = pipeline.submit(photo()).await.unwrap_err();
    assert!(matches!(err, NarratorError::PipelineBusy(_)));
    assert_eq!(pipeline.state(), PipelineState::ShowingResult);

    pipeline.reset();
    assert_cleared(&pipeline.snapshot());
    assert!(matches!(
        pipeline.submit(photo()).await.unwrap(),
        RunOutcome::Completed(_)
    ));
}

#[tokio::test]
async fn subscribers_see_final_state() {
    let pipeline = pipeline(ScriptedGateway::eiffel(&[1]));
    let mut updates = pipeline.subscribe();

    pipeline.submit(photo()).await.unwrap();
    assert!(updates.has_changed().unwrap());
    let snapshot = updates.borrow_and_update().clone();
    assert_eq!(snapshot.state, PipelineState::ShowingResult);
    assert!(snapshot.result.is_some());
}
