//! Play/pause control over a decoded narration buffer.
//!
//! The controller keeps the playback offset itself and measures elapsed time
//! on the output's device clock, so pausing and resuming continues from the
//! exact frame where output stopped. Every started stream gets a fresh
//! session id; completion events carrying an older id are ignored.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::audio::codec::DecodedAudio;
use crate::audio::output::{AudioOutput, PlaybackEvent};
use crate::error::Result;

/// Playback controller bound to one output device for its whole lifetime.
pub struct PlaybackController<O: AudioOutput> {
    output: O,
    audio: Option<Arc<DecodedAudio>>,
    playing: bool,
    /// Seconds into the buffer where the next `play` starts.
    offset: f64,
    /// Device clock reading when the running stream started.
    started_at: f64,
    session: u64,
    closed: bool,
    events_tx: mpsc::UnboundedSender<PlaybackEvent>,
    events_rx: mpsc::UnboundedReceiver<PlaybackEvent>,
}

impl<O: AudioOutput> PlaybackController<O> {
    /// Take ownership of `output`.
    pub fn new(output: O) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            output,
            audio: None,
            playing: false,
            offset: 0.0,
            started_at: 0.0,
            session: 0,
            closed: false,
            events_tx,
            events_rx,
        }
    }

    /// Install a new buffer, stopping whatever was playing.
    pub fn load(&mut self, audio: Arc<DecodedAudio>) {
        self.halt();
        self.offset = 0.0;
        debug!(frames = audio.frames(), "playback buffer loaded");
        self.audio = Some(audio);
    }

    /// Start playback from the stored offset.
    ///
    /// No-op when no buffer is loaded, when already playing, or after `close`.
    ///
    /// # Errors
    ///
    /// Returns an error if the output cannot start a stream.
    pub fn play(&mut self) -> Result<()> {
        if self.playing || self.closed {
            return Ok(());
        }
        let Some(audio) = self.audio.clone() else {
            return Ok(());
        };
        if self.offset >= audio.duration_secs() {
            self.offset = 0.0;
        }

        self.session += 1;
        let started_at = self.output.now();
        self.output
            .start(audio, self.offset, self.session, self.events_tx.clone())?;
        self.started_at = started_at;
        self.playing = true;
        info!(session = self.session, offset = self.offset, "playback started");
        Ok(())
    }

    /// Stop playback and remember how far it got. No-op when not playing.
    pub fn pause(&mut self) {
        if !self.playing {
            return;
        }
        let elapsed = self.elapsed();
        self.output.stop();
        self.offset = self.clamped(self.offset + elapsed);
        self.playing = false;
        info!(session = self.session, offset = self.offset, "playback paused");
    }

    /// Pause if playing, otherwise play.
    ///
    /// # Errors
    ///
    /// Returns an error if playback cannot start.
    pub fn toggle(&mut self) -> Result<()> {
        if self.playing {
            self.pause();
            Ok(())
        } else {
            self.play()
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Stored offset in seconds (where the next `play` resumes).
    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Current position in seconds, including time played since the last start.
    pub fn position(&self) -> f64 {
        if self.playing {
            self.clamped(self.offset + self.elapsed())
        } else {
            self.offset
        }
    }

    /// Duration of the loaded buffer in seconds (0 when nothing is loaded).
    pub fn duration(&self) -> f64 {
        self.audio.as_ref().map_or(0.0, |a| a.duration_secs())
    }

    /// Session id of the most recently started stream.
    pub fn session(&self) -> u64 {
        self.session
    }

    /// Apply an output event. Returns `true` if it affected the current session.
    pub fn handle_event(&mut self, event: PlaybackEvent) -> bool {
        if event.session() != self.session || !self.playing {
            debug!(
                event_session = event.session(),
                current = self.session,
                "ignoring stale playback event"
            );
            return false;
        }
        match event {
            PlaybackEvent::Finished { .. } => {
                self.output.stop();
                self.playing = false;
                self.offset = 0.0;
                info!(session = self.session, "playback finished");
            }
            PlaybackEvent::Failed { message, .. } => {
                warn!(session = self.session, "playback failed: {message}");
                self.pause();
            }
        }
        true
    }

    /// Wait for the next output event and apply it.
    ///
    /// Returns the event and whether it affected the current session.
    pub async fn next_event(&mut self) -> Option<(PlaybackEvent, bool)> {
        let event = self.events_rx.recv().await?;
        let applied = self.handle_event(event.clone());
        Some((event, applied))
    }

    /// Apply every pending output event without waiting.
    pub fn drain_events(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
        }
    }

    /// Stop playback and release the output device. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.halt();
        self.output.close();
        self.closed = true;
    }

    fn halt(&mut self) {
        if self.playing {
            self.output.stop();
            self.playing = false;
        }
    }

    fn elapsed(&self) -> f64 {
        (self.output.now() - self.started_at).max(0.0)
    }

    fn clamped(&self, secs: f64) -> f64 {
        secs.min(self.duration())
    }
}

impl<O: AudioOutput> Drop for PlaybackController<O> {
    fn drop(&mut self) {
        self.close();
    }
}
