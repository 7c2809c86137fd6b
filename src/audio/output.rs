//! Audio output devices driven by the playback controller.
//!
//! An [`AudioOutput`] owns the host audio device. It is injected into the
//! [`PlaybackController`](super::playback::PlaybackController), which is the
//! only thing that starts or stops it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info};

use crate::audio::codec::DecodedAudio;
use crate::config::AudioConfig;
use crate::error::{NarratorError, Result};

/// Notification sent by an output for a started stream.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    /// The stream rendered the last frame of its buffer.
    Finished { session: u64 },
    /// The stream failed and produced no further audio.
    Failed { session: u64, message: String },
}

impl PlaybackEvent {
    /// Session id of the stream this event belongs to.
    pub fn session(&self) -> u64 {
        match self {
            Self::Finished { session } | Self::Failed { session, .. } => *session,
        }
    }
}

/// An audio output device.
pub trait AudioOutput {
    /// Device clock in seconds.
    ///
    /// Only differences between readings are meaningful. The clock must
    /// advance by exactly the amount of audio rendered while a stream runs.
    fn now(&self) -> f64;

    /// Start rendering `audio` from `offset_secs`, replacing any running stream.
    ///
    /// When the buffer drains the output sends
    /// [`PlaybackEvent::Finished`] tagged with `session` on `events`.
    ///
    /// # Errors
    ///
    /// Returns [`NarratorError::Audio`] if the stream cannot be started.
    fn start(
        &mut self,
        audio: Arc<DecodedAudio>,
        offset_secs: f64,
        session: u64,
        events: UnboundedSender<PlaybackEvent>,
    ) -> Result<()>;

    /// Stop the running stream, if any. Sends no event.
    fn stop(&mut self);

    /// Stop and release the device.
    fn close(&mut self);
}

/// Audio output to the system speakers via cpal.
///
/// The device is opened lazily on the first [`start`](AudioOutput::start).
pub struct CpalOutput {
    device_name: Option<String>,
    sample_rate: u32,
    device: Option<cpal::Device>,
    stream: Option<cpal::Stream>,
    rendered_frames: Arc<AtomicU64>,
    /// Microseconds of rendered audio still queued ahead of the speaker.
    lead_micros: Arc<AtomicU64>,
}

impl CpalOutput {
    /// Create an output for the configured device. Does not touch the device yet.
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            device_name: config.output_device.clone(),
            sample_rate: config.sample_rate,
            device: None,
            stream: None,
            rendered_frames: Arc::new(AtomicU64::new(0)),
            lead_micros: Arc::new(AtomicU64::new(0)),
        }
    }

    fn device(&mut self) -> Result<&cpal::Device> {
        if self.device.is_none() {
            let device = open_device(self.device_name.as_deref())?;
            self.device = Some(device);
        }
        self.device
            .as_ref()
            .ok_or_else(|| NarratorError::Audio("output device unavailable".into()))
    }

    /// List available output devices.
    ///
    /// # Errors
    ///
    /// Returns an error if devices cannot be enumerated.
    pub fn list_output_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
            .map_err(|e| NarratorError::Audio(format!("cannot enumerate devices: {e}")))?;

        let mut names = Vec::new();
        for device in devices {
            if let Ok(desc) = device.description() {
                names.push(desc.name().to_owned());
            }
        }
        Ok(names)
    }
}

fn open_device(name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();

    let device = if let Some(name) = name {
        host.output_devices()
            .map_err(|e| NarratorError::Audio(format!("cannot enumerate devices: {e}")))?
            .find(|d| {
                d.description()
                    .ok()
                    .map(|desc| desc.name() == name)
                    .unwrap_or(false)
            })
            .ok_or_else(|| NarratorError::Audio(format!("output device '{name}' not found")))?
    } else {
        host.default_output_device()
            .ok_or_else(|| NarratorError::Audio("no default output device".into()))?
    };

    let device_name = device
        .description()
        .map(|d| d.name().to_owned())
        .unwrap_or_else(|_| "<unknown>".into());
    info!("using output device: {device_name}");
    Ok(device)
}

/// Read position of a running cpal stream.
struct StreamCursor {
    audio: Arc<DecodedAudio>,
    channels: usize,
    position: usize,
    drained: bool,
    /// Frames of silence written since the buffer drained.
    trailing_silence: usize,
    finished: bool,
}

/// What one device callback rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Rendered {
    frames: usize,
    /// Set once, on the first callback after the buffer drained.
    finished: bool,
}

impl StreamCursor {
    fn new(audio: Arc<DecodedAudio>, start_frame: usize) -> Self {
        let channels = usize::from(audio.channels.max(1));
        Self {
            audio,
            channels,
            position: start_frame * channels,
            drained: false,
            trailing_silence: 0,
            finished: false,
        }
    }

    /// Copy the next samples into `data`, zero-filling past the end.
    ///
    /// The callback that writes the last samples only queues them, so
    /// completion is reported by a later, silent callback once the silence
    /// written after the end covers `latency_frames` of device buffering.
    fn render(&mut self, data: &mut [f32], latency_frames: usize) -> Rendered {
        let total = self.audio.samples.len();
        let available = total.saturating_sub(self.position).min(data.len());
        let start = self.position;
        data[..available].copy_from_slice(&self.audio.samples[start..start + available]);
        data[available..].fill(0.0);
        self.position += available;

        let was_drained = self.drained;
        if self.position >= total {
            self.drained = true;
            self.trailing_silence += (data.len() - available) / self.channels;
        }
        let finished = was_drained
            && available == 0
            && !self.finished
            && self.trailing_silence >= latency_frames;
        if finished {
            self.finished = true;
        }
        Rendered {
            frames: available / self.channels,
            finished,
        }
    }
}

impl AudioOutput for CpalOutput {
    fn now(&self) -> f64 {
        let frames = self.rendered_frames.load(Ordering::Acquire) as f64;
        let rendered = frames / f64::from(self.sample_rate.max(1));
        let lead = self.lead_micros.load(Ordering::Acquire) as f64 / 1_000_000.0;
        (rendered - lead).max(0.0)
    }

    fn start(
        &mut self,
        audio: Arc<DecodedAudio>,
        offset_secs: f64,
        session: u64,
        events: UnboundedSender<PlaybackEvent>,
    ) -> Result<()> {
        self.stop();

        if audio.sample_rate != self.sample_rate {
            return Err(NarratorError::Audio(format!(
                "buffer sample rate {} does not match output rate {}",
                audio.sample_rate, self.sample_rate
            )));
        }

        let stream_config = StreamConfig {
            channels: audio.channels.max(1),
            sample_rate: self.sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        let start_frame = audio.frame_at(offset_secs);
        debug!(session, start_frame, "starting output stream");
        let cursor = Arc::new(Mutex::new(StreamCursor::new(audio, start_frame)));

        let rendered = Arc::clone(&self.rendered_frames);
        let lead = Arc::clone(&self.lead_micros);
        let sample_rate = f64::from(self.sample_rate.max(1));
        let finished_tx = events.clone();
        let device = self.device()?;
        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], info: &cpal::OutputCallbackInfo| {
                    let mut cur = match cursor.lock() {
                        Ok(c) => c,
                        Err(_) => return,
                    };
                    let timestamp = info.timestamp();
                    let latency = timestamp
                        .playback
                        .duration_since(&timestamp.callback)
                        .unwrap_or_default()
                        .as_secs_f64();
                    let out = cur.render(data, (latency * sample_rate).ceil() as usize);
                    rendered.fetch_add(out.frames as u64, Ordering::AcqRel);

                    let queued = latency + out.frames as f64 / sample_rate;
                    lead.store((queued * 1_000_000.0) as u64, Ordering::Release);

                    if out.finished {
                        let _ = finished_tx.send(PlaybackEvent::Finished { session });
                    }
                },
                move |err| {
                    error!("audio output stream error: {err}");
                    let _ = events.send(PlaybackEvent::Failed {
                        session,
                        message: err.to_string(),
                    });
                },
                None,
            )
            .map_err(|e| NarratorError::Audio(format!("failed to build output stream: {e}")))?;

        stream
            .play()
            .map_err(|e| NarratorError::Audio(format!("failed to start output stream: {e}")))?;

        self.stream = Some(stream);
        Ok(())
    }

    fn stop(&mut self) {
        if self.stream.take().is_some() {
            // Queued audio of a dropped stream is never heard.
            self.lead_micros.store(0, Ordering::Release);
            debug!("output stream stopped");
        }
    }

    fn close(&mut self) {
        self.stop();
        if self.device.take().is_some() {
            info!("output device released");
        }
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.close();
    }
}
