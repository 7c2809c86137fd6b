//! PCM16 decoding for synthesized narration.
//!
//! The speech service returns base64 encoded little-endian signed 16-bit
//! samples. Decoding is a straight `sample / 32768.0` with no clamping, so
//! `-32768` maps to exactly `-1.0` and `32767` to just under `1.0`.

use std::time::Duration;

use base64::Engine as _;

use crate::error::{NarratorError, Result};

/// Default sample rate of synthesized speech.
pub const DEFAULT_SAMPLE_RATE: u32 = 24_000;

/// Default channel count of synthesized speech.
pub const DEFAULT_CHANNELS: u16 = 1;

/// A normalized floating-point audio buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    /// Interleaved samples in roughly `[-1.0, 1.0)`.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u16,
}

impl DecodedAudio {
    /// A zero-length buffer.
    pub fn empty(sample_rate: u32, channels: u16) -> Self {
        Self {
            samples: Vec::new(),
            sample_rate,
            channels,
        }
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.channels.max(1))
    }

    /// Playback duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / f64::from(self.sample_rate)
    }

    /// Playback duration.
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_secs())
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Frame index closest to `secs` into the buffer, clamped to the end.
    pub fn frame_at(&self, secs: f64) -> usize {
        if secs <= 0.0 {
            return 0;
        }
        let frame = (secs * f64::from(self.sample_rate)).round() as usize;
        frame.min(self.frames())
    }
}

/// Decode little-endian PCM16 bytes into normalized samples.
///
/// A trailing odd byte is ignored and empty input yields an empty buffer.
pub fn decode_pcm16(raw: &[u8], sample_rate: u32, channels: u16) -> DecodedAudio {
    let samples = raw
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
        .collect();
    DecodedAudio {
        samples,
        sample_rate,
        channels,
    }
}

/// Decode a standard-alphabet base64 payload.
///
/// # Errors
///
/// Returns [`NarratorError::Decode`] if the payload is not valid base64.
pub fn decode_base64(payload: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| NarratorError::Decode(format!("invalid base64 audio payload: {e}")))
}

/// Encode bytes as standard-alphabet base64.
pub fn encode_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}
