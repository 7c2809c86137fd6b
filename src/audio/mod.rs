//! Narration audio: PCM decoding, output devices, and playback control.

pub mod codec;
pub mod output;
pub mod playback;

pub use codec::{DecodedAudio, decode_base64, decode_pcm16};
pub use output::{AudioOutput, CpalOutput, PlaybackEvent};
pub use playback::PlaybackController;
