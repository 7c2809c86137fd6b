//! Configuration types for the narrator.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{NarratorError, Result};
use crate::redact::RedactedString;

/// Environment variables consulted for the API key, in order.
pub const API_KEY_ENV_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NarratorConfig {
    /// Remote inference service settings.
    pub gateway: GatewayConfig,
    /// Audio decode/playback settings.
    pub audio: AudioConfig,
}

/// Remote inference service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Base URL of the Gemini API.
    pub base_url: String,
    /// API key. When unset the environment is consulted.
    pub api_key: Option<RedactedString>,
    /// Vision model used to identify the landmark.
    pub identify_model: String,
    /// Search-grounded text model used for the history summary.
    pub history_model: String,
    /// Text-to-speech model used for narration.
    pub speech_model: String,
    /// Prebuilt voice used for narration.
    pub voice_name: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".into(),
            api_key: None,
            identify_model: "gemini-3-pro-preview".into(),
            history_model: "gemini-2.5-flash".into(),
            speech_model: "gemini-2.5-flash-preview-tts".into(),
            voice_name: "Kore".into(),
        }
    }
}

/// Audio decode/playback configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate of the synthesized PCM payload in Hz.
    pub sample_rate: u32,
    /// Channel count of the synthesized PCM payload.
    pub channels: u16,
    /// Output device name (None = system default).
    pub output_device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 24_000,
            channels: 1,
            output_device: None,
        }
    }
}

impl GatewayConfig {
    /// Resolve the API key from the config or the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`NarratorError::Config`] if no non-blank key is found.
    pub fn resolve_api_key(&self) -> Result<RedactedString> {
        self.resolve_api_key_with(|name| std::env::var(name).ok())
    }

    /// Resolve the API key using `lookup` in place of the environment.
    pub fn resolve_api_key_with<F>(&self, lookup: F) -> Result<RedactedString>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.is_blank()) {
            return Ok(key.clone());
        }
        API_KEY_ENV_VARS
            .iter()
            .filter_map(|name| lookup(name))
            .map(RedactedString::new)
            .find(|k| !k.is_blank())
            .ok_or_else(|| {
                NarratorError::Config(format!(
                    "no API key configured; set gateway.api_key or {}",
                    API_KEY_ENV_VARS.join(" / ")
                ))
            })
    }
}

impl NarratorConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            NarratorError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self =
            toml::from_str(&content).map_err(|e| NarratorError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<()> {
        let write_err = |e: std::io::Error| {
            NarratorError::Config(format!("cannot write {}: {e}", path.display()))
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| NarratorError::Config(e.to_string()))?;
        std::fs::write(path, content).map_err(write_err)?;
        Ok(())
    }

    /// Load the config at the default path if it exists, otherwise defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load_or_default() -> Result<Self> {
        let path = Self::default_config_path();
        if path.is_file() {
            Self::from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Returns the default config file path: `~/.config/geonarrator/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("geonarrator").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("geonarrator")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/geonarrator-config/config.toml")
        }
    }

    /// Reject settings that cannot work.
    ///
    /// # Errors
    ///
    /// Returns [`NarratorError::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(NarratorError::Config("audio.sample_rate must be > 0".into()));
        }
        if self.audio.channels == 0 {
            return Err(NarratorError::Config("audio.channels must be > 0".into()));
        }
        if self.gateway.base_url.trim().is_empty() {
            return Err(NarratorError::Config("gateway.base_url must not be empty".into()));
        }
        for (field, value) in [
            ("identify_model", &self.gateway.identify_model),
            ("history_model", &self.gateway.history_model),
            ("speech_model", &self.gateway.speech_model),
            ("voice_name", &self.gateway.voice_name),
        ] {
            if value.trim().is_empty() {
                return Err(NarratorError::Config(format!(
                    "gateway.{field} must not be empty"
                )));
            }
        }
        Ok(())
    }
}
