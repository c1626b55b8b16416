//! Mixer and core configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::frame::{frame_len, CHANNELS, PTIME_MS, SAMPLE_RATE_DEFAULT, SAMPLE_RATE_LEGACY};

/// Parameters the mixer is created with: sample rate, channel count, ptime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixerConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub ptime_ms: u32,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE_DEFAULT,
            channels: CHANNELS,
            ptime_ms: PTIME_MS,
        }
    }
}

impl MixerConfig {
    /// The pre-48kHz-default deployment shape.
    pub fn legacy() -> Self {
        Self {
            sample_rate: SAMPLE_RATE_LEGACY,
            ..Self::default()
        }
    }

    pub fn frame_len(&self) -> usize {
        frame_len(self.sample_rate, self.channels, self.ptime_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate == 0 {
            return Err("sample_rate must be nonzero".to_string());
        }
        if self.channels == 0 {
            return Err("channels must be nonzero".to_string());
        }
        if self.ptime_ms == 0 {
            return Err("ptime_ms must be nonzero".to_string());
        }
        Ok(())
    }
}

/// Everything the embedding application supplies at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    pub mixer: MixerConfig,

    /// Directory audio files are resolved relative to for play/mixer_play.
    pub audio_dir: PathBuf,

    /// Whether to advertise the `urn:ietf:params:rtp-hdrext:ssrc-audio-level`
    /// header extension in `rtp_parameters` responses.
    pub rtp_audio_level: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            mixer: MixerConfig::default(),
            audio_dir: PathBuf::from("."),
            rtp_audio_level: false,
        }
    }
}

impl CoreConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.mixer.validate()
    }
}
