//! Transcode and live-ingestion configuration, loadable from JSON.

use std::path::Path;

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::engine::RateControl;
use crate::error::{MediaError, Result};
use crate::live::OverflowPolicy;

pub const DEFAULT_AUDIO_BIT_RATE: i64 = 196_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeSettings {
    pub video_codec: String,
    pub audio_codec: String,
    /// Output picture size; both or neither. Defaults to the source size.
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Defaults to the source pixel format.
    pub pixel_format: Option<String>,
    /// Video bitrate in bits per second, 0 for the encoder default.
    pub bit_rate: i64,
    pub rc_buffer_size: i32,
    pub rc_max_rate: i64,
    pub rc_min_rate: i64,
    /// Defaults to the source sample rate.
    pub audio_sample_rate: Option<u32>,
    /// Defaults to the source channel count; no remixing is done.
    pub audio_channels: Option<u16>,
    pub audio_bit_rate: i64,
}

impl Default for TranscodeSettings {
    fn default() -> Self {
        Self {
            video_codec: "mpeg4".into(),
            audio_codec: "aac".into(),
            width: None,
            height: None,
            pixel_format: None,
            bit_rate: 0,
            rc_buffer_size: 0,
            rc_max_rate: 0,
            rc_min_rate: 0,
            audio_sample_rate: None,
            audio_channels: None,
            audio_bit_rate: DEFAULT_AUDIO_BIT_RATE,
        }
    }
}

impl TranscodeSettings {
    pub fn from_json(json: &str) -> Result<Self> {
        parse(json)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        load(path.as_ref())
    }

    pub fn validate(&self) -> Result<()> {
        if self.video_codec.trim().is_empty() || self.audio_codec.trim().is_empty() {
            return Err(MediaError::Configuration("codec names must not be empty".into()));
        }
        match (self.width, self.height) {
            (Some(0), _) | (_, Some(0)) => {
                return Err(MediaError::Configuration("picture size must be positive".into()));
            }
            (Some(_), None) | (None, Some(_)) => {
                return Err(MediaError::Configuration(
                    "width and height must be given together".into(),
                ));
            }
            _ => {}
        }
        if self.bit_rate < 0
            || self.rc_buffer_size < 0
            || self.rc_max_rate < 0
            || self.rc_min_rate < 0
            || self.audio_bit_rate < 0
        {
            return Err(MediaError::Configuration("rates must not be negative".into()));
        }
        if self.rc_max_rate > 0 && self.rc_min_rate > self.rc_max_rate {
            return Err(MediaError::Configuration(
                "rc_min_rate is above rc_max_rate".into(),
            ));
        }
        if self.audio_sample_rate == Some(0) || self.audio_channels == Some(0) {
            return Err(MediaError::Configuration(
                "audio sample rate and channels must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn rate_control(&self) -> RateControl {
        RateControl {
            bit_rate: self.bit_rate,
            buffer_size: self.rc_buffer_size,
            max_rate: self.rc_max_rate,
            min_rate: self.rc_min_rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveSettings {
    pub codec: String,
    pub width: u32,
    pub height: u32,
    /// Packets held before the overflow policy applies.
    pub queue_capacity: usize,
    pub overflow: OverflowPolicy,
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            codec: "h264".into(),
            width: 1280,
            height: 720,
            queue_capacity: 256,
            overflow: OverflowPolicy::DropOldest,
        }
    }
}

impl LiveSettings {
    pub fn from_json(json: &str) -> Result<Self> {
        parse(json)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        load(path.as_ref())
    }

    pub fn validate(&self) -> Result<()> {
        if self.codec.trim().is_empty() {
            return Err(MediaError::Configuration("codec name must not be empty".into()));
        }
        if self.overflow != OverflowPolicy::Unbounded && self.queue_capacity == 0 {
            return Err(MediaError::Configuration(
                "a bounded queue needs a capacity".into(),
            ));
        }
        Ok(())
    }
}

fn parse<T: DeserializeOwned>(json: &str) -> Result<T> {
    serde_json::from_str(json).map_err(|e| MediaError::Configuration(format!("settings: {e}")))
}

fn load<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let json = std::fs::read_to_string(path).map_err(|e| {
        MediaError::Configuration(format!("cannot read {}: {}", path.display(), e))
    })?;
    parse(&json)
}

#[cfg(test)]
#[path = "settings_test.rs"]
mod settings_test;
