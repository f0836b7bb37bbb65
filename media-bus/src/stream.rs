use std::fmt;

use bytes::Bytes;
use serde::Serialize;

use crate::time::Rational;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
    /// Subtitles, data, attachments. Never decoded.
    Other,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Other => "other",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct VideoParams {
    pub width: u32,
    pub height: u32,
    /// Pixel format name, e.g. "yuv420p".
    pub pixel_format: Option<String>,
    pub frame_rate: Option<Rational>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AudioParams {
    pub sample_rate: u32,
    pub channels: u16,
    /// Sample format name, e.g. "fltp".
    pub sample_format: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MediaParams {
    Video(VideoParams),
    Audio(AudioParams),
    Other,
}

impl MediaParams {
    pub fn kind(&self) -> MediaKind {
        match self {
            MediaParams::Video(_) => MediaKind::Video,
            MediaParams::Audio(_) => MediaKind::Audio,
            MediaParams::Other => MediaKind::Other,
        }
    }
}

/// Engine-neutral view of a stream's codec parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CodecParams {
    /// Canonical codec name, e.g. "h264", "aac".
    pub codec: String,
    pub bit_rate: i64,
    pub media: MediaParams,
}

impl CodecParams {
    pub fn kind(&self) -> MediaKind {
        self.media.kind()
    }

    pub fn video(&self) -> Option<&VideoParams> {
        match &self.media {
            MediaParams::Video(v) => Some(v),
            _ => None,
        }
    }

    pub fn audio(&self) -> Option<&AudioParams> {
        match &self.media {
            MediaParams::Audio(a) => Some(a),
            _ => None,
        }
    }
}

/// A codec implementation the engine resolved for a codec name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecHandle {
    /// Canonical codec name, e.g. "hevc".
    pub codec: String,
    /// Name of the implementation, e.g. "libx265".
    pub implementation: String,
    pub kind: MediaKind,
}

/// One elementary stream of a container.
#[derive(Debug, Clone)]
pub struct StreamDescriptor {
    pub index: usize,
    pub params: CodecParams,
    pub time_base: Rational,
    /// Stream duration in `time_base` units, if the container knows it.
    pub duration: Option<i64>,
    /// Codec configuration record carried by the container, possibly empty.
    pub extradata: Bytes,
    /// Decoder resolved during discovery. `None` means the stream is not decodable.
    pub decoder: Option<CodecHandle>,
}

impl StreamDescriptor {
    pub fn kind(&self) -> MediaKind {
        self.params.kind()
    }

    pub fn is_video(&self) -> bool {
        self.kind() == MediaKind::Video
    }

    pub fn is_audio(&self) -> bool {
        self.kind() == MediaKind::Audio
    }

    pub fn frame_rate(&self) -> Option<Rational> {
        self.params.video().and_then(|v| v.frame_rate)
    }

    /// Stream duration in seconds, if known.
    pub fn duration_seconds(&self) -> Option<f64> {
        self.duration
            .map(|d| crate::time::to_seconds(d, self.time_base))
    }
}
