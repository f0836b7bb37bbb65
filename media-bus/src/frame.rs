use std::fmt::{Display, Formatter};

use bytes::Bytes;

use crate::stream::MediaKind;
use crate::time::{self, Rational};

/// One plane of pixel or sample data. `stride` is the byte length of a row
/// (video) or of the whole plane (audio).
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    pub data: Bytes,
    pub stride: usize,
}

impl Plane {
    pub fn new(data: impl Into<Bytes>, stride: usize) -> Self {
        Self {
            data: data.into(),
            stride,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub planes: Vec<Plane>,
    pub width: u32,
    pub height: u32,
    /// Pixel format name, e.g. "yuv420p".
    pub pixel_format: String,
    pub pts: Option<i64>,
    pub is_key: bool,
    /// Clock of `pts`; set once the frame is attributed to a stream.
    pub time_base: Option<Rational>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// One plane per channel for planar formats, a single plane otherwise.
    pub planes: Vec<Plane>,
    pub samples: usize,
    pub sample_rate: u32,
    pub channels: u16,
    /// Sample format name, e.g. "fltp".
    pub sample_format: String,
    pub pts: Option<i64>,
    pub time_base: Option<Rational>,
}

/// A decoded picture or block of samples.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Video(VideoFrame),
    Audio(AudioFrame),
}

impl Frame {
    pub fn kind(&self) -> MediaKind {
        match self {
            Frame::Video(_) => MediaKind::Video,
            Frame::Audio(_) => MediaKind::Audio,
        }
    }

    pub fn pts(&self) -> Option<i64> {
        match self {
            Frame::Video(v) => v.pts,
            Frame::Audio(a) => a.pts,
        }
    }

    pub fn set_pts(&mut self, pts: Option<i64>) {
        match self {
            Frame::Video(v) => v.pts = pts,
            Frame::Audio(a) => a.pts = pts,
        }
    }

    pub fn time_base(&self) -> Option<Rational> {
        match self {
            Frame::Video(v) => v.time_base,
            Frame::Audio(a) => a.time_base,
        }
    }

    pub fn set_time_base(&mut self, time_base: Rational) {
        match self {
            Frame::Video(v) => v.time_base = Some(time_base),
            Frame::Audio(a) => a.time_base = Some(time_base),
        }
    }

    /// Moves pts onto `to`. Frames without a known clock are only re-labelled.
    pub fn rescale_ts(&mut self, to: Rational) {
        if let Some(from) = self.time_base() {
            let pts = time::rescale_opt(self.pts(), from, to);
            self.set_pts(pts);
        }
        self.set_time_base(to);
    }

    /// Presentation time in seconds, from the frame's own stream clock.
    pub fn pts_seconds(&self) -> Option<f64> {
        let tb = self.time_base()?;
        self.pts().map(|pts| time::to_seconds(pts, tb))
    }

    pub fn planes(&self) -> &[Plane] {
        match self {
            Frame::Video(v) => &v.planes,
            Frame::Audio(a) => &a.planes,
        }
    }
}

impl Display for Frame {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            Frame::Video(v) => write!(
                f,
                "VideoFrame {}x{} {} pts: {:?}, planes: {}",
                v.width,
                v.height,
                v.pixel_format,
                v.pts,
                v.planes.len()
            ),
            Frame::Audio(a) => write!(
                f,
                "AudioFrame {} samples @ {}Hz x{} {} pts: {:?}",
                a.samples, a.sample_rate, a.channels, a.sample_format, a.pts
            ),
        }
    }
}

/// Most recent decoded frame per kind. A session keeps one of these so that
/// reading audio never clobbers the last video picture and vice versa.
#[derive(Debug, Default, Clone)]
pub struct FrameSlots {
    video: Option<VideoFrame>,
    audio: Option<AudioFrame>,
}

impl FrameSlots {
    pub fn store(&mut self, frame: Frame) {
        match frame {
            Frame::Video(v) => self.video = Some(v),
            Frame::Audio(a) => self.audio = Some(a),
        }
    }

    pub fn video(&self) -> Option<&VideoFrame> {
        self.video.as_ref()
    }

    pub fn audio(&self) -> Option<&AudioFrame> {
        self.audio.as_ref()
    }

    pub fn clear(&mut self) {
        self.video = None;
        self.audio = None;
    }
}

/// Consumer of decoded pictures, e.g. a display surface.
///
/// Bound planes are only valid for the duration of the call; a sink that
/// needs them later must copy (cloning a [`Plane`] is cheap).
pub trait FrameSink {
    fn bind_picture(&mut self, frame: &VideoFrame);

    /// Called after [`FrameSink::bind_picture`] with the frame's
    /// presentation time, so the sink can pace itself.
    fn present_at(&mut self, pts_seconds: f64);

    /// Checked before every frame; `true` ends presentation.
    fn should_stop(&self) -> bool {
        false
    }
}
