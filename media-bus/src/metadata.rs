//! Probe-style description of an opened input (similar to ffprobe).

use std::fmt;

use serde::Serialize;

use crate::container::ContainerSession;
use crate::engine::MediaEngine;
use crate::stream::{MediaKind, MediaParams, StreamDescriptor};

#[derive(Debug, Clone, Serialize)]
pub struct FormatInfo {
    /// Format name, e.g. "matroska,webm".
    pub format_name: String,
    /// None if unknown (e.g. raw h264).
    pub duration_seconds: Option<f64>,
    /// Total bitrate in bps; 0 if unknown.
    pub bit_rate: i64,
    pub stream_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamInfo {
    pub index: usize,
    pub kind: MediaKind,
    pub codec_name: String,
    /// e.g. "1/90000"
    pub time_base: String,
    /// In time base units.
    pub duration_ts: Option<i64>,
    /// Video only, e.g. "25/1".
    pub frame_rate: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub pixel_format: Option<String>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    pub sample_format: Option<String>,
    /// Decoder implementation resolved for the stream.
    pub decoder: Option<String>,
    /// Chosen as the primary stream of its kind.
    pub primary: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MediaInfo {
    pub format: FormatInfo,
    pub streams: Vec<StreamInfo>,
}

/// Collects format and stream details of `session`. Decoder names and
/// primary flags are filled in once streams were resolved.
pub fn describe<E: MediaEngine>(session: &ContainerSession<E>) -> MediaInfo {
    let details = session.details();
    let primaries = [session.video_stream_index(), session.audio_stream_index()];
    let streams: Vec<StreamInfo> = session
        .streams()
        .map(|s| stream_info(s, primaries.contains(&Some(s.index))))
        .collect();
    MediaInfo {
        format: FormatInfo {
            format_name: details.format_name.clone(),
            duration_seconds: details.duration_seconds,
            bit_rate: details.bit_rate,
            stream_count: streams.len(),
        },
        streams,
    }
}

fn stream_info(stream: &StreamDescriptor, primary: bool) -> StreamInfo {
    let mut info = StreamInfo {
        index: stream.index,
        kind: stream.kind(),
        codec_name: stream.params.codec.clone(),
        time_base: stream.time_base.to_string(),
        duration_ts: stream.duration,
        frame_rate: None,
        width: None,
        height: None,
        pixel_format: None,
        sample_rate: None,
        channels: None,
        sample_format: None,
        decoder: stream.decoder.as_ref().map(|d| d.implementation.clone()),
        primary,
    };
    match &stream.params.media {
        MediaParams::Video(v) => {
            info.frame_rate = v.frame_rate.map(|r| r.to_string());
            info.width = Some(v.width);
            info.height = Some(v.height);
            info.pixel_format = v.pixel_format.clone();
        }
        MediaParams::Audio(a) => {
            info.sample_rate = Some(a.sample_rate);
            info.channels = Some(a.channels);
            info.sample_format = a.sample_format.clone();
        }
        MediaParams::Other => {}
    }
    info
}

impl fmt::Display for MediaInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[FORMAT]")?;
        writeln!(f, "format_name={}", self.format.format_name)?;
        match self.format.duration_seconds {
            Some(d) => writeln!(f, "duration={:.3}", d)?,
            None => writeln!(f, "duration=N/A")?,
        }
        writeln!(f, "bit_rate={}", self.format.bit_rate)?;
        writeln!(f, "nb_streams={}", self.format.stream_count)?;
        writeln!(f, "[/FORMAT]")?;
        for s in &self.streams {
            writeln!(f, "[STREAM]")?;
            writeln!(f, "index={}", s.index)?;
            writeln!(f, "codec_type={}", s.kind)?;
            writeln!(f, "codec_name={}", s.codec_name)?;
            writeln!(f, "time_base={}", s.time_base)?;
            if let Some(d) = s.duration_ts {
                writeln!(f, "duration_ts={}", d)?;
            }
            if let Some(r) = &s.frame_rate {
                writeln!(f, "r_frame_rate={}", r)?;
            }
            if let (Some(w), Some(h)) = (s.width, s.height) {
                writeln!(f, "width={}", w)?;
                writeln!(f, "height={}", h)?;
            }
            if let Some(p) = &s.pixel_format {
                writeln!(f, "pix_fmt={}", p)?;
            }
            if let Some(sr) = s.sample_rate {
                writeln!(f, "sample_rate={}", sr)?;
            }
            if let Some(c) = s.channels {
                writeln!(f, "channels={}", c)?;
            }
            if let Some(sf) = &s.sample_format {
                writeln!(f, "sample_fmt={}", sf)?;
            }
            writeln!(f, "decoder={}", s.decoder.as_deref().unwrap_or("N/A"))?;
            writeln!(f, "primary={}", s.primary)?;
            writeln!(f, "[/STREAM]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "metadata_test.rs"]
mod metadata_test;
