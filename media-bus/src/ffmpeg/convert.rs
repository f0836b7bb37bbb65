//! Conversions between `ffmpeg-next` values and the crate's own types.

use std::ffi::{CStr, CString};

use bytes::Bytes;
use ffmpeg_next::format::{Pixel, Sample};
use ffmpeg_next::{ChannelLayout, ffi, frame, software};

use crate::engine::EngineResult;
use crate::error::EngineError;
use crate::frame::{AudioFrame, Plane, VideoFrame};
use crate::packet::Packet;
use crate::stream::{AudioParams, CodecParams, MediaKind, MediaParams, VideoParams};
use crate::time::Rational;

pub fn to_av(r: Rational) -> ffmpeg_next::Rational {
    ffmpeg_next::Rational::new(r.numerator(), r.denominator())
}

/// `None` for FFmpeg's "unknown" rationals (zero denominator).
pub fn from_av(r: ffmpeg_next::Rational) -> Option<Rational> {
    Rational::new(r.numerator(), r.denominator()).ok()
}

pub fn media_kind(medium: ffmpeg_next::media::Type) -> MediaKind {
    match medium {
        ffmpeg_next::media::Type::Video => MediaKind::Video,
        ffmpeg_next::media::Type::Audio => MediaKind::Audio,
        _ => MediaKind::Other,
    }
}

fn c_name(name: *const std::os::raw::c_char) -> Option<String> {
    if name.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned())
}

fn c_string(name: &str) -> EngineResult<CString> {
    CString::new(name).map_err(|_| EngineError::Other(format!("invalid name {name:?}")))
}

pub fn pixel_name(pixel: Pixel) -> Option<String> {
    if pixel == Pixel::None {
        return None;
    }
    c_name(unsafe { ffi::av_get_pix_fmt_name(pixel.into()) })
}

pub fn pixel_from_name(name: &str) -> EngineResult<Pixel> {
    let cname = c_string(name)?;
    let pixel = Pixel::from(unsafe { ffi::av_get_pix_fmt(cname.as_ptr()) });
    if pixel == Pixel::None {
        return Err(EngineError::NotFound(format!("pixel format {name}")));
    }
    Ok(pixel)
}

pub fn sample_name(sample: Sample) -> Option<String> {
    if sample == Sample::None {
        return None;
    }
    c_name(unsafe { ffi::av_get_sample_fmt_name(sample.into()) })
}

pub fn sample_from_name(name: &str) -> EngineResult<Sample> {
    let cname = c_string(name)?;
    let sample = Sample::from(unsafe { ffi::av_get_sample_fmt(cname.as_ptr()) });
    if sample == Sample::None {
        return Err(EngineError::NotFound(format!("sample format {name}")));
    }
    Ok(sample)
}

/// Reads the engine-neutral view of a stream's codec parameters.
///
/// Width, height, formats and channel count are not exposed by
/// `ffmpeg-next` on `Parameters`, so they are read from a codec context
/// filled from them.
pub fn codec_params(
    params: &ffmpeg_next::codec::Parameters,
    frame_rate: ffmpeg_next::Rational,
) -> CodecParams {
    let codec = params.id().name().to_string();
    let kind = media_kind(params.medium());
    let (bit_rate, media) = match ffmpeg_next::codec::Context::from_parameters(params.clone()) {
        Ok(ctx) => unsafe {
            let raw = ctx.as_ptr();
            let media = match kind {
                MediaKind::Video => MediaParams::Video(VideoParams {
                    width: (*raw).width.max(0) as u32,
                    height: (*raw).height.max(0) as u32,
                    pixel_format: pixel_name(Pixel::from((*raw).pix_fmt)),
                    frame_rate: from_av(frame_rate).filter(|r| r.numerator() > 0),
                }),
                MediaKind::Audio => MediaParams::Audio(AudioParams {
                    sample_rate: (*raw).sample_rate.max(0) as u32,
                    channels: (*raw).ch_layout.nb_channels.clamp(0, u16::MAX as i32) as u16,
                    sample_format: sample_name(Sample::from((*raw).sample_fmt)),
                }),
                MediaKind::Other => MediaParams::Other,
            };
            ((*raw).bit_rate, media)
        },
        Err(e) => {
            log::warn!("cannot read {codec} parameters: {e}");
            let media = match kind {
                MediaKind::Video => MediaParams::Video(VideoParams::default()),
                MediaKind::Audio => MediaParams::Audio(AudioParams::default()),
                MediaKind::Other => MediaParams::Other,
            };
            (0, media)
        }
    };
    CodecParams {
        codec,
        bit_rate,
        media,
    }
}

/// Copy of the codec configuration record, empty when there is none.
pub fn extradata(params: &ffmpeg_next::codec::Parameters) -> Bytes {
    unsafe {
        let raw = params.as_ptr();
        let data = (*raw).extradata;
        let size = (*raw).extradata_size;
        if data.is_null() || size <= 0 {
            return Bytes::new();
        }
        Bytes::copy_from_slice(std::slice::from_raw_parts(data, size as usize))
    }
}

pub fn packet_from_av(
    packet: &ffmpeg_next::codec::packet::Packet,
    stream_index: usize,
    time_base: Rational,
) -> Packet {
    let data = packet
        .data()
        .map(Bytes::copy_from_slice)
        .unwrap_or_default();
    let position = packet.position();
    Packet::new(data, stream_index, time_base)
        .with_timestamps(packet.pts(), packet.dts())
        .with_duration(packet.duration())
        .with_key(packet.is_key())
        .with_position((position >= 0).then_some(position as i64))
}

pub fn packet_to_av(packet: &Packet) -> ffmpeg_next::codec::packet::Packet {
    let mut av = ffmpeg_next::codec::packet::Packet::copy(packet.data());
    av.set_pts(packet.pts());
    av.set_dts(packet.dts());
    av.set_duration(packet.duration());
    av.set_stream(packet.index());
    av.set_position(packet.position().map_or(-1, |p| p as isize));
    if packet.is_key() {
        av.set_flags(ffmpeg_next::codec::packet::Flags::KEY);
    }
    av
}

pub fn video_from_av(frame: &frame::Video) -> VideoFrame {
    let planes = (0..frame.planes())
        .map(|i| Plane::new(Bytes::copy_from_slice(frame.data(i)), frame.stride(i)))
        .collect();
    VideoFrame {
        planes,
        width: frame.width(),
        height: frame.height(),
        pixel_format: pixel_name(frame.format()).unwrap_or_default(),
        pts: frame.timestamp().or_else(|| frame.pts()),
        is_key: frame.is_key(),
        time_base: None,
    }
}

pub fn audio_from_av(frame: &frame::Audio) -> AudioFrame {
    let format = frame.format();
    let channels = usize::from(frame.channels());
    let per_plane = if format.is_planar() { 1 } else { channels };
    let plane_len = frame.samples() * format.bytes() * per_plane;
    let planes = (0..frame.planes())
        .map(|i| {
            let data = frame.data(i);
            let data = &data[..plane_len.min(data.len())];
            Plane::new(Bytes::copy_from_slice(data), data.len())
        })
        .collect();
    AudioFrame {
        planes,
        samples: frame.samples(),
        sample_rate: frame.rate(),
        channels: channels.min(u16::MAX as usize) as u16,
        sample_format: sample_name(format).unwrap_or_default(),
        pts: frame.timestamp().or_else(|| frame.pts()),
        time_base: None,
    }
}

fn copy_rows(dst: &mut [u8], dst_stride: usize, src: &[u8], src_stride: usize) {
    if dst_stride == 0 || src_stride == 0 {
        return;
    }
    let row = dst_stride.min(src_stride);
    for (d, s) in dst.chunks_mut(dst_stride).zip(src.chunks(src_stride)) {
        let n = row.min(d.len()).min(s.len());
        d[..n].copy_from_slice(&s[..n]);
    }
}

pub fn video_to_av(frame: &VideoFrame) -> EngineResult<frame::Video> {
    let pixel = pixel_from_name(&frame.pixel_format)?;
    let mut av = frame::Video::new(pixel, frame.width, frame.height);
    let planes = av.planes();
    for (i, plane) in frame.planes.iter().enumerate().take(planes) {
        let stride = av.stride(i);
        copy_rows(av.data_mut(i), stride, &plane.data, plane.stride);
    }
    av.set_pts(frame.pts);
    Ok(av)
}

pub fn audio_to_av(frame: &AudioFrame) -> EngineResult<frame::Audio> {
    let sample = sample_from_name(&frame.sample_format)?;
    let layout = ChannelLayout::default(i32::from(frame.channels));
    let mut av = frame::Audio::new(sample, frame.samples, layout);
    av.set_rate(frame.sample_rate);
    let planes = av.planes();
    for (i, plane) in frame.planes.iter().enumerate().take(planes) {
        let dst = av.data_mut(i);
        let n = dst.len().min(plane.data.len());
        dst[..n].copy_from_slice(&plane.data[..n]);
    }
    av.set_pts(frame.pts);
    Ok(av)
}

/// Pixel format and size conversion in front of a video encoder. Rebuilt
/// when the incoming frames change shape.
pub struct Scaler {
    context: software::scaling::Context,
    source: (Pixel, u32, u32),
}

impl Scaler {
    pub fn new(src: &frame::Video, format: Pixel, width: u32, height: u32) -> EngineResult<Self> {
        let context = software::scaling::Context::get(
            src.format(),
            src.width(),
            src.height(),
            format,
            width,
            height,
            software::scaling::flag::Flags::BILINEAR,
        )?;
        Ok(Self {
            context,
            source: (src.format(), src.width(), src.height()),
        })
    }

    pub fn fits(&self, src: &frame::Video) -> bool {
        self.source == (src.format(), src.width(), src.height())
    }

    pub fn run(&mut self, src: &frame::Video) -> EngineResult<frame::Video> {
        let mut converted = frame::Video::empty();
        self.context.run(src, &mut converted)?;
        converted.set_pts(src.pts());
        Ok(converted)
    }
}

/// Sample format and channel layout conversion in front of an audio
/// encoder, at an unchanged sample rate.
pub struct Resampler {
    context: software::resampling::Context,
    source: (Sample, ChannelLayout),
}

impl Resampler {
    pub fn new(src: &frame::Audio, format: Sample, layout: ChannelLayout) -> EngineResult<Self> {
        let source = source_layout(src);
        let context = software::resampling::Context::get(
            src.format(),
            source,
            src.rate(),
            format,
            layout,
            src.rate(),
        )?;
        Ok(Self {
            context,
            source: (src.format(), source),
        })
    }

    pub fn fits(&self, src: &frame::Audio) -> bool {
        self.source == (src.format(), source_layout(src))
    }

    pub fn run(&mut self, src: &frame::Audio) -> EngineResult<frame::Audio> {
        let mut converted = frame::Audio::empty();
        self.context.run(src, &mut converted)?;
        converted.set_pts(src.pts());
        Ok(converted)
    }
}

/// Decoders may leave the layout unset; fall back to the default order for
/// the channel count.
fn source_layout(src: &frame::Audio) -> ChannelLayout {
    let layout = src.channel_layout();
    let channels = i32::from(src.channels());
    if layout.is_empty() || layout.channels() != channels {
        ChannelLayout::default(channels)
    } else {
        layout
    }
}
