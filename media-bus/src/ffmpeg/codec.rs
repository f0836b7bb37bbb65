use std::borrow::Cow;

use ffmpeg_next::codec::{Context, Parameters, decoder, encoder};
use ffmpeg_next::{ChannelLayout, Codec, Dictionary, ffi, frame};

use super::convert::{self, Resampler, Scaler};
use crate::engine::{EncoderConfig, EngineCodec, EngineResult};
use crate::error::EngineError;
use crate::frame::Frame;
use crate::packet::Packet;
use crate::stream::{MediaKind, MediaParams};
use crate::time::Rational;

enum Inner {
    VideoDecoder(decoder::Video),
    AudioDecoder(decoder::Audio),
    VideoEncoder {
        encoder: encoder::Video,
        scaler: Option<Scaler>,
    },
    AudioEncoder {
        encoder: encoder::Audio,
        resampler: Option<Resampler>,
    },
}

/// One opened FFmpeg decoder or encoder.
pub struct FfmpegCodec {
    inner: Inner,
    time_base: Rational,
}

fn unsupported(what: &str) -> EngineError {
    EngineError::Other(format!("{what} is not supported by this codec"))
}

impl FfmpegCodec {
    /// Opens `codec` on a context already carrying the stream parameters.
    pub(super) fn open_decoder(
        codec: Codec,
        mut ctx: Context,
        time_base: Rational,
        check_parameters: bool,
    ) -> EngineResult<Self> {
        unsafe {
            let raw = ctx.as_mut_ptr();
            (*raw).time_base = convert::to_av(time_base).into();
            (*raw).pkt_timebase = convert::to_av(time_base).into();
        }
        let opened = ctx.decoder().open_as(codec)?;
        let inner = match convert::media_kind(codec.medium()) {
            MediaKind::Video => {
                let video = opened.video()?;
                if check_parameters
                    && (video.format() == ffmpeg_next::format::Pixel::None
                        || video.width() == 0
                        || video.height() == 0)
                {
                    return Err(EngineError::Other("missing codec parameters".into()));
                }
                Inner::VideoDecoder(video)
            }
            MediaKind::Audio => Inner::AudioDecoder(opened.audio()?),
            MediaKind::Other => return Err(unsupported("decoding this media type")),
        };
        Ok(Self { inner, time_base })
    }

    /// Configures and opens an encoder, returning it with the stream
    /// parameters its packets will carry.
    pub(super) fn open_encoder(
        codec: Codec,
        config: &EncoderConfig,
    ) -> EngineResult<(Self, Parameters)> {
        let ctx = Context::new_with_codec(codec);
        let mut options = Dictionary::new();
        options.set("strict", "experimental");

        let (inner, parameters, time_base) = match &config.params.media {
            MediaParams::Video(video) => {
                let mut enc = ctx.encoder().video()?;
                let format = match &video.pixel_format {
                    Some(name) => convert::pixel_from_name(name)?,
                    None => codec
                        .video()?
                        .formats()
                        .and_then(|mut f| f.next())
                        .unwrap_or(ffmpeg_next::format::Pixel::YUV420P),
                };
                enc.set_width(video.width);
                enc.set_height(video.height);
                enc.set_format(format);
                enc.set_time_base(convert::to_av(config.time_base));
                enc.set_frame_rate(video.frame_rate.map(convert::to_av));
                let rc = &config.rate_control;
                if rc.bit_rate > 0 {
                    enc.set_bit_rate(rc.bit_rate as usize);
                }
                if rc.max_rate > 0 {
                    enc.set_max_bit_rate(rc.max_rate as usize);
                }
                unsafe {
                    let raw = enc.as_mut_ptr();
                    if rc.buffer_size > 0 {
                        (*raw).rc_buffer_size = rc.buffer_size;
                    }
                    if rc.min_rate > 0 {
                        (*raw).rc_min_rate = rc.min_rate;
                    }
                }
                if config.global_header {
                    enc.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
                }
                let opened = enc.open_with(options)?;
                let parameters = Parameters::from(&opened);
                let time_base = unsafe { (*opened.as_ptr()).time_base };
                (
                    Inner::VideoEncoder {
                        encoder: opened,
                        scaler: None,
                    },
                    parameters,
                    time_base,
                )
            }
            MediaParams::Audio(audio) => {
                let mut enc = ctx.encoder().audio()?;
                let format = match &audio.sample_format {
                    Some(name) => convert::sample_from_name(name)?,
                    None => codec
                        .audio()?
                        .formats()
                        .and_then(|mut f| f.next())
                        .ok_or_else(|| EngineError::NotFound("encoder sample format".into()))?,
                };
                enc.set_rate(audio.sample_rate as i32);
                enc.set_format(format);
                enc.set_time_base(convert::to_av(config.time_base));
                if config.params.bit_rate > 0 {
                    enc.set_bit_rate(config.params.bit_rate as usize);
                }
                enc.set_channel_layout(ChannelLayout::default(i32::from(audio.channels)));
                if config.global_header {
                    enc.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
                }
                let opened = enc.open_with(options)?;
                let parameters = Parameters::from(&opened);
                let time_base = unsafe { (*opened.as_ptr()).time_base };
                (
                    Inner::AudioEncoder {
                        encoder: opened,
                        resampler: None,
                    },
                    parameters,
                    time_base,
                )
            }
            MediaParams::Other => return Err(unsupported("encoding this media type")),
        };
        let time_base = convert::from_av(time_base.into()).unwrap_or(config.time_base);
        Ok((Self { inner, time_base }, parameters))
    }

    fn decoder(&mut self) -> EngineResult<&mut decoder::Opened> {
        match &mut self.inner {
            Inner::VideoDecoder(d) => Ok(&mut **d),
            Inner::AudioDecoder(d) => Ok(&mut **d),
            _ => Err(unsupported("decoding")),
        }
    }
}

impl EngineCodec for FfmpegCodec {
    fn kind(&self) -> MediaKind {
        match self.inner {
            Inner::VideoDecoder(_) | Inner::VideoEncoder { .. } => MediaKind::Video,
            Inner::AudioDecoder(_) | Inner::AudioEncoder { .. } => MediaKind::Audio,
        }
    }

    fn time_base(&self) -> Rational {
        self.time_base
    }

    fn send_packet(&mut self, packet: Option<&Packet>) -> EngineResult<()> {
        let time_base = self.time_base;
        let decoder = self.decoder()?;
        let Some(packet) = packet else {
            decoder.send_eof()?;
            return Ok(());
        };
        let packet = if packet.time_base() != time_base {
            let mut p = packet.clone();
            p.rescale_ts(time_base);
            Cow::Owned(p)
        } else {
            Cow::Borrowed(packet)
        };
        decoder.send_packet(&convert::packet_to_av(&packet))?;
        Ok(())
    }

    fn receive_frame(&mut self) -> EngineResult<Frame> {
        match &mut self.inner {
            Inner::VideoDecoder(d) => {
                let mut frame = frame::Video::empty();
                d.receive_frame(&mut frame)?;
                Ok(Frame::Video(convert::video_from_av(&frame)))
            }
            Inner::AudioDecoder(d) => {
                let mut frame = frame::Audio::empty();
                d.receive_frame(&mut frame)?;
                Ok(Frame::Audio(convert::audio_from_av(&frame)))
            }
            _ => Err(unsupported("decoding")),
        }
    }

    fn send_frame(&mut self, frame: Option<&Frame>) -> EngineResult<()> {
        match (&mut self.inner, frame) {
            (Inner::VideoEncoder { encoder, .. }, None) => encoder.send_eof()?,
            (Inner::AudioEncoder { encoder, .. }, None) => encoder.send_eof()?,
            (Inner::VideoEncoder { encoder, scaler }, Some(Frame::Video(video))) => {
                let mut av = convert::video_to_av(video)?;
                if av.format() != encoder.format()
                    || av.width() != encoder.width()
                    || av.height() != encoder.height()
                {
                    if !scaler.as_ref().is_some_and(|s| s.fits(&av)) {
                        *scaler = Some(Scaler::new(
                            &av,
                            encoder.format(),
                            encoder.width(),
                            encoder.height(),
                        )?);
                    }
                    if let Some(s) = scaler.as_mut() {
                        av = s.run(&av)?;
                    }
                }
                encoder.send_frame(&av)?;
            }
            (Inner::AudioEncoder { encoder, resampler }, Some(Frame::Audio(audio))) => {
                let mut av = convert::audio_to_av(audio)?;
                if av.rate() != encoder.rate() {
                    return Err(EngineError::Other(format!(
                        "sample rate conversion from {} to {} is not supported",
                        av.rate(),
                        encoder.rate()
                    )));
                }
                if av.format() != encoder.format() || av.channels() != encoder.channels() {
                    if !resampler.as_ref().is_some_and(|r| r.fits(&av)) {
                        let layout = encoder.channel_layout();
                        *resampler = Some(Resampler::new(&av, encoder.format(), layout)?);
                    }
                    if let Some(r) = resampler.as_mut() {
                        av = r.run(&av)?;
                    }
                }
                encoder.send_frame(&av)?;
            }
            _ => return Err(EngineError::Other("frame kind does not match the encoder".into())),
        }
        Ok(())
    }

    fn receive_packet(&mut self) -> EngineResult<Packet> {
        let mut packet = ffmpeg_next::codec::packet::Packet::empty();
        match &mut self.inner {
            Inner::VideoEncoder { encoder, .. } => encoder.receive_packet(&mut packet)?,
            Inner::AudioEncoder { encoder, .. } => encoder.receive_packet(&mut packet)?,
            _ => return Err(unsupported("encoding")),
        }
        Ok(convert::packet_from_av(&packet, 0, self.time_base))
    }

    fn flush(&mut self) {
        match &mut self.inner {
            Inner::VideoDecoder(d) => d.flush(),
            Inner::AudioDecoder(d) => d.flush(),
            Inner::VideoEncoder { encoder, .. } => unsafe {
                ffi::avcodec_flush_buffers(encoder.as_mut_ptr());
            },
            Inner::AudioEncoder { encoder, .. } => unsafe {
                ffi::avcodec_flush_buffers(encoder.as_mut_ptr());
            },
        }
    }
}
