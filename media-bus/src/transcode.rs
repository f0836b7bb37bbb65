//! Decode, re-encode and mux, one stream kind per pass.
//!
//! A pass reads the input front to back for a single kind and discards the
//! other kind's packets, so video and audio are processed in two sequential
//! passes with a seek back to the start in between. The output therefore
//! holds the video packets first, then the audio ones, and relies on the
//! muxer's interleaving buffer for anything finer.

use tokio_util::sync::CancellationToken;

use crate::codec::EncodeOutcome;
use crate::container::{ContainerSession, Direction, StreamSetup};
use crate::engine::{EncoderConfig, MediaEngine};
use crate::error::{MediaError, Result};
use crate::packet::Packet;
use crate::retime::RetimingBuffer;
use crate::settings::TranscodeSettings;
use crate::stream::{AudioParams, CodecParams, MediaKind, MediaParams, StreamDescriptor, VideoParams};
use crate::time::Rational;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassStats {
    /// Frames decoded from the input.
    pub frames: u64,
    /// Packets the encoder produced.
    pub packets: u64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TranscodeStats {
    pub video: PassStats,
    pub audio: PassStats,
}

impl TranscodeStats {
    fn record(&mut self, kind: MediaKind, pass: PassStats) {
        match kind {
            MediaKind::Video => self.video = pass,
            _ => self.audio = pass,
        }
    }
}

/// Encoder setup for re-encoding `source` with `settings`.
///
/// Unset picture size, pixel format, sample rate and channel count follow
/// the source stream. Video encodes on a `1/den` clock of the source time
/// base, audio on `1/sample_rate`.
pub fn encoder_config(source: &StreamDescriptor, settings: &TranscodeSettings) -> Result<EncoderConfig> {
    match &source.params.media {
        MediaParams::Video(video) => {
            let (width, height) = match (settings.width, settings.height) {
                (Some(w), Some(h)) => (w, h),
                _ => (video.width, video.height),
            };
            if width == 0 || height == 0 {
                return Err(MediaError::Configuration(format!(
                    "stream {} has no picture size, set width and height",
                    source.index
                )));
            }
            Ok(EncoderConfig {
                params: CodecParams {
                    codec: settings.video_codec.clone(),
                    bit_rate: settings.bit_rate,
                    media: MediaParams::Video(VideoParams {
                        width,
                        height,
                        pixel_format: settings
                            .pixel_format
                            .clone()
                            .or_else(|| video.pixel_format.clone()),
                        frame_rate: video.frame_rate,
                    }),
                },
                time_base: Rational::per_second(source.time_base.denominator())?,
                rate_control: settings.rate_control(),
                global_header: false,
            })
        }
        MediaParams::Audio(audio) => {
            let sample_rate = settings.audio_sample_rate.unwrap_or(audio.sample_rate);
            let channels = settings.audio_channels.unwrap_or(audio.channels);
            if channels == 0 {
                return Err(MediaError::Configuration(format!(
                    "stream {} has no channel layout, set audio_channels",
                    source.index
                )));
            }
            let den = i32::try_from(sample_rate).map_err(|_| {
                MediaError::Configuration(format!("sample rate {sample_rate} is out of range"))
            })?;
            Ok(EncoderConfig {
                params: CodecParams {
                    codec: settings.audio_codec.clone(),
                    bit_rate: settings.audio_bit_rate,
                    media: MediaParams::Audio(AudioParams {
                        sample_rate,
                        channels,
                        sample_format: None,
                    }),
                },
                time_base: Rational::per_second(den)?,
                rate_control: Default::default(),
                global_header: false,
            })
        }
        MediaParams::Other => Err(MediaError::Configuration(format!(
            "stream {} is neither audio nor video",
            source.index
        ))),
    }
}

/// Attaches an encoder stream to `output` for each primary stream of `input`.
pub fn attach_encoders<E: MediaEngine>(
    output: &mut ContainerSession<E>,
    input: &ContainerSession<E>,
    settings: &TranscodeSettings,
) -> Result<()> {
    settings.validate()?;
    for kind in [MediaKind::Video, MediaKind::Audio] {
        let Some(source) = input.primary(kind) else {
            continue;
        };
        let config = encoder_config(source, settings)?;
        output.attach_stream(kind, StreamSetup::Encode(config))?;
    }
    Ok(())
}

/// Re-encodes every primary stream of `input` that has an encoder on
/// `output`, video first, then writes the trailer.
///
/// The output header must already be written.
pub fn transcode<E: MediaEngine>(
    input: &mut ContainerSession<E>,
    output: &mut ContainerSession<E>,
    cancel: &CancellationToken,
) -> Result<TranscodeStats> {
    let outcome = run_passes(input, output, cancel, |output, packet| output.write_packet(packet));
    output.finish(outcome)
}

/// Like [`transcode`], but every encoded packet goes through a
/// [`RetimingBuffer`] first and is written only after both passes, all video
/// before all audio.
///
/// The buffer runs on the input video clock at the input frame rate.
pub fn transcode_buffered<E: MediaEngine>(
    input: &mut ContainerSession<E>,
    output: &mut ContainerSession<E>,
    cancel: &CancellationToken,
) -> Result<TranscodeStats> {
    let outcome = buffered_passes(input, output, cancel);
    output.finish(outcome)
}

fn buffered_passes<E: MediaEngine>(
    input: &mut ContainerSession<E>,
    output: &mut ContainerSession<E>,
    cancel: &CancellationToken,
) -> Result<TranscodeStats> {
    let (Some(time_base), Some(frame_rate)) =
        (input.stream_time_base(MediaKind::Video), input.frame_rate())
    else {
        return Err(MediaError::Configuration(
            "buffered transcode needs a video stream with a known frame rate".into(),
        ));
    };
    let fps = u32::try_from(frame_rate.rounded().max(1)).unwrap_or(u32::MAX);
    let mut buffer = RetimingBuffer::new(time_base, fps)?;

    let stats = run_passes(input, output, cancel, |output, packet| {
        let kind = if Some(packet.index()) == output.video_stream_index() {
            MediaKind::Video
        } else {
            MediaKind::Audio
        };
        buffer.submit(kind, packet)
    })?;
    buffer.flush_to(output)?;
    Ok(stats)
}

fn run_passes<E, F>(
    input: &mut ContainerSession<E>,
    output: &mut ContainerSession<E>,
    cancel: &CancellationToken,
    mut deliver: F,
) -> Result<TranscodeStats>
where
    E: MediaEngine,
    F: FnMut(&mut ContainerSession<E>, Packet) -> Result<()>,
{
    input.discover_streams()?;
    let kinds: Vec<MediaKind> = [MediaKind::Video, MediaKind::Audio]
        .into_iter()
        .filter(|&kind| {
            let wanted = input.stream_index(kind).is_some() && output.codec(kind).is_some();
            if !wanted {
                log::debug!("no {kind} pass");
            }
            wanted
        })
        .collect();

    let mut stats = TranscodeStats::default();
    for (n, kind) in kinds.into_iter().enumerate() {
        if n > 0 {
            input.reset_read_position()?;
        }
        let pass = run_pass(input, output, kind, cancel, &mut deliver)?;
        log::info!(
            "{kind} pass: {} frames decoded, {} packets encoded",
            pass.frames,
            pass.packets
        );
        stats.record(kind, pass);
    }
    Ok(stats)
}

fn run_pass<E, F>(
    input: &mut ContainerSession<E>,
    output: &mut ContainerSession<E>,
    kind: MediaKind,
    cancel: &CancellationToken,
    deliver: &mut F,
) -> Result<PassStats>
where
    E: MediaEngine,
    F: FnMut(&mut ContainerSession<E>, Packet) -> Result<()>,
{
    let mut stats = PassStats::default();
    loop {
        let frame = match input.read_next_frame(kind, cancel) {
            Ok(frame) => frame,
            Err(e) if e.is_exhausted() => break,
            Err(e) => return Err(e),
        };
        stats.frames += 1;
        let mut outcome = output.encode_frame(kind, Some(&frame))?;
        while let EncodeOutcome::PacketReady(packet) = outcome {
            deliver(output, packet)?;
            stats.packets += 1;
            outcome = output.receive_encoded(kind)?;
        }
    }

    // flush whatever the encoder still holds
    loop {
        if cancel.is_cancelled() {
            return Err(MediaError::Cancelled);
        }
        match output.encode_frame(kind, None)? {
            EncodeOutcome::PacketReady(packet) => {
                deliver(output, packet)?;
                stats.packets += 1;
            }
            EncodeOutcome::NeedMoreInput | EncodeOutcome::EndOfStream => break,
        }
    }
    Ok(stats)
}

/// Opens both containers, wires encoders from `settings` and transcodes.
pub fn transcode_file<E: MediaEngine + Clone>(
    engine: E,
    input: &str,
    output: &str,
    settings: &TranscodeSettings,
    cancel: &CancellationToken,
) -> Result<TranscodeStats> {
    let (mut source, mut sink) = prepare(engine, input, output, settings)?;
    transcode(&mut source, &mut sink, cancel)
}

/// [`transcode_file`] through the re-timing buffer.
pub fn transcode_buffered_file<E: MediaEngine + Clone>(
    engine: E,
    input: &str,
    output: &str,
    settings: &TranscodeSettings,
    cancel: &CancellationToken,
) -> Result<TranscodeStats> {
    let (mut source, mut sink) = prepare(engine, input, output, settings)?;
    transcode_buffered(&mut source, &mut sink, cancel)
}

fn prepare<E: MediaEngine + Clone>(
    engine: E,
    input: &str,
    output: &str,
    settings: &TranscodeSettings,
) -> Result<(ContainerSession<E>, ContainerSession<E>)> {
    settings.validate()?;
    let mut source = ContainerSession::open(engine.clone(), Direction::Input, input)?;
    source.discover_streams()?;
    let mut sink = ContainerSession::open(engine, Direction::Output, output)?;
    attach_encoders(&mut sink, &source, settings)?;
    sink.write_header()?;
    Ok((source, sink))
}

#[cfg(test)]
#[path = "transcode_test.rs"]
mod transcode_test;
