//! Stream copy from one container into another without decoding.

use tokio_util::sync::CancellationToken;

use crate::container::{ContainerSession, Direction};
use crate::engine::MediaEngine;
use crate::error::{MediaError, Result};
use crate::stream::MediaKind;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RemuxStats {
    pub video_packets: u64,
    pub audio_packets: u64,
}

/// Copies every packet of the input's primary streams into the matching
/// output streams, then writes the trailer.
///
/// The output must already carry copies of those streams and its header.
/// Timestamps are rescaled to the output stream clock and the byte position
/// is cleared. A packet of any other stream aborts the run with
/// [`MediaError::UnexpectedStream`].
pub fn remux<E: MediaEngine>(
    input: &mut ContainerSession<E>,
    output: &mut ContainerSession<E>,
    cancel: &CancellationToken,
) -> Result<RemuxStats> {
    let outcome = copy_packets(input, output, cancel);
    output.finish(outcome)
}

fn copy_packets<E: MediaEngine>(
    input: &mut ContainerSession<E>,
    output: &mut ContainerSession<E>,
    cancel: &CancellationToken,
) -> Result<RemuxStats> {
    let video = input.video_stream_index();
    let audio = input.audio_stream_index();
    let mut stats = RemuxStats::default();

    while let Some(mut packet) = input.read_packet()? {
        if cancel.is_cancelled() {
            return Err(MediaError::Cancelled);
        }
        let index = packet.index();
        let kind = if Some(index) == video {
            MediaKind::Video
        } else if Some(index) == audio {
            MediaKind::Audio
        } else {
            return Err(MediaError::UnexpectedStream(index));
        };
        let (Some(target), Some(time_base)) =
            (output.stream_index(kind), output.stream_time_base(kind))
        else {
            return Err(MediaError::InvalidState("output lacks a stream for a copied kind"));
        };

        packet.rescale_ts(time_base);
        packet.set_position(None);
        packet.set_index(target);
        output.write_packet(packet)?;
        match kind {
            MediaKind::Video => stats.video_packets += 1,
            _ => stats.audio_packets += 1,
        }
    }
    log::info!(
        "remuxed {} video and {} audio packets",
        stats.video_packets,
        stats.audio_packets
    );
    Ok(stats)
}

/// Opens `input`, creates `output` with copies of its primary streams and
/// remuxes one into the other.
pub fn remux_file<E: MediaEngine + Clone>(
    engine: E,
    input: &str,
    output: &str,
    cancel: &CancellationToken,
) -> Result<RemuxStats> {
    let mut source = ContainerSession::open(engine.clone(), Direction::Input, input)?;
    source.discover_streams()?;
    let mut sink = ContainerSession::open(engine, Direction::Output, output)?;
    sink.copy_streams_from(&source)?;
    sink.write_header()?;
    remux(&mut source, &mut sink, cancel)
}

#[cfg(test)]
#[path = "remux_test.rs"]
mod remux_test;
