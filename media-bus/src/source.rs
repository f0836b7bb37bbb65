//! Packet sources and the shared "next frame" loop.
//!
//! A container and a live queue both feed decoders; they differ only in what
//! running dry means. A container that runs dry is finished, while a live
//! queue may simply be waiting for its producer.

use tokio_util::sync::CancellationToken;

use crate::codec::{CodecSession, DecodeOutcome};
use crate::engine::{EngineCodec, EngineInput};
use crate::error::{EngineError, MediaError, Result};
use crate::frame::Frame;
use crate::packet::Packet;

/// Read attempts answered with "try again" before a container is considered dry.
const MAX_READ_RETRIES: usize = 16;

#[derive(Debug)]
pub enum SourcePacket {
    Packet(Packet),
    /// Nothing available right now.
    Empty,
    /// Nothing will ever be available again.
    End,
}

pub trait PacketSource {
    fn next_packet(&mut self) -> Result<SourcePacket>;

    /// Whether a decoder reporting end of stream should be flushed and
    /// reused instead of ending the read.
    fn restarts_after_end(&self) -> bool {
        false
    }
}

/// Packets of an opened input container, in file order.
pub struct DemuxSource<'a, I> {
    input: &'a mut I,
}

impl<'a, I: EngineInput> DemuxSource<'a, I> {
    pub fn new(input: &'a mut I) -> Self {
        Self { input }
    }
}

impl<I: EngineInput> PacketSource for DemuxSource<'_, I> {
    fn next_packet(&mut self) -> Result<SourcePacket> {
        for _ in 0..MAX_READ_RETRIES {
            match self.input.read_packet() {
                Ok(packet) => return Ok(SourcePacket::Packet(packet)),
                Err(EngineError::Again) => continue,
                Err(EngineError::Eof) => return Ok(SourcePacket::End),
                Err(EngineError::OutOfMemory) => return Err(MediaError::OutOfMemory),
                Err(e) => {
                    log::warn!("read failed, treating as end of input: {e}");
                    return Ok(SourcePacket::End);
                }
            }
        }
        log::warn!("input kept asking to retry, treating as end of input");
        Ok(SourcePacket::End)
    }
}

/// Counters kept by [`next_frame`] across calls.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReadStats {
    /// Packets belonging to other streams.
    pub skipped: u64,
    /// Zero-length or corrupt packets.
    pub dropped: u64,
    pub decoded: u64,
}

/// Pulls packets from `source` into `session` until one frame comes out.
///
/// Frames already buffered in the decoder are handed out before anything
/// new is read. Packets of streams other than `stream_index` (when given)
/// are discarded. At the end of the source the decoder is drained; once it
/// is empty the read fails with [`MediaError::DecodeExhausted`].
///
/// `Ok(None)` means the source is momentarily empty.
pub fn next_frame<S, C>(
    source: &mut S,
    session: &mut CodecSession<C>,
    stream_index: Option<usize>,
    stats: &mut ReadStats,
    cancel: &CancellationToken,
) -> Result<Option<Frame>>
where
    S: PacketSource + ?Sized,
    C: EngineCodec,
{
    let kind = session.kind();
    loop {
        if cancel.is_cancelled() {
            return Err(MediaError::Cancelled);
        }
        if let Some(frame) = session.receive_pending()? {
            stats.decoded += 1;
            return Ok(Some(frame));
        }
        if session.is_end_of_stream() {
            if source.restarts_after_end() && !session.is_input_finished() {
                log::debug!("{kind} decoder reached end of stream, flushing");
                session.flush();
            } else {
                return Err(MediaError::DecodeExhausted(kind));
            }
        }
        if session.is_input_finished() {
            // drained on the next receive_pending
            continue;
        }

        let packet = match source.next_packet()? {
            SourcePacket::Packet(packet) => packet,
            SourcePacket::Empty => return Ok(None),
            SourcePacket::End => {
                session.finish_input()?;
                continue;
            }
        };
        if stream_index.is_some_and(|index| packet.index() != index) {
            stats.skipped += 1;
            continue;
        }
        if packet.is_empty() {
            stats.dropped += 1;
            continue;
        }

        match session.decode(&packet) {
            Ok(DecodeOutcome::FrameReady(frame)) => {
                stats.decoded += 1;
                return Ok(Some(frame));
            }
            Ok(DecodeOutcome::NeedMoreInput) => {}
            Ok(DecodeOutcome::InvalidData) => stats.dropped += 1,
            Ok(DecodeOutcome::EndOfStream) => {}
            Err(MediaError::SubmitFailed {
                transient: true, ..
            }) => {}
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
#[path = "source_test.rs"]
mod source_test;
