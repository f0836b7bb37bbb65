//! Re-timing buffer: queues encoded packets per kind and stamps them with a
//! uniform synthetic clock instead of the encoder's timestamps.

use std::collections::VecDeque;

use crate::container::ContainerSession;
use crate::engine::MediaEngine;
use crate::error::{MediaError, Result};
use crate::packet::Packet;
use crate::stream::MediaKind;
use crate::time::Rational;

pub struct RetimingBuffer {
    time_base: Rational,
    increment: i64,
    video: VecDeque<Packet>,
    audio: VecDeque<Packet>,
    last_video_pts: i64,
    last_audio_pts: i64,
}

impl RetimingBuffer {
    /// Every packet advances its kind's clock by `time_base.den / fps`
    /// (integer division), so the first packet lands on one increment.
    pub fn new(time_base: Rational, fps: u32) -> Result<Self> {
        if fps == 0 {
            return Err(MediaError::Configuration("frame rate must be positive".into()));
        }
        let increment = time_base.denominator() as i64 / fps as i64;
        if increment == 0 {
            return Err(MediaError::Configuration(format!(
                "time base {time_base} is too coarse for {fps} fps"
            )));
        }
        Ok(Self {
            time_base,
            increment,
            video: VecDeque::new(),
            audio: VecDeque::new(),
            last_video_pts: 0,
            last_audio_pts: 0,
        })
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    pub fn increment(&self) -> i64 {
        self.increment
    }

    pub fn submit(&mut self, kind: MediaKind, mut packet: Packet) -> Result<()> {
        let (queue, last) = match kind {
            MediaKind::Video => (&mut self.video, &mut self.last_video_pts),
            MediaKind::Audio => (&mut self.audio, &mut self.last_audio_pts),
            MediaKind::Other => {
                return Err(MediaError::InvalidState("only audio and video can be re-timed"));
            }
        };
        let pts = *last + self.increment;
        *last = pts;
        packet.set_time_base(self.time_base);
        packet.set_pts(Some(pts));
        packet.set_dts(Some(pts));
        packet.set_duration(self.increment);
        queue.push_back(packet);
        Ok(())
    }

    pub fn submit_video(&mut self, packet: Packet) -> Result<()> {
        self.submit(MediaKind::Video, packet)
    }

    pub fn submit_audio(&mut self, packet: Packet) -> Result<()> {
        self.submit(MediaKind::Audio, packet)
    }

    /// Oldest queued packet of `kind`.
    pub fn request(&mut self, kind: MediaKind) -> Option<Packet> {
        match kind {
            MediaKind::Video => self.video.pop_front(),
            MediaKind::Audio => self.audio.pop_front(),
            MediaKind::Other => None,
        }
    }

    pub fn len(&self, kind: MediaKind) -> usize {
        match kind {
            MediaKind::Video => self.video.len(),
            MediaKind::Audio => self.audio.len(),
            MediaKind::Other => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.video.is_empty() && self.audio.is_empty()
    }

    /// Writes every queued video packet, then every audio packet, each
    /// moved onto its output stream's clock. A mux failure stops the flush.
    pub fn flush_to<E: MediaEngine>(&mut self, output: &mut ContainerSession<E>) -> Result<usize> {
        let mut written = 0;
        for kind in [MediaKind::Video, MediaKind::Audio] {
            let destination = output.stream_time_base(kind);
            while let Some(mut packet) = self.request(kind) {
                if let Some(tb) = destination {
                    packet.rescale_ts(tb);
                }
                output.write_packet(packet)?;
                written += 1;
            }
        }
        log::debug!("re-timing buffer flushed {written} packets");
        Ok(written)
    }
}

#[cfg(test)]
#[path = "retime_test.rs"]
mod retime_test;
