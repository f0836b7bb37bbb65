//! Live ingestion: a producer thread submits compressed packets, a consumer
//! decodes them without ever blocking on the producer.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::codec::{CodecDirection, CodecSession};
use crate::engine::{MediaEngine, RawDecoderConfig};
use crate::error::{MediaError, Result};
use crate::frame::Frame;
use crate::packet::Packet;
use crate::settings::LiveSettings;
use crate::source::{self, PacketSource, ReadStats, SourcePacket};
use crate::stream::MediaKind;
use crate::time::Rational;

/// What a bounded queue does with a packet that does not fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest queued packet to make room.
    DropOldest,
    /// Refuse the new packet.
    RejectNewest,
    /// Never drop; the queue grows without limit.
    Unbounded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitStatus {
    Queued,
    /// Queued after evicting the oldest packet.
    QueuedWithEviction,
    /// Refused by the overflow policy or because the queue was closed.
    Rejected,
    /// Zero-length payloads are discarded on arrival.
    Ignored,
}

struct QueueState {
    packets: VecDeque<Bytes>,
    submitted: u64,
    dropped: u64,
    closed: bool,
}

/// FIFO of compressed payloads shared by one producer and one consumer.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct LiveQueue {
    state: Arc<Mutex<QueueState>>,
    capacity: usize,
    policy: OverflowPolicy,
}

impl LiveQueue {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState {
                packets: VecDeque::new(),
                submitted: 0,
                dropped: 0,
                closed: false,
            })),
            capacity,
            policy,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(0, OverflowPolicy::Unbounded)
    }

    pub fn from_settings(settings: &LiveSettings) -> Self {
        Self::new(settings.queue_capacity, settings.overflow)
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Producer side: queues `data` at the tail, applying the overflow
    /// policy when the queue is full.
    pub fn submit(&self, data: impl Into<Bytes>) -> SubmitStatus {
        let data = data.into();
        if data.is_empty() {
            return SubmitStatus::Ignored;
        }
        let bounded = self.policy != OverflowPolicy::Unbounded;
        let mut state = self.lock();
        if state.closed || (bounded && self.capacity == 0) {
            state.dropped += 1;
            return SubmitStatus::Rejected;
        }
        let mut status = SubmitStatus::Queued;
        if bounded && state.packets.len() >= self.capacity {
            state.dropped += 1;
            if self.policy == OverflowPolicy::RejectNewest {
                return SubmitStatus::Rejected;
            }
            state.packets.pop_front();
            status = SubmitStatus::QueuedWithEviction;
        }
        state.packets.push_back(data);
        state.submitted += 1;
        status
    }

    /// Consumer side: pops the head, `None` right away when empty.
    pub fn request_next(&self) -> Option<Bytes> {
        self.lock().packets.pop_front()
    }

    /// Producer side: no more packets will follow. Later submissions are
    /// rejected; what is already queued stays available.
    pub fn close(&self) {
        self.lock().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Packets lost to the overflow policy.
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    pub fn submitted(&self) -> u64 {
        self.lock().submitted
    }
}

/// Adapts the queue to the shared decode loop. Packets get a running
/// sequence number as their position.
pub struct LiveSource<'a> {
    queue: &'a LiveQueue,
    sequence: &'a mut i64,
    time_base: Rational,
    /// Treat an empty queue as the end of input instead of a pause.
    final_pass: bool,
}

impl PacketSource for LiveSource<'_> {
    fn next_packet(&mut self) -> Result<SourcePacket> {
        Ok(match self.queue.request_next() {
            Some(data) => {
                let packet = Packet::new(data, 0, self.time_base).with_position(Some(*self.sequence));
                *self.sequence += 1;
                SourcePacket::Packet(packet)
            }
            None if self.final_pass => SourcePacket::End,
            None => SourcePacket::Empty,
        })
    }

    fn restarts_after_end(&self) -> bool {
        true
    }
}

/// Decoder fed from a [`LiveQueue`], with no container around it.
pub struct LiveDecoder<E: MediaEngine> {
    queue: LiveQueue,
    session: CodecSession<E::Codec>,
    time_base: Rational,
    sequence: i64,
    stats: ReadStats,
}

impl<E: MediaEngine> LiveDecoder<E> {
    pub fn open(engine: &E, queue: LiveQueue, settings: &LiveSettings) -> Result<Self> {
        settings.validate()?;
        let handle = engine.find_decoder(&settings.codec).map_err(|e| {
            MediaError::Configuration(format!("no decoder for {}: {}", settings.codec, e))
        })?;
        if handle.kind != MediaKind::Video {
            return Err(MediaError::Configuration(format!(
                "{} is not a video codec",
                settings.codec
            )));
        }
        let time_base = Rational::MICROS;
        let config = RawDecoderConfig {
            width: settings.width,
            height: settings.height,
            time_base,
        };
        let mut session = CodecSession::new(CodecDirection::Decode, handle, 0);
        session.open(|h| engine.open_raw_decoder(h, &config))?;
        log::info!(
            "live {} decoder ready ({}x{})",
            settings.codec,
            settings.width,
            settings.height
        );
        Ok(Self {
            queue,
            session,
            time_base,
            sequence: 0,
            stats: ReadStats::default(),
        })
    }

    pub fn queue(&self) -> &LiveQueue {
        &self.queue
    }

    pub fn stats(&self) -> ReadStats {
        self.stats
    }

    /// Decodes the next frame, `Ok(None)` when the queue ran dry first.
    /// Never waits for the producer.
    pub fn decode_next(&mut self, cancel: &CancellationToken) -> Result<Option<Frame>> {
        self.pull_frame(false, cancel)
    }

    /// Closes the queue, decodes every packet still in it and drains the
    /// decoder, returning the frames in order. After this the decoder is
    /// exhausted.
    pub fn finish(&mut self, cancel: &CancellationToken) -> Result<Vec<Frame>> {
        self.queue.close();
        let mut frames = Vec::new();
        loop {
            match self.pull_frame(true, cancel) {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => {}
                Err(e) if e.is_exhausted() => break,
                Err(e) => return Err(e),
            }
        }
        log::debug!("live decoder drained, {} frames at the end", frames.len());
        Ok(frames)
    }

    fn pull_frame(&mut self, final_pass: bool, cancel: &CancellationToken) -> Result<Option<Frame>> {
        let mut source = LiveSource {
            queue: &self.queue,
            sequence: &mut self.sequence,
            time_base: self.time_base,
            final_pass,
        };
        let frame = source::next_frame(&mut source, &mut self.session, None, &mut self.stats, cancel)?;
        Ok(frame.map(|mut f| {
            f.set_time_base(self.time_base);
            f
        }))
    }

    pub fn close(&mut self) {
        self.session.close();
    }
}

#[cfg(test)]
#[path = "live_test.rs"]
mod live_test;
