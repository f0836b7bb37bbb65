//! Codec session: one decoder or encoder bound to one stream, and the
//! send/receive state machine around it.
//!
//! ```text
//! Created --open--> Idle <--> Draining --close--> Closed
//! ```
//!
//! `Idle` means the engine has nothing buffered and wants input. `Draining`
//! means it may still hold output that must be pulled before more input is
//! accepted.

use std::borrow::Cow;
use std::collections::VecDeque;

use crate::engine::{EngineCodec, EngineResult};
use crate::error::{EngineError, MediaError, Result};
use crate::frame::Frame;
use crate::packet::Packet;
use crate::stream::{CodecHandle, MediaKind};
use crate::time::Rational;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecDirection {
    Decode,
    Encode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecState {
    Created,
    Idle,
    Draining,
    Closed,
}

#[derive(Debug)]
pub enum DecodeOutcome {
    FrameReady(Frame),
    /// The decoder buffered the packet and wants more before producing a frame.
    NeedMoreInput,
    /// The packet was corrupt and has been skipped.
    InvalidData,
    EndOfStream,
}

#[derive(Debug)]
pub enum EncodeOutcome {
    /// Packet stamped with the session's stream index and rescaled to the
    /// destination time base.
    PacketReady(Packet),
    NeedMoreInput,
    EndOfStream,
}

pub struct CodecSession<C> {
    kind: MediaKind,
    direction: CodecDirection,
    handle: CodecHandle,
    stream_index: usize,
    state: CodecState,
    codec: Option<C>,
    /// Packet refused with `Again`, submitted again once output was pulled.
    resubmit: Option<Packet>,
    /// Encoded packets pulled to make room for a refused frame.
    pending: VecDeque<Packet>,
    input_finished: bool,
    end_of_stream: bool,
}

impl<C: EngineCodec> CodecSession<C> {
    pub fn new(direction: CodecDirection, handle: CodecHandle, stream_index: usize) -> Self {
        Self {
            kind: handle.kind,
            direction,
            handle,
            stream_index,
            state: CodecState::Created,
            codec: None,
            resubmit: None,
            pending: VecDeque::new(),
            input_finished: false,
            end_of_stream: false,
        }
    }

    /// Opens the engine codec. Allowed exactly once.
    pub fn open<F>(&mut self, open: F) -> Result<()>
    where
        F: FnOnce(&CodecHandle) -> EngineResult<C>,
    {
        match self.state {
            CodecState::Created => {}
            CodecState::Closed => return Err(MediaError::InvalidState("codec session is closed")),
            _ => return Err(MediaError::InvalidState("codec session is already open")),
        }
        let codec = open(&self.handle).map_err(|e| MediaError::negotiation(self.kind, e))?;
        log::debug!(
            "{} {:?} opened with {} for stream {}",
            self.kind,
            self.direction,
            self.handle.implementation,
            self.stream_index
        );
        self.codec = Some(codec);
        self.state = CodecState::Idle;
        Ok(())
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn direction(&self) -> CodecDirection {
        self.direction
    }

    pub fn handle(&self) -> &CodecHandle {
        &self.handle
    }

    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    pub fn state(&self) -> CodecState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, CodecState::Idle | CodecState::Draining)
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.end_of_stream
    }

    pub fn is_input_finished(&self) -> bool {
        self.input_finished
    }

    pub fn time_base(&self) -> Option<Rational> {
        self.codec.as_ref().map(|c| c.time_base())
    }

    fn ensure_open(&self, direction: CodecDirection) -> Result<()> {
        if self.direction != direction {
            return Err(MediaError::InvalidState("wrong direction for codec session"));
        }
        if !self.is_open() || self.codec.is_none() {
            return Err(MediaError::InvalidState("codec session is not open"));
        }
        Ok(())
    }

    /// Submits one packet and tries to pull one frame.
    ///
    /// A transient refusal (`SubmitFailed { transient: true }`) keeps the
    /// packet; it is submitted again by [`CodecSession::receive_pending`]
    /// once the buffered output has been pulled.
    pub fn decode(&mut self, packet: &Packet) -> Result<DecodeOutcome> {
        if self.end_of_stream {
            return Ok(DecodeOutcome::EndOfStream);
        }
        let kind = self.kind;
        self.ensure_open(CodecDirection::Decode)?;
        let Some(codec) = self.codec.as_mut() else {
            return Err(MediaError::InvalidState("codec session is not open"));
        };
        match codec.send_packet(Some(packet)) {
            Ok(()) => {}
            Err(EngineError::Again) => {
                self.resubmit = Some(packet.clone());
                self.state = CodecState::Draining;
                return Err(MediaError::SubmitFailed {
                    transient: true,
                    reason: EngineError::Again.to_string(),
                });
            }
            Err(EngineError::InvalidData) => {
                log::warn!("{kind} decoder rejected corrupt packet, skipping");
                return Ok(DecodeOutcome::InvalidData);
            }
            Err(EngineError::Eof) => {
                self.end_of_stream = true;
                return Ok(DecodeOutcome::EndOfStream);
            }
            Err(EngineError::OutOfMemory) => return Err(MediaError::OutOfMemory),
            Err(e) => {
                return Err(MediaError::SubmitFailed {
                    transient: false,
                    reason: e.to_string(),
                });
            }
        }

        match codec.receive_frame() {
            Ok(frame) => {
                self.state = CodecState::Draining;
                Ok(DecodeOutcome::FrameReady(frame))
            }
            Err(EngineError::Again) => {
                self.state = CodecState::Idle;
                Ok(DecodeOutcome::NeedMoreInput)
            }
            Err(EngineError::Eof) => {
                self.end_of_stream = true;
                Ok(DecodeOutcome::EndOfStream)
            }
            Err(EngineError::InvalidData) => {
                self.state = CodecState::Idle;
                Ok(DecodeOutcome::InvalidData)
            }
            Err(EngineError::OutOfMemory) => Err(MediaError::OutOfMemory),
            Err(e) => {
                log::error!("{kind} decoder failed: {e}");
                Err(MediaError::DecodeExhausted(kind))
            }
        }
    }

    /// Pulls a frame the decoder already holds, without submitting input.
    /// `None` when nothing is buffered.
    pub fn receive_pending(&mut self) -> Result<Option<Frame>> {
        if self.end_of_stream
            || (self.state == CodecState::Idle && !self.input_finished)
        {
            return Ok(None);
        }
        let kind = self.kind;
        loop {
            self.ensure_open(CodecDirection::Decode)?;
            let Some(codec) = self.codec.as_mut() else {
                return Err(MediaError::InvalidState("codec session is not open"));
            };
            match codec.receive_frame() {
                Ok(frame) => {
                    self.state = CodecState::Draining;
                    return Ok(Some(frame));
                }
                Err(EngineError::Again) if self.input_finished => {
                    self.end_of_stream = true;
                    return Ok(None);
                }
                Err(EngineError::Again) => {
                    let Some(packet) = self.resubmit.take() else {
                        self.state = CodecState::Idle;
                        return Ok(None);
                    };
                    match codec.send_packet(Some(&packet)) {
                        Ok(()) => continue,
                        Err(EngineError::InvalidData) => {
                            log::warn!("{kind} decoder rejected corrupt packet, skipping");
                            continue;
                        }
                        Err(EngineError::OutOfMemory) => return Err(MediaError::OutOfMemory),
                        Err(e) => {
                            return Err(MediaError::SubmitFailed {
                                transient: false,
                                reason: e.to_string(),
                            });
                        }
                    }
                }
                Err(EngineError::Eof) => {
                    self.end_of_stream = true;
                    return Ok(None);
                }
                Err(EngineError::InvalidData) => {
                    log::warn!("{kind} decoder produced invalid data while draining");
                    continue;
                }
                Err(EngineError::OutOfMemory) => return Err(MediaError::OutOfMemory),
                Err(e) => {
                    log::error!("{kind} decoder failed while draining: {e}");
                    return Err(MediaError::DecodeExhausted(kind));
                }
            }
        }
    }

    /// Signals end of input so buffered frames can be drained with
    /// [`CodecSession::receive_pending`].
    pub fn finish_input(&mut self) -> Result<()> {
        if self.input_finished {
            return Ok(());
        }
        self.ensure_open(CodecDirection::Decode)?;
        let Some(codec) = self.codec.as_mut() else {
            return Err(MediaError::InvalidState("codec session is not open"));
        };
        match codec.send_packet(None) {
            Ok(()) | Err(EngineError::Eof) => {}
            Err(e) => {
                return Err(MediaError::SubmitFailed {
                    transient: false,
                    reason: e.to_string(),
                });
            }
        }
        self.input_finished = true;
        self.state = CodecState::Draining;
        Ok(())
    }

    /// Submits one frame (`None` starts the final drain) and tries to pull
    /// one packet. Frame timestamps are moved onto the encoder clock first.
    ///
    /// An encoder that refuses input with `Again` has all of its output
    /// pulled before the frame is sent again; packets beyond the first are
    /// handed out by later [`receive_encoded`](Self::receive_encoded) calls.
    pub fn encode(&mut self, frame: Option<&Frame>, destination: Rational) -> Result<EncodeOutcome> {
        if self.end_of_stream {
            return self.receive_encoded(destination);
        }
        self.ensure_open(CodecDirection::Encode)?;
        let Some(codec) = self.codec.as_mut() else {
            return Err(MediaError::InvalidState("codec session is not open"));
        };
        let time_base = codec.time_base();
        let frame = frame.map(|f| match f.time_base() {
            Some(tb) if tb != time_base => {
                let mut f = f.clone();
                f.rescale_ts(time_base);
                Cow::Owned(f)
            }
            _ => Cow::Borrowed(f),
        });
        if frame.is_none() && self.input_finished {
            return self.receive_encoded(destination);
        }

        match codec.send_frame(frame.as_deref()) {
            Ok(()) => {}
            Err(EngineError::Again) => {
                while let EncodeOutcome::PacketReady(packet) = self.pull_packet(destination)? {
                    self.pending.push_back(packet);
                }
                if self.end_of_stream {
                    return self.receive_encoded(destination);
                }
                let Some(codec) = self.codec.as_mut() else {
                    return Err(MediaError::InvalidState("codec session is not open"));
                };
                codec
                    .send_frame(frame.as_deref())
                    .map_err(|e| MediaError::Encode(format!("encoder refused input: {e}")))?;
            }
            Err(EngineError::Eof) => {
                self.end_of_stream = true;
                return self.receive_encoded(destination);
            }
            Err(EngineError::OutOfMemory) => return Err(MediaError::OutOfMemory),
            Err(e) => return Err(MediaError::Encode(e.to_string())),
        }
        if frame.is_none() {
            self.input_finished = true;
        }
        self.receive_encoded(destination)
    }

    /// Pulls one packet: first the ones set aside by [`encode`](Self::encode),
    /// then whatever the encoder already holds.
    pub fn receive_encoded(&mut self, destination: Rational) -> Result<EncodeOutcome> {
        if let Some(packet) = self.pending.pop_front() {
            return Ok(EncodeOutcome::PacketReady(packet));
        }
        if self.end_of_stream {
            return Ok(EncodeOutcome::EndOfStream);
        }
        self.pull_packet(destination)
    }

    fn pull_packet(&mut self, destination: Rational) -> Result<EncodeOutcome> {
        let stream_index = self.stream_index;
        self.ensure_open(CodecDirection::Encode)?;
        let Some(codec) = self.codec.as_mut() else {
            return Err(MediaError::InvalidState("codec session is not open"));
        };
        match codec.receive_packet() {
            Ok(mut packet) => {
                packet.set_index(stream_index);
                packet.rescale_ts(destination);
                self.state = CodecState::Draining;
                Ok(EncodeOutcome::PacketReady(packet))
            }
            Err(EngineError::Again) => {
                self.state = CodecState::Idle;
                Ok(EncodeOutcome::NeedMoreInput)
            }
            Err(EngineError::Eof) => {
                self.end_of_stream = true;
                Ok(EncodeOutcome::EndOfStream)
            }
            Err(EngineError::OutOfMemory) => Err(MediaError::OutOfMemory),
            Err(e) => Err(MediaError::Encode(e.to_string())),
        }
    }

    /// Clears buffered state so decoding can restart, e.g. after a seek or
    /// when a live source reached end of stream.
    pub fn flush(&mut self) {
        if let Some(codec) = self.codec.as_mut() {
            codec.flush();
            self.state = CodecState::Idle;
        }
        self.resubmit = None;
        self.pending.clear();
        self.input_finished = false;
        self.end_of_stream = false;
    }

    /// Releases the engine codec. Safe to call more than once.
    pub fn close(&mut self) {
        if self.codec.take().is_some() {
            log::debug!("{} {:?} session closed", self.kind, self.direction);
        }
        self.resubmit = None;
        self.pending.clear();
        self.state = CodecState::Closed;
    }
}

#[cfg(test)]
#[path = "codec_test.rs"]
mod codec_test;
