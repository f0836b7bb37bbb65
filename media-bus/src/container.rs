//! Container session: one opened input or output container together with
//! the codec sessions of its primary video and audio streams.

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::codec::{CodecDirection, CodecSession, EncodeOutcome};
use crate::engine::{
    EncoderConfig, EngineInput, EngineOutput, EngineStream, FormatDetails, MediaEngine,
};
use crate::error::{EngineError, MediaError, Result};
use crate::frame::{Frame, FrameSink, FrameSlots};
use crate::packet::Packet;
use crate::source::{self, DemuxSource, ReadStats};
use crate::stream::{MediaKind, StreamDescriptor};
use crate::time::Rational;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

/// How an output stream gets its packets.
pub enum StreamSetup<'a, P> {
    /// Packets are copied from an input stream without decoding.
    Copy {
        source: &'a StreamDescriptor,
        params: &'a P,
    },
    /// Packets come from a fresh encoder.
    Encode(EncoderConfig),
}

struct SessionStream<P> {
    descriptor: StreamDescriptor,
    native: P,
}

pub struct ContainerSession<E: MediaEngine> {
    engine: E,
    direction: Direction,
    locator: String,
    // codec sessions are declared first so they are released before the container
    video: Option<CodecSession<E::Codec>>,
    audio: Option<CodecSession<E::Codec>>,
    input: Option<E::Input>,
    output: Option<E::Output>,
    streams: Vec<SessionStream<E::Params>>,
    video_index: Option<usize>,
    audio_index: Option<usize>,
    details: FormatDetails,
    slots: FrameSlots,
    stats: ReadStats,
    discovered: bool,
    header_written: bool,
    trailer_written: bool,
}

impl<E: MediaEngine> ContainerSession<E> {
    /// Opens `locator` for reading (probing its format and streams) or
    /// creates it for writing.
    pub fn open(engine: E, direction: Direction, locator: &str) -> Result<Self> {
        let mut session = Self {
            engine,
            direction,
            locator: locator.to_string(),
            video: None,
            audio: None,
            input: None,
            output: None,
            streams: Vec::new(),
            video_index: None,
            audio_index: None,
            details: FormatDetails::default(),
            slots: FrameSlots::default(),
            stats: ReadStats::default(),
            discovered: false,
            header_written: false,
            trailer_written: false,
        };
        match direction {
            Direction::Input => {
                let input = session
                    .engine
                    .probe_and_open(locator)
                    .map_err(|e| MediaError::open(locator, e))?;
                let streams = input.streams();
                if streams.is_empty() {
                    return Err(MediaError::open(
                        locator,
                        EngineError::NotFound("no streams".into()),
                    ));
                }
                session.details = input.details();
                session.streams = streams.into_iter().map(SessionStream::from).collect();
                session.input = Some(input);
                log::info!(
                    "opened input {} ({}, {} streams)",
                    locator,
                    session.details.format_name,
                    session.streams.len()
                );
            }
            Direction::Output => {
                let output = session
                    .engine
                    .create_output(locator)
                    .map_err(|e| MediaError::open(locator, e))?;
                session.output = Some(output);
                log::info!("created output {}", locator);
            }
        }
        Ok(session)
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn details(&self) -> &FormatDetails {
        &self.details
    }

    pub fn streams(&self) -> impl Iterator<Item = &StreamDescriptor> {
        self.streams.iter().map(|s| &s.descriptor)
    }

    pub fn stream(&self, index: usize) -> Option<&StreamDescriptor> {
        self.streams.get(index).map(|s| &s.descriptor)
    }

    pub fn video_stream_index(&self) -> Option<usize> {
        self.video_index
    }

    pub fn audio_stream_index(&self) -> Option<usize> {
        self.audio_index
    }

    pub fn stream_index(&self, kind: MediaKind) -> Option<usize> {
        match kind {
            MediaKind::Video => self.video_index,
            MediaKind::Audio => self.audio_index,
            MediaKind::Other => None,
        }
    }

    /// Primary stream of `kind`, once resolved or attached.
    pub fn primary(&self, kind: MediaKind) -> Option<&StreamDescriptor> {
        self.stream_index(kind).and_then(|i| self.stream(i))
    }

    /// Time base of the primary video stream, else of the audio one.
    pub fn time_base(&self) -> Option<Rational> {
        self.primary(MediaKind::Video)
            .or_else(|| self.primary(MediaKind::Audio))
            .map(|s| s.time_base)
    }

    pub fn frame_rate(&self) -> Option<Rational> {
        self.primary(MediaKind::Video).and_then(|s| s.frame_rate())
    }

    pub fn header_written(&self) -> bool {
        self.header_written
    }

    pub fn trailer_written(&self) -> bool {
        self.trailer_written
    }

    pub fn slots(&self) -> &FrameSlots {
        &self.slots
    }

    pub fn read_stats(&self) -> ReadStats {
        self.stats
    }

    pub fn codec(&self, kind: MediaKind) -> Option<&CodecSession<E::Codec>> {
        match kind {
            MediaKind::Video => self.video.as_ref(),
            MediaKind::Audio => self.audio.as_ref(),
            MediaKind::Other => None,
        }
    }

    fn codec_slot(&mut self, kind: MediaKind) -> Result<&mut Option<CodecSession<E::Codec>>> {
        match kind {
            MediaKind::Video => Ok(&mut self.video),
            MediaKind::Audio => Ok(&mut self.audio),
            MediaKind::Other => Err(MediaError::InvalidState("only audio and video have codecs")),
        }
    }

    fn ensure_direction(&self, direction: Direction) -> Result<()> {
        if self.direction != direction {
            return Err(MediaError::InvalidState(match direction {
                Direction::Input => "operation needs an input container",
                Direction::Output => "operation needs an output container",
            }));
        }
        if self.input.is_none() && self.output.is_none() {
            return Err(MediaError::InvalidState("container session is closed"));
        }
        Ok(())
    }

    /// Records the decoder the engine has for every audio and video
    /// stream. Unsupported streams are logged and skipped.
    fn find_decoders(&mut self) -> Result<()> {
        for stream in &mut self.streams {
            let descriptor = &mut stream.descriptor;
            let kind = descriptor.kind();
            if kind == MediaKind::Other {
                log::warn!(
                    "stream {} ({}) is neither audio nor video, skipping",
                    descriptor.index,
                    descriptor.params.codec
                );
                continue;
            }
            match self.engine.find_decoder(&descriptor.params.codec) {
                Ok(handle) => descriptor.decoder = Some(handle),
                Err(e) => log::warn!(
                    "stream {} ({} {}) has no decoder, skipping: {}",
                    descriptor.index,
                    kind,
                    descriptor.params.codec,
                    e
                ),
            }
        }
        if !self.streams.iter().any(|s| s.descriptor.decoder.is_some()) {
            return Err(MediaError::NoDecodableStreams);
        }
        Ok(())
    }

    /// Picks the primary video and audio streams and opens a decoder for
    /// each: per kind, the first stream whose decoder opens.
    ///
    /// Indices are only published once every kind is settled, so they never
    /// change afterwards and repeating the call is a no-op. Unsupported
    /// streams are skipped; [`MediaError::NoDecodableStreams`] when neither
    /// kind has a decoder, [`MediaError::CodecNegotiation`] when every
    /// decoder of a kind fails to open.
    pub fn discover_streams(&mut self) -> Result<()> {
        self.ensure_direction(Direction::Input)?;
        if self.discovered {
            return Ok(());
        }
        self.find_decoders()?;

        let mut chosen = Vec::with_capacity(2);
        for kind in [MediaKind::Video, MediaKind::Audio] {
            let candidates: Vec<usize> = self
                .streams
                .iter()
                .filter(|s| s.descriptor.kind() == kind && s.descriptor.decoder.is_some())
                .map(|s| s.descriptor.index)
                .collect();
            if candidates.is_empty() {
                continue;
            }
            let mut last_error = None;
            let mut opened = None;
            for index in candidates {
                match self.open_decoder(index) {
                    Ok(session) => {
                        opened = Some((index, session));
                        break;
                    }
                    Err(e) => {
                        log::warn!("{kind} stream {index}: {e}");
                        last_error = Some(e);
                    }
                }
            }
            match opened {
                Some((index, session)) => chosen.push((kind, index, session)),
                None => {
                    return Err(last_error
                        .unwrap_or_else(|| MediaError::negotiation(kind, "no candidate stream")));
                }
            }
        }

        for (kind, index, session) in chosen {
            match kind {
                MediaKind::Video => self.video_index = Some(index),
                _ => self.audio_index = Some(index),
            }
            *self.codec_slot(kind)? = Some(session);
        }
        self.discovered = true;
        log::info!(
            "{}: video stream {:?}, audio stream {:?}",
            self.locator,
            self.video_index,
            self.audio_index
        );
        Ok(())
    }

    fn open_decoder(&self, index: usize) -> Result<CodecSession<E::Codec>> {
        let stream = &self.streams[index];
        let handle = stream
            .descriptor
            .decoder
            .clone()
            .ok_or(MediaError::InvalidState("stream has no decoder"))?;
        let mut session = CodecSession::new(CodecDirection::Decode, handle, index);
        session.open(|h| {
            self.engine
                .open_decoder(h, &stream.native, stream.descriptor.time_base)
        })?;
        Ok(session)
    }

    /// Next raw packet in file order, `None` at end of input.
    pub fn read_packet(&mut self) -> Result<Option<Packet>> {
        self.ensure_direction(Direction::Input)?;
        let Some(input) = self.input.as_mut() else {
            return Err(MediaError::InvalidState("container session is closed"));
        };
        match input.read_packet() {
            Ok(packet) => Ok(Some(packet)),
            Err(EngineError::Eof) => Ok(None),
            Err(EngineError::OutOfMemory) => Err(MediaError::OutOfMemory),
            Err(e) => {
                log::warn!("{}: read failed, treating as end of input: {}", self.locator, e);
                Ok(None)
            }
        }
    }

    /// Decodes the next frame of the primary stream of `kind`.
    ///
    /// Frames still buffered in the decoder come out first. Packets of
    /// other streams are discarded. When the input and the decoder are both
    /// exhausted this fails with [`MediaError::DecodeExhausted`].
    pub fn read_next_frame(&mut self, kind: MediaKind, cancel: &CancellationToken) -> Result<Frame> {
        self.ensure_direction(Direction::Input)?;
        let index = self
            .stream_index(kind)
            .ok_or(MediaError::InvalidState("no stream of that kind was discovered"))?;
        let time_base = self.streams[index].descriptor.time_base;
        let session = match kind {
            MediaKind::Video => self.video.as_mut(),
            MediaKind::Audio => self.audio.as_mut(),
            MediaKind::Other => None,
        }
        .ok_or(MediaError::InvalidState("streams were not discovered"))?;
        let input = self
            .input
            .as_mut()
            .ok_or(MediaError::InvalidState("container session is closed"))?;
        let mut source = DemuxSource::new(input);
        match source::next_frame(&mut source, session, Some(index), &mut self.stats, cancel)? {
            Some(mut frame) => {
                frame.set_time_base(time_base);
                self.slots.store(frame.clone());
                Ok(frame)
            }
            None => Err(MediaError::DecodeExhausted(kind)),
        }
    }

    /// Seeks every resolved stream back to its start and flushes the
    /// decoders, so a second pass sees the input from the beginning.
    pub fn reset_read_position(&mut self) -> Result<()> {
        self.ensure_direction(Direction::Input)?;
        let Some(input) = self.input.as_mut() else {
            return Err(MediaError::InvalidState("container session is closed"));
        };
        for index in [self.video_index, self.audio_index].into_iter().flatten() {
            input
                .seek(index, 0)
                .map_err(|e| MediaError::Seek(format!("stream {index}: {e}")))?;
        }
        self.flush_codecs();
        self.slots.clear();
        log::debug!("{}: read position reset", self.locator);
        Ok(())
    }

    pub fn flush_codecs(&mut self) {
        for session in [self.video.as_mut(), self.audio.as_mut()].into_iter().flatten() {
            session.flush();
        }
    }

    /// Plays the primary video stream into `sink` until the input is
    /// exhausted or the sink asks to stop. Returns the number of frames
    /// presented.
    pub fn present_video<S>(&mut self, sink: &mut S, cancel: &CancellationToken) -> Result<u64>
    where
        S: FrameSink + ?Sized,
    {
        let mut presented = 0;
        while !sink.should_stop() {
            let frame = match self.read_next_frame(MediaKind::Video, cancel) {
                Ok(frame) => frame,
                Err(e) if e.is_exhausted() => break,
                Err(e) => return Err(e),
            };
            if let Frame::Video(video) = &frame {
                sink.bind_picture(video);
                sink.present_at(frame.pts_seconds().unwrap_or_default());
                presented += 1;
            }
        }
        Ok(presented)
    }

    /// Adds an output stream for `kind` and makes it the primary one.
    pub fn attach_stream(
        &mut self,
        kind: MediaKind,
        setup: StreamSetup<'_, E::Params>,
    ) -> Result<usize> {
        self.ensure_direction(Direction::Output)?;
        if self.header_written {
            return Err(MediaError::InvalidState("streams must be attached before the header"));
        }
        if kind == MediaKind::Other {
            return Err(MediaError::Configuration(
                "only audio and video streams can be attached".into(),
            ));
        }
        if self.stream_index(kind).is_some() {
            return Err(MediaError::InvalidState("a stream of that kind is already attached"));
        }
        let Some(output) = self.output.as_mut() else {
            return Err(MediaError::InvalidState("container session is closed"));
        };

        let expected = self.streams.len();
        let (stream, codec) = match setup {
            StreamSetup::Copy { source, params } => {
                if source.kind() != kind {
                    return Err(MediaError::Configuration(format!(
                        "cannot copy a {} stream into a {} slot",
                        source.kind(),
                        kind
                    )));
                }
                let index = output
                    .add_stream(params, source.time_base)
                    .map_err(|e| MediaError::Mux(e.to_string()))?;
                if index != expected {
                    return Err(MediaError::InvalidState("output stream index out of sync"));
                }
                let mut descriptor = source.clone();
                descriptor.index = index;
                descriptor.decoder = None;
                (
                    SessionStream {
                        descriptor,
                        native: params.clone(),
                    },
                    None,
                )
            }
            StreamSetup::Encode(mut config) => {
                if config.params.kind() != kind {
                    return Err(MediaError::Configuration(format!(
                        "encoder parameters describe {} but the slot is {}",
                        config.params.kind(),
                        kind
                    )));
                }
                let handle = self.engine.find_encoder(&config.params.codec).map_err(|e| {
                    MediaError::Configuration(format!(
                        "no encoder for {}: {}",
                        config.params.codec, e
                    ))
                })?;
                config.global_header = output.needs_global_header();
                let engine = &self.engine;
                let index = expected;
                let mut session = CodecSession::new(CodecDirection::Encode, handle, index);
                let mut produced = None;
                session.open(|h| {
                    let (codec, params) = engine.open_encoder(h, &config)?;
                    produced = Some(params);
                    Ok(codec)
                })?;
                let params = produced.ok_or_else(|| {
                    MediaError::negotiation(kind, "encoder produced no stream parameters")
                })?;
                let added = output
                    .add_stream(&params, config.time_base)
                    .map_err(|e| MediaError::Mux(e.to_string()))?;
                if added != index {
                    return Err(MediaError::InvalidState("output stream index out of sync"));
                }
                let descriptor = StreamDescriptor {
                    index,
                    params: config.params.clone(),
                    time_base: config.time_base,
                    duration: None,
                    extradata: Bytes::new(),
                    decoder: None,
                };
                (SessionStream { descriptor, native: params }, Some(session))
            }
        };

        let index = stream.descriptor.index;
        log::info!(
            "{}: attached {} stream {} ({})",
            self.locator,
            kind,
            index,
            stream.descriptor.params.codec
        );
        self.streams.push(stream);
        match kind {
            MediaKind::Video => self.video_index = Some(index),
            _ => self.audio_index = Some(index),
        }
        *self.codec_slot(kind)? = codec;
        Ok(index)
    }

    /// Attaches copies of the input's primary video and audio streams.
    pub fn copy_streams_from(&mut self, input: &ContainerSession<E>) -> Result<()> {
        for kind in [MediaKind::Video, MediaKind::Audio] {
            let Some(index) = input.stream_index(kind) else {
                continue;
            };
            let stream = &input.streams[index];
            self.attach_stream(
                kind,
                StreamSetup::Copy {
                    source: &stream.descriptor,
                    params: &stream.native,
                },
            )?;
        }
        Ok(())
    }

    /// Writes the container header. Exactly once, after all streams are
    /// attached. Stream time bases may change here.
    pub fn write_header(&mut self) -> Result<()> {
        self.ensure_direction(Direction::Output)?;
        if self.header_written {
            return Err(MediaError::InvalidState("header already written"));
        }
        let Some(output) = self.output.as_mut() else {
            return Err(MediaError::InvalidState("container session is closed"));
        };
        output
            .write_header()
            .map_err(|e| MediaError::Mux(format!("write header: {e}")))?;
        self.header_written = true;
        for stream in &mut self.streams {
            if let Some(tb) = output.stream_time_base(stream.descriptor.index) {
                stream.descriptor.time_base = tb;
            }
        }
        Ok(())
    }

    /// Hands `packet` to the muxer. Only valid between header and trailer.
    pub fn write_packet(&mut self, packet: Packet) -> Result<()> {
        self.ensure_direction(Direction::Output)?;
        if !self.header_written {
            return Err(MediaError::InvalidState("header not written"));
        }
        if self.trailer_written {
            return Err(MediaError::InvalidState("trailer already written"));
        }
        if packet.index() >= self.streams.len() {
            return Err(MediaError::UnexpectedStream(packet.index()));
        }
        let Some(output) = self.output.as_mut() else {
            return Err(MediaError::InvalidState("container session is closed"));
        };
        output
            .write_interleaved(packet)
            .map_err(|e| MediaError::Mux(e.to_string()))
    }

    /// Finalizes the container. Exactly once, after the header; a failed
    /// attempt still counts.
    pub fn write_trailer(&mut self) -> Result<()> {
        self.ensure_direction(Direction::Output)?;
        if !self.header_written {
            return Err(MediaError::InvalidState("header not written"));
        }
        if self.trailer_written {
            return Err(MediaError::InvalidState("trailer already written"));
        }
        self.trailer_written = true;
        let Some(output) = self.output.as_mut() else {
            return Err(MediaError::InvalidState("container session is closed"));
        };
        output
            .write_trailer()
            .map_err(|e| MediaError::Mux(format!("write trailer: {e}")))?;
        log::info!("{}: trailer written", self.locator);
        Ok(())
    }

    /// Ends a pipeline run on an output: the trailer is written after
    /// success and still attempted after a failure, whose error wins.
    pub fn finish<T>(&mut self, outcome: Result<T>) -> Result<T> {
        match outcome {
            Ok(value) => {
                self.write_trailer()?;
                Ok(value)
            }
            Err(e) => {
                log::error!("{}: {}", self.locator, e);
                if self.header_written && !self.trailer_written {
                    if let Err(trailer) = self.write_trailer() {
                        log::error!("{}: {}", self.locator, trailer);
                    }
                }
                Err(e)
            }
        }
    }

    /// Time base packets of output stream `kind` must carry, known for
    /// sure only after the header.
    pub fn stream_time_base(&self, kind: MediaKind) -> Option<Rational> {
        self.primary(kind).map(|s| s.time_base)
    }

    /// Feeds one frame (or `None` to drain) to the encoder of `kind` and
    /// returns at most one packet ready for [`ContainerSession::write_packet`].
    pub fn encode_frame(&mut self, kind: MediaKind, frame: Option<&Frame>) -> Result<EncodeOutcome> {
        let destination = self.encoder_destination(kind)?;
        let session = self
            .codec_slot(kind)?
            .as_mut()
            .ok_or(MediaError::InvalidState("no encoder for that kind"))?;
        session.encode(frame, destination)
    }

    /// Pulls another packet the encoder of `kind` already holds.
    pub fn receive_encoded(&mut self, kind: MediaKind) -> Result<EncodeOutcome> {
        let destination = self.encoder_destination(kind)?;
        let session = self
            .codec_slot(kind)?
            .as_mut()
            .ok_or(MediaError::InvalidState("no encoder for that kind"))?;
        session.receive_encoded(destination)
    }

    fn encoder_destination(&self, kind: MediaKind) -> Result<Rational> {
        self.ensure_direction(Direction::Output)?;
        if !self.header_written {
            return Err(MediaError::InvalidState("header not written"));
        }
        self.stream_time_base(kind)
            .ok_or(MediaError::InvalidState("no stream of that kind is attached"))
    }

    /// Releases codec sessions, then the container. Safe to call more than once.
    pub fn close(&mut self) {
        for session in [self.video.as_mut(), self.audio.as_mut()].into_iter().flatten() {
            session.close();
        }
        self.video = None;
        self.audio = None;
        let had_input = self.input.take().is_some();
        let had_output = self.output.take().is_some();
        if had_input || had_output {
            log::debug!("{}: closed", self.locator);
        }
    }
}

impl<E: MediaEngine> Drop for ContainerSession<E> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<P> From<EngineStream<P>> for SessionStream<P> {
    fn from(stream: EngineStream<P>) -> Self {
        Self {
            descriptor: StreamDescriptor {
                index: stream.index,
                params: stream.params,
                time_base: stream.time_base,
                duration: stream.duration,
                extradata: stream.extradata,
                decoder: None,
            },
            native: stream.native,
        }
    }
}

#[cfg(test)]
#[path = "container_test.rs"]
mod container_test;
