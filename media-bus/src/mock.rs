//! In-memory engine for exercising sessions and pipelines without FFmpeg.
//!
//! Mock decoders treat packets whose payload starts with `X` as corrupt and
//! report end of stream for payloads starting with `E`.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::engine::{
    EncoderConfig, EngineCodec, EngineInput, EngineOutput, EngineResult, EngineStream,
    FormatDetails, MediaEngine, RawDecoderConfig,
};
use crate::error::EngineError;
use crate::frame::{AudioFrame, Frame, Plane, VideoFrame};
use crate::packet::Packet;
use crate::stream::{AudioParams, CodecHandle, CodecParams, MediaKind, MediaParams, VideoParams};
use crate::time::Rational;

pub fn tb(num: i32, den: i32) -> Rational {
    Rational::new(num, den).unwrap()
}

fn kind_of(codec: &str) -> MediaKind {
    match codec {
        "h264" | "hevc" | "mpeg4" | "vp9" => MediaKind::Video,
        "aac" | "mp3" | "opus" => MediaKind::Audio,
        _ => MediaKind::Other,
    }
}

#[derive(Debug, Clone)]
pub struct MockStream {
    pub codec: &'static str,
    pub time_base: Rational,
}

#[derive(Debug, Clone, Default)]
pub struct MockSource {
    pub streams: Vec<MockStream>,
    pub packets: Vec<Packet>,
}

impl MockSource {
    /// Stream 0 is h264 at 1/90000 (3600 per frame), stream 1 is aac at
    /// 1/44100 (1024 per frame). Packets alternate video, audio.
    pub fn av(video: usize, audio: usize) -> Self {
        let mut source = Self {
            streams: vec![
                MockStream {
                    codec: "h264",
                    time_base: tb(1, 90000),
                },
                MockStream {
                    codec: "aac",
                    time_base: tb(1, 44100),
                },
            ],
            packets: Vec::new(),
        };
        for i in 0..video.max(audio) {
            if i < video {
                source.packets.push(video_packet(i as i64));
            }
            if i < audio {
                source.packets.push(audio_packet(i as i64));
            }
        }
        source
    }

    pub fn with_stream(mut self, codec: &'static str, time_base: Rational) -> Self {
        self.streams.push(MockStream { codec, time_base });
        self
    }

    pub fn with_packet(mut self, packet: Packet) -> Self {
        self.packets.push(packet);
        self
    }
}

pub fn video_packet(i: i64) -> Packet {
    Packet::new(vec![b'v', i as u8], 0, tb(1, 90000))
        .with_timestamps(Some(i * 3600), Some(i * 3600))
        .with_duration(3600)
        .with_key(i == 0)
        .with_position(Some(i * 100))
}

pub fn audio_packet(i: i64) -> Packet {
    Packet::new(vec![b'a', i as u8], 1, tb(1, 44100))
        .with_timestamps(Some(i * 1024), Some(i * 1024))
        .with_duration(1024)
        .with_key(true)
}

pub fn corrupt_packet(stream_index: usize, time_base: Rational) -> Packet {
    Packet::new(&b"XX"[..], stream_index, time_base)
}

#[derive(Debug, Clone, Copy)]
pub struct DecoderScript {
    /// Packets held back before the first frame comes out.
    pub delay: usize,
    pub frames_per_packet: usize,
    /// Pending frames at which the decoder refuses input with `Again`.
    pub capacity: usize,
}

impl Default for DecoderScript {
    fn default() -> Self {
        Self {
            delay: 0,
            frames_per_packet: 1,
            capacity: 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MuxEvent {
    Stream { index: usize, time_base: Rational },
    Header,
    Packet(Packet),
    Trailer,
}

#[derive(Default)]
struct MockState {
    inputs: HashMap<String, MockSource>,
    events: HashMap<String, Vec<MuxEvent>>,
    missing_decoders: HashSet<String>,
    missing_encoders: HashSet<String>,
    failing_decoders: HashSet<String>,
    decoder: DecoderScript,
    encoder_delay: usize,
    fail_writes_after: Option<usize>,
    header_time_base: Option<Rational>,
}

#[derive(Clone, Default)]
pub struct MockEngine {
    state: Arc<Mutex<MockState>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state(self, f: impl FnOnce(&mut MockState)) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    pub fn with_input(self, locator: &str, source: MockSource) -> Self {
        self.with_state(|s| {
            s.inputs.insert(locator.to_string(), source);
        })
    }

    pub fn missing_decoder(self, codec: &str) -> Self {
        self.with_state(|s| {
            s.missing_decoders.insert(codec.to_string());
        })
    }

    pub fn missing_encoder(self, codec: &str) -> Self {
        self.with_state(|s| {
            s.missing_encoders.insert(codec.to_string());
        })
    }

    pub fn failing_decoder(self, codec: &str) -> Self {
        self.with_state(|s| {
            s.failing_decoders.insert(codec.to_string());
        })
    }

    pub fn decoder_script(self, script: DecoderScript) -> Self {
        self.with_state(|s| s.decoder = script)
    }

    pub fn encoder_delay(self, delay: usize) -> Self {
        self.with_state(|s| s.encoder_delay = delay)
    }

    pub fn fail_writes_after(self, count: usize) -> Self {
        self.with_state(|s| s.fail_writes_after = Some(count))
    }

    /// Time base every output stream switches to when the header is written.
    pub fn header_time_base(self, time_base: Rational) -> Self {
        self.with_state(|s| s.header_time_base = Some(time_base))
    }

    pub fn events(&self, locator: &str) -> Vec<MuxEvent> {
        self.state
            .lock()
            .unwrap()
            .events
            .get(locator)
            .cloned()
            .unwrap_or_default()
    }

    pub fn written_packets(&self, locator: &str) -> Vec<Packet> {
        self.events(locator)
            .into_iter()
            .filter_map(|e| match e {
                MuxEvent::Packet(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    fn handle(&self, codec: &str, missing: bool) -> EngineResult<CodecHandle> {
        let kind = kind_of(codec);
        if missing || kind == MediaKind::Other {
            return Err(EngineError::NotFound(codec.to_string()));
        }
        Ok(CodecHandle {
            codec: codec.to_string(),
            implementation: format!("mock-{codec}"),
            kind,
        })
    }
}

impl MediaEngine for MockEngine {
    type Params = CodecParams;
    type Input = MockInput;
    type Output = MockOutput;
    type Codec = MockCodec;

    fn probe_and_open(&self, locator: &str) -> EngineResult<MockInput> {
        let state = self.state.lock().unwrap();
        let source = state
            .inputs
            .get(locator)
            .cloned()
            .ok_or_else(|| EngineError::Other("No such file or directory".into()))?;
        Ok(MockInput { source, cursor: 0 })
    }

    fn create_output(&self, locator: &str) -> EngineResult<MockOutput> {
        if locator.contains("unwritable") {
            return Err(EngineError::Other("Permission denied".into()));
        }
        self.state
            .lock()
            .unwrap()
            .events
            .insert(locator.to_string(), Vec::new());
        Ok(MockOutput {
            locator: locator.to_string(),
            state: self.state.clone(),
            streams: Vec::new(),
            written: 0,
        })
    }

    fn find_decoder(&self, codec: &str) -> EngineResult<CodecHandle> {
        let missing = self.state.lock().unwrap().missing_decoders.contains(codec);
        self.handle(codec, missing)
    }

    fn find_encoder(&self, codec: &str) -> EngineResult<CodecHandle> {
        let missing = self.state.lock().unwrap().missing_encoders.contains(codec);
        self.handle(codec, missing)
    }

    fn open_decoder(
        &self,
        codec: &CodecHandle,
        _params: &CodecParams,
        time_base: Rational,
    ) -> EngineResult<MockCodec> {
        let state = self.state.lock().unwrap();
        if state.failing_decoders.contains(&codec.codec) {
            return Err(EngineError::Other("unsupported profile".into()));
        }
        Ok(MockCodec::decoder(codec.kind, time_base, state.decoder))
    }

    fn open_raw_decoder(
        &self,
        codec: &CodecHandle,
        config: &RawDecoderConfig,
    ) -> EngineResult<MockCodec> {
        let state = self.state.lock().unwrap();
        Ok(MockCodec::decoder(codec.kind, config.time_base, state.decoder))
    }

    fn open_encoder(
        &self,
        codec: &CodecHandle,
        config: &EncoderConfig,
    ) -> EngineResult<(MockCodec, CodecParams)> {
        let delay = self.state.lock().unwrap().encoder_delay;
        let mut params = config.params.clone();
        params.codec = codec.codec.clone();
        Ok((MockCodec::encoder(codec.kind, config.time_base, delay), params))
    }
}

pub struct MockInput {
    source: MockSource,
    cursor: usize,
}

impl EngineInput for MockInput {
    type Params = CodecParams;

    fn details(&self) -> FormatDetails {
        FormatDetails {
            format_name: "mock".into(),
            duration_seconds: None,
            bit_rate: 0,
        }
    }

    fn streams(&self) -> Vec<EngineStream<CodecParams>> {
        self.source
            .streams
            .iter()
            .enumerate()
            .map(|(index, s)| {
                let media = match kind_of(s.codec) {
                    MediaKind::Video => MediaParams::Video(VideoParams {
                        width: 4,
                        height: 4,
                        pixel_format: Some("yuv420p".into()),
                        frame_rate: Some(tb(25, 1)),
                    }),
                    MediaKind::Audio => MediaParams::Audio(AudioParams {
                        sample_rate: 44100,
                        channels: 2,
                        sample_format: Some("fltp".into()),
                    }),
                    MediaKind::Other => MediaParams::Other,
                };
                let params = CodecParams {
                    codec: s.codec.to_string(),
                    bit_rate: 0,
                    media,
                };
                EngineStream {
                    index,
                    params: params.clone(),
                    time_base: s.time_base,
                    duration: None,
                    extradata: Bytes::new(),
                    native: params,
                }
            })
            .collect()
    }

    fn read_packet(&mut self) -> EngineResult<Packet> {
        let packet = self
            .source
            .packets
            .get(self.cursor)
            .cloned()
            .ok_or(EngineError::Eof)?;
        self.cursor += 1;
        Ok(packet)
    }

    fn seek(&mut self, stream_index: usize, timestamp: i64) -> EngineResult<()> {
        self.cursor = self
            .source
            .packets
            .iter()
            .rposition(|p| p.index() == stream_index && p.pts().is_some_and(|pts| pts <= timestamp))
            .unwrap_or(0);
        Ok(())
    }
}

pub struct MockOutput {
    locator: String,
    state: Arc<Mutex<MockState>>,
    streams: Vec<Rational>,
    written: usize,
}

impl MockOutput {
    fn record(&self, event: MuxEvent) {
        self.state
            .lock()
            .unwrap()
            .events
            .entry(self.locator.clone())
            .or_default()
            .push(event);
    }
}

impl EngineOutput for MockOutput {
    type Params = CodecParams;

    fn needs_global_header(&self) -> bool {
        false
    }

    fn add_stream(&mut self, _params: &CodecParams, time_base: Rational) -> EngineResult<usize> {
        let index = self.streams.len();
        self.streams.push(time_base);
        self.record(MuxEvent::Stream { index, time_base });
        Ok(index)
    }

    fn write_header(&mut self) -> EngineResult<()> {
        if let Some(header_tb) = self.state.lock().unwrap().header_time_base {
            self.streams.iter_mut().for_each(|t| *t = header_tb);
        }
        self.record(MuxEvent::Header);
        Ok(())
    }

    fn stream_time_base(&self, index: usize) -> Option<Rational> {
        self.streams.get(index).copied()
    }

    fn write_interleaved(&mut self, packet: Packet) -> EngineResult<()> {
        let limit = self.state.lock().unwrap().fail_writes_after;
        if limit.is_some_and(|n| self.written >= n) {
            return Err(EngineError::Other("No space left on device".into()));
        }
        self.written += 1;
        self.record(MuxEvent::Packet(packet));
        Ok(())
    }

    fn write_trailer(&mut self) -> EngineResult<()> {
        self.record(MuxEvent::Trailer);
        Ok(())
    }
}

pub struct MockCodec {
    kind: MediaKind,
    time_base: Rational,
    script: DecoderScript,
    encoder_delay: usize,
    held: VecDeque<Packet>,
    queued: VecDeque<Frame>,
    frames: VecDeque<Frame>,
    packets: VecDeque<Packet>,
    draining: bool,
    /// Refuse frames until every encoded packet was pulled, as FFmpeg does.
    strict_output: bool,
}

impl MockCodec {
    pub fn decoder(kind: MediaKind, time_base: Rational, script: DecoderScript) -> Self {
        Self {
            kind,
            time_base,
            script,
            encoder_delay: 0,
            held: VecDeque::new(),
            queued: VecDeque::new(),
            frames: VecDeque::new(),
            packets: VecDeque::new(),
            draining: false,
            strict_output: false,
        }
    }

    pub fn encoder(kind: MediaKind, time_base: Rational, delay: usize) -> Self {
        Self {
            encoder_delay: delay,
            ..Self::decoder(kind, time_base, DecoderScript::default())
        }
    }

    pub fn refusing_until_drained(mut self) -> Self {
        self.strict_output = true;
        self
    }

    fn emit_frames(&mut self, packet: Packet) {
        for i in 0..self.script.frames_per_packet.max(1) {
            let pts = packet.pts().map(|p| p + i as i64);
            let frame = match self.kind {
                MediaKind::Audio => Frame::Audio(AudioFrame {
                    planes: vec![Plane::new(packet.data().clone(), packet.size())],
                    samples: 1024,
                    sample_rate: 44100,
                    channels: 2,
                    sample_format: "fltp".into(),
                    pts,
                    time_base: None,
                }),
                _ => Frame::Video(VideoFrame {
                    planes: vec![Plane::new(packet.data().clone(), 4)],
                    width: 4,
                    height: 4,
                    pixel_format: "yuv420p".into(),
                    pts,
                    is_key: packet.is_key(),
                    time_base: None,
                }),
            };
            self.frames.push_back(frame);
        }
    }

    fn emit_packet(&mut self, frame: Frame) {
        let data = frame
            .planes()
            .first()
            .map(|p| p.data.clone())
            .unwrap_or_else(Bytes::new);
        let packet = Packet::new(data, 0, self.time_base)
            .with_timestamps(frame.pts(), frame.pts())
            .with_duration(1)
            .with_key(true);
        self.packets.push_back(packet);
    }
}

impl EngineCodec for MockCodec {
    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn time_base(&self) -> Rational {
        self.time_base
    }

    fn send_packet(&mut self, packet: Option<&Packet>) -> EngineResult<()> {
        let Some(packet) = packet else {
            self.draining = true;
            while let Some(p) = self.held.pop_front() {
                self.emit_frames(p);
            }
            return Ok(());
        };
        if self.draining {
            return Err(EngineError::Eof);
        }
        if self.frames.len() >= self.script.capacity {
            return Err(EngineError::Again);
        }
        match packet.data().first() {
            Some(b'X') => return Err(EngineError::InvalidData),
            Some(b'E') => {
                self.draining = true;
                return Err(EngineError::Eof);
            }
            _ => {}
        }
        self.held.push_back(packet.clone());
        if self.held.len() > self.script.delay {
            if let Some(p) = self.held.pop_front() {
                self.emit_frames(p);
            }
        }
        Ok(())
    }

    fn receive_frame(&mut self) -> EngineResult<Frame> {
        match self.frames.pop_front() {
            Some(frame) => Ok(frame),
            None if self.draining => Err(EngineError::Eof),
            None => Err(EngineError::Again),
        }
    }

    fn send_frame(&mut self, frame: Option<&Frame>) -> EngineResult<()> {
        let Some(frame) = frame else {
            self.draining = true;
            while let Some(f) = self.queued.pop_front() {
                self.emit_packet(f);
            }
            return Ok(());
        };
        if self.draining {
            return Err(EngineError::Eof);
        }
        if self.packets.len() >= 4 || (self.strict_output && !self.packets.is_empty()) {
            return Err(EngineError::Again);
        }
        self.queued.push_back(frame.clone());
        if self.queued.len() > self.encoder_delay {
            if let Some(f) = self.queued.pop_front() {
                self.emit_packet(f);
            }
        }
        Ok(())
    }

    fn receive_packet(&mut self) -> EngineResult<Packet> {
        match self.packets.pop_front() {
            Some(packet) => Ok(packet),
            None if self.draining => Err(EngineError::Eof),
            None => Err(EngineError::Again),
        }
    }

    fn flush(&mut self) {
        self.held.clear();
        self.queued.clear();
        self.frames.clear();
        self.packets.clear();
        self.draining = false;
    }
}
