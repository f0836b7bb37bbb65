//! Contract of the codec/container engine the pipelines drive.
//!
//! Everything bit-level (probing, demuxing, decoding, encoding, muxing)
//! sits behind these traits. [`crate::ffmpeg::FfmpegEngine`] is the
//! production implementation.
//!
//! Engine calls report their status through [`EngineError`]; in particular
//! [`EngineError::Again`] means "drain output or feed input first" and
//! [`EngineError::Eof`] means the codec or container is exhausted.

use bytes::Bytes;

use crate::error::EngineError;
use crate::frame::Frame;
use crate::packet::Packet;
use crate::stream::{CodecHandle, CodecParams, MediaKind};
use crate::time::Rational;

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// A stream as reported by an opened input container.
#[derive(Debug, Clone)]
pub struct EngineStream<P> {
    pub index: usize,
    pub params: CodecParams,
    pub time_base: Rational,
    pub duration: Option<i64>,
    /// Codec configuration record (e.g. avcC), empty when the codec has none.
    pub extradata: Bytes,
    /// Engine-native parameters, used to open decoders and to copy streams.
    pub native: P,
}

/// Container-level facts, independent of any stream.
#[derive(Debug, Clone, Default)]
pub struct FormatDetails {
    pub format_name: String,
    pub duration_seconds: Option<f64>,
    pub bit_rate: i64,
}

/// Rate-control knobs handed to video encoders. Zero means "engine default".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateControl {
    pub bit_rate: i64,
    pub buffer_size: i32,
    pub max_rate: i64,
    pub min_rate: i64,
}

/// Everything needed to open an encoder for one output stream.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Target parameters. For audio an unset sample format selects the
    /// encoder's first supported one.
    pub params: CodecParams,
    pub time_base: Rational,
    pub rate_control: RateControl,
    /// Set when the output container wants codec headers out of band.
    pub global_header: bool,
}

/// Opening parameters for a decoder that has no container to learn from,
/// as in live ingestion.
#[derive(Debug, Clone)]
pub struct RawDecoderConfig {
    pub width: u32,
    pub height: u32,
    pub time_base: Rational,
}

pub trait MediaEngine {
    type Params: Clone;
    type Input: EngineInput<Params = Self::Params>;
    type Output: EngineOutput<Params = Self::Params>;
    type Codec: EngineCodec;

    /// Opens a source, probes its format and reads stream information.
    fn probe_and_open(&self, locator: &str) -> EngineResult<Self::Input>;

    /// Allocates a container whose format is guessed from the locator and
    /// opens its byte sink.
    fn create_output(&self, locator: &str) -> EngineResult<Self::Output>;

    fn find_decoder(&self, codec: &str) -> EngineResult<CodecHandle>;

    fn find_encoder(&self, codec: &str) -> EngineResult<CodecHandle>;

    fn open_decoder(
        &self,
        codec: &CodecHandle,
        params: &Self::Params,
        time_base: Rational,
    ) -> EngineResult<Self::Codec>;

    fn open_raw_decoder(
        &self,
        codec: &CodecHandle,
        config: &RawDecoderConfig,
    ) -> EngineResult<Self::Codec>;

    /// Opens an encoder and returns it with the stream parameters it will
    /// produce.
    fn open_encoder(
        &self,
        codec: &CodecHandle,
        config: &EncoderConfig,
    ) -> EngineResult<(Self::Codec, Self::Params)>;
}

pub trait EngineInput {
    type Params: Clone;

    fn details(&self) -> FormatDetails;

    fn streams(&self) -> Vec<EngineStream<Self::Params>>;

    /// Next packet in file order, stamped with its stream's time base.
    /// [`EngineError::Eof`] once the source is exhausted.
    fn read_packet(&mut self) -> EngineResult<Packet>;

    /// Moves the read position to the nearest seekable point at or before
    /// `timestamp` (in the stream's time base).
    fn seek(&mut self, stream_index: usize, timestamp: i64) -> EngineResult<()>;
}

pub trait EngineOutput {
    type Params: Clone;

    fn needs_global_header(&self) -> bool;

    /// Adds a stream and returns its index. `time_base` is a hint; the real
    /// one is only known after [`EngineOutput::write_header`].
    fn add_stream(&mut self, params: &Self::Params, time_base: Rational) -> EngineResult<usize>;

    fn write_header(&mut self) -> EngineResult<()>;

    fn stream_time_base(&self, index: usize) -> Option<Rational>;

    /// Takes ownership of `packet`; the engine reorders across streams.
    fn write_interleaved(&mut self, packet: Packet) -> EngineResult<()>;

    fn write_trailer(&mut self) -> EngineResult<()>;
}

pub trait EngineCodec {
    fn kind(&self) -> MediaKind;

    /// Clock of the packets going in (decoders) or coming out (encoders).
    fn time_base(&self) -> Rational;

    /// `None` signals end of input and starts draining.
    fn send_packet(&mut self, packet: Option<&Packet>) -> EngineResult<()>;

    fn receive_frame(&mut self) -> EngineResult<Frame>;

    /// `None` signals end of input and starts draining.
    fn send_frame(&mut self, frame: Option<&Frame>) -> EngineResult<()>;

    fn receive_packet(&mut self) -> EngineResult<Packet>;

    /// Drops buffered state and leaves the draining mode.
    fn flush(&mut self);
}
