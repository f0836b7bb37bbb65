//! [`MediaEngine`] backed by `ffmpeg-next`.

use std::ffi::CString;

use ffmpeg_next::codec::{Context, Id, Parameters};
use ffmpeg_next::{Codec, decoder, encoder, ffi};

use crate::engine::{EncoderConfig, EngineResult, MediaEngine, RawDecoderConfig};
use crate::error::EngineError;
use crate::stream::CodecHandle;
use crate::time::Rational;

mod codec;
mod convert;
mod input;
mod output;

pub use codec::FfmpegCodec;
pub use input::FfmpegInput;
pub use output::FfmpegOutput;

#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegEngine;

impl FfmpegEngine {
    pub fn new() -> Self {
        Self
    }
}

impl From<ffmpeg_next::Error> for EngineError {
    fn from(e: ffmpeg_next::Error) -> Self {
        use ffmpeg_next::Error;
        use ffmpeg_next::util::error::EAGAIN;

        match e {
            Error::Eof => EngineError::Eof,
            Error::InvalidData => EngineError::InvalidData,
            Error::Other { errno } if errno == EAGAIN => EngineError::Again,
            Error::Other { errno } if errno == ffi::ENOMEM => EngineError::OutOfMemory,
            Error::DecoderNotFound
            | Error::EncoderNotFound
            | Error::DemuxerNotFound
            | Error::MuxerNotFound
            | Error::StreamNotFound
            | Error::ProtocolNotFound
            | Error::OptionNotFound
            | Error::FilterNotFound
            | Error::BsfNotFound => EngineError::NotFound(e.to_string()),
            other => EngineError::Other(other.to_string()),
        }
    }
}

/// Codec id for a canonical name such as "hevc".
fn codec_id(name: &str) -> Option<Id> {
    let cname = CString::new(name).ok()?;
    let descriptor = unsafe { ffi::avcodec_descriptor_get_by_name(cname.as_ptr()) };
    if descriptor.is_null() {
        return None;
    }
    Some(Id::from(unsafe { (*descriptor).id }))
}

fn handle(codec: Codec) -> CodecHandle {
    CodecHandle {
        codec: codec.id().name().to_string(),
        implementation: codec.name().to_string(),
        kind: convert::media_kind(codec.medium()),
    }
}

fn decoder_by_name(name: &str) -> EngineResult<Codec> {
    decoder::find_by_name(name)
        .or_else(|| codec_id(name).and_then(decoder::find))
        .ok_or_else(|| EngineError::NotFound(format!("decoder {name}")))
}

fn encoder_by_name(name: &str) -> EngineResult<Codec> {
    encoder::find_by_name(name)
        .or_else(|| codec_id(name).and_then(encoder::find))
        .ok_or_else(|| EngineError::NotFound(format!("encoder {name}")))
}

impl MediaEngine for FfmpegEngine {
    type Params = Parameters;
    type Input = FfmpegInput;
    type Output = FfmpegOutput;
    type Codec = FfmpegCodec;

    fn probe_and_open(&self, locator: &str) -> EngineResult<FfmpegInput> {
        FfmpegInput::open(locator)
    }

    fn create_output(&self, locator: &str) -> EngineResult<FfmpegOutput> {
        FfmpegOutput::create(locator)
    }

    fn find_decoder(&self, codec: &str) -> EngineResult<CodecHandle> {
        decoder_by_name(codec).map(handle)
    }

    fn find_encoder(&self, codec: &str) -> EngineResult<CodecHandle> {
        encoder_by_name(codec).map(handle)
    }

    fn open_decoder(
        &self,
        codec: &CodecHandle,
        params: &Parameters,
        time_base: Rational,
    ) -> EngineResult<FfmpegCodec> {
        let found = decoder_by_name(&codec.implementation)?;
        let ctx = Context::from_parameters(params.clone())?;
        FfmpegCodec::open_decoder(found, ctx, time_base, true)
    }

    fn open_raw_decoder(
        &self,
        codec: &CodecHandle,
        config: &RawDecoderConfig,
    ) -> EngineResult<FfmpegCodec> {
        let found = decoder_by_name(&codec.implementation)?;
        let mut ctx = Context::new_with_codec(found);
        unsafe {
            let raw = ctx.as_mut_ptr();
            (*raw).width = config.width as i32;
            (*raw).height = config.height as i32;
        }
        FfmpegCodec::open_decoder(found, ctx, config.time_base, false)
    }

    fn open_encoder(
        &self,
        codec: &CodecHandle,
        config: &EncoderConfig,
    ) -> EngineResult<(FfmpegCodec, Parameters)> {
        let found = encoder_by_name(&codec.implementation)?;
        FfmpegCodec::open_encoder(found, config)
    }
}
