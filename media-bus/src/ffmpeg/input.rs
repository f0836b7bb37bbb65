use std::path::Path;

use ffmpeg_next::codec::Parameters;
use ffmpeg_next::ffi;

use super::convert;
use crate::engine::{EngineInput, EngineResult, EngineStream, FormatDetails};
use crate::packet::Packet;
use crate::time::Rational;

/// A demuxer opened on a file or URL.
pub struct FfmpegInput {
    inner: ffmpeg_next::format::context::Input,
    time_bases: Vec<Rational>,
}

impl FfmpegInput {
    pub(super) fn open(locator: &str) -> EngineResult<Self> {
        let inner = ffmpeg_next::format::input(Path::new(locator))?;
        let time_bases = inner
            .streams()
            .map(|s| convert::from_av(s.time_base()).unwrap_or(Rational::MICROS))
            .collect();
        Ok(Self { inner, time_bases })
    }
}

impl EngineInput for FfmpegInput {
    type Params = Parameters;

    fn details(&self) -> FormatDetails {
        // duration is in AV_TIME_BASE (microsecond) units
        let duration = self.inner.duration();
        FormatDetails {
            format_name: self.inner.format().name().to_string(),
            duration_seconds: (duration != ffi::AV_NOPTS_VALUE && duration > 0)
                .then(|| duration as f64 / 1_000_000.0),
            bit_rate: self.inner.bit_rate(),
        }
    }

    fn streams(&self) -> Vec<EngineStream<Parameters>> {
        self.inner
            .streams()
            .map(|stream| {
                let native = stream.parameters();
                let duration = stream.duration();
                EngineStream {
                    index: stream.index(),
                    params: convert::codec_params(&native, stream.avg_frame_rate()),
                    time_base: self.time_bases[stream.index()],
                    duration: (duration != ffi::AV_NOPTS_VALUE && duration >= 0).then_some(duration),
                    extradata: convert::extradata(&native),
                    native,
                }
            })
            .collect()
    }

    fn read_packet(&mut self) -> EngineResult<Packet> {
        let mut packet = ffmpeg_next::codec::packet::Packet::empty();
        packet.read(&mut self.inner)?;
        let index = packet.stream();
        let time_base = self
            .time_bases
            .get(index)
            .copied()
            .unwrap_or(Rational::MICROS);
        Ok(convert::packet_from_av(&packet, index, time_base))
    }

    fn seek(&mut self, stream_index: usize, timestamp: i64) -> EngineResult<()> {
        let ret = unsafe {
            ffi::av_seek_frame(
                self.inner.as_mut_ptr(),
                stream_index as i32,
                timestamp,
                ffi::AVSEEK_FLAG_BACKWARD as i32,
            )
        };
        if ret < 0 {
            return Err(ffmpeg_next::Error::from(ret).into());
        }
        Ok(())
    }
}
