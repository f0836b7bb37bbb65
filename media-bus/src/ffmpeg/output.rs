use ffmpeg_next::codec::Parameters;

use super::convert;
use crate::engine::{EngineOutput, EngineResult};
use crate::packet::Packet;
use crate::time::Rational;

/// A muxer whose format is guessed from the output name.
pub struct FfmpegOutput {
    inner: ffmpeg_next::format::context::Output,
}

impl FfmpegOutput {
    pub(super) fn create(locator: &str) -> EngineResult<Self> {
        let inner = ffmpeg_next::format::output(&locator)?;
        Ok(Self { inner })
    }
}

impl EngineOutput for FfmpegOutput {
    type Params = Parameters;

    fn needs_global_header(&self) -> bool {
        self.inner
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER)
    }

    fn add_stream(&mut self, params: &Parameters, time_base: Rational) -> EngineResult<usize> {
        let mut stream = self
            .inner
            .add_stream(ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::None))?;
        stream.set_parameters(params.clone());
        // let the muxer pick a tag valid for its own format
        unsafe {
            (*(*stream.as_mut_ptr()).codecpar).codec_tag = 0;
        }
        stream.set_time_base(convert::to_av(time_base));
        Ok(stream.index())
    }

    fn write_header(&mut self) -> EngineResult<()> {
        self.inner.write_header()?;
        Ok(())
    }

    fn stream_time_base(&self, index: usize) -> Option<Rational> {
        self.inner
            .stream(index)
            .and_then(|s| convert::from_av(s.time_base()))
    }

    fn write_interleaved(&mut self, packet: Packet) -> EngineResult<()> {
        convert::packet_to_av(&packet).write_interleaved(&mut self.inner)?;
        Ok(())
    }

    fn write_trailer(&mut self) -> EngineResult<()> {
        self.inner.write_trailer()?;
        Ok(())
    }
}
