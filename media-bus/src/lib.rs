/// Registers FFmpeg components. Call once at startup before opening any
/// container.
pub fn init() -> Result<(), MediaError> {
    ffmpeg_next::init().map_err(|e| MediaError::Configuration(format!("ffmpeg_next init: {}", e)))
}

pub mod annexb;
pub mod codec;
pub mod container;
pub mod engine;
pub mod error;
pub mod ffmpeg;
pub mod frame;
pub mod live;
pub mod metadata;
pub mod packet;
pub mod remux;
pub mod retime;
pub mod settings;
pub mod source;
pub mod stream;
pub mod time;
pub mod transcode;

#[cfg(test)]
mod mock;

pub use container::{ContainerSession, Direction, StreamSetup};
pub use error::{MediaError, Result};
pub use ffmpeg::FfmpegEngine;
pub use settings::{LiveSettings, TranscodeSettings};
