//! Video decoding and GPU texture module
//!
//! Provides video file decoding using FFmpeg via the `ffmpeg-next` crate.
//! Decoded frames are returned as RGBA pixel buffers ready for GPU upload.

mod decoder;
mod player;
mod texture;

pub use decoder::{VideoDecoder, VideoError, VideoFrame};
pub use player::{VideoInfo, VideoPlayer};
pub use texture::VideoTexture;
