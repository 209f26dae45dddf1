//! Video decoder using FFmpeg
//!
//! Decodes video files to RGBA frames using the ffmpeg-next crate. Only the
//! video stream is opened; audio streams are never touched, so playback is
//! muted by construction.

use std::path::Path;

/// Errors that can occur during video decoding
#[derive(Debug)]
pub enum VideoError {
    /// Failed to open the video file
    OpenFailed(String),
    /// No video stream found in the file
    NoVideoStream,
    /// Failed to create decoder
    DecoderCreationFailed(String),
    /// Failed to create scaler
    ScalerCreationFailed(String),
    /// Decoding error
    DecodeFailed(String),
    /// FFmpeg error
    Ffmpeg(ffmpeg_next::Error),
}

impl std::fmt::Display for VideoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VideoError::OpenFailed(path) => write!(f, "Failed to open video file: {}", path),
            VideoError::NoVideoStream => write!(f, "No video stream found in file"),
            VideoError::DecoderCreationFailed(msg) => {
                write!(f, "Failed to create decoder: {}", msg)
            }
            VideoError::ScalerCreationFailed(msg) => {
                write!(f, "Failed to create scaler: {}", msg)
            }
            VideoError::DecodeFailed(msg) => write!(f, "Decoding failed: {}", msg),
            VideoError::Ffmpeg(e) => write!(f, "FFmpeg error: {}", e),
        }
    }
}

impl std::error::Error for VideoError {}

impl From<ffmpeg_next::Error> for VideoError {
    fn from(e: ffmpeg_next::Error) -> Self {
        VideoError::Ffmpeg(e)
    }
}

/// A decoded RGBA video frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// RGBA pixel data, 4 bytes per pixel
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Presentation timestamp in seconds
    pub pts: f64,
    /// Frame index (0-based)
    pub frame_index: u64,
}

impl VideoFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, pts: f64, frame_index: u64) -> Self {
        Self {
            data,
            width,
            height,
            pts,
            frame_index,
        }
    }

    /// Expected data size for the given dimensions (width * height * 4)
    pub fn expected_size(width: u32, height: u32) -> usize {
        (width as usize) * (height as usize) * 4
    }

    /// Bytes per row
    pub fn stride(&self) -> usize {
        (self.width as usize) * 4
    }

    /// Check if the frame data has the correct size
    pub fn is_valid(&self) -> bool {
        self.data.len() == Self::expected_size(self.width, self.height)
    }
}

/// Video decoder that reads frames from a video file
pub struct VideoDecoder {
    /// The input format context
    input: ffmpeg_next::format::context::Input,
    /// Index of the video stream
    video_stream_index: usize,
    /// Video decoder
    decoder: ffmpeg_next::decoder::Video,
    /// Scaler for converting to RGBA
    scaler: ffmpeg_next::software::scaling::Context,
    /// Video width
    width: u32,
    /// Video height
    height: u32,
    /// Frame rate (fps)
    frame_rate: f64,
    /// Video duration in seconds
    duration: f64,
    /// Time base for PTS conversion
    time_base: f64,
    /// Current frame index
    frame_index: u64,
    /// Whether we've reached end of file
    eof: bool,
}

impl VideoDecoder {
    /// Open a video file for decoding
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, VideoError> {
        // Initialize FFmpeg (safe to call multiple times)
        ffmpeg_next::init()?;

        let path = path.as_ref();
        let path_str = path.to_string_lossy().to_string();

        let input = ffmpeg_next::format::input(&path)
            .map_err(|_| VideoError::OpenFailed(path_str.clone()))?;

        let video_stream = input
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or(VideoError::NoVideoStream)?;

        let video_stream_index = video_stream.index();

        let time_base = video_stream.time_base();
        let time_base_f64 = time_base.numerator() as f64 / time_base.denominator() as f64;

        let frame_rate = video_stream.avg_frame_rate();
        let frame_rate_f64 = if frame_rate.denominator() > 0 {
            frame_rate.numerator() as f64 / frame_rate.denominator() as f64
        } else {
            30.0 // Default fallback
        };

        let duration = if video_stream.duration() > 0 {
            video_stream.duration() as f64 * time_base_f64
        } else if input.duration() > 0 {
            input.duration() as f64 / ffmpeg_next::ffi::AV_TIME_BASE as f64
        } else {
            0.0
        };

        let parameters = video_stream.parameters();
        let context = ffmpeg_next::codec::context::Context::from_parameters(parameters)?;
        let decoder = context.decoder().video().map_err(|e| {
            VideoError::DecoderCreationFailed(format!("Failed to create video decoder: {}", e))
        })?;

        let width = decoder.width();
        let height = decoder.height();

        tracing::info!(
            "Opened video: {}x{} @ {:.2}fps, duration: {:.2}s",
            width,
            height,
            frame_rate_f64,
            duration
        );

        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGBA,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .map_err(|e| VideoError::ScalerCreationFailed(e.to_string()))?;

        Ok(Self {
            input,
            video_stream_index,
            decoder,
            scaler,
            width,
            height,
            frame_rate: frame_rate_f64,
            duration,
            time_base: time_base_f64,
            frame_index: 0,
            eof: false,
        })
    }

    /// Decode the next frame, returning None at end of file
    pub fn decode_next_frame(&mut self) -> Result<Option<VideoFrame>, VideoError> {
        if self.eof {
            return Ok(None);
        }

        let mut decoded_frame = ffmpeg_next::frame::Video::empty();

        loop {
            // First, try to receive any pending frames from the decoder
            match self.decoder.receive_frame(&mut decoded_frame) {
                Ok(()) => {
                    let pts = decoded_frame.pts().unwrap_or(0) as f64 * self.time_base;

                    // Recreate scaler if the stream changed pixel format mid-flight
                    if decoded_frame.format() != self.scaler.input().format {
                        self.scaler = ffmpeg_next::software::scaling::Context::get(
                            decoded_frame.format(),
                            self.width,
                            self.height,
                            ffmpeg_next::format::Pixel::RGBA,
                            self.width,
                            self.height,
                            ffmpeg_next::software::scaling::Flags::BILINEAR,
                        )
                        .map_err(|e| VideoError::ScalerCreationFailed(e.to_string()))?;
                    }

                    let mut rgba_frame = ffmpeg_next::frame::Video::empty();
                    self.scaler.run(&decoded_frame, &mut rgba_frame)?;

                    let data = rgba_frame.data(0);
                    let stride = rgba_frame.stride(0);
                    let expected_stride = (self.width as usize) * 4;

                    let rgba_data = if stride == expected_stride {
                        data[..VideoFrame::expected_size(self.width, self.height)].to_vec()
                    } else {
                        // Scaler rows can be padded; copy row by row
                        let mut output =
                            Vec::with_capacity(VideoFrame::expected_size(self.width, self.height));
                        for y in 0..self.height as usize {
                            let row_start = y * stride;
                            let row_end = row_start + expected_stride;
                            output.extend_from_slice(&data[row_start..row_end]);
                        }
                        output
                    };

                    let pts_frame_index = (pts * self.frame_rate).round() as u64;
                    let frame =
                        VideoFrame::new(rgba_data, self.width, self.height, pts, pts_frame_index);
                    self.frame_index = pts_frame_index + 1;

                    return Ok(Some(frame));
                }
                Err(ffmpeg_next::Error::Other {
                    errno: ffmpeg_next::error::EAGAIN,
                }) => {
                    // Need more input - read next packet
                }
                Err(ffmpeg_next::Error::Eof) => {
                    self.eof = true;
                    return Ok(None);
                }
                Err(e) => {
                    return Err(VideoError::DecodeFailed(e.to_string()));
                }
            }

            // Read next packet and send to decoder
            loop {
                match self.input.packets().next() {
                    Some((stream, packet)) => {
                        if stream.index() == self.video_stream_index {
                            self.decoder.send_packet(&packet)?;
                            break;
                        }
                    }
                    None => {
                        self.decoder.send_eof()?;
                        self.eof = true;
                        break;
                    }
                }
            }
        }
    }

    /// Reset the decoder to the beginning of the file
    pub fn reset(&mut self) -> Result<(), VideoError> {
        self.input.seek(0, ..)?;
        self.decoder.flush();
        self.frame_index = 0;
        self.eof = false;
        Ok(())
    }

    /// Get the video width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Get the video height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Get the video frame rate (fps)
    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    /// Get the video duration in seconds
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Get the current frame index
    pub fn current_frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Check if we've reached end of file
    pub fn is_eof(&self) -> bool {
        self.eof
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_error_display() {
        let err = VideoError::NoVideoStream;
        assert_eq!(err.to_string(), "No video stream found in file");
    }

    #[test]
    fn test_frame_creation() {
        let width = 1920;
        let height = 1080;
        let data = vec![0u8; VideoFrame::expected_size(width, height)];
        let frame = VideoFrame::new(data, width, height, 0.0, 0);

        assert_eq!(frame.width, 1920);
        assert_eq!(frame.height, 1080);
        assert!(frame.is_valid());
        assert_eq!(frame.stride(), 1920 * 4);
    }

    #[test]
    fn test_expected_size() {
        assert_eq!(VideoFrame::expected_size(1920, 1080), 1920 * 1080 * 4);
        assert_eq!(VideoFrame::expected_size(1280, 720), 1280 * 720 * 4);
    }
}
