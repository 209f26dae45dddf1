//! Media plane factory
//!
//! Billboard quads for video and image media. Every plane has the same
//! fixed width in stage units; height follows the source aspect ratio.

use bytemuck::{Pod, Zeroable};
use image::RgbaImage;

use crate::video::{VideoFrame, VideoPlayer};

/// Width in stage units of every media plane
pub const REFERENCE_WIDTH: f32 = 1.1;

/// Plane size preserving the source aspect ratio at the reference width
pub fn plane_size(source_width: f32, source_height: f32) -> (f32, f32) {
    (
        REFERENCE_WIDTH,
        REFERENCE_WIDTH * source_height / source_width,
    )
}

/// Vertex layout shared by planes and model meshes
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct StageVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl StageVertex {
    /// Vertex buffer layout for the forward pipeline
    pub fn desc<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<StageVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: (std::mem::size_of::<[f32; 3]>() * 2) as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        }
    }
}

/// Playback handle for a video plane
///
/// Wraps the player so found/lost dispatch can be driven (and tested)
/// without touching the decode thread directly.
pub struct VideoSource {
    player: Option<VideoPlayer>,
    playing: bool,
}

impl VideoSource {
    /// Wrap an opened player; stays paused until the target is found
    pub fn new(player: VideoPlayer) -> Self {
        Self {
            player: Some(player),
            playing: false,
        }
    }

    /// Source with no backing player, for exercising dispatch in tests
    #[cfg(test)]
    pub fn detached() -> Self {
        Self {
            player: None,
            playing: false,
        }
    }

    pub fn play(&mut self) {
        if let Some(player) = &self.player {
            player.resume();
        }
        self.playing = true;
    }

    pub fn pause(&mut self) {
        if let Some(player) = &self.player {
            player.pause();
        }
        self.playing = false;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Latest decoded frame if a new one arrived since the last call
    pub fn take_frame(&self) -> Option<VideoFrame> {
        self.player.as_ref().and_then(|p| p.take_frame())
    }

    /// Source dimensions in pixels
    pub fn size(&self) -> Option<(u32, u32)> {
        self.player.as_ref().map(|p| (p.width(), p.height()))
    }
}

/// Still image behind an image plane
pub struct ImageSource {
    image: RgbaImage,
}

impl ImageSource {
    pub fn new(image: RgbaImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Raw RGBA pixel data
    pub fn data(&self) -> &[u8] {
        self.image.as_raw()
    }
}

/// Texture source behind a media plane
pub enum PlaneSource {
    Video(VideoSource),
    Image(ImageSource),
}

/// A billboard quad carrying one media source
pub struct MediaPlane {
    pub width: f32,
    pub height: f32,
    pub opacity: f32,
    pub source: PlaneSource,
}

impl MediaPlane {
    /// Two triangles over the quad
    pub const INDICES: [u32; 6] = [0, 1, 2, 2, 3, 0];

    /// Video-textured plane sized from the given source dimensions
    pub fn video(source: VideoSource, source_width: f32, source_height: f32, opacity: f32) -> Self {
        let (width, height) = plane_size(source_width, source_height);
        Self {
            width,
            height,
            opacity,
            source: PlaneSource::Video(source),
        }
    }

    /// Image-textured plane sized from the given source dimensions
    pub fn image(source: ImageSource, source_width: f32, source_height: f32, opacity: f32) -> Self {
        let (width, height) = plane_size(source_width, source_height);
        Self {
            width,
            height,
            opacity,
            source: PlaneSource::Image(source),
        }
    }

    /// Quad vertices centered at the origin in the XY plane, facing +Z
    pub fn vertices(&self) -> [StageVertex; 4] {
        let hw = self.width / 2.0;
        let hh = self.height / 2.0;
        let normal = [0.0, 0.0, 1.0];
        [
            StageVertex {
                position: [-hw, -hh, 0.0],
                normal,
                uv: [0.0, 1.0],
            },
            StageVertex {
                position: [hw, -hh, 0.0],
                normal,
                uv: [1.0, 1.0],
            },
            StageVertex {
                position: [hw, hh, 0.0],
                normal,
                uv: [1.0, 0.0],
            },
            StageVertex {
                position: [-hw, hh, 0.0],
                normal,
                uv: [0.0, 0.0],
            },
        ]
    }

    pub fn video_source(&self) -> Option<&VideoSource> {
        match &self.source {
            PlaneSource::Video(source) => Some(source),
            PlaneSource::Image(_) => None,
        }
    }

    pub fn video_source_mut(&mut self) -> Option<&mut VideoSource> {
        match &mut self.source {
            PlaneSource::Video(source) => Some(source),
            PlaneSource::Image(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plane_size_keeps_aspect() {
        let (width, height) = plane_size(16.0, 9.0);
        assert_eq!(width, REFERENCE_WIDTH);
        assert!((height - REFERENCE_WIDTH * 9.0 / 16.0).abs() < 1e-6);
    }

    #[test]
    fn test_portrait_plane_is_taller() {
        let (width, height) = plane_size(9.0, 16.0);
        assert_eq!(width, REFERENCE_WIDTH);
        assert!(height > width);
    }

    #[test]
    fn test_video_plane_dimensions() {
        let plane = MediaPlane::video(VideoSource::detached(), 16.0, 9.0, 0.9);
        assert_eq!(plane.width, REFERENCE_WIDTH);
        assert!((plane.height - REFERENCE_WIDTH * 9.0 / 16.0).abs() < 1e-6);
        assert_eq!(plane.opacity, 0.9);
        assert!(plane.video_source().is_some());
    }

    #[test]
    fn test_vertices_span_plane() {
        let plane = MediaPlane::video(VideoSource::detached(), 4.0, 4.0, 1.0);
        let vertices = plane.vertices();
        let half = REFERENCE_WIDTH / 2.0;
        assert_eq!(vertices[0].position[0], -half);
        assert_eq!(vertices[2].position[0], half);
        // Top-left corner samples the top of the texture
        assert_eq!(vertices[3].uv, [0.0, 0.0]);
        assert_eq!(MediaPlane::INDICES.len(), 6);
    }

    #[test]
    fn test_detached_source_playback_state() {
        let mut source = VideoSource::detached();
        assert!(!source.is_playing());
        source.play();
        assert!(source.is_playing());
        source.pause();
        assert!(!source.is_playing());
        assert!(source.take_frame().is_none());
        assert!(source.size().is_none());
    }
}
