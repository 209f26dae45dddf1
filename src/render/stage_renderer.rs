//! Forward renderer for the stage graph
//!
//! Walks the stage each frame, keeps a small GPU cache per drawable node
//! (vertex/index buffers, draw uniform, optional texture) and renders
//! planes unlit and meshes with ambient plus one point light. Video planes
//! pull decoded frames onto their texture as they arrive.

use std::collections::HashMap;

use bytemuck::Zeroable;
use glam::{Mat4, Vec3};
use wgpu::util::DeviceExt;

use crate::render::composer::DEPTH_FORMAT;
use crate::stage::{Light, MediaPlane, MeshInstance, NodeId, NodeKind, PlaneSource, Stage, StageVertex};
use crate::video::VideoTexture;

/// The embedded stage shader
pub const STAGE_SHADER: &str = include_str!("shaders/stage.wgsl");

const CAMERA_EYE: Vec3 = Vec3::new(0.0, 0.0, 3.0);

/// Per-frame globals, matching `Globals` in stage.wgsl
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct Globals {
    view_proj: [[f32; 4]; 4],
    camera_position: [f32; 3],
    /// Padding for 16-byte alignment
    _padding: f32,
}

/// Scene lighting, matching `Lights` in stage.wgsl
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct LightsUniform {
    ambient_color: [f32; 3],
    ambient_intensity: f32,
    point_color: [f32; 3],
    point_intensity: f32,
    point_position: [f32; 3],
    point_range: f32,
}

/// Per-draw data, matching `DrawParams` in stage.wgsl
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct DrawUniform {
    model: [[f32; 4]; 4],
    base_color: [f32; 4],
    opacity: f32,
    use_texture: f32,
    unlit: f32,
    /// Padding for 16-byte alignment
    _padding: f32,
}

/// GPU-side state for one drawable stage node
struct NodeGpu {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    texture: Option<VideoTexture>,
}

pub struct StageRenderer {
    pipeline: wgpu::RenderPipeline,
    globals_buffer: wgpu::Buffer,
    lights_buffer: wgpu::Buffer,
    globals_bind_group: wgpu::BindGroup,
    node_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    /// 1x1 white texture bound for untextured meshes
    white: VideoTexture,
    nodes: HashMap<NodeId, NodeGpu>,
}

impl StageRenderer {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, format: wgpu::TextureFormat) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Stage Shader"),
            source: wgpu::ShaderSource::Wgsl(STAGE_SHADER.into()),
        });

        let globals_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Stage Globals Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let node_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Stage Node Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Stage Pipeline Layout"),
            bind_group_layouts: &[&globals_layout, &node_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Stage Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[StageVertex::desc()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let globals_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Stage Globals Buffer"),
            size: std::mem::size_of::<Globals>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let lights_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Stage Lights Buffer"),
            size: std::mem::size_of::<LightsUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let globals_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Stage Globals Bind Group"),
            layout: &globals_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: globals_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: lights_buffer.as_entire_binding(),
                },
            ],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Stage Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let white = VideoTexture::new(device, 1, 1);
        white.upload_raw(queue, &[255, 255, 255, 255], 1, 1);

        Self {
            pipeline,
            globals_buffer,
            lights_buffer,
            globals_bind_group,
            node_layout,
            sampler,
            white,
            nodes: HashMap::new(),
        }
    }

    /// Render the stage into the given color and depth targets
    pub fn render(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        color_view: &wgpu::TextureView,
        depth_view: &wgpu::TextureView,
        stage: &Stage,
        viewport: (u32, u32),
    ) {
        // Drop GPU state for nodes that left the stage
        self.nodes.retain(|id, _| stage.node(*id).is_some());

        let globals = Globals {
            view_proj: view_projection(viewport.0, viewport.1).to_cols_array_2d(),
            camera_position: CAMERA_EYE.to_array(),
            _padding: 0.0,
        };
        queue.write_buffer(&self.globals_buffer, 0, bytemuck::bytes_of(&globals));

        let mut lights = LightsUniform::zeroed();
        let mut draws: Vec<(NodeId, Mat4, f32)> = Vec::new();
        stage.walk(|id, node, world, opacity| match &node.kind {
            NodeKind::Plane(_) | NodeKind::Mesh(_) => draws.push((id, world, opacity)),
            NodeKind::Light(light) => collect_light(&mut lights, light, &world),
            NodeKind::Group => {}
        });
        queue.write_buffer(&self.lights_buffer, 0, bytemuck::bytes_of(&lights));

        for &(id, world, opacity) in &draws {
            let Some(node) = stage.node(id) else { continue };
            match &node.kind {
                NodeKind::Plane(plane) => {
                    self.prepare_plane(device, queue, id, plane, world, opacity);
                }
                NodeKind::Mesh(instance) => {
                    self.prepare_mesh(device, queue, id, instance, world, opacity);
                }
                _ => {}
            }
        }

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Stage Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(0, &self.globals_bind_group, &[]);

        for (id, _, _) in &draws {
            let Some(gpu) = self.nodes.get(id) else { continue };
            render_pass.set_bind_group(1, &gpu.bind_group, &[]);
            render_pass.set_vertex_buffer(0, gpu.vertex_buffer.slice(..));
            render_pass.set_index_buffer(gpu.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            render_pass.draw_indexed(0..gpu.index_count, 0, 0..1);
        }
    }

    fn prepare_plane(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        id: NodeId,
        plane: &MediaPlane,
        world: Mat4,
        opacity: f32,
    ) {
        if !self.nodes.contains_key(&id) {
            let texture = match &plane.source {
                PlaneSource::Video(source) => {
                    let (width, height) = source.size().unwrap_or((1, 1));
                    VideoTexture::new(device, width, height)
                }
                PlaneSource::Image(image) => {
                    let texture = VideoTexture::new(device, image.width(), image.height());
                    texture.upload_raw(queue, image.data(), image.width(), image.height());
                    texture
                }
            };
            let gpu = create_node_gpu(
                device,
                &self.node_layout,
                &self.sampler,
                &plane.vertices(),
                &MediaPlane::INDICES,
                Some(texture),
                self.white.view(),
            );
            self.nodes.insert(id, gpu);
        }

        let Some(gpu) = self.nodes.get_mut(&id) else { return };

        if let PlaneSource::Video(source) = &plane.source {
            if let Some(frame) = source.take_frame() {
                if let Some(texture) = gpu.texture.as_mut() {
                    if texture.width() != frame.width || texture.height() != frame.height {
                        texture.resize(device, frame.width, frame.height);
                        gpu.bind_group = create_node_bind_group(
                            device,
                            &self.node_layout,
                            &gpu.uniform_buffer,
                            texture.view(),
                            &self.sampler,
                        );
                    }
                    texture.upload(queue, &frame);
                }
            }
        }

        let uniform = DrawUniform {
            model: world.to_cols_array_2d(),
            base_color: [1.0; 4],
            opacity: opacity * plane.opacity,
            use_texture: 1.0,
            unlit: 1.0,
            _padding: 0.0,
        };
        queue.write_buffer(&gpu.uniform_buffer, 0, bytemuck::bytes_of(&uniform));
    }

    fn prepare_mesh(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        id: NodeId,
        instance: &MeshInstance,
        world: Mat4,
        opacity: f32,
    ) {
        if !self.nodes.contains_key(&id) {
            let texture = instance.material.texture.as_ref().map(|image| {
                let texture = VideoTexture::new(device, image.width(), image.height());
                texture.upload_raw(queue, image.as_raw(), image.width(), image.height());
                texture
            });
            let gpu = create_node_gpu(
                device,
                &self.node_layout,
                &self.sampler,
                &instance.mesh.vertices,
                &instance.mesh.indices,
                texture,
                self.white.view(),
            );
            self.nodes.insert(id, gpu);
        }

        let Some(gpu) = self.nodes.get(&id) else { return };

        let material = &instance.material;
        let uniform = DrawUniform {
            model: world.to_cols_array_2d(),
            base_color: material.base_color,
            opacity: opacity * material.opacity,
            use_texture: if material.texture.is_some() { 1.0 } else { 0.0 },
            unlit: 0.0,
            _padding: 0.0,
        };
        queue.write_buffer(&gpu.uniform_buffer, 0, bytemuck::bytes_of(&uniform));
    }
}

fn view_projection(width: u32, height: u32) -> Mat4 {
    let aspect = width.max(1) as f32 / height.max(1) as f32;
    let projection = Mat4::perspective_rh(45f32.to_radians(), aspect, 0.01, 100.0);
    let view = Mat4::look_at_rh(CAMERA_EYE, Vec3::ZERO, Vec3::Y);
    projection * view
}

fn collect_light(lights: &mut LightsUniform, light: &Light, world: &Mat4) {
    match light {
        Light::Ambient { color, intensity } => {
            lights.ambient_color = *color;
            lights.ambient_intensity = *intensity;
        }
        Light::Point {
            color,
            intensity,
            range,
        } => {
            lights.point_color = *color;
            lights.point_intensity = *intensity;
            lights.point_position = world.transform_point3(Vec3::ZERO).to_array();
            lights.point_range = *range;
        }
    }
}

fn create_node_gpu(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
    vertices: &[StageVertex],
    indices: &[u32],
    texture: Option<VideoTexture>,
    white_view: &wgpu::TextureView,
) -> NodeGpu {
    let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("Stage Vertex Buffer"),
        contents: bytemuck::cast_slice(vertices),
        usage: wgpu::BufferUsages::VERTEX,
    });
    let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("Stage Index Buffer"),
        contents: bytemuck::cast_slice(indices),
        usage: wgpu::BufferUsages::INDEX,
    });
    let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Stage Draw Buffer"),
        size: std::mem::size_of::<DrawUniform>() as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let view = texture.as_ref().map(|t| t.view()).unwrap_or(white_view);
    let bind_group = create_node_bind_group(device, layout, &uniform_buffer, view, sampler);

    NodeGpu {
        vertex_buffer,
        index_buffer,
        index_count: indices.len() as u32,
        uniform_buffer,
        bind_group,
        texture,
    }
}

fn create_node_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    uniform_buffer: &wgpu::Buffer,
    texture_view: &wgpu::TextureView,
    sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Stage Node Bind Group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(texture_view),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_layouts() {
        // Must match the struct sizes naga derives from stage.wgsl
        assert_eq!(std::mem::size_of::<Globals>(), 80);
        assert_eq!(std::mem::size_of::<LightsUniform>(), 48);
        assert_eq!(std::mem::size_of::<DrawUniform>(), 96);
    }

    #[test]
    fn test_embedded_stage_shader() {
        assert!(STAGE_SHADER.contains("fn vs_main"));
        assert!(STAGE_SHADER.contains("fn fs_main"));
    }

    #[test]
    fn test_view_projection_is_finite() {
        let matrix = view_projection(1280, 720);
        assert!(matrix.to_cols_array().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_point_light_position_taken_from_world_matrix() {
        let mut lights = LightsUniform::zeroed();
        let world = Mat4::from_translation(Vec3::new(5.0, 5.0, 5.0));
        let light = Light::Point {
            color: [1.0, 1.0, 1.0],
            intensity: 1.0,
            range: 100.0,
        };
        collect_light(&mut lights, &light, &world);
        assert_eq!(lights.point_position, [5.0, 5.0, 5.0]);
    }
}
