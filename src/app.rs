//! Application state holding the GPU context and renderers
//!
//! Owns the render context, the composer, the stage renderer and the egui
//! integration. Frame pacing is driven by the winit event loop (see
//! `main.rs`); each redraw polls the session manager, advances the active
//! session, renders the stage into the offscreen target and composites it
//! through the glow pass with the menu on top.

use std::sync::Arc;
use std::time::Instant;

use winit::dpi::PhysicalSize;
use winit::window::Window;

use crate::config::ExperienceConfig;
use crate::render::{Composer, RenderContext, ShaderWatcher, StageRenderer};
use crate::session::{SessionManager, TrackerFactory};
use crate::ui::{ExperienceMenu, MenuAction};

/// Helper function to render egui pass
fn render_egui_pass(
    renderer: &egui_wgpu::Renderer,
    encoder: &mut wgpu::CommandEncoder,
    view: &wgpu::TextureView,
    paint_jobs: &[egui::ClippedPrimitive],
    screen_descriptor: &egui_wgpu::ScreenDescriptor,
) {
    let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("egui Pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Load,
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    });

    // SAFETY: The render_pass is used only within this function and dropped
    // before the encoder is finished.
    let render_pass_static: &mut wgpu::RenderPass<'static> =
        unsafe { std::mem::transmute(&mut render_pass) };

    renderer.render(render_pass_static, paint_jobs, screen_descriptor);
}

/// Main application state holding all GPU resources
pub struct App {
    /// Reference to the window
    window: Arc<Window>,
    context: RenderContext,
    composer: Composer,
    stage_renderer: StageRenderer,
    /// None when the shaders directory cannot be watched
    shader_watcher: Option<ShaderWatcher>,

    // egui integration
    egui_ctx: egui::Context,
    egui_state: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,

    // UI state
    pub menu: ExperienceMenu,

    /// Session lifecycle and the active session
    pub manager: SessionManager,

    /// Timestamp of the previous update, for frame deltas
    last_update: Instant,
}

impl App {
    /// Create a new App instance with initialized wgpu context
    pub async fn new(window: Arc<Window>, manager: SessionManager) -> Self {
        let context = RenderContext::new(window.clone()).await;
        let (width, height) = context.size();

        let composer = Composer::new(&context.device, context.surface_format, width, height);
        let stage_renderer =
            StageRenderer::new(&context.device, &context.queue, context.surface_format);

        let shader_watcher = match ShaderWatcher::new() {
            Ok(watcher) => Some(watcher),
            Err(error) => {
                tracing::warn!("Shader hot-reload unavailable: {}", error);
                None
            }
        };

        // Initialize egui
        let egui_ctx = egui::Context::default();
        let mut style = (*egui_ctx.style()).clone();
        style.visuals.window_shadow = egui::epaint::Shadow::NONE;
        egui_ctx.set_style(style);

        let egui_state = egui_winit::State::new(
            egui_ctx.clone(),
            egui::ViewportId::ROOT,
            &window,
            Some(window.scale_factor() as f32),
            None,
            None,
        );

        let egui_renderer =
            egui_wgpu::Renderer::new(&context.device, context.surface_format, None, 1, false);

        Self {
            window,
            context,
            composer,
            stage_renderer,
            shader_watcher,
            egui_ctx,
            egui_state,
            egui_renderer,
            menu: ExperienceMenu::new(),
            manager,
            last_update: Instant::now(),
        }
    }

    /// Handle window resize events
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.context.resize(new_size);
            self.composer
                .resize(&self.context.device, new_size.width, new_size.height);
            tracing::debug!("Resized to {}x{}", new_size.width, new_size.height);
        }
    }

    /// Handle winit window events for egui
    pub fn handle_window_event(&mut self, event: &winit::event::WindowEvent) -> bool {
        let response = self.egui_state.on_window_event(&self.window, event);
        response.consumed
    }

    /// Swap in a new experience config, dropping the active session
    pub fn replace_config(&mut self, config: ExperienceConfig, factory: TrackerFactory) {
        self.manager.dispose_active();
        self.manager = SessionManager::new(config, factory);
        self.menu.reset();
    }

    /// Advance the session lifecycle and the active session
    pub fn update(&mut self) {
        let now = Instant::now();
        let dt = now.duration_since(self.last_update).as_secs_f32();
        self.last_update = now;

        self.manager.poll();
        if let Some(session) = self.manager.session_mut() {
            session.update(dt);
        }

        self.poll_shader_reload();
    }

    fn poll_shader_reload(&mut self) {
        let Some(watcher) = &mut self.shader_watcher else {
            return;
        };
        let Some(path) = watcher.poll() else {
            return;
        };

        if !path.file_name().is_some_and(|name| name == "glow.wgsl") {
            tracing::debug!("Ignoring change to {}", path.display());
            return;
        }

        match std::fs::read_to_string(&path) {
            Ok(source) => {
                // A rejected shader keeps the current pipeline
                if let Err(error) = self.composer.reload_glow(&self.context.device, &source) {
                    tracing::warn!("Glow shader rejected: {}", error);
                }
            }
            Err(error) => {
                tracing::warn!("Failed to read {}: {}", path.display(), error);
            }
        }
    }

    /// Render a frame, returning any menu actions for the caller to apply
    pub fn render(&mut self) -> Result<Vec<MenuAction>, wgpu::SurfaceError> {
        // Begin egui frame
        let raw_input = self.egui_state.take_egui_input(&self.window);
        self.egui_ctx.begin_pass(raw_input);

        let actions = self.menu.render(&self.egui_ctx, &self.manager);

        let full_output = self.egui_ctx.end_pass();
        self.egui_state
            .handle_platform_output(&self.window, full_output.platform_output);
        let paint_jobs = self
            .egui_ctx
            .tessellate(full_output.shapes, full_output.pixels_per_point);

        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        // Scene pass into the offscreen target
        let viewport = self.context.size();
        match self.manager.session() {
            Some(session) => {
                self.stage_renderer.render(
                    &self.context.device,
                    &self.context.queue,
                    &mut encoder,
                    self.composer.scene_view(),
                    self.composer.depth_view(),
                    session.stage(),
                    viewport,
                );
            }
            None => clear_scene(&mut encoder, self.composer.scene_view()),
        }

        // Update egui textures
        for (id, image_delta) in &full_output.textures_delta.set {
            self.egui_renderer
                .update_texture(&self.context.device, &self.context.queue, *id, image_delta);
        }

        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [viewport.0, viewport.1],
            pixels_per_point: self.window.scale_factor() as f32,
        };

        self.egui_renderer.update_buffers(
            &self.context.device,
            &self.context.queue,
            &mut encoder,
            &paint_jobs,
            &screen_descriptor,
        );

        let output = self.context.surface.get_current_texture()?;
        let surface_view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        // Composite the scene onto the surface with the glow applied
        let intensity = self
            .manager
            .session()
            .map(|session| session.glow_intensity())
            .unwrap_or(0.0);
        self.composer
            .render_glow(&self.context.queue, &mut encoder, &surface_view, intensity);

        // Menu on top
        render_egui_pass(
            &self.egui_renderer,
            &mut encoder,
            &surface_view,
            &paint_jobs,
            &screen_descriptor,
        );

        // Free egui textures
        for id in &full_output.textures_delta.free {
            self.egui_renderer.free_texture(id);
        }

        self.context.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        Ok(actions)
    }

    // Getters
    pub fn size(&self) -> PhysicalSize<u32> {
        let (width, height) = self.context.size();
        PhysicalSize::new(width, height)
    }

    pub fn egui_wants_keyboard(&self) -> bool {
        self.egui_ctx.wants_keyboard_input()
    }
}

/// Clear the offscreen target when no session is active
fn clear_scene(encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView) {
    let _render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("Clear Pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    });
}
