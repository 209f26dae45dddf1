//! GPU rendering: context, forward stage pass, glow composer, hot reload

pub mod composer;
pub mod context;
pub mod shader_watch;
pub mod stage_renderer;

pub use composer::{default_passes, Composer, PassKind, DEPTH_FORMAT};
pub use context::RenderContext;
pub use shader_watch::ShaderWatcher;
pub use stage_renderer::StageRenderer;
