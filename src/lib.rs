//! AR Stage Library
//!
//! A desktop AR player: tracks image targets, anchors per-target media
//! (video, image, glTF model) to them, and composites the scene through a
//! glow pass with an egui experience menu on top.

pub mod app;
pub mod config;
pub mod preferences;
pub mod render;
pub mod session;
pub mod stage;
pub mod telemetry;
pub mod tracking;
pub mod ui;
pub mod video;

pub use app::App;
pub use config::{Experience, ExperienceConfig, GlowPrecedence, MediaProperties, TargetEntry};
pub use preferences::AppPreferences;
pub use session::{ArSession, SessionManager, SessionState, TrackerFactory};
pub use stage::{MediaPlane, NodeId, Stage};
pub use tracking::{Pose, TargetId, TrackingEvent, TrackingSource};
pub use video::{VideoError, VideoPlayer, VideoTexture};
