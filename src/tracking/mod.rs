//! Marker tracking boundary
//!
//! The tracker itself stays behind the `TrackingSource` trait: the session
//! manager starts and stops it, the target binder registers targets, and the
//! frame loop drains found/lost/pose events from it. The crate ships one
//! implementation, a deterministic scripted source for demos and tests.

use std::path::PathBuf;

mod scripted;

pub use scripted::ScriptedSource;

/// Identifier of a marker inside an experience's target file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(pub u32);

impl std::fmt::Display for TargetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "target {}", self.0)
    }
}

/// Pose of a found target relative to the camera
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: glam::Vec3,
    pub rotation: glam::Quat,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            position: glam::Vec3::ZERO,
            rotation: glam::Quat::IDENTITY,
        }
    }
}

/// Events drained once per frame from a tracking source
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackingEvent {
    /// Target entered view
    Found(TargetId),
    /// Target left view
    Lost(TargetId),
    /// Updated pose for a found target
    Pose(TargetId, Pose),
}

/// Boundary for marker tracking backends
///
/// `start()` is slow (device acquisition, target file load) and is run off
/// the main thread by the session manager. `stop()` must be idempotent.
/// Only registered targets produce events.
pub trait TrackingSource: Send {
    /// Acquire the device and load the target file
    fn start(&mut self) -> Result<(), TrackingError>;

    /// Release the device; safe to call repeatedly
    fn stop(&mut self);

    /// Enable event delivery for the given target
    fn register_target(&mut self, id: TargetId);

    /// Drain pending events; called once per frame
    fn poll_events(&mut self) -> Vec<TrackingEvent>;
}

/// Tracking-related errors
#[derive(Debug)]
pub enum TrackingError {
    /// The marker-target file does not exist
    TargetFileMissing(PathBuf),
    /// Backend-specific failure
    Device(String),
}

impl std::fmt::Display for TrackingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackingError::TargetFileMissing(path) => {
                write!(f, "target file not found: {}", path.display())
            }
            TrackingError::Device(msg) => write!(f, "tracking device error: {}", msg),
        }
    }
}

impl std::error::Error for TrackingError {}
