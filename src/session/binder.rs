//! Target binding
//!
//! Turns an experience's target entries into stage content: one hidden
//! anchor group per entry, populated with the configured video plane, image
//! plane and model. Found/lost dispatch toggles visibility, playback and
//! glow; pose events move the anchor while configured media positions ease
//! in with the per-frame smoothing factor.

use glam::Vec3;

use crate::config::{Experience, ExperienceConfig, GlowPrecedence, MediaProperties, TargetEntry};
use crate::stage::model::load_model;
use crate::stage::transform::ResolvedTransform;
use crate::stage::{
    ImageSource, MediaPlane, MixerRegistry, NodeId, NodeKind, SmoothedPosition, Stage, VideoSource,
};
use crate::tracking::{Pose, TargetId, TrackingSource};
use crate::video::VideoPlayer;

/// Stage nodes bound to one tracked target
pub struct AnchorBinding {
    /// Marker index this anchor follows
    pub target_index: u32,
    /// Anchor group; hidden until the target is first found
    pub group: NodeId,
    pub video_plane: Option<NodeId>,
    pub image_plane: Option<NodeId>,
    pub model_root: Option<NodeId>,
    /// Glow applied on found, already resolved under the precedence rule
    pub found_glow: Option<f32>,
    /// Nodes easing toward their configured positions
    pub smoothed: Vec<(NodeId, SmoothedPosition)>,
    pub found: bool,
}

/// Result of binding an experience's targets
pub struct BindOutcome {
    pub bindings: Vec<AnchorBinding>,
    pub mixers: MixerRegistry,
    /// Glow configured on a model transform, applied at bind time
    pub initial_glow: Option<f32>,
}

/// Build anchors for every target entry and register them with the tracker
///
/// Asset-load failures are logged and leave that media slot empty; the
/// anchor itself is still created.
pub fn bind_targets(
    stage: &mut Stage,
    tracker: &mut dyn TrackingSource,
    config: &ExperienceConfig,
    experience: &Experience,
) -> BindOutcome {
    let mut bindings = Vec::with_capacity(experience.targets.len());
    let mut mixers = MixerRegistry::new();
    let mut initial_glow = None;

    for entry in &experience.targets {
        tracker.register_target(TargetId(entry.target_index));
        let binding = bind_entry(stage, config, experience, entry, &mut mixers, &mut initial_glow);
        bindings.push(binding);
    }

    tracing::info!(
        targets = bindings.len(),
        mixers = mixers.len(),
        "Bound experience '{}'",
        experience.name
    );

    BindOutcome {
        bindings,
        mixers,
        initial_glow,
    }
}

fn bind_entry(
    stage: &mut Stage,
    config: &ExperienceConfig,
    experience: &Experience,
    entry: &TargetEntry,
    mixers: &mut MixerRegistry,
    initial_glow: &mut Option<f32>,
) -> AnchorBinding {
    let group = stage.add_group(None, format!("target {}", entry.target_index));
    stage.set_visible(group, false);

    let mut smoothed = Vec::new();

    let video_plane = entry.video.as_deref().and_then(|file| {
        let path = config.video_path(experience, file);
        match VideoPlayer::open(&path) {
            Ok(player) => {
                let (source_width, source_height) = entry
                    .video_properties
                    .as_ref()
                    .map(|p| (p.width, p.height))
                    .unwrap_or((player.width() as f32, player.height() as f32));
                let opacity = entry
                    .video_properties
                    .as_ref()
                    .map(|p| p.opacity)
                    .unwrap_or(1.0);

                let plane = MediaPlane::video(
                    VideoSource::new(player),
                    source_width,
                    source_height,
                    opacity,
                );
                let id = stage.add_node(Some(group), format!("{} video", file), NodeKind::Plane(plane));
                push_configured_position(&mut smoothed, id, entry.video_properties.as_ref());
                Some(id)
            }
            Err(e) => {
                tracing::warn!("Failed to open video {}: {}", path.display(), e);
                None
            }
        }
    });

    let image_plane = entry.image.as_deref().and_then(|file| {
        let path = config.image_path(experience, file);
        match image::open(&path) {
            Ok(loaded) => {
                let rgba = loaded.to_rgba8();
                let (source_width, source_height) = entry
                    .image_properties
                    .as_ref()
                    .map(|p| (p.width, p.height))
                    .unwrap_or((rgba.width() as f32, rgba.height() as f32));
                let opacity = entry
                    .image_properties
                    .as_ref()
                    .map(|p| p.opacity)
                    .unwrap_or(1.0);

                let plane = MediaPlane::image(
                    ImageSource::new(rgba),
                    source_width,
                    source_height,
                    opacity,
                );
                let id = stage.add_node(Some(group), format!("{} image", file), NodeKind::Plane(plane));
                push_configured_position(&mut smoothed, id, entry.image_properties.as_ref());
                Some(id)
            }
            Err(e) => {
                tracing::warn!("Failed to open image {}: {}", path.display(), e);
                None
            }
        }
    });

    let model_root = entry.glb_model.as_deref().and_then(|file| {
        let path = config.model_path(experience, file);
        match load_model(&path) {
            Ok(document) => {
                let root = stage.add_group(Some(group), format!("{} model", file));
                let attached = document.attach(stage, root);
                if let Some(mixer) = attached.mixer {
                    mixers.add(mixer);
                }

                if let Some(transform) = &entry.transform {
                    let resolved = ResolvedTransform::from_config(transform);
                    if let Some(node) = stage.node_mut(root) {
                        node.local.rotation = resolved.rotation;
                        node.local.scale = resolved.scale;
                    }
                    if let Some(opacity) = resolved.opacity {
                        stage.set_subtree_material_opacity(root, opacity);
                    }
                    if let Some(glow) = resolved.glow_intensity {
                        *initial_glow = Some(glow);
                    }

                    let mut smoother = SmoothedPosition::new(Vec3::ZERO);
                    smoother.set_target(resolved.position);
                    smoothed.push((root, smoother));
                }
                Some(root)
            }
            Err(e) => {
                tracing::warn!("Failed to load model {}: {}", path.display(), e);
                None
            }
        }
    });

    AnchorBinding {
        target_index: entry.target_index,
        group,
        video_plane,
        image_plane,
        model_root,
        found_glow: resolve_found_glow(
            entry.video_properties.as_ref(),
            entry.image_properties.as_ref(),
            config.glow_precedence,
        ),
        smoothed,
        found: false,
    }
}

fn push_configured_position(
    smoothed: &mut Vec<(NodeId, SmoothedPosition)>,
    id: NodeId,
    properties: Option<&MediaProperties>,
) {
    if let Some(position) = properties.and_then(|p| p.position) {
        let mut smoother = SmoothedPosition::new(Vec3::ZERO);
        smoother.set_target(position.to_vec3());
        smoothed.push((id, smoother));
    }
}

/// Glow applied when a target is found
///
/// With both media carrying an intensity the precedence rule picks the
/// winner; one alone wins outright; none leaves the uniform untouched.
pub fn resolve_found_glow(
    video: Option<&MediaProperties>,
    image: Option<&MediaProperties>,
    precedence: GlowPrecedence,
) -> Option<f32> {
    let video_glow = video.and_then(|p| p.glow_intensity);
    let image_glow = image.and_then(|p| p.glow_intensity);

    match (video_glow, image_glow) {
        (Some(v), Some(i)) => Some(match precedence {
            GlowPrecedence::Image => i,
            GlowPrecedence::Video => v,
        }),
        (Some(v), None) => Some(v),
        (None, Some(i)) => Some(i),
        (None, None) => None,
    }
}

impl AnchorBinding {
    /// The target entered view: show the anchor, start playback, set glow
    pub fn apply_found(&mut self, stage: &mut Stage, glow: &mut f32) {
        self.found = true;
        stage.set_visible(self.group, true);

        if let Some(id) = self.video_plane {
            if let Some(source) = plane_video_mut(stage, id) {
                source.play();
            }
        }
        if let Some(value) = self.found_glow {
            *glow = value;
        }

        tracing::info!("Target {} found", self.target_index);
    }

    /// The target left view: hide the anchor, pause playback, kill glow
    pub fn apply_lost(&mut self, stage: &mut Stage, glow: &mut f32) {
        self.found = false;
        stage.set_visible(self.group, false);

        if let Some(id) = self.video_plane {
            if let Some(source) = plane_video_mut(stage, id) {
                source.pause();
            }
        }
        *glow = 0.0;

        tracing::info!("Target {} lost", self.target_index);
    }

    /// Move the anchor to the tracked pose
    pub fn apply_pose(&mut self, stage: &mut Stage, pose: &Pose) {
        stage.set_pose(self.group, pose.position, pose.rotation);
    }

    /// Ease configured media positions one smoothing step
    pub fn advance_smoothing(&mut self, stage: &mut Stage) {
        for (id, smoother) in &mut self.smoothed {
            stage.set_position(*id, smoother.advance());
        }
    }
}

fn plane_video_mut(stage: &mut Stage, id: NodeId) -> Option<&mut VideoSource> {
    match &mut stage.node_mut(id)?.kind {
        NodeKind::Plane(plane) => plane.video_source_mut(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Vec3Config;
    use crate::stage::SMOOTHING;
    use crate::tracking::{TrackingError, TrackingEvent};
    use glam::Quat;

    struct RecordingSource {
        registered: Vec<TargetId>,
    }

    impl TrackingSource for RecordingSource {
        fn start(&mut self) -> Result<(), TrackingError> {
            Ok(())
        }
        fn stop(&mut self) {}
        fn register_target(&mut self, id: TargetId) {
            self.registered.push(id);
        }
        fn poll_events(&mut self) -> Vec<TrackingEvent> {
            Vec::new()
        }
    }

    fn test_config() -> ExperienceConfig {
        serde_json::from_str(
            r#"{
                "basePath": "/nonexistent",
                "thumbsFile": "thumb.png",
                "targetsFile": "targets.mind",
                "videoFolder": "videos",
                "imageFolder": "images",
                "glbFolder": "models",
                "experiences": [
                    {
                        "name": "Test",
                        "folder": "test",
                        "targets": [
                            { "targetIndex": 0, "image": "missing.png" },
                            { "targetIndex": 3, "image": "also-missing.png" }
                        ]
                    }
                ]
            }"#,
        )
        .unwrap()
    }

    fn props(glow: Option<f32>) -> MediaProperties {
        MediaProperties {
            width: 16.0,
            height: 9.0,
            opacity: 1.0,
            position: None,
            glow_intensity: glow,
        }
    }

    /// Binding with a detached video plane, no tracker or media files needed
    fn video_binding(stage: &mut Stage, found_glow: Option<f32>) -> AnchorBinding {
        let group = stage.add_group(None, "target 0");
        stage.set_visible(group, false);
        let plane = MediaPlane::video(VideoSource::detached(), 16.0, 9.0, 1.0);
        let plane_id = stage.add_node(Some(group), "video", NodeKind::Plane(plane));

        AnchorBinding {
            target_index: 0,
            group,
            video_plane: Some(plane_id),
            image_plane: None,
            model_root: None,
            found_glow,
            smoothed: Vec::new(),
            found: false,
        }
    }

    #[test]
    fn test_bind_creates_hidden_anchors_and_registers_targets() {
        let config = test_config();
        let experience = &config.experiences[0];
        let mut stage = Stage::new();
        let mut tracker = RecordingSource {
            registered: Vec::new(),
        };

        let outcome = bind_targets(&mut stage, &mut tracker, &config, experience);

        assert_eq!(outcome.bindings.len(), 2);
        assert_eq!(tracker.registered, vec![TargetId(0), TargetId(3)]);
        for binding in &outcome.bindings {
            assert!(!stage.is_visible(binding.group));
            // Missing image files leave the slot empty
            assert!(binding.image_plane.is_none());
        }
        assert!(outcome.mixers.is_empty());
        assert!(outcome.initial_glow.is_none());
    }

    #[test]
    fn test_found_plays_video_and_sets_glow() {
        let mut stage = Stage::new();
        let mut binding = video_binding(&mut stage, Some(0.8));
        let mut glow = 0.0;

        binding.apply_found(&mut stage, &mut glow);

        assert!(binding.found);
        assert!(stage.is_visible(binding.group));
        assert_eq!(glow, 0.8);
        let playing = plane_video_mut(&mut stage, binding.video_plane.unwrap())
            .unwrap()
            .is_playing();
        assert!(playing);
    }

    #[test]
    fn test_lost_pauses_video_and_zeros_glow() {
        let mut stage = Stage::new();
        let mut binding = video_binding(&mut stage, Some(0.8));
        let mut glow = 0.0;

        binding.apply_found(&mut stage, &mut glow);
        binding.apply_lost(&mut stage, &mut glow);

        assert!(!binding.found);
        assert!(!stage.is_visible(binding.group));
        assert_eq!(glow, 0.0);
        let playing = plane_video_mut(&mut stage, binding.video_plane.unwrap())
            .unwrap()
            .is_playing();
        assert!(!playing);
    }

    #[test]
    fn test_found_without_configured_glow_leaves_uniform() {
        let mut stage = Stage::new();
        let mut binding = video_binding(&mut stage, None);
        let mut glow = 0.3;

        binding.apply_found(&mut stage, &mut glow);
        assert_eq!(glow, 0.3);
    }

    #[test]
    fn test_resolve_found_glow_precedence() {
        let video = props(Some(0.5));
        let image = props(Some(0.9));

        assert_eq!(
            resolve_found_glow(Some(&video), Some(&image), GlowPrecedence::Image),
            Some(0.9)
        );
        assert_eq!(
            resolve_found_glow(Some(&video), Some(&image), GlowPrecedence::Video),
            Some(0.5)
        );
        assert_eq!(
            resolve_found_glow(Some(&video), None, GlowPrecedence::Image),
            Some(0.5)
        );
        assert_eq!(
            resolve_found_glow(None, Some(&image), GlowPrecedence::Video),
            Some(0.9)
        );
        assert_eq!(
            resolve_found_glow(Some(&props(None)), None, GlowPrecedence::Image),
            None
        );
        assert_eq!(resolve_found_glow(None, None, GlowPrecedence::Image), None);
    }

    #[test]
    fn test_pose_moves_anchor_group() {
        let mut stage = Stage::new();
        let mut binding = video_binding(&mut stage, None);

        let pose = Pose {
            position: Vec3::new(0.5, 1.0, -2.0),
            rotation: Quat::from_rotation_y(1.0),
        };
        binding.apply_pose(&mut stage, &pose);

        let local = stage.node(binding.group).unwrap().local;
        assert_eq!(local.position, pose.position);
        assert_eq!(local.rotation, pose.rotation);
    }

    #[test]
    fn test_smoothing_eases_toward_configured_position() {
        let mut stage = Stage::new();
        let mut binding = video_binding(&mut stage, None);
        let plane_id = binding.video_plane.unwrap();

        let mut smoother = SmoothedPosition::new(Vec3::ZERO);
        smoother.set_target(Vec3::new(1.0, 0.0, 0.0));
        binding.smoothed.push((plane_id, smoother));

        binding.advance_smoothing(&mut stage);
        let after_one = stage.node(plane_id).unwrap().local.position;
        assert!((after_one.x - SMOOTHING).abs() < 1e-6);

        for _ in 0..80 {
            binding.advance_smoothing(&mut stage);
        }
        let settled = stage.node(plane_id).unwrap().local.position;
        assert!((settled.x - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_configured_position_creates_smoother() {
        let mut smoothed = Vec::new();
        let mut stage = Stage::new();
        let id = stage.add_group(None, "plane");

        let mut properties = props(None);
        properties.position = Some(Vec3Config {
            x: 0.0,
            y: 0.5,
            z: 0.0,
        });
        push_configured_position(&mut smoothed, id, Some(&properties));
        assert_eq!(smoothed.len(), 1);

        push_configured_position(&mut smoothed, id, None);
        assert_eq!(smoothed.len(), 1);
    }
}
