//! Active session state
//!
//! Owns everything one running experience needs: the started tracking
//! source, the stage, the anchor bindings, and the session-scoped mixer and
//! pass registries. Registries are created fresh here and die with the
//! session, so nothing leaks across experience switches.

use glam::Vec3;

use crate::config::{Experience, ExperienceConfig};
use crate::render::{default_passes, PassKind};
use crate::session::binder::{bind_targets, AnchorBinding};
use crate::stage::{Light, MixerRegistry, NodeKind, Stage};
use crate::tracking::{TrackingEvent, TrackingSource};

/// A started experience: tracker, stage content and per-session registries
pub struct ArSession {
    experience_index: usize,
    tracker: Box<dyn TrackingSource>,
    stage: Stage,
    bindings: Vec<AnchorBinding>,
    mixers: MixerRegistry,
    passes: Vec<PassKind>,
    glow_intensity: f32,
}

impl ArSession {
    /// Build the scene for an already-started tracker
    ///
    /// Adds the session lighting rig, a fresh pass list, and one anchor per
    /// target entry via the binder.
    pub fn create(
        experience_index: usize,
        experience: &Experience,
        config: &ExperienceConfig,
        mut tracker: Box<dyn TrackingSource>,
    ) -> Self {
        let mut stage = Stage::new();

        let lights = stage.add_group(None, "lights");
        stage.add_node(
            Some(lights),
            "ambient",
            NodeKind::Light(Light::Ambient {
                color: [1.0, 1.0, 1.0],
                intensity: 2.0,
            }),
        );
        let point = stage.add_node(
            Some(lights),
            "point",
            NodeKind::Light(Light::Point {
                color: [1.0, 1.0, 1.0],
                intensity: 1.0,
                range: 100.0,
            }),
        );
        stage.set_position(point, Vec3::new(5.0, 5.0, 5.0));

        let outcome = bind_targets(&mut stage, tracker.as_mut(), config, experience);

        Self {
            experience_index,
            tracker,
            stage,
            bindings: outcome.bindings,
            mixers: outcome.mixers,
            passes: default_passes(),
            glow_intensity: outcome.initial_glow.unwrap_or(0.0),
        }
    }

    /// Per-frame step: drain tracking events, then advance animation and
    /// position smoothing
    pub fn update(&mut self, dt: f32) {
        let events = self.tracker.poll_events();
        self.dispatch(events);
        self.advance(dt);
    }

    /// Route tracking events to their anchor bindings
    pub fn dispatch(&mut self, events: Vec<TrackingEvent>) {
        for event in events {
            match event {
                TrackingEvent::Found(id) => {
                    if let Some(binding) =
                        self.bindings.iter_mut().find(|b| b.target_index == id.0)
                    {
                        binding.apply_found(&mut self.stage, &mut self.glow_intensity);
                    }
                }
                TrackingEvent::Lost(id) => {
                    if let Some(binding) =
                        self.bindings.iter_mut().find(|b| b.target_index == id.0)
                    {
                        binding.apply_lost(&mut self.stage, &mut self.glow_intensity);
                    }
                }
                TrackingEvent::Pose(id, pose) => {
                    if let Some(binding) =
                        self.bindings.iter_mut().find(|b| b.target_index == id.0)
                    {
                        binding.apply_pose(&mut self.stage, &pose);
                    }
                }
            }
        }
    }

    /// Advance mixers and media-position smoothing
    pub fn advance(&mut self, dt: f32) {
        self.mixers.advance_all(dt, &mut self.stage);
        for binding in &mut self.bindings {
            binding.advance_smoothing(&mut self.stage);
        }
    }

    /// Tear the session down in place: stop the tracker, clear the stage
    /// (dropping video planes joins their decode threads), drop registries
    pub fn dispose(&mut self) {
        tracing::info!("Disposing session for experience {}", self.experience_index);
        self.tracker.stop();
        self.stage.clear();
        self.bindings.clear();
        self.mixers.clear();
        self.passes.clear();
        self.glow_intensity = 0.0;
    }

    pub fn experience_index(&self) -> usize {
        self.experience_index
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    pub fn bindings(&self) -> &[AnchorBinding] {
        &self.bindings
    }

    /// True while no target is in view (the scanning overlay state)
    pub fn is_scanning(&self) -> bool {
        !self.bindings.iter().any(|b| b.found)
    }

    pub fn glow_intensity(&self) -> f32 {
        self.glow_intensity
    }

    pub fn set_glow(&mut self, intensity: f32) {
        self.glow_intensity = intensity;
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    pub fn passes(&self) -> &[PassKind] {
        &self.passes
    }

    pub fn mixer_count(&self) -> usize {
        self.mixers.len()
    }
}

impl Drop for ArSession {
    fn drop(&mut self) {
        // stop() is idempotent; dispose() may already have run
        self.tracker.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::{Pose, ScriptedSource, TargetId, TrackingError};
    use std::time::Duration;

    struct NullSource;

    impl TrackingSource for NullSource {
        fn start(&mut self) -> Result<(), TrackingError> {
            Ok(())
        }
        fn stop(&mut self) {}
        fn register_target(&mut self, _: TargetId) {}
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
                        "targets": [{ "targetIndex": 0, "image": "missing.png" }]
                    }
                ]
            }"#,
        )
        .unwrap()
    }

    fn make_session(tracker: Box<dyn TrackingSource>) -> ArSession {
        let config = test_config();
        let experience = config.experiences[0].clone();
        ArSession::create(0, &experience, &config, tracker)
    }

    #[test]
    fn test_create_builds_lights_passes_and_anchors() {
        let session = make_session(Box::new(NullSource));

        assert_eq!(session.pass_count(), 2);
        assert_eq!(session.bindings().len(), 1);
        assert_eq!(session.glow_intensity(), 0.0);
        assert!(session.is_scanning());

        let mut ambient = 0;
        let mut point_position = Vec3::ZERO;
        session.stage().walk(|_, node, world, _| match node.kind {
            NodeKind::Light(Light::Ambient { intensity, .. }) => {
                assert_eq!(intensity, 2.0);
                ambient += 1;
            }
            NodeKind::Light(Light::Point { range, .. }) => {
                assert_eq!(range, 100.0);
                point_position = world.transform_point3(Vec3::ZERO);
            }
            _ => {}
        });
        assert_eq!(ambient, 1);
        assert!(point_position.distance(Vec3::new(5.0, 5.0, 5.0)) < 1e-6);
    }

    #[test]
    fn test_dispatch_routes_found_and_lost() {
        let mut session = make_session(Box::new(NullSource));
        let group = session.bindings()[0].group;

        session.dispatch(vec![TrackingEvent::Found(TargetId(0))]);
        assert!(!session.is_scanning());
        assert!(session.stage().is_visible(group));

        session.dispatch(vec![TrackingEvent::Lost(TargetId(0))]);
        assert!(session.is_scanning());
        assert!(!session.stage().is_visible(group));
    }

    #[test]
    fn test_dispatch_ignores_unbound_targets() {
        let mut session = make_session(Box::new(NullSource));
        session.dispatch(vec![TrackingEvent::Found(TargetId(42))]);
        assert!(session.is_scanning());
    }

    #[test]
    fn test_dispatch_applies_pose() {
        let mut session = make_session(Box::new(NullSource));
        let group = session.bindings()[0].group;

        let pose = Pose {
            position: Vec3::new(1.0, 2.0, 3.0),
            ..Pose::default()
        };
        session.dispatch(vec![TrackingEvent::Pose(TargetId(0), pose)]);
        assert_eq!(
            session.stage().node(group).unwrap().local.position,
            Vec3::new(1.0, 2.0, 3.0)
        );
    }

    #[test]
    fn test_update_drains_scripted_events() {
        let target_file = std::env::temp_dir().join("ar-stage-session-test.mind");
        std::fs::write(&target_file, b"targets").unwrap();

        let mut source = ScriptedSource::new(&target_file);
        source.push_event(Duration::ZERO, TrackingEvent::Found(TargetId(0)));
        source.start().unwrap();

        let mut session = make_session(Box::new(source));
        session.update(0.016);
        assert!(!session.is_scanning());
    }

    #[test]
    fn test_dispose_clears_everything() {
        let mut session = make_session(Box::new(NullSource));
        session.set_glow(1.5);
        session.dispose();

        assert_eq!(session.stage().node_count(), 0);
        assert_eq!(session.pass_count(), 0);
        assert_eq!(session.mixer_count(), 0);
        assert_eq!(session.bindings().len(), 0);
        assert_eq!(session.glow_intensity(), 0.0);
    }
}
