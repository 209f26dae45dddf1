//! Animation clip sampling and per-model mixers
//!
//! Clips carry keyframed translation/rotation/scale channels. A mixer owns
//! every clip of one model and advances them all in lockstep, looping; no
//! blending, no exclusivity. Mixers live in the session's registry and are
//! dropped wholesale on disposal.

use glam::{Quat, Vec3};

use super::{NodeId, Stage};

/// Keyframe interpolation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Linear,
    Step,
}

/// Keyframe values for one animated property
#[derive(Debug, Clone)]
pub enum ChannelTrack {
    Translation(Vec<Vec3>),
    Rotation(Vec<Quat>),
    Scale(Vec<Vec3>),
}

impl ChannelTrack {
    pub fn len(&self) -> usize {
        match self {
            ChannelTrack::Translation(values) => values.len(),
            ChannelTrack::Rotation(values) => values.len(),
            ChannelTrack::Scale(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One animated property of one stage node
#[derive(Debug, Clone)]
pub struct Channel {
    /// Stage node driven by this channel
    pub node: NodeId,
    /// Keyframe times in seconds, ascending
    pub times: Vec<f32>,
    /// Keyframe values, one per time
    pub track: ChannelTrack,
    pub interpolation: Interpolation,
}

impl Channel {
    /// Surrounding keyframe pair and blend weight at time `t`
    ///
    /// Clamps to the first/last keyframe outside the keyed range.
    fn sample_span(&self, t: f32) -> (usize, usize, f32) {
        let times = &self.times;
        if t <= times[0] {
            return (0, 0, 0.0);
        }
        let last = times.len() - 1;
        if t >= times[last] {
            return (last, last, 0.0);
        }

        let mut i = 0;
        while i + 1 < times.len() && times[i + 1] <= t {
            i += 1;
        }

        let span = times[i + 1] - times[i];
        let alpha = if span > 0.0 { (t - times[i]) / span } else { 0.0 };
        let alpha = match self.interpolation {
            Interpolation::Linear => alpha,
            Interpolation::Step => 0.0,
        };
        (i, i + 1, alpha)
    }

    /// Apply the channel value at time `t` to its node
    fn apply(&self, t: f32, stage: &mut Stage) {
        if self.times.is_empty() || self.times.len() != self.track.len() {
            return;
        }
        let (a, b, alpha) = self.sample_span(t);
        let Some(node) = stage.node_mut(self.node) else {
            return;
        };
        match &self.track {
            ChannelTrack::Translation(values) => {
                node.local.position = values[a].lerp(values[b], alpha);
            }
            ChannelTrack::Rotation(values) => {
                node.local.rotation = values[a].slerp(values[b], alpha);
            }
            ChannelTrack::Scale(values) => {
                node.local.scale = values[a].lerp(values[b], alpha);
            }
        }
    }
}

/// One named clip: its channels plus the clip length in seconds
#[derive(Debug, Clone)]
pub struct AnimationClip {
    pub name: String,
    pub duration: f32,
    pub channels: Vec<Channel>,
}

/// Advances every clip of one model, looping
pub struct Mixer {
    clips: Vec<AnimationClip>,
    time: f32,
}

impl Mixer {
    /// All clips play from construction; there is no blending or exclusivity
    pub fn new(clips: Vec<AnimationClip>) -> Self {
        Self { clips, time: 0.0 }
    }

    pub fn advance(&mut self, dt: f32, stage: &mut Stage) {
        self.time += dt;
        for clip in &self.clips {
            if clip.duration <= 0.0 {
                continue;
            }
            let t = self.time % clip.duration;
            for channel in &clip.channels {
                channel.apply(t, stage);
            }
        }
    }

    pub fn clip_count(&self) -> usize {
        self.clips.len()
    }

    pub fn time(&self) -> f32 {
        self.time
    }
}

/// Session-owned list of active mixers
#[derive(Default)]
pub struct MixerRegistry {
    mixers: Vec<Mixer>,
}

impl MixerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, mixer: Mixer) {
        self.mixers.push(mixer);
    }

    pub fn advance_all(&mut self, dt: f32, stage: &mut Stage) {
        for mixer in &mut self.mixers {
            mixer.advance(dt, stage);
        }
    }

    pub fn len(&self) -> usize {
        self.mixers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mixers.is_empty()
    }

    pub fn clear(&mut self) {
        self.mixers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translation_clip(node: NodeId, interpolation: Interpolation) -> AnimationClip {
        AnimationClip {
            name: "slide".to_string(),
            duration: 2.0,
            channels: vec![Channel {
                node,
                times: vec![0.0, 2.0],
                track: ChannelTrack::Translation(vec![
                    Vec3::ZERO,
                    Vec3::new(2.0, 0.0, 0.0),
                ]),
                interpolation,
            }],
        }
    }

    #[test]
    fn test_linear_interpolation_midpoint() {
        let mut stage = Stage::new();
        let node = stage.add_group(None, "animated");
        let mut mixer = Mixer::new(vec![translation_clip(node, Interpolation::Linear)]);

        mixer.advance(1.0, &mut stage);
        let position = stage.node(node).unwrap().local.position;
        assert!((position.x - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_step_interpolation_holds_previous_key() {
        let mut stage = Stage::new();
        let node = stage.add_group(None, "animated");
        let mut mixer = Mixer::new(vec![translation_clip(node, Interpolation::Step)]);

        mixer.advance(1.0, &mut stage);
        let position = stage.node(node).unwrap().local.position;
        assert_eq!(position.x, 0.0);
    }

    #[test]
    fn test_clip_loops_past_duration() {
        let mut stage = Stage::new();
        let node = stage.add_group(None, "animated");
        let mut mixer = Mixer::new(vec![translation_clip(node, Interpolation::Linear)]);

        // 2.5s into a 2s clip wraps to 0.5s
        mixer.advance(2.5, &mut stage);
        let position = stage.node(node).unwrap().local.position;
        assert!((position.x - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_time_before_first_key_clamps() {
        let mut stage = Stage::new();
        let node = stage.add_group(None, "animated");
        let clip = AnimationClip {
            name: "late".to_string(),
            duration: 4.0,
            channels: vec![Channel {
                node,
                times: vec![2.0, 4.0],
                track: ChannelTrack::Translation(vec![
                    Vec3::new(5.0, 0.0, 0.0),
                    Vec3::new(9.0, 0.0, 0.0),
                ]),
                interpolation: Interpolation::Linear,
            }],
        };
        let mut mixer = Mixer::new(vec![clip]);

        mixer.advance(1.0, &mut stage);
        let position = stage.node(node).unwrap().local.position;
        assert_eq!(position.x, 5.0);
    }

    #[test]
    fn test_rotation_slerp() {
        let mut stage = Stage::new();
        let node = stage.add_group(None, "animated");
        let clip = AnimationClip {
            name: "spin".to_string(),
            duration: 2.0,
            channels: vec![Channel {
                node,
                times: vec![0.0, 2.0],
                track: ChannelTrack::Rotation(vec![
                    Quat::IDENTITY,
                    Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
                ]),
                interpolation: Interpolation::Linear,
            }],
        };
        let mut mixer = Mixer::new(vec![clip]);

        mixer.advance(1.0, &mut stage);
        let rotation = stage.node(node).unwrap().local.rotation;
        let expected = Quat::from_rotation_y(std::f32::consts::FRAC_PI_4);
        assert!(rotation.angle_between(expected) < 1e-4);
    }

    #[test]
    fn test_registry_advances_and_clears() {
        let mut stage = Stage::new();
        let node = stage.add_group(None, "animated");
        let mut registry = MixerRegistry::new();
        registry.add(Mixer::new(vec![translation_clip(node, Interpolation::Linear)]));
        assert_eq!(registry.len(), 1);

        registry.advance_all(1.0, &mut stage);
        assert!((stage.node(node).unwrap().local.position.x - 1.0).abs() < 1e-5);

        registry.clear();
        assert!(registry.is_empty());
    }
}
