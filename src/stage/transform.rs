//! Transform resolution and position smoothing
//!
//! Configured positions are approached with a fixed per-frame lerp rather
//! than applied directly, which hides tracker jitter on anchored media.

use glam::{Quat, Vec3};

use crate::config::TransformConfig;

/// Per-frame lerp factor for smoothed positions
pub const SMOOTHING: f32 = 0.2;

/// Position that eases toward its target a fixed fraction per frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothedPosition {
    current: Vec3,
    target: Vec3,
}

impl SmoothedPosition {
    pub fn new(initial: Vec3) -> Self {
        Self {
            current: initial,
            target: initial,
        }
    }

    pub fn set_target(&mut self, target: Vec3) {
        self.target = target;
    }

    /// Move one smoothing step toward the target; returns the new position
    pub fn advance(&mut self) -> Vec3 {
        self.current = self.current.lerp(self.target, SMOOTHING);
        self.current
    }

    pub fn current(&self) -> Vec3 {
        self.current
    }
}

/// Convert per-axis degrees to a rotation quaternion
pub fn rotation_from_degrees(degrees: Vec3) -> Quat {
    Quat::from_euler(
        glam::EulerRot::XYZ,
        degrees.x.to_radians(),
        degrees.y.to_radians(),
        degrees.z.to_radians(),
    )
}

/// Transform values with config defaults filled in
#[derive(Debug, Clone, Copy)]
pub struct ResolvedTransform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub opacity: Option<f32>,
    pub glow_intensity: Option<f32>,
}

impl Default for ResolvedTransform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            opacity: None,
            glow_intensity: None,
        }
    }
}

impl ResolvedTransform {
    /// Resolve a config transform: rotation converted from degrees, missing
    /// fields replaced with identity values
    pub fn from_config(config: &TransformConfig) -> Self {
        Self {
            position: config.position.map(|p| p.to_vec3()).unwrap_or(Vec3::ZERO),
            rotation: config
                .rotation
                .map(|r| rotation_from_degrees(r.to_vec3()))
                .unwrap_or(Quat::IDENTITY),
            scale: config.scale.map(|s| s.to_vec3()).unwrap_or(Vec3::ONE),
            opacity: config.opacity,
            glow_intensity: config.glow_intensity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Vec3Config;

    #[test]
    fn test_smoothing_first_step() {
        let mut position = SmoothedPosition::new(Vec3::ZERO);
        position.set_target(Vec3::new(1.0, 0.0, 0.0));
        let stepped = position.advance();
        assert!((stepped.x - SMOOTHING).abs() < 1e-6);
    }

    #[test]
    fn test_smoothing_converges() {
        let mut position = SmoothedPosition::new(Vec3::ZERO);
        position.set_target(Vec3::new(1.0, -2.0, 3.0));
        for _ in 0..100 {
            position.advance();
        }
        assert!(position.current().distance(Vec3::new(1.0, -2.0, 3.0)) < 1e-4);
    }

    #[test]
    fn test_rotation_from_degrees() {
        let rotation = rotation_from_degrees(Vec3::new(90.0, 0.0, 0.0));
        let rotated = rotation * Vec3::Y;
        assert!(rotated.distance(Vec3::Z) < 1e-5);
    }

    #[test]
    fn test_resolve_defaults() {
        let resolved = ResolvedTransform::from_config(&TransformConfig::default());
        assert_eq!(resolved.position, Vec3::ZERO);
        assert_eq!(resolved.rotation, Quat::IDENTITY);
        assert_eq!(resolved.scale, Vec3::ONE);
        assert!(resolved.opacity.is_none());
        assert!(resolved.glow_intensity.is_none());
    }

    #[test]
    fn test_resolve_values() {
        let config = TransformConfig {
            position: Some(Vec3Config { x: 1.0, y: 2.0, z: 3.0 }),
            rotation: Some(Vec3Config { x: 0.0, y: 180.0, z: 0.0 }),
            scale: Some(Vec3Config { x: 0.25, y: 0.25, z: 0.25 }),
            opacity: Some(0.4),
            glow_intensity: Some(1.5),
        };
        let resolved = ResolvedTransform::from_config(&config);
        assert_eq!(resolved.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(resolved.scale, Vec3::splat(0.25));
        assert_eq!(resolved.opacity, Some(0.4));
        assert_eq!(resolved.glow_intensity, Some(1.5));

        // 180 degrees about Y flips Z
        let rotated = resolved.rotation * Vec3::Z;
        assert!(rotated.distance(-Vec3::Z) < 1e-5);
    }
}
