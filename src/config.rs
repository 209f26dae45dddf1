//! Experience configuration for AR Stage
//!
//! Handles loading and validation of `experiences.json` files describing
//! which media is anchored to which tracked target.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Which media entry's glow intensity wins when both video and image
/// properties carry one for the same target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum GlowPrecedence {
    /// Image properties win
    #[serde(rename = "image")]
    #[default]
    Image,
    /// Video properties win
    #[serde(rename = "video")]
    Video,
}

/// A position / rotation / scale triple as written in the config file
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vec3Config {
    #[serde(rename = "x", default)]
    pub x: f32,
    #[serde(rename = "y", default)]
    pub y: f32,
    #[serde(rename = "z", default)]
    pub z: f32,
}

impl Vec3Config {
    pub fn to_vec3(&self) -> glam::Vec3 {
        glam::Vec3::new(self.x, self.y, self.z)
    }
}

/// Declarative transform applied to a model attached to an anchor
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TransformConfig {
    /// Position in anchor space
    #[serde(rename = "position", default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Vec3Config>,

    /// Rotation in degrees per axis
    #[serde(rename = "rotation", default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<Vec3Config>,

    /// Scale per axis
    #[serde(rename = "scale", default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<Vec3Config>,

    /// Opacity applied to every mesh material in the model (0-1)
    #[serde(rename = "opacity", default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f32>,

    /// Glow intensity while the target is found
    #[serde(rename = "glowIntensity", default, skip_serializing_if = "Option::is_none")]
    pub glow_intensity: Option<f32>,
}

/// Sizing and appearance of a media plane (video or image)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaProperties {
    /// Source width used for aspect sizing
    #[serde(rename = "width")]
    pub width: f32,

    /// Source height used for aspect sizing
    #[serde(rename = "height")]
    pub height: f32,

    /// Plane opacity (0-1)
    #[serde(rename = "opacity", default = "default_opacity")]
    pub opacity: f32,

    /// Plane position in anchor space
    #[serde(rename = "position", default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Vec3Config>,

    /// Glow intensity while the target is found
    #[serde(rename = "glowIntensity", default, skip_serializing_if = "Option::is_none")]
    pub glow_intensity: Option<f32>,
}

/// Default plane opacity
fn default_opacity() -> f32 {
    1.0
}

/// One media binding: which marker index carries which media
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetEntry {
    /// Marker index in the experience's target file
    #[serde(rename = "targetIndex")]
    pub target_index: u32,

    /// Video filename under the experience's video folder
    #[serde(rename = "video", default, skip_serializing_if = "Option::is_none")]
    pub video: Option<String>,

    /// Image filename under the experience's image folder
    #[serde(rename = "image", default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Binary glTF filename under the experience's model folder
    #[serde(rename = "glbModel", default, skip_serializing_if = "Option::is_none")]
    pub glb_model: Option<String>,

    /// Transform applied to the model
    #[serde(rename = "transform", default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<TransformConfig>,

    /// Sizing/appearance for the video plane
    #[serde(rename = "videoProperties", default, skip_serializing_if = "Option::is_none")]
    pub video_properties: Option<MediaProperties>,

    /// Sizing/appearance for the image plane
    #[serde(rename = "imageProperties", default, skip_serializing_if = "Option::is_none")]
    pub image_properties: Option<MediaProperties>,
}

impl TargetEntry {
    /// An entry has to bind at least one kind of media
    pub fn has_media(&self) -> bool {
        self.video.is_some() || self.image.is_some() || self.glb_model.is_some()
    }
}

/// One switchable experience: a named asset folder plus its target bindings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experience {
    /// Display name shown in the menu
    #[serde(rename = "name")]
    pub name: String,

    /// Asset sub-folder under the base path
    #[serde(rename = "folder")]
    pub folder: String,

    /// Ordered target bindings
    #[serde(rename = "targets")]
    pub targets: Vec<TargetEntry>,
}

/// Top-level configuration loaded from an `experiences.json` file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperienceConfig {
    /// Root directory all asset paths are joined under
    #[serde(rename = "basePath")]
    pub base_path: String,

    /// Thumbnail filename inside each experience folder
    #[serde(rename = "thumbsFile")]
    pub thumbs_file: String,

    /// Marker-target filename inside each experience folder
    #[serde(rename = "targetsFile")]
    pub targets_file: String,

    /// Video sub-folder name inside each experience folder
    #[serde(rename = "videoFolder")]
    pub video_folder: String,

    /// Image sub-folder name inside each experience folder
    #[serde(rename = "imageFolder")]
    pub image_folder: String,

    /// Model sub-folder name inside each experience folder
    #[serde(rename = "glbFolder")]
    pub glb_folder: String,

    /// Background audio filename (reserved; playback is out of scope)
    #[serde(rename = "audioFile", default, skip_serializing_if = "Option::is_none")]
    pub audio_file: Option<String>,

    /// Cover image filename shown before any experience loads
    #[serde(rename = "coverFile", default, skip_serializing_if = "Option::is_none")]
    pub cover_file: Option<String>,

    /// Which media's glow intensity wins when both are configured
    #[serde(rename = "glowPrecedence", default)]
    pub glow_precedence: GlowPrecedence,

    /// Ordered list of switchable experiences
    #[serde(rename = "experiences")]
    pub experiences: Vec<Experience>,
}

impl ExperienceConfig {
    /// Load and validate a configuration file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(ConfigError::Io)?;
        let config: Self = serde_json::from_str(&contents).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Cross-field rules the schema alone cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.experiences.is_empty() {
            return Err(ConfigError::NoExperiences);
        }

        for experience in &self.experiences {
            let mut seen = HashSet::new();
            for entry in &experience.targets {
                if !seen.insert(entry.target_index) {
                    return Err(ConfigError::DuplicateTarget {
                        experience: experience.name.clone(),
                        target_index: entry.target_index,
                    });
                }

                if !entry.has_media() {
                    return Err(ConfigError::EntryWithoutMedia {
                        experience: experience.name.clone(),
                        target_index: entry.target_index,
                    });
                }

                if let Some(transform) = &entry.transform {
                    if let Some(opacity) = transform.opacity {
                        if !(0.0..=1.0).contains(&opacity) {
                            return Err(ConfigError::OpacityOutOfRange {
                                experience: experience.name.clone(),
                                target_index: entry.target_index,
                                opacity,
                            });
                        }
                    }
                    if let Some(glow) = transform.glow_intensity {
                        if glow < 0.0 {
                            return Err(ConfigError::NegativeGlow {
                                experience: experience.name.clone(),
                                target_index: entry.target_index,
                                glow,
                            });
                        }
                    }
                }

                let properties = [entry.video_properties.as_ref(), entry.image_properties.as_ref()];
                for props in properties.into_iter().flatten() {
                    if props.width <= 0.0 || props.height <= 0.0 {
                        return Err(ConfigError::ZeroMediaSize {
                            experience: experience.name.clone(),
                            target_index: entry.target_index,
                        });
                    }
                    if !(0.0..=1.0).contains(&props.opacity) {
                        return Err(ConfigError::OpacityOutOfRange {
                            experience: experience.name.clone(),
                            target_index: entry.target_index,
                            opacity: props.opacity,
                        });
                    }
                    if let Some(glow) = props.glow_intensity {
                        if glow < 0.0 {
                            return Err(ConfigError::NegativeGlow {
                                experience: experience.name.clone(),
                                target_index: entry.target_index,
                                glow,
                            });
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// `{basePath}/{folder}/{targetsFile}`
    pub fn targets_path(&self, experience: &Experience) -> PathBuf {
        Path::new(&self.base_path)
            .join(&experience.folder)
            .join(&self.targets_file)
    }

    /// `{basePath}/{folder}/{thumbsFile}`
    pub fn thumb_path(&self, experience: &Experience) -> PathBuf {
        Path::new(&self.base_path)
            .join(&experience.folder)
            .join(&self.thumbs_file)
    }

    /// `{basePath}/{folder}/{videoFolder}/{file}`
    pub fn video_path(&self, experience: &Experience, file: &str) -> PathBuf {
        Path::new(&self.base_path)
            .join(&experience.folder)
            .join(&self.video_folder)
            .join(file)
    }

    /// `{basePath}/{folder}/{imageFolder}/{file}`
    pub fn image_path(&self, experience: &Experience, file: &str) -> PathBuf {
        Path::new(&self.base_path)
            .join(&experience.folder)
            .join(&self.image_folder)
            .join(file)
    }

    /// `{basePath}/{folder}/{glbFolder}/{file}`
    pub fn model_path(&self, experience: &Experience, file: &str) -> PathBuf {
        Path::new(&self.base_path)
            .join(&experience.folder)
            .join(&self.glb_folder)
            .join(file)
    }
}

/// Configuration-related errors
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    NoExperiences,
    DuplicateTarget { experience: String, target_index: u32 },
    EntryWithoutMedia { experience: String, target_index: u32 },
    OpacityOutOfRange { experience: String, target_index: u32, opacity: f32 },
    NegativeGlow { experience: String, target_index: u32, glow: f32 },
    ZeroMediaSize { experience: String, target_index: u32 },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "JSON parse error: {}", e),
            ConfigError::NoExperiences => write!(f, "experiences list is empty"),
            ConfigError::DuplicateTarget { experience, target_index } => write!(
                f,
                "experience '{}': duplicate targetIndex {}",
                experience, target_index
            ),
            ConfigError::EntryWithoutMedia { experience, target_index } => write!(
                f,
                "experience '{}': targetIndex {} has no video, image or glbModel",
                experience, target_index
            ),
            ConfigError::OpacityOutOfRange { experience, target_index, opacity } => write!(
                f,
                "experience '{}': targetIndex {} opacity {} is outside 0..=1",
                experience, target_index, opacity
            ),
            ConfigError::NegativeGlow { experience, target_index, glow } => write!(
                f,
                "experience '{}': targetIndex {} glowIntensity {} is negative",
                experience, target_index, glow
            ),
            ConfigError::ZeroMediaSize { experience, target_index } => write!(
                f,
                "experience '{}': targetIndex {} media width/height must be positive",
                experience, target_index
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> ExperienceConfig {
        let json = r#"{
            "basePath": "assets",
            "thumbsFile": "thumb.png",
            "targetsFile": "targets.mind",
            "videoFolder": "videos",
            "imageFolder": "images",
            "glbFolder": "models",
            "experiences": [
                {
                    "name": "Album One",
                    "folder": "album-one",
                    "targets": [
                        {
                            "targetIndex": 0,
                            "video": "track.mp4",
                            "videoProperties": {
                                "width": 16,
                                "height": 9,
                                "opacity": 0.9,
                                "glowIntensity": 0.5
                            }
                        },
                        {
                            "targetIndex": 1,
                            "glbModel": "sculpture.glb",
                            "transform": {
                                "rotation": { "x": 90.0 },
                                "scale": { "x": 0.25, "y": 0.25, "z": 0.25 },
                                "opacity": 0.4
                            }
                        }
                    ]
                }
            ]
        }"#;
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_parse_sample() {
        let config = sample_config();
        assert_eq!(config.base_path, "assets");
        assert_eq!(config.glow_precedence, GlowPrecedence::Image);
        assert_eq!(config.experiences.len(), 1);

        let entry = &config.experiences[0].targets[0];
        assert_eq!(entry.target_index, 0);
        assert_eq!(entry.video.as_deref(), Some("track.mp4"));
        let props = entry.video_properties.as_ref().unwrap();
        assert_eq!(props.width, 16.0);
        assert_eq!(props.glow_intensity, Some(0.5));

        let transform = config.experiences[0].targets[1].transform.as_ref().unwrap();
        assert_eq!(transform.rotation.unwrap().x, 90.0);
        assert_eq!(transform.opacity, Some(0.4));
    }

    #[test]
    fn test_glow_precedence_parse() {
        let video: GlowPrecedence = serde_json::from_str("\"video\"").unwrap();
        assert_eq!(video, GlowPrecedence::Video);
        let image: GlowPrecedence = serde_json::from_str("\"image\"").unwrap();
        assert_eq!(image, GlowPrecedence::Image);
    }

    #[test]
    fn test_validate_accepts_sample() {
        assert!(sample_config().validate().is_ok());
    }

    #[test]
    fn test_empty_experiences_rejected() {
        let mut config = sample_config();
        config.experiences.clear();
        assert!(matches!(config.validate(), Err(ConfigError::NoExperiences)));
    }

    #[test]
    fn test_duplicate_target_index_rejected() {
        let mut config = sample_config();
        let duplicate = config.experiences[0].targets[0].clone();
        config.experiences[0].targets.push(duplicate);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateTarget { target_index: 0, .. })
        ));
    }

    #[test]
    fn test_entry_without_media_rejected() {
        let mut config = sample_config();
        config.experiences[0].targets.push(TargetEntry {
            target_index: 7,
            video: None,
            image: None,
            glb_model: None,
            transform: None,
            video_properties: None,
            image_properties: None,
        });
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EntryWithoutMedia { target_index: 7, .. })
        ));
    }

    #[test]
    fn test_opacity_out_of_range_rejected() {
        let mut config = sample_config();
        config.experiences[0].targets[1]
            .transform
            .as_mut()
            .unwrap()
            .opacity = Some(1.5);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OpacityOutOfRange { .. })
        ));
    }

    #[test]
    fn test_negative_glow_rejected() {
        let mut config = sample_config();
        config.experiences[0].targets[0]
            .video_properties
            .as_mut()
            .unwrap()
            .glow_intensity = Some(-0.1);
        assert!(matches!(config.validate(), Err(ConfigError::NegativeGlow { .. })));
    }

    #[test]
    fn test_zero_media_size_rejected() {
        let mut config = sample_config();
        config.experiences[0].targets[0]
            .video_properties
            .as_mut()
            .unwrap()
            .width = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroMediaSize { .. })));
    }

    #[test]
    fn test_path_joins() {
        let config = sample_config();
        let experience = &config.experiences[0];
        assert_eq!(
            config.targets_path(experience),
            PathBuf::from("assets/album-one/targets.mind")
        );
        assert_eq!(
            config.thumb_path(experience),
            PathBuf::from("assets/album-one/thumb.png")
        );
        assert_eq!(
            config.video_path(experience, "track.mp4"),
            PathBuf::from("assets/album-one/videos/track.mp4")
        );
        assert_eq!(
            config.image_path(experience, "art.png"),
            PathBuf::from("assets/album-one/images/art.png")
        );
        assert_eq!(
            config.model_path(experience, "sculpture.glb"),
            PathBuf::from("assets/album-one/models/sculpture.glb")
        );
    }
}
