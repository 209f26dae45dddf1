//! glTF model loading
//!
//! Parses a binary glTF asset into a CPU-side document: a node tree with
//! mesh primitives and materials, plus its animation clips. `attach`
//! instantiates the document under a stage node and builds the mixer that
//! drives the clips. Draco-compressed primitives are rejected.

use std::path::Path;
use std::sync::Arc;

use glam::{Quat, Vec3};
use gltf::mesh::util::ReadIndices;
use image::RgbaImage;

use super::animation::{AnimationClip, Channel, ChannelTrack, Interpolation, Mixer};
use super::plane::StageVertex;
use super::{NodeId, NodeKind, NodeTransform, Stage};

/// Model-loading errors
#[derive(Debug)]
pub enum ModelError {
    Import(gltf::Error),
    /// KHR_draco_mesh_compression is not supported
    DracoCompressed,
    /// The asset contains no renderable geometry
    NoGeometry,
}

impl std::fmt::Display for ModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelError::Import(e) => write!(f, "glTF import error: {}", e),
            ModelError::DracoCompressed => {
                write!(f, "Draco-compressed primitives are not supported")
            }
            ModelError::NoGeometry => write!(f, "model contains no renderable geometry"),
        }
    }
}

impl std::error::Error for ModelError {}

impl From<gltf::Error> for ModelError {
    fn from(e: gltf::Error) -> Self {
        ModelError::Import(e)
    }
}

/// CPU-side mesh geometry shared between instances
#[derive(Debug, Clone)]
pub struct MeshData {
    pub vertices: Vec<StageVertex>,
    pub indices: Vec<u32>,
}

/// Material state carried per mesh instance
#[derive(Debug, Clone)]
pub struct MeshMaterial {
    /// Base color factor (RGBA)
    pub base_color: [f32; 4],
    /// Instance opacity, multiplied into the final alpha
    pub opacity: f32,
    pub transparent: bool,
    /// Base color texture, shared between instances
    pub texture: Option<Arc<RgbaImage>>,
}

impl Default for MeshMaterial {
    fn default() -> Self {
        Self {
            base_color: [1.0, 1.0, 1.0, 1.0],
            opacity: 1.0,
            transparent: false,
            texture: None,
        }
    }
}

/// Mesh payload of a stage node
#[derive(Clone)]
pub struct MeshInstance {
    pub mesh: Arc<MeshData>,
    pub material: MeshMaterial,
}

/// One node of the parsed model
pub struct ModelNode {
    pub name: String,
    pub transform: NodeTransform,
    /// Child indices into `ModelDocument::nodes`
    pub children: Vec<usize>,
    pub primitives: Vec<MeshInstance>,
}

/// One animated property of one model node
pub struct ModelChannel {
    /// Index into `ModelDocument::nodes`
    pub node_index: usize,
    pub times: Vec<f32>,
    pub track: ChannelTrack,
    pub interpolation: Interpolation,
}

/// One animation clip of the parsed model
pub struct ModelAnimation {
    pub name: String,
    pub duration: f32,
    pub channels: Vec<ModelChannel>,
}

/// A parsed glTF asset, ready to attach to the stage
pub struct ModelDocument {
    pub nodes: Vec<ModelNode>,
    /// Indices of the default scene's root nodes
    pub roots: Vec<usize>,
    pub animations: Vec<ModelAnimation>,
}

/// Result of instantiating a model under a stage node
pub struct AttachedModel {
    /// Stage id per document node index; None for nodes the scene never reaches
    pub node_ids: Vec<Option<NodeId>>,
    /// Mixer driving the model's clips, if it has any
    pub mixer: Option<Mixer>,
}

/// Load a glTF asset from disk
pub fn load_model(path: &Path) -> Result<ModelDocument, ModelError> {
    let (doc, buffers, images) = gltf::import(path)?;

    // Parse each mesh once; nodes reference them by index
    let mut mesh_table: Vec<Vec<MeshInstance>> = Vec::new();
    for mesh in doc.meshes() {
        let mut primitives = Vec::new();
        for prim in mesh.primitives() {
            if prim.extension_value("KHR_draco_mesh_compression").is_some() {
                return Err(ModelError::DracoCompressed);
            }

            let reader = prim.reader(|b| buffers.get(b.index()).map(|bb| bb.0.as_slice()));
            let positions = match reader.read_positions() {
                Some(iter) => iter.collect::<Vec<[f32; 3]>>(),
                None => continue,
            };
            let normals: Vec<[f32; 3]> = match reader.read_normals() {
                Some(iter) => iter.collect(),
                None => vec![[0.0, 1.0, 0.0]; positions.len()],
            };
            let uvs: Vec<[f32; 2]> = match reader.read_tex_coords(0) {
                Some(tc) => tc.into_f32().collect(),
                None => vec![[0.0, 0.0]; positions.len()],
            };

            let vertices: Vec<StageVertex> = positions
                .iter()
                .enumerate()
                .map(|(i, &position)| StageVertex {
                    position,
                    normal: normals.get(i).copied().unwrap_or([0.0, 1.0, 0.0]),
                    uv: uvs.get(i).copied().unwrap_or([0.0, 0.0]),
                })
                .collect();

            let indices: Vec<u32> = match reader.read_indices() {
                Some(ReadIndices::U16(it)) => it.map(|v| v as u32).collect(),
                Some(ReadIndices::U32(it)) => it.collect(),
                Some(ReadIndices::U8(it)) => it.map(|v| v as u32).collect(),
                None => (0..positions.len() as u32).collect(),
            };

            primitives.push(MeshInstance {
                mesh: Arc::new(MeshData { vertices, indices }),
                material: material_from_gltf(&prim.material(), &images),
            });
        }
        mesh_table.push(primitives);
    }

    let mut nodes = Vec::new();
    for node in doc.nodes() {
        let (translation, rotation, scale) = node.transform().decomposed();
        let transform = NodeTransform {
            position: Vec3::from(translation),
            rotation: Quat::from_array(rotation),
            scale: Vec3::from(scale),
        };
        let primitives = node
            .mesh()
            .and_then(|m| mesh_table.get(m.index()).cloned())
            .unwrap_or_default();

        nodes.push(ModelNode {
            name: node
                .name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("node {}", node.index())),
            transform,
            children: node.children().map(|c| c.index()).collect(),
            primitives,
        });
    }

    if !nodes.iter().any(|n| !n.primitives.is_empty()) {
        return Err(ModelError::NoGeometry);
    }

    let roots: Vec<usize> = doc
        .default_scene()
        .or_else(|| doc.scenes().next())
        .map(|scene| scene.nodes().map(|n| n.index()).collect())
        .unwrap_or_default();

    let mut animations = Vec::new();
    for animation in doc.animations() {
        let mut channels = Vec::new();
        let mut duration = 0.0f32;

        for channel in animation.channels() {
            let reader = channel.reader(|b| buffers.get(b.index()).map(|bb| bb.0.as_slice()));
            let Some(inputs) = reader.read_inputs() else {
                continue;
            };
            let times: Vec<f32> = inputs.collect();
            let Some(outputs) = reader.read_outputs() else {
                continue;
            };

            let sampler_interpolation = channel.sampler().interpolation();
            let cubic = matches!(
                sampler_interpolation,
                gltf::animation::Interpolation::CubicSpline
            );
            let interpolation = match sampler_interpolation {
                gltf::animation::Interpolation::Step => Interpolation::Step,
                // Cubic tangents are dropped; the key values still play linearly
                _ => Interpolation::Linear,
            };

            use gltf::animation::util::ReadOutputs;
            let track = match outputs {
                ReadOutputs::Translations(iter) => {
                    let mut values: Vec<Vec3> = iter.map(Vec3::from).collect();
                    if cubic {
                        values = middle_of_triples(values);
                    }
                    ChannelTrack::Translation(values)
                }
                ReadOutputs::Rotations(rotations) => {
                    let mut values: Vec<Quat> =
                        rotations.into_f32().map(Quat::from_array).collect();
                    if cubic {
                        values = middle_of_triples(values);
                    }
                    ChannelTrack::Rotation(values)
                }
                ReadOutputs::Scales(iter) => {
                    let mut values: Vec<Vec3> = iter.map(Vec3::from).collect();
                    if cubic {
                        values = middle_of_triples(values);
                    }
                    ChannelTrack::Scale(values)
                }
                ReadOutputs::MorphTargetWeights(_) => {
                    tracing::debug!("Skipping morph target channel");
                    continue;
                }
            };

            if let Some(&last) = times.last() {
                duration = duration.max(last);
            }

            channels.push(ModelChannel {
                node_index: channel.target().node().index(),
                times,
                track,
                interpolation,
            });
        }

        animations.push(ModelAnimation {
            name: animation
                .name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("clip {}", animations.len())),
            duration,
            channels,
        });
    }

    tracing::info!(
        nodes = nodes.len(),
        animations = animations.len(),
        "Loaded model {}",
        path.display()
    );

    Ok(ModelDocument {
        nodes,
        roots,
        animations,
    })
}

/// Cubic spline outputs come as (in-tangent, value, out-tangent) triples
fn middle_of_triples<T: Copy>(values: Vec<T>) -> Vec<T> {
    values.chunks_exact(3).map(|c| c[1]).collect()
}

fn material_from_gltf(material: &gltf::Material, images: &[gltf::image::Data]) -> MeshMaterial {
    let pbr = material.pbr_metallic_roughness();
    let texture = pbr
        .base_color_texture()
        .and_then(|info| images.get(info.texture().source().index()))
        .and_then(image_to_rgba)
        .map(Arc::new);

    MeshMaterial {
        base_color: pbr.base_color_factor(),
        opacity: 1.0,
        transparent: matches!(material.alpha_mode(), gltf::material::AlphaMode::Blend),
        texture,
    }
}

fn image_to_rgba(data: &gltf::image::Data) -> Option<RgbaImage> {
    use gltf::image::Format;

    let pixels: Vec<u8> = match data.format {
        Format::R8G8B8A8 => data.pixels.clone(),
        Format::R8G8B8 => data
            .pixels
            .chunks_exact(3)
            .flat_map(|p| [p[0], p[1], p[2], 255])
            .collect(),
        Format::R8 => data.pixels.iter().flat_map(|&v| [v, v, v, 255]).collect(),
        other => {
            tracing::warn!("Unsupported texture format {:?}, skipping", other);
            return None;
        }
    };

    RgbaImage::from_raw(data.width, data.height, pixels)
}

impl ModelDocument {
    /// Instantiate the document under `parent`
    ///
    /// Every model node becomes a group carrying its glTF transform, with
    /// one mesh child per primitive. Animation channels are remapped to the
    /// created stage ids.
    pub fn attach(&self, stage: &mut Stage, parent: NodeId) -> AttachedModel {
        let mut node_ids: Vec<Option<NodeId>> = vec![None; self.nodes.len()];
        for &root in &self.roots {
            self.attach_node(root, stage, parent, &mut node_ids);
        }

        let mixer = if self.animations.is_empty() {
            None
        } else {
            let clips: Vec<AnimationClip> = self
                .animations
                .iter()
                .map(|animation| AnimationClip {
                    name: animation.name.clone(),
                    duration: animation.duration,
                    channels: animation
                        .channels
                        .iter()
                        .filter_map(|channel| {
                            let node = node_ids.get(channel.node_index).copied().flatten()?;
                            Some(Channel {
                                node,
                                times: channel.times.clone(),
                                track: channel.track.clone(),
                                interpolation: channel.interpolation,
                            })
                        })
                        .collect(),
                })
                .collect();
            Some(Mixer::new(clips))
        };

        AttachedModel { node_ids, mixer }
    }

    fn attach_node(
        &self,
        index: usize,
        stage: &mut Stage,
        parent: NodeId,
        node_ids: &mut Vec<Option<NodeId>>,
    ) {
        let Some(model_node) = self.nodes.get(index) else {
            return;
        };

        let id = stage.add_group(Some(parent), model_node.name.clone());
        if let Some(node) = stage.node_mut(id) {
            node.local = model_node.transform;
        }
        node_ids[index] = Some(id);

        for primitive in &model_node.primitives {
            stage.add_node(
                Some(id),
                format!("{} mesh", model_node.name),
                NodeKind::Mesh(primitive.clone()),
            );
        }

        for &child in &model_node.children {
            self.attach_node(child, stage, id, node_ids);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube_primitive() -> MeshInstance {
        MeshInstance {
            mesh: Arc::new(MeshData {
                vertices: vec![
                    StageVertex {
                        position: [0.0, 0.0, 0.0],
                        normal: [0.0, 0.0, 1.0],
                        uv: [0.0, 0.0],
                    };
                    3
                ],
                indices: vec![0, 1, 2],
            }),
            material: MeshMaterial::default(),
        }
    }

    fn two_node_document() -> ModelDocument {
        ModelDocument {
            nodes: vec![
                ModelNode {
                    name: "root".to_string(),
                    transform: NodeTransform::default(),
                    children: vec![1],
                    primitives: vec![],
                },
                ModelNode {
                    name: "body".to_string(),
                    transform: NodeTransform::default(),
                    children: vec![],
                    primitives: vec![cube_primitive(), cube_primitive()],
                },
            ],
            roots: vec![0],
            animations: vec![],
        }
    }

    #[test]
    fn test_attach_builds_tree() {
        let mut stage = Stage::new();
        let anchor = stage.add_group(None, "anchor");
        let document = two_node_document();

        let attached = document.attach(&mut stage, anchor);
        // anchor + 2 groups + 2 mesh children
        assert_eq!(stage.node_count(), 5);
        assert!(attached.mixer.is_none());
        assert!(attached.node_ids.iter().all(|id| id.is_some()));
    }

    #[test]
    fn test_attach_remaps_animation_channels() {
        let mut stage = Stage::new();
        let anchor = stage.add_group(None, "anchor");
        let mut document = two_node_document();
        document.animations.push(ModelAnimation {
            name: "bob".to_string(),
            duration: 1.0,
            channels: vec![ModelChannel {
                node_index: 1,
                times: vec![0.0, 1.0],
                track: ChannelTrack::Translation(vec![
                    Vec3::ZERO,
                    Vec3::new(0.0, 1.0, 0.0),
                ]),
                interpolation: Interpolation::Linear,
            }],
        });

        let attached = document.attach(&mut stage, anchor);
        let mut mixer = attached.mixer.expect("model has a clip");
        assert_eq!(mixer.clip_count(), 1);

        mixer.advance(0.5, &mut stage);
        let body = attached.node_ids[1].unwrap();
        assert!((stage.node(body).unwrap().local.position.y - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_subtree_opacity_reaches_every_mesh() {
        let mut stage = Stage::new();
        let anchor = stage.add_group(None, "anchor");
        let document = two_node_document();
        document.attach(&mut stage, anchor);

        stage.set_subtree_material_opacity(anchor, 0.4);

        let mut checked = 0;
        stage.walk(|_, node, _, _| {
            if let NodeKind::Mesh(instance) = &node.kind {
                assert_eq!(instance.material.opacity, 0.4);
                assert!(instance.material.transparent);
                checked += 1;
            }
        });
        assert_eq!(checked, 2);
    }

    #[test]
    fn test_middle_of_triples() {
        let values = vec![0, 1, 2, 10, 11, 12];
        assert_eq!(middle_of_triples(values), vec![1, 11]);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let result = load_model(Path::new("/nonexistent/model.glb"));
        assert!(matches!(result, Err(ModelError::Import(_))));
    }
}
