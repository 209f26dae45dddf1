//! Stage graph
//!
//! Pure-data scene container: named nodes with local transforms arranged in
//! a tree, carrying media planes, model meshes, or lights. The graph knows
//! nothing about the GPU; the render layer walks it each frame, and the
//! test suite drives it directly.

use std::collections::HashMap;

use glam::{Mat4, Quat, Vec3};

pub mod animation;
pub mod model;
pub mod plane;
pub mod transform;

pub use animation::{AnimationClip, Mixer, MixerRegistry};
pub use model::{load_model, AttachedModel, MeshInstance, ModelDocument, ModelError};
pub use plane::{ImageSource, MediaPlane, PlaneSource, StageVertex, VideoSource, REFERENCE_WIDTH};
pub use transform::{ResolvedTransform, SmoothedPosition, SMOOTHING};

/// Identifier of a node in the stage graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

/// Local transform of a stage node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeTransform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for NodeTransform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl NodeTransform {
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

/// Light attached to a stage node
///
/// Point lights take their position from the node transform.
#[derive(Debug, Clone, Copy)]
pub enum Light {
    Ambient { color: [f32; 3], intensity: f32 },
    Point { color: [f32; 3], intensity: f32, range: f32 },
}

/// What a stage node carries
pub enum NodeKind {
    /// Pure grouping node
    Group,
    Plane(MediaPlane),
    Mesh(MeshInstance),
    Light(Light),
}

/// A node in the stage graph
pub struct StageNode {
    pub name: String,
    pub kind: NodeKind,
    pub local: NodeTransform,
    /// Node opacity, multiplied down the tree during traversal
    pub opacity: f32,
    pub visible: bool,
    children: Vec<NodeId>,
}

impl StageNode {
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// The scene container
///
/// Cleared wholesale on session disposal; dropping a video plane node joins
/// its decode thread.
pub struct Stage {
    nodes: HashMap<NodeId, StageNode>,
    roots: Vec<NodeId>,
    next_id: u32,
}

impl Default for Stage {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            roots: Vec::new(),
            next_id: 0,
        }
    }

    /// Add a node under `parent`, or at the root when `parent` is None
    pub fn add_node(
        &mut self,
        parent: Option<NodeId>,
        name: impl Into<String>,
        kind: NodeKind,
    ) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;

        self.nodes.insert(
            id,
            StageNode {
                name: name.into(),
                kind,
                local: NodeTransform::default(),
                opacity: 1.0,
                visible: true,
                children: Vec::new(),
            },
        );

        match parent.and_then(|p| self.nodes.get_mut(&p)) {
            Some(parent_node) => parent_node.children.push(id),
            None => self.roots.push(id),
        }

        id
    }

    /// Add a grouping node
    pub fn add_group(&mut self, parent: Option<NodeId>, name: impl Into<String>) -> NodeId {
        self.add_node(parent, name, NodeKind::Group)
    }

    pub fn node(&self, id: NodeId) -> Option<&StageNode> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut StageNode> {
        self.nodes.get_mut(&id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Drop every node
    ///
    /// Node ids stay monotonic so ids from a disposed session never alias
    /// nodes of the next one.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.roots.clear();
    }

    /// Update a node's position and rotation, keeping its scale
    pub fn set_pose(&mut self, id: NodeId, position: Vec3, rotation: Quat) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.local.position = position;
            node.local.rotation = rotation;
        }
    }

    pub fn set_position(&mut self, id: NodeId, position: Vec3) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.local.position = position;
        }
    }

    pub fn set_visible(&mut self, id: NodeId, visible: bool) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.visible = visible;
        }
    }

    pub fn is_visible(&self, id: NodeId) -> bool {
        self.nodes.get(&id).map(|n| n.visible).unwrap_or(false)
    }

    /// Depth-first traversal with accumulated world transform and opacity
    ///
    /// Invisible subtrees are skipped entirely.
    pub fn walk<F: FnMut(NodeId, &StageNode, Mat4, f32)>(&self, mut visit: F) {
        for &root in &self.roots {
            self.walk_node(root, Mat4::IDENTITY, 1.0, &mut visit);
        }
    }

    fn walk_node<F: FnMut(NodeId, &StageNode, Mat4, f32)>(
        &self,
        id: NodeId,
        parent_matrix: Mat4,
        parent_opacity: f32,
        visit: &mut F,
    ) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        if !node.visible {
            return;
        }

        let world = parent_matrix * node.local.matrix();
        let opacity = parent_opacity * node.opacity;
        visit(id, node, world, opacity);

        for &child in &node.children {
            self.walk_node(child, world, opacity, visit);
        }
    }

    /// Set material opacity on every mesh under `root`, enabling transparency
    pub fn set_subtree_material_opacity(&mut self, root: NodeId, opacity: f32) {
        let mut pending = vec![root];
        while let Some(id) = pending.pop() {
            let Some(node) = self.nodes.get_mut(&id) else {
                continue;
            };
            pending.extend(node.children.iter().copied());
            if let NodeKind::Mesh(instance) = &mut node.kind {
                instance.material.opacity = opacity;
                instance.material.transparent = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_empties_stage() {
        let mut stage = Stage::new();
        let group = stage.add_group(None, "anchor");
        stage.add_group(Some(group), "inner");
        assert_eq!(stage.node_count(), 2);

        stage.clear();
        assert_eq!(stage.node_count(), 0);
        assert!(stage.roots().is_empty());
    }

    #[test]
    fn test_node_ids_stay_unique_across_clear() {
        let mut stage = Stage::new();
        let before = stage.add_group(None, "a");
        stage.clear();
        let after = stage.add_group(None, "b");
        assert_ne!(before, after);
    }

    #[test]
    fn test_walk_multiplies_opacity() {
        let mut stage = Stage::new();
        let root = stage.add_group(None, "root");
        let child = stage.add_group(Some(root), "child");
        stage.node_mut(root).unwrap().opacity = 0.5;
        stage.node_mut(child).unwrap().opacity = 0.4;

        let mut seen = Vec::new();
        stage.walk(|id, _, _, opacity| seen.push((id, opacity)));
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], (root, 0.5));
        assert!((seen[1].1 - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_walk_skips_hidden_subtree() {
        let mut stage = Stage::new();
        let root = stage.add_group(None, "root");
        let hidden = stage.add_group(Some(root), "hidden");
        stage.add_group(Some(hidden), "inner");
        stage.set_visible(hidden, false);

        let mut count = 0;
        stage.walk(|_, _, _, _| count += 1);
        assert_eq!(count, 1);
    }

    #[test]
    fn test_walk_accumulates_transforms() {
        let mut stage = Stage::new();
        let root = stage.add_group(None, "root");
        let child = stage.add_group(Some(root), "child");
        stage.set_position(root, Vec3::new(1.0, 0.0, 0.0));
        stage.set_position(child, Vec3::new(0.0, 1.0, 0.0));

        let mut child_world = Vec3::ZERO;
        stage.walk(|id, _, world, _| {
            if id == child {
                child_world = world.transform_point3(Vec3::ZERO);
            }
        });
        assert!(child_world.distance(Vec3::new(1.0, 1.0, 0.0)) < 1e-6);
    }

    #[test]
    fn test_set_pose_keeps_scale() {
        let mut stage = Stage::new();
        let node = stage.add_group(None, "anchor");
        stage.node_mut(node).unwrap().local.scale = Vec3::splat(2.0);

        stage.set_pose(node, Vec3::new(3.0, 0.0, 0.0), Quat::IDENTITY);
        let local = stage.node(node).unwrap().local;
        assert_eq!(local.position, Vec3::new(3.0, 0.0, 0.0));
        assert_eq!(local.scale, Vec3::splat(2.0));
    }
}
