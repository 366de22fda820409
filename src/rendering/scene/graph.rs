use std::collections::HashMap;
use glam::Vec3;
use tracing::warn;

use crate::rendering::scene::{HitShape, NodeId, RayHit, SceneNode};
use crate::utils::math::Transform;

/// Minimal scene graph: parent links, local transforms and ray queries.
///
/// Only what grabbing needs from a renderer is modelled: world transform
/// reads, `three.js`-style `attach` and ray hit testing.
pub struct SceneGraph {
    nodes: HashMap<NodeId, SceneNode>,
    next_id: u32,
}

impl SceneGraph {
    pub fn new() -> Self {
        SceneGraph {
            nodes: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn add_node(&mut self, node: SceneNode) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        let node = match node.parent {
            Some(parent) if !self.nodes.contains_key(&parent) => {
                warn!("Parent {:?} does not exist, adding node at the root", parent);
                SceneNode { parent: None, ..node }
            }
            _ => node,
        };
        self.nodes.insert(id, node);
        id
    }

    /// Remove a node together with its whole subtree
    pub fn remove_node(&mut self, id: NodeId) -> Option<SceneNode> {
        for child in self.children(id) {
            self.remove_node(child);
        }
        self.nodes.remove(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    /// Children of `id`, ordered by creation
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let mut children: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.parent == Some(id))
            .map(|(child, _)| *child)
            .collect();
        children.sort();
        children
    }

    pub fn find_child_by_name(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.children(parent)
            .into_iter()
            .find(|child| self.nodes.get(child).and_then(|n| n.name.as_deref()) == Some(name))
    }

    pub fn local_transform(&self, id: NodeId) -> Option<Transform> {
        self.nodes.get(&id).map(|n| n.local)
    }

    pub fn set_local_transform(&mut self, id: NodeId, local: Transform) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) => {
                node.local = local;
                true
            }
            None => false,
        }
    }

    pub fn world_transform(&self, id: NodeId) -> Option<Transform> {
        let node = self.nodes.get(&id)?;
        match node.parent {
            Some(parent) => Some(self.world_transform(parent)? * node.local),
            None => Some(node.local),
        }
    }

    /// Place a node in world space regardless of its parent
    pub fn set_world_transform(&mut self, id: NodeId, world: Transform) -> bool {
        let parent_world = match self.parent(id) {
            Some(parent) => self.world_transform(parent).unwrap_or_default(),
            None => Transform::IDENTITY,
        };
        self.set_local_transform(id, parent_world.inverse() * world)
    }

    /// Reparent `child` under `new_parent`, keeping its world transform
    pub fn attach(&mut self, child: NodeId, new_parent: Option<NodeId>) -> bool {
        if let Some(parent) = new_parent {
            if !self.nodes.contains_key(&parent) || self.is_ancestor(child, parent) {
                return false;
            }
        }
        let Some(world) = self.world_transform(child) else {
            return false;
        };
        let parent_world = match new_parent {
            Some(parent) => self.world_transform(parent).unwrap_or_default(),
            None => Transform::IDENTITY,
        };
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = new_parent;
            node.local = parent_world.inverse() * world;
        }
        true
    }

    fn is_ancestor(&self, ancestor: NodeId, mut id: NodeId) -> bool {
        loop {
            if id == ancestor {
                return true;
            }
            match self.parent(id) {
                Some(parent) => id = parent,
                None => return false,
            }
        }
    }

    /// Ray against the bounding sphere of each candidate's hit shape.
    /// Hits are returned nearest first; nodes without a shape are skipped.
    pub fn intersect_ray(&self, origin: Vec3, direction: Vec3, candidates: &[NodeId]) -> Vec<RayHit> {
        let direction = direction.normalize_or_zero();
        if direction == Vec3::ZERO {
            return Vec::new();
        }

        let mut hits: Vec<RayHit> = candidates
            .iter()
            .filter_map(|id| {
                let shape = self.nodes.get(id)?.hit_shape?;
                let center = self.world_transform(*id)?.translation;
                ray_sphere(origin, direction, center, shape.bounding_radius())
                    .map(|distance| RayHit { node: *id, distance })
            })
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits
    }
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Distance along a normalized ray to the first sphere intersection in front of the origin
fn ray_sphere(origin: Vec3, direction: Vec3, center: Vec3, radius: f32) -> Option<f32> {
    let to_center = center - origin;
    let along = to_center.dot(direction);
    let closest_sq = to_center.length_squared() - along * along;
    let radius_sq = radius * radius;
    if closest_sq > radius_sq {
        return None;
    }
    let half_chord = (radius_sq - closest_sq).sqrt();
    let near = along - half_chord;
    let far = along + half_chord;
    if near >= 0.0 {
        Some(near)
    } else if far >= 0.0 {
        // Origin inside the sphere
        Some(0.0)
    } else {
        None
    }
}

impl HitShape {
    pub fn bounding_radius(&self) -> f32 {
        match *self {
            HitShape::Sphere { radius } => radius,
            HitShape::Box { half_extents } => half_extents.length(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::math::approx;
    use glam::Quat;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_world_transform_composes_parents() {
        let mut scene = SceneGraph::new();
        let parent = scene.add_node(SceneNode::group(Transform::new(
            Vec3::new(1.0, 0.0, 0.0),
            Quat::from_rotation_y(FRAC_PI_2),
        )));
        let child = scene.add_node(SceneNode::group(Transform::from_translation(Vec3::new(0.0, 0.0, -1.0))).with_parent(parent));

        let world = scene.world_transform(child).unwrap();
        assert!(approx::vec3_eq(world.translation, Vec3::new(0.0, 0.0, 0.0), approx::EPSILON));
    }

    #[test]
    fn test_attach_preserves_world_transform() {
        let mut scene = SceneGraph::new();
        let hand = scene.add_node(SceneNode::group(Transform::new(
            Vec3::new(0.5, 1.2, -0.3),
            Quat::from_rotation_x(0.4),
        )));
        let ball = scene.add_node(SceneNode::group(Transform::from_translation(Vec3::new(0.0, 1.0, 0.0))));

        let before = scene.world_transform(ball).unwrap();
        assert!(scene.attach(ball, Some(hand)));
        let after = scene.world_transform(ball).unwrap();

        assert_eq!(scene.parent(ball), Some(hand));
        assert!(approx::vec3_eq(before.translation, after.translation, approx::EPSILON));
        assert!(approx::quat_eq(before.rotation, after.rotation, approx::EPSILON));
    }

    #[test]
    fn test_attach_rejects_cycles() {
        let mut scene = SceneGraph::new();
        let a = scene.add_node(SceneNode::group(Transform::IDENTITY));
        let b = scene.add_node(SceneNode::group(Transform::IDENTITY).with_parent(a));
        assert!(!scene.attach(a, Some(b)));
        assert_eq!(scene.parent(a), None);
    }

    #[test]
    fn test_intersect_ray_sorted_by_distance() {
        let mut scene = SceneGraph::new();
        let far = scene.add_node(
            SceneNode::group(Transform::from_translation(Vec3::new(0.0, 0.0, -3.0)))
                .with_hit_shape(HitShape::Sphere { radius: 0.1 }),
        );
        let near = scene.add_node(
            SceneNode::group(Transform::from_translation(Vec3::new(0.0, 0.0, -1.0)))
                .with_hit_shape(HitShape::Sphere { radius: 0.1 }),
        );
        let off_axis = scene.add_node(
            SceneNode::group(Transform::from_translation(Vec3::new(1.0, 0.0, -1.0)))
                .with_hit_shape(HitShape::Sphere { radius: 0.1 }),
        );

        let hits = scene.intersect_ray(Vec3::ZERO, Vec3::NEG_Z, &[far, near, off_axis]);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].node, near);
        assert!((hits[0].distance - 0.9).abs() < 1e-4);
        assert_eq!(hits[1].node, far);
    }

    #[test]
    fn test_remove_node_drops_subtree() {
        let mut scene = SceneGraph::new();
        let root = scene.add_node(SceneNode::group(Transform::IDENTITY));
        let child = scene.add_node(SceneNode::group(Transform::IDENTITY).with_parent(root));
        scene.remove_node(root);
        assert!(!scene.contains(child));
        assert!(scene.is_empty());
    }
}
