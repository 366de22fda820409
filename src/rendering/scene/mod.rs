pub mod graph;

pub use graph::SceneGraph;

use glam::Vec3;
use crate::utils::math::Transform;

/// Handle to a node in the scene graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// Geometry used for ray hit testing
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HitShape {
    Sphere { radius: f32 },
    Box { half_extents: Vec3 },
}

#[derive(Debug, Clone)]
pub struct SceneNode {
    pub name: Option<String>,
    pub parent: Option<NodeId>,
    pub local: Transform,
    pub hit_shape: Option<HitShape>,
}

impl SceneNode {
    pub fn group(local: Transform) -> Self {
        Self {
            name: None,
            parent: None,
            local,
            hit_shape: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_parent(mut self, parent: NodeId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_hit_shape(mut self, shape: HitShape) -> Self {
        self.hit_shape = Some(shape);
        self
    }
}

/// Result of a ray query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub node: NodeId,
    pub distance: f32,
}
