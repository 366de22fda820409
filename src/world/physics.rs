//! Registry of named physical props.
//!
//! Every prop owns one physics body and one render proxy in the scene graph.
//! Proxies live under a shared pool node unless a local manipulator holds
//! them, in which case they are parented to that manipulator.

use std::collections::HashMap;
use glam::{Quat, Vec3};
use tracing::{debug, info};

use crate::networking::PeerId;
use crate::rendering::scene::{HitShape, NodeId, SceneGraph, SceneNode};
use crate::utils::math::Transform;
use crate::world::engine::{BodyHandle, BodyShape, BodyState, PhysicsBody, PhysicsEngine};
use crate::world::{WorldError, WorldResult};

/// Name of the scene node that parents every free prop
pub const POOL_NODE_NAME: &str = "physical-objects";

/// Who currently holds a tracked object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Holder {
    Free,
    Local { manipulator: usize },
    Remote { peer: PeerId, manipulator: u8 },
}

impl Holder {
    pub fn is_free(&self) -> bool {
        matches!(self, Holder::Free)
    }
}

/// Named interactive prop
#[derive(Debug, Clone)]
pub struct TrackedObject {
    pub name: String,
    pub body: BodyHandle,
    pub shape: BodyShape,
    pub mass: f32,
    pub proxy: NodeId,
    holder: Holder,
}

impl TrackedObject {
    pub fn holder(&self) -> &Holder {
        &self.holder
    }
}

pub struct PhysicsObjectRegistry {
    engine: PhysicsEngine,
    objects: HashMap<String, TrackedObject>,
    /// Creation order, for stable iteration
    order: Vec<String>,
    pool: NodeId,
}

impl PhysicsObjectRegistry {
    pub fn new(scene: &mut SceneGraph, engine: PhysicsEngine) -> Self {
        let pool = scene.add_node(SceneNode::group(Transform::IDENTITY).with_name(POOL_NODE_NAME));
        Self {
            engine,
            objects: HashMap::new(),
            order: Vec::new(),
            pool,
        }
    }

    /// Scene node that parents free props
    pub fn pool(&self) -> NodeId {
        self.pool
    }

    pub fn engine(&self) -> &PhysicsEngine {
        &self.engine
    }

    pub fn create_object(
        &mut self,
        scene: &mut SceneGraph,
        name: &str,
        shape: BodyShape,
        mass: f32,
        position: Vec3,
    ) -> WorldResult<&TrackedObject> {
        if self.objects.contains_key(name) {
            return Err(WorldError::DuplicateName { name: name.to_string() });
        }

        let hit_shape = match shape {
            BodyShape::Sphere { radius } => HitShape::Sphere { radius },
            BodyShape::Box { half_extents } => HitShape::Box { half_extents },
            BodyShape::Plane => return Err(WorldError::UnsupportedShape { name: name.to_string() }),
        };

        let body = self.engine.add_body(PhysicsBody::new(shape, mass, position));
        let proxy = scene.add_node(
            SceneNode::group(Transform::from_translation(position))
                .with_name(name)
                .with_parent(self.pool)
                .with_hit_shape(hit_shape),
        );

        info!("📦 Registered object '{}' ({:?}, {} kg) at {}", name, shape, mass, position);
        self.order.push(name.to_string());
        let object = self.objects.entry(name.to_string()).or_insert(TrackedObject {
            name: name.to_string(),
            body,
            shape,
            mass,
            proxy,
            holder: Holder::Free,
        });
        Ok(object)
    }

    /// 10 cm cube, 1 kg
    pub fn add_box(&mut self, scene: &mut SceneGraph, name: &str, position: Vec3) -> WorldResult<&TrackedObject> {
        self.create_object(scene, name, BodyShape::Box { half_extents: Vec3::splat(0.05) }, 1.0, position)
    }

    /// 10 cm radius ball, 5 kg
    pub fn add_sphere(&mut self, scene: &mut SceneGraph, name: &str, position: Vec3) -> WorldResult<&TrackedObject> {
        self.create_object(scene, name, BodyShape::Sphere { radius: 0.1 }, 5.0, position)
    }

    /// Static floor; not a tracked object and never grabbable
    pub fn add_ground_plane(&mut self, height: f32) -> BodyHandle {
        self.engine
            .add_body(PhysicsBody::new(BodyShape::Plane, 0.0, Vec3::new(0.0, height, 0.0)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.objects.contains_key(name)
    }

    pub fn object(&self, name: &str) -> Option<&TrackedObject> {
        self.objects.get(name)
    }

    /// Object names in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn proxy_node(&self, name: &str) -> WorldResult<NodeId> {
        self.get(name).map(|o| o.proxy)
    }

    pub fn name_for_proxy(&self, proxy: NodeId) -> Option<&str> {
        self.objects
            .values()
            .find(|o| o.proxy == proxy)
            .map(|o| o.name.as_str())
    }

    /// Proxies of objects nobody holds, in registration order
    pub fn free_proxies(&self) -> Vec<NodeId> {
        self.order
            .iter()
            .filter_map(|name| self.objects.get(name))
            .filter(|o| o.holder.is_free())
            .map(|o| o.proxy)
            .collect()
    }

    pub fn holder(&self, name: &str) -> WorldResult<&Holder> {
        self.get(name).map(|o| &o.holder)
    }

    /// Ownership is written by the grab state machine only
    pub(crate) fn set_holder(&mut self, name: &str, holder: Holder) -> WorldResult<()> {
        let object = self.get_mut(name)?;
        debug!("Holder of '{}': {:?} -> {:?}", name, object.holder, holder);
        object.holder = holder;
        Ok(())
    }

    pub fn body_state(&self, name: &str) -> WorldResult<BodyState> {
        let body = self.get(name)?.body;
        self.engine
            .state(body)
            .ok_or_else(|| WorldError::unknown_object(name))
    }

    pub fn set_velocity(&mut self, name: &str, velocity: Vec3) -> WorldResult<()> {
        self.modify_body(name, |state| state.linear_velocity = velocity)
    }

    pub fn set_angular_velocity(&mut self, name: &str, angular_velocity: Vec3) -> WorldResult<()> {
        self.modify_body(name, |state| state.angular_velocity = angular_velocity)
    }

    pub fn set_world_position(&mut self, name: &str, position: Vec3) -> WorldResult<()> {
        self.modify_body(name, |state| state.position = position)
    }

    pub fn set_world_quaternion(&mut self, name: &str, rotation: Quat) -> WorldResult<()> {
        let rotation = rotation.normalize();
        self.modify_body(name, |state| state.rotation = rotation)
    }

    /// Move the object's proxy back under the shared pool, keeping its world
    /// transform. Already pooled proxies are left untouched.
    pub fn reattach_render_proxy(&mut self, scene: &mut SceneGraph, name: &str) -> WorldResult<()> {
        let proxy = self.proxy_node(name)?;
        if scene.parent(proxy) == Some(self.pool) {
            return Ok(());
        }
        if !scene.attach(proxy, Some(self.pool)) {
            return Err(WorldError::UnknownNode { id: proxy });
        }
        debug!("Reattached '{}' to the object pool", name);
        Ok(())
    }

    /// Advance the simulation, then copy body transforms onto the proxies of
    /// objects nobody holds. Held proxies follow their manipulator instead.
    pub fn step_and_sync(&mut self, scene: &mut SceneGraph, dt: f32) {
        self.engine.step(dt);

        for name in &self.order {
            let Some(object) = self.objects.get(name) else { continue };
            if !object.holder.is_free() {
                continue;
            }
            if let Some(state) = self.engine.state(object.body) {
                scene.set_world_transform(object.proxy, Transform::new(state.position, state.rotation));
            }
        }
    }

    fn get(&self, name: &str) -> WorldResult<&TrackedObject> {
        self.objects.get(name).ok_or_else(|| WorldError::unknown_object(name))
    }

    fn get_mut(&mut self, name: &str) -> WorldResult<&mut TrackedObject> {
        self.objects.get_mut(name).ok_or_else(|| WorldError::unknown_object(name))
    }

    fn modify_body(&mut self, name: &str, f: impl FnOnce(&mut BodyState)) -> WorldResult<()> {
        let body = self.get(name)?.body;
        if self.engine.modify(body, f) {
            Ok(())
        } else {
            Err(WorldError::unknown_object(name))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PhysicsSettings;
    use crate::utils::math::approx;

    fn setup() -> (SceneGraph, PhysicsObjectRegistry) {
        let mut scene = SceneGraph::new();
        let registry = PhysicsObjectRegistry::new(&mut scene, PhysicsEngine::simple(&PhysicsSettings::default()));
        (scene, registry)
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let (mut scene, mut registry) = setup();
        registry.add_sphere(&mut scene, "ball", Vec3::Y).unwrap();
        let err = registry.add_box(&mut scene, "ball", Vec3::ZERO).unwrap_err();
        assert_eq!(err, WorldError::DuplicateName { name: "ball".to_string() });
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unknown_names_fail_without_side_effects() {
        let (mut scene, mut registry) = setup();
        registry.add_sphere(&mut scene, "ball", Vec3::Y).unwrap();
        let before = registry.body_state("ball").unwrap();

        assert!(matches!(registry.set_velocity("ghost", Vec3::X), Err(WorldError::UnknownObject { .. })));
        assert!(matches!(registry.set_angular_velocity("ghost", Vec3::X), Err(WorldError::UnknownObject { .. })));
        assert!(matches!(registry.set_world_position("ghost", Vec3::X), Err(WorldError::UnknownObject { .. })));
        assert!(matches!(registry.set_world_quaternion("ghost", Quat::IDENTITY), Err(WorldError::UnknownObject { .. })));
        assert!(matches!(registry.reattach_render_proxy(&mut scene, "ghost"), Err(WorldError::UnknownObject { .. })));

        assert_eq!(registry.body_state("ball").unwrap(), before);
    }

    #[test]
    fn test_set_commands_write_body_state() {
        let (mut scene, mut registry) = setup();
        registry.add_box(&mut scene, "box", Vec3::ZERO).unwrap();
        let rotation = Quat::from_rotation_z(0.3);

        registry.set_world_position("box", Vec3::new(1.0, 2.0, 3.0)).unwrap();
        registry.set_world_quaternion("box", rotation).unwrap();
        registry.set_velocity("box", Vec3::new(0.0, 4.0, 0.0)).unwrap();
        registry.set_angular_velocity("box", Vec3::new(0.0, 0.0, 1.0)).unwrap();

        let state = registry.body_state("box").unwrap();
        assert_eq!(state.position, Vec3::new(1.0, 2.0, 3.0));
        assert!(approx::quat_eq(state.rotation, rotation, approx::EPSILON));
        assert_eq!(state.linear_velocity, Vec3::new(0.0, 4.0, 0.0));
        assert_eq!(state.angular_velocity, Vec3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn test_step_syncs_free_objects_only() {
        let (mut scene, mut registry) = setup();
        registry.add_sphere(&mut scene, "free", Vec3::new(0.0, 1.0, 0.0)).unwrap();
        registry.add_sphere(&mut scene, "held", Vec3::new(1.0, 1.0, 0.0)).unwrap();
        registry.set_holder("held", Holder::Local { manipulator: 0 }).unwrap();

        let held_proxy = registry.proxy_node("held").unwrap();
        let held_before = scene.world_transform(held_proxy).unwrap();

        registry.step_and_sync(&mut scene, 1.0 / 60.0);

        let free_proxy = registry.proxy_node("free").unwrap();
        let free_world = scene.world_transform(free_proxy).unwrap();
        assert_eq!(free_world.translation, registry.body_state("free").unwrap().position);
        assert!(free_world.translation.y < 1.0);
        assert_eq!(scene.world_transform(held_proxy).unwrap(), held_before);
    }

    #[test]
    fn test_reattach_is_idempotent_for_pooled_proxies() {
        let (mut scene, mut registry) = setup();
        registry.add_box(&mut scene, "box", Vec3::new(0.2, 0.4, 0.6)).unwrap();
        let proxy = registry.proxy_node("box").unwrap();
        let before = scene.world_transform(proxy).unwrap();

        registry.reattach_render_proxy(&mut scene, "box").unwrap();
        registry.reattach_render_proxy(&mut scene, "box").unwrap();

        let after = scene.world_transform(proxy).unwrap();
        assert_eq!(scene.parent(proxy), Some(registry.pool()));
        assert!(approx::vec3_eq(before.translation, after.translation, approx::EPSILON));
        assert!(approx::quat_eq(before.rotation, after.rotation, approx::EPSILON));
    }

    #[test]
    fn test_names_keep_registration_order() {
        let (mut scene, mut registry) = setup();
        registry.add_box(&mut scene, "box", Vec3::ZERO).unwrap();
        registry.add_sphere(&mut scene, "sphere", Vec3::ZERO).unwrap();
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["box", "sphere"]);
        assert_eq!(registry.free_proxies().len(), 2);
    }
}
