//! Grab/release ownership protocol.
//!
//! Each local manipulator (hand controller, or the desktop pointer) is either
//! free or holding one object. Objects can also be held by a remote peer's
//! manipulator. An object is held by at most one manipulator at a time and a
//! held object is never stolen: local grabs only consider free objects, and a
//! remote grab for an object that is already held is ignored.

use std::collections::HashMap;
use glam::Vec3;
use tracing::{debug, info, warn};

use crate::config::GrabSettings;
use crate::networking::PeerId;
use crate::rendering::scene::{NodeId, SceneGraph};
use crate::utils::math::Transform;
use crate::world::events::{GrabObjectEvent, ReleaseObjectEvent};
use crate::world::physics::{Holder, PhysicsObjectRegistry};
use crate::world::throw::ThrowVelocityEstimator;
use crate::world::{WorldError, WorldResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManipulatorState {
    Free,
    HeldLocal { object: String },
}

/// Pointer ray feedback for a free manipulator
#[derive(Debug, Clone, PartialEq)]
pub struct HoverState {
    pub target: Option<String>,
    pub ray_length: f32,
}

/// A hand controller or pointer that can hold one object
#[derive(Debug, Clone)]
pub struct Manipulator {
    pub index: usize,
    pub node: NodeId,
    pub tracking_point: Option<NodeId>,
    held: Option<String>,
    estimator: ThrowVelocityEstimator,
    hover: HoverState,
}

impl Manipulator {
    pub fn state(&self) -> ManipulatorState {
        match &self.held {
            Some(object) => ManipulatorState::HeldLocal { object: object.clone() },
            None => ManipulatorState::Free,
        }
    }

    pub fn held(&self) -> Option<&str> {
        self.held.as_deref()
    }

    pub fn hover(&self) -> &HoverState {
        &self.hover
    }

    pub fn estimator(&self) -> &ThrowVelocityEstimator {
        &self.estimator
    }
}

/// Bookkeeping for an object a remote peer is holding
#[derive(Debug, Clone)]
struct RemoteHold {
    peer: PeerId,
    manipulator: u8,
    /// Object transform relative to the remote hand at grab time
    offset: Option<Transform>,
}

pub struct GrabReleaseStateMachine {
    manipulators: Vec<Manipulator>,
    remote_holds: HashMap<String, RemoteHold>,
    throw_window: usize,
    max_ray_length: f32,
    reset_throw_history_on_grab: bool,
}

impl GrabReleaseStateMachine {
    pub fn new(settings: &GrabSettings) -> Self {
        Self {
            manipulators: Vec::new(),
            remote_holds: HashMap::new(),
            throw_window: settings.throw_window,
            max_ray_length: settings.max_ray_length,
            reset_throw_history_on_grab: settings.reset_throw_history_on_grab,
        }
    }

    pub fn add_manipulator(&mut self, node: NodeId, tracking_point: Option<NodeId>) -> usize {
        let index = self.manipulators.len();
        if tracking_point.is_none() {
            warn!("Manipulator {} has no velocity tracking point, throws will have zero velocity", index);
        }
        self.manipulators.push(Manipulator {
            index,
            node,
            tracking_point,
            held: None,
            estimator: ThrowVelocityEstimator::new(self.throw_window),
            hover: HoverState {
                target: None,
                ray_length: self.max_ray_length,
            },
        });
        index
    }

    /// Drop every manipulator; callers release held objects first
    pub fn clear_manipulators(&mut self) {
        if self.manipulators.iter().any(|m| m.held.is_some()) {
            warn!("Clearing manipulators that still hold objects");
        }
        self.manipulators.clear();
    }

    pub fn manipulator(&self, index: usize) -> Option<&Manipulator> {
        self.manipulators.get(index)
    }

    pub fn manipulators(&self) -> &[Manipulator] {
        &self.manipulators
    }

    /// Objects held by a remote peer, with the holding manipulator index
    pub fn remote_holds(&self) -> impl Iterator<Item = (&str, &PeerId, u8)> {
        self.remote_holds
            .iter()
            .map(|(name, hold)| (name.as_str(), &hold.peer, hold.manipulator))
    }

    /// Try to pick up the nearest free object along the manipulator's ray.
    ///
    /// Returns the event to broadcast on success, `None` on a miss or when the
    /// manipulator is already holding something.
    pub fn grab(
        &mut self,
        scene: &mut SceneGraph,
        registry: &mut PhysicsObjectRegistry,
        index: usize,
    ) -> WorldResult<Option<GrabObjectEvent>> {
        let manipulator = self
            .manipulators
            .get(index)
            .ok_or(WorldError::UnknownManipulator { index })?;
        if let Some(held) = &manipulator.held {
            debug!("Manipulator {} already holds '{}'", index, held);
            return Ok(None);
        }

        let ray = scene
            .world_transform(manipulator.node)
            .ok_or(WorldError::UnknownNode { id: manipulator.node })?;
        let candidates = registry.free_proxies();
        let hits = scene.intersect_ray(ray.translation, ray.forward(), &candidates);
        let Some(hit) = hits.first() else {
            debug!("Manipulator {} grabbed at nothing", index);
            return Ok(None);
        };
        let Some(name) = registry.name_for_proxy(hit.node).map(str::to_string) else {
            return Ok(None);
        };
        if !registry.holder(&name)?.is_free() {
            info!("Grab of '{}' rejected, already held", name);
            return Ok(None);
        }

        let object_position = scene
            .world_transform(hit.node)
            .map(|t| t.translation)
            .ok_or(WorldError::UnknownNode { id: hit.node })?;

        // Zero velocity before reparenting so the stale velocity never shows
        registry.set_velocity(&name, Vec3::ZERO)?;
        registry.set_angular_velocity(&name, Vec3::ZERO)?;
        scene.attach(hit.node, Some(manipulator.node));
        registry.set_holder(&name, Holder::Local { manipulator: index })?;

        let tracking_position = manipulator
            .tracking_point
            .and_then(|tp| scene.world_transform(tp))
            .map(|t| t.translation);
        let reset_history = self.reset_throw_history_on_grab;
        let max_ray_length = self.max_ray_length;

        let manipulator = &mut self.manipulators[index];
        if reset_history {
            manipulator.estimator.clear();
        }
        if let Some(position) = tracking_position {
            manipulator.estimator.reseed(position);
        }
        manipulator.held = Some(name.clone());
        manipulator.hover = HoverState {
            target: None,
            ray_length: max_ray_length,
        };

        info!("✋ Manipulator {} grabbed '{}' at {}", index, name, object_position);
        Ok(Some(GrabObjectEvent::new(name, index, object_position)))
    }

    /// Let go of the held object, handing it back to physics with the
    /// estimated throw velocity.
    pub fn release(
        &mut self,
        scene: &mut SceneGraph,
        registry: &mut PhysicsObjectRegistry,
        index: usize,
    ) -> WorldResult<Option<ReleaseObjectEvent>> {
        let manipulator = self
            .manipulators
            .get_mut(index)
            .ok_or(WorldError::UnknownManipulator { index })?;
        let Some(name) = manipulator.held.take() else {
            return Ok(None);
        };
        let velocity = manipulator.estimator.estimate_release_velocity();

        let proxy = registry.proxy_node(&name)?;
        let world = scene
            .world_transform(proxy)
            .ok_or(WorldError::UnknownNode { id: proxy })?;

        // Snap the body to where the hand left it before the proxy goes back to the pool
        registry.set_world_position(&name, world.translation)?;
        registry.set_world_quaternion(&name, world.rotation)?;
        registry.set_velocity(&name, velocity)?;
        registry.reattach_render_proxy(scene, &name)?;
        registry.set_holder(&name, Holder::Free)?;

        info!("🤾 Manipulator {} released '{}' with velocity {}", index, name, velocity);
        Ok(Some(ReleaseObjectEvent {
            object_name: name,
            manipulator_index: index,
            object_position: world.translation,
            object_quaternion: world.rotation,
            object_velocity: velocity,
        }))
    }

    /// Release everything held locally, e.g. before switching user rigs
    pub fn release_all_local(
        &mut self,
        scene: &mut SceneGraph,
        registry: &mut PhysicsObjectRegistry,
    ) -> Vec<ReleaseObjectEvent> {
        let mut events = Vec::new();
        for index in 0..self.manipulators.len() {
            match self.release(scene, registry, index) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(e) => warn!("Failed to release manipulator {}: {}", index, e),
            }
        }
        events
    }

    /// Per-tick work: throw sampling for holding manipulators, ray feedback for free ones
    pub fn update(&mut self, scene: &SceneGraph, registry: &PhysicsObjectRegistry, dt: f32) {
        let candidates = registry.free_proxies();
        let max_ray_length = self.max_ray_length;

        for manipulator in &mut self.manipulators {
            if manipulator.held.is_some() {
                match manipulator.tracking_point.and_then(|tp| scene.world_transform(tp)) {
                    Some(point) => {
                        manipulator.estimator.sample(point.translation, dt);
                    }
                    None => {
                        let err = WorldError::MissingTrackingPoint { manipulator: manipulator.index };
                        debug!("{}, sampling zero velocity", err);
                        manipulator.estimator.push(Vec3::ZERO);
                    }
                }
                continue;
            }

            let Some(ray) = scene.world_transform(manipulator.node) else {
                continue;
            };
            let hit = scene
                .intersect_ray(ray.translation, ray.forward(), &candidates)
                .into_iter()
                .find(|hit| hit.distance <= max_ray_length);
            manipulator.hover = match hit {
                Some(hit) => HoverState {
                    target: registry.name_for_proxy(hit.node).map(str::to_string),
                    ray_length: hit.distance,
                },
                None => HoverState {
                    target: None,
                    ray_length: max_ray_length,
                },
            };
        }
    }

    /// A peer picked up an object. Returns whether ownership changed.
    ///
    /// `remote_hand` is the peer's last known hand transform, used to keep the
    /// object attached to it as new poses arrive.
    pub fn apply_remote_grab(
        &mut self,
        scene: &mut SceneGraph,
        registry: &mut PhysicsObjectRegistry,
        peer: &PeerId,
        event: &GrabObjectEvent,
        remote_hand: Option<Transform>,
    ) -> WorldResult<bool> {
        let name = event.object_name.as_str();
        let manipulator = u8::try_from(event.manipulator_index).unwrap_or(u8::MAX);

        match registry.holder(name)? {
            Holder::Free => {}
            Holder::Remote { peer: owner, manipulator: m } if owner == peer && *m == manipulator => {
                debug!("Duplicate grab of '{}' from {}", name, peer);
                return Ok(false);
            }
            holder => {
                info!("⚔️ Grab race on '{}': held by {:?}, ignoring grab from {}", name, holder, peer);
                return Ok(false);
            }
        }

        let proxy = registry.proxy_node(name)?;
        let rotation = scene.world_transform(proxy).map_or(glam::Quat::IDENTITY, |t| t.rotation);
        let world = Transform::new(event.object_position, rotation);

        registry.set_world_position(name, event.object_position)?;
        registry.set_velocity(name, Vec3::ZERO)?;
        registry.set_angular_velocity(name, Vec3::ZERO)?;
        scene.set_world_transform(proxy, world);
        registry.set_holder(name, Holder::Remote { peer: peer.clone(), manipulator })?;

        self.remote_holds.insert(
            name.to_string(),
            RemoteHold {
                peer: peer.clone(),
                manipulator,
                offset: remote_hand.map(|hand| hand.inverse() * world),
            },
        );

        info!("🌐 {} grabbed '{}' with manipulator {}", peer, name, manipulator);
        Ok(true)
    }

    /// A peer let go of an object it holds. Returns whether it was applied.
    pub fn apply_remote_release(
        &mut self,
        scene: &mut SceneGraph,
        registry: &mut PhysicsObjectRegistry,
        peer: &PeerId,
        event: &ReleaseObjectEvent,
    ) -> WorldResult<bool> {
        let name = event.object_name.as_str();
        let manipulator = u8::try_from(event.manipulator_index).unwrap_or(u8::MAX);

        match registry.holder(name)? {
            Holder::Remote { peer: owner, manipulator: m } if owner == peer && *m == manipulator => {}
            holder => {
                info!("Ignoring release of '{}' from {}: held by {:?}", name, peer, holder);
                return Ok(false);
            }
        }

        registry.set_world_position(name, event.object_position)?;
        registry.set_world_quaternion(name, event.object_quaternion)?;
        registry.set_velocity(name, event.object_velocity)?;
        let proxy = registry.proxy_node(name)?;
        scene.set_world_transform(proxy, Transform::new(event.object_position, event.object_quaternion.normalize()));
        registry.reattach_render_proxy(scene, name)?;
        registry.set_holder(name, Holder::Free)?;
        self.remote_holds.remove(name);

        info!("🌐 {} released '{}' with velocity {}", peer, name, event.object_velocity);
        Ok(true)
    }

    /// Keep objects held by `peer` at their grab-time offset from its hands
    pub fn follow_remote_hands(
        &mut self,
        scene: &mut SceneGraph,
        registry: &mut PhysicsObjectRegistry,
        peer: &PeerId,
        hands: &[Transform; 2],
    ) {
        for (name, hold) in self.remote_holds.iter().filter(|(_, h)| &h.peer == peer) {
            let Some(offset) = hold.offset else { continue };
            let Some(hand) = hands.get(hold.manipulator as usize) else { continue };
            let world = *hand * offset;

            let applied = registry.proxy_node(name).map(|proxy| scene.set_world_transform(proxy, world));
            let synced = registry
                .set_world_position(name, world.translation)
                .and_then(|_| registry.set_world_quaternion(name, world.rotation))
                .and_then(|_| registry.set_velocity(name, Vec3::ZERO));
            if let Err(e) = applied.and(synced) {
                warn!("Failed to move '{}' with {}'s hand: {}", name, peer, e);
            }
        }
    }

    /// Hand every object held by `peer` back to physics where it currently is
    pub fn release_all_for_peer(
        &mut self,
        scene: &mut SceneGraph,
        registry: &mut PhysicsObjectRegistry,
        peer: &PeerId,
    ) -> Vec<String> {
        let names: Vec<String> = self
            .remote_holds
            .iter()
            .filter(|(_, hold)| &hold.peer == peer)
            .map(|(name, _)| name.clone())
            .collect();

        let mut released = Vec::new();
        for name in names {
            self.remote_holds.remove(&name);
            let result = registry.proxy_node(&name).and_then(|proxy| {
                let world = scene.world_transform(proxy).ok_or(WorldError::UnknownNode { id: proxy })?;
                registry.set_world_position(&name, world.translation)?;
                registry.set_world_quaternion(&name, world.rotation)?;
                registry.set_velocity(&name, Vec3::ZERO)?;
                registry.set_angular_velocity(&name, Vec3::ZERO)?;
                registry.set_holder(&name, Holder::Free)
            });
            match result {
                Ok(()) => {
                    info!("🔓 Released '{}' held by departed peer {}", name, peer);
                    released.push(name);
                }
                Err(e) => warn!("Failed to release '{}' for {}: {}", name, peer, e),
            }
        }
        released
    }
}
