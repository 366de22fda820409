//! Rapier integration for the physics engine abstraction.

use glam::{Quat, Vec3};
use rapier3d::na::{Quaternion, UnitQuaternion};
use rapier3d::prelude::*;
use tracing::warn;

use crate::config::PhysicsSettings;
use crate::world::engine::{BodyHandle, BodyShape, BodyState, PhysicsBody, StepClock};

pub struct RapierWorld {
    gravity: Vector<Real>,
    integration_parameters: IntegrationParameters,
    physics_pipeline: PhysicsPipeline,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    rigid_body_set: RigidBodySet,
    collider_set: ColliderSet,
    impulse_joint_set: ImpulseJointSet,
    multibody_joint_set: MultibodyJointSet,
    ccd_solver: CCDSolver,
    clock: StepClock,
    restitution: f32,
    handles: Vec<RigidBodyHandle>,
}

impl RapierWorld {
    pub fn new(settings: &PhysicsSettings) -> Self {
        let clock = StepClock::new(settings.fixed_timestep, settings.max_substeps);
        let mut integration_parameters = IntegrationParameters::default();
        integration_parameters.dt = clock.fixed_timestep();

        let [gx, gy, gz] = settings.gravity;
        Self {
            gravity: vector![gx, gy, gz],
            integration_parameters,
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            clock,
            restitution: settings.restitution,
            handles: Vec::new(),
        }
    }

    pub fn add_body(&mut self, body: PhysicsBody) -> BodyHandle {
        let p = body.state.position;
        let builder = if body.is_dynamic() {
            RigidBodyBuilder::dynamic()
        } else {
            RigidBodyBuilder::fixed()
        };
        let handle = self
            .rigid_body_set
            .insert(builder.translation(vector![p.x, p.y, p.z]).build());

        let collider = match body.shape() {
            BodyShape::Sphere { radius } => ColliderBuilder::ball(radius),
            BodyShape::Box { half_extents } => {
                ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z)
            }
            BodyShape::Plane => ColliderBuilder::halfspace(Vector::y_axis()),
        };
        let collider = if body.is_dynamic() {
            collider.mass(body.mass())
        } else {
            collider
        };
        self.collider_set.insert_with_parent(
            collider.restitution(self.restitution).build(),
            handle,
            &mut self.rigid_body_set,
        );

        self.handles.push(handle);
        BodyHandle(self.handles.len() - 1)
    }

    pub fn state(&self, handle: BodyHandle) -> Option<BodyState> {
        let body = self.rigid_body_set.get(*self.handles.get(handle.0)?)?;
        let t = body.translation();
        let r = body.rotation();
        let v = body.linvel();
        let w = body.angvel();
        Some(BodyState {
            position: Vec3::new(t.x, t.y, t.z),
            rotation: Quat::from_xyzw(r.i, r.j, r.k, r.w),
            linear_velocity: Vec3::new(v.x, v.y, v.z),
            angular_velocity: Vec3::new(w.x, w.y, w.z),
        })
    }

    pub fn modify(&mut self, handle: BodyHandle, f: impl FnOnce(&mut BodyState)) -> bool {
        let Some(mut state) = self.state(handle) else {
            warn!("Rapier body {:?} does not exist", handle);
            return false;
        };
        f(&mut state);

        let Some(body) = self
            .handles
            .get(handle.0)
            .and_then(|h| self.rigid_body_set.get_mut(*h))
        else {
            return false;
        };
        let p = state.position;
        let q = state.rotation;
        let v = state.linear_velocity;
        let w = state.angular_velocity;
        body.set_translation(vector![p.x, p.y, p.z], true);
        body.set_rotation(UnitQuaternion::new_normalize(Quaternion::new(q.w, q.x, q.y, q.z)), true);
        body.set_linvel(vector![v.x, v.y, v.z], true);
        body.set_angvel(vector![w.x, w.y, w.z], true);
        true
    }

    pub fn step(&mut self, dt: f32) {
        for _ in 0..self.clock.advance(dt) {
            self.physics_pipeline.step(
                &self.gravity,
                &self.integration_parameters,
                &mut self.island_manager,
                &mut self.broad_phase,
                &mut self.narrow_phase,
                &mut self.rigid_body_set,
                &mut self.collider_set,
                &mut self.impulse_joint_set,
                &mut self.multibody_joint_set,
                &mut self.ccd_solver,
                None,
                &(),
                &(),
            );
        }
    }
}
