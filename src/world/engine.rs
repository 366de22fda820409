//! Physics engine backends.
//!
//! The room only needs body creation, state reads, direct state writes and a
//! fixed-step `step`. `SimpleWorld` is the built-in integrator; the Rapier
//! backend is available behind the `rapier3d` feature.

use glam::{Quat, Vec3};
use tracing::{debug, info};

use crate::config::PhysicsSettings;

/// Index of a body inside a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyHandle(pub usize);

/// Collision primitive of a body
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BodyShape {
    Sphere { radius: f32 },
    Box { half_extents: Vec3 },
    /// Infinite plane facing +Y; always static
    Plane,
}

/// Kinematic state of a body
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyState {
    pub position: Vec3,
    pub rotation: Quat,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
}

impl BodyState {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
        }
    }
}

/// Simulated rigid body. Mass is fixed at creation; zero mass means static.
#[derive(Debug, Clone)]
pub struct PhysicsBody {
    shape: BodyShape,
    mass: f32,
    pub state: BodyState,
}

impl PhysicsBody {
    pub fn new(shape: BodyShape, mass: f32, position: Vec3) -> Self {
        let mass = if matches!(shape, BodyShape::Plane) { 0.0 } else { mass.max(0.0) };
        Self {
            shape,
            mass,
            state: BodyState::at(position),
        }
    }

    pub fn shape(&self) -> BodyShape {
        self.shape
    }

    pub fn mass(&self) -> f32 {
        self.mass
    }

    pub fn is_dynamic(&self) -> bool {
        self.mass > 0.0
    }

    /// Half height of the body along world Y, for ground contact
    fn vertical_extent(&self) -> f32 {
        match self.shape {
            BodyShape::Sphere { radius } => radius,
            BodyShape::Box { half_extents } => {
                let r = self.state.rotation;
                let axes = [r * Vec3::X, r * Vec3::Y, r * Vec3::Z];
                axes[0].y.abs() * half_extents.x
                    + axes[1].y.abs() * half_extents.y
                    + axes[2].y.abs() * half_extents.z
            }
            BodyShape::Plane => 0.0,
        }
    }
}

/// Fixed-timestep accumulator shared by the backends
#[derive(Debug, Clone)]
pub struct StepClock {
    fixed_timestep: f32,
    max_substeps: u32,
    accumulator: f32,
}

impl StepClock {
    pub fn new(fixed_timestep: f32, max_substeps: u32) -> Self {
        Self {
            fixed_timestep: if fixed_timestep > 0.0 { fixed_timestep } else { 1.0 / 60.0 },
            max_substeps: max_substeps.max(1),
            accumulator: 0.0,
        }
    }

    pub fn fixed_timestep(&self) -> f32 {
        self.fixed_timestep
    }

    /// Number of fixed sub-steps to run for `dt`; excess time beyond the cap is dropped
    pub fn advance(&mut self, dt: f32) -> u32 {
        if dt <= 0.0 || !dt.is_finite() {
            return 0;
        }
        self.accumulator += dt;
        let mut steps = 0;
        // Tolerance keeps exact multiples of the step from being carried over by rounding
        while self.accumulator + 1e-6 >= self.fixed_timestep && steps < self.max_substeps {
            self.accumulator -= self.fixed_timestep;
            steps += 1;
        }
        if steps == self.max_substeps && self.accumulator >= self.fixed_timestep {
            debug!("Physics fell behind, dropping {:.4}s", self.accumulator);
            self.accumulator = 0.0;
        }
        self.accumulator = self.accumulator.max(0.0);
        steps
    }
}

/// Built-in semi-implicit Euler integrator with a ground plane
pub struct SimpleWorld {
    gravity: Vec3,
    restitution: f32,
    ground_height: Option<f32>,
    clock: StepClock,
    bodies: Vec<PhysicsBody>,
}

impl SimpleWorld {
    pub fn new(settings: &PhysicsSettings) -> Self {
        Self {
            gravity: Vec3::from_array(settings.gravity),
            restitution: settings.restitution.clamp(0.0, 1.0),
            ground_height: None,
            clock: StepClock::new(settings.fixed_timestep, settings.max_substeps),
            bodies: Vec::new(),
        }
    }

    pub fn add_body(&mut self, body: PhysicsBody) -> BodyHandle {
        if matches!(body.shape, BodyShape::Plane) {
            let height = body.state.position.y;
            self.ground_height = Some(self.ground_height.map_or(height, |h| h.max(height)));
        }
        self.bodies.push(body);
        BodyHandle(self.bodies.len() - 1)
    }

    pub fn body(&self, handle: BodyHandle) -> Option<&PhysicsBody> {
        self.bodies.get(handle.0)
    }

    pub fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut PhysicsBody> {
        self.bodies.get_mut(handle.0)
    }

    pub fn step(&mut self, dt: f32) {
        let steps = self.clock.advance(dt);
        let h = self.clock.fixed_timestep();
        for _ in 0..steps {
            self.integrate(h);
        }
    }

    fn integrate(&mut self, h: f32) {
        let gravity = self.gravity;
        let restitution = self.restitution;
        let ground = self.ground_height;

        for body in self.bodies.iter_mut().filter(|b| b.is_dynamic()) {
            let state = &mut body.state;
            state.linear_velocity += gravity * h;
            state.position += state.linear_velocity * h;

            let w = state.angular_velocity;
            if w != Vec3::ZERO {
                let spin = Quat::from_xyzw(w.x, w.y, w.z, 0.0) * state.rotation;
                state.rotation = Quat::from_xyzw(
                    state.rotation.x + 0.5 * h * spin.x,
                    state.rotation.y + 0.5 * h * spin.y,
                    state.rotation.z + 0.5 * h * spin.z,
                    state.rotation.w + 0.5 * h * spin.w,
                )
                .normalize();
            }

            if let Some(ground) = ground {
                let extent = body.vertical_extent();
                let state = &mut body.state;
                if state.position.y - extent < ground {
                    state.position.y = ground + extent;
                    if state.linear_velocity.y < 0.0 {
                        state.linear_velocity.y = -state.linear_velocity.y * restitution;
                        // Settle instead of micro-bouncing forever
                        if state.linear_velocity.y < 0.1 {
                            state.linear_velocity.y = 0.0;
                        }
                    }
                    state.linear_velocity.x *= 0.98;
                    state.linear_velocity.z *= 0.98;
                    state.angular_velocity *= 0.95;
                }
            }
        }
    }
}

/// Physics backend selected at startup
pub enum PhysicsEngine {
    Simple(SimpleWorld),
    #[cfg(feature = "rapier3d")]
    Rapier(crate::world::rapier_backend::RapierWorld),
}

impl PhysicsEngine {
    pub fn simple(settings: &PhysicsSettings) -> Self {
        info!("⚙️ Using built-in physics integrator");
        PhysicsEngine::Simple(SimpleWorld::new(settings))
    }

    #[cfg(feature = "rapier3d")]
    pub fn rapier(settings: &PhysicsSettings) -> Self {
        info!("⚙️ Using Rapier physics backend");
        PhysicsEngine::Rapier(crate::world::rapier_backend::RapierWorld::new(settings))
    }

    /// Rapier when compiled in, otherwise the built-in integrator
    pub fn preferred(settings: &PhysicsSettings) -> Self {
        #[cfg(feature = "rapier3d")]
        {
            Self::rapier(settings)
        }
        #[cfg(not(feature = "rapier3d"))]
        {
            Self::simple(settings)
        }
    }

    pub fn add_body(&mut self, body: PhysicsBody) -> BodyHandle {
        match self {
            PhysicsEngine::Simple(world) => world.add_body(body),
            #[cfg(feature = "rapier3d")]
            PhysicsEngine::Rapier(world) => world.add_body(body),
        }
    }

    pub fn state(&self, handle: BodyHandle) -> Option<BodyState> {
        match self {
            PhysicsEngine::Simple(world) => world.body(handle).map(|b| b.state),
            #[cfg(feature = "rapier3d")]
            PhysicsEngine::Rapier(world) => world.state(handle),
        }
    }

    /// Overwrite parts of a body's state between steps
    pub fn modify(&mut self, handle: BodyHandle, f: impl FnOnce(&mut BodyState)) -> bool {
        match self {
            PhysicsEngine::Simple(world) => match world.body_mut(handle) {
                Some(body) => {
                    f(&mut body.state);
                    true
                }
                None => false,
            },
            #[cfg(feature = "rapier3d")]
            PhysicsEngine::Rapier(world) => world.modify(handle, f),
        }
    }

    pub fn step(&mut self, dt: f32) {
        match self {
            PhysicsEngine::Simple(world) => world.step(dt),
            #[cfg(feature = "rapier3d")]
            PhysicsEngine::Rapier(world) => world.step(dt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> PhysicsSettings {
        PhysicsSettings::default()
    }

    #[test]
    fn test_step_clock_substeps() {
        let mut clock = StepClock::new(1.0 / 60.0, 10);
        assert_eq!(clock.advance(1.0 / 60.0), 1);
        assert_eq!(clock.advance(1.0 / 30.0), 2);
        assert_eq!(clock.advance(0.0), 0);
        assert_eq!(clock.advance(-1.0), 0);
    }

    #[test]
    fn test_step_clock_caps_substeps() {
        let mut clock = StepClock::new(1.0 / 60.0, 3);
        assert_eq!(clock.advance(1.0), 3);
        // Remaining backlog was dropped
        assert_eq!(clock.advance(1.0 / 60.0), 1);
    }

    #[test]
    fn test_body_falls_under_gravity() {
        let mut world = SimpleWorld::new(&settings());
        let handle = world.add_body(PhysicsBody::new(BodyShape::Sphere { radius: 0.1 }, 5.0, Vec3::new(0.0, 1.0, 0.0)));
        world.step(1.0 / 60.0);
        let state = world.body(handle).unwrap().state;
        assert!(state.position.y < 1.0);
        assert!(state.linear_velocity.y < 0.0);
    }

    #[test]
    fn test_ground_plane_stops_bodies() {
        let mut world = SimpleWorld::new(&settings());
        world.add_body(PhysicsBody::new(BodyShape::Plane, 0.0, Vec3::new(0.0, -1.0, 0.0)));
        let handle = world.add_body(PhysicsBody::new(BodyShape::Sphere { radius: 0.1 }, 5.0, Vec3::new(0.0, 0.0, 0.0)));
        for _ in 0..600 {
            world.step(1.0 / 60.0);
        }
        let state = world.body(handle).unwrap().state;
        assert!((state.position.y - -0.9).abs() < 1e-3);
    }

    #[test]
    fn test_static_bodies_do_not_move() {
        let mut world = SimpleWorld::new(&settings());
        let handle = world.add_body(PhysicsBody::new(BodyShape::Box { half_extents: Vec3::splat(0.5) }, 0.0, Vec3::ZERO));
        world.step(0.5);
        assert_eq!(world.body(handle).unwrap().state.position, Vec3::ZERO);
    }

    #[cfg(feature = "rapier3d")]
    #[test]
    fn test_rapier_engine_dispatch() {
        let mut engine = PhysicsEngine::rapier(&settings());
        let handle = engine.add_body(PhysicsBody::new(BodyShape::Sphere { radius: 0.1 }, 5.0, Vec3::new(0.0, 1.0, 0.0)));
        assert!(engine.modify(handle, |state| state.linear_velocity = Vec3::new(1.0, 0.0, 0.0)));
        engine.step(1.0 / 60.0);
        let state = engine.state(handle).unwrap();
        assert!(state.position.x > 0.0);
        assert!(state.position.y < 1.0);
    }
}
