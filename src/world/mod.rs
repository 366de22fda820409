//! Simulated room contents: tracked props, their physics bodies, the local
//! user rig and the grab/release ownership protocol.

pub mod avatar;
pub mod engine;
pub mod events;
pub mod grab;
pub mod physics;
#[cfg(feature = "rapier3d")]
pub mod rapier_backend;
pub mod throw;
pub mod user;

pub use avatar::RemotePlayer;
pub use engine::{BodyHandle, BodyShape, BodyState, PhysicsEngine, SimpleWorld};
pub use events::{GrabObjectEvent, ReleaseObjectEvent};
pub use grab::{GrabReleaseStateMachine, HoverState, Manipulator, ManipulatorState};
pub use physics::{Holder, PhysicsObjectRegistry, TrackedObject};
pub use throw::ThrowVelocityEstimator;
pub use user::{LocalPose, LocalUser, ScreenUser, VrUser};

use thiserror::Error;

use crate::rendering::scene::NodeId;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WorldError {
    #[error("Object already registered: {name}")]
    DuplicateName { name: String },

    #[error("Planes cannot be tracked objects: {name}")]
    UnsupportedShape { name: String },

    #[error("Unknown object: {name}")]
    UnknownObject { name: String },

    #[error("Manipulator {manipulator} has no velocity tracking point")]
    MissingTrackingPoint { manipulator: usize },

    #[error("Unknown manipulator: {index}")]
    UnknownManipulator { index: usize },

    #[error("Scene node {id:?} does not exist")]
    UnknownNode { id: NodeId },
}

pub type WorldResult<T> = Result<T, WorldError>;

impl WorldError {
    pub(crate) fn unknown_object(name: &str) -> Self {
        WorldError::UnknownObject { name: name.to_string() }
    }
}
