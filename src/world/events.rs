//! Ownership events produced by the grab state machine and sent to peers.
//! Remote peers' events arrive in the same shape after decoding.

use glam::{Quat, Vec3};

/// An object was picked up by a manipulator
#[derive(Debug, Clone, PartialEq)]
pub struct GrabObjectEvent {
    pub object_name: String,
    pub manipulator_index: usize,
    pub object_position: Vec3,
}

/// An object was let go, with the state it should continue from
#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseObjectEvent {
    pub object_name: String,
    pub manipulator_index: usize,
    pub object_position: Vec3,
    pub object_quaternion: Quat,
    pub object_velocity: Vec3,
}

impl GrabObjectEvent {
    pub fn new(object_name: impl Into<String>, manipulator_index: usize, object_position: Vec3) -> Self {
        Self {
            object_name: object_name.into(),
            manipulator_index,
            object_position,
        }
    }
}

impl ReleaseObjectEvent {
    /// Release in place with no throw
    pub fn dropped(object_name: impl Into<String>, manipulator_index: usize, object_position: Vec3) -> Self {
        Self {
            object_name: object_name.into(),
            manipulator_index,
            object_position,
            object_quaternion: Quat::IDENTITY,
            object_velocity: Vec3::ZERO,
        }
    }
}
