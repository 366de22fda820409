//! Wire format shared by every peer in a room

pub mod messages;

pub use messages::{Envelope, GrabObject, Payload, PlayerData, PoseData, ReleaseObject, UserType};
