use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::networking::{NetworkError, NetworkResult};
use crate::utils::math::{Quaternion, Transform, Vector3};
use crate::world::events::{GrabObjectEvent, ReleaseObjectEvent};

/// One frame on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "userID")]
    pub user_id: String,
    pub data: Payload,
}

/// Frame body, discriminated by which key is present.
/// Unknown keys are ignored when decoding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_data: Option<PlayerData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grab_object: Option<GrabObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_object: Option<ReleaseObject>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserType {
    #[serde(rename = "screen-user")]
    ScreenUser,
    #[serde(rename = "vr-user")]
    VrUser,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PoseData {
    pub position: Vector3,
    #[serde(default)]
    pub quaternion: Quaternion,
}

impl PoseData {
    pub fn from_transform(transform: &Transform) -> Self {
        Self {
            position: transform.translation.into(),
            quaternion: transform.rotation.into(),
        }
    }

    pub fn to_transform(&self) -> Transform {
        Transform::new(self.position.into(), self.quaternion.into())
    }
}

/// Periodic pose broadcast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerData {
    #[serde(rename = "type")]
    pub user_type: UserType,
    pub body: PoseData,
    pub head: PoseData,
    pub hand0: PoseData,
    pub hand1: PoseData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrabObject {
    pub object_name: String,
    pub controller_index: u8,
    pub object_position: Vector3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseObject {
    pub object_name: String,
    pub object_position: Vector3,
    #[serde(default)]
    pub object_quaternion: Quaternion,
    #[serde(default)]
    pub object_velocity: Vector3,
    pub controller_index: u8,
}

impl Envelope {
    pub fn new(user_id: impl Into<String>, data: Payload) -> Self {
        Self {
            user_id: user_id.into(),
            data,
        }
    }

    pub fn encode(&self) -> NetworkResult<Bytes> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(|e| NetworkError::Encode { reason: e.to_string() })
    }

    pub fn decode(bytes: &[u8]) -> NetworkResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| NetworkError::Decode { reason: e.to_string() })
    }
}

impl Payload {
    pub fn player_data(data: PlayerData) -> Self {
        Self {
            player_data: Some(data),
            ..Self::default()
        }
    }

    pub fn grab_object(grab: GrabObject) -> Self {
        Self {
            grab_object: Some(grab),
            ..Self::default()
        }
    }

    pub fn release_object(release: ReleaseObject) -> Self {
        Self {
            release_object: Some(release),
            ..Self::default()
        }
    }

    /// No key this client understands
    pub fn is_empty(&self) -> bool {
        self.player_data.is_none() && self.grab_object.is_none() && self.release_object.is_none()
    }
}

fn controller_index(manipulator_index: usize) -> u8 {
    u8::try_from(manipulator_index).unwrap_or(u8::MAX)
}

impl From<&GrabObjectEvent> for GrabObject {
    fn from(event: &GrabObjectEvent) -> Self {
        Self {
            object_name: event.object_name.clone(),
            controller_index: controller_index(event.manipulator_index),
            object_position: event.object_position.into(),
        }
    }
}

impl From<&GrabObject> for GrabObjectEvent {
    fn from(grab: &GrabObject) -> Self {
        GrabObjectEvent::new(
            grab.object_name.clone(),
            grab.controller_index as usize,
            grab.object_position.into(),
        )
    }
}

impl From<&ReleaseObjectEvent> for ReleaseObject {
    fn from(event: &ReleaseObjectEvent) -> Self {
        Self {
            object_name: event.object_name.clone(),
            object_position: event.object_position.into(),
            object_quaternion: event.object_quaternion.into(),
            object_velocity: event.object_velocity.into(),
            controller_index: controller_index(event.manipulator_index),
        }
    }
}

impl From<&ReleaseObject> for ReleaseObjectEvent {
    fn from(release: &ReleaseObject) -> Self {
        ReleaseObjectEvent {
            object_name: release.object_name.clone(),
            manipulator_index: release.controller_index as usize,
            object_position: release.object_position.into(),
            object_quaternion: release.object_quaternion.into(),
            object_velocity: release.object_velocity.into(),
        }
    }
}
