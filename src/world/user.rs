//! The local participant: a desktop (screen) rig or a VR rig.
//!
//! Both rigs are a dolly node carrying a head and, for VR, two controllers.
//! The dolly is what moves through the room; head and hands are placed
//! relative to it.

use glam::{Quat, Vec3};
use tracing::{debug, info};

use crate::config::GrabSettings;
use crate::networking::protocol::messages::{PlayerData, PoseData, UserType};
use crate::rendering::scene::{NodeId, SceneGraph, SceneNode};
use crate::utils::math::Transform;

/// Dolly displacement per update above which the user counts as moving
pub const MOVING_THRESHOLD: f32 = 0.01;
/// Distance covered by one movement key press on desktop
pub const KEY_STEP: f32 = 0.25;
pub const SCREEN_START: Vec3 = Vec3::new(0.0, 1.0, 3.0);
pub const VR_START: Vec3 = Vec3::new(0.0, -1.0, 3.0);
pub const TRACKING_POINT_NAME: &str = "velocityTrackingPoint";

const VR_HEAD_OFFSET: Vec3 = Vec3::new(0.0, 1.0, 0.0);

/// World-space body, head and hand transforms of the local user
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalPose {
    pub body: Transform,
    pub head: Transform,
    pub hands: [Transform; 2],
}

#[derive(Debug, Clone)]
struct PoseRig {
    dolly: NodeId,
    head: NodeId,
    previous_position: Vec3,
    moving: bool,
}

impl PoseRig {
    fn new(scene: &mut SceneGraph, start: Vec3, head_offset: Vec3) -> Self {
        let dolly = scene.add_node(SceneNode::group(Transform::from_translation(start)).with_name("user"));
        let head = scene.add_node(
            SceneNode::group(Transform::from_translation(head_offset))
                .with_name("head")
                .with_parent(dolly),
        );
        Self {
            dolly,
            head,
            previous_position: start,
            moving: false,
        }
    }

    fn update(&mut self, scene: &SceneGraph) {
        let position = scene.local_transform(self.dolly).unwrap_or_default().translation;
        self.moving = position.distance(self.previous_position) > MOVING_THRESHOLD;
        self.previous_position = position;
    }

    fn body(&self, scene: &SceneGraph) -> Transform {
        scene.world_transform(self.dolly).unwrap_or_default()
    }

    fn head(&self, scene: &SceneGraph) -> Transform {
        scene.world_transform(self.head).unwrap_or_default()
    }

    fn translate(&self, scene: &mut SceneGraph, offset: Vec3) {
        let mut local = scene.local_transform(self.dolly).unwrap_or_default();
        local.translation += offset;
        scene.set_local_transform(self.dolly, local);
    }

    fn rotate_y(&self, scene: &mut SceneGraph, radians: f32) {
        let mut local = scene.local_transform(self.dolly).unwrap_or_default();
        local.rotation = (Quat::from_rotation_y(radians) * local.rotation).normalize();
        scene.set_local_transform(self.dolly, local);
    }
}

/// Adds a manipulator node under `parent` with a velocity tracking point child
fn add_manipulator_node(scene: &mut SceneGraph, parent: NodeId, name: &str, tracking_offset: Vec3) -> (NodeId, NodeId) {
    let node = scene.add_node(SceneNode::group(Transform::IDENTITY).with_name(name).with_parent(parent));
    let tracking = scene.add_node(
        SceneNode::group(Transform::from_translation(tracking_offset))
            .with_name(TRACKING_POINT_NAME)
            .with_parent(node),
    );
    (node, tracking)
}

/// Desktop user: camera on a dolly, keyboard movement, hands at the body
#[derive(Debug, Clone)]
pub struct ScreenUser {
    rig: PoseRig,
    /// Camera-mounted pointer when desktop grabbing is enabled
    pointer: Option<(NodeId, NodeId)>,
}

impl ScreenUser {
    pub fn new(scene: &mut SceneGraph, settings: &GrabSettings) -> Self {
        let rig = PoseRig::new(scene, SCREEN_START, Vec3::ZERO);
        let pointer = settings
            .desktop_grab
            .then(|| add_manipulator_node(scene, rig.head, "pointer", Vec3::from(settings.tracking_point_offset)));
        Self { rig, pointer }
    }

    /// Horizontal view direction of the camera
    fn horizontal_forward(&self, scene: &SceneGraph) -> Vec3 {
        let forward = self.rig.head(scene).forward();
        Vec3::new(forward.x, 0.0, forward.z).normalize_or_zero()
    }

    pub fn move_forward(&self, scene: &mut SceneGraph, distance: f32) {
        let direction = self.horizontal_forward(scene);
        self.rig.translate(scene, direction * distance);
    }

    pub fn move_right(&self, scene: &mut SceneGraph, distance: f32) {
        let right = self.horizontal_forward(scene).cross(Vec3::Y);
        self.rig.translate(scene, right * distance);
    }

    /// Turn the view around the vertical axis
    pub fn yaw(&self, scene: &mut SceneGraph, radians: f32) {
        self.rig.rotate_y(scene, radians);
    }
}

/// VR user: tracked head and two controllers on a dolly
#[derive(Debug, Clone)]
pub struct VrUser {
    rig: PoseRig,
    controllers: [(NodeId, NodeId); 2],
}

impl VrUser {
    pub fn new(scene: &mut SceneGraph, settings: &GrabSettings) -> Self {
        let rig = PoseRig::new(scene, VR_START, VR_HEAD_OFFSET);
        let offset = Vec3::from(settings.tracking_point_offset);
        let controllers = [
            add_manipulator_node(scene, rig.dolly, "controller-0", offset),
            add_manipulator_node(scene, rig.dolly, "controller-1", offset),
        ];
        Self { rig, controllers }
    }

    /// Place a controller relative to the dolly, as reported by the headset
    pub fn set_controller_transform(&self, scene: &mut SceneGraph, index: usize, local: Transform) -> bool {
        match self.controllers.get(index) {
            Some((node, _)) => scene.set_local_transform(*node, local),
            None => false,
        }
    }

    pub fn set_head_transform(&self, scene: &mut SceneGraph, local: Transform) -> bool {
        scene.set_local_transform(self.rig.head, local)
    }

    /// Thumbstick snap/smooth turn
    pub fn rotate_body(&self, scene: &mut SceneGraph, radians: f32) {
        self.rig.rotate_y(scene, radians);
    }

    pub fn controller_node(&self, index: usize) -> Option<NodeId> {
        self.controllers.get(index).map(|(node, _)| *node)
    }
}

#[derive(Debug, Clone)]
pub enum LocalUser {
    Screen(ScreenUser),
    Vr(VrUser),
}

impl LocalUser {
    pub fn new_screen(scene: &mut SceneGraph, settings: &GrabSettings) -> Self {
        info!("🖥️ Creating screen user");
        LocalUser::Screen(ScreenUser::new(scene, settings))
    }

    pub fn new_vr(scene: &mut SceneGraph, settings: &GrabSettings) -> Self {
        info!("🥽 Creating VR user");
        LocalUser::Vr(VrUser::new(scene, settings))
    }

    fn rig(&self) -> &PoseRig {
        match self {
            LocalUser::Screen(user) => &user.rig,
            LocalUser::Vr(user) => &user.rig,
        }
    }

    fn rig_mut(&mut self) -> &mut PoseRig {
        match self {
            LocalUser::Screen(user) => &mut user.rig,
            LocalUser::Vr(user) => &mut user.rig,
        }
    }

    pub fn user_type(&self) -> UserType {
        match self {
            LocalUser::Screen(_) => UserType::ScreenUser,
            LocalUser::Vr(_) => UserType::VrUser,
        }
    }

    pub fn dolly(&self) -> NodeId {
        self.rig().dolly
    }

    /// Manipulator nodes with their tracking points, in manipulator index order
    pub fn manipulators(&self) -> Vec<(NodeId, Option<NodeId>)> {
        match self {
            LocalUser::Screen(user) => user
                .pointer
                .iter()
                .map(|(node, tracking)| (*node, Some(*tracking)))
                .collect(),
            LocalUser::Vr(user) => user
                .controllers
                .iter()
                .map(|(node, tracking)| (*node, Some(*tracking)))
                .collect(),
        }
    }

    /// World-space pose. Desktop users report both hands at the body.
    pub fn pose(&self, scene: &SceneGraph) -> LocalPose {
        let body = self.rig().body(scene);
        let head = self.rig().head(scene);
        let hands = match self {
            LocalUser::Screen(_) => [body, body],
            LocalUser::Vr(user) => user
                .controllers
                .map(|(node, _)| scene.world_transform(node).unwrap_or(body)),
        };
        LocalPose { body, head, hands }
    }

    /// Pose in wire form
    pub fn player_data(&self, scene: &SceneGraph) -> PlayerData {
        let pose = self.pose(scene);
        PlayerData {
            user_type: self.user_type(),
            body: PoseData::from_transform(&pose.body),
            head: PoseData::from_transform(&pose.head),
            hand0: PoseData::from_transform(&pose.hands[0]),
            hand1: PoseData::from_transform(&pose.hands[1]),
        }
    }

    pub fn update(&mut self, scene: &SceneGraph) {
        self.rig_mut().update(scene);
    }

    pub fn is_moving(&self) -> bool {
        self.rig().moving
    }

    pub fn position(&self, scene: &SceneGraph) -> Vec3 {
        scene.local_transform(self.rig().dolly).unwrap_or_default().translation
    }

    pub fn set_position(&self, scene: &mut SceneGraph, position: Vec3) {
        let dolly = self.rig().dolly;
        let mut local = scene.local_transform(dolly).unwrap_or_default();
        local.translation = position;
        scene.set_local_transform(dolly, local);
    }

    /// Remove the rig and everything attached to it from the scene
    pub fn remove(&self, scene: &mut SceneGraph) {
        debug!("Removing {:?} rig", self.user_type());
        scene.remove_node(self.rig().dolly);
    }
}
