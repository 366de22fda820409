//! One participant's view of a shared room.
//!
//! `Room` owns the scene, the physics registry, the grab state machine, the
//! local user rig and the peer transport, and drives them in a fixed order
//! once per tick.

use std::collections::{HashMap, VecDeque};

use bytes::Bytes;
use glam::Vec3;
use tracing::{debug, info, warn};

use crate::config::{RoomSettings, SessionMode};
use crate::networking::protocol::messages::PlayerData;
use crate::networking::sync::{PeerStateSynchronizer, SyncEvent};
use crate::networking::transport::PeerTransport;
use crate::networking::PeerId;
use crate::rendering::scene::{NodeId, SceneGraph, SceneNode};
use crate::utils::math::Transform;
use crate::world::events::{GrabObjectEvent, ReleaseObjectEvent};
use crate::world::grab::GrabReleaseStateMachine;
use crate::world::physics::{Holder, PhysicsObjectRegistry};
use crate::world::user::LocalUser;
use crate::world::{PhysicsEngine, WorldResult};

/// Input from the local user, applied at the start of the next tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalInput {
    SelectStart(usize),
    SelectEnd(usize),
}

/// What happened during one tick
#[derive(Debug, Default)]
pub struct TickSummary {
    pub grabs: Vec<GrabObjectEvent>,
    pub releases: Vec<ReleaseObjectEvent>,
    pub remote: Vec<SyncEvent>,
    pub pose_sent: bool,
}

/// Scene nodes standing in for a remote player
#[derive(Debug, Clone, Copy)]
struct AvatarNodes {
    root: NodeId,
    body: NodeId,
    head: NodeId,
    hands: [NodeId; 2],
}

impl AvatarNodes {
    fn spawn(scene: &mut SceneGraph, peer: &PeerId) -> Self {
        let root = scene.add_node(SceneNode::group(Transform::IDENTITY).with_name(peer.as_str()));
        let mut part = |name: &str| scene.add_node(SceneNode::group(Transform::IDENTITY).with_name(name).with_parent(root));
        let body = part("body");
        let head = part("head");
        let hands = [part("hand0"), part("hand1")];
        Self { root, body, head, hands }
    }

    fn apply(&self, scene: &mut SceneGraph, player: &PlayerData) {
        scene.set_world_transform(self.body, player.body.to_transform());
        scene.set_world_transform(self.head, player.head.to_transform());
        scene.set_world_transform(self.hands[0], player.hand0.to_transform());
        scene.set_world_transform(self.hands[1], player.hand1.to_transform());
    }
}

pub struct Room<T: PeerTransport> {
    settings: RoomSettings,
    scene: SceneGraph,
    registry: PhysicsObjectRegistry,
    grab: GrabReleaseStateMachine,
    sync: PeerStateSynchronizer,
    user: LocalUser,
    transport: T,
    pending_input: VecDeque<LocalInput>,
    avatars: HashMap<PeerId, AvatarNodes>,
}

impl<T: PeerTransport> Room<T> {
    pub fn new(settings: RoomSettings, transport: T) -> Self {
        let engine = PhysicsEngine::preferred(&settings.physics);
        Self::with_engine(settings, transport, engine)
    }

    /// Build the room on an explicit physics backend
    pub fn with_engine(settings: RoomSettings, transport: T, engine: PhysicsEngine) -> Self {
        let mut scene = SceneGraph::new();
        let mut registry = PhysicsObjectRegistry::new(&mut scene, engine);
        registry.add_ground_plane(settings.physics.ground_height);

        let user = match settings.session.start_mode {
            SessionMode::Screen => LocalUser::new_screen(&mut scene, &settings.grab),
            SessionMode::Vr => LocalUser::new_vr(&mut scene, &settings.grab),
        };
        let mut grab = GrabReleaseStateMachine::new(&settings.grab);
        for (node, tracking) in user.manipulators() {
            grab.add_manipulator(node, tracking);
        }
        let sync = PeerStateSynchronizer::new(transport.local_id().clone(), &settings.sync);

        info!("🏠 Room ready for {} ({:?} user)", transport.local_id(), user.user_type());
        Self {
            settings,
            scene,
            registry,
            grab,
            sync,
            user,
            transport,
            pending_input: VecDeque::new(),
            avatars: HashMap::new(),
        }
    }

    /// The box and sphere every room starts with
    pub fn populate_default_props(&mut self) -> WorldResult<()> {
        self.add_box("box", Vec3::new(-1.0, 0.0, 1.0))?;
        self.add_sphere("sphere", Vec3::new(0.0, 1.0, 1.2))?;
        Ok(())
    }

    pub fn add_box(&mut self, name: &str, position: Vec3) -> WorldResult<()> {
        self.registry.add_box(&mut self.scene, name, position).map(|_| ())
    }

    pub fn add_sphere(&mut self, name: &str, position: Vec3) -> WorldResult<()> {
        self.registry.add_sphere(&mut self.scene, name, position).map(|_| ())
    }

    pub fn select_start(&mut self, manipulator: usize) {
        self.pending_input.push_back(LocalInput::SelectStart(manipulator));
    }

    pub fn select_end(&mut self, manipulator: usize) {
        self.pending_input.push_back(LocalInput::SelectEnd(manipulator));
    }

    /// Run one frame: local input, inbound traffic, user and grab updates,
    /// physics, then the outbound pose cadence.
    pub fn tick(&mut self, dt: f32) -> TickSummary {
        let mut summary = TickSummary::default();

        // Local input goes first so a local grab beats a remote one arriving this tick
        while let Some(input) = self.pending_input.pop_front() {
            self.apply_input(input, &mut summary);
        }

        while let Some(event) = self.transport.poll_event() {
            for sync_event in self.sync.handle_transport_event(event) {
                self.apply_sync_event(&sync_event);
                summary.remote.push(sync_event);
            }
        }

        self.user.update(&self.scene);
        self.grab.update(&self.scene, &self.registry, dt);
        self.registry.step_and_sync(&mut self.scene, dt);

        let user = &self.user;
        let scene = &self.scene;
        match self.sync.tick(dt, || user.player_data(scene)) {
            Ok(Some(frame)) => {
                self.broadcast(frame);
                summary.pose_sent = true;
            }
            Ok(None) => {}
            Err(e) => warn!("Failed to encode pose frame: {}", e),
        }

        summary
    }

    fn apply_input(&mut self, input: LocalInput, summary: &mut TickSummary) {
        match input {
            LocalInput::SelectStart(index) => match self.grab.grab(&mut self.scene, &mut self.registry, index) {
                Ok(Some(event)) => {
                    self.send_grab(&event);
                    summary.grabs.push(event);
                }
                Ok(None) => {}
                Err(e) => warn!("Grab with manipulator {} failed: {}", index, e),
            },
            LocalInput::SelectEnd(index) => match self.grab.release(&mut self.scene, &mut self.registry, index) {
                Ok(Some(event)) => {
                    self.send_release(&event);
                    summary.releases.push(event);
                }
                Ok(None) => {}
                Err(e) => warn!("Release with manipulator {} failed: {}", index, e),
            },
        }
    }

    fn apply_sync_event(&mut self, event: &SyncEvent) {
        match event {
            SyncEvent::Connected(peer) => {
                let avatar = AvatarNodes::spawn(&mut self.scene, peer);
                self.avatars.insert(peer.clone(), avatar);
            }
            SyncEvent::Disconnected(peer) => {
                if self.settings.sync.release_on_disconnect {
                    self.grab.release_all_for_peer(&mut self.scene, &mut self.registry, peer);
                }
                if let Some(avatar) = self.avatars.remove(peer) {
                    self.scene.remove_node(avatar.root);
                }
            }
            SyncEvent::PoseUpdate { peer, player } => {
                if let Some(avatar) = self.avatars.get(peer) {
                    avatar.apply(&mut self.scene, player);
                }
                let hands = [player.hand0.to_transform(), player.hand1.to_transform()];
                self.grab.follow_remote_hands(&mut self.scene, &mut self.registry, peer, &hands);
            }
            SyncEvent::Grabbed { peer, grab } => {
                let hand = self
                    .sync
                    .player(peer)
                    .filter(|player| player.has_pose())
                    .and_then(|player| player.hand(grab.manipulator_index));
                if let Err(e) = self.grab.apply_remote_grab(&mut self.scene, &mut self.registry, peer, grab, hand) {
                    warn!("Ignoring grab from {}: {}", peer, e);
                }
            }
            SyncEvent::Released { peer, release } => {
                if let Err(e) = self.grab.apply_remote_release(&mut self.scene, &mut self.registry, peer, release) {
                    warn!("Ignoring release from {}: {}", peer, e);
                }
            }
        }
    }

    fn send_grab(&self, event: &GrabObjectEvent) {
        match self.sync.encode_grab(event) {
            Ok(frame) => self.broadcast(frame),
            Err(e) => warn!("Failed to encode grab of '{}': {}", event.object_name, e),
        }
    }

    fn send_release(&self, event: &ReleaseObjectEvent) {
        match self.sync.encode_release(event) {
            Ok(frame) => self.broadcast(frame),
            Err(e) => warn!("Failed to encode release of '{}': {}", event.object_name, e),
        }
    }

    fn broadcast(&self, frame: Bytes) {
        if let Err(e) = self.transport.broadcast(frame) {
            warn!("Broadcast failed: {}", e);
        }
    }

    /// Swap between desktop and VR rigs. Anything held is released first.
    pub fn set_session_mode(&mut self, mode: SessionMode) {
        let current = match self.user {
            LocalUser::Screen(_) => SessionMode::Screen,
            LocalUser::Vr(_) => SessionMode::Vr,
        };
        if current == mode {
            return;
        }

        for event in self.grab.release_all_local(&mut self.scene, &mut self.registry) {
            self.send_release(&event);
        }
        self.grab.clear_manipulators();

        let position = self.user.position(&self.scene);
        self.user.remove(&mut self.scene);
        self.user = match mode {
            SessionMode::Screen => LocalUser::new_screen(&mut self.scene, &self.settings.grab),
            SessionMode::Vr => LocalUser::new_vr(&mut self.scene, &self.settings.grab),
        };
        debug!("Previous rig was at {}", position);
        for (node, tracking) in self.user.manipulators() {
            self.grab.add_manipulator(node, tracking);
        }
        info!("🔁 Switched to {:?} session", mode);
    }

    /// Place a VR controller relative to the rig; false for desktop users
    pub fn set_controller_transform(&mut self, index: usize, local: Transform) -> bool {
        match &self.user {
            LocalUser::Vr(vr) => vr.set_controller_transform(&mut self.scene, index, local),
            LocalUser::Screen(_) => false,
        }
    }

    pub fn set_head_transform(&mut self, local: Transform) -> bool {
        match &self.user {
            LocalUser::Vr(vr) => vr.set_head_transform(&mut self.scene, local),
            LocalUser::Screen(_) => false,
        }
    }

    /// Desktop key movement; no-op for VR users
    pub fn move_user(&mut self, forward: f32, right: f32) {
        if let LocalUser::Screen(screen) = &self.user {
            screen.move_forward(&mut self.scene, forward);
            screen.move_right(&mut self.scene, right);
        }
    }

    pub fn set_user_position(&mut self, position: Vec3) {
        self.user.set_position(&mut self.scene, position);
    }

    pub fn local_id(&self) -> &PeerId {
        self.transport.local_id()
    }

    pub fn settings(&self) -> &RoomSettings {
        &self.settings
    }

    pub fn scene(&self) -> &SceneGraph {
        &self.scene
    }

    pub fn registry(&self) -> &PhysicsObjectRegistry {
        &self.registry
    }

    pub fn grab_machine(&self) -> &GrabReleaseStateMachine {
        &self.grab
    }

    pub fn synchronizer(&self) -> &PeerStateSynchronizer {
        &self.sync
    }

    pub fn user(&self) -> &LocalUser {
        &self.user
    }

    pub fn holder(&self, name: &str) -> WorldResult<&Holder> {
        self.registry.holder(name)
    }

    pub fn avatar_node(&self, peer: &PeerId) -> Option<NodeId> {
        self.avatars.get(peer).map(|a| a.root)
    }

    pub fn avatar_hand(&self, peer: &PeerId, index: usize) -> Option<Transform> {
        let hand = *self.avatars.get(peer)?.hands.get(index)?;
        self.scene.world_transform(hand)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::networking::transport::LoopbackHub;

    fn vr_settings() -> RoomSettings {
        let mut settings = RoomSettings::for_profile(crate::config::RoomProfile::Vr);
        settings.session.log_to_file = false;
        settings
    }

    #[test]
    fn test_new_room_has_manipulators_for_user() {
        let hub = LoopbackHub::new();
        let room = Room::new(vr_settings(), hub.join("solo").unwrap());
        assert_eq!(room.grab_machine().manipulators().len(), 2);
        assert_eq!(room.local_id(), &PeerId::new("solo"));
    }

    #[test]
    fn test_room_runs_on_the_given_engine() {
        let hub = LoopbackHub::new();
        let settings = vr_settings();
        let engine = PhysicsEngine::simple(&settings.physics);
        let room = Room::with_engine(settings, hub.join("solo").unwrap(), engine);
        assert!(matches!(room.registry().engine(), PhysicsEngine::Simple(_)));
    }

    #[test]
    fn test_default_props_are_registered() {
        let hub = LoopbackHub::new();
        let mut room = Room::new(vr_settings(), hub.join("solo").unwrap());
        room.populate_default_props().unwrap();
        assert_eq!(room.registry().names().collect::<Vec<_>>(), vec!["box", "sphere"]);
        assert!(room.populate_default_props().is_err());
    }

    #[test]
    fn test_switching_mode_releases_and_rebuilds_manipulators() {
        let hub = LoopbackHub::new();
        let mut room = Room::new(vr_settings(), hub.join("solo").unwrap());
        room.add_sphere("ball", Vec3::new(0.0, 1.0, 0.0)).unwrap();
        // Controller 0 at (0, 1, 0.5) in world space, pointing at the ball
        room.set_controller_transform(0, Transform::from_translation(Vec3::new(0.0, 2.0, -2.5)));
        room.select_start(0);
        let summary = room.tick(1.0 / 60.0);
        assert_eq!(summary.grabs.len(), 1);

        room.set_session_mode(SessionMode::Screen);
        assert!(room.holder("ball").unwrap().is_free());
        assert!(room.grab_machine().manipulators().is_empty());
        assert!(!room.set_controller_transform(0, Transform::IDENTITY));
    }
}
