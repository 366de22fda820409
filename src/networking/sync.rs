//! Peer state synchronization
//!
//! Outbound, the local pose goes out on a fixed cadence while grab and
//! release events are encoded for immediate sending. Inbound, transport
//! events are decoded into [`SyncEvent`]s and remote player records are kept
//! up to date. Applying ownership changes is left to the caller.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::config::SyncSettings;
use crate::networking::protocol::messages::{Envelope, GrabObject, Payload, PlayerData, ReleaseObject};
use crate::networking::transport::TransportEvent;
use crate::networking::{NetworkResult, PeerId};
use crate::world::avatar::RemotePlayer;
use crate::world::events::{GrabObjectEvent, ReleaseObjectEvent};

/// Decoded effect of inbound traffic
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Connected(PeerId),
    Disconnected(PeerId),
    PoseUpdate { peer: PeerId, player: PlayerData },
    Grabbed { peer: PeerId, grab: GrabObjectEvent },
    Released { peer: PeerId, release: ReleaseObjectEvent },
}

pub struct PeerStateSynchronizer {
    local_id: PeerId,
    send_interval: f64,
    accumulator: f64,
    players: HashMap<PeerId, RemotePlayer>,
}

impl PeerStateSynchronizer {
    pub fn new(local_id: PeerId, settings: &SyncSettings) -> Self {
        Self::with_interval(local_id, Duration::from_millis(settings.send_interval_ms))
    }

    pub fn with_interval(local_id: PeerId, send_interval: Duration) -> Self {
        Self {
            local_id,
            send_interval: send_interval.as_secs_f64(),
            accumulator: 0.0,
            players: HashMap::new(),
        }
    }

    pub fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    /// Advance the outbound cadence. Once more than one interval has built
    /// up, the accumulator restarts from zero and a pose frame is returned.
    pub fn tick(&mut self, dt: f32, pose: impl FnOnce() -> PlayerData) -> NetworkResult<Option<Bytes>> {
        if dt > 0.0 {
            self.accumulator += f64::from(dt);
        }
        if self.accumulator <= self.send_interval {
            return Ok(None);
        }
        self.accumulator = 0.0;
        self.encode(Payload::player_data(pose())).map(Some)
    }

    pub fn encode_grab(&self, event: &GrabObjectEvent) -> NetworkResult<Bytes> {
        self.encode(Payload::grab_object(GrabObject::from(event)))
    }

    pub fn encode_release(&self, event: &ReleaseObjectEvent) -> NetworkResult<Bytes> {
        self.encode(Payload::release_object(ReleaseObject::from(event)))
    }

    fn encode(&self, data: Payload) -> NetworkResult<Bytes> {
        Envelope::new(self.local_id.as_str(), data).encode()
    }

    pub fn players(&self) -> impl Iterator<Item = &RemotePlayer> {
        self.players.values()
    }

    pub fn player(&self, peer: &PeerId) -> Option<&RemotePlayer> {
        self.players.get(peer)
    }

    pub fn handle_transport_event(&mut self, event: TransportEvent) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        match event {
            TransportEvent::PeerConnected(peer) => {
                self.connect(&peer, &mut events);
            }
            TransportEvent::PeerDisconnected(peer) => {
                if self.players.remove(&peer).is_some() {
                    info!("👋 Peer {} disconnected", peer);
                    events.push(SyncEvent::Disconnected(peer));
                }
            }
            TransportEvent::Frame { peer, payload } => {
                self.handle_frame(peer, &payload, &mut events);
            }
        }
        events
    }

    fn connect(&mut self, peer: &PeerId, events: &mut Vec<SyncEvent>) {
        if *peer == self.local_id || self.players.contains_key(peer) {
            return;
        }
        info!("🤝 Peer {} connected", peer);
        self.players.insert(peer.clone(), RemotePlayer::new(peer.clone()));
        events.push(SyncEvent::Connected(peer.clone()));
    }

    fn handle_frame(&mut self, peer: PeerId, payload: &[u8], events: &mut Vec<SyncEvent>) {
        if peer == self.local_id {
            return;
        }
        let envelope = match Envelope::decode(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Dropping frame from {}: {}", peer, e);
                return;
            }
        };
        if envelope.user_id != peer.as_str() {
            debug!("Frame from {} claims to be from {}", peer, envelope.user_id);
        }
        if envelope.data.is_empty() {
            debug!("Frame from {} has no known payload keys", peer);
            return;
        }

        // Frames can beat the connect notification
        self.connect(&peer, events);

        let data = envelope.data;
        if let Some(player) = data.player_data {
            if let Some(record) = self.players.get_mut(&peer) {
                record.apply_pose(&player);
            }
            events.push(SyncEvent::PoseUpdate { peer: peer.clone(), player });
        }
        if let Some(grab) = data.grab_object {
            events.push(SyncEvent::Grabbed {
                peer: peer.clone(),
                grab: GrabObjectEvent::from(&grab),
            });
        }
        if let Some(release) = data.release_object {
            events.push(SyncEvent::Released {
                peer,
                release: ReleaseObjectEvent::from(&release),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::networking::protocol::messages::{PoseData, UserType};
    use glam::Vec3;

    fn player_data() -> PlayerData {
        PlayerData {
            user_type: UserType::ScreenUser,
            body: PoseData::default(),
            head: PoseData::default(),
            hand0: PoseData::default(),
            hand1: PoseData::default(),
        }
    }

    fn synchronizer(id: &str) -> PeerStateSynchronizer {
        PeerStateSynchronizer::new(PeerId::new(id), &SyncSettings::default())
    }

    fn frame(from: &str, bytes: Bytes) -> TransportEvent {
        TransportEvent::Frame { peer: PeerId::new(from), payload: bytes }
    }

    #[test]
    fn test_pose_cadence_is_strictly_greater_than_interval() {
        let mut sync = synchronizer("me");
        assert!(sync.tick(0.04, player_data).unwrap().is_none());
        assert!(sync.tick(0.04, player_data).unwrap().is_none());
        assert!(sync.tick(0.04, player_data).unwrap().is_some());
        // Accumulator restarted from zero
        assert!(sync.tick(0.04, player_data).unwrap().is_none());

        // Reaching the interval exactly is not enough
        let mut sync = PeerStateSynchronizer::with_interval(PeerId::new("me"), Duration::from_millis(125));
        assert!(sync.tick(0.125, player_data).unwrap().is_none());
        assert!(sync.tick(0.001, player_data).unwrap().is_some());
    }

    #[test]
    fn test_non_positive_dt_does_not_advance() {
        let mut sync = synchronizer("me");
        assert!(sync.tick(-5.0, player_data).unwrap().is_none());
        assert!(sync.tick(0.0, player_data).unwrap().is_none());
        assert!(sync.tick(0.09, player_data).unwrap().is_none());
    }

    #[test]
    fn test_connect_and_disconnect_manage_players() {
        let mut sync = synchronizer("me");
        let bob = PeerId::new("bob");

        assert_eq!(
            sync.handle_transport_event(TransportEvent::PeerConnected(bob.clone())),
            vec![SyncEvent::Connected(bob.clone())]
        );
        assert!(sync.handle_transport_event(TransportEvent::PeerConnected(bob.clone())).is_empty());
        assert!(sync.player(&bob).is_some());

        assert_eq!(
            sync.handle_transport_event(TransportEvent::PeerDisconnected(bob.clone())),
            vec![SyncEvent::Disconnected(bob.clone())]
        );
        assert!(sync.player(&bob).is_none());
        assert!(sync.handle_transport_event(TransportEvent::PeerDisconnected(bob)).is_empty());
    }

    #[test]
    fn test_pose_frame_updates_player() {
        let mut alice = synchronizer("alice");
        let mut bob = synchronizer("bob");
        let bytes = alice.tick(0.2, player_data).unwrap().unwrap();

        let events = bob.handle_transport_event(frame("alice", bytes));
        let peer = PeerId::new("alice");
        assert_eq!(
            events,
            vec![
                SyncEvent::Connected(peer.clone()),
                SyncEvent::PoseUpdate { peer: peer.clone(), player: player_data() },
            ]
        );
        assert_eq!(bob.player(&peer).unwrap().frames_received, 1);
        assert_eq!(bob.player(&peer).unwrap().user_type, Some(UserType::ScreenUser));
    }

    #[test]
    fn test_grab_and_release_frames_dispatch() {
        let alice = synchronizer("alice");
        let mut bob = synchronizer("bob");
        bob.handle_transport_event(TransportEvent::PeerConnected(PeerId::new("alice")));

        let grab = GrabObjectEvent::new("sphere", 1, Vec3::new(0.0, 1.0, 1.2));
        let events = bob.handle_transport_event(frame("alice", alice.encode_grab(&grab).unwrap()));
        assert_eq!(events, vec![SyncEvent::Grabbed { peer: PeerId::new("alice"), grab }]);

        let release = ReleaseObjectEvent::dropped("sphere", 1, Vec3::ONE);
        let events = bob.handle_transport_event(frame("alice", alice.encode_release(&release).unwrap()));
        assert_eq!(events, vec![SyncEvent::Released { peer: PeerId::new("alice"), release }]);
    }

    #[test]
    fn test_bad_frames_are_dropped() {
        let mut bob = synchronizer("bob");
        assert!(bob.handle_transport_event(frame("alice", Bytes::from_static(b"{broken"))).is_empty());
        assert!(bob
            .handle_transport_event(frame("alice", Bytes::from_static(br#"{"userID":"alice","data":{"wave":1}}"#)))
            .is_empty());
        assert_eq!(bob.players().count(), 0);
    }

    #[test]
    fn test_own_frames_are_ignored() {
        let mut me = synchronizer("me");
        let bytes = me.tick(1.0, player_data).unwrap().unwrap();
        assert!(me.handle_transport_event(frame("me", bytes)).is_empty());
        assert!(me.handle_transport_event(TransportEvent::PeerConnected(PeerId::new("me"))).is_empty());
    }
}
