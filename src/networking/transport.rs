//! Peer transport layer
//!
//! A transport delivers opaque frames between room members and tells the
//! room when members join or leave. Per-peer delivery order is preserved;
//! nothing is promised across different peers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::networking::{NetworkError, NetworkResult, PeerId};

/// Something that happened on the transport since the last poll
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    PeerConnected(PeerId),
    PeerDisconnected(PeerId),
    Frame { peer: PeerId, payload: Bytes },
}

/// Byte-level connection to every other room member
pub trait PeerTransport {
    fn local_id(&self) -> &PeerId;

    /// Send one frame to every connected peer
    fn broadcast(&self, payload: Bytes) -> NetworkResult<()>;

    /// Next pending event, without blocking
    fn poll_event(&mut self) -> Option<TransportEvent>;
}

type Members = HashMap<PeerId, mpsc::UnboundedSender<TransportEvent>>;

/// In-process room: every joined transport sees every other one.
///
/// Used for local sessions and tests in place of a real data channel.
#[derive(Clone, Default)]
pub struct LoopbackHub {
    members: Arc<Mutex<Members>>,
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> NetworkResult<MutexGuard<'_, Members>> {
        self.members
            .lock()
            .map_err(|_| NetworkError::Transport { reason: "loopback hub lock poisoned".to_string() })
    }

    /// Add a member. Existing members are told about it and it is told about them.
    pub fn join(&self, id: impl Into<PeerId>) -> NetworkResult<ChannelTransport> {
        let id = id.into();
        let mut members = self.lock()?;
        if members.contains_key(&id) {
            return Err(NetworkError::Transport { reason: format!("peer {} already joined", id) });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        for (existing, sender) in members.iter() {
            if sender.send(TransportEvent::PeerConnected(id.clone())).is_err() {
                debug!("Member {} stopped listening", existing);
            }
            if tx.send(TransportEvent::PeerConnected(existing.clone())).is_err() {
                debug!("{} stopped listening before joining", id);
            }
        }
        members.insert(id.clone(), tx);

        info!("🔗 {} joined loopback room ({} members)", id, members.len());
        Ok(ChannelTransport {
            local_id: id,
            hub: self.clone(),
            rx,
        })
    }

    pub fn member_count(&self) -> usize {
        self.lock().map(|m| m.len()).unwrap_or(0)
    }

    fn send_from(&self, from: &PeerId, payload: Bytes) -> NetworkResult<()> {
        let members = self.lock()?;
        if !members.contains_key(from) {
            return Err(NetworkError::PeerNotFound { peer: from.clone() });
        }
        for (peer, sender) in members.iter().filter(|(peer, _)| *peer != from) {
            let event = TransportEvent::Frame {
                peer: from.clone(),
                payload: payload.clone(),
            };
            if sender.send(event).is_err() {
                warn!("Dropping frame for {}, receiver gone", peer);
            }
        }
        Ok(())
    }

    fn leave(&self, id: &PeerId) {
        let Ok(mut members) = self.lock() else { return };
        if members.remove(id).is_none() {
            return;
        }
        for (peer, sender) in members.iter() {
            if sender.send(TransportEvent::PeerDisconnected(id.clone())).is_err() {
                debug!("Member {} stopped listening", peer);
            }
        }
        info!("👋 {} left loopback room ({} members)", id, members.len());
    }
}

/// One member's end of a [`LoopbackHub`]. Dropping it leaves the room.
pub struct ChannelTransport {
    local_id: PeerId,
    hub: LoopbackHub,
    rx: mpsc::UnboundedReceiver<TransportEvent>,
}

impl PeerTransport for ChannelTransport {
    fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    fn broadcast(&self, payload: Bytes) -> NetworkResult<()> {
        self.hub.send_from(&self.local_id, payload)
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for ChannelTransport {
    fn drop(&mut self) {
        self.hub.leave(&self.local_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(transport: &mut ChannelTransport) -> Vec<TransportEvent> {
        std::iter::from_fn(|| transport.poll_event()).collect()
    }

    #[tokio::test]
    async fn test_join_announces_both_ways() {
        let hub = LoopbackHub::new();
        let mut alice = hub.join("alice").unwrap();
        let mut bob = hub.join("bob").unwrap();

        assert_eq!(drain(&mut alice), vec![TransportEvent::PeerConnected(PeerId::new("bob"))]);
        assert_eq!(drain(&mut bob), vec![TransportEvent::PeerConnected(PeerId::new("alice"))]);
        assert_eq!(hub.member_count(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_join_is_rejected() {
        let hub = LoopbackHub::new();
        let _alice = hub.join("alice").unwrap();
        assert!(matches!(hub.join("alice"), Err(NetworkError::Transport { .. })));
    }

    #[tokio::test]
    async fn test_broadcast_skips_sender_and_keeps_order() {
        let hub = LoopbackHub::new();
        let mut alice = hub.join("alice").unwrap();
        let mut bob = hub.join("bob").unwrap();
        drain(&mut alice);
        drain(&mut bob);

        alice.broadcast(Bytes::from_static(b"one")).unwrap();
        alice.broadcast(Bytes::from_static(b"two")).unwrap();

        assert!(drain(&mut alice).is_empty());
        let payloads: Vec<Bytes> = drain(&mut bob)
            .into_iter()
            .filter_map(|event| match event {
                TransportEvent::Frame { peer, payload } if peer.as_str() == "alice" => Some(payload),
                _ => None,
            })
            .collect();
        assert_eq!(payloads, vec![Bytes::from_static(b"one"), Bytes::from_static(b"two")]);
    }

    #[tokio::test]
    async fn test_drop_announces_leave() {
        let hub = LoopbackHub::new();
        let mut alice = hub.join("alice").unwrap();
        let bob = hub.join("bob").unwrap();
        drain(&mut alice);

        drop(bob);
        assert_eq!(drain(&mut alice), vec![TransportEvent::PeerDisconnected(PeerId::new("bob"))]);
        assert_eq!(hub.member_count(), 1);
    }
}
