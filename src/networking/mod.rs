//! Peer networking for the shared room
//!
//! Frames are JSON envelopes broadcast to every connected peer. The
//! synchronizer turns local state into frames and frames into typed events;
//! transports only move bytes and announce peers joining or leaving.

pub mod protocol;
pub mod signaling;
pub mod sync;
pub mod transport;

// Re-export main types for convenience
pub use protocol::messages::{Envelope, GrabObject, Payload, PlayerData, PoseData, ReleaseObject, UserType};
pub use signaling::{HttpSignaling, PollOutcome, SignalingService};
pub use sync::{PeerStateSynchronizer, SyncEvent};
pub use transport::{ChannelTransport, LoopbackHub, PeerTransport, TransportEvent};

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum NetworkError {
    #[error("Frame decode failed: {reason}")]
    Decode { reason: String },

    #[error("Frame encode failed: {reason}")]
    Encode { reason: String },

    #[error("Transport error: {reason}")]
    Transport { reason: String },

    #[error("Signaling error: {reason}")]
    Signaling { reason: String },

    #[error("Peer not found: {peer}")]
    PeerNotFound { peer: PeerId },

    #[error("Request timed out")]
    Timeout,
}

pub type NetworkResult<T> = Result<T, NetworkError>;

impl From<std::io::Error> for NetworkError {
    fn from(err: std::io::Error) -> Self {
        NetworkError::Transport { reason: err.to_string() }
    }
}

impl From<reqwest::Error> for NetworkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            NetworkError::Timeout
        } else {
            NetworkError::Signaling { reason: err.to_string() }
        }
    }
}

/// Opaque peer identifier handed out by the signaling service
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        PeerId(id.into())
    }

    /// Fresh id for sessions without a signaling server
    pub fn random() -> Self {
        PeerId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        PeerId::new(id)
    }
}

impl From<String> for PeerId {
    fn from(id: String) -> Self {
        PeerId(id)
    }
}
