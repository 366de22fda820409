//! Signaling service client
//!
//! The signaling server hands out peer ids and reports who is currently in
//! the room. Membership is polled; a poll answered with HTTP 408 means our
//! id expired and we have to initialise again.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SyncSettings;
use crate::networking::transport::TransportEvent;
use crate::networking::{NetworkError, NetworkResult, PeerId};

/// Result of one membership poll
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Connections(Vec<PeerId>),
    /// The server no longer knows our id
    Expired,
}

#[async_trait]
pub trait SignalingService: Send + Sync {
    /// Register with the server and get our peer id
    async fn initialize(&self) -> NetworkResult<PeerId>;

    /// Current room membership as seen by the server
    async fn poll(&self, id: &PeerId) -> NetworkResult<PollOutcome>;
}

/// Ids arrive as JSON numbers or strings depending on the server
fn peer_id_from_json(value: &Value) -> PeerId {
    match value {
        Value::String(s) => PeerId::new(s.as_str()),
        other => PeerId::new(other.to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct InitializeResponse {
    id: Value,
}

#[derive(Debug, Deserialize)]
struct PollResponse {
    #[serde(default)]
    connections: Vec<Value>,
}

pub struct HttpSignaling {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSignaling {
    pub fn new(base_url: impl Into<String>) -> NetworkResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_settings(settings: &SyncSettings) -> NetworkResult<Self> {
        Self::new(settings.signaling_url.clone())
    }
}

#[async_trait]
impl SignalingService for HttpSignaling {
    async fn initialize(&self) -> NetworkResult<PeerId> {
        let url = format!("{}/initialize", self.base_url);
        debug!("Initializing with signaling server at {}", url);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(NetworkError::Signaling {
                reason: format!("initialize failed with status {}", response.status()),
            });
        }
        let body: InitializeResponse = response.json().await?;
        let id = peer_id_from_json(&body.id);
        info!("🎫 Signaling server assigned id {}", id);
        Ok(id)
    }

    async fn poll(&self, id: &PeerId) -> NetworkResult<PollOutcome> {
        let url = format!("{}/poll", self.base_url);
        let response = self.client.post(&url).json(&json!({ "id": id })).send().await?;
        match response.status() {
            StatusCode::REQUEST_TIMEOUT => Ok(PollOutcome::Expired),
            status if status.is_success() => {
                let body: PollResponse = response.json().await?;
                Ok(PollOutcome::Connections(body.connections.iter().map(peer_id_from_json).collect()))
            }
            status => Err(NetworkError::Signaling {
                reason: format!("poll failed with status {}", status),
            }),
        }
    }
}

/// Connect/disconnect events that turn `known` into `current`, updating `known`.
/// Our own id is never reported.
pub fn diff_membership(known: &mut BTreeSet<PeerId>, current: &[PeerId], local: &PeerId) -> Vec<TransportEvent> {
    let current: BTreeSet<PeerId> = current.iter().filter(|id| *id != local).cloned().collect();

    let mut events: Vec<TransportEvent> = known
        .difference(&current)
        .cloned()
        .map(TransportEvent::PeerDisconnected)
        .collect();
    events.extend(current.difference(known).cloned().map(TransportEvent::PeerConnected));

    *known = current;
    events
}

/// Poll membership every `interval` and forward changes to `events`.
///
/// The task re-initialises when the server expires our id and stops once the
/// receiving side is dropped.
pub fn spawn_membership_task(
    service: Arc<dyn SignalingService>,
    local: PeerId,
    interval: Duration,
    events: mpsc::UnboundedSender<TransportEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut local = local;
        let mut known = BTreeSet::new();

        while !events.is_closed() {
            tokio::time::sleep(interval).await;

            match service.poll(&local).await {
                Ok(PollOutcome::Connections(current)) => {
                    for event in diff_membership(&mut known, &current, &local) {
                        if events.send(event).is_err() {
                            return;
                        }
                    }
                }
                Ok(PollOutcome::Expired) => {
                    warn!("⏰ Signaling id {} expired, initializing again", local);
                    match service.initialize().await {
                        Ok(id) => local = id,
                        Err(e) => warn!("Failed to re-initialize with signaling server: {}", e),
                    }
                }
                Err(e) => warn!("Membership poll failed: {}", e),
            }
        }
        debug!("Membership task stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedSignaling {
        ids: Mutex<VecDeque<&'static str>>,
        polls: Mutex<VecDeque<PollOutcome>>,
        polled_with: Mutex<Vec<PeerId>>,
    }

    impl ScriptedSignaling {
        fn new(ids: &[&'static str], polls: Vec<PollOutcome>) -> Self {
            Self {
                ids: Mutex::new(ids.iter().copied().collect()),
                polls: Mutex::new(polls.into()),
                polled_with: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SignalingService for ScriptedSignaling {
        async fn initialize(&self) -> NetworkResult<PeerId> {
            self.ids
                .lock()
                .unwrap()
                .pop_front()
                .map(PeerId::new)
                .ok_or(NetworkError::Signaling { reason: "no more ids".into() })
        }

        async fn poll(&self, id: &PeerId) -> NetworkResult<PollOutcome> {
            self.polled_with.lock().unwrap().push(id.clone());
            Ok(self
                .polls
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(PollOutcome::Connections(Vec::new())))
        }
    }

    fn ids(names: &[&str]) -> Vec<PeerId> {
        names.iter().map(|n| PeerId::new(*n)).collect()
    }

    #[test]
    fn test_diff_membership_reports_changes_and_skips_self() {
        let me = PeerId::new("me");
        let mut known = BTreeSet::new();

        let events = diff_membership(&mut known, &ids(&["me", "b", "a"]), &me);
        assert_eq!(
            events,
            vec![
                TransportEvent::PeerConnected(PeerId::new("a")),
                TransportEvent::PeerConnected(PeerId::new("b")),
            ]
        );

        let events = diff_membership(&mut known, &ids(&["b", "c"]), &me);
        assert_eq!(
            events,
            vec![
                TransportEvent::PeerDisconnected(PeerId::new("a")),
                TransportEvent::PeerConnected(PeerId::new("c")),
            ]
        );

        assert!(diff_membership(&mut known, &ids(&["c", "b"]), &me).is_empty());
    }

    #[test]
    fn test_numeric_ids_are_accepted() {
        assert_eq!(peer_id_from_json(&json!(42)), PeerId::new("42"));
        assert_eq!(peer_id_from_json(&json!("abc")), PeerId::new("abc"));
    }

    #[tokio::test]
    async fn test_membership_task_forwards_events_and_reinitializes() {
        let service = Arc::new(ScriptedSignaling::new(
            &["me-2"],
            vec![
                PollOutcome::Connections(ids(&["a"])),
                PollOutcome::Expired,
                PollOutcome::Connections(ids(&["a", "b", "me-2"])),
            ],
        ));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = spawn_membership_task(service.clone(), PeerId::new("me"), Duration::from_millis(1), tx);

        let mut received = Vec::new();
        while received.len() < 2 {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
            received.push(event);
        }
        assert_eq!(
            received,
            vec![
                TransportEvent::PeerConnected(PeerId::new("a")),
                TransportEvent::PeerConnected(PeerId::new("b")),
            ]
        );

        drop(rx);
        tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();

        let polled_with = service.polled_with.lock().unwrap();
        assert_eq!(polled_with[0], PeerId::new("me"));
        assert_eq!(polled_with[2], PeerId::new("me-2"));
    }
}
