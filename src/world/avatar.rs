use std::time::Instant;

use crate::networking::protocol::messages::{PlayerData, UserType};
use crate::networking::PeerId;
use crate::utils::math::Transform;

/// Another participant in the room, as last reported over the network
#[derive(Debug, Clone)]
pub struct RemotePlayer {
    pub id: PeerId,
    pub user_type: Option<UserType>,
    pub body: Transform,
    pub head: Transform,
    pub hands: [Transform; 2],
    pub frames_received: u64,
    pub last_update: Option<Instant>,
}

impl RemotePlayer {
    pub fn new(id: PeerId) -> Self {
        Self {
            id,
            user_type: None,
            body: Transform::IDENTITY,
            head: Transform::IDENTITY,
            hands: [Transform::IDENTITY; 2],
            frames_received: 0,
            last_update: None,
        }
    }

    /// Last-write-wins pose update
    pub fn apply_pose(&mut self, data: &PlayerData) {
        self.user_type = Some(data.user_type);
        self.body = data.body.to_transform();
        self.head = data.head.to_transform();
        self.hands = [data.hand0.to_transform(), data.hand1.to_transform()];
        self.frames_received += 1;
        self.last_update = Some(Instant::now());
    }

    pub fn hand(&self, index: usize) -> Option<Transform> {
        self.hands.get(index).copied()
    }

    /// Whether a pose frame has arrived yet
    pub fn has_pose(&self) -> bool {
        self.frames_received > 0
    }

    /// Display colour derived from the peer id, so every client paints the same player alike
    pub fn color(&self) -> [u8; 3] {
        avatar_color(self.id.as_str())
    }
}

/// Hex digits of each character code (last four per character), first six taken as RGB
pub fn avatar_color(id: &str) -> [u8; 3] {
    let mut digits = String::new();
    for c in id.chars() {
        let hex = format!("{:x}", c as u32);
        digits.push_str(&hex[hex.len().saturating_sub(4)..]);
        if digits.len() >= 6 {
            break;
        }
    }
    while digits.len() < 6 {
        digits.push('0');
    }

    let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).unwrap_or(0);
    [channel(0), channel(2), channel(4)]
}
