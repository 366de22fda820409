// shared-room: a shared physics room with grab/release ownership between peers

pub mod app;
pub mod config;
pub mod networking;
pub mod rendering;
pub mod utils;
pub mod world;

// Re-export commonly used types for convenience
pub use app::{LocalInput, Room, TickSummary};
pub use config::{RoomProfile, RoomSettings, SessionMode};
pub use networking::{NetworkError, NetworkResult, PeerId};
pub use world::{WorldError, WorldResult};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
