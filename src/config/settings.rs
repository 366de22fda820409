use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use directories::ProjectDirs;
use serde::{Serialize, Deserialize};

const ROOM_CONFIG_FILE: &str = "room.toml";

// =============================================================================
// Room Configuration System
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomProfile {
    Desktop,  // Mouse-look screen user
    Vr,       // Headset with two tracked controllers
    Headless, // No local input, used by bots and tests
    Custom,   // User-edited file
}

impl Default for RoomProfile {
    fn default() -> Self {
        Self::Desktop
    }
}

/// Which user rig a session starts with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    Screen,
    Vr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsSettings {
    pub gravity: [f32; 3],
    pub fixed_timestep: f32,
    pub max_substeps: u32,
    pub ground_height: f32,
    pub restitution: f32,
}

impl Default for PhysicsSettings {
    fn default() -> Self {
        Self {
            gravity: [0.0, -9.82, 0.0],
            fixed_timestep: 1.0 / 60.0,
            max_substeps: 10,
            ground_height: -1.325,
            restitution: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GrabSettings {
    pub throw_window: usize,
    pub max_ray_length: f32,
    pub tracking_point_offset: [f32; 3],
    pub reset_throw_history_on_grab: bool,
    pub desktop_grab: bool,
}

impl Default for GrabSettings {
    fn default() -> Self {
        Self {
            throw_window: 10,
            max_ray_length: 5.0,
            tracking_point_offset: [0.0, 0.05, 0.0],
            reset_throw_history_on_grab: false,
            desktop_grab: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub send_interval_ms: u64,
    pub release_on_disconnect: bool,
    pub signaling_url: String,
    pub poll_interval_ms: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            send_interval_ms: 100,
            release_on_disconnect: true,
            signaling_url: "http://localhost:3000/api".to_string(),
            poll_interval_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub start_mode: SessionMode,
    pub log_to_file: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            start_mode: SessionMode::Screen,
            log_to_file: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomSettings {
    pub profile: RoomProfile,
    pub physics: PhysicsSettings,
    pub grab: GrabSettings,
    pub sync: SyncSettings,
    pub session: SessionSettings,
}

impl RoomSettings {
    pub fn for_profile(profile: RoomProfile) -> Self {
        let (grab, session) = match profile {
            RoomProfile::Desktop => (
                GrabSettings {
                    desktop_grab: true,
                    ..GrabSettings::default()
                },
                SessionSettings {
                    start_mode: SessionMode::Screen,
                    log_to_file: true,
                },
            ),
            RoomProfile::Vr => (
                GrabSettings::default(),
                SessionSettings {
                    start_mode: SessionMode::Vr,
                    log_to_file: true,
                },
            ),
            RoomProfile::Headless => (
                GrabSettings::default(),
                SessionSettings {
                    start_mode: SessionMode::Screen,
                    log_to_file: false,
                },
            ),
            RoomProfile::Custom => (GrabSettings::default(), SessionSettings::default()),
        };

        Self {
            profile,
            physics: PhysicsSettings::default(),
            grab,
            sync: SyncSettings::default(),
            session,
        }
    }

    /// Parse settings from TOML; missing sections and keys fall back to defaults
    pub fn from_toml_str(data: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(data)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

pub type RoomSettingsHandle = Arc<RwLock<RoomSettings>>;

pub fn create_room_settings_handle(settings: RoomSettings) -> RoomSettingsHandle {
    Arc::new(RwLock::new(settings))
}

fn room_config_path() -> Option<PathBuf> {
    ProjectDirs::from("com", "shared-room", "shared-room")
        .map(|proj| proj.config_dir().join(ROOM_CONFIG_FILE))
}

pub fn save_room_settings(settings: &RoomSettings) -> std::io::Result<()> {
    if let Some(path) = room_config_path() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let toml = settings
            .to_toml_string()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(path, toml)?;
    }
    Ok(())
}

pub fn load_room_settings() -> Option<RoomSettings> {
    if let Some(path) = room_config_path() {
        if let Ok(data) = fs::read_to_string(path) {
            match RoomSettings::from_toml_str(&data) {
                Ok(settings) => return Some(settings),
                Err(e) => tracing::warn!("Ignoring malformed {}: {}", ROOM_CONFIG_FILE, e),
            }
        }
    }
    None
}
