pub mod settings;

// Re-export commonly used types
pub use settings::{
    RoomProfile, RoomSettings, RoomSettingsHandle, SessionMode,
    PhysicsSettings, GrabSettings, SyncSettings, SessionSettings,
    create_room_settings_handle, save_room_settings, load_room_settings,
};
