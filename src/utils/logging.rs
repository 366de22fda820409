use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};
use std::env;
use std::fs;
use std::io;

use crate::config::RoomSettings;

const LOG_FILE: &str = "log.txt";

/// Initialize logging: console always, `log.txt` when `log_to_file` is set
pub fn init_logging(log_to_file: bool) {
    let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let enable_backtrace = env::var("RUST_BACKTRACE").unwrap_or_else(|_| "0".to_string()) == "1";

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut filter = EnvFilter::new(&log_level);
        if let Ok(directive) = "shared_room=debug".parse() {
            filter = filter.add_directive(directive);
        }
        filter
    });

    let console_layer = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(true);

    // One file per session, cleaned on startup
    let file_layer = if log_to_file {
        if let Err(e) = fs::remove_file(LOG_FILE) {
            if e.kind() != io::ErrorKind::NotFound {
                eprintln!("Warning: Failed to remove existing {}: {}", LOG_FILE, e);
            }
        }
        match fs::File::create(LOG_FILE) {
            Ok(file) => Some(
                fmt::layer()
                    .with_writer(file)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_ansi(false)
                    .boxed(),
            ),
            Err(e) => {
                eprintln!("Warning: Failed to create {}: {}", LOG_FILE, e);
                None
            }
        }
    } else {
        None
    };

    let file_enabled = file_layer.is_some();

    // try_init so tests and embedders that already installed a subscriber keep theirs
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    std::panic::set_hook(Box::new(move |panic_info| {
        tracing::error!("Panic occurred: {}", panic_info);

        if let Some(location) = panic_info.location() {
            tracing::error!(
                "Panic location: {}:{}:{}",
                location.file(),
                location.line(),
                location.column()
            );
        }

        if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            tracing::error!("Panic payload: {}", s);
        }

        if enable_backtrace {
            tracing::error!("Backtrace:\n{:?}", std::backtrace::Backtrace::capture());
        }
    }));

    tracing::info!("Logging initialized with level: {}", log_level);
    tracing::info!("File logging enabled: {}", file_enabled);
    tracing::info!("Backtrace enabled: {}", enable_backtrace);
}

/// Log session information for debugging
pub fn log_session_info(settings: &RoomSettings) {
    tracing::info!("=== Session Information ===");
    tracing::info!("OS: {}", std::env::consts::OS);
    tracing::info!("Architecture: {}", std::env::consts::ARCH);
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Profile: {:?}", settings.profile);
    tracing::info!("Start mode: {:?}", settings.session.start_mode);
    tracing::info!(
        "Physics: step {:.4}s, gravity {:?}",
        settings.physics.fixed_timestep,
        settings.physics.gravity
    );
    tracing::info!(
        "Sync: every {}ms, release on disconnect: {}",
        settings.sync.send_interval_ms,
        settings.sync.release_on_disconnect
    );
    tracing::info!("===========================");
}
