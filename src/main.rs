use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use glam::Vec3;
use tokio::sync::mpsc;
use tracing::info;

use shared_room::config::{load_room_settings, RoomProfile, RoomSettings, SessionMode};
use shared_room::networking::signaling::{spawn_membership_task, HttpSignaling, SignalingService};
use shared_room::networking::LoopbackHub;
use shared_room::utils::logging::{init_logging, log_session_info};
use shared_room::utils::math::Transform;
use shared_room::Room;

const FRAME: Duration = Duration::from_millis(16);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = load_room_settings().unwrap_or_else(|| RoomSettings::for_profile(RoomProfile::Vr));
    init_logging(settings.session.log_to_file);
    log_session_info(&settings);
    info!("🚀 {} {}", shared_room::APP_NAME, shared_room::VERSION);

    if std::env::args().any(|arg| arg == "--signaling") {
        watch_membership(&settings).await
    } else {
        run_local_session(settings).await
    }
}

/// Two participants in one process: alice throws the sphere, bob watches
async fn run_local_session(settings: RoomSettings) -> anyhow::Result<()> {
    let hub = LoopbackHub::new();

    let mut alice_settings = settings.clone();
    alice_settings.session.start_mode = SessionMode::Vr;
    let mut alice = Room::new(alice_settings, hub.join("alice")?);
    alice.populate_default_props()?;

    let mut bob_settings = settings;
    bob_settings.session.start_mode = SessionMode::Screen;
    let mut bob = Room::new(bob_settings, hub.join("bob")?);
    bob.populate_default_props()?;

    // Controller 0 just behind the sphere, pointing at it
    let mut hand = Vec3::new(0.0, 2.0, -1.3);
    alice.set_controller_transform(0, Transform::from_translation(hand));
    alice.select_start(0);

    let dt = FRAME.as_secs_f32();
    let mut interval = tokio::time::interval(FRAME);
    for frame in 0..180u32 {
        interval.tick().await;

        if (1..=30).contains(&frame) {
            hand += Vec3::new(0.05, 0.02, 0.0);
            alice.set_controller_transform(0, Transform::from_translation(hand));
        }
        if frame == 30 {
            alice.select_end(0);
        }

        let summary = alice.tick(dt);
        for grab in &summary.grabs {
            info!("alice grabbed '{}'", grab.object_name);
        }
        for release in &summary.releases {
            info!("alice threw '{}' at {}", release.object_name, release.object_velocity);
        }
        let summary = bob.tick(dt);
        for event in &summary.remote {
            tracing::debug!("bob saw {:?}", event);
        }
    }

    let alice_view = alice.registry().body_state("sphere")?;
    let bob_view = bob.registry().body_state("sphere")?;
    info!("🏁 sphere according to alice: {}", alice_view.position);
    info!("🏁 sphere according to bob:   {}", bob_view.position);
    Ok(())
}

/// Log who the signaling server reports in the room until interrupted
async fn watch_membership(settings: &RoomSettings) -> anyhow::Result<()> {
    let service = Arc::new(HttpSignaling::from_settings(&settings.sync)?);
    let local = service
        .initialize()
        .await
        .with_context(|| format!("could not reach signaling server at {}", settings.sync.signaling_url))?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let task = spawn_membership_task(
        service,
        local,
        Duration::from_millis(settings.sync.poll_interval_ms),
        tx,
    );

    loop {
        tokio::select! {
            Some(event) = rx.recv() => info!("📡 {:?}", event),
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    task.abort();
    Ok(())
}
