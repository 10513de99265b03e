use anyhow::{Context, Result};
use std::time::Duration;
use tally_core::ledger::AttendanceLedger;
use tally_core::{KioskSession, SessionConfig, SystemClock};
use tally_hw::Camera;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

mod analyzer;
mod config;
mod dbus_interface;
mod engine;
mod location;
mod samples;
mod store;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("tallyd starting");

    let config = config::Config::from_env();

    let labels = match config::Roster::load(&config.roster_path) {
        Ok(roster) => {
            tracing::info!(labels = roster.labels.len(), path = %config.roster_path.display(), "roster loaded");
            roster.labels
        }
        Err(err) => {
            tracing::warn!(
                path = %config.roster_path.display(),
                error = %err,
                "roster unavailable; detection start will be refused until it is fixed"
            );
            Vec::new()
        }
    };

    let store = store::SqliteStore::open(&config.db_path)
        .with_context(|| format!("opening attendance db at {}", config.db_path.display()))?;
    tracing::info!(path = %config.db_path.display(), "attendance store opened");

    // Blocking zbus connections must not be built on the async runtime.
    let face_analyzer = tokio::task::spawn_blocking(analyzer::FaceLensAnalyzer::connect)
        .await?
        .context("connecting to the face-analysis service")?;

    let (position_tx, position_rx) = watch::channel(None);
    location::spawn_watcher(position_tx);

    let session = KioskSession::new(
        SessionConfig {
            labels,
            samples_per_label: config.samples_per_label,
            match_threshold: config.match_threshold,
            geofence: config.geofence,
        },
        Box::new(Camera::new(&config.camera_device)),
        Box::new(face_analyzer),
        Box::new(samples::DirSamples::new(&config.sample_dir)),
        Box::new(location::WatchedPosition::new(position_rx)),
        AttendanceLedger::new(Box::new(store), Box::new(SystemClock)),
    );

    let engine = engine::spawn_engine(session, Duration::from_millis(config.tick_ms));

    let _connection = zbus::connection::Builder::session()?
        .name("org.freedesktop.Tally1")?
        .serve_at(
            "/org/freedesktop/Tally1",
            dbus_interface::TallyService::new(engine),
        )?
        .build()
        .await
        .context("registering org.freedesktop.Tally1 on the session bus")?;

    tracing::info!("tallyd ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("tallyd shutting down");

    Ok(())
}
