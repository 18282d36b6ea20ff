//! Ambion ambient aggregation agent
//!
//! Mirrors the asset inventory and the freshest sensor readings from the bus,
//! then periodically publishes derived per-location averages:
//! - asset topology via the assets stream (create / update / delete)
//! - raw readings via the sensor metric stream
//! - `average.*` temperature/humidity metrics into the shared metric store

mod bus;
mod calc;
mod compute;
mod config;
mod models;
mod state;
mod store;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use bus::Command;
use state::{new_state, LocationState};
use store::MetricStore;

const AGENT_NAME: &str = "ambion-agent";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    info!("{} starting...", AGENT_NAME);

    let cfg = new_state(config::load_config().await);
    let state = new_state(LocationState::new());
    let store = {
        let dir = cfg.lock().metrics_dir.clone();
        Arc::new(MetricStore::new(dir).context("failed to open the metric store")?)
    };

    let (commands, mut ingest) = bus::spawn_ingest(state, cfg.clone(), store);

    let (host, port) = {
        let cfg = cfg.lock();
        (cfg.mqtt.host.clone(), cfg.mqtt.port)
    };
    commands
        .send(Command::Connect { host, port, identity: AGENT_NAME.into() })
        .await
        .context("ingest actor unavailable")?;
    commands.send(Command::Consumer { topic: bus::SENSOR_METRICS_TOPIC.into() }).await?;
    commands.send(Command::Consumer { topic: bus::ASSETS_TOPIC.into() }).await?;
    commands.send(Command::Start).await?;

    info!("{} started", AGENT_NAME);

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("failed to install the SIGTERM handler")?;
    let early = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
            let _ = commands.send(Command::Term).await;
            None
        }
        _ = sigterm.recv() => {
            info!("shutdown requested");
            let _ = commands.send(Command::Term).await;
            None
        }
        // on its own the actor only ends on a failed bootstrap
        res = &mut ingest => Some(res),
    };
    match early {
        Some(res) => res.context("ingest actor panicked")??,
        None => ingest.await.context("ingest actor panicked")??,
    }

    info!("{} ended", AGENT_NAME);
    Ok(())
}
