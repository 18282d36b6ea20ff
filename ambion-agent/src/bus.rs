//! Ingest actor: owns the MQTT client and the command channel, demultiplexes
//! the asset and sensor-metric streams into the shared state.
//!
//! The rumqttc event loop is polled in a background forwarder task that pushes
//! raw publishes into an mpsc channel; the actor itself selects over that
//! channel and its command channel, so every state mutation happens here.

use anyhow::{Context, Result};
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::calc;
use crate::config::AgentConfig;
use crate::models::{parse_finite, AssetEnvelope, MetricEnvelope};
use crate::state::{LocationState, Shared, TopologyError};
use crate::store::MetricStore;

/// Asset topology stream (create / update / delete envelopes)
pub const ASSETS_TOPIC: &str = "ambion/assets@v1";
/// Raw sensor metric stream
pub const SENSOR_METRICS_TOPIC: &str = "ambion/metrics/sensor@v1";
/// Request topic of the asset agent; a publish here triggers a full replay
pub const REPUBLISH_TOPIC: &str = "ambion/assets/republish@v1";

const REPUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// Commands understood by the ingest actor
#[derive(Debug)]
pub enum Command {
    Connect { host: String, port: u16, identity: String },
    Consumer { topic: String },
    Start,
    Term,
}

/// A raw message taken off the bus by the event-loop forwarder
#[derive(Debug)]
struct StreamMessage {
    topic: String,
    payload: Vec<u8>,
}

/// Spawns the ingest actor. The returned handle resolves with an error only
/// when the topology bootstrap fails; everything else is recovered in place.
pub fn spawn_ingest(
    state: Shared<LocationState>,
    cfg: Shared<AgentConfig>,
    store: Arc<MetricStore>,
) -> (mpsc::Sender<Command>, JoinHandle<Result<()>>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let handle = tokio::spawn(ingest_loop(state, cfg, store, cmd_rx));
    (cmd_tx, handle)
}

async fn ingest_loop(
    state: Shared<LocationState>,
    cfg: Shared<AgentConfig>,
    store: Arc<MetricStore>,
    mut cmd_rx: mpsc::Receiver<Command>,
) -> Result<()> {
    let mut client: Option<AsyncClient> = None;
    let mut calc_actor: Option<(mpsc::Sender<()>, JoinHandle<()>)> = None;
    let (stream_tx, mut stream_rx) = mpsc::channel::<StreamMessage>(256);

    info!("ingest actor started");
    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    None | Some(Command::Term) => break,
                    Some(Command::Connect { host, port, identity }) => {
                        client = Some(connect(&host, port, &identity, stream_tx.clone()));
                    }
                    Some(Command::Consumer { topic }) => match &client {
                        Some(c) => {
                            if let Err(e) = c.subscribe(&topic, QoS::AtLeastOnce).await {
                                error!("subscribe to {} failed: {}", topic, e);
                            } else {
                                info!("subscribed to {}", topic);
                            }
                        }
                        None => warn!("CONSUMER before CONNECT ignored ({})", topic),
                    },
                    Some(Command::Start) => {
                        let Some(c) = &client else {
                            warn!("START before CONNECT ignored");
                            continue;
                        };
                        if calc_actor.is_some() {
                            warn!("START ignored, already running");
                            continue;
                        }
                        // without the replay the topology mirror stays empty,
                        // so a failure here ends the actor
                        if let Err(e) = request_republish(c).await {
                            error!("asset replay request failed, cannot bootstrap: {:#}", e);
                            return Err(e);
                        }
                        info!("asset replay requested");
                        calc_actor = Some(calc::spawn_calculation(state.clone(), cfg.clone(), store.clone()));
                    }
                }
            }
            msg = stream_rx.recv() => {
                if let Some(msg) = msg {
                    handle_stream_message(&state, &store, &msg);
                }
            }
        }
    }

    // calculation worker first, then the bus client
    if let Some((term_tx, handle)) = calc_actor.take() {
        let _ = term_tx.send(()).await;
        let _ = handle.await;
    }
    drop(client);
    info!("ingest actor ended");
    Ok(())
}

/// Creates the MQTT client and spawns the event-loop forwarder task.
fn connect(host: &str, port: u16, identity: &str, tx: mpsc::Sender<StreamMessage>) -> AsyncClient {
    let mut options = MqttOptions::new(identity, host, port);
    options.set_keep_alive(Duration::from_secs(30));
    let (client, mut eventloop) = AsyncClient::new(options, 64);

    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(publish))) => {
                    let msg = StreamMessage {
                        topic: publish.topic.clone(),
                        payload: publish.payload.to_vec(),
                    };
                    if tx.send(msg).await.is_err() {
                        break; // ingest actor is gone
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    error!("MQTT connection error: {}", e);
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });

    info!("connected to {}:{} as {}", host, port, identity);
    client
}

/// Asks the asset agent to replay the whole inventory on the assets stream.
async fn request_republish(client: &AsyncClient) -> Result<()> {
    let payload = serde_json::json!({ "filter": "$all" }).to_string();
    tokio::time::timeout(
        REPUBLISH_TIMEOUT,
        client.publish(REPUBLISH_TOPIC, QoS::AtLeastOnce, false, payload),
    )
    .await
    .context("timed out requesting the asset replay")?
    .context("asset replay publish failed")?;
    Ok(())
}

fn handle_stream_message(state: &Shared<LocationState>, store: &MetricStore, msg: &StreamMessage) {
    match msg.topic.as_str() {
        SENSOR_METRICS_TOPIC => match serde_json::from_slice::<MetricEnvelope>(&msg.payload) {
            Ok(metric) => handle_sensor_metric(state, store, &metric),
            Err(e) => debug!("undecodable sensor metric dropped: {}", e),
        },
        ASSETS_TOPIC => match serde_json::from_slice::<AssetEnvelope>(&msg.payload) {
            Ok(asset) => handle_asset(state, &asset),
            Err(e) => debug!("undecodable asset message dropped: {}", e),
        },
        other => debug!("message from unhandled topic {} dropped", other),
    }
}

/// Caches a sensor reading and, when accepted, republishes it under the
/// normalized quantity so consumers can address the sensor directly.
fn handle_sensor_metric(state: &Shared<LocationState>, store: &MetricStore, metric: &MetricEnvelope) {
    debug!("sensor metric (sensor: {}, type: {})", metric.sensor_name(), metric.quantity);

    if !state.lock().cache_reading(metric) {
        return;
    }

    // quantities arrive as temperature.N / humidity.N where N is the probe
    // index on the owning device; normalize to .default for the sensor asset
    let quantity = if metric.quantity.contains("temperature") {
        "temperature.default"
    } else {
        "humidity.default"
    };
    match parse_finite(&metric.value) {
        Some(value) => {
            if let Err(e) = store.write_metric(quantity, metric.sensor_name(), value, &metric.unit, metric.ttl) {
                error!("republish of {}@{} failed: {}", quantity, metric.sensor_name(), e);
            }
        }
        None => info!(
            "cannot convert value '{}' of sensor {} to a number, republish skipped",
            metric.value,
            metric.sensor_name()
        ),
    }
}

fn handle_asset(state: &Shared<LocationState>, asset: &AssetEnvelope) {
    debug!("asset message ({} {})", asset.operation, asset.name);
    if let Err(e) = state.lock().apply(asset) {
        match e {
            // removing an asset we never learned about is routine
            TopologyError::Unknown(_) => debug!("{}", e),
            TopologyError::MissingParent(_) => error!("asset message dropped: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::new_state;
    use devkit::{AssetBuilder, MetricBuilder};
    use time::OffsetDateTime;

    fn metric_envelope(payload: serde_json::Value) -> MetricEnvelope {
        serde_json::from_value(payload).unwrap()
    }

    fn asset_envelope(payload: serde_json::Value) -> AssetEnvelope {
        serde_json::from_value(payload).unwrap()
    }

    #[test]
    fn test_cached_metric_is_republished_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetricStore::new(dir.path()).unwrap();
        let state = new_state(LocationState::new());
        state
            .lock()
            .apply(&asset_envelope(AssetBuilder::sensor("sensor-241", "rack-1", "input").build()))
            .unwrap();

        let now = OffsetDateTime::now_utc().unix_timestamp();
        let metric = metric_envelope(
            MetricBuilder::new("humidity.2", "EPDU-7", "40.5", "%").sensor("sensor-241").ttl(60).time(now).build(),
        );
        handle_sensor_metric(&state, &store, &metric);

        let stored = store.read_metric("sensor-241", "humidity.default").unwrap().unwrap();
        assert_eq!(stored.value, "40.50");
        assert_eq!(stored.unit, "%");
        assert_eq!(stored.ttl, 60);
    }

    #[test]
    fn test_unknown_sensor_metric_is_not_republished() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetricStore::new(dir.path()).unwrap();
        let state = new_state(LocationState::new());

        let metric = metric_envelope(
            MetricBuilder::new("temperature.0", "EPDU-7", "21", "C").sensor("sensor-404").ttl(60).time(0).build(),
        );
        handle_sensor_metric(&state, &store, &metric);

        assert!(store.read_metric("sensor-404", "temperature.default").unwrap().is_none());
    }

    #[test]
    fn test_unparseable_value_is_cached_but_not_republished() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetricStore::new(dir.path()).unwrap();
        let state = new_state(LocationState::new());
        state
            .lock()
            .apply(&asset_envelope(AssetBuilder::sensor("sensor-1", "rack-1", "input").build()))
            .unwrap();

        let metric = metric_envelope(
            MetricBuilder::new("temperature.0", "EPDU-7", "garbled", "C").sensor("sensor-1").ttl(60).time(0).build(),
        );
        handle_sensor_metric(&state, &store, &metric);

        assert!(state.lock().sensors["sensor-1"].temperature.is_some());
        assert!(store.read_metric("sensor-1", "temperature.default").unwrap().is_none());
    }

    #[test]
    fn test_asset_dispatch_updates_topology() {
        let state = new_state(LocationState::new());
        handle_asset(&state, &asset_envelope(AssetBuilder::datacenter("dc-1").build()));
        handle_asset(&state, &asset_envelope(AssetBuilder::sensor("sensor-1", "dc-1", "input").build()));

        let locked = state.lock();
        assert_eq!(locked.datacenters, vec!["dc-1"]);
        assert_eq!(locked.contents["dc-1"], vec!["sensor-1"]);
    }

    #[test]
    fn test_bad_asset_leaves_state_untouched() {
        let state = new_state(LocationState::new());
        // sensor without a logical_asset has no resolvable parent
        let orphan = asset_envelope(AssetBuilder::sensor("sensor-1", "", "input").build());
        handle_asset(&state, &orphan);

        let locked = state.lock();
        assert!(locked.containers.is_empty());
        assert!(locked.contents.is_empty());
    }
}
