//! Calculation actor: a timer-driven worker that periodically reduces every
//! datacenter subtree while holding the shared state lock.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, info};

use crate::compute;
use crate::config::AgentConfig;
use crate::state::{LocationState, Shared};
use crate::store::MetricStore;

/// Spawns the calculation worker. Send `()` on the returned channel to stop it.
pub fn spawn_calculation(
    state: Shared<LocationState>,
    cfg: Shared<AgentConfig>,
    store: Arc<MetricStore>,
) -> (mpsc::Sender<()>, JoinHandle<()>) {
    let (term_tx, mut term_rx) = mpsc::channel::<()>(1);

    let handle = tokio::spawn(async move {
        info!("calculation actor started");
        loop {
            // re-read each pass so the interval can change at runtime;
            // a missed tick is not compensated
            let interval = Duration::from_secs(cfg.lock().polling_interval_secs);
            tokio::select! {
                _ = sleep(interval) => {
                    debug!("starting calculation");
                    let mut state = state.lock();
                    compute::run_pass(&mut state, &store);
                    debug!("end of calculation");
                }
                _ = term_rx.recv() => break,
            }
        }
        info!("calculation actor ended");
    });

    (term_tx, handle)
}
