//! Periodic reduction over the location tree.
//!
//! Each pass walks every datacenter root post-order, folds the fresh sensor
//! readings of a subtree into per-side (input/output) averages and publishes:
//! - `average.<kind>-input` / `average.<kind>-output` for racks and rows,
//! - a combined `average.<kind>` for every container above rack level.
//!
//! NaN marks "no contribution" throughout; a slot is only averaged over the
//! children that actually contributed to it.

use time::OffsetDateTime;
use tracing::{debug, error, info};

use crate::models::parse_finite;
use crate::state::LocationState;
use crate::store::MetricStore;

/// Bound on location nesting; past this a subtree contributes nothing.
const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy)]
pub struct Slot {
    pub value: f64,
    pub ttl: u32,
}

impl Slot {
    fn empty() -> Self {
        Slot { value: f64::NAN, ttl: 0 }
    }

    fn zero() -> Self {
        Slot { value: 0.0, ttl: 0 }
    }

    fn has_value(&self) -> bool {
        !self.value.is_nan()
    }
}

/// Averages carried from a node to its parent during the reduction.
#[derive(Debug, Clone, Copy)]
pub struct AmbientValues {
    pub in_temperature: Slot,
    pub out_temperature: Slot,
    pub in_humidity: Slot,
    pub out_humidity: Slot,
}

impl AmbientValues {
    fn empty() -> Self {
        AmbientValues {
            in_temperature: Slot::empty(),
            out_temperature: Slot::empty(),
            in_humidity: Slot::empty(),
            out_humidity: Slot::empty(),
        }
    }

    fn zeroed() -> Self {
        AmbientValues {
            in_temperature: Slot::zero(),
            out_temperature: Slot::zero(),
            in_humidity: Slot::zero(),
            out_humidity: Slot::zero(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Kind {
    Humidity,
    Temperature,
}

/// One tick: reduce every datacenter root in arrival order.
pub fn run_pass(state: &mut LocationState, store: &MetricStore) {
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let roots = state.datacenters.clone();
    for datacenter in &roots {
        compute_location(state, store, datacenter, now, 0);
    }
}

/// Post-order reduction of one subtree. Publishes what the node mandates and
/// returns the values its parent folds in.
fn compute_location(
    state: &mut LocationState,
    store: &MetricStore,
    name: &str,
    now: i64,
    depth: usize,
) -> AmbientValues {
    let mut result = AmbientValues::empty();

    if depth >= MAX_DEPTH {
        error!("location nesting too deep at '{}', subtree skipped", name);
        return result;
    }

    // sensors short-circuit: both kinds read straight from the cache
    if sensor_values(state, name, Kind::Humidity, now, &mut result) {
        sensor_values(state, name, Kind::Temperature, now, &mut result);
        return result;
    }

    // neither a sensor nor a known location
    let Some(children) = state.contents.get(name).cloned() else {
        return result;
    };

    result = AmbientValues::zeroed();
    let (mut n_out_t, mut n_out_h, mut n_in_t, mut n_in_h) = (0usize, 0usize, 0usize, 0usize);
    for child in &children {
        let c = compute_location(state, store, child, now, depth + 1);
        fold(&mut result.out_temperature, &mut n_out_t, c.out_temperature);
        fold(&mut result.out_humidity, &mut n_out_h, c.out_humidity);
        fold(&mut result.in_temperature, &mut n_in_t, c.in_temperature);
        fold(&mut result.in_humidity, &mut n_in_h, c.in_humidity);
    }

    let side = publishable_as_side(name);
    finish_side(&mut result.out_temperature, n_out_t, side, store, "average.temperature-output", "C", name);
    finish_side(&mut result.out_humidity, n_out_h, side, store, "average.humidity-output", "%", name);
    finish_side(&mut result.in_temperature, n_in_t, side, store, "average.temperature-input", "C", name);
    finish_side(&mut result.in_humidity, n_in_h, side, store, "average.humidity-input", "%", name);

    // racks keep their side averages; above them only the combined
    // aggregate travels up
    if !name.starts_with("rack-") {
        combine(&mut result.in_humidity, &mut result.out_humidity, store, "average.humidity", "%", name);
        combine(&mut result.in_temperature, &mut result.out_temperature, store, "average.temperature", "C", name);
    }

    result
}

/// Fills the slots of `result` from a cached sensor reading, deleting it if
/// stale. Returns false when `name` is not a known sensor.
fn sensor_values(
    state: &mut LocationState,
    name: &str,
    kind: Kind,
    now: i64,
    result: &mut AmbientValues,
) -> bool {
    let Some(entry) = state.sensors.get_mut(name) else {
        return false;
    };
    let function = entry.function.clone();
    let reading = match kind {
        Kind::Humidity => &mut entry.humidity,
        Kind::Temperature => &mut entry.temperature,
    };
    let Some(r) = reading.as_ref() else {
        return true;
    };
    if r.is_stale(now) {
        // lazy expiry: a stale reading is dropped the moment it is observed
        debug!("stale {} reading of {} dropped", quantity_name(kind), name);
        *reading = None;
        return true;
    }
    let Some(value) = parse_finite(&r.value) else {
        info!("cannot convert value '{}' from sensor {} to a number, ignored", r.value, name);
        return true;
    };
    let ttl = r.ttl;
    let slot = match (kind, function.as_str()) {
        (Kind::Humidity, "input") => &mut result.in_humidity,
        (Kind::Humidity, "output") => &mut result.out_humidity,
        (Kind::Temperature, "input") => &mut result.in_temperature,
        (Kind::Temperature, "output") => &mut result.out_temperature,
        // unclassified sensors cache readings but contribute to no side
        _ => return true,
    };
    slot.value = value;
    slot.ttl = ttl;
    true
}

fn fold(slot: &mut Slot, n: &mut usize, child: Slot) {
    if child.has_value() {
        *n += 1;
        slot.value += child.value;
        // latest contributing child wins
        slot.ttl = child.ttl;
    }
}

/// Averages one side slot over its contributors; racks and rows publish it.
fn finish_side(
    slot: &mut Slot,
    n: usize,
    publish_side: bool,
    store: &MetricStore,
    quantity: &str,
    unit: &str,
    name: &str,
) {
    if n == 0 {
        slot.value = f64::NAN;
        return;
    }
    slot.value /= n as f64;
    if publish_side {
        publish(store, quantity, name, slot.value, unit, slot.ttl);
    }
}

/// Combined per-kind average over both sides, published at non-rack levels.
/// The combined value replaces the out slot and clears the in slot so that
/// the parent folds the aggregate in exactly once.
fn combine(
    in_slot: &mut Slot,
    out_slot: &mut Slot,
    store: &MetricStore,
    quantity: &str,
    unit: &str,
    name: &str,
) {
    let mut sum = 0.0;
    let mut n = 0usize;
    let mut ttl = 0u32;
    if out_slot.has_value() {
        n += 1;
        sum += out_slot.value;
        ttl = out_slot.ttl;
    }
    if in_slot.has_value() {
        if n == 0 {
            ttl = in_slot.ttl;
        }
        n += 1;
        sum += in_slot.value;
    }

    if n == 0 {
        *out_slot = Slot::empty();
        *in_slot = Slot::empty();
        return;
    }
    let average = sum / n as f64;
    publish(store, quantity, name, average, unit, ttl);
    *out_slot = Slot { value: average, ttl };
    *in_slot = Slot::empty();
}

/// Side averages are only published for racks and rows; a prefix match keeps
/// assets like "tracks-1" out.
fn publishable_as_side(name: &str) -> bool {
    name.starts_with("rack-") || name.starts_with("row-")
}

fn quantity_name(kind: Kind) -> &'static str {
    match kind {
        Kind::Humidity => "humidity",
        Kind::Temperature => "temperature",
    }
}

fn publish(store: &MetricStore, quantity: &str, asset: &str, value: f64, unit: &str, ttl: u32) {
    match store.write_metric(quantity, asset, value, unit, ttl) {
        Ok(()) => debug!("published {}@{} = {:.2}{} (ttl {})", quantity, asset, value, unit, ttl),
        Err(e) => error!("publish of {}@{} failed: {}", quantity, asset, e),
    }
}
