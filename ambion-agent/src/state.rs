use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::models::{AssetEnvelope, MetricEnvelope};

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

#[derive(Debug, Error, PartialEq)]
pub enum TopologyError {
    /// Asset non-datacenter sans parent résoluble
    #[error("asset '{0}' has no resolvable parent")]
    MissingParent(String),
    /// Asset inconnu de la topologie
    #[error("asset '{0}' is not known")]
    Unknown(String),
}

/// Une mesure brute reçue d'un capteur, valide tant que now <= time + ttl
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub value: String,
    pub unit: String,
    pub ttl: u32,
    pub time: i64,
}

impl Reading {
    pub fn is_stale(&self, now: i64) -> bool {
        now > self.time + i64::from(self.ttl)
    }
}

/// Entrée du cache capteur : rôle (input/output/non classé) + dernières
/// mesures connues, écrasées en bloc à chaque arrivée
#[derive(Debug, Clone, Default)]
pub struct SensorEntry {
    pub function: String,
    pub humidity: Option<Reading>,
    pub temperature: Option<Reading>,
}

/// Miroir en mémoire de la topologie assets + cache des mesures capteurs.
/// Partagé entre l'acteur d'ingestion et l'acteur de calcul via un seul mutex.
#[derive(Debug, Default)]
pub struct LocationState {
    /// enfant -> conteneur parent (assets non-datacenter uniquement)
    pub containers: HashMap<String, String>,
    /// conteneur -> enfants, dans l'ordre d'arrivée
    pub contents: HashMap<String, Vec<String>>,
    /// racines de la réduction périodique, sans doublon
    pub datacenters: Vec<String>,
    /// capteurs connus (subtype sensor)
    pub sensors: HashMap<String, SensorEntry>,
}

impl LocationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applique un message asset du flux : filtre, retrait ou re-création.
    pub fn apply(&mut self, asset: &AssetEnvelope) -> Result<(), TopologyError> {
        // seuls les conteneurs et les capteurs nous intéressent
        if asset.asset_type() == "device" && asset.subtype() != "sensor" {
            return Ok(());
        }

        // DELETE ou status non actif : l'asset sort de la topologie
        if asset.operation == "delete" || asset.status() != "active" {
            let removed = self.remove(asset);
            if asset.subtype() == "sensor" {
                self.sensors.remove(&asset.name);
            }
            return removed;
        }

        if asset.operation == "create" || asset.operation == "update" {
            // update = retrait puis ré-ajout (absorbe les changements de parent)
            let _ = self.remove(asset);
            self.add(asset)?;
            if asset.subtype() == "sensor" {
                // les mesures déjà en cache survivent à la mise à jour
                let entry = self.sensors.entry(asset.name.clone()).or_default();
                entry.function = asset.sensor_function().to_string();
            }
        }
        Ok(())
    }

    fn add(&mut self, asset: &AssetEnvelope) -> Result<(), TopologyError> {
        if asset.asset_type() == "datacenter" {
            if !self.datacenters.iter().any(|d| d == &asset.name) {
                self.datacenters.push(asset.name.clone());
            }
            return Ok(());
        }

        let parent = if asset.subtype() == "sensor" {
            asset.logical_asset()
        } else {
            asset.parent()
        };
        if parent.is_empty() {
            return Err(TopologyError::MissingParent(asset.name.clone()));
        }

        self.containers.insert(asset.name.clone(), parent.to_string());
        self.contents
            .entry(parent.to_string())
            .or_default()
            .push(asset.name.clone());
        Ok(())
    }

    fn remove(&mut self, asset: &AssetEnvelope) -> Result<(), TopologyError> {
        if asset.asset_type() == "datacenter" {
            if let Some(pos) = self.datacenters.iter().position(|d| d == &asset.name) {
                self.datacenters.remove(pos);
                return Ok(());
            }
            return Err(TopologyError::Unknown(asset.name.clone()));
        }

        let Some(parent) = self.containers.remove(&asset.name) else {
            return Err(TopologyError::Unknown(asset.name.clone()));
        };
        if let Some(children) = self.contents.get_mut(&parent) {
            if let Some(pos) = children.iter().position(|c| c == &asset.name) {
                children.remove(pos);
                return Ok(());
            }
        }
        Err(TopologyError::Unknown(asset.name.clone()))
    }

    /// Remplace en bloc la mesure en cache d'un capteur connu.
    /// Renvoie true si la mesure a bien été stockée.
    pub fn cache_reading(&mut self, metric: &MetricEnvelope) -> bool {
        let sname = metric.sensor_name();
        let Some(entry) = self.sensors.get_mut(sname) else {
            return false;
        };
        let reading = Reading {
            value: metric.value.clone(),
            unit: metric.unit.clone(),
            ttl: metric.ttl,
            time: metric.time,
        };
        if metric.quantity.contains("humidity") {
            entry.humidity = Some(reading);
        } else if metric.quantity.contains("temperature") {
            entry.temperature = Some(reading);
        } else {
            return false;
        }
        true
    }
}
