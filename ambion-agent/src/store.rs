/**
 * DÉPÔT DE MÉTRIQUES - Publication vers le répertoire partagé entre agents
 *
 * RÔLE : Écrit les métriques dérivées (et les republis capteur normalisées)
 * sous forme de petits documents JSON, un fichier par couple asset@quantité.
 * Les autres agents lisent ce répertoire ; l'écriture écrase la valeur
 * précédente.
 */

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Métrique telle que déposée dans le répertoire partagé
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMetric {
    pub quantity: String,
    pub asset: String,
    /// Valeur formatée à deux décimales
    pub value: String,
    pub unit: String,
    pub ttl: u32,
    pub time: i64,
}

pub struct MetricStore {
    dir: PathBuf,
}

impl MetricStore {
    /// Ouvre (et crée au besoin) le répertoire de dépôt
    pub fn new<P: Into<PathBuf>>(dir: P) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, asset: &str, quantity: &str) -> PathBuf {
        self.dir.join(format!("{asset}@{quantity}"))
    }

    /// Écrit (ou écrase) une métrique, horodatée à l'instant de publication
    pub fn write_metric(
        &self,
        quantity: &str,
        asset: &str,
        value: f64,
        unit: &str,
        ttl: u32,
    ) -> Result<(), StoreError> {
        let metric = StoredMetric {
            quantity: quantity.to_string(),
            asset: asset.to_string(),
            value: format!("{value:.2}"),
            unit: unit.to_string(),
            ttl,
            time: OffsetDateTime::now_utc().unix_timestamp(),
        };
        let json = serde_json::to_string_pretty(&metric)?;
        fs::write(self.path_for(asset, quantity), json)?;
        Ok(())
    }

    /// Relit une métrique publiée (consommateurs et tests)
    pub fn read_metric(&self, asset: &str, quantity: &str) -> Result<Option<StoredMetric>, StoreError> {
        let path = self.path_for(asset, quantity);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }
}
