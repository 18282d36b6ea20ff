/**
 * MODÈLES DE DONNÉES - Enveloppes typées des flux Ambion
 *
 * RÔLE : Définit les messages décodés depuis le bus : assets (topologie)
 * et métriques capteur, avec leurs attributs aux/ext.
 *
 * UTILITÉ : Typage fort des flux JSON, accès nommé aux attributs optionnels.
 */

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Message asset du flux topologie (create / update / delete)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetEnvelope {
    pub name: String,
    pub operation: String, // create, update, delete
    /// Attributs d'inventaire : type, subtype, status, parent_name.1
    #[serde(default)]
    pub aux: HashMap<String, String>,
    /// Attributs étendus : logical_asset, sensor_function
    #[serde(default)]
    pub ext: HashMap<String, String>,
}

impl AssetEnvelope {
    pub fn asset_type(&self) -> &str {
        self.aux_str("type")
    }

    pub fn subtype(&self) -> &str {
        self.aux_str("subtype")
    }

    /// Un asset sans status est considéré actif
    pub fn status(&self) -> &str {
        self.aux.get("status").map(String::as_str).unwrap_or("active")
    }

    /// Premier parent physique
    pub fn parent(&self) -> &str {
        self.aux_str("parent_name.1")
    }

    /// Rattachement logique d'un capteur (prime sur le parent physique)
    pub fn logical_asset(&self) -> &str {
        self.ext_str("logical_asset")
    }

    pub fn sensor_function(&self) -> &str {
        self.ext_str("sensor_function")
    }

    fn aux_str(&self, key: &str) -> &str {
        self.aux.get(key).map(String::as_str).unwrap_or("")
    }

    fn ext_str(&self, key: &str) -> &str {
        self.ext.get(key).map(String::as_str).unwrap_or("")
    }
}

/// Métrique brute du flux capteurs. `name` est l'équipement porteur
/// (edpu, ups...), le capteur lui-même est dans aux.sname.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricEnvelope {
    /// Quantité mesurée, ex. "temperature.0" ou "humidity.default"
    #[serde(rename = "type")]
    pub quantity: String,
    pub name: String,
    pub value: String,
    pub unit: String,
    /// Durée de validité en secondes
    pub ttl: u32,
    /// Horodatage de la mesure (secondes unix)
    pub time: i64,
    #[serde(default)]
    pub aux: HashMap<String, String>,
}

impl MetricEnvelope {
    pub fn sensor_name(&self) -> &str {
        self.aux.get("sname").map(String::as_str).unwrap_or("")
    }
}

/// Parse une valeur de mesure : rejette chaîne vide, suffixe parasite
/// et résultats non finis (NaN, inf).
pub fn parse_finite(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_envelope_defaults() {
        let asset: AssetEnvelope =
            serde_json::from_str(r#"{"name": "room-1", "operation": "create"}"#).unwrap();
        assert_eq!(asset.name, "room-1");
        assert_eq!(asset.asset_type(), "");
        assert_eq!(asset.subtype(), "");
        assert_eq!(asset.status(), "active");
        assert_eq!(asset.parent(), "");
        assert_eq!(asset.logical_asset(), "");
    }

    #[test]
    fn test_asset_envelope_attributes() {
        let asset: AssetEnvelope = serde_json::from_str(
            r#"{
                "name": "sensor-1",
                "operation": "update",
                "aux": {"type": "device", "subtype": "sensor", "status": "active"},
                "ext": {"logical_asset": "rack-7", "sensor_function": "input"}
            }"#,
        )
        .unwrap();
        assert_eq!(asset.asset_type(), "device");
        assert_eq!(asset.subtype(), "sensor");
        assert_eq!(asset.logical_asset(), "rack-7");
        assert_eq!(asset.sensor_function(), "input");
    }

    #[test]
    fn test_metric_envelope() {
        let metric: MetricEnvelope = serde_json::from_str(
            r#"{
                "type": "humidity.0",
                "name": "HM1",
                "value": "40",
                "unit": "%",
                "ttl": 60,
                "time": 1700000000,
                "aux": {"sname": "sensor-1"}
            }"#,
        )
        .unwrap();
        assert_eq!(metric.quantity, "humidity.0");
        assert_eq!(metric.sensor_name(), "sensor-1");
        assert_eq!(metric.ttl, 60);
    }

    #[test]
    fn test_parse_finite() {
        assert_eq!(parse_finite("40"), Some(40.0));
        assert_eq!(parse_finite(" 21.5 "), Some(21.5));
        assert_eq!(parse_finite("-3.25"), Some(-3.25));
        assert_eq!(parse_finite(""), None);
        assert_eq!(parse_finite("abc"), None);
        assert_eq!(parse_finite("40abc"), None);
        assert_eq!(parse_finite("NaN"), None);
        assert_eq!(parse_finite("inf"), None);
    }
}
