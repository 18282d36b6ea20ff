/*!
Constructeurs d'enveloppes pour les flux Ambion

Produisent des payloads JSON conformes aux flux assets et métriques capteur,
pour alimenter les tests et les outils de développement sans recopier la
structure des messages à la main.
*/

use serde_json::{json, Value};
use std::collections::HashMap;

/// Construit un message asset du flux topologie
#[derive(Debug, Clone)]
pub struct AssetBuilder {
    name: String,
    operation: String,
    aux: HashMap<String, String>,
    ext: HashMap<String, String>,
}

impl AssetBuilder {
    pub fn new<S: Into<String>>(name: S, operation: S) -> Self {
        let mut aux = HashMap::new();
        aux.insert("status".to_string(), "active".to_string());
        Self {
            name: name.into(),
            operation: operation.into(),
            aux,
            ext: HashMap::new(),
        }
    }

    /// Un datacenter : racine de topologie, sans parent
    pub fn datacenter(name: &str) -> Self {
        Self::new(name, "create").aux_entry("type", "datacenter").aux_entry("subtype", "N_A")
    }

    /// Un conteneur (room, row, rack) rattaché à son parent physique
    pub fn container(name: &str, kind: &str, parent: &str) -> Self {
        Self::new(name, "create").aux_entry("type", kind).aux_entry("parent_name.1", parent)
    }

    /// Un capteur rattaché à son asset logique, avec son rôle input/output
    pub fn sensor(name: &str, logical_asset: &str, function: &str) -> Self {
        Self::new(name, "create")
            .aux_entry("type", "device")
            .aux_entry("subtype", "sensor")
            .ext_entry("logical_asset", logical_asset)
            .ext_entry("sensor_function", function)
    }

    pub fn operation<S: Into<String>>(mut self, operation: S) -> Self {
        self.operation = operation.into();
        self
    }

    pub fn status(self, status: &str) -> Self {
        self.aux_entry("status", status)
    }

    pub fn aux_entry(mut self, key: &str, value: &str) -> Self {
        self.aux.insert(key.to_string(), value.to_string());
        self
    }

    pub fn ext_entry(mut self, key: &str, value: &str) -> Self {
        self.ext.insert(key.to_string(), value.to_string());
        self
    }

    pub fn build(&self) -> Value {
        json!({
            "name": self.name,
            "operation": self.operation,
            "aux": self.aux,
            "ext": self.ext,
        })
    }
}

/// Construit une métrique brute du flux capteurs
#[derive(Debug, Clone)]
pub struct MetricBuilder {
    quantity: String,
    device: String,
    value: String,
    unit: String,
    ttl: u32,
    time: i64,
    sensor: Option<String>,
}

impl MetricBuilder {
    pub fn new(quantity: &str, device: &str, value: &str, unit: &str) -> Self {
        Self {
            quantity: quantity.to_string(),
            device: device.to_string(),
            value: value.to_string(),
            unit: unit.to_string(),
            ttl: 60,
            time: chrono::Utc::now().timestamp(),
            sensor: None,
        }
    }

    /// Capteur émetteur (aux.sname)
    pub fn sensor(mut self, sname: &str) -> Self {
        self.sensor = Some(sname.to_string());
        self
    }

    pub fn ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    /// Horodatage de la mesure (secondes unix)
    pub fn time(mut self, time: i64) -> Self {
        self.time = time;
        self
    }

    pub fn build(&self) -> Value {
        let mut aux = HashMap::new();
        if let Some(sname) = &self.sensor {
            aux.insert("sname".to_string(), sname.clone());
        }
        json!({
            "type": self.quantity,
            "name": self.device,
            "value": self.value,
            "unit": self.unit,
            "ttl": self.ttl,
            "time": self.time,
            "aux": aux,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_asset_payload() {
        let payload = AssetBuilder::sensor("sensor-1", "rack-7", "input").build();
        assert_eq!(payload["name"], "sensor-1");
        assert_eq!(payload["operation"], "create");
        assert_eq!(payload["aux"]["type"], "device");
        assert_eq!(payload["aux"]["subtype"], "sensor");
        assert_eq!(payload["aux"]["status"], "active");
        assert_eq!(payload["ext"]["logical_asset"], "rack-7");
        assert_eq!(payload["ext"]["sensor_function"], "input");
    }

    #[test]
    fn test_container_and_datacenter_payloads() {
        let dc = AssetBuilder::datacenter("dc-1").build();
        assert_eq!(dc["aux"]["type"], "datacenter");

        let row = AssetBuilder::container("row-a", "row", "room-1").build();
        assert_eq!(row["aux"]["type"], "row");
        assert_eq!(row["aux"]["parent_name.1"], "room-1");
    }

    #[test]
    fn test_operation_and_status_overrides() {
        let gone = AssetBuilder::sensor("sensor-1", "rack-7", "input")
            .operation("update")
            .status("retired")
            .build();
        assert_eq!(gone["operation"], "update");
        assert_eq!(gone["aux"]["status"], "retired");
    }

    #[test]
    fn test_metric_payload() {
        let payload = MetricBuilder::new("humidity.0", "HM1", "40", "%")
            .sensor("sensor-1")
            .ttl(30)
            .time(1_700_000_000)
            .build();
        assert_eq!(payload["type"], "humidity.0");
        assert_eq!(payload["name"], "HM1");
        assert_eq!(payload["value"], "40");
        assert_eq!(payload["ttl"], 30);
        assert_eq!(payload["time"], 1_700_000_000i64);
        assert_eq!(payload["aux"]["sname"], "sensor-1");
    }

    #[test]
    fn test_metric_defaults() {
        let payload = MetricBuilder::new("temperature.0", "TH1", "21", "C").build();
        assert_eq!(payload["ttl"], 60);
        assert!(payload["time"].as_i64().unwrap() > 0);
        assert!(payload["aux"].as_object().unwrap().is_empty());
    }
}
