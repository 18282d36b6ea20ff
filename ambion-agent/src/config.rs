/**
 * CONFIGURATION AGENT - Chargement des paramètres de l'agrégateur
 *
 * RÔLE :
 * Lecture de agent.yaml (ou variable AMBION_AGENT_CONFIG), parsing YAML vers
 * structures typées avec repli sur les valeurs par défaut si le fichier est
 * absent ou malformé. La configuration est partagée : l'intervalle de calcul
 * est relu à chaque passe et peut donc changer à chaud.
 *
 * EXEMPLE AGENT.YAML :
 * ```yaml
 * mqtt:
 *   host: "192.168.1.100"
 *   port: 1883
 * polling_interval_secs: 30
 * metrics_dir: "/run/ambion/metrics"
 * ```
 */

use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::warn;

/// Configuration principale de l'agent ambiant
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AgentConfig {
    /// Broker MQTT (host, port)
    pub mqtt: MqttConf,
    /// Intervalle entre deux passes de calcul, en secondes
    pub polling_interval_secs: u64,
    /// Répertoire du dépôt de métriques partagé
    pub metrics_dir: String,
}

/// Configuration du broker MQTT
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
}

impl Default for AgentConfig {
    /// Valeurs par défaut si aucun agent.yaml trouvé
    fn default() -> Self {
        Self {
            mqtt: MqttConf { host: "localhost".into(), port: 1883 },
            polling_interval_secs: 30,
            metrics_dir: "/run/ambion/metrics".into(),
        }
    }
}

/// Charge la configuration depuis le fichier YAML, sans jamais échouer
pub async fn load_config() -> AgentConfig {
    let path = std::env::var("AMBION_AGENT_CONFIG").unwrap_or_else(|_| "agent.yaml".into());

    if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path).await.unwrap_or_default();
        if txt.trim().is_empty() {
            return AgentConfig::default();
        }
        serde_yaml::from_str(&txt).unwrap_or_else(|e| {
            warn!("invalid YAML in {}: {}, using defaults", path, e);
            AgentConfig::default()
        })
    } else {
        warn!("config file {} not found, using defaults", path);
        AgentConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AgentConfig::default();
        assert_eq!(cfg.mqtt.host, "localhost");
        assert_eq!(cfg.mqtt.port, 1883);
        assert_eq!(cfg.polling_interval_secs, 30);
    }

    #[test]
    fn test_yaml_parsing() {
        let cfg: AgentConfig = serde_yaml::from_str(
            "mqtt:\n  host: broker.lan\n  port: 8883\npolling_interval_secs: 5\nmetrics_dir: /tmp/metrics\n",
        )
        .unwrap();
        assert_eq!(cfg.mqtt.host, "broker.lan");
        assert_eq!(cfg.mqtt.port, 8883);
        assert_eq!(cfg.polling_interval_secs, 5);
        assert_eq!(cfg.metrics_dir, "/tmp/metrics");
    }
}
