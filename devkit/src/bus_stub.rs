/*!
Mock du client bus pour développement sans broker

Permet de développer et tester autour des flux Ambion sans démarrer un broker
MQTT réel. Enregistre toutes les publications et abonnements, et permet de
simuler la réception de messages sur les flux assets et métriques.
*/

use anyhow::Result;
use rumqttc::QoS;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct MockMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

/// Mock du client bus qui simule rumqttc::AsyncClient
#[derive(Clone)]
pub struct MockBusClient {
    published_messages: Arc<Mutex<Vec<MockMessage>>>,
    subscriptions: Arc<Mutex<Vec<String>>>,
    message_sender: Arc<Mutex<Option<mpsc::UnboundedSender<MockMessage>>>>,
}

impl MockBusClient {
    pub fn new() -> Self {
        Self {
            published_messages: Arc::new(Mutex::new(Vec::new())),
            subscriptions: Arc::new(Mutex::new(Vec::new())),
            message_sender: Arc::new(Mutex::new(None)),
        }
    }

    /// Configuration d'un channel pour recevoir les messages simulés
    pub fn setup_receiver(&self) -> mpsc::UnboundedReceiver<MockMessage> {
        let (sender, receiver) = mpsc::unbounded_channel();
        *self.message_sender.lock().unwrap() = Some(sender);
        receiver
    }

    /// Simule la publication d'un message (compatible avec AsyncClient)
    pub async fn publish<S, V>(&self, topic: S, qos: QoS, retain: bool, payload: V) -> Result<()>
    where
        S: Into<String>,
        V: Into<Vec<u8>>,
    {
        let message = MockMessage {
            topic: topic.into(),
            payload: payload.into(),
            qos,
            retain,
        };

        self.published_messages.lock().unwrap().push(message.clone());

        log::info!("📤 [MOCK] Published to {}: {} bytes", message.topic, message.payload.len());
        Ok(())
    }

    /// Simule l'abonnement à un flux (compatible avec AsyncClient)
    pub async fn subscribe<S: Into<String>>(&self, topic: S, _qos: QoS) -> Result<()> {
        let topic = topic.into();
        self.subscriptions.lock().unwrap().push(topic.clone());
        log::info!("📥 [MOCK] Subscribed to {}", topic);
        Ok(())
    }

    /// Simule la réception d'un message sur un flux (pour tests)
    pub async fn simulate_incoming<S, V>(&self, topic: S, payload: V) -> Result<()>
    where
        S: Into<String>,
        V: Into<Vec<u8>>,
    {
        let message = MockMessage {
            topic: topic.into(),
            payload: payload.into(),
            qos: QoS::AtLeastOnce,
            retain: false,
        };

        if let Some(sender) = self.message_sender.lock().unwrap().as_ref() {
            sender.send(message.clone()).map_err(|e| anyhow::anyhow!("Send error: {}", e))?;
        }

        log::info!("📨 [MOCK] Simulated incoming: {}", message.topic);
        Ok(())
    }

    /// Récupère tous les messages publiés (pour assertions de tests)
    pub fn get_published_messages(&self) -> Vec<MockMessage> {
        self.published_messages.lock().unwrap().clone()
    }

    /// Récupère les abonnements (pour assertions de tests)
    pub fn get_subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().unwrap().clone()
    }

    /// Trouve les messages publiés sur un flux donné
    pub fn find_messages_by_topic(&self, topic: &str) -> Vec<MockMessage> {
        self.published_messages
            .lock()
            .unwrap()
            .iter()
            .filter(|msg| msg.topic == topic)
            .cloned()
            .collect()
    }

    /// Parse le dernier message d'un flux en JSON
    pub fn get_last_json_message<T>(&self, topic: &str) -> Result<Option<T>>
    where
        T: for<'de> serde::Deserialize<'de>,
    {
        let messages = self.find_messages_by_topic(topic);
        if let Some(last_msg) = messages.last() {
            let parsed: T = serde_json::from_slice(&last_msg.payload)?;
            Ok(Some(parsed))
        } else {
            Ok(None)
        }
    }

    /// Reset tous les messages enregistrés
    pub fn clear(&self) {
        self.published_messages.lock().unwrap().clear();
        self.subscriptions.lock().unwrap().clear();
    }
}

impl Default for MockBusClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelopes::{AssetBuilder, MetricBuilder};
    use serde_json::Value;

    #[tokio::test]
    async fn test_mock_client_publish_subscribe() {
        let client = MockBusClient::new();

        client.subscribe("ambion/assets@v1", QoS::AtLeastOnce).await.unwrap();
        client.subscribe("ambion/metrics/sensor@v1", QoS::AtLeastOnce).await.unwrap();
        assert_eq!(
            client.get_subscriptions(),
            vec!["ambion/assets@v1", "ambion/metrics/sensor@v1"]
        );

        let payload = serde_json::to_vec(&AssetBuilder::datacenter("dc-1").build()).unwrap();
        client.publish("ambion/assets@v1", QoS::AtLeastOnce, false, payload.clone()).await.unwrap();

        let messages = client.get_published_messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].topic, "ambion/assets@v1");
        assert_eq!(messages[0].payload, payload);
    }

    #[tokio::test]
    async fn test_simulated_incoming_metric() {
        let client = MockBusClient::new();
        let mut receiver = client.setup_receiver();

        let payload = serde_json::to_vec(
            &MetricBuilder::new("humidity.0", "HM1", "40", "%").sensor("sensor-1").build(),
        )
        .unwrap();
        client.simulate_incoming("ambion/metrics/sensor@v1", payload).await.unwrap();

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.topic, "ambion/metrics/sensor@v1");
        let value: Value = serde_json::from_slice(&received.payload).unwrap();
        assert_eq!(value["aux"]["sname"], "sensor-1");
    }

    #[tokio::test]
    async fn test_last_json_message() {
        let client = MockBusClient::new();

        for value in ["40", "70"] {
            let payload = serde_json::to_vec(
                &MetricBuilder::new("humidity.0", "HM1", value, "%").sensor("sensor-1").build(),
            )
            .unwrap();
            client.publish("ambion/metrics/sensor@v1", QoS::AtLeastOnce, false, payload).await.unwrap();
        }

        let last: Option<Value> = client.get_last_json_message("ambion/metrics/sensor@v1").unwrap();
        assert_eq!(last.unwrap()["value"], "70");

        client.clear();
        assert!(client.get_published_messages().is_empty());
    }
}
