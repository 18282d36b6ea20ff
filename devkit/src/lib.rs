/*!
# Ambion DevKit - Stubs et Utilitaires pour Développement

Bibliothèque facilitant le développement autour du bus Ambion avec:
- Stub du client bus pour tests sans broker MQTT
- Constructeurs d'enveloppes asset / métrique conformes aux flux
*/

pub mod bus_stub;
pub mod envelopes;

pub use bus_stub::MockBusClient;
pub use envelopes::{AssetBuilder, MetricBuilder};
