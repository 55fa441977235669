use serde::{Deserialize, Serialize};

/// Identity of this adaptor on the bus.
/// The host platform normally assigns both on the command line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptorConfig {
    pub id: String,
    pub name: String,
}

impl Default for AdaptorConfig {
    fn default() -> Self {
        AdaptorConfig {
            id: "beacon_relay".to_string(),
            name: "BLE Beacon Relay".to_string(),
        }
    }
}
