//! Messages exchanged with the host bus.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::bluetooth::types::{BeaconData, BeaconRecord};
use crate::core::relay::state::AdaptorState;
use crate::error::{RelayError, Result};

pub const STATUS_STATE: &str = "state";
pub const CONTENT_SERVICE: &str = "service";
pub const CONTENT_CHARACTERISTIC: &str = "characteristic";

/// A message delivered to the relay by the bus
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// Opaque configuration; any receipt (re)starts the scan
    Configure {
        #[serde(default)]
        config: Value,
    },
    AppInit {
        id: String,
    },
    AppRequest(AppRequest),
    AppCommand(AppCommand),
}

impl InboundMessage {
    /// Parses a raw bus message, reporting missing or mistyped fields as malformed
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| RelayError::MalformedMessage(e.to_string()))
    }
}

/// Subscription request: replaces the app's subscription set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppRequest {
    pub id: String,
    pub service: Vec<ServiceRequest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub characteristic: String,
    /// Beacon identifiers to receive; absent means every beacon
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<f64>,
}

/// A command sent by an app. The relay is sensor-only and rejects these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppCommand {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

/// A message sent by the relay, to an app or to the manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutboundMessage {
    State(StateNotification),
    Service(ServiceDescriptor),
    Characteristic(CharacteristicEvent),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateNotification {
    pub id: String,
    pub status: String,
    pub state: AdaptorState,
}

impl StateNotification {
    pub fn new(id: &str, state: AdaptorState) -> Self {
        Self {
            id: id.to_string(),
            status: STATUS_STATE.to_string(),
            state,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub characteristic: String,
    pub interval: f64,
}

/// Reply to an app's init handshake, listing what the relay offers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub name: String,
    pub id: String,
    pub status: String,
    pub service: Vec<ServiceEntry>,
    pub content: String,
}

impl ServiceDescriptor {
    pub fn new(name: &str, id: &str, status: &str, service: Vec<ServiceEntry>) -> Self {
        Self {
            name: name.to_string(),
            id: id.to_string(),
            status: status.to_string(),
            service,
            content: CONTENT_SERVICE.to_string(),
        }
    }
}

/// A beacon record routed to a subscriber
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacteristicEvent {
    pub id: String,
    pub content: String,
    pub characteristic: String,
    pub data: BeaconData,
    #[serde(rename = "timeStamp")]
    pub time_stamp: f64,
}

impl CharacteristicEvent {
    pub fn new(id: &str, characteristic: &str, record: &BeaconRecord) -> Self {
        Self {
            id: id.to_string(),
            content: CONTENT_CHARACTERISTIC.to_string(),
            characteristic: characteristic.to_string(),
            data: record.data.clone(),
            time_stamp: record.timestamp_secs(),
        }
    }
}

impl From<StateNotification> for OutboundMessage {
    fn from(message: StateNotification) -> Self {
        Self::State(message)
    }
}

impl From<ServiceDescriptor> for OutboundMessage {
    fn from(message: ServiceDescriptor) -> Self {
        Self::Service(message)
    }
}

impl From<CharacteristicEvent> for OutboundMessage {
    fn from(message: CharacteristicEvent) -> Self {
        Self::Characteristic(message)
    }
}
