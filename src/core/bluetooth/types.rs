//! Defines shared data structures for the Bluetooth module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Decoded fields of a single beacon advertisement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconData {
    /// The address of the advertiser (MAC address on most platforms)
    pub address: String,
    /// The beacon identifier, normalized
    pub uuid: String,
    pub major: u16,
    pub minor: u16,
    /// Calibrated transmit power at 1 m, as advertised by the beacon
    pub reference_power: i16,
    /// Received signal strength (RSSI) of the advertisement
    pub rx_power: i16,
}

/// A beacon advertisement observed by the radio.
/// Records are ephemeral: they are routed once and then dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct BeaconRecord {
    pub data: BeaconData,
    /// Wall-clock time the advertisement was captured
    pub timestamp: DateTime<Utc>,
}

impl BeaconRecord {
    /// Creates a new BeaconRecord captured now
    pub fn new(data: BeaconData) -> Self {
        Self::captured_at(data, Utc::now())
    }

    pub fn captured_at(data: BeaconData, timestamp: DateTime<Utc>) -> Self {
        Self { data, timestamp }
    }

    /// The routing key of this record
    pub fn uuid(&self) -> &str {
        &self.data.uuid
    }

    /// Capture time as fractional seconds since the Unix epoch
    pub fn timestamp_secs(&self) -> f64 {
        self.timestamp.timestamp_millis() as f64 / 1000.0
    }
}
