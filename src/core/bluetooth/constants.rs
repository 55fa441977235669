//! Constants used throughout the relay
//! This module contains the constant values used by the relay,
//! such as the advertised characteristic, beacon framing and timings.

/// The characteristic advertised to subscribing apps
pub const CHARACTERISTIC_BLE_BEACON: &str = "ble_beacon";

/// Earlier name of the beacon characteristic; subscribes to every beacon
pub const CHARACTERISTIC_BTLE_BEACON: &str = "btle_beacon";

/// Nominal interval (seconds) advertised for the beacon characteristic
pub const BLE_BEACON_INTERVAL: f64 = 1.0;

/// Starting value of the smallest interval (seconds) requested by any app
pub const DEFAULT_MIN_INTERVAL: f64 = 10.0;

/// Bluetooth SIG company identifier assigned to Apple (iBeacon vendor)
pub const APPLE_COMPANY_ID: u16 = 0x004c;

/// iBeacon subtype byte following the company id
pub const IBEACON_TYPE: u8 = 0x02;

/// Length of the iBeacon payload following the type and length bytes
pub const IBEACON_PAYLOAD_LEN: u8 = 0x15;

/// Total manufacturer data length of an iBeacon frame (type + len + payload)
pub const IBEACON_FRAME_LEN: usize = 2 + IBEACON_PAYLOAD_LEN as usize;

/// Delay between poll ticks in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Listen window covered by a single poll in milliseconds
pub const DEFAULT_SCAN_WINDOW_MS: u64 = 2000;

/// Delay before a failed scan start is attempted again, in seconds
pub const DEFAULT_START_RETRY_DELAY_SECS: u64 = 10;

/// Capacity of the channel carrying decoded records out of the scan task
pub const RECORD_CHANNEL_CAPACITY: usize = 256;
