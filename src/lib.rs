//! BLE beacon relay library
//! Scans for iBeacon advertisements and forwards them to the apps that
//! subscribed to each beacon identifier over the host message bus.

// Module declarations
pub mod bus;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod utils;

pub use crate::bus::MessageBus;
pub use crate::config::RelayConfig;
pub use crate::core::{BeaconRadio, BeaconRelay, BluestRadio};
pub use crate::error::RelayError;
