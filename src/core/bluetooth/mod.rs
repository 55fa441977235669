//! Bluetooth functionality for the beacon relay
//! This module handles the radio side: opening the adapter, scanning,
//! decoding iBeacon advertisements and driving the poll loop.

pub mod advertisement;
pub mod constants;
pub mod driver;
pub mod radio;
pub mod scanner;
pub mod types;

// Re-export types that should be publicly accessible
pub use constants::*; // Re-export all constants
pub use driver::{ScanDriver, ScanEvent, ScanPhase};
pub use radio::BeaconRadio;
pub use scanner::BluestRadio;
pub use types::{BeaconData, BeaconRecord};
