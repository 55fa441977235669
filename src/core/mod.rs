//! Core functionality for the beacon relay
//! This module contains the radio handling and the relay state machine.

pub mod bluetooth;
pub mod relay;
pub mod task;

// Re-export commonly used types
pub use bluetooth::{BeaconRadio, BeaconRecord, BluestRadio};
pub use relay::{AdaptorState, BeaconRelay, LifecycleAction, SubscriptionTable};
