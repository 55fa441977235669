//! Error types shared by the relay, the radio and the bus.

use thiserror::Error;

/// Errors surfaced by the beacon relay.
///
/// None of these are fatal to the process: radio errors lead to a scheduled
/// retry, message errors lead to the message being dropped.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("No Bluetooth adapter found")]
    AdapterUnavailable,

    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] bluest::Error),

    #[error("Radio is not open")]
    RadioClosed,

    #[error("Bluetooth scan stream has ended")]
    ScanStopped,

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Unknown characteristic: {0}")]
    UnknownCharacteristic(String),
}

pub type Result<T, E = RelayError> = std::result::Result<T, E>;
