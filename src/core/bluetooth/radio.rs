//! The radio seam between the relay and the BLE stack.

use std::time::Duration;

use crate::core::bluetooth::types::BeaconRecord;
use crate::error::Result;

/// A BLE radio able to produce decoded beacon records.
///
/// `open` may stall or fail (device busy, permissions, no hardware) and is
/// always driven from a background worker. Once open, `poll` is only called
/// from the scan driver's poll loop.
#[async_trait::async_trait]
pub trait BeaconRadio: Send + 'static {
    /// Opens the device and enables scanning
    async fn open(&mut self) -> Result<()>;

    /// Collects the beacon records observed during `window`
    async fn poll(&mut self, window: Duration) -> Result<Vec<BeaconRecord>>;

    /// Stops scanning and releases the device. Closing twice is a no-op.
    async fn close(&mut self) {}
}
