use std::time::Duration;

use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};

use crate::core::bluetooth::constants::{
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_SCAN_WINDOW_MS, DEFAULT_START_RETRY_DELAY_SECS,
};

/// Scan timing settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Delay between the end of one poll and the start of the next
    pub poll_interval_ms: u64,
    /// How long each poll listens for advertisements
    pub scan_window_ms: u64,
    /// Delay before retrying a failed scan start. Retries never give up.
    pub retry_delay_secs: u64,
    /// Advertisements weaker than this RSSI (dBm) are ignored
    pub min_rssi: Option<i16>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            scan_window_ms: DEFAULT_SCAN_WINDOW_MS,
            retry_delay_secs: DEFAULT_START_RETRY_DELAY_SECS,
            min_rssi: None,
        }
    }
}

impl ScanConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn scan_window(&self) -> Duration {
        Duration::from_millis(self.scan_window_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.poll_interval_ms > 0, "scan.poll_interval_ms must be greater than 0");
        ensure!(self.scan_window_ms > 0, "scan.scan_window_ms must be greater than 0");
        ensure!(self.retry_delay_secs > 0, "scan.retry_delay_secs must be greater than 0");
        Ok(())
    }
}
