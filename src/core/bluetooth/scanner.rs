use std::time::Duration;

use bluest::{Adapter, AdvertisingDevice};
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::advertisement::{IBeaconFrame, extract_mac_address};
use crate::core::bluetooth::constants::RECORD_CHANNEL_CAPACITY;
use crate::core::bluetooth::radio::BeaconRadio;
use crate::core::bluetooth::types::BeaconRecord;
use crate::error::{RelayError, Result};

/// Beacon radio backed by the platform Bluetooth adapter through bluest.
///
/// Opening the radio spawns a scan task that decodes every advertisement and
/// queues iBeacon records; `poll` drains that queue for the requested window.
pub struct BluestRadio {
    min_rssi: Option<i16>,
    records: Option<mpsc::Receiver<BeaconRecord>>,
    cancel_token: CancellationToken,
    scan_task_handle: Option<JoinHandle<()>>,
}

impl BluestRadio {
    pub fn new(min_rssi: Option<i16>) -> Self {
        Self {
            min_rssi,
            records: None,
            cancel_token: CancellationToken::new(),
            scan_task_handle: None,
        }
    }

    /// Runs the bluest scan stream until cancelled, forwarding decoded beacons.
    /// `started` reports whether the scan could be enabled at all.
    async fn internal_scan_task(
        adapter: Adapter,
        records: mpsc::Sender<BeaconRecord>,
        started: oneshot::Sender<Result<()>>,
        cancel_token: CancellationToken,
        min_rssi: Option<i16>,
    ) {
        info!("Starting bluetooth scan");
        let mut scan_stream = match adapter.scan(&[]).await {
            Ok(stream) => {
                let _ = started.send(Ok(()));
                stream
            }
            Err(e) => {
                let _ = started.send(Err(e.into()));
                return;
            }
        };

        loop {
            tokio::select! {
                result = scan_stream.next() => {
                    match result {
                        Some(discovered_device) => {
                            let Some(record) = Self::decode(&discovered_device, min_rssi) else {
                                continue;
                            };
                            debug!("Beacon advertisement: {:?}", record.data);
                            if let Err(e) = records.try_send(record) {
                                match e {
                                    mpsc::error::TrySendError::Full(_) => {
                                        warn!("Beacon queue full, dropping advertisement");
                                    }
                                    mpsc::error::TrySendError::Closed(_) => break,
                                }
                            }
                        }
                        None => {
                            info!("Bluetooth scan stream has ended.");
                            break;
                        }
                    }
                }
                _ = cancel_token.cancelled() => {
                    break;
                }
            }
        }
    }

    /// Decodes an advertisement into a beacon record, if it carries an iBeacon frame
    fn decode(discovered: &AdvertisingDevice, min_rssi: Option<i16>) -> Option<BeaconRecord> {
        let manufacturer = discovered.adv_data.manufacturer_data.as_ref()?;
        let frame = IBeaconFrame::parse(manufacturer.company_id, &manufacturer.data)?;

        let id = discovered.device.id().to_string();
        let Some(rssi) = discovered.rssi else {
            debug!("Skipping beacon from {} without RSSI", id);
            return None;
        };
        if min_rssi.is_some_and(|min| rssi < min) {
            return None;
        }

        let address = extract_mac_address(&id).unwrap_or(id);
        Some(BeaconRecord::new(frame.into_beacon_data(address, rssi)))
    }
}

#[async_trait::async_trait]
impl BeaconRadio for BluestRadio {
    async fn open(&mut self) -> Result<()> {
        if self.scan_task_handle.is_some() {
            self.close().await;
        }

        let adapter = Adapter::default()
            .await
            .ok_or(RelayError::AdapterUnavailable)?;
        adapter.wait_available().await?;
        info!("Bluetooth adapter is available.");

        self.cancel_token = CancellationToken::new();
        let (records_tx, records_rx) = mpsc::channel(RECORD_CHANNEL_CAPACITY);
        let (started_tx, started_rx) = oneshot::channel();

        let handle = tokio::spawn(Self::internal_scan_task(
            adapter,
            records_tx,
            started_tx,
            self.cancel_token.clone(),
            self.min_rssi,
        ));

        match started_rx.await {
            Ok(Ok(())) => {
                self.records = Some(records_rx);
                self.scan_task_handle = Some(handle);
                info!("Bluetooth scan started");
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(RelayError::ScanStopped),
        }
    }

    async fn poll(&mut self, window: Duration) -> Result<Vec<BeaconRecord>> {
        let records = self.records.as_mut().ok_or(RelayError::RadioClosed)?;
        let deadline = Instant::now() + window;
        let mut batch = Vec::new();

        loop {
            match tokio::time::timeout_at(deadline, records.recv()).await {
                Ok(Some(record)) => batch.push(record),
                Ok(None) if batch.is_empty() => return Err(RelayError::ScanStopped),
                Ok(None) | Err(_) => break,
            }
        }
        Ok(batch)
    }

    async fn close(&mut self) {
        info!("Stopping Bluetooth scan.");
        self.cancel_token.cancel();
        self.records = None;

        if let Some(handle) = self.scan_task_handle.take() {
            if let Err(e) = handle.await {
                if e.is_cancelled() {
                    info!("Scan task was cancelled.");
                } else {
                    error!("Scan task finished with an unexpected join error: {:?}", e);
                }
            }
        }
    }
}

impl Drop for BluestRadio {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}
