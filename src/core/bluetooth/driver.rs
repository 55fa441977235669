//! Scan lifecycle: background start attempts, fixed-delay retry and the poll loop.

use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::scan_config::ScanConfig;
use crate::core::bluetooth::radio::BeaconRadio;
use crate::core::bluetooth::types::BeaconRecord;
use crate::core::task::{RepeatingTask, Tick, spawn_delayed};
use crate::error::RelayError;

/// Events produced by the driver's background work, handled on the relay's control path
#[derive(Debug)]
pub enum ScanEvent<R> {
    /// The radio opened and scanning is enabled
    Started(R),
    /// The start attempt failed; the radio is handed back for the retry
    StartFailed(R, RelayError),
    /// The retry delay after a failed start has elapsed; carries the retry generation
    RetryDue(u64),
    /// A decoded beacon, in poll order
    Beacon(BeaconRecord),
    /// Polling started failing; sent once per run of failures
    PollFailed(RelayError),
    /// A poll succeeded after a run of failures
    PollRecovered,
    /// The scan stream ended; the radio has to be opened again
    ScanLost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    Idle,
    Opening,
    WaitingToRetry,
    Scanning,
}

/// Poll loop job: owns the open radio while scanning
struct PollJob<R: BeaconRadio> {
    radio: R,
    scan_window: Duration,
    failing: bool,
    lost: bool,
    events: mpsc::UnboundedSender<ScanEvent<R>>,
}

#[async_trait::async_trait]
impl<R: BeaconRadio> Tick for PollJob<R> {
    async fn tick(&mut self) {
        if self.lost {
            return;
        }
        match self.radio.poll(self.scan_window).await {
            Ok(records) => {
                if self.failing {
                    self.failing = false;
                    info!("Beacon polling recovered");
                    let _ = self.events.send(ScanEvent::PollRecovered);
                }
                debug!("Poll returned {} beacon records", records.len());
                for record in records {
                    if self.events.send(ScanEvent::Beacon(record)).is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                error!("Beacon poll failed: {}", e);
                let lost = matches!(e, RelayError::ScanStopped | RelayError::RadioClosed);
                if !self.failing {
                    self.failing = true;
                    let _ = self.events.send(ScanEvent::PollFailed(e));
                }
                if lost {
                    self.lost = true;
                    let _ = self.events.send(ScanEvent::ScanLost);
                }
            }
        }
    }
}

/// Drives the radio through start, retry and polling.
///
/// The radio is only ever touched by one path at a time: the start worker
/// while opening, then the poll task while scanning.
pub struct ScanDriver<R: BeaconRadio> {
    config: ScanConfig,
    radio: Option<R>,
    phase: ScanPhase,
    attempts: u64,
    retry_generation: u64,
    /// Carried across poll tasks so a reopened scan reports its recovery
    poll_failing: bool,
    poll_task: Option<RepeatingTask<PollJob<R>>>,
    retry_token: Option<CancellationToken>,
    shutdown: CancellationToken,
    events: mpsc::UnboundedSender<ScanEvent<R>>,
}

impl<R: BeaconRadio> ScanDriver<R> {
    pub fn new(
        config: ScanConfig,
        radio: R,
        events: mpsc::UnboundedSender<ScanEvent<R>>,
    ) -> Self {
        Self {
            config,
            radio: Some(radio),
            phase: ScanPhase::Idle,
            attempts: 0,
            retry_generation: 0,
            poll_failing: false,
            poll_task: None,
            retry_token: None,
            shutdown: CancellationToken::new(),
            events,
        }
    }

    pub fn phase(&self) -> ScanPhase {
        self.phase
    }

    /// Number of start attempts made so far
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    /// Starts (or restarts) scanning on a background worker.
    /// Returns false when no new attempt was spawned.
    pub async fn start(&mut self) -> bool {
        match self.phase {
            ScanPhase::Opening => {
                debug!("Scan start already in progress");
                return false;
            }
            ScanPhase::WaitingToRetry => {
                if let Some(token) = self.retry_token.take() {
                    token.cancel();
                }
            }
            ScanPhase::Scanning => {
                info!("Restarting Bluetooth scan");
                self.stop_polling().await;
            }
            ScanPhase::Idle => {}
        }

        let Some(mut radio) = self.radio.take() else {
            error!("Radio handle lost, cannot start scan");
            self.phase = ScanPhase::Idle;
            return false;
        };

        self.attempts += 1;
        self.phase = ScanPhase::Opening;
        info!("Starting Bluetooth scan (attempt {})", self.attempts);

        let events = self.events.clone();
        let cancel_token = self.shutdown.child_token();
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = cancel_token.cancelled() => return,
                result = radio.open() => result,
            };
            let event = match result {
                Ok(()) => ScanEvent::Started(radio),
                Err(e) => ScanEvent::StartFailed(radio, e),
            };
            let _ = events.send(event);
        });
        true
    }

    /// Begins polling the freshly opened radio
    pub fn on_started(&mut self, radio: R) {
        info!("Bluetooth scan started");
        let job = PollJob {
            radio,
            scan_window: self.config.scan_window(),
            failing: self.poll_failing,
            lost: false,
            events: self.events.clone(),
        };
        self.poll_task = Some(RepeatingTask::spawn(
            "beacon poll",
            self.config.poll_interval(),
            job,
            &self.shutdown,
        ));
        self.phase = ScanPhase::Scanning;
    }

    /// Keeps the radio and schedules the next start attempt
    pub fn on_start_failed(&mut self, radio: R, error: RelayError) {
        warn!(
            "Failed to start Bluetooth scan: {}. Retrying in {:?}",
            error,
            self.config.retry_delay()
        );
        self.radio = Some(radio);
        self.schedule_retry();
    }

    /// Stops the poll loop after the scan stream ended and reopens the radio
    /// after the usual retry delay
    pub async fn on_scan_lost(&mut self) {
        if self.phase != ScanPhase::Scanning {
            debug!("Ignoring stale scan loss");
            return;
        }
        warn!(
            "Bluetooth scan lost. Reopening in {:?}",
            self.config.retry_delay()
        );
        self.stop_polling().await;
        if self.radio.is_none() {
            error!("Radio handle lost, cannot reopen scan");
            self.phase = ScanPhase::Idle;
            return;
        }
        self.schedule_retry();
    }

    /// Runs the scheduled retry, unless a newer start superseded it
    pub async fn on_retry_due(&mut self, generation: u64) -> bool {
        if self.phase != ScanPhase::WaitingToRetry || generation != self.retry_generation {
            debug!("Ignoring stale scan retry");
            return false;
        }
        self.retry_token = None;
        self.start().await
    }

    fn schedule_retry(&mut self) {
        self.retry_generation += 1;
        let token = self.shutdown.child_token();
        spawn_delayed(
            self.config.retry_delay(),
            self.events.clone(),
            ScanEvent::RetryDue(self.retry_generation),
            token.clone(),
        );
        self.retry_token = Some(token);
        self.phase = ScanPhase::WaitingToRetry;
    }

    async fn stop_polling(&mut self) {
        if let Some(task) = self.poll_task.take() {
            if let Some(mut job) = task.stop().await {
                job.radio.close().await;
                self.poll_failing = job.failing;
                self.radio = Some(job.radio);
            }
        }
    }

    /// Cancels the poll loop, any pending retry and any in-flight start
    pub async fn shutdown(&mut self) {
        self.shutdown.cancel();
        self.retry_token = None;
        self.stop_polling().await;
        self.phase = ScanPhase::Idle;
        info!("Bluetooth scan stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;

    struct FailingRadio;

    #[async_trait::async_trait]
    impl BeaconRadio for FailingRadio {
        async fn open(&mut self) -> Result<()> {
            Err(RelayError::AdapterUnavailable)
        }

        async fn poll(&mut self, _window: Duration) -> Result<Vec<BeaconRecord>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_retry_is_ignored() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut driver = ScanDriver::new(ScanConfig::default(), FailingRadio, tx);

        assert!(driver.start().await);
        let Some(ScanEvent::StartFailed(radio, e)) = rx.recv().await else {
            panic!("expected a failed start");
        };
        driver.on_start_failed(radio, e);
        assert_eq!(driver.phase(), ScanPhase::WaitingToRetry);

        // Restarting before the retry fires replaces it
        assert!(driver.start().await);
        let Some(ScanEvent::StartFailed(radio, e)) = rx.recv().await else {
            panic!("expected a failed start");
        };
        driver.on_start_failed(radio, e);
        assert_eq!(driver.attempts(), 2);

        assert!(!driver.on_retry_due(1).await);
        assert_eq!(driver.attempts(), 2);
        assert!(driver.on_retry_due(2).await);
        assert_eq!(driver.attempts(), 3);

        driver.shutdown().await;
        assert_eq!(driver.phase(), ScanPhase::Idle);
    }
}
