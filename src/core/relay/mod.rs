//! The beacon relay
//! Owns the scan lifecycle and the subscription table, and fans decoded
//! beacon records out to the apps subscribed to them.

pub mod state;
pub mod subscriptions;

use std::collections::BTreeSet;
use std::sync::Arc;

use log::Level;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::bus::MessageBus;
use crate::bus::messages::{
    AppCommand, AppRequest, CharacteristicEvent, InboundMessage, ServiceDescriptor, ServiceEntry,
    StateNotification,
};
use crate::config::RelayConfig;
use crate::config::adaptor_config::AdaptorConfig;
use crate::core::bluetooth::constants::{
    BLE_BEACON_INTERVAL, CHARACTERISTIC_BLE_BEACON, CHARACTERISTIC_BTLE_BEACON,
    DEFAULT_MIN_INTERVAL,
};
use crate::core::bluetooth::driver::{ScanDriver, ScanEvent, ScanPhase};
use crate::core::bluetooth::radio::BeaconRadio;
use crate::core::bluetooth::types::BeaconRecord;
use crate::error::RelayError;

pub use state::{AdaptorState, LifecycleAction};
pub use subscriptions::{SubscriptionTable, normalize_identifier};

const STATUS_OK: &str = "ok";

/// Bridges the radio to the bus.
///
/// All message handling and table mutation happen on the single task running
/// [`BeaconRelay::run`]; only the scan start attempt and the poll loop run in
/// the background, and they report back through scan events.
pub struct BeaconRelay<B: MessageBus, R: BeaconRadio> {
    adaptor: AdaptorConfig,
    status: String,
    state: AdaptorState,
    subscriptions: SubscriptionTable,
    min_interval: f64,
    poll_failing: bool,
    bus: Arc<B>,
    scanner: ScanDriver<R>,
    scan_events: mpsc::UnboundedReceiver<ScanEvent<R>>,
}

impl<B: MessageBus, R: BeaconRadio> BeaconRelay<B, R> {
    pub fn new(config: &RelayConfig, bus: Arc<B>, radio: R) -> Self {
        let (events_tx, scan_events) = mpsc::unbounded_channel();
        Self {
            adaptor: config.adaptor.clone(),
            status: STATUS_OK.to_string(),
            state: AdaptorState::Stopped,
            subscriptions: SubscriptionTable::new(),
            min_interval: DEFAULT_MIN_INTERVAL,
            poll_failing: false,
            bus,
            scanner: ScanDriver::new(config.scan.clone(), radio, events_tx),
            scan_events,
        }
    }

    pub fn id(&self) -> &str {
        &self.adaptor.id
    }

    pub fn state(&self) -> AdaptorState {
        self.state
    }

    pub fn subscriptions(&self) -> &SubscriptionTable {
        &self.subscriptions
    }

    /// Smallest update interval (seconds) any app has asked for
    pub fn min_interval(&self) -> f64 {
        self.min_interval
    }

    pub fn scan_phase(&self) -> ScanPhase {
        self.scanner.phase()
    }

    pub fn scan_attempts(&self) -> u64 {
        self.scanner.attempts()
    }

    fn log(&self, level: Level, message: &str) {
        self.bus.log(level, message);
    }

    /// Moves the lifecycle and reports the new state to the manager
    pub fn set_state(&mut self, action: LifecycleAction) {
        self.state = self.state.apply(action);
        self.log(Level::Debug, &format!("State: {}", self.state));
        self.bus
            .send_manager_message(StateNotification::new(&self.adaptor.id, self.state).into());
    }

    /// Handles a raw bus message. Malformed messages are logged and dropped.
    pub async fn handle_value(&mut self, value: Value) {
        match InboundMessage::from_value(value.clone()) {
            Ok(message) => self.handle_message(message).await,
            Err(e) => self.log(Level::Warn, &format!("{}, dropping {}", e, value)),
        }
    }

    pub async fn handle_message(&mut self, message: InboundMessage) {
        match message {
            InboundMessage::Configure { config } => self.on_configure_message(config).await,
            InboundMessage::AppInit { id } => self.on_app_init(&id),
            InboundMessage::AppRequest(request) => self.on_app_request(request),
            InboundMessage::AppCommand(command) => self.on_app_command(command),
        }
    }

    /// Any configuration (re)starts the scan. The reported state moves to
    /// `starting` straight away, whatever the outcome of the attempt.
    pub async fn on_configure_message(&mut self, config: Value) {
        self.log(Level::Debug, &format!("Configure: {}", config));
        self.scanner.start().await;
        self.set_state(LifecycleAction::Starting);
    }

    /// Answers an app's init handshake with the service descriptor.
    /// This is the only place the relay reports `running`; if polling is
    /// failing at that point the error overlay follows straight away.
    pub fn on_app_init(&mut self, app_id: &str) {
        let service = vec![ServiceEntry {
            characteristic: CHARACTERISTIC_BLE_BEACON.to_string(),
            interval: BLE_BEACON_INTERVAL,
        }];
        let response =
            ServiceDescriptor::new(&self.adaptor.name, &self.adaptor.id, &self.status, service);
        self.bus.send_message(app_id, response.into());
        self.set_state(LifecycleAction::Running);
        if self.poll_failing {
            self.set_state(LifecycleAction::Error);
        }
    }

    /// Replaces the app's subscriptions with the ones named in the request.
    ///
    /// `ble_beacon` with `uuids` subscribes to those identifiers, without them
    /// to every beacon. The older `btle_beacon` entry always subscribes to
    /// every beacon.
    pub fn on_app_request(&mut self, request: AppRequest) {
        let mut uuids = BTreeSet::new();
        let mut all_beacons = false;

        for service in &request.service {
            let characteristic = service.characteristic.as_str();
            if characteristic != CHARACTERISTIC_BLE_BEACON
                && characteristic != CHARACTERISTIC_BTLE_BEACON
            {
                let err = RelayError::UnknownCharacteristic(service.characteristic.clone());
                self.log(Level::Warn, &format!("{} requested by {}", err, request.id));
                continue;
            }
            if let Some(interval) = service.interval {
                if interval < self.min_interval {
                    self.min_interval = interval;
                    self.log(Level::Debug, &format!("Min interval: {}", interval));
                }
            }
            match &service.uuids {
                Some(requested) => uuids.extend(requested.iter().map(|u| normalize_identifier(u))),
                None => all_beacons = true,
            }
            if characteristic == CHARACTERISTIC_BTLE_BEACON {
                all_beacons = true;
            }
        }

        self.subscriptions.replace(&request.id, &uuids, all_beacons);
        self.log(Level::Debug, &format!("Subscriptions: {}", self.subscriptions));
    }

    /// The relay is a sensor and accepts no commands
    pub fn on_app_command(&mut self, command: AppCommand) {
        if command.data.is_none() {
            self.log(Level::Warn, &format!("App message without data: {:?}", command));
        } else {
            self.log(
                Level::Warn,
                &format!("This is a sensor. Message not understood: {:?}", command),
            );
        }
    }

    /// Sends a record to every app subscribed to its identifier.
    /// Returns the number of apps it was sent to; records nobody wants are dropped.
    pub fn dispatch(&self, record: &BeaconRecord) -> usize {
        let uuid = normalize_identifier(record.uuid());
        let recipients = self.subscriptions.recipients(&uuid);
        if recipients.is_empty() {
            return 0;
        }

        let mut record = record.clone();
        record.data.uuid = uuid;
        let event = CharacteristicEvent::new(&self.adaptor.id, CHARACTERISTIC_BLE_BEACON, &record);
        for address in &recipients {
            self.bus.send_message(address, event.clone().into());
        }
        recipients.len()
    }

    async fn handle_scan_event(&mut self, event: ScanEvent<R>) {
        match event {
            ScanEvent::Started(radio) => self.scanner.on_started(radio),
            ScanEvent::StartFailed(radio, e) => self.scanner.on_start_failed(radio, e),
            ScanEvent::RetryDue(generation) => {
                self.scanner.on_retry_due(generation).await;
            }
            ScanEvent::ScanLost => self.scanner.on_scan_lost().await,
            ScanEvent::Beacon(record) => {
                self.dispatch(&record);
            }
            ScanEvent::PollFailed(e) => {
                self.poll_failing = true;
                self.log(Level::Error, &format!("Beacon polling failed: {}", e));
                if self.state == AdaptorState::Running {
                    self.set_state(LifecycleAction::Error);
                }
            }
            ScanEvent::PollRecovered => {
                self.poll_failing = false;
                if self.state == AdaptorState::Error {
                    self.set_state(LifecycleAction::ClearError);
                }
            }
        }
    }

    /// Processes bus messages and scan events until `shutdown` fires or the
    /// inbound channel closes, then stops scanning and reports `stopped`.
    pub async fn run(mut self, mut inbound: mpsc::Receiver<Value>, shutdown: CancellationToken) {
        self.log(Level::Info, &format!("Relay {} ready", self.adaptor.id));
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                message = inbound.recv() => match message {
                    Some(value) => self.handle_value(value).await,
                    None => break,
                },
                Some(event) = self.scan_events.recv() => self.handle_scan_event(event).await,
            }
        }

        self.scanner.shutdown().await;
        self.set_state(LifecycleAction::Stopped);
        self.log(Level::Info, &format!("Relay {} stopped", self.adaptor.id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::OutboundMessage;
    use crate::bus::messages::ServiceRequest;
    use crate::core::bluetooth::types::BeaconData;
    use crate::error::Result;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingBus {
        sent: Mutex<Vec<(String, OutboundMessage)>>,
    }

    impl RecordingBus {
        fn to(&self, address: &str) -> Vec<OutboundMessage> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter(|(to, _)| to == address)
                .map(|(_, m)| m.clone())
                .collect()
        }

        fn states(&self) -> Vec<AdaptorState> {
            self.to("manager")
                .into_iter()
                .filter_map(|m| match m {
                    OutboundMessage::State(s) => Some(s.state),
                    _ => None,
                })
                .collect()
        }
    }

    impl MessageBus for RecordingBus {
        fn send_message(&self, address: &str, message: OutboundMessage) {
            self.sent.lock().unwrap().push((address.to_string(), message));
        }

        fn send_manager_message(&self, message: OutboundMessage) {
            self.sent.lock().unwrap().push(("manager".to_string(), message));
        }
    }

    struct IdleRadio;

    #[async_trait::async_trait]
    impl BeaconRadio for IdleRadio {
        async fn open(&mut self) -> Result<()> {
            Ok(())
        }

        async fn poll(&mut self, window: Duration) -> Result<Vec<BeaconRecord>> {
            tokio::time::sleep(window).await;
            Ok(Vec::new())
        }
    }

    fn relay() -> (BeaconRelay<RecordingBus, IdleRadio>, Arc<RecordingBus>) {
        let bus = Arc::new(RecordingBus::default());
        let relay = BeaconRelay::new(&RelayConfig::default(), bus.clone(), IdleRadio);
        (relay, bus)
    }

    fn request(id: &str, uuids: &[&str]) -> AppRequest {
        AppRequest {
            id: id.to_string(),
            service: vec![ServiceRequest {
                characteristic: CHARACTERISTIC_BLE_BEACON.to_string(),
                uuids: Some(uuids.iter().map(|u| u.to_string()).collect()),
                interval: None,
            }],
        }
    }

    fn record(uuid: &str) -> BeaconRecord {
        BeaconRecord::new(BeaconData {
            address: "C4:4F:33:12:AB:CD".to_string(),
            uuid: uuid.to_string(),
            major: 1,
            minor: 2,
            reference_power: -59,
            rx_power: -70,
        })
    }

    #[test]
    fn starts_stopped_with_empty_table() {
        let (relay, bus) = relay();
        assert_eq!(relay.state(), AdaptorState::Stopped);
        assert!(relay.subscriptions().is_empty());
        assert!(bus.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn lowercase_record_routes_to_uppercase_subscription() {
        let (mut relay, bus) = relay();
        relay.on_app_request(request("app1", &["AA:BB"]));
        assert_eq!(relay.subscriptions().subscribers("AA:BB"), ["app1"]);

        assert_eq!(relay.dispatch(&record("aa:bb")), 1);
        assert_eq!(relay.dispatch(&record("CC:DD")), 0);

        let delivered = bus.to("app1");
        assert_eq!(delivered.len(), 1);
        let OutboundMessage::Characteristic(event) = &delivered[0] else {
            panic!("expected characteristic event, got {:?}", delivered[0]);
        };
        assert_eq!(event.id, "beacon_relay");
        assert_eq!(event.content, "characteristic");
        assert_eq!(event.characteristic, "ble_beacon");
        assert_eq!(event.data.uuid, "AA:BB");
    }

    #[test]
    fn resubscribing_moves_the_app() {
        let (mut relay, bus) = relay();
        relay.on_app_request(request("app1", &["AA:BB"]));
        relay.on_app_request(request("app1", &["CC:DD"]));

        assert_eq!(relay.subscriptions().identifiers_for("app1"), vec!["CC:DD"]);
        assert_eq!(relay.dispatch(&record("AA:BB")), 0);
        assert_eq!(relay.dispatch(&record("CC:DD")), 1);
        assert_eq!(bus.to("app1").len(), 1);
    }

    #[test]
    fn one_event_per_subscriber() {
        let (mut relay, bus) = relay();
        relay.on_app_request(request("app1", &["AA:BB"]));
        relay.on_app_request(request("app2", &["aa:bb", "CC:DD"]));
        relay.on_app_request(request("app2", &["aa:bb", "CC:DD"]));

        assert_eq!(relay.dispatch(&record("AA:BB")), 2);
        assert_eq!(bus.to("app1").len(), 1);
        assert_eq!(bus.to("app2").len(), 1);
    }

    #[test]
    fn unknown_characteristics_are_skipped() {
        let (mut relay, _bus) = relay();
        let mut req = request("app1", &["AA:BB"]);
        req.service.push(ServiceRequest {
            characteristic: "temperature".to_string(),
            uuids: Some(vec!["EE:FF".to_string()]),
            interval: Some(1.0),
        });
        relay.on_app_request(req);

        assert_eq!(relay.subscriptions().identifiers_for("app1"), vec!["AA:BB"]);
    }

    #[test]
    fn app_init_replies_with_service_then_reports_running() {
        let (mut relay, bus) = relay();
        relay.on_app_init("app1");

        let replies = bus.to("app1");
        assert_eq!(replies.len(), 1);
        let OutboundMessage::Service(descriptor) = &replies[0] else {
            panic!("expected service descriptor, got {:?}", replies[0]);
        };
        assert_eq!(descriptor.name, "BLE Beacon Relay");
        assert_eq!(descriptor.status, "ok");
        assert_eq!(descriptor.content, "service");
        assert_eq!(
            descriptor.service,
            vec![ServiceEntry {
                characteristic: "ble_beacon".to_string(),
                interval: 1.0
            }]
        );
        assert_eq!(bus.states(), vec![AdaptorState::Running]);
    }

    #[test]
    fn commands_are_rejected_without_side_effects() {
        let (mut relay, bus) = relay();
        relay.on_app_command(AppCommand {
            id: Some("app1".to_string()),
            data: Some(serde_json::json!("on")),
        });
        relay.on_app_command(AppCommand { id: None, data: None });

        assert!(bus.sent.lock().unwrap().is_empty());
        assert_eq!(relay.state(), AdaptorState::Stopped);
    }

    #[tokio::test]
    async fn malformed_messages_are_dropped() {
        let (mut relay, bus) = relay();
        relay
            .handle_value(serde_json::json!({"type": "app_request", "id": "app1"}))
            .await;
        relay.handle_value(serde_json::json!({"hello": "world"})).await;

        assert!(relay.subscriptions().is_empty());
        assert!(bus.sent.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn configure_reports_starting_but_not_running() {
        let (mut relay, bus) = relay();
        relay.on_configure_message(Value::Null).await;

        assert_eq!(relay.state(), AdaptorState::Starting);
        assert_eq!(relay.scan_phase(), ScanPhase::Opening);
        assert_eq!(bus.states(), vec![AdaptorState::Starting]);

        let event = relay.scan_events.recv().await.unwrap();
        relay.handle_scan_event(event).await;
        assert_eq!(relay.scan_phase(), ScanPhase::Scanning);
        assert_eq!(relay.state(), AdaptorState::Starting);
    }

    #[test]
    fn legacy_characteristic_subscribes_to_every_beacon() {
        let (mut relay, bus) = relay();
        relay.on_app_request(AppRequest {
            id: "app1".to_string(),
            service: vec![ServiceRequest {
                characteristic: "btle_beacon".to_string(),
                uuids: None,
                interval: Some(1.0),
            }],
        });

        assert_eq!(relay.dispatch(&record("AA:BB")), 1);
        assert_eq!(relay.dispatch(&record("CC:DD")), 1);
        assert_eq!(bus.to("app1").len(), 2);
    }

    #[test]
    fn tracks_smallest_requested_interval() {
        let (mut relay, _bus) = relay();
        assert_eq!(relay.min_interval(), 10.0);

        let mut req = request("app1", &["AA:BB"]);
        req.service[0].interval = Some(5.0);
        relay.on_app_request(req);
        let mut req = request("app2", &["CC:DD"]);
        req.service[0].interval = Some(2.5);
        relay.on_app_request(req);
        let mut req = request("app3", &["CC:DD"]);
        req.service[0].interval = Some(4.0);
        relay.on_app_request(req);

        assert_eq!(relay.min_interval(), 2.5);
    }

    #[test]
    fn app_init_during_poll_failures_reports_error() {
        let (mut relay, bus) = relay();
        relay.set_state(LifecycleAction::Starting);
        relay.poll_failing = true;
        relay.on_app_init("app1");

        assert_eq!(
            bus.states(),
            vec![AdaptorState::Starting, AdaptorState::Running, AdaptorState::Error]
        );
    }

    #[test]
    fn error_overlay_clears_to_running() {
        let (mut relay, bus) = relay();
        relay.set_state(LifecycleAction::Starting);
        relay.set_state(LifecycleAction::Error);
        relay.set_state(LifecycleAction::ClearError);

        assert_eq!(
            bus.states(),
            vec![AdaptorState::Starting, AdaptorState::Error, AdaptorState::Running]
        );
    }
}
