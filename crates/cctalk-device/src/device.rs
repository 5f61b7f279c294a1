//! The device controller.
//!
//! One task per device drives the nine-state lifecycle described in
//! [`cctalk_types::DeviceState`]: it probes and initializes the device,
//! polls it at the device-recommended rate, and hands each poll result to
//! the event-log reconciler. The task is the single owner of all device
//! state; host commands arrive over a channel and are interleaved between
//! ticks, so a tick is never observed half-done.

use std::collections::BTreeMap;
use std::time::Duration;

use cctalk_link::Link;
use cctalk_types::{
    Category, DeviceConfig, DeviceEvent, DeviceState, EventSink, FaultCode, Identifier,
};
use futures::StreamExt;
use futures_channel::mpsc;
use tokio::time::MissedTickBehavior;

use crate::commands::{CommandError, Commands};
use crate::handle::{BillValidatorFn, DeviceCommand, DeviceSnapshot};

/// Fallback when the device reports no usable polling interval.
const DEFAULT_NORMAL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Ceiling for the normal polling interval.
const MAX_NORMAL_POLL_INTERVAL_MS: u64 = 1000;

/// Polling rate for states in which the device is presumed silent.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Positions to sweep when the device does not report a count.
const DEFAULT_POSITION_COUNT: u8 = 16;

/// Host-side cursor into the device's rolling event buffer.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct EventCursor {
    /// Device event counter at the last committed reconciliation.
    pub(crate) last_event_counter: u8,
    /// Whether the event table has been read at least once. Only gates
    /// logging of the raw table.
    pub(crate) ever_read: bool,
}

/// Outcome of the initialization sequence.
enum InitOutcome {
    /// All steps completed.
    Ready,
    /// The device did not answer the alive check.
    Dead,
    /// A later step failed while the device was answering.
    Failed,
}

pub(crate) struct Device<L> {
    pub(crate) commands: Commands<L>,
    pub(crate) config: DeviceConfig,
    pub(crate) sink: EventSink,
    pub(crate) bill_validator: BillValidatorFn,

    pub(crate) state: DeviceState,
    pub(crate) category: Category,
    pub(crate) manufacturing_info: String,
    pub(crate) identifiers: BTreeMap<u8, Identifier>,
    pub(crate) normal_poll_interval: Duration,
    pub(crate) cursor: EventCursor,
}

impl<L: Link> Device<L> {
    pub(crate) fn new(
        commands: Commands<L>,
        config: DeviceConfig,
        bill_validator: BillValidatorFn,
        sink: EventSink,
    ) -> Device<L> {
        Device {
            commands,
            config,
            sink,
            bill_validator,
            state: DeviceState::ShutDown,
            category: Category::Unknown,
            manufacturing_info: String::new(),
            identifiers: BTreeMap::new(),
            normal_poll_interval: DEFAULT_NORMAL_POLL_INTERVAL,
            cursor: EventCursor::default(),
        }
    }

    /// The task main loop: a polling timer plus the host command channel.
    ///
    /// Ticks are serialized by construction: the loop runs one tick to
    /// completion before selecting again, and missed timer fires are
    /// skipped, never queued. Closing the command channel shuts the
    /// device down and ends the task.
    pub(crate) async fn run(mut self, mut commands_rx: mpsc::Receiver<DeviceCommand>) {
        let mut current_interval = self.poll_interval();
        let mut interval = tokio::time::interval(current_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick(), if self.polling_enabled() => {
                    self.tick().await;
                }
                command = commands_rx.next() => {
                    match command {
                        Some(command) => self.handle_command(command).await,
                        None => {
                            self.shut_down().await;
                            return;
                        }
                    }
                }
            }

            let wanted = self.poll_interval();
            if wanted != current_interval {
                current_interval = wanted;
                interval = tokio::time::interval(wanted);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            }
        }
    }

    fn polling_enabled(&self) -> bool {
        !matches!(self.state, DeviceState::ShutDown | DeviceState::InitializationFailed)
    }

    fn poll_interval(&self) -> Duration {
        if self.state.polls_at_idle_rate() {
            IDLE_POLL_INTERVAL
        } else {
            self.normal_poll_interval
        }
    }

    async fn handle_command(&mut self, command: DeviceCommand) {
        match command {
            DeviceCommand::Initialize => self.initialize().await,
            DeviceCommand::Shutdown => self.shut_down().await,
            DeviceCommand::SetAccepting(true) => self.request_accepting().await,
            DeviceCommand::SetAccepting(false) => self.request_rejecting().await,
            DeviceCommand::Reset => self.soft_reset().await,
            DeviceCommand::Report(reply) => {
                let _ = reply.send(DeviceSnapshot {
                    state: self.state,
                    category: self.category,
                    manufacturing_info: self.manufacturing_info.clone(),
                    identifiers: self.identifiers.clone(),
                    normal_poll_interval_ms: self.normal_poll_interval.as_millis() as u64,
                });
            }
        }
    }

    /// One polling iteration. What happens depends entirely on the state.
    pub(crate) async fn tick(&mut self) {
        match self.state {
            // Nothing to poll; wait for host commands.
            DeviceState::ShutDown | DeviceState::InitializationFailed => {}

            // See if the device came back, and if so, initialize it.
            DeviceState::UninitializedDown => {
                if self.commands.simple_poll().await.is_ok() {
                    self.begin_initialization().await;
                }
            }

            // Freshly initialized: one self-check decides where to go.
            DeviceState::Initialized => match self.commands.self_check().await {
                Ok(FaultCode::Ok) => self.enter_normal_rejecting().await,
                _ => self.enter_diagnostics_polling().await,
            },

            DeviceState::NormalAccepting => self.poll_credit_events(true).await,
            DeviceState::NormalRejecting => self.poll_credit_events(false).await,

            // Poll the fault code until it clears.
            DeviceState::DiagnosticsPolling => {
                if matches!(self.commands.self_check().await, Ok(FaultCode::Ok)) {
                    self.enter_normal_rejecting().await;
                }
            }

            // Do nothing that could lose the event table (and with it,
            // credit); just try to bring the device back up.
            DeviceState::UnexpectedDown | DeviceState::ExternalReset => {
                self.begin_initialization().await;
            }
        }
    }

    async fn poll_credit_events(&mut self, accepting: bool) {
        match self.commands.buffered_credit_events(self.category).await {
            Ok(Some((counter, events))) => {
                self.process_event_log(accepting, counter, events).await;
            }
            // An empty reply or a read timeout is a ccTalk command
            // timeout: the tick ends silently.
            Ok(None) => {}
            Err(error) if error.is_response_timeout() => {}
            // Already logged; the next tick retries naturally.
            Err(_) => {}
        }
    }

    /// Host request: bring the device up from `ShutDown`.
    async fn initialize(&mut self) {
        if self.state != DeviceState::ShutDown {
            self.sink
                .log(format!("! Cannot initialize device that is in {} state.", self.state));
            return;
        }
        if self.commands.link().open().await.is_err() {
            // The open failure is already on the log; remain shut down so
            // the host can retry.
            return;
        }
        self.begin_initialization().await;
    }

    /// Run the initialization sequence and settle into the resulting state.
    pub(crate) async fn begin_initialization(&mut self) {
        if !self.state.can_begin_initialization() {
            self.sink
                .log(format!("! Cannot begin initialization from {} state.", self.state));
            return;
        }
        self.sink.log(format!(
            "Requested device state change from {} to: Initialized",
            self.state
        ));

        match self.run_initialization().await {
            InitOutcome::Ready => self.set_state(DeviceState::Initialized).await,
            InitOutcome::Dead => self.set_state(DeviceState::UninitializedDown).await,
            InitOutcome::Failed => {
                self.sink.log("! Device initialization failed.");
                self.set_state(DeviceState::InitializationFailed).await;
            }
        }
    }

    /// The initialization sequence. Steps run in order; the first failure
    /// aborts. A device that never answers the alive check is `Dead`
    /// (recoverable); a device that answers but fails setup is `Failed`
    /// (terminal).
    async fn run_initialization(&mut self) -> InitOutcome {
        if self.commands.simple_poll().await.is_err() {
            return InitOutcome::Dead;
        }

        let (category, info) = match self.fetch_manufacturing_info().await {
            Ok(result) => result,
            Err(_) => return InitOutcome::Failed,
        };
        if !category.is_supported() {
            self.sink
                .log(format!("! Equipment category \"{category}\" is not supported."));
            return InitOutcome::Failed;
        }
        self.category = category;
        self.manufacturing_info = info;

        match self.commands.polling_priority().await {
            Ok(device_ms) => self.normal_poll_interval = self.choose_poll_interval(device_ms),
            Err(_) => return InitOutcome::Failed,
        }

        match self.fetch_identifiers().await {
            Ok(identifiers) => self.identifiers = identifiers,
            Err(_) => return InitOutcome::Failed,
        }

        // Enable stacker and escrow so bills wait for a routing decision.
        if self.category == Category::BillValidator
            && self.commands.set_bill_operating_mode(true, true).await.is_err()
        {
            return InitOutcome::Failed;
        }

        // Enable all 16 positions. The ccTalk specification says coin acceptors
        // don't need this, but practice shows they do.
        if self.commands.set_inhibit_status(0xff, 0xff).await.is_err() {
            return InitOutcome::Failed;
        }

        InitOutcome::Ready
    }

    fn choose_poll_interval(&self, device_ms: u64) -> Duration {
        if let Some(override_ms) = self.config.normal_poll_interval_ms {
            let clamped = override_ms.clamp(1, MAX_NORMAL_POLL_INTERVAL_MS);
            self.sink
                .log(format!("* Using host-configured polling interval: {clamped}"));
            return Duration::from_millis(clamped);
        }
        if device_ms == 0 || device_ms > MAX_NORMAL_POLL_INTERVAL_MS {
            // 0,0 means "see the device docs"; huge values are useless
            // for credit polling.
            self.sink.log(format!(
                "* Device-recommended polling interval is invalid, using our default: {}",
                DEFAULT_NORMAL_POLL_INTERVAL.as_millis()
            ));
            DEFAULT_NORMAL_POLL_INTERVAL
        } else {
            self.sink
                .log(format!("* Device-recommended polling interval: {device_ms}"));
            Duration::from_millis(device_ms)
        }
    }

    async fn fetch_manufacturing_info(&self) -> Result<(Category, String), CommandError> {
        let mut infos = Vec::new();

        let (category, reported) = self.commands.equipment_category().await?;
        infos.push(format!("*** Equipment category: {}", reported.trim()));
        infos.push(format!("*** Product code: {}", self.commands.product_code().await?));
        infos.push(format!("*** Build code: {}", self.commands.build_code().await?));
        infos.push(format!("*** Manufacturer: {}", self.commands.manufacturer().await?));
        infos.push(format!("*** Serial number: {}", self.commands.serial_number().await?));
        infos.push(format!(
            "*** Software revision: {}",
            self.commands.software_revision().await?
        ));
        let (release, major, minor) = self.commands.comms_revision().await?;
        infos.push(format!(
            "*** ccTalk product release: {release}, ccTalk version {major}.{minor}"
        ));

        let info = infos.join("\n");
        self.sink.log(format!("* Manufacturing information:\n{info}"));
        Ok((category, info))
    }

    /// Sweep the identifier table and resolve country scaling.
    ///
    /// Positions reporting an empty string, the `"......"` sentinel, or a
    /// leading NUL are absent. For bill validators the device may report
    /// how many positions exist and provides scaling per country; coin
    /// acceptors have no scaling command, so the host-supplied table is
    /// used.
    async fn fetch_identifiers(&self) -> Result<BTreeMap<u8, Identifier>, CommandError> {
        let is_coin = self.category == Category::CoinAcceptor;
        let coin_bill = if is_coin { "Coin" } else { "Bill" };

        let mut max_positions = DEFAULT_POSITION_COUNT;
        if !is_coin {
            match self.commands.bill_type_count().await {
                Ok(Some(count)) => {
                    max_positions = count;
                    self.sink
                        .log(format!("* Number of bill types currently supported: {count}."));
                }
                // Optional command; fall back quietly to the default.
                Ok(None) | Err(_) => {
                    self.sink.log(format!(
                        "! Could not get the number of bill types currently supported, falling back to {max_positions}."
                    ));
                }
            }
        }

        let mut identifiers = BTreeMap::new();
        for position in 1..=max_positions {
            let raw = if is_coin {
                self.commands.coin_id(position).await?
            } else {
                self.commands.bill_id(position).await?
            };

            if raw.first() == Some(&0) {
                continue;
            }
            let text = String::from_utf8_lossy(&raw);
            let trimmed = text.trim();
            // 6 dots mean empty by convention, but all-null happens too.
            if trimmed.is_empty() || trimmed == "......" {
                continue;
            }

            match Identifier::parse(trimmed) {
                Ok(identifier) => {
                    identifiers.insert(position, identifier);
                }
                Err(error) => {
                    self.sink.log(format!(
                        "! Ignoring unparsable {coin_bill} identifier at position {position}: {error}"
                    ));
                }
            }
        }

        let countries: Vec<String> = {
            let mut seen = Vec::new();
            for identifier in identifiers.values() {
                if !seen.contains(&identifier.country) {
                    seen.push(identifier.country.clone());
                }
            }
            seen
        };

        let mut scaling_by_country = BTreeMap::new();
        for country in countries {
            if is_coin {
                match self.config.coin_scaling.get(&country) {
                    Some(scaling) => {
                        self.sink.log(format!(
                            "* Using predefined country scaling data for {country}: scaling factor: {}, decimal places: {}.",
                            scaling.scaling_factor, scaling.decimal_places
                        ));
                        scaling_by_country.insert(country, *scaling);
                    }
                    None => {
                        self.sink.log(format!(
                            "! No predefined country scaling data for {country}; values will be unscaled."
                        ));
                    }
                }
            } else {
                let scaling = self.commands.country_scaling(&country).await?;
                if scaling.is_valid() {
                    self.sink.log(format!(
                        "* Country scaling data for {country}: scaling factor: {}, decimal places: {}.",
                        scaling.scaling_factor, scaling.decimal_places
                    ));
                    scaling_by_country.insert(country, scaling);
                } else {
                    self.sink
                        .log(format!("* Country scaling data for {country}: empty!"));
                }
            }
        }
        for identifier in identifiers.values_mut() {
            if let Some(scaling) = scaling_by_country.get(&identifier.country) {
                identifier.set_scaling(*scaling);
            }
        }

        if identifiers.is_empty() {
            self.sink
                .log(format!("* No non-empty {coin_bill} identifiers received."));
        } else {
            let mut lines = vec![format!("* {coin_bill} identifiers:")];
            for (position, identifier) in &identifiers {
                lines.push(format!(
                    "*** {coin_bill} position {position}: {}",
                    identifier.id_string
                ));
            }
            self.sink.log(lines.join("\n"));
        }

        Ok(identifiers)
    }

    /// Host request: start accepting credit.
    async fn request_accepting(&mut self) {
        self.sink.log(format!(
            "Requested device state change from {} to: NormalAccepting",
            self.state
        ));
        match self.state {
            DeviceState::NormalAccepting => {
                self.sink.log("Cannot switch to device state NormalAccepting, already there.");
            }
            DeviceState::Initialized | DeviceState::NormalRejecting | DeviceState::DiagnosticsPolling => {
                self.enter_normal_accepting().await;
            }
            other => {
                self.sink
                    .log(format!("! Cannot start accepting from {other} state."));
            }
        }
    }

    /// Host request: stop accepting credit.
    async fn request_rejecting(&mut self) {
        self.sink.log(format!(
            "Requested device state change from {} to: NormalRejecting",
            self.state
        ));
        match self.state {
            DeviceState::NormalRejecting => {
                self.sink.log("Cannot switch to device state NormalRejecting, already there.");
            }
            DeviceState::Initialized | DeviceState::NormalAccepting | DeviceState::DiagnosticsPolling => {
                self.enter_normal_rejecting().await;
            }
            other => {
                self.sink
                    .log(format!("! Cannot start rejecting from {other} state."));
            }
        }
    }

    /// Entry effect for `NormalAccepting`: master inhibit off. A failure
    /// means the link is in trouble.
    pub(crate) async fn enter_normal_accepting(&mut self) {
        if self.commands.set_master_inhibit(false).await.is_ok() {
            self.set_state(DeviceState::NormalAccepting).await;
        } else {
            self.set_state(DeviceState::UnexpectedDown).await;
        }
    }

    /// Entry effect for `NormalRejecting`: master inhibit on.
    pub(crate) async fn enter_normal_rejecting(&mut self) {
        if self.commands.set_master_inhibit(true).await.is_ok() {
            self.set_state(DeviceState::NormalRejecting).await;
        } else {
            self.set_state(DeviceState::UnexpectedDown).await;
        }
    }

    /// Entry effect for `DiagnosticsPolling`: master inhibit on. The
    /// device does this itself when it detects a fault, but not when we
    /// enter diagnostics for our own reasons.
    pub(crate) async fn enter_diagnostics_polling(&mut self) {
        if self.commands.set_master_inhibit(true).await.is_ok() {
            self.set_state(DeviceState::DiagnosticsPolling).await;
        } else {
            self.set_state(DeviceState::UnexpectedDown).await;
        }
    }

    /// Host request (or channel closure): shut the device down.
    async fn shut_down(&mut self) {
        if self.state == DeviceState::ShutDown {
            return;
        }
        self.sink.log(format!(
            "Requested device state change from {} to: ShutDown",
            self.state
        ));

        if self.state == DeviceState::NormalAccepting {
            if let Err(error) = self.commands.set_master_inhibit(true).await {
                self.sink
                    .log(format!("! Error inhibiting the device during shutdown: {error}"));
            }
        }
        self.set_state(DeviceState::ShutDown).await;
        self.commands.link().close().await;
    }

    /// Host request: soft-reset the device, wait out the settling time,
    /// and let the normal re-probe path bring it back.
    async fn soft_reset(&mut self) {
        if !self.state.is_live() {
            self.sink
                .log(format!("! Cannot soft-reset a device in {} state.", self.state));
            return;
        }
        if self.commands.reset_device().await.is_ok() {
            tokio::time::sleep(Duration::from_millis(self.config.post_reset_delay_ms)).await;
            self.set_state(DeviceState::UninitializedDown).await;
        }
    }

    /// Commit a state transition, after validation, and tell the host.
    pub(crate) async fn set_state(&mut self, new: DeviceState) {
        if self.state == new {
            return;
        }
        if !self.state.can_transition_to(new) {
            self.sink.log(format!(
                "! Invalid device state transition from {} to {}; ignoring.",
                self.state, new
            ));
            return;
        }
        let old = std::mem::replace(&mut self.state, new);
        self.sink.log(format!("Device state changed to: {new}"));
        self.sink.emit(DeviceEvent::StateChanged { old, new }).await;
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::testutil::MockLink;
    use cctalk_link::LinkError;
    use cctalk_types::Header;
    use std::sync::Arc;

    fn test_device(category: Category) -> (Device<MockLink>, mpsc::Receiver<DeviceEvent>) {
        let (sink, rx) = EventSink::channel();
        let config = DeviceConfig::for_category("/dev/null", category);
        let commands = Commands::new(MockLink::new(), sink.clone());
        let device = Device::new(commands, config, Arc::new(|_, _| true), sink);
        (device, rx)
    }

    fn script_coin_init(link: &MockLink) {
        link.on(Header::GetEquipmentCategory, b"Coin Acceptor".to_vec());
        link.on(Header::GetProductCode, b"SR5".to_vec());
        link.on(Header::GetBuildCode, b"STD".to_vec());
        link.on(Header::GetManufacturer, b"NRI".to_vec());
        link.on(Header::GetSerialNumber, vec![0x01, 0x02, 0x03]);
        link.on(Header::GetSoftwareRevision, b"4.0".to_vec());
        link.on(Header::GetCommsRevision, vec![1, 4, 4]);
        link.on(Header::GetPollingPriority, vec![2, 10]);
        link.on(Header::GetCoinId, b"GE010A".to_vec());
        link.on(Header::GetCoinId, b"......".to_vec());
    }

    #[tokio::test]
    async fn test_initialization_reaches_initialized() {
        let (mut device, _rx) = test_device(Category::CoinAcceptor);
        script_coin_init(device.commands.link());

        device.begin_initialization().await;

        assert_eq!(device.state, DeviceState::Initialized);
        assert_eq!(device.category, Category::CoinAcceptor);
        assert_eq!(device.normal_poll_interval, Duration::from_millis(100));
        assert_eq!(device.identifiers.len(), 1);
        let identifier = device.identifiers.get(&1).unwrap();
        assert_eq!(identifier.id_string, "GE010A");
        // The predefined coin scaling seed for GE was applied.
        assert_eq!(identifier.scaling.scaling_factor, 1);
        assert_eq!(identifier.scaling.decimal_places, 2);
        assert!(device.manufacturing_info.contains("*** Product code: SR5"));

        // All 16 positions were swept and the inhibit mask enabled.
        assert_eq!(device.commands.link().sent_with(Header::GetCoinId).len(), 16);
        assert_eq!(
            device.commands.link().sent_with(Header::SetInhibitStatus),
            vec![vec![0xff, 0xff]]
        );
    }

    #[tokio::test]
    async fn test_identifier_sentinels_leave_positions_absent() {
        let (mut device, _rx) = test_device(Category::CoinAcceptor);
        let link = device.commands.link();
        link.on(Header::GetEquipmentCategory, b"Coin Acceptor".to_vec());
        link.on(Header::GetProductCode, b"SR5".to_vec());
        link.on(Header::GetBuildCode, b"STD".to_vec());
        link.on(Header::GetManufacturer, b"NRI".to_vec());
        link.on(Header::GetSerialNumber, vec![1, 2, 3]);
        link.on(Header::GetSoftwareRevision, b"4.0".to_vec());
        link.on(Header::GetCommsRevision, vec![1, 4, 4]);
        link.on(Header::GetPollingPriority, vec![2, 10]);
        // Position 1 all-zero, position 2 empty, position 3 real, the
        // rest the six-dot sentinel.
        link.on(Header::GetCoinId, vec![0, 0, 0, 0, 0, 0]);
        link.on(Header::GetCoinId, vec![]);
        link.on(Header::GetCoinId, b"GE010A".to_vec());
        link.on(Header::GetCoinId, b"......".to_vec());

        device.begin_initialization().await;

        assert_eq!(device.state, DeviceState::Initialized);
        assert_eq!(device.identifiers.len(), 1);
        assert!(device.identifiers.contains_key(&3));
    }

    #[tokio::test]
    async fn test_initialization_dead_device() {
        let (mut device, _rx) = test_device(Category::CoinAcceptor);
        device.commands.link().on_error(
            Header::SimplePoll,
            LinkError::ResponseTimeout { request_id: 1, timeout_ms: 1500 },
        );

        device.begin_initialization().await;
        assert_eq!(device.state, DeviceState::UninitializedDown);
    }

    #[tokio::test]
    async fn test_initialization_rejects_unsupported_category() {
        let (mut device, _rx) = test_device(Category::CoinAcceptor);
        device.commands.link().on(Header::GetEquipmentCategory, b"Payout".to_vec());

        device.begin_initialization().await;
        assert_eq!(device.state, DeviceState::InitializationFailed);
    }

    #[tokio::test]
    async fn test_initialization_failure_on_live_device_is_terminal() {
        let (mut device, _rx) = test_device(Category::CoinAcceptor);
        let link = device.commands.link();
        script_coin_init(link);
        link.on_error(
            Header::SetInhibitStatus,
            LinkError::ResponseTimeout { request_id: 9, timeout_ms: 1500 },
        );

        device.begin_initialization().await;
        assert_eq!(device.state, DeviceState::InitializationFailed);
    }

    #[tokio::test]
    async fn test_bill_validator_init_sets_operating_mode_and_scaling() {
        let (mut device, _rx) = test_device(Category::BillValidator);
        let link = device.commands.link();
        link.on(Header::GetEquipmentCategory, b"Bill Validator".to_vec());
        link.on(Header::GetProductCode, b"BV100".to_vec());
        link.on(Header::GetBuildCode, b"STD".to_vec());
        link.on(Header::GetManufacturer, b"ITL".to_vec());
        link.on(Header::GetSerialNumber, vec![9, 9, 9]);
        link.on(Header::GetSoftwareRevision, b"1.1".to_vec());
        link.on(Header::GetCommsRevision, vec![1, 4, 4]);
        link.on(Header::GetPollingPriority, vec![2, 20]);
        link.on(Header::GetVariableSet, vec![3, 1]);
        link.on(Header::GetBillId, b"GE0020A".to_vec());
        link.on(Header::GetBillId, b"......".to_vec());
        link.on(Header::GetCountryScalingFactor, vec![1, 0, 2]);

        device.begin_initialization().await;

        assert_eq!(device.state, DeviceState::Initialized);
        assert_eq!(device.normal_poll_interval, Duration::from_millis(200));
        // The reported bill type count bounds the sweep.
        assert_eq!(device.commands.link().sent_with(Header::GetBillId).len(), 3);
        // Stacker and escrow were enabled.
        assert_eq!(
            device.commands.link().sent_with(Header::SetBillOperatingMode),
            vec![vec![0b11]]
        );
        let identifier = device.identifiers.get(&1).unwrap();
        assert_eq!(identifier.scaling.scaling_factor, 1);
        assert_eq!(identifier.scaling.decimal_places, 2);
    }

    #[tokio::test]
    async fn test_poll_interval_clamping() {
        let (mut device, _rx) = test_device(Category::CoinAcceptor);
        // Device reports nonsense: fall back to the default.
        assert_eq!(device.choose_poll_interval(0), DEFAULT_NORMAL_POLL_INTERVAL);
        assert_eq!(device.choose_poll_interval(60_000), DEFAULT_NORMAL_POLL_INTERVAL);
        assert_eq!(device.choose_poll_interval(200), Duration::from_millis(200));

        // A host override wins and is clamped into range.
        device.config.normal_poll_interval_ms = Some(5000);
        assert_eq!(device.choose_poll_interval(200), Duration::from_millis(1000));
        device.config.normal_poll_interval_ms = Some(0);
        assert_eq!(device.choose_poll_interval(200), Duration::from_millis(1));
    }

    #[tokio::test]
    async fn test_first_self_check_routes_state() {
        let (mut device, _rx) = test_device(Category::CoinAcceptor);
        device.category = Category::CoinAcceptor;
        device.state = DeviceState::Initialized;
        device.commands.link().on(Header::PerformSelfCheck, vec![0]);

        device.tick().await;
        assert_eq!(device.state, DeviceState::NormalRejecting);

        // A faulty device goes to diagnostics instead.
        let (mut device, _rx) = test_device(Category::CoinAcceptor);
        device.state = DeviceState::Initialized;
        device.commands.link().on(Header::PerformSelfCheck, vec![39]);

        device.tick().await;
        assert_eq!(device.state, DeviceState::DiagnosticsPolling);
    }

    #[tokio::test]
    async fn test_diagnostics_polls_until_fault_clears() {
        let (mut device, _rx) = test_device(Category::CoinAcceptor);
        device.state = DeviceState::DiagnosticsPolling;
        let link = device.commands.link();
        link.on(Header::PerformSelfCheck, vec![39]);
        link.on(Header::PerformSelfCheck, vec![0]);

        device.tick().await;
        assert_eq!(device.state, DeviceState::DiagnosticsPolling);

        device.tick().await;
        assert_eq!(device.state, DeviceState::NormalRejecting);
    }

    #[tokio::test]
    async fn test_master_inhibit_failure_means_link_lost() {
        let (mut device, _rx) = test_device(Category::CoinAcceptor);
        device.state = DeviceState::NormalRejecting;
        device.commands.link().on_error(
            Header::SetMasterInhibitStatus,
            LinkError::ResponseTimeout { request_id: 1, timeout_ms: 1500 },
        );

        device.enter_normal_accepting().await;
        assert_eq!(device.state, DeviceState::UnexpectedDown);
    }

    #[tokio::test]
    async fn test_invalid_transition_is_refused() {
        let (mut device, _rx) = test_device(Category::CoinAcceptor);
        device.set_state(DeviceState::NormalAccepting).await;
        assert_eq!(device.state, DeviceState::ShutDown);
    }
}
