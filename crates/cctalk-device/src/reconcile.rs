//! The event-log reconciler.
//!
//! The device keeps a rolling buffer of its 5 newest events and a 1-byte
//! counter that wraps 255 to 1, reserving 0 for power-up. Each poll, the
//! host diffs that counter against its own cursor to find how many
//! entries are new, processes them oldest first, performs the end-of-batch
//! actions (self-check, escrow routing, diagnostics transition), and only
//! then commits the cursor. Credit emission is never retried: when in
//! doubt, under-counting beats double-counting.

use cctalk_link::Link;
use cctalk_types::{
    BillEvent, BillEventKind, BillSuccessCode, Category, CoinDisposition, CoinEvent, DeviceEvent,
    DeviceState, FaultCode, RawEvent, RouteCommand,
};

use crate::device::Device;

/// A bill waiting in escrow for a routing decision at end-of-batch.
struct PendingRoute {
    position: u8,
    /// Set when the machine is rejecting: the bill goes back regardless of
    /// the host predicate.
    force_reject: bool,
}

impl<L: Link> Device<L> {
    /// Reconcile one poll result against the host cursor.
    ///
    /// `events` is the buffered table, newest first. `accepting` tells the
    /// reconciler which steady state the poll ran in.
    pub(crate) async fn process_event_log(
        &mut self,
        accepting: bool,
        counter: u8,
        events: Vec<RawEvent>,
    ) {
        let coin_bill = if self.category == Category::CoinAcceptor { "Coin" } else { "Bill" };

        // Log the raw table, but only when it changed.
        if !self.cursor.ever_read || self.cursor.last_event_counter != counter {
            let mut lines = vec![format!(
                "* {coin_bill} buffered credit / event table (newest to oldest):"
            )];
            lines.push(format!(
                "*** Host-side last processed event number: {}",
                self.cursor.last_event_counter
            ));
            lines.push(format!("*** Device-side event counter: {counter}"));
            for event in &events {
                lines.push(format!(
                    "*** Credit: {}, error / sorter: {}",
                    event.result_a, event.result_b
                ));
            }
            self.sink.log(lines.join("\n"));
            self.cursor.ever_read = true;
        }

        let last = self.cursor.last_event_counter;

        // Freshly powered up on both sides: nothing to process.
        if last == 0 && counter == 0 {
            return;
        }

        // The counter dropped back to zero: the device was reset behind
        // our back, and events (with their credits) may be gone.
        if last != 0 && counter == 0 {
            self.sink
                .log("! The device appears to have been reset, possible loss of credit.");
            self.cursor.last_event_counter = 0;
            self.set_state(DeviceState::ExternalReset).await;
            return;
        }

        if last == counter {
            return;
        }

        // A non-zero counter on a fresh cursor means the device was up
        // and generating events before this host started. Process them
        // for their side effects, but the credits were counted by the
        // previous host process.
        let startup_sweep = last == 0;
        if startup_sweep {
            self.sink.log(
                "! Detected device that was up (and generating events) before the host startup; \
                 ignoring \"credit accepted\" events.",
            );
        }

        let mut new_count = i32::from(counter) - i32::from(last);
        if new_count < 0 {
            new_count += 255;
        }
        let new_count = new_count as usize;
        if new_count > events.len() {
            self.sink.log(format!(
                "! Event counter difference {new_count} is greater than buffer size {}, possible loss of credit.",
                events.len()
            ));
        }
        let new_events = &events[..new_count.min(events.len())];
        self.sink.log(format!(
            "* Found {} new event(s); processing from oldest to newest.",
            new_events.len()
        ));

        let mut self_check_requested = false;
        let mut pending_route: Option<PendingRoute> = None;

        // Newest first in the buffer, so iterate indexes high to low.
        for (index, raw) in new_events.iter().enumerate().rev() {
            let newest_in_batch = index == 0;
            if self.category == Category::CoinAcceptor {
                self.process_coin_event(
                    accepting,
                    startup_sweep,
                    raw.decode_coin(),
                    &mut self_check_requested,
                )
                .await;
            } else {
                self.process_bill_event(
                    accepting,
                    startup_sweep,
                    newest_in_batch,
                    raw.decode_bill(),
                    &mut self_check_requested,
                    &mut pending_route,
                )
                .await;
            }
        }

        // End-of-batch actions, in this fixed order: self-check, escrow
        // routing, diagnostics transition. Then the cursor commit.
        let mut self_check_failed = false;
        if self_check_requested {
            self.sink.log(
                "* At least one new event has an error code, requesting SelfCheck to see if there is a global fault code.",
            );
            self_check_failed = !matches!(self.commands.self_check().await, Ok(FaultCode::Ok));
        }

        if let Some(route) = pending_route {
            self.route_pending_bill(route, self_check_failed).await;
        }

        if self_check_failed {
            self.sink
                .log("* SelfCheck returned a non-OK fault code, switching to diagnostics polling mode.");
            self.enter_diagnostics_polling().await;
        }

        self.cursor.last_event_counter = counter;
    }

    async fn process_coin_event(
        &mut self,
        accepting: bool,
        startup_sweep: bool,
        event: CoinEvent,
        self_check_requested: &mut bool,
    ) {
        match event {
            CoinEvent::Status(code) => {
                let disposition = code.disposition();
                self.sink.log(format!(
                    "$ Coin status/error event {code} found, rejection type: {disposition}."
                ));
                // An event that is neither clearly accepted nor clearly
                // rejected may mean a device fault.
                if disposition == CoinDisposition::Unknown {
                    *self_check_requested = true;
                }
            }
            CoinEvent::Credit { position, sorter_path } => {
                let Some(identifier) = self.identifiers.get(&position) else {
                    self.sink.log(format!(
                        "! Coin accepted at position {position} with no known identifier; not crediting."
                    ));
                    return;
                };
                if startup_sweep {
                    self.sink.log("$ The following is a startup event message, ignore it:");
                }
                self.sink.log(format!(
                    "$ Coin (position {position}, ID {}) has been accepted to sorter path {sorter_path}.",
                    identifier.id_string
                ));
                if !accepting && !startup_sweep {
                    self.sink
                        .log("! Coin accepted even though we're in rejecting mode; internal error!");
                }
                if !startup_sweep {
                    let identifier = identifier.clone();
                    self.sink
                        .emit(DeviceEvent::CreditAccepted { position, identifier })
                        .await;
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn process_bill_event(
        &mut self,
        accepting: bool,
        startup_sweep: bool,
        newest_in_batch: bool,
        event: BillEvent,
        self_check_requested: &mut bool,
        pending_route: &mut Option<PendingRoute>,
    ) {
        match event {
            BillEvent::Status(code) => {
                let kind = code.kind();
                self.sink
                    .log(format!("$ Bill status/error event {code} found, event type: {kind}."));
                // Status and reject events are routine; anything else may
                // show up in the self-check fault code.
                if !matches!(kind, BillEventKind::Status | BillEventKind::Reject) {
                    *self_check_requested = true;
                }
            }
            BillEvent::Credit { position, code } => {
                let id_string = self
                    .identifiers
                    .get(&position)
                    .map(|identifier| identifier.id_string.clone())
                    .unwrap_or_default();

                match code {
                    BillSuccessCode::ValidatedAndHeldInEscrow => {
                        // Route only on the newest event: anything that
                        // happened after the escrow event makes the
                        // decision stale.
                        if !newest_in_batch {
                            if startup_sweep {
                                self.sink
                                    .log("$ The following is a startup event message, ignore it:");
                            }
                            self.sink.log(format!(
                                "$ Bill (position {position}, ID {id_string}) is or was in escrow, too late to process an old event; ignoring."
                            ));
                            return;
                        }
                        let mut force_reject = false;
                        if !accepting {
                            if startup_sweep {
                                self.sink
                                    .log("$ The following is a startup event message, ignore it:");
                            }
                            self.sink.log(format!(
                                "$ Bill (position {position}, ID {id_string}) is or was in escrow, even though we're in rejecting mode; forcing rejection."
                            ));
                            force_reject = true;
                        }
                        *pending_route = Some(PendingRoute { position, force_reject });
                    }
                    BillSuccessCode::ValidatedAndAccepted => {
                        // Appears after a routing request (or a routing
                        // timeout on the device side). Credit the user.
                        let Some(identifier) = self.identifiers.get(&position) else {
                            self.sink.log(format!(
                                "! Bill accepted at position {position} with no known identifier; not crediting."
                            ));
                            return;
                        };
                        if startup_sweep {
                            self.sink
                                .log("$ The following is a startup event message, ignore it:");
                        }
                        self.sink.log(format!(
                            "$ Bill (position {position}, ID {}) has been accepted.",
                            identifier.id_string
                        ));
                        if !accepting && !startup_sweep {
                            self.sink.log(
                                "! Bill accepted even though we're in rejecting mode; internal error!",
                            );
                        }
                        if !startup_sweep {
                            let identifier = identifier.clone();
                            self.sink
                                .emit(DeviceEvent::CreditAccepted { position, identifier })
                                .await;
                        }
                    }
                    BillSuccessCode::Unknown(byte) => {
                        self.sink.log(format!(
                            "! Invalid bill success code {byte} at position {position}; ignoring event."
                        ));
                    }
                }
            }
        }
    }

    /// Decide the fate of the bill in escrow, then send `RouteBill`.
    ///
    /// A non-OK self-check or a force-reject beats the host predicate;
    /// otherwise the predicate decides.
    async fn route_pending_bill(&mut self, route: PendingRoute, self_check_failed: bool) {
        let identifier = self.identifiers.get(&route.position).cloned();
        let id_string = identifier
            .as_ref()
            .map(|identifier| identifier.id_string.clone())
            .unwrap_or_default();

        let accept = if self_check_failed {
            self.sink
                .log("* SelfCheck returned a non-OK fault code; pending bill in escrow will be rejected.");
            false
        } else if route.force_reject {
            self.sink
                .log("! Forcing bill validation rejection due to being in NormalRejecting state.");
            false
        } else if let Some(identifier) = &identifier {
            let accept = (self.bill_validator)(route.position, identifier);
            self.sink.log(format!(
                "* Bill validating function status: {}.",
                if accept { "accept" } else { "reject" }
            ));
            accept
        } else {
            self.sink.log(format!(
                "! Bill in escrow at position {} has no known identifier; rejecting.",
                route.position
            ));
            false
        };

        let command = if accept { RouteCommand::RouteToStacker } else { RouteCommand::ReturnBill };
        self.sink.log(format!(
            "$ Bill (position {}, ID {id_string}) is in escrow, sending a request for: {command}.",
            route.position
        ));
        if let Ok(status) = self.commands.route_bill(command).await {
            self.sink.log(format!(
                "$ Bill (position {}, ID {id_string}) routing status: {status}.",
                route.position
            ));
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::commands::Commands;
    use crate::testutil::MockLink;
    use cctalk_types::{DeviceConfig, EventSink, Header, Identifier};
    use futures_channel::mpsc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn test_device(
        category: Category,
        state: DeviceState,
    ) -> (Device<MockLink>, mpsc::Receiver<DeviceEvent>) {
        let (sink, rx) = EventSink::channel();
        let config = DeviceConfig::for_category("/dev/null", category);
        let commands = Commands::new(MockLink::new(), sink.clone());
        let mut device = Device::new(commands, config, Arc::new(|_, _| true), sink);
        device.category = category;
        device.state = state;
        (device, rx)
    }

    fn with_identifier(device: &mut Device<MockLink>, position: u8, id: &str) {
        device
            .identifiers
            .insert(position, Identifier::parse(id).unwrap());
    }

    fn committed(device: &Device<MockLink>) -> u8 {
        device.cursor.last_event_counter
    }

    fn drain_credits(rx: &mut mpsc::Receiver<DeviceEvent>) -> Vec<u8> {
        let mut positions = Vec::new();
        while let Ok(Some(event)) = rx.try_next() {
            if let DeviceEvent::CreditAccepted { position, .. } = event {
                positions.push(position);
            }
        }
        positions
    }

    fn drain_logs(rx: &mut mpsc::Receiver<DeviceEvent>) -> Vec<String> {
        let mut messages = Vec::new();
        while let Ok(Some(event)) = rx.try_next() {
            if let DeviceEvent::Log { message } = event {
                messages.push(message);
            }
        }
        messages
    }

    /// Pad a batch with old all-zero entries, newest first.
    fn table(newest: &[(u8, u8)]) -> Vec<RawEvent> {
        let mut events: Vec<RawEvent> =
            newest.iter().map(|&(a, b)| RawEvent::new(a, b)).collect();
        while events.len() < 5 {
            events.push(RawEvent::new(0, 0));
        }
        events
    }

    #[tokio::test]
    async fn test_both_counters_zero_is_silent() {
        let (mut device, mut rx) = test_device(Category::CoinAcceptor, DeviceState::NormalAccepting);
        device.process_event_log(true, 0, table(&[])).await;
        assert_eq!(committed(&device), 0);
        assert!(drain_credits(&mut rx).is_empty());
        assert_eq!(device.state, DeviceState::NormalAccepting);
    }

    #[tokio::test]
    async fn test_startup_sweep_suppresses_credit() {
        let (mut device, mut rx) = test_device(Category::CoinAcceptor, DeviceState::NormalAccepting);
        with_identifier(&mut device, 1, "GE010A");

        device.process_event_log(true, 1, table(&[(1, 2)])).await;

        assert!(drain_credits(&mut rx).is_empty());
        assert_eq!(committed(&device), 1);
    }

    #[tokio::test]
    async fn test_single_coin_credit() {
        let (mut device, mut rx) = test_device(Category::CoinAcceptor, DeviceState::NormalAccepting);
        with_identifier(&mut device, 1, "GE010A");
        device.cursor.last_event_counter = 1;
        device.cursor.ever_read = true;

        device.process_event_log(true, 2, table(&[(1, 2), (1, 2)])).await;

        assert_eq!(drain_credits(&mut rx), vec![1]);
        assert_eq!(committed(&device), 2);
    }

    #[tokio::test]
    async fn test_unchanged_counter_emits_nothing() {
        let (mut device, mut rx) = test_device(Category::CoinAcceptor, DeviceState::NormalAccepting);
        with_identifier(&mut device, 1, "GE010A");
        device.cursor.last_event_counter = 2;
        device.cursor.ever_read = true;

        device.process_event_log(true, 2, table(&[(1, 2), (1, 2)])).await;
        device.process_event_log(true, 2, table(&[(1, 2), (1, 2)])).await;

        assert!(drain_credits(&mut rx).is_empty());
        assert_eq!(committed(&device), 2);
    }

    #[tokio::test]
    async fn test_counter_wrap_processes_oldest_first() {
        let (mut device, mut rx) = test_device(Category::CoinAcceptor, DeviceState::NormalAccepting);
        for position in 1..=3 {
            with_identifier(&mut device, position, "GE010A");
        }
        device.cursor.last_event_counter = 254;
        device.cursor.ever_read = true;

        // Counter wraps 255 -> 1, skipping 0: diff is 3.
        device
            .process_event_log(true, 2, table(&[(3, 0), (2, 0), (1, 0)]))
            .await;

        assert_eq!(drain_credits(&mut rx), vec![1, 2, 3]);
        assert_eq!(committed(&device), 2);
    }

    #[tokio::test]
    async fn test_counter_overrun_reports_loss_but_processes_buffer() {
        let (mut device, mut rx) = test_device(Category::CoinAcceptor, DeviceState::NormalAccepting);
        for position in 1..=5 {
            with_identifier(&mut device, position, "GE010A");
        }
        device.cursor.last_event_counter = 1;
        device.cursor.ever_read = true;

        // diff = 6 with only 5 entries buffered: one credit is gone.
        device
            .process_event_log(true, 7, table(&[(5, 0), (4, 0), (3, 0), (2, 0), (1, 0)]))
            .await;

        assert_eq!(drain_credits(&mut rx), vec![1, 2, 3, 4, 5]);
        assert_eq!(committed(&device), 7);

        let (mut device2, mut rx2) = test_device(Category::CoinAcceptor, DeviceState::NormalAccepting);
        device2.cursor.last_event_counter = 1;
        device2.cursor.ever_read = true;
        device2.process_event_log(true, 7, table(&[])).await;
        let logs = drain_logs(&mut rx2);
        assert!(logs
            .iter()
            .any(|line| line.contains("greater than buffer size")));
    }

    #[tokio::test]
    async fn test_external_reset_detection() {
        let (mut device, mut rx) = test_device(Category::CoinAcceptor, DeviceState::NormalAccepting);
        with_identifier(&mut device, 1, "GE010A");
        device.cursor.last_event_counter = 5;
        device.cursor.ever_read = true;

        device.process_event_log(true, 0, table(&[])).await;

        assert_eq!(device.state, DeviceState::ExternalReset);
        assert_eq!(committed(&device), 0);
        assert!(drain_credits(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_credit_in_rejecting_mode_warns_but_counts() {
        let (mut device, mut rx) = test_device(Category::CoinAcceptor, DeviceState::NormalRejecting);
        with_identifier(&mut device, 1, "GE010A");
        device.cursor.last_event_counter = 1;
        device.cursor.ever_read = true;

        device.process_event_log(false, 2, table(&[(1, 0), (1, 0)])).await;

        let mut credits = 0;
        let mut warned = false;
        while let Ok(Some(event)) = rx.try_next() {
            match event {
                DeviceEvent::CreditAccepted { .. } => credits += 1,
                DeviceEvent::Log { message } => {
                    warned |= message.contains("rejecting mode; internal error");
                }
                _ => {}
            }
        }
        assert_eq!(credits, 1);
        assert!(warned);
    }

    #[tokio::test]
    async fn test_missing_identifier_skips_credit() {
        let (mut device, mut rx) = test_device(Category::CoinAcceptor, DeviceState::NormalAccepting);
        device.cursor.last_event_counter = 1;
        device.cursor.ever_read = true;

        device.process_event_log(true, 2, table(&[(9, 0), (0, 0)])).await;

        assert!(drain_credits(&mut rx).is_empty());
        assert_eq!(committed(&device), 2);
    }

    #[tokio::test]
    async fn test_unknown_coin_event_triggers_self_check() {
        let (mut device, _rx) = test_device(Category::CoinAcceptor, DeviceState::NormalAccepting);
        device.cursor.last_event_counter = 1;
        device.cursor.ever_read = true;
        // MotorException classifies as Unknown.
        device.commands.link().on(Header::PerformSelfCheck, vec![0]);

        device.process_event_log(true, 2, table(&[(0, 35), (0, 0)])).await;

        assert_eq!(device.commands.link().sent_with(Header::PerformSelfCheck).len(), 1);
        // Fault code was Ok: no diagnostics transition.
        assert_eq!(device.state, DeviceState::NormalAccepting);
    }

    #[tokio::test]
    async fn test_fatal_bill_event_moves_to_diagnostics() {
        let (mut device, _rx) = test_device(Category::BillValidator, DeviceState::NormalAccepting);
        device.cursor.last_event_counter = 1;
        device.cursor.ever_read = true;
        // StackerJammed classifies as FatalError; the device confirms a
        // fault on self-check.
        device.commands.link().on(Header::PerformSelfCheck, vec![15]);

        device.process_event_log(true, 2, table(&[(0, 15), (0, 10)])).await;

        assert_eq!(device.state, DeviceState::DiagnosticsPolling);
        // Entering diagnostics set the master inhibit defensively.
        assert_eq!(
            device.commands.link().sent_with(Header::SetMasterInhibitStatus),
            vec![vec![0]]
        );
        assert_eq!(committed(&device), 2);
    }

    #[tokio::test]
    async fn test_escrow_accept_routes_to_stacker() {
        let (mut device, mut rx) = test_device(Category::BillValidator, DeviceState::NormalAccepting);
        with_identifier(&mut device, 3, "GE0020A");
        device.cursor.last_event_counter = 1;
        device.cursor.ever_read = true;

        // The escrow event is the newest (and only) new entry.
        device.process_event_log(true, 2, table(&[(3, 1)])).await;

        assert_eq!(
            device.commands.link().sent_with(Header::RouteBill),
            vec![vec![RouteCommand::RouteToStacker.wire()]]
        );
        // No credit until the device reports ValidatedAndAccepted.
        assert!(drain_credits(&mut rx).is_empty());

        // Next poll: the device stacked the bill.
        device.process_event_log(true, 3, table(&[(3, 0), (3, 1)])).await;
        assert_eq!(drain_credits(&mut rx), vec![3]);
        assert_eq!(committed(&device), 3);
    }

    #[tokio::test]
    async fn test_escrow_predicate_rejects() {
        let (sink, _rx) = EventSink::channel();
        let config = DeviceConfig::for_category("/dev/null", Category::BillValidator);
        let commands = Commands::new(MockLink::new(), sink.clone());
        let asked = Arc::new(AtomicBool::new(false));
        let asked_clone = Arc::clone(&asked);
        let mut device = Device::new(
            commands,
            config,
            Arc::new(move |_, _| {
                asked_clone.store(true, Ordering::Relaxed);
                false
            }),
            sink,
        );
        device.category = Category::BillValidator;
        device.state = DeviceState::NormalAccepting;
        with_identifier(&mut device, 3, "GE0020A");
        device.cursor.last_event_counter = 1;
        device.cursor.ever_read = true;

        device.process_event_log(true, 2, table(&[(3, 1)])).await;

        assert!(asked.load(Ordering::Relaxed));
        assert_eq!(
            device.commands.link().sent_with(Header::RouteBill),
            vec![vec![RouteCommand::ReturnBill.wire()]]
        );
    }

    #[tokio::test]
    async fn test_escrow_while_rejecting_forces_return() {
        let (mut device, mut rx) = test_device(Category::BillValidator, DeviceState::NormalRejecting);
        with_identifier(&mut device, 3, "GE0020A");
        device.cursor.last_event_counter = 1;
        device.cursor.ever_read = true;

        // The predicate says accept, but the machine is rejecting.
        device.process_event_log(false, 2, table(&[(3, 1)])).await;

        assert_eq!(
            device.commands.link().sent_with(Header::RouteBill),
            vec![vec![RouteCommand::ReturnBill.wire()]]
        );
        assert!(drain_credits(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_stale_escrow_event_is_ignored() {
        let (mut device, _rx) = test_device(Category::BillValidator, DeviceState::NormalAccepting);
        with_identifier(&mut device, 3, "GE0020A");
        device.cursor.last_event_counter = 1;
        device.cursor.ever_read = true;

        // Two new events; the escrow event is the older one, so the
        // decision is stale and no routing happens.
        device.process_event_log(true, 3, table(&[(0, 10), (3, 1)])).await;

        assert!(device.commands.link().sent_with(Header::RouteBill).is_empty());
        assert_eq!(committed(&device), 3);
    }

    #[tokio::test]
    async fn test_escrow_with_fault_rejects_despite_predicate() {
        let (mut device, _rx) = test_device(Category::BillValidator, DeviceState::NormalAccepting);
        with_identifier(&mut device, 3, "GE0020A");
        device.cursor.last_event_counter = 1;
        device.cursor.ever_read = true;
        device.commands.link().on(Header::PerformSelfCheck, vec![39]);

        // Batch: a fraud status (schedules self-check), then the escrow
        // event as newest.
        device.process_event_log(true, 3, table(&[(3, 1), (0, 9)])).await;

        // Self-check first, then the routing decision: reject.
        assert_eq!(
            device.commands.link().sent_with(Header::RouteBill),
            vec![vec![RouteCommand::ReturnBill.wire()]]
        );
        assert_eq!(device.state, DeviceState::DiagnosticsPolling);
    }

    #[tokio::test]
    async fn test_cursor_commits_after_batch_actions() {
        let (mut device, _rx) = test_device(Category::BillValidator, DeviceState::NormalAccepting);
        device.cursor.last_event_counter = 1;
        device.cursor.ever_read = true;
        device.commands.link().on(Header::PerformSelfCheck, vec![0]);

        device.process_event_log(true, 2, table(&[(0, 9)])).await;

        // Fraud attempt scheduled a self-check; the fault cleared, so no
        // state change, and the cursor advanced exactly to the counter.
        assert_eq!(device.state, DeviceState::NormalAccepting);
        assert_eq!(committed(&device), 2);
    }
}
