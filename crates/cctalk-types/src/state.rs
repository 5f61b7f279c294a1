//! # Device State Machine
//!
//! A single state drives each ccTalk device. The state machine prevents
//! invalid lifecycle combinations and is the single source of truth for
//! what the polling loop does each tick.
//!
//! ## State Transition Diagram
//!
//! ```text
//!  ShutDown ----init----------------------------------> Initialized
//!  ShutDown <---shutdown------------------- (any state)
//!  Initialized --self-check ok-----> NormalRejecting
//!  Initialized --self-check fault--> DiagnosticsPolling
//!  NormalRejecting <------> NormalAccepting        (host toggle)
//!  NormalAccepting --fault event--> DiagnosticsPolling
//!  NormalRejecting --fault event--> DiagnosticsPolling
//!  DiagnosticsPolling --fault clears--> NormalRejecting
//!  (any live) --link lost-----------> UnexpectedDown --retry--> Initialized
//!  (any live) --counter drops to 0--> ExternalReset  --retry--> Initialized
//!  (any live) --soft reset---------> UninitializedDown
//!  init fails, device alive --> InitializationFailed        (terminal)
//!  init fails, device dead ---> UninitializedDown --alive--> Initialized
//! ```
//!
//! ## State Invariants
//!
//! - **ShutDown**: no port open, no polling; entered on creation and on
//!   explicit shutdown.
//! - **UninitializedDown**: device did not answer `SimplePoll`; polled at
//!   the idle rate until it comes back.
//! - **Initialized**: probe and setup completed; the next tick self-checks
//!   and moves on.
//! - **InitializationFailed**: setup failed while the device was alive;
//!   terminal.
//! - **NormalAccepting / NormalRejecting**: event table polled every tick;
//!   master inhibit off / on respectively.
//! - **DiagnosticsPolling**: self-check polled until the fault clears.
//! - **UnexpectedDown**: link lost mid-operation. The device must NOT be
//!   reset from here: the event log still holds unread credits.
//! - **ExternalReset**: the device-side event counter dropped to zero after
//!   being non-zero; credits may have been lost.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a ccTalk device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceState {
    /// Initial state, device not probed yet, or shut down.
    ShutDown,
    /// Device failed to respond when entering `Initialized`, or after a
    /// soft reset. Checked for liveness continuously.
    UninitializedDown,
    /// Probed and configured: manufacturing info read, polling interval
    /// chosen, identifiers loaded, inhibits enabled.
    Initialized,
    /// Initialization failed on a live device. Terminal.
    InitializationFailed,
    /// Master inhibit off; the event table is polled continuously.
    NormalAccepting,
    /// Master inhibit on; the event table is polled continuously.
    NormalRejecting,
    /// Polling the fault code until the fault is resolved.
    DiagnosticsPolling,
    /// The device went down during normal operation.
    UnexpectedDown,
    /// An external reset of the device was detected.
    ExternalReset,
}

impl DeviceState {
    /// States the initialization sequence may start from.
    pub fn can_begin_initialization(self) -> bool {
        matches!(
            self,
            DeviceState::ShutDown
                | DeviceState::ExternalReset
                | DeviceState::UnexpectedDown
                | DeviceState::UninitializedDown
        )
    }

    /// States in which the device is up and being driven.
    pub fn is_live(self) -> bool {
        matches!(
            self,
            DeviceState::Initialized
                | DeviceState::NormalAccepting
                | DeviceState::NormalRejecting
                | DeviceState::DiagnosticsPolling
        )
    }

    /// States polled at the fixed idle rate because the device is presumed
    /// silent; the rest poll at the device-recommended interval.
    pub fn polls_at_idle_rate(self) -> bool {
        matches!(
            self,
            DeviceState::ShutDown
                | DeviceState::UninitializedDown
                | DeviceState::InitializationFailed
                | DeviceState::UnexpectedDown
                | DeviceState::ExternalReset
        )
    }

    /// Validate that a transition to `new_state` is allowed from here.
    pub fn can_transition_to(self, new_state: DeviceState) -> bool {
        use DeviceState::*;

        // Explicit shutdown is allowed from anywhere, idempotently.
        if new_state == ShutDown {
            return true;
        }

        match (self, new_state) {
            // Initialization entry points, including its two failure exits.
            (ShutDown | ExternalReset | UnexpectedDown | UninitializedDown, Initialized) => true,
            (ShutDown | ExternalReset | UnexpectedDown | UninitializedDown, InitializationFailed) => true,
            (ShutDown | ExternalReset | UnexpectedDown, UninitializedDown) => true,

            // Out of Initialized after the first self-check.
            (Initialized, NormalRejecting) => true,
            (Initialized, NormalAccepting) => true,
            (Initialized, DiagnosticsPolling) => true,

            // Host toggling and fault handling in steady state.
            (NormalAccepting, NormalRejecting) => true,
            (NormalRejecting, NormalAccepting) => true,
            (NormalAccepting | NormalRejecting, DiagnosticsPolling) => true,
            (DiagnosticsPolling, NormalRejecting) => true,
            (DiagnosticsPolling, NormalAccepting) => true,

            // Losing the device, detecting a reset, or soft-resetting it.
            (state, UnexpectedDown) if state.is_live() => true,
            (state, ExternalReset) if state.is_live() => true,
            (state, UninitializedDown) if state.is_live() => true,

            _ => false,
        }
    }
}

impl std::fmt::Display for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DeviceState::ShutDown => "ShutDown",
            DeviceState::UninitializedDown => "UninitializedDown",
            DeviceState::Initialized => "Initialized",
            DeviceState::InitializationFailed => "InitializationFailed",
            DeviceState::NormalAccepting => "NormalAccepting",
            DeviceState::NormalRejecting => "NormalRejecting",
            DeviceState::DiagnosticsPolling => "DiagnosticsPolling",
            DeviceState::UnexpectedDown => "UnexpectedDown",
            DeviceState::ExternalReset => "ExternalReset",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use DeviceState::*;

    #[test]
    fn test_valid_transitions() {
        assert!(ShutDown.can_transition_to(Initialized));
        assert!(Initialized.can_transition_to(NormalRejecting));
        assert!(Initialized.can_transition_to(DiagnosticsPolling));
        assert!(NormalRejecting.can_transition_to(NormalAccepting));
        assert!(NormalAccepting.can_transition_to(NormalRejecting));
        assert!(NormalAccepting.can_transition_to(DiagnosticsPolling));
        assert!(DiagnosticsPolling.can_transition_to(NormalRejecting));
        assert!(UnexpectedDown.can_transition_to(Initialized));
        assert!(ExternalReset.can_transition_to(Initialized));
        assert!(UninitializedDown.can_transition_to(Initialized));
        assert!(NormalAccepting.can_transition_to(ExternalReset));
        assert!(NormalRejecting.can_transition_to(UnexpectedDown));
        assert!(NormalAccepting.can_transition_to(UninitializedDown));
    }

    #[test]
    fn test_shutdown_from_anywhere() {
        for state in [
            ShutDown,
            UninitializedDown,
            Initialized,
            InitializationFailed,
            NormalAccepting,
            NormalRejecting,
            DiagnosticsPolling,
            UnexpectedDown,
            ExternalReset,
        ] {
            assert!(state.can_transition_to(ShutDown), "{state} -> ShutDown");
        }
    }

    #[test]
    fn test_invalid_transitions() {
        // Cannot reach steady state without initializing first.
        assert!(!ShutDown.can_transition_to(NormalAccepting));
        assert!(!ShutDown.can_transition_to(NormalRejecting));
        // Terminal means terminal.
        assert!(!InitializationFailed.can_transition_to(Initialized));
        assert!(!InitializationFailed.can_transition_to(NormalRejecting));
        // Down states cannot be lost again.
        assert!(!UnexpectedDown.can_transition_to(ExternalReset));
        assert!(!ExternalReset.can_transition_to(UnexpectedDown));
    }

    #[test]
    fn test_polling_classes() {
        assert!(ShutDown.polls_at_idle_rate());
        assert!(UnexpectedDown.polls_at_idle_rate());
        assert!(ExternalReset.polls_at_idle_rate());
        assert!(!NormalAccepting.polls_at_idle_rate());
        assert!(!DiagnosticsPolling.polls_at_idle_rate());
    }

    #[test]
    fn test_serialization() {
        let state = DeviceState::NormalAccepting;
        let json = serde_json::to_string(&state).unwrap();
        let back: DeviceState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, back);
    }
}
