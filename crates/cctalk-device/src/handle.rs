//! The host-facing handle: spawn a device task, drive it with commands,
//! and listen to its event stream.

use std::collections::BTreeMap;
use std::sync::Arc;

use cctalk_link::{Link, LinkController};
use cctalk_types::{Category, ConfigError, DeviceConfig, DeviceEvent, DeviceState, EventSink, Identifier};
use futures::SinkExt;
use futures_channel::mpsc;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::commands::Commands;
use crate::device::Device;

/// Command channel capacity; commands are rare and tiny.
const COMMAND_CAPACITY: usize = 32;

/// The bill-accept decision supplied by the host, invoked for each bill
/// held in escrow. Called from the device task, so it must not block for
/// long: the device expects a routing decision within roughly one polling
/// interval.
pub type BillValidatorFn = Arc<dyn Fn(u8, &Identifier) -> bool + Send + Sync>;

/// Commands from the host to a device task.
#[derive(Debug)]
pub(crate) enum DeviceCommand {
    /// Open the port and run the initialization sequence.
    Initialize,
    /// Inhibit the device, close the port, stop polling.
    Shutdown,
    /// Toggle between `NormalAccepting` and `NormalRejecting`.
    SetAccepting(bool),
    /// Soft-reset the device and wait out the settling delay.
    Reset,
    /// Report the stored device information.
    Report(oneshot::Sender<DeviceSnapshot>),
}

/// What the device currently knows about itself, as stored during
/// initialization.
#[derive(Debug, Clone)]
pub struct DeviceSnapshot {
    pub state: DeviceState,
    pub category: Category,
    /// Free-form text gathered during initialization: product code,
    /// manufacturer, serial number, revisions.
    pub manufacturing_info: String,
    /// Validated denominations by device position.
    pub identifiers: BTreeMap<u8, Identifier>,
    /// The polling interval chosen at initialization.
    pub normal_poll_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandleError {
    #[error("the device task has stopped")]
    Closed,
}

/// Cloneable handle to a running device task.
///
/// Dropping every handle closes the command channel, which shuts the
/// device down and ends its task.
#[derive(Clone)]
pub struct DeviceHandle {
    tx: mpsc::Sender<DeviceCommand>,
}

impl DeviceHandle {
    /// Bring the device up from `ShutDown`.
    pub async fn initialize(&self) -> Result<(), HandleError> {
        self.send(DeviceCommand::Initialize).await
    }

    /// Shut the device down and release the port.
    pub async fn shutdown(&self) -> Result<(), HandleError> {
        self.send(DeviceCommand::Shutdown).await
    }

    /// Switch between accepting and rejecting credit.
    pub async fn set_accepting(&self, accepting: bool) -> Result<(), HandleError> {
        self.send(DeviceCommand::SetAccepting(accepting)).await
    }

    /// Soft-reset the device. It comes back through the normal re-probe
    /// path after the configured settling delay.
    pub async fn reset(&self) -> Result<(), HandleError> {
        self.send(DeviceCommand::Reset).await
    }

    /// Query the stored state, category, identifiers, and manufacturing
    /// info.
    pub async fn snapshot(&self) -> Result<DeviceSnapshot, HandleError> {
        let (tx, rx) = oneshot::channel();
        self.send(DeviceCommand::Report(tx)).await?;
        rx.await.map_err(|_| HandleError::Closed)
    }

    async fn send(&self, command: DeviceCommand) -> Result<(), HandleError> {
        self.tx.clone().send(command).await.map_err(|_| HandleError::Closed)
    }
}

/// Spawn a device on a real serial port.
///
/// Refuses configurations the link layer cannot honor before any port is
/// touched. The returned receiver carries the device's entire event
/// stream; the host must keep draining it.
pub fn spawn(
    config: DeviceConfig,
    bill_validator: BillValidatorFn,
) -> Result<(DeviceHandle, mpsc::Receiver<DeviceEvent>), ConfigError> {
    config.validate()?;
    let (sink, events) = EventSink::channel();
    let link = LinkController::new(&config, sink.clone());
    let handle = spawn_with_link(link, config, bill_validator, sink);
    Ok((handle, events))
}

/// Spawn a device over any [`Link`] implementation.
///
/// The `sink` must be the sender half of the event stream the host
/// listens on (and the same sink the link logs to, if it logs).
pub fn spawn_with_link<L: Link>(
    link: L,
    config: DeviceConfig,
    bill_validator: BillValidatorFn,
    sink: EventSink,
) -> DeviceHandle {
    let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
    let device = Device::new(Commands::new(link, sink.clone()), config, bill_validator, sink);
    tokio::spawn(device.run(rx));
    DeviceHandle { tx }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use cctalk_types::Category;

    #[tokio::test]
    async fn test_spawn_refuses_unsupported_config() {
        let mut config = DeviceConfig::for_category("/dev/null", Category::CoinAcceptor);
        config.checksum_16bit = true;
        let result = spawn(config, Arc::new(|_, _| true));
        assert!(matches!(result, Err(ConfigError::ChecksumModeUnsupported)));
    }

    #[tokio::test]
    async fn test_handle_reports_closed_task() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = DeviceHandle { tx };
        assert_eq!(handle.initialize().await, Err(HandleError::Closed));
    }
}
