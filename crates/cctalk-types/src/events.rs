//! Events emitted to the host, and the sink they travel through.

use futures::SinkExt;
use futures_channel::mpsc;

use crate::identifier::Identifier;
use crate::state::DeviceState;

/// Events from the driver to the host.
///
/// Log lines carry a leading severity marker: `>` request, `<` response,
/// `*` info, `!` error, `$` credit/event. Hosts collapsing repeated lines
/// conventionally mark the collapsed run with `-`.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// The device state changed.
    StateChanged { old: DeviceState, new: DeviceState },
    /// A coin or bill was accepted. Emitted exactly once per credit, and
    /// never for events buffered before the host started.
    CreditAccepted { position: u8, identifier: Identifier },
    /// A reply arrived but its payload could not be decoded.
    ResponseDecodeError { request_id: u64, message: String },
    /// A log line for the host's sink.
    Log { message: String },
}

/// Cloneable sender half of the host event stream.
///
/// Log lines are sent best-effort and silently discarded once the host
/// drops the receiver; everything else waits for channel capacity so it
/// is never lost. The host must keep draining the receiver for the
/// device to make progress.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::Sender<DeviceEvent>,
}

impl EventSink {
    /// Default capacity of the host event channel.
    pub const CHANNEL_CAPACITY: usize = 256;

    pub fn new(tx: mpsc::Sender<DeviceEvent>) -> EventSink {
        EventSink { tx }
    }

    /// Create a sink together with its receiver.
    pub fn channel() -> (EventSink, mpsc::Receiver<DeviceEvent>) {
        let (tx, rx) = mpsc::channel(Self::CHANNEL_CAPACITY);
        (EventSink::new(tx), rx)
    }

    /// Queue a log line, best-effort.
    pub fn log(&self, message: impl Into<String>) {
        let _ = self.tx.clone().try_send(DeviceEvent::Log { message: message.into() });
    }

    /// Deliver an event, waiting for capacity.
    pub async fn emit(&self, event: DeviceEvent) {
        let _ = self.tx.clone().send(event).await;
    }
}
