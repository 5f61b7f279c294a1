//! High-level driver for ccTalk cash peripherals.
//!
//! This crate turns the link layer into a running device: a typed command
//! wrapper per ccTalk header, a nine-state lifecycle controller that polls
//! the device at its own recommended rate, and the event-log reconciler
//! that converts the rolling 5-entry event buffer into exactly-once
//! `CreditAccepted` notifications.
//!
//! The host talks to a device through [`DeviceHandle`] and listens on the
//! [`cctalk_types::DeviceEvent`] stream:
//!
//! ```ignore
//! let config = DeviceConfig::for_category("/dev/ttyUSB0", Category::CoinAcceptor);
//! let (handle, mut events) = cctalk_device::spawn(config, Arc::new(|_, _| true))?;
//! handle.initialize().await?;
//! while let Some(event) = events.next().await {
//!     if let DeviceEvent::CreditAccepted { position, identifier } = event {
//!         println!("credit at {position}: {}", identifier.id_string);
//!     }
//! }
//! ```

mod commands;
mod device;
mod handle;
mod reconcile;
#[cfg(test)]
pub(crate) mod testutil;

pub use commands::{CommandError, Commands};
pub use handle::{spawn, spawn_with_link, BillValidatorFn, DeviceHandle, DeviceSnapshot, HandleError};

pub use cctalk_link::{Link, LinkController, LinkError, Reply};
pub use cctalk_types::{
    Category, DeviceConfig, DeviceEvent, DeviceState, EventSink, Identifier, LoggingFlags,
};
