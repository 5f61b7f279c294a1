//! Protocol and domain types for the ccTalk cash-peripheral driver.
//!
//! This crate holds everything the other driver crates agree on: command
//! header bytes, equipment categories, fault and event code tables (with
//! their accept/reject classifications), coin/bill identifiers and country
//! scaling, the device state machine enum, host-facing events, and the
//! configuration surface.
//!
//! Unknown wire bytes never panic anywhere in this crate; every byte-mapped
//! enum round-trips unrecognized values through an `Unknown(u8)` variant.

pub mod bill;
pub mod category;
pub mod coin;
pub mod config;
pub mod event;
pub mod events;
pub mod fault;
pub mod header;
pub mod identifier;
pub mod state;

pub use bill::{BillEventKind, BillStatusCode, BillSuccessCode, RouteCommand, RouteStatus};
pub use category::Category;
pub use coin::{CoinDisposition, CoinEventCode};
pub use config::{ConfigError, DeviceConfig, LoggingFlags};
pub use event::{BillEvent, CoinEvent, RawEvent};
pub use events::{DeviceEvent, EventSink};
pub use fault::FaultCode;
pub use header::Header;
pub use identifier::{coin_value_code, CountryScaling, Identifier, IdentifierError};
pub use state::DeviceState;

/// Render a byte slice as lowercase hex, the way raw traffic is logged.
pub fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_rendering() {
        assert_eq!(hex(&[0x02, 0x00, 0x01, 0xfe, 0xff]), "020001feff");
        assert_eq!(hex(&[]), "");
    }
}
