//! Decoding of buffered event-table entries.
//!
//! `ReadBufferedCredit` and `ReadBufferedBillEvents` both answer with a
//! 1-byte event counter followed by result-byte pairs `(A, B)`, newest
//! first. The meaning of a pair depends on the device category, so raw
//! pairs and their decoded forms are separate types.

use crate::bill::{BillStatusCode, BillSuccessCode};
use crate::coin::CoinEventCode;

/// One undecoded event-table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEvent {
    pub result_a: u8,
    pub result_b: u8,
}

/// A coin acceptor event-table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoinEvent {
    /// A coin was accepted at `position` (1-16). `sorter_path` is 0 when
    /// the device has no sorter.
    Credit { position: u8, sorter_path: u8 },
    /// No credit; byte B carries an event code.
    Status(CoinEventCode),
}

/// A bill validator event-table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillEvent {
    /// A bill was validated at `position`; `code` says whether it was
    /// stacked outright or is waiting in escrow.
    Credit { position: u8, code: BillSuccessCode },
    /// No credit; byte B carries a status code.
    Status(BillStatusCode),
}

impl RawEvent {
    pub fn new(result_a: u8, result_b: u8) -> RawEvent {
        RawEvent { result_a, result_b }
    }

    pub fn decode_coin(self) -> CoinEvent {
        if self.result_a == 0 {
            CoinEvent::Status(CoinEventCode::from_wire(self.result_b))
        } else {
            CoinEvent::Credit { position: self.result_a, sorter_path: self.result_b }
        }
    }

    pub fn decode_bill(self) -> BillEvent {
        if self.result_a == 0 {
            BillEvent::Status(BillStatusCode::from_wire(self.result_b))
        } else {
            BillEvent::Credit {
                position: self.result_a,
                code: BillSuccessCode::from_wire(self.result_b),
            }
        }
    }
}
