//! ccTalk command header bytes.
//!
//! Core commands are mandatory for every device; the rest are required for
//! coin acceptors and bill validators specifically. Only the headers this
//! driver actually sends (plus `Reply`, which tags every response) are
//! listed; anything else a device could throw at us stays a raw byte.

/// A ccTalk command header.
///
/// Replies always carry header 0 (`Reply`); an ACK is a `Reply` with an
/// empty payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Header {
    /// Generic reply. ACKs use this with data size 0.
    Reply,
    /// Perform a soft reset. The settling time after the ACK is
    /// device-specific.
    ResetDevice,
    /// Command set revision, 3 bytes (release, major, minor).
    GetCommsRevision,
    /// Bill validator: bit mask, B0 use stacker, B1 use escrow.
    SetBillOperatingMode,
    /// Bill validator: route the bill held in escrow.
    RouteBill,
    /// Bill validator: scaling factor and decimal places for a country code.
    GetCountryScalingFactor,
    /// Bill validator: ASCII bill identifier at a position.
    GetBillId,
    /// Bill validator: the polling command, returns the event table.
    ReadBufferedBillEvents,
    /// Coin acceptor: ASCII coin identifier at a position.
    GetCoinId,
    /// Build code in ASCII.
    GetBuildCode,
    /// Master inhibit read-back, 1 byte, bit 0, 1 means accept.
    GetMasterInhibitStatus,
    /// Master inhibit write, 1 byte, bit 0, 1 means accept.
    SetMasterInhibitStatus,
    /// Coin acceptor: the polling command, returns the event table.
    ReadBufferedCredit,
    /// Per-position inhibit write, 2-byte mask, 1 means enabled.
    SetInhibitStatus,
    /// Fault code poll used while a fault condition persists.
    PerformSelfCheck,
    /// Software revision in ASCII.
    GetSoftwareRevision,
    /// Device serial number, usually 3 bytes.
    GetSerialNumber,
    /// Product code in ASCII.
    GetProductCode,
    /// Equipment category in ASCII, see [`crate::Category`].
    GetEquipmentCategory,
    /// Manufacturer name in ASCII.
    GetManufacturer,
    /// Device variables; for bill validators the first byte is the number
    /// of bill types supported.
    GetVariableSet,
    /// Recommended maximum polling interval as (unit, value).
    GetPollingPriority,
    /// Alive check, returns ACK.
    SimplePoll,
}

impl Header {
    /// The wire byte for this header.
    pub fn wire(self) -> u8 {
        match self {
            Header::Reply => 0,
            Header::ResetDevice => 1,
            Header::GetCommsRevision => 4,
            Header::SetBillOperatingMode => 153,
            Header::RouteBill => 154,
            Header::GetCountryScalingFactor => 156,
            Header::GetBillId => 157,
            Header::ReadBufferedBillEvents => 159,
            Header::GetCoinId => 184,
            Header::GetBuildCode => 192,
            Header::GetMasterInhibitStatus => 227,
            Header::SetMasterInhibitStatus => 228,
            Header::ReadBufferedCredit => 229,
            Header::SetInhibitStatus => 231,
            Header::PerformSelfCheck => 232,
            Header::GetSoftwareRevision => 241,
            Header::GetSerialNumber => 242,
            Header::GetProductCode => 244,
            Header::GetEquipmentCategory => 245,
            Header::GetManufacturer => 246,
            Header::GetVariableSet => 247,
            Header::GetPollingPriority => 249,
            Header::SimplePoll => 254,
        }
    }

    /// Display name used in request/response log lines.
    pub fn name(self) -> &'static str {
        match self {
            Header::Reply => "Reply",
            Header::ResetDevice => "ResetDevice",
            Header::GetCommsRevision => "GetCommsRevision",
            Header::SetBillOperatingMode => "SetBillOperatingMode",
            Header::RouteBill => "RouteBill",
            Header::GetCountryScalingFactor => "GetCountryScalingFactor",
            Header::GetBillId => "GetBillId",
            Header::ReadBufferedBillEvents => "ReadBufferedBillEvents",
            Header::GetCoinId => "GetCoinId",
            Header::GetBuildCode => "GetBuildCode",
            Header::GetMasterInhibitStatus => "GetMasterInhibitStatus",
            Header::SetMasterInhibitStatus => "SetMasterInhibitStatus",
            Header::ReadBufferedCredit => "ReadBufferedCredit",
            Header::SetInhibitStatus => "SetInhibitStatus",
            Header::PerformSelfCheck => "PerformSelfCheck",
            Header::GetSoftwareRevision => "GetSoftwareRevision",
            Header::GetSerialNumber => "GetSerialNumber",
            Header::GetProductCode => "GetProductCode",
            Header::GetEquipmentCategory => "GetEquipmentCategory",
            Header::GetManufacturer => "GetManufacturer",
            Header::GetVariableSet => "GetVariableSet",
            Header::GetPollingPriority => "GetPollingPriority",
            Header::SimplePoll => "SimplePoll",
        }
    }
}

impl std::fmt::Display for Header {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
