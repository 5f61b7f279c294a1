//! Equipment categories, as reported by `GetEquipmentCategory`.

use serde::{Deserialize, Serialize};

/// Equipment category of a ccTalk device.
///
/// The driver only operates coin acceptors and bill validators, but it can
/// name everything a compliant device may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    Unknown,
    CoinAcceptor,
    Payout,
    Reel,
    BillValidator,
    CardReader,
    Changer,
    Display,
    Keypad,
    Dongle,
    Meter,
    Bootloader,
    Power,
    Printer,
    Rng,
    HopperScale,
    CoinFeeder,
    BillRecycler,
    Escrow,
    Debug,
}

impl Category {
    /// Parse the ASCII name a device reports.
    ///
    /// Whitespace is trimmed and underscores are mapped to spaces as an
    /// extension for not-quite-compliant devices.
    pub fn from_reported_name(reported: &str) -> Category {
        let normalized = reported.replace('_', " ");
        match normalized.trim() {
            "Coin Acceptor" => Category::CoinAcceptor,
            "Payout" => Category::Payout,
            "Reel" => Category::Reel,
            "Bill Validator" => Category::BillValidator,
            "Card Reader" => Category::CardReader,
            "Changer" => Category::Changer,
            "Display" => Category::Display,
            "Keypad" => Category::Keypad,
            "Dongle" => Category::Dongle,
            "Meter" => Category::Meter,
            "Bootloader" => Category::Bootloader,
            "Power" => Category::Power,
            "Printer" => Category::Printer,
            "RNG" => Category::Rng,
            "Hopper Scale" => Category::HopperScale,
            "Coin Feeder" => Category::CoinFeeder,
            "Bill Recycler" => Category::BillRecycler,
            "Escrow" => Category::Escrow,
            "Debug" => Category::Debug,
            _ => Category::Unknown,
        }
    }

    /// Standard bus address for this category; 0 if the category has none.
    pub fn default_address(self) -> u8 {
        match self {
            Category::CoinAcceptor => 2,
            Category::Payout => 3,
            Category::Reel => 30,
            Category::BillValidator => 40,
            Category::CardReader => 50,
            Category::Changer => 55,
            Category::Display => 60,
            Category::Keypad => 70,
            Category::Dongle => 80,
            Category::Meter => 90,
            Category::Bootloader => 99,
            Category::Power => 100,
            Category::Printer => 110,
            Category::Rng => 120,
            Category::HopperScale => 130,
            Category::CoinFeeder => 140,
            Category::BillRecycler => 150,
            Category::Escrow => 160,
            Category::Debug => 240,
            Category::Unknown => 0,
        }
    }

    /// Whether this driver can run a device of this category.
    pub fn is_supported(self) -> bool {
        matches!(self, Category::CoinAcceptor | Category::BillValidator)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Category::Unknown => "Unknown",
            Category::CoinAcceptor => "Coin Acceptor",
            Category::Payout => "Payout",
            Category::Reel => "Reel",
            Category::BillValidator => "Bill Validator",
            Category::CardReader => "Card Reader",
            Category::Changer => "Changer",
            Category::Display => "Display",
            Category::Keypad => "Keypad",
            Category::Dongle => "Dongle",
            Category::Meter => "Meter",
            Category::Bootloader => "Bootloader",
            Category::Power => "Power",
            Category::Printer => "Printer",
            Category::Rng => "RNG",
            Category::HopperScale => "Hopper Scale",
            Category::CoinFeeder => "Coin Feeder",
            Category::BillRecycler => "Bill Recycler",
            Category::Escrow => "Escrow",
            Category::Debug => "Debug",
        };
        f.write_str(name)
    }
}
