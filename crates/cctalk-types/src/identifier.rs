//! Coin and bill identifiers, as returned by `GetCoinId` / `GetBillId`,
//! plus the country scaling applied to bill values.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Country scaling data, as returned by `GetCountryScalingFactor`.
///
/// A bill's value code is multiplied by `scaling_factor`; the product is
/// then divided by `10^decimal_places` to reach the currency unit. For
/// coin acceptors there is no such command, so the table is host-supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryScaling {
    pub scaling_factor: u16,
    pub decimal_places: u8,
}

impl CountryScaling {
    /// An all-zero reply means the country code is unsupported.
    pub fn is_valid(self) -> bool {
        self.scaling_factor != 0 || self.decimal_places != 0
    }
}

impl Default for CountryScaling {
    fn default() -> Self {
        CountryScaling { scaling_factor: 1, decimal_places: 0 }
    }
}

/// Decode a 3-character coin value code into `(value, decimal_places)`.
///
/// The table comes from the ccTalk coin coding appendix; `None` means the
/// code is not in the table.
pub fn coin_value_code(code: &str) -> Option<(u64, u8)> {
    let pair = match code {
        "5m0" => (5, 3),
        "10m" | ".01" => (1, 2),
        "20m" | ".02" => (2, 2),
        "25m" => (25, 3),
        "50m" | ".05" => (5, 2),
        ".10" => (1, 1),
        ".20" => (2, 1),
        ".25" => (25, 2),
        ".50" => (5, 1),
        "001" => (1, 0),
        "002" => (2, 0),
        "2.5" => (25, 1),
        "005" => (5, 0),
        "010" => (10, 0),
        "020" => (20, 0),
        "025" => (25, 0),
        "050" => (50, 0),
        "100" => (100, 0),
        "200" => (200, 0),
        "250" => (250, 0),
        "500" => (500, 0),
        "1K0" => (1_000, 0),
        "2K0" => (2_000, 0),
        "2K5" => (2_500, 0),
        "5K0" => (5_000, 0),
        "10K" => (10_000, 0),
        "20K" => (20_000, 0),
        "25K" => (25_000, 0),
        "50K" => (50_000, 0),
        "M10" => (100_000, 0),
        "M20" => (200_000, 0),
        "M25" => (250_000, 0),
        "M50" => (500_000, 0),
        "1M0" => (1_000_000, 0),
        "2M0" => (2_000_000, 0),
        "2M5" => (2_500_000, 0),
        "5M0" => (5_000_000, 0),
        "10M" => (10_000_000, 0),
        "20M" => (20_000_000, 0),
        "25M" => (25_000_000, 0),
        "50M" => (50_000_000, 0),
        "G10" => (100_000_000, 0),
        _ => return None,
    };
    Some(pair)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("identifier {0:?} is not 6 (coin) or 7 (bill) characters")]
    BadLength(String),
    #[error("identifier {0:?} is not ASCII")]
    NotAscii(String),
    #[error("coin value code {0:?} is not in the coin coding table")]
    UnknownCoinValueCode(String),
    #[error("bill value field {0:?} is not numeric")]
    BadBillValue(String),
}

/// A validated coin or bill denomination.
///
/// Coins use the 6-character form `CC<value-code><issue>` (e.g. `GE010A`,
/// first issue of a Georgian 10); bills use the 7-character form
/// `CC<4-digit value><issue>` (e.g. `GE0020A`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    /// The raw identifier string, e.g. `"GE0005A"`.
    pub id_string: String,
    /// Two-letter country code, e.g. `"GE"`.
    pub country: String,
    /// Issue code (`A`, `B`, ...) distinguishing issues of the same value.
    pub issue_code: char,
    /// Value code, before country scaling for bills.
    pub value_code: u64,
    /// Coin values divide by `10^coin_decimals`; always 0 for bills.
    pub coin_decimals: u8,
    /// Country scaling; the default (1, 0) until resolved.
    pub scaling: CountryScaling,
}

impl Identifier {
    /// Parse an identifier string as reported by the device.
    pub fn parse(id_string: &str) -> Result<Identifier, IdentifierError> {
        if !id_string.is_ascii() {
            return Err(IdentifierError::NotAscii(id_string.to_owned()));
        }

        match id_string.len() {
            6 => {
                let value_field = &id_string[2..5];
                let (value_code, coin_decimals) = coin_value_code(value_field)
                    .ok_or_else(|| IdentifierError::UnknownCoinValueCode(value_field.to_owned()))?;
                Ok(Identifier {
                    id_string: id_string.to_owned(),
                    country: id_string[..2].to_owned(),
                    issue_code: id_string.chars().last().unwrap_or_default(),
                    value_code,
                    coin_decimals,
                    scaling: CountryScaling::default(),
                })
            }
            7 => {
                let value_field = &id_string[2..6];
                let value_code = value_field
                    .parse::<u64>()
                    .map_err(|_| IdentifierError::BadBillValue(value_field.to_owned()))?;
                Ok(Identifier {
                    id_string: id_string.to_owned(),
                    country: id_string[..2].to_owned(),
                    issue_code: id_string.chars().last().unwrap_or_default(),
                    value_code,
                    coin_decimals: 0,
                    scaling: CountryScaling::default(),
                })
            }
            _ => Err(IdentifierError::BadLength(id_string.to_owned())),
        }
    }

    pub fn set_scaling(&mut self, scaling: CountryScaling) {
        self.scaling = scaling;
    }

    /// Value in scaled units, together with the power of ten to divide by
    /// to reach the currency unit.
    pub fn value(&self) -> (u64, u32) {
        let units = self.value_code * u64::from(self.scaling.scaling_factor);
        let divisor_pow = u32::from(self.scaling.decimal_places) + u32::from(self.coin_decimals);
        (units, divisor_pow)
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_coin_identifier() {
        let id = Identifier::parse("GE010A").unwrap();
        assert_eq!(id.country, "GE");
        assert_eq!(id.issue_code, 'A');
        assert_eq!(id.value_code, 10);
        assert_eq!(id.coin_decimals, 0);
    }

    #[test]
    fn test_coin_identifier_with_milli_code() {
        let id = Identifier::parse("US5m0B").unwrap();
        assert_eq!(id.value_code, 5);
        assert_eq!(id.coin_decimals, 3);
        assert_eq!(id.issue_code, 'B');
    }

    #[test]
    fn test_bill_identifier() {
        let mut id = Identifier::parse("GE0020A").unwrap();
        assert_eq!(id.country, "GE");
        assert_eq!(id.value_code, 20);
        assert_eq!(id.coin_decimals, 0);

        id.set_scaling(CountryScaling { scaling_factor: 1, decimal_places: 2 });
        assert_eq!(id.value(), (20, 2));
    }

    #[test]
    fn test_bill_scaling_multiplies() {
        let mut id = Identifier::parse("US0005A").unwrap();
        id.set_scaling(CountryScaling { scaling_factor: 100, decimal_places: 2 });
        // 5 * 100 cents = 500, divided by 10^2 = 5 dollars.
        assert_eq!(id.value(), (500, 2));
    }

    #[test]
    fn test_bad_identifiers() {
        assert!(matches!(Identifier::parse(""), Err(IdentifierError::BadLength(_))));
        assert!(matches!(Identifier::parse("GE10A"), Err(IdentifierError::BadLength(_))));
        assert!(matches!(
            Identifier::parse("GExyzA"),
            Err(IdentifierError::UnknownCoinValueCode(_))
        ));
        assert!(matches!(
            Identifier::parse("GE00x0A"),
            Err(IdentifierError::BadBillValue(_))
        ));
    }

    #[test]
    fn test_value_code_table() {
        assert_eq!(coin_value_code("010"), Some((10, 0)));
        assert_eq!(coin_value_code("5m0"), Some((5, 3)));
        assert_eq!(coin_value_code(".25"), Some((25, 2)));
        assert_eq!(coin_value_code("G10"), Some((100_000_000, 0)));
        assert_eq!(coin_value_code("???"), None);
    }

    #[test]
    fn test_scaling_validity() {
        assert!(!CountryScaling { scaling_factor: 0, decimal_places: 0 }.is_valid());
        assert!(CountryScaling { scaling_factor: 1, decimal_places: 0 }.is_valid());
        assert!(CountryScaling { scaling_factor: 0, decimal_places: 2 }.is_valid());
    }
}
