//! Host-supplied configuration for one device.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::category::Category;
use crate::identifier::CountryScaling;

/// Verbosity switches for the log stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingFlags {
    /// Log the raw receive buffer before echo stripping.
    pub full_response: bool,
    /// Log outgoing serial bytes.
    pub serial_request: bool,
    /// Log incoming serial bytes after echo stripping.
    pub serial_response: bool,
    /// Log ccTalk commands by name.
    pub cctalk_request: bool,
    /// Log decoded ccTalk reply payloads.
    pub cctalk_response: bool,
}

impl Default for LoggingFlags {
    fn default() -> Self {
        LoggingFlags {
            full_response: false,
            serial_request: false,
            serial_response: false,
            cctalk_request: true,
            cctalk_response: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("16-bit CRC checksums are not supported")]
    ChecksumModeUnsupported,
    #[error("DES-encrypted frames are not supported")]
    EncryptionUnsupported,
    #[error("device \"{0}\" shares a bus but has address 0")]
    ZeroAddressOnSharedBus(String),
    #[error("devices on \"{0}\" share address {1}")]
    DuplicateAddress(String, u8),
    #[error("devices on \"{0}\" have differing link options")]
    MismatchedLinkOptions(String),
}

/// Configuration for a single device on a serial bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// OS path of the serial port, e.g. `/dev/ttyUSB0`.
    pub serial_device: String,
    /// ccTalk destination address. 0 broadcasts, which is only acceptable
    /// for a device alone on its bus.
    pub address: u8,
    /// Only `false` is accepted; present so a misconfigured device refuses
    /// to start instead of talking garbage.
    pub checksum_16bit: bool,
    /// Only `false` is accepted.
    pub des_encrypted: bool,
    /// Override for the normal polling interval. When absent, the
    /// device-recommended interval is used (clamped to 1..=1000 ms,
    /// falling back to 100 ms when the device reports nonsense).
    pub normal_poll_interval_ms: Option<u64>,
    /// Settling time after a soft reset is ACKed, before the device is
    /// probed again. Device-specific; see the device manual.
    pub post_reset_delay_ms: u64,
    /// Country scaling for coin acceptors, which have no
    /// `GetCountryScalingFactor` command. Seeded with `GE`; extend per
    /// deployment.
    pub coin_scaling: HashMap<String, CountryScaling>,
    pub logging: LoggingFlags,
}

impl DeviceConfig {
    /// A configuration with the standard address for `category` and the
    /// default coin scaling seed.
    pub fn for_category(serial_device: impl Into<String>, category: Category) -> DeviceConfig {
        let mut coin_scaling = HashMap::new();
        coin_scaling.insert(
            "GE".to_owned(),
            CountryScaling { scaling_factor: 1, decimal_places: 2 },
        );
        DeviceConfig {
            serial_device: serial_device.into(),
            address: category.default_address(),
            checksum_16bit: false,
            des_encrypted: false,
            normal_poll_interval_ms: None,
            post_reset_delay_ms: 1000,
            coin_scaling,
            logging: LoggingFlags::default(),
        }
    }

    /// Reject options the link layer cannot honor. Called before any port
    /// is touched.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.checksum_16bit {
            return Err(ConfigError::ChecksumModeUnsupported);
        }
        if self.des_encrypted {
            return Err(ConfigError::EncryptionUnsupported);
        }
        Ok(())
    }
}

/// Validate a set of devices that may share serial buses: devices on the
/// same port need distinct non-zero addresses and identical link options.
pub fn validate_shared_bus(configs: &[DeviceConfig]) -> Result<(), ConfigError> {
    for (i, a) in configs.iter().enumerate() {
        a.validate()?;
        for b in configs.iter().skip(i + 1) {
            if a.serial_device != b.serial_device {
                continue;
            }
            if a.address == 0 || b.address == 0 {
                return Err(ConfigError::ZeroAddressOnSharedBus(a.serial_device.clone()));
            }
            if a.address == b.address {
                return Err(ConfigError::DuplicateAddress(a.serial_device.clone(), a.address));
            }
            if a.checksum_16bit != b.checksum_16bit || a.des_encrypted != b.des_encrypted {
                return Err(ConfigError::MismatchedLinkOptions(a.serial_device.clone()));
            }
        }
    }
    Ok(())
}
