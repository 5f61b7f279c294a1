//! ccTalk wire framing.
//!
//! Requests and replies share one layout:
//!
//! ```text
//! [destination] [payload len] [source] [header] [payload ...] [checksum]
//! ```
//!
//! The checksum byte is chosen so the unsigned 8-bit sum of the whole
//! frame is zero. A valid reply carries header 0 and destination 1 (the
//! master); an ACK is a reply with an empty payload.

use thiserror::Error;

/// The bus master's address. There is no reason to change this.
pub const MASTER_ADDRESS: u8 = 1;

/// Smallest possible frame: header-only, no payload.
pub const MIN_FRAME_LEN: usize = 5;

/// Largest payload a single frame can carry.
pub const MAX_PAYLOAD_LEN: usize = 255;

/// Everything that can be structurally wrong with a received frame.
///
/// Validation is fail-fast in the order of these variants: size, declared
/// length, checksum, destination, source, header.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame too small ({len} bytes)")]
    TooShort { len: usize },
    #[error("frame size {actual} does not match declared payload length {declared}")]
    LengthMismatch { declared: u8, actual: usize },
    #[error("frame checksum mismatch")]
    Checksum,
    #[error("frame destination address {destination} is not the master")]
    BadDestination { destination: u8 },
    #[error("frame source address {actual}, expected {expected}")]
    BadSource { actual: u8, expected: u8 },
    #[error("reply header is {header}, expected 0")]
    UnexpectedHeader { header: u8 },
}

/// A ccTalk frame, either direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub destination: u8,
    pub source: u8,
    pub header: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Build a request frame from the master to `destination`.
    ///
    /// The payload must fit the 1-byte length field; the command layer
    /// never builds anything close to the limit.
    pub fn request(destination: u8, header: u8, payload: Vec<u8>) -> Frame {
        debug_assert!(payload.len() <= MAX_PAYLOAD_LEN);
        Frame { destination, source: MASTER_ADDRESS, header, payload }
    }

    /// Serialize with the checksum appended.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(MIN_FRAME_LEN + self.payload.len());
        bytes.push(self.destination);
        bytes.push(self.payload.len() as u8);
        bytes.push(self.source);
        bytes.push(self.header);
        bytes.extend_from_slice(&self.payload);
        bytes.push(checksum(&bytes));
        bytes
    }

    /// Parse a received buffer, checking size, declared length, and
    /// checksum. Address and header checks live in [`Frame::validate_reply`]
    /// because they depend on the configured device address.
    pub fn decode(bytes: &[u8]) -> Result<Frame, FrameError> {
        if bytes.len() < MIN_FRAME_LEN {
            return Err(FrameError::TooShort { len: bytes.len() });
        }
        let declared = bytes[1];
        if bytes.len() != MIN_FRAME_LEN + usize::from(declared) {
            return Err(FrameError::LengthMismatch { declared, actual: bytes.len() });
        }
        if byte_sum(bytes) != 0 {
            return Err(FrameError::Checksum);
        }
        Ok(Frame {
            destination: bytes[0],
            source: bytes[2],
            header: bytes[3],
            payload: bytes[4..bytes.len() - 1].to_vec(),
        })
    }

    /// Check that a decoded frame is a reply addressed to the master from
    /// the expected device. The source check is skipped when the configured
    /// device address is 0 (single-device broadcast setups).
    pub fn validate_reply(&self, device_address: u8) -> Result<(), FrameError> {
        if self.destination != MASTER_ADDRESS {
            return Err(FrameError::BadDestination { destination: self.destination });
        }
        if device_address != 0 && self.source != device_address {
            return Err(FrameError::BadSource { actual: self.source, expected: device_address });
        }
        if self.header != 0 {
            return Err(FrameError::UnexpectedHeader { header: self.header });
        }
        Ok(())
    }
}

/// The checksum byte that makes the 8-bit sum of `bytes` plus itself zero.
pub fn checksum(bytes: &[u8]) -> u8 {
    byte_sum(bytes).wrapping_neg()
}

fn byte_sum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, b| sum.wrapping_add(*b))
}
