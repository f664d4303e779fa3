//! Meter protocol codec.
//!
//! The dongle speaks wired M-Bus carrying encrypted DLMS/COSEM push messages.
//! [`Codec`] is the seam the acquisition pipeline depends on, [`MbusDlmsCodec`]
//! is the implementation for the meter on the serial line.

mod apdu;
mod axdr;
mod mbus;

#[cfg(test)]
pub(crate) mod fixtures;

use std::fmt;
use std::ops::Range;

use crate::error::{ConfigError, DecodeError};

pub use axdr::DataValue;

/// Turns accumulated transport bytes into decoded documents.
pub trait Codec {
    /// Byte range of the first complete frame in `buffer`, if there is one.
    ///
    /// Bytes in front of `range.start` are noise the codec skipped and belong
    /// to the frame for draining purposes.
    fn find_frame(&self, buffer: &[u8]) -> Option<Range<usize>>;

    /// Number of leading bytes in `buffer` that cannot be the start of a frame
    fn noise_prefix(&self, buffer: &[u8]) -> usize;

    /// Decrypts and parses one complete frame as returned by [`Codec::find_frame`]
    fn decode(&self, frame: &[u8]) -> Result<DecodedDocument, DecodeError>;
}

/// AES-128 block cipher key handed out by the grid operator.
#[derive(Clone, PartialEq, Eq)]
pub struct MeterKey([u8; 16]);

impl MeterKey {
    pub fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Parses the 32 hex digit form printed on the operator's key letter
    pub fn from_hex(text: &str) -> Result<Self, ConfigError> {
        let bytes = hex::decode(text.trim())
            .map_err(|e| ConfigError::invalid("SMART_METER_KEY", "<redacted>", e.to_string()))?;
        let key: [u8; 16] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            ConfigError::invalid(
                "SMART_METER_KEY",
                "<redacted>",
                format!("expected 16 bytes, got {}", bytes.len()),
            )
        })?;
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Debug for MeterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MeterKey(..)")
    }
}

/// Structured content of one decrypted data-notification.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedDocument {
    pub invoke_id: u32,
    /// Raw COSEM date-time octets, if the meter sent one
    pub timestamp: Option<Vec<u8>>,
    pub body: DataValue,
}

impl DecodedDocument {
    pub fn from_body(body: DataValue) -> Self {
        Self {
            invoke_id: 0,
            timestamp: None,
            body,
        }
    }

    /// All scalar values in document order
    pub fn leaves(&self) -> Vec<&DataValue> {
        let mut leaves = Vec::new();
        self.body.collect_leaves(&mut leaves);
        leaves
    }

    /// Every uint32 field, in document order
    pub fn uint32_fields(&self) -> Vec<u32> {
        self.leaves()
            .into_iter()
            .filter_map(|value| match value {
                DataValue::UInt32(v) => Some(*v),
                _ => None,
            })
            .collect()
    }

    /// Every uint16 field, in document order
    pub fn uint16_fields(&self) -> Vec<u16> {
        self.leaves()
            .into_iter()
            .filter_map(|value| match value {
                DataValue::UInt16(v) => Some(*v),
                _ => None,
            })
            .collect()
    }
}

/// Codec for the wired M-Bus dongle pushing general-glo-ciphered DLMS notifications.
#[derive(Debug, Clone)]
pub struct MbusDlmsCodec {
    key: MeterKey,
}

impl MbusDlmsCodec {
    pub fn new(key: MeterKey) -> Self {
        Self { key }
    }
}

impl Codec for MbusDlmsCodec {
    fn find_frame(&self, buffer: &[u8]) -> Option<Range<usize>> {
        mbus::find_segment_chain(buffer)
    }

    fn noise_prefix(&self, buffer: &[u8]) -> usize {
        mbus::noise_prefix(buffer)
    }

    fn decode(&self, frame: &[u8]) -> Result<DecodedDocument, DecodeError> {
        let apdu = mbus::reassemble(frame)?;
        apdu::decode_apdu(&apdu, &self.key)
    }
}
