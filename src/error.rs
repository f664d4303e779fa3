//! Error types for the acquisition pipeline.
//!
//! Fatal at startup: [`ConfigError`], [`LogPathError`], [`BrokerAddressError`].
//! Everything else is logged and the pipeline keeps running.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::reading::ReadingField;
use crate::reading_extractor::FieldList;

/// Invalid or missing process configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("required setting {0} is not set")]
    Missing(&'static str),

    #[error("{name} has an invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(name: &'static str, value: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            name,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// The configured log directory cannot be used.
#[derive(Error, Debug)]
pub enum LogPathError {
    #[error("The specified path '{}' does not exist", .0.display())]
    NotFound(PathBuf),

    #[error("The specified path '{}' is not accessible: {reason}", .path.display())]
    NotAccessible { path: PathBuf, reason: &'static str },

    #[error("Failed to create log file in '{}': {message}", .path.display())]
    Sink { path: PathBuf, message: String },
}

/// Serial transport failures.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to open serial device {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: tokio_serial::Error,
    },

    #[error("Gave up opening serial device {path} after {attempts} attempts")]
    OpenRetriesExhausted { path: String, attempts: u32 },

    #[error("Serial read failed: {0}")]
    Read(#[from] std::io::Error),

    #[error("No data from serial device within {0:?}")]
    Timeout(Duration),

    #[error("Transport closed")]
    Closed,
}

/// A frame was recognised but could not be turned into a document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Frame truncated at offset {offset}: needed {needed} more bytes")]
    Truncated { offset: usize, needed: usize },

    #[error("Broken M-Bus segment chain: {0}")]
    SegmentChain(String),

    #[error("Unsupported APDU tag 0x{0:02X}")]
    UnsupportedApdu(u8),

    #[error("Unsupported data tag 0x{tag:02X} at offset {offset}")]
    UnsupportedDataTag { tag: u8, offset: usize },

    #[error("Invalid length encoding 0x{0:02X}")]
    InvalidLength(u8),

    #[error("Data nested deeper than {0} levels")]
    NestingTooDeep(usize),

    #[error("Invalid ciphered content: {0}")]
    Cipher(String),

    #[error("Malformed APDU: {0}")]
    Malformed(String),
}

/// The decoded document lacks a field the mapping table points at.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("{field} expects {list} field #{position} but the document only has {available}")]
    MissingField {
        field: ReadingField,
        list: FieldList,
        position: usize,
        available: usize,
    },
}

/// Failures talking to the message broker.
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Connection to broker failed: {0}")]
    Connection(String),

    #[error("Broker refused the connection: {0}")]
    Refused(String),

    #[error("Broker client rejected request: {0}")]
    Client(String),

    #[error("Broker did not respond within {0:?}")]
    Timeout(Duration),
}

/// The broker address given at startup is unusable.
#[derive(Error, Debug)]
pub enum BrokerAddressError {
    #[error("Broker address '{address}' is invalid: {reason}")]
    Unresolvable { address: String, reason: String },
}

/// Outcome of a failed publish cycle.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Lost connection while publishing {field} ({delivered} fields already sent)")]
    Interrupted {
        field: ReadingField,
        delivered: usize,
        #[source]
        source: BrokerError,
    },

    #[error("Gave up reconnecting to broker after {attempts} attempts")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: BrokerError,
    },
}
