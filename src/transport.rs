use async_trait::async_trait;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::time::timeout;
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::{error, info};

use crate::error::TransportError;
use crate::retry::RetryPolicy;

pub const DEFAULT_BAUD_RATE: u32 = 2400;
/// Bytes the meter dongle pushes per telegram burst
pub const DEFAULT_CHUNK_SIZE: usize = 282;
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Source of raw meter bytes.
#[async_trait]
pub trait Transport: Send {
    /// Blocks until the next chunk is available
    async fn read_chunk(&mut self) -> Result<Vec<u8>, TransportError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    pub path: String,
    pub baud_rate: u32,
    pub chunk_size: usize,
    /// `None` waits forever
    pub read_timeout: Option<Duration>,
}

impl SerialSettings {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            read_timeout: Some(DEFAULT_READ_TIMEOUT),
        }
    }
}

/// Serial port reader for the meter dongle (8N1).
///
/// The port is opened lazily and reopened after any read error.
pub struct SerialTransport {
    settings: SerialSettings,
    policy: RetryPolicy,
    port: Option<SerialStream>,
}

impl SerialTransport {
    pub fn new(settings: SerialSettings, policy: RetryPolicy) -> Self {
        Self {
            settings,
            policy,
            port: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    /// Opens the port, retrying with the configured policy
    pub async fn open(&mut self) -> Result<(), TransportError> {
        if self.port.is_some() {
            return Ok(());
        }

        let mut failed_attempts = 0u32;
        loop {
            match self.open_once() {
                Ok(port) => {
                    info!(
                        path = %self.settings.path,
                        baud_rate = self.settings.baud_rate,
                        "Serial device opened"
                    );
                    self.port = Some(port);
                    return Ok(());
                }
                Err(e) => {
                    failed_attempts += 1;
                    error!(attempt = failed_attempts, "{e}");
                    if !self.policy.should_retry(failed_attempts) {
                        return Err(TransportError::OpenRetriesExhausted {
                            path: self.settings.path.clone(),
                            attempts: failed_attempts,
                        });
                    }
                    self.policy.wait().await;
                }
            }
        }
    }

    fn open_once(&self) -> Result<SerialStream, TransportError> {
        tokio_serial::new(&self.settings.path, self.settings.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .open_native_async()
            .map_err(|source| TransportError::Open {
                path: self.settings.path.clone(),
                source,
            })
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn read_chunk(&mut self) -> Result<Vec<u8>, TransportError> {
        self.open().await?;
        let port = self.port.as_mut().ok_or(TransportError::Closed)?;

        let mut chunk = vec![0u8; self.settings.chunk_size];
        let result = match self.settings.read_timeout {
            Some(limit) => match timeout(limit, port.read_exact(&mut chunk)).await {
                Ok(read) => read.map_err(TransportError::from),
                Err(_) => Err(TransportError::Timeout(limit)),
            },
            None => port.read_exact(&mut chunk).await.map_err(TransportError::from),
        };

        match result {
            Ok(_) => Ok(chunk),
            Err(e) => {
                // Force a reopen on the next read
                self.port = None;
                Err(e)
            }
        }
    }
}
