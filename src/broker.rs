use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet, QoS,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::lookup_host;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::error::{BrokerAddressError, BrokerError};

pub const DEFAULT_BROKER_HOST: &str = "localhost";
pub const DEFAULT_BROKER_PORT: u16 = 1883;
pub const DEFAULT_CLIENT_ID: &str = "SmartMeter";
pub const DEFAULT_TOPIC_PREFIX: &str = "Smartmeter";
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(10);

/// Message sink the readings are published to.
#[async_trait]
pub trait Broker: Send {
    /// (Re)establishes the session, dropping any previous one
    async fn connect(&mut self) -> Result<(), BrokerError>;

    async fn publish(&mut self, topic: &str, payload: &str) -> Result<(), BrokerError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub credentials: Option<(String, String)>,
    pub topic_prefix: String,
    pub keep_alive: Duration,
    /// Upper bound for every network wait
    pub io_timeout: Duration,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_BROKER_HOST.to_string(),
            port: DEFAULT_BROKER_PORT,
            client_id: DEFAULT_CLIENT_ID.to_string(),
            credentials: None,
            topic_prefix: DEFAULT_TOPIC_PREFIX.to_string(),
            keep_alive: Duration::from_secs(60),
            io_timeout: DEFAULT_IO_TIMEOUT,
        }
    }
}

impl MqttSettings {
    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.host, self.port);
        options.set_keep_alive(self.keep_alive);
        if let Some((user, password)) = &self.credentials {
            options.set_credentials(user, password);
        }
        options
    }
}

/// Checks at startup that the broker host resolves.
pub async fn resolve_broker_address(
    host: &str,
    port: u16,
) -> Result<SocketAddr, BrokerAddressError> {
    let address = format!("{host}:{port}");
    let unresolvable = |reason: String| BrokerAddressError::Unresolvable {
        address: address.clone(),
        reason,
    };
    if host.trim().is_empty() {
        return Err(unresolvable("empty host name".to_string()));
    }
    let mut addresses = lookup_host((host, port))
        .await
        .map_err(|e| unresolvable(e.to_string()))?;
    addresses
        .next()
        .ok_or_else(|| unresolvable("no addresses found".to_string()))
}

/// MQTT broker session on top of rumqttc.
///
/// The event loop is only driven while connecting or publishing.
pub struct MqttBroker {
    settings: MqttSettings,
    session: Option<(AsyncClient, EventLoop)>,
}

impl MqttBroker {
    pub fn new(settings: MqttSettings) -> Self {
        Self {
            settings,
            session: None,
        }
    }

    /// Polls `event_loop` until `done` accepts an event
    async fn poll_until(
        event_loop: &mut EventLoop,
        io_timeout: Duration,
        mut done: impl FnMut(&Event) -> bool,
    ) -> Result<(), BrokerError> {
        loop {
            let event = timeout(io_timeout, event_loop.poll())
                .await
                .map_err(|_| BrokerError::Timeout(io_timeout))?
                .map_err(map_connection_error)?;
            if done(&event) {
                return Ok(());
            }
            debug!(?event, "MQTT event");
        }
    }
}

fn map_connection_error(error: ConnectionError) -> BrokerError {
    match error {
        ConnectionError::ConnectionRefused(code) => BrokerError::Refused(format!("{code:?}")),
        other => BrokerError::Connection(other.to_string()),
    }
}

#[async_trait]
impl Broker for MqttBroker {
    async fn connect(&mut self) -> Result<(), BrokerError> {
        self.session = None;
        let (client, mut event_loop) = AsyncClient::new(self.settings.options(), 16);

        let mut refused = None;
        Self::poll_until(&mut event_loop, self.settings.io_timeout, |event| {
            match event {
                Event::Incoming(Packet::ConnAck(ack)) => {
                    if ack.code != ConnectReturnCode::Success {
                        refused = Some(ack.code);
                    }
                    true
                }
                _ => false,
            }
        })
        .await?;
        if let Some(code) = refused {
            return Err(BrokerError::Refused(format!("{code:?}")));
        }

        info!(
            host = %self.settings.host,
            port = self.settings.port,
            "Connected to MQTT broker"
        );
        self.session = Some((client, event_loop));
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: &str) -> Result<(), BrokerError> {
        let (client, event_loop) = self
            .session
            .as_mut()
            .ok_or_else(|| BrokerError::Connection("not connected".to_string()))?;

        client
            .publish(topic, QoS::AtMostOnce, false, payload.as_bytes().to_vec())
            .await
            .map_err(|e| BrokerError::Client(e.to_string()))?;

        let result = Self::poll_until(event_loop, self.settings.io_timeout, |event| {
            matches!(event, Event::Outgoing(Outgoing::Publish(_)))
        })
        .await;
        if result.is_err() {
            self.session = None;
        }
        result
    }
}
