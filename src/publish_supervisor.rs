use tracing::{debug, error, info};

use crate::broker::Broker;
use crate::error::PublishError;
use crate::reading::Reading;
use crate::retry::RetryPolicy;

/// Keeps the broker session alive and publishes each reading field by field.
///
/// While the broker is unreachable `publish` blocks in the reconnect loop, so no
/// meter data is read in the meantime.
pub struct PublishSupervisor<B> {
    broker: B,
    topic_prefix: String,
    policy: RetryPolicy,
    connected: bool,
}

impl<B: Broker> PublishSupervisor<B> {
    pub fn new(broker: B, topic_prefix: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            broker,
            topic_prefix: topic_prefix.into(),
            policy,
            connected: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    pub fn topic(&self, field: impl std::fmt::Display) -> String {
        format!("{}/{}", self.topic_prefix, field)
    }

    /// Publishes every field of `reading`, returning the number of messages sent.
    ///
    /// A failure part way through leaves the already sent fields delivered and
    /// marks the session disconnected for the next call.
    pub async fn publish(&mut self, reading: &Reading) -> Result<usize, PublishError> {
        self.ensure_connected().await?;

        let mut delivered = 0;
        for (field, payload) in reading.messages() {
            let topic = self.topic(field);
            if let Err(source) = self.broker.publish(&topic, &payload).await {
                self.connected = false;
                return Err(PublishError::Interrupted {
                    field,
                    delivered,
                    source,
                });
            }
            debug!(%topic, %payload, "Published");
            delivered += 1;
        }
        Ok(delivered)
    }

    async fn ensure_connected(&mut self) -> Result<(), PublishError> {
        if self.connected {
            return Ok(());
        }

        let mut failed_attempts = 0u32;
        loop {
            match self.broker.connect().await {
                Ok(()) => {
                    if failed_attempts > 0 {
                        info!(failed_attempts, "Reconnected to broker");
                    }
                    self.connected = true;
                    return Ok(());
                }
                Err(e) => {
                    failed_attempts += 1;
                    error!(attempt = failed_attempts, "Broker connection failed: {e}");
                    if !self.policy.should_retry(failed_attempts) {
                        return Err(PublishError::RetriesExhausted {
                            attempts: failed_attempts,
                            source: e,
                        });
                    }
                    self.policy.wait().await;
                }
            }
        }
    }
}
