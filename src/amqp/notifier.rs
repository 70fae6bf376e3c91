//! AMQP notification publisher for outbound player and admin messages

use crate::amqp::messages::{MessageEnvelope, MessageUtils, NOTIFICATIONS_EXCHANGE, NOTIFICATION_ROUTING_KEY};
use crate::error::{LeagueError, Result};
use crate::types::Notification;
use amqprs::{
    channel::{BasicPublishArguments, Channel, ExchangeDeclareArguments},
    BasicProperties,
};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Trait for delivering notifications to players and admins
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a single notification
    async fn notify(&self, notification: Notification) -> Result<()>;
}

/// Configuration for notification publishing
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub enable_deduplication: bool,
    pub publish_timeout_ms: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 500,
            enable_deduplication: true,
            publish_timeout_ms: 5000,
        }
    }
}

/// AMQP-based notifier implementation
pub struct AmqpNotifier {
    channel: Channel,
    config: NotifierConfig,
    published_messages: std::sync::Mutex<std::collections::HashSet<String>>, // For deduplication
}

impl AmqpNotifier {
    /// Create a new notifier
    pub async fn new(channel: Channel, config: NotifierConfig) -> Result<Self> {
        let notifier = Self {
            channel,
            config,
            published_messages: std::sync::Mutex::new(std::collections::HashSet::new()),
        };

        notifier.setup_exchange().await?;

        Ok(notifier)
    }

    /// Set up the AMQP exchange for notifications
    async fn setup_exchange(&self) -> Result<()> {
        let args = ExchangeDeclareArguments::new(NOTIFICATIONS_EXCHANGE, "topic");
        self.channel.exchange_declare(args).await.map_err(|e| {
            LeagueError::AmqpConnectionFailed {
                message: format!("Failed to declare notifications exchange: {}", e),
            }
        })?;

        info!("Successfully set up notifications exchange");
        Ok(())
    }

    /// Publish an envelope with retry logic
    async fn publish_with_retry(&self, envelope: &MessageEnvelope<Notification>) -> Result<()> {
        // Check for deduplication
        if self.config.enable_deduplication {
            let published_messages =
                self.published_messages
                    .lock()
                    .map_err(|_| LeagueError::InternalError {
                        message: "Failed to acquire published messages lock".to_string(),
                    })?;
            if published_messages.contains(&envelope.correlation_id) {
                debug!(
                    "Notification {} already published, skipping",
                    envelope.correlation_id
                );
                return Ok(());
            }
        }

        let mut retry_count = 0;
        let mut delay = Duration::from_millis(self.config.retry_delay_ms);

        loop {
            match self.try_publish(envelope).await {
                Ok(_) => {
                    if self.config.enable_deduplication {
                        let mut published_messages =
                            self.published_messages.lock().map_err(|_| {
                                LeagueError::InternalError {
                                    message: "Failed to acquire published messages lock"
                                        .to_string(),
                                }
                            })?;
                        published_messages.insert(envelope.correlation_id.clone());
                    }

                    debug!(
                        "Successfully published notification {} for {}",
                        envelope.correlation_id, envelope.payload.recipient
                    );
                    return Ok(());
                }
                Err(e) => {
                    retry_count += 1;
                    if retry_count > self.config.max_retries {
                        error!(
                            "Failed to publish notification {} after {} retries: {}",
                            envelope.correlation_id, self.config.max_retries, e
                        );
                        return Err(e);
                    }

                    warn!(
                        "Publish attempt {} failed for notification {}: {}. Retrying in {:?}",
                        retry_count, envelope.correlation_id, e, delay
                    );

                    sleep(delay).await;
                    delay = Duration::from_millis((delay.as_millis() as u64 * 2).min(5000));
                }
            }
        }
    }

    /// Single publish attempt
    async fn try_publish(&self, envelope: &MessageEnvelope<Notification>) -> Result<()> {
        let payload = envelope.to_bytes()?;

        let args = BasicPublishArguments::new(NOTIFICATIONS_EXCHANGE, &envelope.routing_key);
        let mut properties = BasicProperties::default();
        properties
            .with_message_id(&envelope.correlation_id)
            .with_timestamp(envelope.timestamp.timestamp() as u64)
            .with_content_type("application/json");

        let timeout = Duration::from_millis(self.config.publish_timeout_ms);

        tokio::time::timeout(
            timeout,
            self.channel.basic_publish(properties, payload, args),
        )
        .await
        .map_err(|_| LeagueError::AmqpConnectionFailed {
            message: format!("Publish timed out after {:?}", timeout),
        })?
        .map_err(|e| LeagueError::AmqpConnectionFailed {
            message: format!("Failed to publish notification: {}", e),
        })?;

        Ok(())
    }

    /// Clear deduplication cache (useful for testing or memory management)
    pub fn clear_deduplication_cache(&self) {
        if let Ok(mut published_messages) = self.published_messages.lock() {
            published_messages.clear();
        }
    }

    /// Get number of cached message IDs (for monitoring)
    pub fn cached_message_count(&self) -> usize {
        self.published_messages
            .lock()
            .map(|cache| cache.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl Notifier for AmqpNotifier {
    async fn notify(&self, notification: Notification) -> Result<()> {
        MessageUtils::validate_notification(&notification)?;

        let envelope = MessageEnvelope::new(notification, NOTIFICATION_ROUTING_KEY.to_string());
        self.publish_with_retry(&envelope).await
    }
}

/// Mock notifier for testing
#[derive(Debug, Default)]
pub struct MockNotifier {
    sent: std::sync::Mutex<Vec<Notification>>,
    failing: std::sync::atomic::AtomicBool,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent notify calls fail (for testing)
    pub fn set_failing(&self, failing: bool) {
        self.failing
            .store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    /// Get all delivered notifications (for testing)
    pub fn notifications(&self) -> Vec<Notification> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }

    /// Clear delivered notifications (for testing)
    pub fn clear(&self) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.clear();
        }
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify(&self, notification: Notification) -> Result<()> {
        if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(LeagueError::AmqpConnectionFailed {
                message: "Mock notifier configured to fail".to_string(),
            }
            .into());
        }

        if let Ok(mut sent) = self.sent.lock() {
            sent.push(notification);
        }
        Ok(())
    }
}
