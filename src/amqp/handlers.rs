//! AMQP message handlers for processing result submissions
//!
//! This module provides the message handling infrastructure for the league
//! service, including submission processing, error handling, and dead letter
//! queue management.

use crate::amqp::messages::MessageUtils;
use crate::error::{LeagueError, Result};
use crate::types::ResultSubmission;
use amqprs::{
    channel::{BasicCancelArguments, BasicConsumeArguments, Channel},
    consumer::AsyncConsumer,
    BasicProperties, Deliver,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

/// Trait defining the interface for handling AMQP messages
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle a match result submitted by a player
    async fn handle_result_submission(&self, submission: ResultSubmission) -> Result<()>;

    /// Handle processing errors
    async fn handle_error(&self, error: LeagueError, message_data: &[u8]);
}

/// Consumer for handling result submission messages
pub struct SubmissionConsumer {
    handler: Arc<dyn MessageHandler>,
    channel: Channel,
    consumer_tag: String,
}

impl SubmissionConsumer {
    /// Create a new submission consumer
    pub fn new(handler: Arc<dyn MessageHandler>, channel: Channel) -> Self {
        let consumer_tag = format!("result-consumer-{}", uuid::Uuid::new_v4());

        Self {
            handler,
            channel,
            consumer_tag,
        }
    }

    /// Start consuming messages from the queue
    pub async fn start_consuming(&self, queue_name: &str) -> Result<()> {
        let args = BasicConsumeArguments::new(queue_name, &self.consumer_tag)
            .manual_ack(false)
            .finish();

        self.channel
            .basic_consume(ResultConsumer::new(self.handler.clone()), args)
            .await
            .map_err(|e| LeagueError::AmqpConnectionFailed {
                message: format!("Failed to start consuming: {}", e),
            })?;

        info!("Started consuming messages from queue: {}", queue_name);
        Ok(())
    }

    /// Stop consuming messages
    pub async fn stop_consuming(&self) -> Result<()> {
        let args = BasicCancelArguments::new(&self.consumer_tag);

        self.channel.basic_cancel(args).await.map_err(|e| {
            LeagueError::AmqpConnectionFailed {
                message: format!("Failed to stop consuming: {}", e),
            }
        })?;

        info!("Stopped consuming messages");
        Ok(())
    }
}

/// Internal consumer implementation
struct ResultConsumer {
    handler: Arc<dyn MessageHandler>,
}

impl ResultConsumer {
    fn new(handler: Arc<dyn MessageHandler>) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl AsyncConsumer for ResultConsumer {
    async fn consume(
        &mut self,
        _channel: &Channel,
        deliver: Deliver,
        _basic_properties: BasicProperties,
        _content: Vec<u8>,
    ) {
        let delivery_tag = deliver.delivery_tag();
        let routing_key = deliver.routing_key();
        let message_size = _content.len();

        info!(
            "AMQP message received - delivery_tag: {}, routing_key: '{}', size: {} bytes",
            delivery_tag, routing_key, message_size
        );

        let start_time = std::time::Instant::now();

        match self.process_message(&_content).await {
            Ok(_) => {
                let processing_time = start_time.elapsed();
                info!(
                    "Message processed successfully - delivery_tag: {}, processing_time: {:.2}ms",
                    delivery_tag,
                    processing_time.as_secs_f64() * 1000.0
                );
            }
            Err(e) => {
                let processing_time = start_time.elapsed();
                error!(
                    "Message processing failed - delivery_tag: {}, processing_time: {:.2}ms, error: {}",
                    delivery_tag, processing_time.as_secs_f64() * 1000.0, e
                );
                let error = e.downcast::<LeagueError>().unwrap_or_else(|e| {
                    LeagueError::InternalError {
                        message: e.to_string(),
                    }
                });
                self.handler.handle_error(error, &_content).await;
            }
        }
    }
}

impl ResultConsumer {
    /// Process an incoming message
    async fn process_message(&self, content: &[u8]) -> Result<()> {
        let submission = MessageUtils::deserialize_result_submission(content)?;

        info!(
            "Result submission parsed - division: {}, pair: {} vs {}, score: {}:{}, submitted_by: {}",
            submission.division_id,
            submission.player_a,
            submission.player_b,
            submission.sets_a,
            submission.sets_b,
            submission.submitted_by
        );

        self.handler.handle_result_submission(submission).await?;

        Ok(())
    }
}

/// Dead letter queue handler for failed messages
pub struct DeadLetterHandler {
    _channel: Channel,
    retry_attempts: Mutex<HashMap<String, u32>>,
    max_retries: u32,
}

impl DeadLetterHandler {
    /// Create a new dead letter queue handler
    pub fn new(channel: Channel, max_retries: u32) -> Self {
        Self {
            _channel: channel,
            retry_attempts: Mutex::new(HashMap::new()),
            max_retries,
        }
    }

    /// Handle a failed message
    pub async fn handle_failed_message(
        &self,
        message_id: String,
        _content: Vec<u8>,
        error: LeagueError,
    ) -> Result<()> {
        let mut attempts =
            self.retry_attempts
                .lock()
                .map_err(|_| LeagueError::InternalError {
                    message: "Failed to acquire retry tracking lock".to_string(),
                })?;

        let retry_count = attempts.entry(message_id.clone()).or_insert(0);
        *retry_count += 1;

        if *retry_count <= self.max_retries {
            warn!(
                "Message {} failed (attempt {}), will retry: {}",
                message_id, retry_count, error
            );

            // In a real implementation, we would republish to retry queue
            // For now, just log the retry attempt
            return Ok(());
        }

        error!(
            "Message {} exceeded max retries ({}), moving to dead letter queue: {}",
            message_id, self.max_retries, error
        );

        // Remove from retry tracking
        attempts.remove(&message_id);

        // In a real implementation, we would publish to dead letter exchange
        // For now, just log the permanent failure

        Ok(())
    }
}

/// Mock message handler for testing
pub struct MockMessageHandler {
    pub received_submissions: Arc<tokio::sync::Mutex<Vec<ResultSubmission>>>,
    pub received_errors: Arc<tokio::sync::Mutex<Vec<LeagueError>>>,
}

impl Default for MockMessageHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMessageHandler {
    pub fn new() -> Self {
        Self {
            received_submissions: Arc::new(tokio::sync::Mutex::new(Vec::new())),
            received_errors: Arc::new(tokio::sync::Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl MessageHandler for MockMessageHandler {
    async fn handle_result_submission(&self, submission: ResultSubmission) -> Result<()> {
        let mut submissions = self.received_submissions.lock().await;
        submissions.push(submission);
        Ok(())
    }

    async fn handle_error(&self, error: LeagueError, _message_data: &[u8]) {
        let mut errors = self.received_errors.lock().await;
        errors.push(error);
    }
}
