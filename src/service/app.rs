//! Main application state and service coordination
//!
//! This module contains the production AppState that coordinates the league
//! components, AMQP connections, and background tasks.

use crate::amqp::connection::{AmqpConfig, AmqpConnection};
use crate::amqp::handlers::{DeadLetterHandler, MessageHandler, SubmissionConsumer};
use crate::amqp::messages::SUBMISSIONS_QUEUE;
use crate::amqp::notifier::{AmqpNotifier, Notifier, NotifierConfig};
use crate::config::AppConfig;
use crate::error::{LeagueError, Result as LeagueResult};
use crate::league::lifecycle::{SeasonLifecycle, TickOutcome};
use crate::league::registry::LeagueRegistry;
use crate::league::results::MatchResultProcessor;
use crate::metrics::health::HealthServerConfig;
use crate::metrics::{HealthServer, MetricsCollector, MetricsService};
use crate::store::{InMemoryLeagueStore, LeagueStore};
use crate::types::{MatchOutcome, Notification, ResultSubmission};
use crate::utils::current_timestamp;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("AMQP connection error: {message}")]
    AmqpConnection { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// Production message handler that feeds submissions into the result pipeline
struct ProductionMessageHandler {
    processor: Arc<MatchResultProcessor>,
    store: Arc<dyn LeagueStore>,
    notifier: Arc<dyn Notifier>,
    dead_letters: DeadLetterHandler,
}

impl ProductionMessageHandler {
    fn new(
        processor: Arc<MatchResultProcessor>,
        store: Arc<dyn LeagueStore>,
        notifier: Arc<dyn Notifier>,
        dead_letters: DeadLetterHandler,
    ) -> Self {
        Self {
            processor,
            store,
            notifier,
            dead_letters,
        }
    }

    /// Best-effort heads-up to the player who did not submit the result.
    async fn notify_opponent(&self, submission: &ResultSubmission, outcome: &MatchOutcome) {
        let opponent_id = if submission.submitted_by == submission.player_a {
            submission.player_b
        } else {
            submission.player_a
        };

        let opponent = match self.store.get_player(&opponent_id) {
            Ok(Some(player)) => player,
            Ok(None) => {
                warn!("Opponent {} not found for result notification", opponent_id);
                return;
            }
            Err(e) => {
                warn!("Opponent lookup failed for result notification: {}", e);
                return;
            }
        };

        let delta = outcome
            .deltas
            .get(&opponent_id)
            .copied()
            .unwrap_or_default();
        let delta_text = if delta.is_sign_negative() {
            delta.to_string()
        } else {
            format!("+{}", delta)
        };

        let notification = Notification {
            recipient: opponent.contact_handle.clone(),
            text: format!(
                "A result was recorded for your match: {}:{}. Your rating changed by {}.",
                submission.sets_a, submission.sets_b, delta_text
            ),
            action_link: None,
            timestamp: current_timestamp(),
        };

        if let Err(e) = self.notifier.notify(notification).await {
            warn!(
                "Failed to notify '{}' about a recorded result: {}",
                opponent.display_name, e
            );
        }
    }
}

#[async_trait]
impl MessageHandler for ProductionMessageHandler {
    async fn handle_result_submission(&self, submission: ResultSubmission) -> LeagueResult<()> {
        let start_time = std::time::Instant::now();

        info!(
            "Processing result submission - division: {}, pair: {} vs {}, submitted_by: {}",
            submission.division_id,
            submission.player_a,
            submission.player_b,
            submission.submitted_by
        );

        match self.processor.submit(submission.clone()) {
            Ok(outcome) => {
                let processing_time = start_time.elapsed();
                info!(
                    "Result submission accepted - match: {}, winner: {}, time: {:.2}ms",
                    outcome.match_record.id,
                    outcome.winner,
                    processing_time.as_secs_f64() * 1000.0
                );

                self.notify_opponent(&submission, &outcome).await;
                Ok(())
            }
            Err(e) => {
                let processing_time = start_time.elapsed();
                error!(
                    "Result submission failed - division: {}, pair: {} vs {}, time: {:.2}ms, error: {}",
                    submission.division_id, submission.player_a, submission.player_b,
                    processing_time.as_secs_f64() * 1000.0, e
                );
                Err(e)
            }
        }
    }

    async fn handle_error(&self, error: LeagueError, message_data: &[u8]) {
        error!(
            "Submission handler error - kind: '{}', message_size: {} bytes",
            error.kind(),
            message_data.len()
        );

        // Log first 100 bytes of message for debugging (safely)
        if !message_data.is_empty() {
            let preview_len = std::cmp::min(100, message_data.len());
            let preview = String::from_utf8_lossy(&message_data[..preview_len]);
            error!("Message preview: {:?}", preview);
        }

        let message_id = serde_json::from_slice::<serde_json::Value>(message_data)
            .ok()
            .and_then(|value| {
                value
                    .get("correlation_id")
                    .and_then(|id| id.as_str())
                    .map(String::from)
            })
            .unwrap_or_else(|| "unparseable".to_string());

        if let Err(e) = self
            .dead_letters
            .handle_failed_message(message_id, message_data.to_vec(), error)
            .await
        {
            warn!("Dead letter tracking failed: {}", e);
        }
    }
}

/// Main application state containing all service components
pub struct AppState {
    /// Application configuration
    config: AppConfig,

    /// League persistence shared by every component
    store: Arc<dyn LeagueStore>,

    /// Match submission pipeline
    processor: Arc<MatchResultProcessor>,

    /// Administrative operations on players, seasons and divisions
    registry: Arc<LeagueRegistry>,

    /// Season close and rollover orchestration
    lifecycle: Arc<SeasonLifecycle>,

    /// Outbound notification channel
    notifier: Arc<dyn Notifier>,

    /// AMQP connection for message handling
    amqp_connection: Arc<AmqpConnection>,

    /// Metrics service for monitoring and health checks
    metrics_service: Arc<MetricsService>,

    /// Background task handles
    background_tasks: Mutex<Vec<JoinHandle<()>>>,

    /// AMQP consumer for result submissions
    submission_consumer: Mutex<Option<SubmissionConsumer>>,

    /// Service status
    is_running: Arc<RwLock<bool>>,
}

impl AppState {
    /// Initialize the application with all dependencies
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!("Initializing club-ladder league service");
        info!(
            "Configuration: service={}, amqp_url={}",
            config.service.name, config.amqp.url
        );

        // Initialize AMQP connection
        let amqp_connection = Self::initialize_amqp(&config).await?;

        // Initialize metrics service
        let metrics_service = Self::initialize_metrics(&config).await?;

        // All league state lives behind the store trait
        let store: Arc<dyn LeagueStore> = Arc::new(InMemoryLeagueStore::new());

        // Notifier shared by the lifecycle and the submission handler
        let notifier = Self::initialize_notifier(&config, &amqp_connection).await?;

        let collector = metrics_service.collector();
        let processor = Arc::new(MatchResultProcessor::with_metrics(
            store.clone(),
            collector.clone(),
        ));
        let lifecycle = Arc::new(SeasonLifecycle::with_metrics(
            store.clone(),
            notifier.clone(),
            collector,
        ));
        let registry = Arc::new(LeagueRegistry::new(store.clone()));

        Ok(Self {
            config,
            store,
            processor,
            registry,
            lifecycle,
            notifier,
            amqp_connection,
            metrics_service,
            background_tasks: Mutex::new(Vec::new()),
            submission_consumer: Mutex::new(None),
            is_running: Arc::new(RwLock::new(false)),
        })
    }

    /// Start all background services and message consumption
    pub async fn start(&self) -> Result<(), ServiceError> {
        info!("Starting club-ladder league service");

        // Mark as running
        *self.is_running.write().await = true;

        // Start metrics service first
        self.start_metrics_service().await?;

        // Start AMQP message consumption
        self.start_amqp_consumption().await?;

        // Start background tasks
        self.start_background_tasks().await?;

        info!("✅ Club ladder league service started successfully");
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of club-ladder service");

        // Mark as not running
        *self.is_running.write().await = false;

        // Stop AMQP message consumption
        if let Some(consumer) = self.submission_consumer.lock().await.take() {
            if let Err(e) = consumer.stop_consuming().await {
                warn!("Failed to stop AMQP consumer: {}", e);
            } else {
                info!("✅ AMQP message consumption stopped");
            }
        }

        // Stop background tasks (including metrics service task)
        self.stop_background_tasks().await;

        // Stop metrics service
        info!("Stopping metrics service...");
        if let Err(e) = self.metrics_service.stop().await {
            warn!("Failed to stop metrics service: {}", e);
        } else {
            info!("✅ Metrics service stopped");
        }

        // Get final statistics
        let final_stats = self
            .store
            .stats()
            .map_err(|e| ServiceError::BackgroundTask {
                message: format!("Failed to get final stats: {}", e),
            })?;

        info!("Final service statistics: {:?}", final_stats);
        info!("✅ Club ladder service shutdown completed");

        Ok(())
    }

    /// Get service configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Check if service is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// Get the league store
    pub fn store(&self) -> Arc<dyn LeagueStore> {
        self.store.clone()
    }

    /// Get the match result processor
    pub fn processor(&self) -> Arc<MatchResultProcessor> {
        self.processor.clone()
    }

    /// Get the administrative registry
    pub fn registry(&self) -> Arc<LeagueRegistry> {
        self.registry.clone()
    }

    /// Get the season lifecycle orchestrator
    pub fn lifecycle(&self) -> Arc<SeasonLifecycle> {
        self.lifecycle.clone()
    }

    /// Get metrics service
    pub fn metrics_service(&self) -> Arc<MetricsService> {
        self.metrics_service.clone()
    }

    /// Get AMQP connection for health checks
    pub fn amqp_connection(&self) -> Arc<AmqpConnection> {
        self.amqp_connection.clone()
    }

    /// Initialize metrics service
    async fn initialize_metrics(config: &AppConfig) -> Result<Arc<MetricsService>, ServiceError> {
        info!(
            "Initializing metrics service on port {}",
            config.service.metrics_port
        );

        let metrics_collector =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );

        let health_config = HealthServerConfig {
            port: config.service.metrics_port,
            host: "0.0.0.0".to_string(),
        };

        let health_server = Arc::new(HealthServer::new(health_config, metrics_collector.clone()));
        let metrics_service = Arc::new(MetricsService::new(metrics_collector, health_server));

        Ok(metrics_service)
    }

    /// Start metrics service
    async fn start_metrics_service(&self) -> Result<(), ServiceError> {
        info!("Starting metrics and health endpoints");

        // Clone necessary references for the background task
        let metrics_service = self.metrics_service.clone();
        let port = self.config.service.metrics_port;

        // Spawn the metrics service as a background task
        let metrics_handle = tokio::spawn(async move {
            if let Err(e) = metrics_service.start().await {
                error!("Metrics service failed: {}", e);
            } else {
                info!("Metrics service task completed");
            }
        });

        // Add the handle to background tasks for proper shutdown
        self.background_tasks.lock().await.push(metrics_handle);

        // Give the server a moment to start up
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        info!("✅ Metrics service started on port {}", port);
        Ok(())
    }

    /// Initialize AMQP connection with retry logic
    async fn initialize_amqp(config: &AppConfig) -> Result<Arc<AmqpConnection>, ServiceError> {
        info!("Connecting to AMQP broker: {}", config.amqp.url);

        let amqp_config =
            AmqpConfig::from_url(&config.amqp.url).map_err(|e| ServiceError::Configuration {
                message: format!("Failed to parse AMQP URL: {}", e),
            })?;

        let connection =
            AmqpConnection::new(amqp_config)
                .await
                .map_err(|e| ServiceError::AmqpConnection {
                    message: format!("Failed to connect to AMQP: {}", e),
                })?;

        Ok(Arc::new(connection))
    }

    /// Initialize the AMQP-backed notifier
    async fn initialize_notifier(
        config: &AppConfig,
        amqp_connection: &AmqpConnection,
    ) -> Result<Arc<dyn Notifier>, ServiceError> {
        let channel = amqp_connection
            .connection()
            .open_channel(None)
            .await
            .map_err(|e| ServiceError::Initialization {
                message: format!("Failed to open notifier channel: {}", e),
            })?;

        let notifier_config = NotifierConfig {
            max_retries: config.amqp.max_retry_attempts,
            retry_delay_ms: config.amqp.retry_delay_ms,
            ..NotifierConfig::default()
        };

        let notifier =
            AmqpNotifier::new(channel, notifier_config)
                .await
                .map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to initialize notifier: {}", e),
                })?;

        Ok(Arc::new(notifier))
    }

    /// Start AMQP message consumption
    async fn start_amqp_consumption(&self) -> Result<(), ServiceError> {
        info!("Starting AMQP message consumption system...");

        // Get a channel for consuming messages
        let channel = self
            .amqp_connection
            .connection()
            .open_channel(None)
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to open consumer channel: {}", e),
            })?;

        // Declare the queue to ensure it exists
        info!("Declaring queue: '{}'...", SUBMISSIONS_QUEUE);
        let queue_declare_args = amqprs::channel::QueueDeclareArguments::new(SUBMISSIONS_QUEUE)
            .durable(true)
            .auto_delete(false)
            .finish();

        channel
            .queue_declare(queue_declare_args)
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to declare queue {}: {}", SUBMISSIONS_QUEUE, e),
            })?;

        info!("Queue '{}' declared successfully", SUBMISSIONS_QUEUE);

        // Create message handler with dead letter tracking
        let dead_letters =
            DeadLetterHandler::new(channel.clone(), self.config.amqp.max_retry_attempts);
        let message_handler = Arc::new(ProductionMessageHandler::new(
            self.processor.clone(),
            self.store.clone(),
            self.notifier.clone(),
            dead_letters,
        ));

        // Create and start the consumer
        let consumer = SubmissionConsumer::new(message_handler, channel);
        consumer
            .start_consuming(SUBMISSIONS_QUEUE)
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to start consuming messages: {}", e),
            })?;

        // Store consumer for cleanup
        *self.submission_consumer.lock().await = Some(consumer);

        info!(
            "AMQP message consumption started on queue: '{}'",
            SUBMISSIONS_QUEUE
        );
        info!("Now listening for result submissions from players...");
        Ok(())
    }

    /// Start background maintenance tasks
    async fn start_background_tasks(&self) -> Result<(), ServiceError> {
        info!("Starting background maintenance tasks...");

        // League stats metrics task
        info!("Starting league stats update task (30s interval)...");
        let stats_task = {
            let store = self.store.clone();
            let metrics_collector = self.metrics_service.collector();
            let is_running = self.is_running.clone();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(30));
                info!("League stats update task started");

                while *is_running.read().await {
                    interval.tick().await;

                    match store.stats() {
                        Ok(stats) => {
                            debug!(
                                "Updating league metrics - players: {}, pending: {}, played: {}",
                                stats.players, stats.matches_pending, stats.matches_played
                            );
                            metrics_collector.update_league_stats(&stats);
                        }
                        Err(e) => {
                            warn!("Failed to get store stats for metrics update: {}", e);
                        }
                    }
                }

                info!("League stats update task stopped");
            })
        };

        // Season lifecycle task (if enabled)
        let lifecycle_task = if self.config.league.enable_daily_lifecycle {
            info!(
                "Starting season lifecycle task ({}s interval)...",
                self.config.lifecycle_check_interval().as_secs()
            );
            let lifecycle = self.lifecycle.clone();
            let tick_interval = self.config.lifecycle_check_interval();
            let is_running = self.is_running.clone();

            Some(tokio::spawn(async move {
                let mut interval = tokio::time::interval(tick_interval);
                info!("Season lifecycle task started");

                while *is_running.read().await {
                    interval.tick().await;

                    let today = chrono::Utc::now().date_naive();
                    match lifecycle.daily_tick(today).await {
                        Ok(TickOutcome::Idle) => {
                            debug!("Lifecycle tick completed - nothing due");
                        }
                        Ok(TickOutcome::SeasonRolled { report, rollover }) => {
                            info!(
                                "Season rolled - closed '{}', opened '{}'",
                                report.season_name, rollover.season.display_name
                            );
                        }
                        Ok(TickOutcome::RolloverResumed(summary)) => {
                            info!(
                                "Stranded rollover resumed - opened '{}'",
                                summary.season.display_name
                            );
                        }
                        Ok(TickOutcome::ReportRetried(season_id)) => {
                            info!("Close report redelivered for season {}", season_id);
                        }
                        Err(e) => {
                            let critical = e
                                .downcast_ref::<LeagueError>()
                                .map(|le| le.is_critical())
                                .unwrap_or(false);
                            if critical {
                                error!("Lifecycle tick failed with critical error: {}", e);
                            } else {
                                warn!("Lifecycle tick failed: {}", e);
                            }
                        }
                    }
                }

                info!("Season lifecycle task stopped");
            }))
        } else {
            info!("Daily lifecycle disabled - skipping season lifecycle task");
            None
        };

        // Service health metrics task
        info!("Starting health metrics task (60s interval)...");
        let health_metrics_task = {
            let metrics_collector = self.metrics_service.collector();
            let amqp_connection = self.amqp_connection.clone();
            let store = self.store.clone();
            let is_running = self.is_running.clone();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(60));
                let start_time = tokio::time::Instant::now();
                info!("Health metrics task started");

                while *is_running.read().await {
                    interval.tick().await;

                    // Update service uptime
                    let uptime_seconds = start_time.elapsed().as_secs() as i64;
                    metrics_collector
                        .service()
                        .uptime_seconds
                        .set(uptime_seconds);

                    // Update component health from live checks
                    let amqp_alive = amqp_connection.is_alive();
                    let store_ok = store.stats().is_ok();

                    metrics_collector.update_component_health("amqp", amqp_alive);
                    metrics_collector.update_component_health("league_store", store_ok);
                    metrics_collector.update_component_health("metrics", true);

                    let status = if amqp_alive && store_ok { 2 } else { 1 };
                    metrics_collector.update_health_status(status);

                    debug!(
                        "Updated service health metrics - uptime: {}s, amqp: {}, store: {}",
                        uptime_seconds, amqp_alive, store_ok
                    );
                }

                info!("Health metrics task stopped");
            })
        };

        // Add tasks to background handles
        let mut tasks = self.background_tasks.lock().await;
        let mut task_count = 2; // stats, health
        tasks.push(stats_task);
        tasks.push(health_metrics_task);
        if let Some(task) = lifecycle_task {
            tasks.push(task);
            task_count += 1;
        }

        info!(
            "{} background maintenance tasks started successfully",
            task_count
        );
        Ok(())
    }

    /// Stop all background tasks
    async fn stop_background_tasks(&self) {
        let mut tasks = self.background_tasks.lock().await;
        let task_count = tasks.len();
        if task_count == 0 {
            info!("No background tasks to stop");
            return;
        }

        info!("Stopping {} background tasks...", task_count);

        // Cancel all background tasks
        for (i, task) in tasks.drain(..).enumerate() {
            debug!("Aborting background task {}/{}", i + 1, task_count);
            task.abort();
        }

        // Give tasks time to clean up gracefully
        info!("Waiting for background tasks to complete shutdown...");
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;

        info!("✅ All {} background tasks stopped", task_count);
    }
}
