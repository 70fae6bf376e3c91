//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the club-ladder league
//! service: submission outcomes, season lifecycle counters, store-level
//! gauges and processing durations.

use crate::store::StoreStats;
use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the league service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Result submission metrics
    submission_metrics: SubmissionMetrics,

    /// Season lifecycle metrics
    season_metrics: SeasonMetrics,

    /// League state gauges
    league_metrics: LeagueMetrics,

    /// Performance metrics
    performance_metrics: PerformanceMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Total AMQP messages processed
    pub amqp_messages_total: IntCounterVec,

    /// AMQP message processing errors
    pub amqp_errors_total: IntCounterVec,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,
}

/// Result submission metrics
#[derive(Clone)]
pub struct SubmissionMetrics {
    /// Accepted submissions by division tier
    pub submissions_accepted_total: IntCounterVec,

    /// Rejected submissions by error kind
    pub submissions_rejected_total: IntCounterVec,

    /// Distribution of post-match player ratings
    pub rating_distribution: Histogram,
}

/// Season lifecycle metrics
#[derive(Clone)]
pub struct SeasonMetrics {
    /// Total seasons closed
    pub seasons_closed_total: IntCounter,

    /// Matches forfeited during season close
    pub forfeits_total: IntCounter,

    /// Players promoted during rollover
    pub promotions_total: IntCounter,

    /// Players relegated during rollover
    pub relegations_total: IntCounter,

    /// Notifications published, by kind and status
    pub notifications_total: IntCounterVec,
}

/// League state gauges, refreshed from store counters
#[derive(Clone)]
pub struct LeagueMetrics {
    /// Registered players
    pub players: IntGauge,

    /// Active (not deactivated) players
    pub active_players: IntGauge,

    /// Division count across all seasons
    pub divisions: IntGauge,

    /// Match rows by status
    pub matches: IntGaugeVec,

    /// Rating history ledger length
    pub history_entries: IntGauge,
}

/// Performance metrics
#[derive(Clone)]
pub struct PerformanceMetrics {
    /// Result submission processing time
    pub submission_processing_duration: Histogram,

    /// Rating delta computation time
    pub rating_calculation_duration: Histogram,

    /// Season close and rollover durations
    pub lifecycle_operation_duration: HistogramVec,

    /// AMQP operation durations
    pub amqp_operation_duration: HistogramVec,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let submission_metrics = SubmissionMetrics::new(&registry)?;
        let season_metrics = SeasonMetrics::new(&registry)?;
        let league_metrics = LeagueMetrics::new(&registry)?;
        let performance_metrics = PerformanceMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            submission_metrics,
            season_metrics,
            league_metrics,
            performance_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Get service metrics
    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    /// Get submission metrics
    pub fn submission(&self) -> &SubmissionMetrics {
        &self.submission_metrics
    }

    /// Get season metrics
    pub fn season(&self) -> &SeasonMetrics {
        &self.season_metrics
    }

    /// Get league state gauges
    pub fn league(&self) -> &LeagueMetrics {
        &self.league_metrics
    }

    /// Get performance metrics
    pub fn performance(&self) -> &PerformanceMetrics {
        &self.performance_metrics
    }

    /// Record an accepted result submission
    pub fn record_submission_accepted(&self, division_number: u32, duration: Duration) {
        self.submission_metrics
            .submissions_accepted_total
            .with_label_values(&[&division_number.to_string()])
            .inc();

        self.performance_metrics
            .submission_processing_duration
            .observe(duration.as_secs_f64());
    }

    /// Record a rejected result submission
    pub fn record_submission_rejected(&self, reason: &str) {
        self.submission_metrics
            .submissions_rejected_total
            .with_label_values(&[reason])
            .inc();
    }

    /// Record a post-match rating value
    pub fn record_rating(&self, rating: f64) {
        self.submission_metrics.rating_distribution.observe(rating);
    }

    /// Record rating calculation duration
    pub fn record_rating_calculation(&self, duration: Duration) {
        self.performance_metrics
            .rating_calculation_duration
            .observe(duration.as_secs_f64());
    }

    /// Record a completed season close
    pub fn record_season_closed(&self, forfeits: usize, duration: Duration) {
        self.season_metrics.seasons_closed_total.inc();
        self.season_metrics.forfeits_total.inc_by(forfeits as u64);
        self.performance_metrics
            .lifecycle_operation_duration
            .with_label_values(&["close"])
            .observe(duration.as_secs_f64());
    }

    /// Record a completed season rollover
    pub fn record_rollover(&self, promoted: usize, relegated: usize, duration: Duration) {
        self.season_metrics.promotions_total.inc_by(promoted as u64);
        self.season_metrics
            .relegations_total
            .inc_by(relegated as u64);
        self.performance_metrics
            .lifecycle_operation_duration
            .with_label_values(&["rollover"])
            .observe(duration.as_secs_f64());
    }

    /// Record a notification publish attempt
    pub fn record_notification(&self, kind: &str, success: bool) {
        let status = if success { "sent" } else { "failed" };
        self.season_metrics
            .notifications_total
            .with_label_values(&[kind, status])
            .inc();
    }

    /// Record AMQP operation
    pub fn record_amqp_operation(&self, operation: &str, success: bool, duration: Duration) {
        let status = if success { "success" } else { "error" };

        self.service_metrics
            .amqp_messages_total
            .with_label_values(&[operation, status])
            .inc();

        if !success {
            self.service_metrics
                .amqp_errors_total
                .with_label_values(&[operation])
                .inc();
        }

        self.performance_metrics
            .amqp_operation_duration
            .with_label_values(&[operation, status])
            .observe(duration.as_secs_f64());
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Refresh league state gauges from store counters
    pub fn update_league_stats(&self, stats: &StoreStats) {
        self.league_metrics.players.set(stats.players as i64);
        self.league_metrics
            .active_players
            .set(stats.active_players as i64);
        self.league_metrics.divisions.set(stats.divisions as i64);
        self.league_metrics
            .matches
            .with_label_values(&["pending"])
            .set(stats.matches_pending as i64);
        self.league_metrics
            .matches
            .with_label_values(&["played"])
            .set(stats.matches_played as i64);
        self.league_metrics
            .matches
            .with_label_values(&["not_played"])
            .set(stats.matches_forfeited as i64);
        self.league_metrics
            .history_entries
            .set(stats.history_entries as i64);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("club_ladder_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let amqp_messages_total = IntCounterVec::new(
            Opts::new(
                "club_ladder_amqp_messages_total",
                "Total AMQP messages processed",
            ),
            &["operation", "status"],
        )?;
        registry.register(Box::new(amqp_messages_total.clone()))?;

        let amqp_errors_total = IntCounterVec::new(
            Opts::new("club_ladder_amqp_errors_total", "Total AMQP errors"),
            &["operation"],
        )?;
        registry.register(Box::new(amqp_errors_total.clone()))?;

        let health_status = IntGauge::new(
            "club_ladder_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("club_ladder_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        Ok(Self {
            uptime_seconds,
            amqp_messages_total,
            amqp_errors_total,
            health_status,
            component_health,
        })
    }
}

impl SubmissionMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let submissions_accepted_total = IntCounterVec::new(
            Opts::new(
                "club_ladder_submissions_accepted_total",
                "Accepted result submissions",
            ),
            &["division"],
        )?;
        registry.register(Box::new(submissions_accepted_total.clone()))?;

        let submissions_rejected_total = IntCounterVec::new(
            Opts::new(
                "club_ladder_submissions_rejected_total",
                "Rejected result submissions",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(submissions_rejected_total.clone()))?;

        let rating_distribution = Histogram::with_opts(
            HistogramOpts::new(
                "club_ladder_rating_distribution",
                "Post-match player ratings",
            )
            .buckets(vec![70.0, 80.0, 90.0, 95.0, 100.0, 105.0, 110.0, 120.0, 130.0]),
        )?;
        registry.register(Box::new(rating_distribution.clone()))?;

        Ok(Self {
            submissions_accepted_total,
            submissions_rejected_total,
            rating_distribution,
        })
    }
}

impl SeasonMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let seasons_closed_total =
            IntCounter::new("club_ladder_seasons_closed_total", "Total seasons closed")?;
        registry.register(Box::new(seasons_closed_total.clone()))?;

        let forfeits_total = IntCounter::new(
            "club_ladder_forfeits_total",
            "Matches forfeited at season close",
        )?;
        registry.register(Box::new(forfeits_total.clone()))?;

        let promotions_total = IntCounter::new(
            "club_ladder_promotions_total",
            "Players promoted during rollover",
        )?;
        registry.register(Box::new(promotions_total.clone()))?;

        let relegations_total = IntCounter::new(
            "club_ladder_relegations_total",
            "Players relegated during rollover",
        )?;
        registry.register(Box::new(relegations_total.clone()))?;

        let notifications_total = IntCounterVec::new(
            Opts::new(
                "club_ladder_notifications_total",
                "Notifications published",
            ),
            &["kind", "status"],
        )?;
        registry.register(Box::new(notifications_total.clone()))?;

        Ok(Self {
            seasons_closed_total,
            forfeits_total,
            promotions_total,
            relegations_total,
            notifications_total,
        })
    }
}

impl LeagueMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let players = IntGauge::new("club_ladder_players", "Registered players")?;
        registry.register(Box::new(players.clone()))?;

        let active_players = IntGauge::new("club_ladder_active_players", "Active players")?;
        registry.register(Box::new(active_players.clone()))?;

        let divisions = IntGauge::new("club_ladder_divisions", "Divisions across all seasons")?;
        registry.register(Box::new(divisions.clone()))?;

        let matches = IntGaugeVec::new(
            Opts::new("club_ladder_matches", "Match rows by status"),
            &["status"],
        )?;
        registry.register(Box::new(matches.clone()))?;

        let history_entries = IntGauge::new(
            "club_ladder_history_entries",
            "Rating history ledger length",
        )?;
        registry.register(Box::new(history_entries.clone()))?;

        Ok(Self {
            players,
            active_players,
            divisions,
            matches,
            history_entries,
        })
    }
}

impl PerformanceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let submission_processing_duration = Histogram::with_opts(
            HistogramOpts::new(
                "club_ladder_submission_processing_duration_seconds",
                "Result submission processing time",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )?;
        registry.register(Box::new(submission_processing_duration.clone()))?;

        let rating_calculation_duration = Histogram::with_opts(
            HistogramOpts::new(
                "club_ladder_rating_calculation_duration_seconds",
                "Rating delta computation time",
            )
            .buckets(vec![0.0001, 0.001, 0.005, 0.01, 0.05]),
        )?;
        registry.register(Box::new(rating_calculation_duration.clone()))?;

        let lifecycle_operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "club_ladder_lifecycle_operation_duration_seconds",
                "Season close and rollover duration",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation"],
        )?;
        registry.register(Box::new(lifecycle_operation_duration.clone()))?;

        let amqp_operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "club_ladder_amqp_operation_duration_seconds",
                "AMQP operation duration",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation", "status"],
        )?;
        registry.register(Box::new(amqp_operation_duration.clone()))?;

        Ok(Self {
            submission_processing_duration,
            rating_calculation_duration,
            lifecycle_operation_duration,
            amqp_operation_duration,
        })
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new().expect("Failed to create default metrics collector")
    }
}
