//! Health check endpoints and monitoring
//!
//! This module provides health check functionality for the club-ladder
//! league service, including readiness and liveness probes.

use crate::service::app::AppState;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};

/// Health check status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "✅ healthy"),
            HealthStatus::Degraded => write!(f, "⚠️  degraded"),
            HealthStatus::Unhealthy => write!(f, "❌ unhealthy"),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    /// Service name
    pub service: String,
    /// Service version (could be from environment)
    pub version: String,
    /// Current timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Detailed component checks
    pub checks: Vec<ComponentCheck>,
    /// Service statistics
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    /// Component name
    pub name: String,
    /// Component status
    pub status: HealthStatus,
    /// Optional error message if unhealthy
    pub message: Option<String>,
    /// Check duration in milliseconds
    pub duration_ms: u64,
}

/// Service statistics for health reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStats {
    /// Registered players
    pub players: usize,
    /// Players currently eligible for play
    pub active_players: usize,
    /// Display name of the open season, if any
    pub current_season: Option<String>,
    /// Results recorded across all seasons
    pub matches_played: usize,
    /// Fixtures still awaiting a result
    pub matches_pending: usize,
    /// Store bookkeeping summary
    pub uptime_info: String,
}

impl HealthCheck {
    /// Perform a comprehensive health check of the service
    pub async fn check(app_state: Arc<AppState>) -> Result<Self> {
        let mut checks = Vec::new();
        let mut overall_status = HealthStatus::Healthy;

        // Check if service is running
        let service_check = Self::check_service_running(&app_state).await;
        if service_check.status != HealthStatus::Healthy {
            overall_status = HealthStatus::Unhealthy;
        }
        checks.push(service_check);

        // Check the league store
        let store_check = Self::check_league_store(&app_state).await;
        if store_check.status == HealthStatus::Unhealthy {
            overall_status = HealthStatus::Unhealthy;
        } else if store_check.status == HealthStatus::Degraded
            && overall_status == HealthStatus::Healthy
        {
            overall_status = HealthStatus::Degraded;
        }
        checks.push(store_check);

        // Check AMQP connectivity
        let amqp_check = Self::check_amqp_health(&app_state).await;
        if amqp_check.status == HealthStatus::Unhealthy {
            overall_status = HealthStatus::Unhealthy;
        } else if amqp_check.status == HealthStatus::Degraded
            && overall_status == HealthStatus::Healthy
        {
            overall_status = HealthStatus::Degraded;
        }
        checks.push(amqp_check);

        // Gather service statistics
        let stats = Self::gather_service_stats(&app_state).await;

        Ok(HealthCheck {
            status: overall_status,
            service: app_state.config().service.name.clone(),
            version: std::env::var("SERVICE_VERSION").unwrap_or_else(|_| "unknown".to_string()),
            timestamp: chrono::Utc::now(),
            checks,
            stats,
        })
    }

    /// Simple liveness check - just verify service is running
    pub async fn liveness_check(app_state: Arc<AppState>) -> Result<HealthStatus> {
        if app_state.is_running().await {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy)
        }
    }

    /// Readiness check - verify service can handle submissions
    pub async fn readiness_check(app_state: Arc<AppState>) -> Result<HealthStatus> {
        // Service must be running
        if !app_state.is_running().await {
            return Ok(HealthStatus::Unhealthy);
        }

        // Check if the store is accessible
        match Self::check_league_store(&app_state).await.status {
            HealthStatus::Healthy => Ok(HealthStatus::Healthy),
            HealthStatus::Degraded => Ok(HealthStatus::Degraded),
            HealthStatus::Unhealthy => Ok(HealthStatus::Unhealthy),
        }
    }

    /// Check if service is running
    async fn check_service_running(app_state: &AppState) -> ComponentCheck {
        let start = std::time::Instant::now();

        let (status, message) = if app_state.is_running().await {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Service is not running".to_string()),
            )
        };

        ComponentCheck {
            name: "service_running".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Check league store health
    async fn check_league_store(app_state: &AppState) -> ComponentCheck {
        let start = std::time::Instant::now();

        let (status, message) = match app_state.store().stats() {
            Ok(_stats) => (HealthStatus::Healthy, None),
            Err(e) => {
                error!("League store stats check failed: {}", e);
                (
                    HealthStatus::Degraded,
                    Some(format!("Stats check failed: {}", e)),
                )
            }
        };

        ComponentCheck {
            name: "league_store".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Check AMQP broker connectivity
    async fn check_amqp_health(app_state: &AppState) -> ComponentCheck {
        let start = std::time::Instant::now();

        let (status, message) = if app_state.amqp_connection().is_alive() {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Broker connection is closed".to_string()),
            )
        };

        ComponentCheck {
            name: "amqp_connection".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Gather current service statistics
    async fn gather_service_stats(app_state: &AppState) -> ServiceStats {
        let current_season = app_state
            .store()
            .current_season()
            .ok()
            .flatten()
            .map(|season| season.display_name);

        match app_state.store().stats() {
            Ok(stats) => ServiceStats {
                players: stats.players,
                active_players: stats.active_players,
                current_season,
                matches_played: stats.matches_played,
                matches_pending: stats.matches_pending,
                uptime_info: format!(
                    "Seasons tracked: {}, rating history entries: {}",
                    stats.seasons, stats.history_entries
                ),
            },
            Err(e) => {
                debug!("Failed to get store stats for health check: {}", e);
                ServiceStats {
                    players: 0,
                    active_players: 0,
                    current_season,
                    matches_played: 0,
                    matches_pending: 0,
                    uptime_info: "Store unavailable".to_string(),
                }
            }
        }
    }
}

/// Convert health check to JSON string
impl HealthCheck {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize health check: {}", e))
    }
}
