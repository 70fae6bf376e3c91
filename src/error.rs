//! Error types for the league engine
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the application.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific league scenarios
#[derive(Debug, thiserror::Error)]
pub enum LeagueError {
    #[error("Invalid score: {reason}")]
    InvalidScore { reason: String },

    #[error("Match already recorded: {message}")]
    AlreadyRecorded { message: String },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Season closed: {message}")]
    SeasonClosed { message: String },

    #[error("Store unavailable: {message}")]
    StoreUnavailable { message: String },

    #[error("Inconsistent state: {message}")]
    InconsistentState { message: String },

    #[error("Invalid submission: {reason}")]
    InvalidSubmission { reason: String },

    #[error("AMQP connection failed: {message}")]
    AmqpConnectionFailed { message: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}

impl LeagueError {
    /// Whether a retry of the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LeagueError::StoreUnavailable { .. } | LeagueError::AmqpConnectionFailed { .. }
        )
    }

    /// Conditions that must halt automation and surface for manual review.
    pub fn is_critical(&self) -> bool {
        matches!(self, LeagueError::InconsistentState { .. })
    }

    /// Short label used in metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            LeagueError::InvalidScore { .. } => "invalid_score",
            LeagueError::AlreadyRecorded { .. } => "already_recorded",
            LeagueError::NotFound { .. } => "not_found",
            LeagueError::SeasonClosed { .. } => "season_closed",
            LeagueError::StoreUnavailable { .. } => "store_unavailable",
            LeagueError::InconsistentState { .. } => "inconsistent_state",
            LeagueError::InvalidSubmission { .. } => "invalid_submission",
            LeagueError::AmqpConnectionFailed { .. } => "amqp_connection_failed",
            LeagueError::ConfigurationError { .. } => "configuration_error",
            LeagueError::InternalError { .. } => "internal_error",
        }
    }
}
