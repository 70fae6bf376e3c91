//! Configuration management for the club-ladder service
//!
//! This module handles all configuration loading from environment variables
//! and TOML files, validation, and default values for the league service.

pub mod app;

// Re-export commonly used types
pub use app::{validate_config, AmqpSettings, AppConfig, LeagueSettings, ServiceSettings};
