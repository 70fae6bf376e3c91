//! Club Ladder - Season lifecycle and rating engine for an amateur league
//!
//! This crate runs a monthly division league over AMQP: result submissions
//! arrive on a queue, ratings and standings update in a shared store, and a
//! daily lifecycle task closes each season on its final day, reports the
//! standings and rolls promotions and relegations into the next one.

pub mod amqp;
pub mod config;
pub mod error;
pub mod league;
pub mod metrics;
pub mod rating;
pub mod service;
pub mod store;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{LeagueError, Result};
pub use types::*;

// Re-export key components
pub use amqp::notifier::Notifier;
pub use league::{MatchResultProcessor, SeasonCloser, SeasonLifecycle, SeasonRollover};
pub use store::{InMemoryLeagueStore, LeagueStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
