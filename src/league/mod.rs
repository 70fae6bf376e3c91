//! League domain logic
//!
//! This module owns everything between a raw result submission and the next
//! season: validating and recording matches, ranking divisions, closing a
//! season at month end and building the one that follows.

pub mod closer;
pub mod lifecycle;
pub mod registry;
pub mod results;
pub mod rollover;
pub mod standings;

// Re-export commonly used types
pub use closer::SeasonCloser;
pub use lifecycle::{SeasonLifecycle, TickOutcome};
pub use registry::LeagueRegistry;
pub use results::MatchResultProcessor;
pub use rollover::SeasonRollover;
pub use standings::StandingsRanker;
