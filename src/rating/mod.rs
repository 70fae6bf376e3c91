//! League rating formula
//!
//! This module provides the fixed-point rating math applied after every
//! played match: score validation, coefficient lookups and delta computation.

pub mod formula;

// Re-export commonly used items
pub use formula::{
    default_division_coef, initial_rating, match_deltas, score_coef, validate_score, RatingDelta,
    VALID_SCORES,
};
