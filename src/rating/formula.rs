//! League rating formula
//!
//! Fixed-point computation of per-match rating deltas. Results are persisted
//! and later summed as an append-only ledger, so all arithmetic stays in
//! `Decimal`; binary floating point never touches a stored rating.

use rust_decimal::Decimal;

use crate::error::{LeagueError, Result};

/// The six valid best-of-5 outcomes, as (sets_a, sets_b) pairs
pub const VALID_SCORES: [(u32, u32); 6] = [(3, 0), (3, 1), (3, 2), (2, 3), (1, 3), (0, 3)];

/// Rating every player starts from. The history ledger sums to the cached
/// rating only relative to this anchor, so it is a constant rather than
/// configuration.
pub fn initial_rating() -> Decimal {
    Decimal::from(100)
}

/// Rating change for both sides of one played match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatingDelta {
    pub winner: Decimal,
    pub loser: Decimal,
}

/// Check that a set score is one of the six valid best-of-5 outcomes
pub fn validate_score(sets_a: u32, sets_b: u32) -> Result<()> {
    if VALID_SCORES.contains(&(sets_a, sets_b)) {
        Ok(())
    } else {
        Err(LeagueError::InvalidScore {
            reason: format!("{}:{} is not a valid best-of-5 outcome", sets_a, sets_b),
        }
        .into())
    }
}

/// Score coefficient (KS) for a set score, symmetric in its arguments.
///
/// 3:0 -> 1.2, 3:1 -> 1.0, 3:2 -> 0.8. Any other pair falls back to 1.0;
/// validation happens before rating math, so the fallback is unreachable for
/// accepted submissions.
pub fn score_coef(sets_a: u32, sets_b: u32) -> Decimal {
    let (hi, lo) = if sets_a >= sets_b {
        (sets_a, sets_b)
    } else {
        (sets_b, sets_a)
    };
    match (hi, lo) {
        (3, 0) => Decimal::new(12, 1),
        (3, 1) => Decimal::ONE,
        (3, 2) => Decimal::new(8, 1),
        _ => Decimal::ONE,
    }
}

/// Default division coefficient (KD) by tier number
pub fn default_division_coef(number: u32) -> Decimal {
    match number {
        1 => Decimal::new(30, 2),
        2 => Decimal::new(27, 2),
        3 => Decimal::new(25, 2),
        _ => Decimal::new(22, 2),
    }
}

/// Compute both rating deltas for a finished match.
///
/// `rating_winner`/`rating_loser` are pre-match ratings; sets are given in
/// winner-first order. The winner gains `(100 - diff) / 10 * KD * KS`, the
/// loser gives up half of that, both rounded to two decimal places before the
/// loser's sign flip so the persisted values match the ledger exactly.
pub fn match_deltas(
    rating_winner: Decimal,
    rating_loser: Decimal,
    sets_winner: u32,
    sets_loser: u32,
    division_coef: Decimal,
) -> RatingDelta {
    let ks = score_coef(sets_winner, sets_loser);
    let diff = rating_winner - rating_loser;
    let base = (Decimal::from(100) - diff) / Decimal::from(10);

    let winner = (base * division_coef * ks).round_dp(2);
    let loser = -((base / Decimal::from(2)) * division_coef * ks).round_dp(2);

    RatingDelta { winner, loser }
}
