//! Match result processing
//!
//! This module implements the submission pipeline: validation, idempotence
//! checks, rating computation and the atomic store commit. One accepted
//! submission settles a pair's match for the season; every later submission
//! for the same pair is rejected without touching ratings.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{LeagueError, Result};
use crate::metrics::MetricsCollector;
use crate::rating::formula;
use crate::store::{LeagueStore, MatchResultCommit, MembershipUpdate, PlayerRatingUpdate};
use crate::types::{
    Division, MatchOutcome, MatchRecord, MatchStatus, Player, PlayerId, ResultSubmission, Season,
    SeasonStatus,
};
use crate::utils::generate_id;

/// Points booked for winning a played match
pub const WINNER_POINTS: u32 = 2;
/// Points booked for losing a played match
pub const LOSER_POINTS: u32 = 1;

/// Processes match result submissions against the league store
pub struct MatchResultProcessor {
    store: Arc<dyn LeagueStore>,
    metrics_collector: Arc<MetricsCollector>,
}

impl MatchResultProcessor {
    /// Create a processor with a default metrics collector
    pub fn new(store: Arc<dyn LeagueStore>) -> Self {
        let metrics_collector = Arc::new(MetricsCollector::new().unwrap_or_else(|_| {
            warn!("Failed to create metrics collector, using default");
            MetricsCollector::default()
        }));
        Self::with_metrics(store, metrics_collector)
    }

    /// Create a processor with a shared metrics collector
    pub fn with_metrics(store: Arc<dyn LeagueStore>, metrics_collector: Arc<MetricsCollector>) -> Self {
        Self {
            store,
            metrics_collector,
        }
    }

    /// Process one result submission end to end.
    ///
    /// The submitter must be one of the two players. Exactly one submission
    /// per pair and division is ever accepted; a repeat fails with
    /// `AlreadyRecorded` regardless of which side submits or what score they
    /// claim.
    pub fn submit(&self, submission: ResultSubmission) -> Result<MatchOutcome> {
        let timer = self.metrics_collector.start_timer();

        info!(
            "Processing result submission - division: {}, pair: {} vs {}, score: {}:{}",
            submission.division_id,
            submission.player_a,
            submission.player_b,
            submission.sets_a,
            submission.sets_b
        );

        let result = self.process(&submission);
        let duration = timer.stop();

        match &result {
            Ok((outcome, division_number)) => {
                self.metrics_collector
                    .record_submission_accepted(*division_number, duration);
                info!(
                    "Result recorded - match: {}, winner: {} (delta {}), loser: {} (delta {}), duration: {:.2}ms",
                    outcome.match_record.id,
                    outcome.winner,
                    outcome.deltas[&outcome.winner],
                    outcome.loser,
                    outcome.deltas[&outcome.loser],
                    duration.as_secs_f64() * 1000.0
                );
            }
            Err(error) => {
                let reason = error
                    .downcast_ref::<LeagueError>()
                    .map(|e| e.kind())
                    .unwrap_or("internal_error");
                self.metrics_collector.record_submission_rejected(reason);
                warn!(
                    "Result submission rejected - division: {}, pair: {} vs {}, reason: {}",
                    submission.division_id, submission.player_a, submission.player_b, error
                );
            }
        }

        result.map(|(outcome, _)| outcome)
    }

    fn process(&self, submission: &ResultSubmission) -> Result<(MatchOutcome, u32)> {
        if submission.player_a == submission.player_b {
            return Err(LeagueError::InvalidSubmission {
                reason: "a match needs two distinct players".to_string(),
            }
            .into());
        }
        if submission.submitted_by != submission.player_a
            && submission.submitted_by != submission.player_b
        {
            return Err(LeagueError::InvalidSubmission {
                reason: "results can only be submitted by one of the players".to_string(),
            }
            .into());
        }

        let division = self.require_division(&submission.division_id)?;

        // Idempotence check before any math; a played pair stays settled no
        // matter what the resubmission claims.
        let existing = self.store.find_match(
            &submission.division_id,
            &submission.player_a,
            &submission.player_b,
        )?;
        if let Some(ref record) = existing {
            if record.status == MatchStatus::Played {
                return Err(LeagueError::AlreadyRecorded {
                    message: format!(
                        "match between these players is already recorded in division {}",
                        division.number
                    ),
                }
                .into());
            }
        }

        formula::validate_score(submission.sets_a, submission.sets_b)?;

        let season = self.require_active_season(&division)?;

        // Winner-first orientation for the formula and the booked record
        let (winner_id, loser_id, sets_winner, sets_loser) =
            if submission.sets_a > submission.sets_b {
                (
                    submission.player_a,
                    submission.player_b,
                    submission.sets_a,
                    submission.sets_b,
                )
            } else {
                (
                    submission.player_b,
                    submission.player_a,
                    submission.sets_b,
                    submission.sets_a,
                )
            };

        let winner = self.require_player(&winner_id)?;
        let loser = self.require_player(&loser_id)?;
        self.require_membership(&division, &winner_id)?;
        self.require_membership(&division, &loser_id)?;

        let rating_timer = self.metrics_collector.start_timer();
        let delta = formula::match_deltas(
            winner.rating,
            loser.rating,
            sets_winner,
            sets_loser,
            division.coef,
        );
        self.metrics_collector
            .record_rating_calculation(rating_timer.stop());

        let winner_after = (winner.rating + delta.winner).round_dp(2);
        let loser_after = (loser.rating + delta.loser).round_dp(2);

        // A pending fixture row keeps its identity when the result lands
        let (match_id, created_at) = match existing {
            Some(record) => (record.id, record.created_at),
            None => (generate_id(), submission.timestamp),
        };

        let commit = MatchResultCommit {
            season_id: season.id,
            match_record: MatchRecord {
                id: match_id,
                division_id: division.id,
                player_a: winner_id,
                player_b: loser_id,
                sets_a: sets_winner,
                sets_b: sets_loser,
                status: MatchStatus::Played,
                submitted_by: Some(submission.submitted_by),
                played_at: Some(submission.timestamp),
                created_at,
            },
            winner: PlayerRatingUpdate {
                player_id: winner_id,
                rating_before: winner.rating,
                rating_delta: delta.winner,
                rating_after: winner_after,
            },
            loser: PlayerRatingUpdate {
                player_id: loser_id,
                rating_before: loser.rating,
                rating_delta: delta.loser,
                rating_after: loser_after,
            },
            winner_membership: MembershipUpdate {
                player_id: winner_id,
                points: WINNER_POINTS,
                sets_won: sets_winner,
                sets_lost: sets_loser,
                rating_delta: delta.winner,
            },
            loser_membership: MembershipUpdate {
                player_id: loser_id,
                points: LOSER_POINTS,
                sets_won: sets_loser,
                sets_lost: sets_winner,
                rating_delta: delta.loser,
            },
        };

        let match_record = self.store.commit_match_result(commit)?;

        self.record_rating_gauge(winner_after);
        self.record_rating_gauge(loser_after);

        let mut deltas = HashMap::new();
        deltas.insert(winner_id, delta.winner);
        deltas.insert(loser_id, delta.loser);

        Ok((
            MatchOutcome {
                match_record,
                winner: winner_id,
                loser: loser_id,
                deltas,
            },
            division.number,
        ))
    }

    fn require_division(&self, division_id: &crate::types::DivisionId) -> Result<Division> {
        self.store.get_division(division_id)?.ok_or_else(|| {
            LeagueError::NotFound {
                message: format!("division {}", division_id),
            }
            .into()
        })
    }

    fn require_active_season(&self, division: &Division) -> Result<Season> {
        let season = self.store.get_season(&division.season_id)?.ok_or_else(|| {
            anyhow::Error::from(LeagueError::InconsistentState {
                message: format!(
                    "division {} references missing season {}",
                    division.id, division.season_id
                ),
            })
        })?;
        if season.status != SeasonStatus::Active {
            return Err(LeagueError::SeasonClosed {
                message: format!("season {} is {}", season.display_name, season.status),
            }
            .into());
        }
        Ok(season)
    }

    fn require_player(&self, player_id: &PlayerId) -> Result<Player> {
        self.store.get_player(player_id)?.ok_or_else(|| {
            LeagueError::NotFound {
                message: format!("player {}", player_id),
            }
            .into()
        })
    }

    fn require_membership(&self, division: &Division, player_id: &PlayerId) -> Result<()> {
        match self.store.membership_for_player(&division.id, player_id)? {
            Some(_) => Ok(()),
            None => Err(LeagueError::NotFound {
                message: format!(
                    "player {} is not assigned to division {}",
                    player_id, division.number
                ),
            }
            .into()),
        }
    }

    fn record_rating_gauge(&self, rating: rust_decimal::Decimal) {
        use rust_decimal::prelude::ToPrimitive;
        if let Some(value) = rating.to_f64() {
            self.metrics_collector.record_rating(value);
        }
    }
}
