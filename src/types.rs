//! Common types used throughout the league engine

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for players
pub type PlayerId = Uuid;

/// Unique identifier for seasons
pub type SeasonId = Uuid;

/// Unique identifier for divisions
pub type DivisionId = Uuid;

/// Unique identifier for division memberships
pub type MembershipId = Uuid;

/// Unique identifier for matches
pub type MatchId = Uuid;

/// Lifecycle state of a season
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeasonStatus {
    Active,
    Closing,
    Closed,
}

impl std::fmt::Display for SeasonStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SeasonStatus::Active => write!(f, "active"),
            SeasonStatus::Closing => write!(f, "closing"),
            SeasonStatus::Closed => write!(f, "closed"),
        }
    }
}

/// State of a match row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Pending,
    Played,
    NotPlayed,
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchStatus::Pending => write!(f, "pending"),
            MatchStatus::Played => write!(f, "played"),
            MatchStatus::NotPlayed => write!(f, "not_played"),
        }
    }
}

/// A registered league player. Players are never deleted, only deactivated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub display_name: String,
    /// External identity the notifier delivers to (chat handle, etc.)
    pub contact_handle: String,
    /// Cached rating; always equals 100 plus the sum of history deltas
    pub rating: Decimal,
    pub is_admin: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// One month-long competitive cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Season {
    pub id: SeasonId,
    pub year: i32,
    /// 1-12
    pub month: u32,
    pub display_name: String,
    pub status: SeasonStatus,
    /// Set once the close report has been delivered; drives notification retry
    pub report_sent: bool,
    pub created_at: DateTime<Utc>,
}

/// A tier of players within a season. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Division {
    pub id: DivisionId,
    pub season_id: SeasonId,
    /// 1 = top tier
    pub number: u32,
    /// Division coefficient used in rating math
    pub coef: Decimal,
    pub created_at: DateTime<Utc>,
}

/// A player's seat in one division, with accumulated season aggregates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DivisionMembership {
    pub id: MembershipId,
    pub division_id: DivisionId,
    pub player_id: PlayerId,
    pub total_points: u32,
    pub total_sets_won: u32,
    pub total_sets_lost: u32,
    /// Cumulative signed rating change over this season
    pub rating_delta: Decimal,
    /// Final standing, populated only when the season closes
    pub position: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl DivisionMembership {
    /// Set difference used as the secondary ranking key.
    pub fn set_diff(&self) -> i64 {
        self.total_sets_won as i64 - self.total_sets_lost as i64
    }
}

/// A single match row per pair per division.
///
/// The pair is stored canonically: `player_a` always orders before `player_b`
/// by id, so both submission orders resolve to the same row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: MatchId,
    pub division_id: DivisionId,
    pub player_a: PlayerId,
    pub player_b: PlayerId,
    pub sets_a: u32,
    pub sets_b: u32,
    pub status: MatchStatus,
    pub submitted_by: Option<PlayerId>,
    pub played_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl MatchRecord {
    /// Winner of a played match; None for pending/forfeited rows.
    pub fn winner(&self) -> Option<PlayerId> {
        if self.status != MatchStatus::Played {
            return None;
        }
        if self.sets_a > self.sets_b {
            Some(self.player_a)
        } else {
            Some(self.player_b)
        }
    }
}

/// Append-only ledger entry recording one player's rating change for one match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingHistoryEntry {
    pub id: Uuid,
    pub player_id: PlayerId,
    pub match_id: MatchId,
    pub season_id: SeasonId,
    pub rating_before: Decimal,
    pub rating_delta: Decimal,
    pub rating_after: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Result of a committed match submission, returned to the caller
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub match_record: MatchRecord,
    pub winner: PlayerId,
    pub loser: PlayerId,
    /// Signed rating delta per player
    pub deltas: std::collections::HashMap<PlayerId, Decimal>,
}

/// One line of a season close report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportLine {
    pub division_number: u32,
    pub rank: u32,
    pub player_name: String,
    pub points: u32,
}

/// Structured close report handed to the notifier layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonReport {
    pub season_id: SeasonId,
    pub season_name: String,
    pub lines: Vec<ReportLine>,
}

impl std::fmt::Display for SeasonReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Final standings for {}", self.season_name)?;
        let mut current_division = None;
        for line in &self.lines {
            if current_division != Some(line.division_number) {
                writeln!(f, "Division {}", line.division_number)?;
                current_division = Some(line.division_number);
            }
            writeln!(f, "  {}. {} - {} pts", line.rank, line.player_name, line.points)?;
        }
        Ok(())
    }
}

/// Per-division movement counts produced by a rollover
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DivisionMoves {
    pub number: u32,
    pub promoted: usize,
    pub relegated: usize,
    pub stayed: usize,
}

/// Summary of a completed season rollover
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolloverSummary {
    pub season: Season,
    pub divisions: Vec<DivisionMoves>,
}

impl std::fmt::Display for RolloverSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Season {} is open", self.season.display_name)?;
        for moves in &self.divisions {
            writeln!(
                f,
                "  Division {}: {} up, {} down, {} stay",
                moves.number, moves.promoted, moves.relegated, moves.stayed
            )?;
        }
        Ok(())
    }
}

/// AMQP Message Types
/// A match result submitted over the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultSubmission {
    pub division_id: DivisionId,
    pub player_a: PlayerId,
    pub player_b: PlayerId,
    pub sets_a: u32,
    pub sets_b: u32,
    pub submitted_by: PlayerId,
    pub timestamp: DateTime<Utc>,
}

/// Outbound best-effort notification payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: String,
    pub text: String,
    pub action_link: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Union type for all AMQP messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AmqpMessage {
    ResultSubmission(ResultSubmission),
    Notification(Notification),
}
