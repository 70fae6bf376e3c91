//! League store interface and implementations
//!
//! This module defines the persistence contract for all league state, with an
//! in-memory implementation used in production wiring and tests. The store is
//! the sole synchronization point: the atomic result commit and the canonical
//! pair index both live behind one write lock.

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{LeagueError, Result};
use crate::rating::formula;
use crate::types::{
    Division, DivisionId, DivisionMembership, MatchId, MatchRecord, MatchStatus, MembershipId,
    Player, PlayerId, RatingHistoryEntry, Season, SeasonId, SeasonStatus,
};
use crate::utils::canonical_pair;

/// One player's side of an atomic result commit
#[derive(Debug, Clone)]
pub struct PlayerRatingUpdate {
    pub player_id: PlayerId,
    pub rating_before: Decimal,
    pub rating_delta: Decimal,
    pub rating_after: Decimal,
}

/// Aggregate increments for one membership row
#[derive(Debug, Clone)]
pub struct MembershipUpdate {
    pub player_id: PlayerId,
    pub points: u32,
    pub sets_won: u32,
    pub sets_lost: u32,
    pub rating_delta: Decimal,
}

/// Everything one accepted match result writes, committed as a single unit:
/// the played match row, both cached ratings, two ledger entries and both
/// membership aggregates.
#[derive(Debug, Clone)]
pub struct MatchResultCommit {
    pub season_id: SeasonId,
    pub match_record: MatchRecord,
    pub winner: PlayerRatingUpdate,
    pub loser: PlayerRatingUpdate,
    pub winner_membership: MembershipUpdate,
    pub loser_membership: MembershipUpdate,
}

/// Counters exposed for health and metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub players: usize,
    pub active_players: usize,
    pub seasons: usize,
    pub divisions: usize,
    pub memberships: usize,
    pub matches_pending: usize,
    pub matches_played: usize,
    pub matches_forfeited: usize,
    pub history_entries: usize,
}

/// Trait for league persistence operations
pub trait LeagueStore: Send + Sync {
    /// Insert a new player; the id must not exist yet
    fn create_player(&self, player: Player) -> Result<()>;

    /// Get a player by id
    fn get_player(&self, player_id: &PlayerId) -> Result<Option<Player>>;

    /// Overwrite a player's profile fields. Rating changes go through
    /// `commit_match_result`, never through this method.
    fn update_player(&self, player: Player) -> Result<()>;

    /// All players, unsorted
    fn list_players(&self) -> Result<Vec<Player>>;

    /// Insert a new season; (year, month) must be unique
    fn create_season(&self, season: Season) -> Result<()>;

    /// Get a season by id
    fn get_season(&self, season_id: &SeasonId) -> Result<Option<Season>>;

    /// Find a season by its (year, month) key
    fn season_by_month(&self, year: i32, month: u32) -> Result<Option<Season>>;

    /// The season currently accepting play: the latest one not yet closed
    fn current_season(&self) -> Result<Option<Season>>;

    /// The most recently closed season by (year, month)
    fn latest_closed_season(&self) -> Result<Option<Season>>;

    /// Set a season's lifecycle status
    fn update_season_status(&self, season_id: &SeasonId, status: SeasonStatus) -> Result<()>;

    /// Record that the close report was delivered
    fn mark_report_sent(&self, season_id: &SeasonId) -> Result<()>;

    /// Insert a new division; (season, number) must be unique
    fn create_division(&self, division: Division) -> Result<()>;

    /// Get a division by id
    fn get_division(&self, division_id: &DivisionId) -> Result<Option<Division>>;

    /// All divisions of a season, ordered by tier number
    fn divisions_for_season(&self, season_id: &SeasonId) -> Result<Vec<Division>>;

    /// Insert a membership. Returns false when the (division, player) pair is
    /// already assigned; duplicate assignment is tolerated, not an error.
    fn create_membership(&self, membership: DivisionMembership) -> Result<bool>;

    /// All memberships of a division in roster (insertion) order
    fn memberships_for_division(&self, division_id: &DivisionId)
        -> Result<Vec<DivisionMembership>>;

    /// A specific player's membership in a division
    fn membership_for_player(
        &self,
        division_id: &DivisionId,
        player_id: &PlayerId,
    ) -> Result<Option<DivisionMembership>>;

    /// Overwrite a membership's final position (idempotent)
    fn set_position(&self, membership_id: &MembershipId, position: u32) -> Result<()>;

    /// Insert a match row. The pair is canonicalized on insert; a row already
    /// existing for the pair fails with `AlreadyRecorded`.
    fn create_match(&self, match_record: MatchRecord) -> Result<()>;

    /// Find the single match row for an unordered pair in a division
    fn find_match(
        &self,
        division_id: &DivisionId,
        player_a: &PlayerId,
        player_b: &PlayerId,
    ) -> Result<Option<MatchRecord>>;

    /// All match rows of a division in creation order
    fn matches_for_division(&self, division_id: &DivisionId) -> Result<Vec<MatchRecord>>;

    /// Forfeit every still-pending match of a division: status `not_played`,
    /// sets forced to 0:0, submission bookkeeping cleared. Returns the number
    /// of rows swept. Played rows are never touched.
    fn forfeit_pending_matches(&self, division_id: &DivisionId) -> Result<usize>;

    /// Commit one accepted result atomically. Re-checks the canonical pair
    /// under the write lock and fails with `AlreadyRecorded` if another
    /// submission won the race.
    fn commit_match_result(&self, commit: MatchResultCommit) -> Result<MatchRecord>;

    /// A player's ledger entries in append order
    fn rating_history_for_player(&self, player_id: &PlayerId) -> Result<Vec<RatingHistoryEntry>>;

    /// The rating implied by the ledger: initial rating plus all deltas
    fn ledger_rating(&self, player_id: &PlayerId) -> Result<Decimal>;

    /// Store-wide counters
    fn stats(&self) -> Result<StoreStats>;
}

#[derive(Debug, Default)]
struct LeagueState {
    players: HashMap<PlayerId, Player>,
    seasons: HashMap<SeasonId, Season>,
    divisions: HashMap<DivisionId, Division>,
    memberships: HashMap<MembershipId, DivisionMembership>,
    /// Roster order per division
    division_rosters: HashMap<DivisionId, Vec<MembershipId>>,
    membership_index: HashMap<(DivisionId, PlayerId), MembershipId>,
    matches: HashMap<MatchId, MatchRecord>,
    division_matches: HashMap<DivisionId, Vec<MatchId>>,
    /// Unique index on the canonical pair per division
    match_pairs: HashMap<(DivisionId, PlayerId, PlayerId), MatchId>,
    rating_history: Vec<RatingHistoryEntry>,
}

/// In-memory league store implementation
#[derive(Debug, Default)]
pub struct InMemoryLeagueStore {
    state: RwLock<LeagueState>,
}

impl InMemoryLeagueStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn state_read(&self) -> Result<RwLockReadGuard<'_, LeagueState>> {
        self.state.read().map_err(|_| {
            anyhow::Error::from(LeagueError::StoreUnavailable {
                message: "Failed to acquire league state read lock".to_string(),
            })
        })
    }

    fn state_write(&self) -> Result<RwLockWriteGuard<'_, LeagueState>> {
        self.state.write().map_err(|_| {
            anyhow::Error::from(LeagueError::StoreUnavailable {
                message: "Failed to acquire league state write lock".to_string(),
            })
        })
    }

    /// Force a match record into canonical pair order, swapping sets with the
    /// players when needed.
    fn canonicalize(mut record: MatchRecord) -> MatchRecord {
        let (low, high) = canonical_pair(record.player_a, record.player_b);
        if record.player_a != low {
            record.player_a = low;
            record.player_b = high;
            std::mem::swap(&mut record.sets_a, &mut record.sets_b);
        }
        record
    }
}

impl LeagueStore for InMemoryLeagueStore {
    fn create_player(&self, player: Player) -> Result<()> {
        let mut state = self.state_write()?;
        if state.players.contains_key(&player.id) {
            return Err(LeagueError::InconsistentState {
                message: format!("player {} already exists", player.id),
            }
            .into());
        }
        state.players.insert(player.id, player);
        Ok(())
    }

    fn get_player(&self, player_id: &PlayerId) -> Result<Option<Player>> {
        let state = self.state_read()?;
        Ok(state.players.get(player_id).cloned())
    }

    fn update_player(&self, player: Player) -> Result<()> {
        let mut state = self.state_write()?;
        if !state.players.contains_key(&player.id) {
            return Err(LeagueError::NotFound {
                message: format!("player {}", player.id),
            }
            .into());
        }
        state.players.insert(player.id, player);
        Ok(())
    }

    fn list_players(&self) -> Result<Vec<Player>> {
        let state = self.state_read()?;
        Ok(state.players.values().cloned().collect())
    }

    fn create_season(&self, season: Season) -> Result<()> {
        let mut state = self.state_write()?;
        if state
            .seasons
            .values()
            .any(|s| s.year == season.year && s.month == season.month)
        {
            return Err(LeagueError::InconsistentState {
                message: format!("season {}-{:02} already exists", season.year, season.month),
            }
            .into());
        }
        state.seasons.insert(season.id, season);
        Ok(())
    }

    fn get_season(&self, season_id: &SeasonId) -> Result<Option<Season>> {
        let state = self.state_read()?;
        Ok(state.seasons.get(season_id).cloned())
    }

    fn season_by_month(&self, year: i32, month: u32) -> Result<Option<Season>> {
        let state = self.state_read()?;
        Ok(state
            .seasons
            .values()
            .find(|s| s.year == year && s.month == month)
            .cloned())
    }

    fn current_season(&self) -> Result<Option<Season>> {
        let state = self.state_read()?;
        Ok(state
            .seasons
            .values()
            .filter(|s| s.status != SeasonStatus::Closed)
            .max_by_key(|s| (s.year, s.month))
            .cloned())
    }

    fn latest_closed_season(&self) -> Result<Option<Season>> {
        let state = self.state_read()?;
        Ok(state
            .seasons
            .values()
            .filter(|s| s.status == SeasonStatus::Closed)
            .max_by_key(|s| (s.year, s.month))
            .cloned())
    }

    fn update_season_status(&self, season_id: &SeasonId, status: SeasonStatus) -> Result<()> {
        let mut state = self.state_write()?;
        match state.seasons.get_mut(season_id) {
            Some(season) => {
                season.status = status;
                Ok(())
            }
            None => Err(LeagueError::NotFound {
                message: format!("season {}", season_id),
            }
            .into()),
        }
    }

    fn mark_report_sent(&self, season_id: &SeasonId) -> Result<()> {
        let mut state = self.state_write()?;
        match state.seasons.get_mut(season_id) {
            Some(season) => {
                season.report_sent = true;
                Ok(())
            }
            None => Err(LeagueError::NotFound {
                message: format!("season {}", season_id),
            }
            .into()),
        }
    }

    fn create_division(&self, division: Division) -> Result<()> {
        let mut state = self.state_write()?;
        if !state.seasons.contains_key(&division.season_id) {
            return Err(LeagueError::NotFound {
                message: format!("season {}", division.season_id),
            }
            .into());
        }
        if state
            .divisions
            .values()
            .any(|d| d.season_id == division.season_id && d.number == division.number)
        {
            return Err(LeagueError::InconsistentState {
                message: format!(
                    "division {} already exists in season {}",
                    division.number, division.season_id
                ),
            }
            .into());
        }
        state.division_rosters.entry(division.id).or_default();
        state.division_matches.entry(division.id).or_default();
        state.divisions.insert(division.id, division);
        Ok(())
    }

    fn get_division(&self, division_id: &DivisionId) -> Result<Option<Division>> {
        let state = self.state_read()?;
        Ok(state.divisions.get(division_id).cloned())
    }

    fn divisions_for_season(&self, season_id: &SeasonId) -> Result<Vec<Division>> {
        let state = self.state_read()?;
        let mut divisions: Vec<Division> = state
            .divisions
            .values()
            .filter(|d| d.season_id == *season_id)
            .cloned()
            .collect();
        divisions.sort_by_key(|d| d.number);
        Ok(divisions)
    }

    fn create_membership(&self, membership: DivisionMembership) -> Result<bool> {
        let mut state = self.state_write()?;
        if !state.divisions.contains_key(&membership.division_id) {
            return Err(LeagueError::NotFound {
                message: format!("division {}", membership.division_id),
            }
            .into());
        }
        if !state.players.contains_key(&membership.player_id) {
            return Err(LeagueError::NotFound {
                message: format!("player {}", membership.player_id),
            }
            .into());
        }
        let key = (membership.division_id, membership.player_id);
        if state.membership_index.contains_key(&key) {
            return Ok(false);
        }
        state.membership_index.insert(key, membership.id);
        state
            .division_rosters
            .entry(membership.division_id)
            .or_default()
            .push(membership.id);
        state.memberships.insert(membership.id, membership);
        Ok(true)
    }

    fn memberships_for_division(
        &self,
        division_id: &DivisionId,
    ) -> Result<Vec<DivisionMembership>> {
        let state = self.state_read()?;
        let roster = match state.division_rosters.get(division_id) {
            Some(roster) => roster,
            None => return Ok(Vec::new()),
        };
        Ok(roster
            .iter()
            .filter_map(|id| state.memberships.get(id).cloned())
            .collect())
    }

    fn membership_for_player(
        &self,
        division_id: &DivisionId,
        player_id: &PlayerId,
    ) -> Result<Option<DivisionMembership>> {
        let state = self.state_read()?;
        Ok(state
            .membership_index
            .get(&(*division_id, *player_id))
            .and_then(|id| state.memberships.get(id))
            .cloned())
    }

    fn set_position(&self, membership_id: &MembershipId, position: u32) -> Result<()> {
        let mut state = self.state_write()?;
        match state.memberships.get_mut(membership_id) {
            Some(membership) => {
                membership.position = Some(position);
                Ok(())
            }
            None => Err(LeagueError::NotFound {
                message: format!("membership {}", membership_id),
            }
            .into()),
        }
    }

    fn create_match(&self, match_record: MatchRecord) -> Result<()> {
        let record = Self::canonicalize(match_record);
        let mut state = self.state_write()?;
        if !state.divisions.contains_key(&record.division_id) {
            return Err(LeagueError::NotFound {
                message: format!("division {}", record.division_id),
            }
            .into());
        }
        let key = (record.division_id, record.player_a, record.player_b);
        if state.match_pairs.contains_key(&key) {
            return Err(LeagueError::AlreadyRecorded {
                message: "a match for this pair already exists in the division".to_string(),
            }
            .into());
        }
        state.match_pairs.insert(key, record.id);
        state
            .division_matches
            .entry(record.division_id)
            .or_default()
            .push(record.id);
        state.matches.insert(record.id, record);
        Ok(())
    }

    fn find_match(
        &self,
        division_id: &DivisionId,
        player_a: &PlayerId,
        player_b: &PlayerId,
    ) -> Result<Option<MatchRecord>> {
        let (low, high) = canonical_pair(*player_a, *player_b);
        let state = self.state_read()?;
        Ok(state
            .match_pairs
            .get(&(*division_id, low, high))
            .and_then(|id| state.matches.get(id))
            .cloned())
    }

    fn matches_for_division(&self, division_id: &DivisionId) -> Result<Vec<MatchRecord>> {
        let state = self.state_read()?;
        let ids = match state.division_matches.get(division_id) {
            Some(ids) => ids,
            None => return Ok(Vec::new()),
        };
        Ok(ids
            .iter()
            .filter_map(|id| state.matches.get(id).cloned())
            .collect())
    }

    fn forfeit_pending_matches(&self, division_id: &DivisionId) -> Result<usize> {
        let mut state = self.state_write()?;
        let ids = state
            .division_matches
            .get(division_id)
            .cloned()
            .unwrap_or_default();
        let mut swept = 0;
        for id in ids {
            if let Some(record) = state.matches.get_mut(&id) {
                if record.status == MatchStatus::Pending {
                    record.status = MatchStatus::NotPlayed;
                    record.sets_a = 0;
                    record.sets_b = 0;
                    record.submitted_by = None;
                    record.played_at = None;
                    swept += 1;
                }
            }
        }
        Ok(swept)
    }

    fn commit_match_result(&self, commit: MatchResultCommit) -> Result<MatchRecord> {
        let record = Self::canonicalize(commit.match_record);
        let mut state = self.state_write()?;

        // Optimistic uniqueness check on the canonical pair, done again under
        // the write lock: the loser of a submission race fails here.
        let key = (record.division_id, record.player_a, record.player_b);
        let existing_id = state.match_pairs.get(&key).copied();
        if let Some(id) = existing_id {
            if let Some(existing) = state.matches.get(&id) {
                if existing.status == MatchStatus::Played {
                    return Err(LeagueError::AlreadyRecorded {
                        message: "this match has already been recorded".to_string(),
                    }
                    .into());
                }
            }
        }

        // Validate every row the commit touches before mutating anything, so
        // the batch is all-or-nothing.
        for update in [&commit.winner, &commit.loser] {
            if !state.players.contains_key(&update.player_id) {
                return Err(LeagueError::NotFound {
                    message: format!("player {}", update.player_id),
                }
                .into());
            }
        }
        let mut membership_ids = Vec::with_capacity(2);
        for update in [&commit.winner_membership, &commit.loser_membership] {
            match state
                .membership_index
                .get(&(record.division_id, update.player_id))
            {
                Some(id) => membership_ids.push(*id),
                None => {
                    return Err(LeagueError::NotFound {
                        message: format!(
                            "membership for player {} in division {}",
                            update.player_id, record.division_id
                        ),
                    }
                    .into());
                }
            }
        }

        // Upsert the match row, keeping the identity of a pre-existing
        // pending fixture.
        let final_record = match existing_id {
            Some(id) => {
                let slot = state.matches.get_mut(&id).ok_or_else(|| {
                    anyhow::Error::from(LeagueError::InconsistentState {
                        message: format!("pair index references missing match {}", id),
                    })
                })?;
                slot.sets_a = record.sets_a;
                slot.sets_b = record.sets_b;
                slot.status = MatchStatus::Played;
                slot.submitted_by = record.submitted_by;
                slot.played_at = record.played_at;
                slot.clone()
            }
            None => {
                let mut fresh = record.clone();
                fresh.status = MatchStatus::Played;
                state.match_pairs.insert(key, fresh.id);
                state
                    .division_matches
                    .entry(fresh.division_id)
                    .or_default()
                    .push(fresh.id);
                state.matches.insert(fresh.id, fresh.clone());
                fresh
            }
        };

        // Cached ratings plus the two ledger rows, winner first
        let now = final_record.played_at.unwrap_or_else(crate::utils::current_timestamp);
        for update in [&commit.winner, &commit.loser] {
            if let Some(player) = state.players.get_mut(&update.player_id) {
                player.rating = update.rating_after;
            }
            state.rating_history.push(RatingHistoryEntry {
                id: crate::utils::generate_id(),
                player_id: update.player_id,
                match_id: final_record.id,
                season_id: commit.season_id,
                rating_before: update.rating_before,
                rating_delta: update.rating_delta,
                rating_after: update.rating_after,
                created_at: now,
            });
        }

        // Membership aggregates
        for (membership_id, update) in membership_ids
            .iter()
            .zip([&commit.winner_membership, &commit.loser_membership])
        {
            if let Some(membership) = state.memberships.get_mut(membership_id) {
                membership.total_points += update.points;
                membership.total_sets_won += update.sets_won;
                membership.total_sets_lost += update.sets_lost;
                membership.rating_delta =
                    (membership.rating_delta + update.rating_delta).round_dp(2);
            }
        }

        Ok(final_record)
    }

    fn rating_history_for_player(&self, player_id: &PlayerId) -> Result<Vec<RatingHistoryEntry>> {
        let state = self.state_read()?;
        Ok(state
            .rating_history
            .iter()
            .filter(|entry| entry.player_id == *player_id)
            .cloned()
            .collect())
    }

    fn ledger_rating(&self, player_id: &PlayerId) -> Result<Decimal> {
        let state = self.state_read()?;
        let sum: Decimal = state
            .rating_history
            .iter()
            .filter(|entry| entry.player_id == *player_id)
            .map(|entry| entry.rating_delta)
            .sum();
        Ok(formula::initial_rating() + sum)
    }

    fn stats(&self) -> Result<StoreStats> {
        let state = self.state_read()?;
        let mut stats = StoreStats {
            players: state.players.len(),
            active_players: state.players.values().filter(|p| p.is_active).count(),
            seasons: state.seasons.len(),
            divisions: state.divisions.len(),
            memberships: state.memberships.len(),
            history_entries: state.rating_history.len(),
            ..StoreStats::default()
        };
        for record in state.matches.values() {
            match record.status {
                MatchStatus::Pending => stats.matches_pending += 1,
                MatchStatus::Played => stats.matches_played += 1,
                MatchStatus::NotPlayed => stats.matches_forfeited += 1,
            }
        }
        Ok(stats)
    }
}

/// Mock league store for testing: delegates to an in-memory store and can be
/// told to fail specific operations.
#[derive(Debug, Default)]
pub struct MockLeagueStore {
    inner: InMemoryLeagueStore,
    fail_ops: RwLock<HashSet<&'static str>>,
    calls: RwLock<Vec<&'static str>>,
}

impl MockLeagueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the named operation fail with `StoreUnavailable` until cleared
    pub fn fail_on(&self, op: &'static str) {
        if let Ok(mut ops) = self.fail_ops.write() {
            ops.insert(op);
        }
    }

    /// Clear all injected failures
    pub fn clear_failures(&self) {
        if let Ok(mut ops) = self.fail_ops.write() {
            ops.clear();
        }
    }

    /// Operation names invoked so far (for testing)
    pub fn recorded_calls(&self) -> Vec<&'static str> {
        self.calls
            .read()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    fn gate(&self, op: &'static str) -> Result<()> {
        if let Ok(mut calls) = self.calls.write() {
            calls.push(op);
        }
        let should_fail = self
            .fail_ops
            .read()
            .map(|ops| ops.contains(op))
            .unwrap_or(false);
        if should_fail {
            return Err(LeagueError::StoreUnavailable {
                message: format!("injected failure in {}", op),
            }
            .into());
        }
        Ok(())
    }
}

impl LeagueStore for MockLeagueStore {
    fn create_player(&self, player: Player) -> Result<()> {
        self.gate("create_player")?;
        self.inner.create_player(player)
    }

    fn get_player(&self, player_id: &PlayerId) -> Result<Option<Player>> {
        self.gate("get_player")?;
        self.inner.get_player(player_id)
    }

    fn update_player(&self, player: Player) -> Result<()> {
        self.gate("update_player")?;
        self.inner.update_player(player)
    }

    fn list_players(&self) -> Result<Vec<Player>> {
        self.gate("list_players")?;
        self.inner.list_players()
    }

    fn create_season(&self, season: Season) -> Result<()> {
        self.gate("create_season")?;
        self.inner.create_season(season)
    }

    fn get_season(&self, season_id: &SeasonId) -> Result<Option<Season>> {
        self.gate("get_season")?;
        self.inner.get_season(season_id)
    }

    fn season_by_month(&self, year: i32, month: u32) -> Result<Option<Season>> {
        self.gate("season_by_month")?;
        self.inner.season_by_month(year, month)
    }

    fn current_season(&self) -> Result<Option<Season>> {
        self.gate("current_season")?;
        self.inner.current_season()
    }

    fn latest_closed_season(&self) -> Result<Option<Season>> {
        self.gate("latest_closed_season")?;
        self.inner.latest_closed_season()
    }

    fn update_season_status(&self, season_id: &SeasonId, status: SeasonStatus) -> Result<()> {
        self.gate("update_season_status")?;
        self.inner.update_season_status(season_id, status)
    }

    fn mark_report_sent(&self, season_id: &SeasonId) -> Result<()> {
        self.gate("mark_report_sent")?;
        self.inner.mark_report_sent(season_id)
    }

    fn create_division(&self, division: Division) -> Result<()> {
        self.gate("create_division")?;
        self.inner.create_division(division)
    }

    fn get_division(&self, division_id: &DivisionId) -> Result<Option<Division>> {
        self.gate("get_division")?;
        self.inner.get_division(division_id)
    }

    fn divisions_for_season(&self, season_id: &SeasonId) -> Result<Vec<Division>> {
        self.gate("divisions_for_season")?;
        self.inner.divisions_for_season(season_id)
    }

    fn create_membership(&self, membership: DivisionMembership) -> Result<bool> {
        self.gate("create_membership")?;
        self.inner.create_membership(membership)
    }

    fn memberships_for_division(
        &self,
        division_id: &DivisionId,
    ) -> Result<Vec<DivisionMembership>> {
        self.gate("memberships_for_division")?;
        self.inner.memberships_for_division(division_id)
    }

    fn membership_for_player(
        &self,
        division_id: &DivisionId,
        player_id: &PlayerId,
    ) -> Result<Option<DivisionMembership>> {
        self.gate("membership_for_player")?;
        self.inner.membership_for_player(division_id, player_id)
    }

    fn set_position(&self, membership_id: &MembershipId, position: u32) -> Result<()> {
        self.gate("set_position")?;
        self.inner.set_position(membership_id, position)
    }

    fn create_match(&self, match_record: MatchRecord) -> Result<()> {
        self.gate("create_match")?;
        self.inner.create_match(match_record)
    }

    fn find_match(
        &self,
        division_id: &DivisionId,
        player_a: &PlayerId,
        player_b: &PlayerId,
    ) -> Result<Option<MatchRecord>> {
        self.gate("find_match")?;
        self.inner.find_match(division_id, player_a, player_b)
    }

    fn matches_for_division(&self, division_id: &DivisionId) -> Result<Vec<MatchRecord>> {
        self.gate("matches_for_division")?;
        self.inner.matches_for_division(division_id)
    }

    fn forfeit_pending_matches(&self, division_id: &DivisionId) -> Result<usize> {
        self.gate("forfeit_pending_matches")?;
        self.inner.forfeit_pending_matches(division_id)
    }

    fn commit_match_result(&self, commit: MatchResultCommit) -> Result<MatchRecord> {
        self.gate("commit_match_result")?;
        self.inner.commit_match_result(commit)
    }

    fn rating_history_for_player(&self, player_id: &PlayerId) -> Result<Vec<RatingHistoryEntry>> {
        self.gate("rating_history_for_player")?;
        self.inner.rating_history_for_player(player_id)
    }

    fn ledger_rating(&self, player_id: &PlayerId) -> Result<Decimal> {
        self.gate("ledger_rating")?;
        self.inner.ledger_rating(player_id)
    }

    fn stats(&self) -> Result<StoreStats> {
        self.gate("stats")?;
        self.inner.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{current_timestamp, generate_id};

    fn test_player(name: &str) -> Player {
        Player {
            id: generate_id(),
            display_name: name.to_string(),
            contact_handle: format!("@{}", name),
            rating: formula::initial_rating(),
            is_admin: false,
            is_active: true,
            created_at: current_timestamp(),
        }
    }

    fn test_season(year: i32, month: u32) -> Season {
        Season {
            id: generate_id(),
            year,
            month,
            display_name: crate::utils::season_display_name(year, month),
            status: SeasonStatus::Active,
            report_sent: false,
            created_at: current_timestamp(),
        }
    }

    fn test_division(season_id: SeasonId, number: u32) -> Division {
        Division {
            id: generate_id(),
            season_id,
            number,
            coef: formula::default_division_coef(number),
            created_at: current_timestamp(),
        }
    }

    fn test_membership(division_id: DivisionId, player_id: PlayerId) -> DivisionMembership {
        DivisionMembership {
            id: generate_id(),
            division_id,
            player_id,
            total_points: 0,
            total_sets_won: 0,
            total_sets_lost: 0,
            rating_delta: Decimal::ZERO,
            position: None,
            created_at: current_timestamp(),
        }
    }

    /// Store with one active season, one division and two assigned players
    fn seeded_store() -> (InMemoryLeagueStore, DivisionId, Player, Player) {
        let store = InMemoryLeagueStore::new();
        let season = test_season(2026, 8);
        let season_id = season.id;
        store.create_season(season).unwrap();
        let division = test_division(season_id, 1);
        let division_id = division.id;
        store.create_division(division).unwrap();

        let alice = test_player("alice");
        let bob = test_player("bob");
        store.create_player(alice.clone()).unwrap();
        store.create_player(bob.clone()).unwrap();
        store
            .create_membership(test_membership(division_id, alice.id))
            .unwrap();
        store
            .create_membership(test_membership(division_id, bob.id))
            .unwrap();

        (store, division_id, alice, bob)
    }

    fn commit_for(
        store: &InMemoryLeagueStore,
        division_id: DivisionId,
        winner: &Player,
        loser: &Player,
        sets_winner: u32,
        sets_loser: u32,
    ) -> MatchResultCommit {
        let division = store.get_division(&division_id).unwrap().unwrap();
        let season_id = division.season_id;
        let winner_rating = store.get_player(&winner.id).unwrap().unwrap().rating;
        let loser_rating = store.get_player(&loser.id).unwrap().unwrap().rating;
        let delta = formula::match_deltas(
            winner_rating,
            loser_rating,
            sets_winner,
            sets_loser,
            division.coef,
        );
        MatchResultCommit {
            season_id,
            match_record: MatchRecord {
                id: generate_id(),
                division_id,
                player_a: winner.id,
                player_b: loser.id,
                sets_a: sets_winner,
                sets_b: sets_loser,
                status: MatchStatus::Played,
                submitted_by: Some(winner.id),
                played_at: Some(current_timestamp()),
                created_at: current_timestamp(),
            },
            winner: PlayerRatingUpdate {
                player_id: winner.id,
                rating_before: winner_rating,
                rating_delta: delta.winner,
                rating_after: (winner_rating + delta.winner).round_dp(2),
            },
            loser: PlayerRatingUpdate {
                player_id: loser.id,
                rating_before: loser_rating,
                rating_delta: delta.loser,
                rating_after: (loser_rating + delta.loser).round_dp(2),
            },
            winner_membership: MembershipUpdate {
                player_id: winner.id,
                points: 2,
                sets_won: sets_winner,
                sets_lost: sets_loser,
                rating_delta: delta.winner,
            },
            loser_membership: MembershipUpdate {
                player_id: loser.id,
                points: 1,
                sets_won: sets_loser,
                sets_lost: sets_winner,
                rating_delta: delta.loser,
            },
        }
    }

    #[test]
    fn test_player_crud() {
        let store = InMemoryLeagueStore::new();
        let player = test_player("alice");
        let id = player.id;

        assert!(store.get_player(&id).unwrap().is_none());
        store.create_player(player.clone()).unwrap();
        assert_eq!(store.get_player(&id).unwrap().unwrap().display_name, "alice");

        // Duplicate id is refused
        assert!(store.create_player(player.clone()).is_err());

        let mut deactivated = player;
        deactivated.is_active = false;
        store.update_player(deactivated).unwrap();
        assert!(!store.get_player(&id).unwrap().unwrap().is_active);
    }

    #[test]
    fn test_season_month_uniqueness() {
        let store = InMemoryLeagueStore::new();
        store.create_season(test_season(2026, 8)).unwrap();
        let err = store.create_season(test_season(2026, 8)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LeagueError>(),
            Some(LeagueError::InconsistentState { .. })
        ));
        // A different month is fine
        store.create_season(test_season(2026, 9)).unwrap();
    }

    #[test]
    fn test_current_and_latest_closed_season() {
        let store = InMemoryLeagueStore::new();
        let mut july = test_season(2026, 7);
        july.status = SeasonStatus::Closed;
        let july_id = july.id;
        store.create_season(july).unwrap();
        let august = test_season(2026, 8);
        let august_id = august.id;
        store.create_season(august).unwrap();

        assert_eq!(store.current_season().unwrap().unwrap().id, august_id);
        assert_eq!(store.latest_closed_season().unwrap().unwrap().id, july_id);

        store
            .update_season_status(&august_id, SeasonStatus::Closed)
            .unwrap();
        assert!(store.current_season().unwrap().is_none());
        assert_eq!(store.latest_closed_season().unwrap().unwrap().id, august_id);
    }

    #[test]
    fn test_division_number_uniqueness() {
        let store = InMemoryLeagueStore::new();
        let season = test_season(2026, 8);
        let season_id = season.id;
        store.create_season(season).unwrap();

        store.create_division(test_division(season_id, 1)).unwrap();
        assert!(store.create_division(test_division(season_id, 1)).is_err());
        store.create_division(test_division(season_id, 2)).unwrap();

        let numbers: Vec<u32> = store
            .divisions_for_season(&season_id)
            .unwrap()
            .iter()
            .map(|d| d.number)
            .collect();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[test]
    fn test_membership_duplicate_is_tolerated() {
        let (store, division_id, alice, _) = seeded_store();
        let inserted = store
            .create_membership(test_membership(division_id, alice.id))
            .unwrap();
        assert!(!inserted);
        assert_eq!(store.memberships_for_division(&division_id).unwrap().len(), 2);
    }

    #[test]
    fn test_roster_preserves_insertion_order() {
        let store = InMemoryLeagueStore::new();
        let season = test_season(2026, 8);
        let season_id = season.id;
        store.create_season(season).unwrap();
        let division = test_division(season_id, 1);
        let division_id = division.id;
        store.create_division(division).unwrap();

        let mut expected = Vec::new();
        for name in ["p1", "p2", "p3", "p4"] {
            let player = test_player(name);
            expected.push(player.id);
            store.create_player(player.clone()).unwrap();
            store
                .create_membership(test_membership(division_id, player.id))
                .unwrap();
        }
        let roster: Vec<PlayerId> = store
            .memberships_for_division(&division_id)
            .unwrap()
            .iter()
            .map(|m| m.player_id)
            .collect();
        assert_eq!(roster, expected);
    }

    #[test]
    fn test_match_pair_is_canonical_and_unique() {
        let (store, division_id, alice, bob) = seeded_store();
        let record = MatchRecord {
            id: generate_id(),
            division_id,
            player_a: bob.id,
            player_b: alice.id,
            sets_a: 0,
            sets_b: 0,
            status: MatchStatus::Pending,
            submitted_by: None,
            played_at: None,
            created_at: current_timestamp(),
        };
        store.create_match(record).unwrap();

        // Lookup succeeds in both orders
        let found = store.find_match(&division_id, &alice.id, &bob.id).unwrap();
        assert!(found.is_some());
        let found = store.find_match(&division_id, &bob.id, &alice.id).unwrap();
        let found = found.unwrap();
        assert!(found.player_a <= found.player_b);

        // Second row for the same pair is refused, in either order
        let duplicate = MatchRecord {
            id: generate_id(),
            division_id,
            player_a: alice.id,
            player_b: bob.id,
            sets_a: 0,
            sets_b: 0,
            status: MatchStatus::Pending,
            submitted_by: None,
            played_at: None,
            created_at: current_timestamp(),
        };
        let err = store.create_match(duplicate).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LeagueError>(),
            Some(LeagueError::AlreadyRecorded { .. })
        ));
    }

    #[test]
    fn test_commit_applies_all_writes() {
        let (store, division_id, alice, bob) = seeded_store();
        let commit = commit_for(&store, division_id, &alice, &bob, 3, 0);
        let record = store.commit_match_result(commit).unwrap();

        assert_eq!(record.status, MatchStatus::Played);
        assert_eq!(record.winner(), Some(alice.id));

        // Ratings moved by the reference deltas for equal 100-rated players
        let alice_after = store.get_player(&alice.id).unwrap().unwrap().rating;
        let bob_after = store.get_player(&bob.id).unwrap().unwrap().rating;
        assert_eq!(alice_after, Decimal::new(10360, 2));
        assert_eq!(bob_after, Decimal::new(9820, 2));

        // Two ledger rows, winner first
        let history = store.rating_history_for_player(&alice.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].rating_before, Decimal::from(100));
        assert_eq!(history[0].rating_after, alice_after);
        assert_eq!(store.rating_history_for_player(&bob.id).unwrap().len(), 1);

        // Ledger matches the cached rating
        assert_eq!(store.ledger_rating(&alice.id).unwrap(), alice_after);
        assert_eq!(store.ledger_rating(&bob.id).unwrap(), bob_after);

        // Membership aggregates booked for both sides
        let alice_m = store
            .membership_for_player(&division_id, &alice.id)
            .unwrap()
            .unwrap();
        assert_eq!(alice_m.total_points, 2);
        assert_eq!(alice_m.total_sets_won, 3);
        assert_eq!(alice_m.total_sets_lost, 0);
        let bob_m = store
            .membership_for_player(&division_id, &bob.id)
            .unwrap()
            .unwrap();
        assert_eq!(bob_m.total_points, 1);
        assert_eq!(bob_m.total_sets_won, 0);
        assert_eq!(bob_m.total_sets_lost, 3);
    }

    #[test]
    fn test_commit_duplicate_pair_rejected() {
        let (store, division_id, alice, bob) = seeded_store();
        let commit = commit_for(&store, division_id, &alice, &bob, 3, 1);
        store.commit_match_result(commit).unwrap();

        // Same pair in reverse order loses the uniqueness check
        let second = commit_for(&store, division_id, &bob, &alice, 3, 2);
        let err = store.commit_match_result(second).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LeagueError>(),
            Some(LeagueError::AlreadyRecorded { .. })
        ));

        // Nothing further was booked
        let alice_m = store
            .membership_for_player(&division_id, &alice.id)
            .unwrap()
            .unwrap();
        assert_eq!(alice_m.total_points, 2);
        assert_eq!(store.rating_history_for_player(&bob.id).unwrap().len(), 1);
    }

    #[test]
    fn test_commit_reuses_pending_fixture_row() {
        let (store, division_id, alice, bob) = seeded_store();
        let fixture_id = generate_id();
        store
            .create_match(MatchRecord {
                id: fixture_id,
                division_id,
                player_a: alice.id,
                player_b: bob.id,
                sets_a: 0,
                sets_b: 0,
                status: MatchStatus::Pending,
                submitted_by: None,
                played_at: None,
                created_at: current_timestamp(),
            })
            .unwrap();

        let commit = commit_for(&store, division_id, &alice, &bob, 3, 2);
        let record = store.commit_match_result(commit).unwrap();
        assert_eq!(record.id, fixture_id);
        assert_eq!(record.status, MatchStatus::Played);
        assert_eq!(store.matches_for_division(&division_id).unwrap().len(), 1);
    }

    #[test]
    fn test_forfeit_sweep_only_touches_pending() {
        let (store, division_id, alice, bob) = seeded_store();
        let carol = test_player("carol");
        store.create_player(carol.clone()).unwrap();
        store
            .create_membership(test_membership(division_id, carol.id))
            .unwrap();

        // One played match, one pending fixture
        let commit = commit_for(&store, division_id, &alice, &bob, 3, 0);
        store.commit_match_result(commit).unwrap();
        store
            .create_match(MatchRecord {
                id: generate_id(),
                division_id,
                player_a: alice.id,
                player_b: carol.id,
                sets_a: 0,
                sets_b: 0,
                status: MatchStatus::Pending,
                submitted_by: None,
                played_at: None,
                created_at: current_timestamp(),
            })
            .unwrap();

        let swept = store.forfeit_pending_matches(&division_id).unwrap();
        assert_eq!(swept, 1);

        let matches = store.matches_for_division(&division_id).unwrap();
        let played = matches
            .iter()
            .find(|m| m.status == MatchStatus::Played)
            .unwrap();
        assert_eq!(played.sets_a.max(played.sets_b), 3);
        let forfeited = matches
            .iter()
            .find(|m| m.status == MatchStatus::NotPlayed)
            .unwrap();
        assert_eq!((forfeited.sets_a, forfeited.sets_b), (0, 0));
        assert!(forfeited.submitted_by.is_none());

        // Second sweep finds nothing
        assert_eq!(store.forfeit_pending_matches(&division_id).unwrap(), 0);
    }

    #[test]
    fn test_stats_counts() {
        let (store, division_id, alice, bob) = seeded_store();
        let commit = commit_for(&store, division_id, &alice, &bob, 3, 1);
        store.commit_match_result(commit).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.players, 2);
        assert_eq!(stats.active_players, 2);
        assert_eq!(stats.seasons, 1);
        assert_eq!(stats.divisions, 1);
        assert_eq!(stats.memberships, 2);
        assert_eq!(stats.matches_played, 1);
        assert_eq!(stats.matches_pending, 0);
        assert_eq!(stats.history_entries, 2);
    }

    #[test]
    fn test_mock_store_failure_injection() {
        let mock = MockLeagueStore::new();
        let player = test_player("alice");
        mock.create_player(player.clone()).unwrap();

        mock.fail_on("get_player");
        let err = mock.get_player(&player.id).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LeagueError>(),
            Some(LeagueError::StoreUnavailable { .. })
        ));

        mock.clear_failures();
        assert!(mock.get_player(&player.id).unwrap().is_some());
        assert!(mock.recorded_calls().contains(&"create_player"));
    }
}
