//! Season rollover
//!
//! After a season closes, the rollover builds the next month's season: the
//! same division tiers are recreated and every member of the old season is
//! placed exactly once, moving up, down or staying according to final
//! positions. The whole procedure tolerates being re-run after a partial
//! failure; existing rows are reused and duplicate placements are ignored.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::error::{LeagueError, Result};
use crate::metrics::MetricsCollector;
use crate::rating::formula;
use crate::store::LeagueStore;
use crate::types::{
    Division, DivisionMembership, DivisionMoves, RolloverSummary, Season, SeasonStatus,
};
use crate::utils::{current_timestamp, generate_id, next_season_month, season_display_name};

/// Position given to members that never got one, sorting them last
const UNRANKED_POSITION: u32 = 99;

/// Members move in blocks of three in big divisions, two otherwise
const LARGE_DIVISION_SIZE: usize = 8;

/// One old division's members split by where they go next season
struct DivisionPartition {
    number: u32,
    promoted: Vec<DivisionMembership>,
    stayed: Vec<DivisionMembership>,
    relegated: Vec<DivisionMembership>,
}

/// Builds the next season from the latest closed one
pub struct SeasonRollover {
    store: Arc<dyn LeagueStore>,
    metrics_collector: Arc<MetricsCollector>,
}

impl SeasonRollover {
    /// Create a rollover with a default metrics collector
    pub fn new(store: Arc<dyn LeagueStore>) -> Self {
        let metrics_collector = Arc::new(MetricsCollector::new().unwrap_or_else(|_| {
            warn!("Failed to create metrics collector, using default");
            MetricsCollector::default()
        }));
        Self::with_metrics(store, metrics_collector)
    }

    /// Create a rollover with a shared metrics collector
    pub fn with_metrics(
        store: Arc<dyn LeagueStore>,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            store,
            metrics_collector,
        }
    }

    /// Create and populate the season following the latest closed one.
    ///
    /// Starts with a full ledger audit; a cached rating that disagrees with
    /// its history sum means corrupted state, and no new season is built on
    /// top of that. The rest of the procedure is safe to repeat: an already
    /// created season or division is reused and an already placed member is
    /// skipped.
    pub fn prepare_next_season(&self) -> Result<RolloverSummary> {
        let timer = self.metrics_collector.start_timer();

        self.audit_ledger()?;

        let source = self.store.latest_closed_season()?.ok_or_else(|| {
            anyhow::Error::from(LeagueError::NotFound {
                message: "no closed season to roll over from".to_string(),
            })
        })?;

        let (year, month) = next_season_month(source.year, source.month);
        let new_season = self.get_or_create_season(year, month)?;
        info!(
            "Rolling over {} into {}",
            source.display_name, new_season.display_name
        );

        let old_divisions = self.store.divisions_for_season(&source.id)?;
        let max_number = old_divisions.iter().map(|d| d.number).max().unwrap_or(0);

        let mut partitions: HashMap<u32, DivisionPartition> = HashMap::new();
        for division in &old_divisions {
            let partition = self.partition_division(division, max_number)?;
            partitions.insert(division.number, partition);
        }

        let new_divisions = self.get_or_create_divisions(&new_season, &old_divisions)?;

        // Place every member exactly once. Destination tier N receives its
        // own stayed members, the relegated from N-1 and the promoted from
        // N+1, in that order.
        let mut placed: HashSet<crate::types::PlayerId> = HashSet::new();
        let mut moves = Vec::new();
        let mut total_promoted = 0;
        let mut total_relegated = 0;

        for division in &new_divisions {
            let mut incoming: Vec<&DivisionMembership> = Vec::new();
            if let Some(own) = partitions.get(&division.number) {
                incoming.extend(own.stayed.iter());
            }
            if division.number > 1 {
                if let Some(above) = partitions.get(&(division.number - 1)) {
                    incoming.extend(above.relegated.iter());
                }
            }
            if let Some(below) = partitions.get(&(division.number + 1)) {
                incoming.extend(below.promoted.iter());
            }

            for membership in incoming {
                if !placed.insert(membership.player_id) {
                    warn!(
                        "Player {} already placed this rollover, skipping duplicate",
                        membership.player_id
                    );
                    continue;
                }
                self.store.create_membership(DivisionMembership {
                    id: generate_id(),
                    division_id: division.id,
                    player_id: membership.player_id,
                    total_points: 0,
                    total_sets_won: 0,
                    total_sets_lost: 0,
                    rating_delta: Decimal::ZERO,
                    position: None,
                    created_at: current_timestamp(),
                })?;
            }
        }

        for division in &old_divisions {
            if let Some(partition) = partitions.get(&division.number) {
                total_promoted += partition.promoted.len();
                total_relegated += partition.relegated.len();
                moves.push(DivisionMoves {
                    number: partition.number,
                    promoted: partition.promoted.len(),
                    relegated: partition.relegated.len(),
                    stayed: partition.stayed.len(),
                });
                info!(
                    "Division {}: {} up, {} down, {} stay",
                    partition.number,
                    partition.promoted.len(),
                    partition.relegated.len(),
                    partition.stayed.len()
                );
            }
        }

        let duration = timer.stop();
        self.metrics_collector
            .record_rollover(total_promoted, total_relegated, duration);
        info!(
            "Rollover complete - season: {}, players placed: {}, duration: {:.2}ms",
            new_season.display_name,
            placed.len(),
            duration.as_secs_f64() * 1000.0
        );

        Ok(RolloverSummary {
            season: new_season,
            divisions: moves,
        })
    }

    /// Verify every cached rating equals the initial rating plus the sum of
    /// that player's history deltas. A mismatch halts the rollover.
    fn audit_ledger(&self) -> Result<()> {
        for player in self.store.list_players()? {
            let expected = self.store.ledger_rating(&player.id)?;
            if player.rating != expected {
                return Err(LeagueError::InconsistentState {
                    message: format!(
                        "rating ledger mismatch for {}: cached {}, ledger {}",
                        player.display_name, player.rating, expected
                    ),
                }
                .into());
            }
        }
        Ok(())
    }

    fn get_or_create_season(&self, year: i32, month: u32) -> Result<Season> {
        if let Some(existing) = self.store.season_by_month(year, month)? {
            if existing.status == SeasonStatus::Closed {
                return Err(LeagueError::InconsistentState {
                    message: format!(
                        "season {} already exists and is closed",
                        existing.display_name
                    ),
                }
                .into());
            }
            // An interrupted rollover left the season behind; keep filling it
            return Ok(existing);
        }

        if let Some(open) = self.store.current_season()? {
            return Err(LeagueError::InconsistentState {
                message: format!(
                    "cannot start {}-{:02} while season {} is still {}",
                    year, month, open.display_name, open.status
                ),
            }
            .into());
        }

        let season = Season {
            id: generate_id(),
            year,
            month,
            display_name: season_display_name(year, month),
            status: SeasonStatus::Active,
            report_sent: false,
            created_at: current_timestamp(),
        };
        self.store.create_season(season.clone())?;
        Ok(season)
    }

    fn get_or_create_divisions(
        &self,
        season: &Season,
        old_divisions: &[Division],
    ) -> Result<Vec<Division>> {
        let existing: HashMap<u32, Division> = self
            .store
            .divisions_for_season(&season.id)?
            .into_iter()
            .map(|d| (d.number, d))
            .collect();

        let mut divisions = Vec::with_capacity(old_divisions.len());
        for old in old_divisions {
            match existing.get(&old.number) {
                Some(division) => divisions.push(division.clone()),
                None => {
                    let division = Division {
                        id: generate_id(),
                        season_id: season.id,
                        number: old.number,
                        coef: formula::default_division_coef(old.number),
                        created_at: current_timestamp(),
                    };
                    self.store.create_division(division.clone())?;
                    divisions.push(division);
                }
            }
        }
        divisions.sort_by_key(|d| d.number);
        Ok(divisions)
    }

    /// Split one old division's members into promoted, stayed and relegated.
    ///
    /// Members are ordered by final position, falling back to points and set
    /// difference for anyone left unranked. The top block is promoted only
    /// when a higher tier exists and the bottom block relegated only when a
    /// lower one does; at the edges those members simply stay, so nobody
    /// falls out of the league. When the blocks overlap in a small division,
    /// promotion wins.
    fn partition_division(
        &self,
        division: &Division,
        max_number: u32,
    ) -> Result<DivisionPartition> {
        let mut members = self.store.memberships_for_division(&division.id)?;
        members.sort_by_key(|m| {
            (
                m.position.unwrap_or(UNRANKED_POSITION),
                std::cmp::Reverse(m.total_points),
                std::cmp::Reverse(m.set_diff()),
            )
        });

        let move_count = if members.len() > LARGE_DIVISION_SIZE {
            3
        } else {
            2
        };
        let has_tier_above = division.number > 1;
        let has_tier_below = division.number < max_number;

        let promoted: Vec<DivisionMembership> = if has_tier_above {
            members.iter().take(move_count).cloned().collect()
        } else {
            Vec::new()
        };
        let promoted_ids: HashSet<_> = promoted.iter().map(|m| m.player_id).collect();

        let bottom_start = members.len().saturating_sub(move_count);
        let relegated: Vec<DivisionMembership> = if has_tier_below {
            members[bottom_start..]
                .iter()
                .filter(|m| !promoted_ids.contains(&m.player_id))
                .cloned()
                .collect()
        } else {
            Vec::new()
        };
        let relegated_ids: HashSet<_> = relegated.iter().map(|m| m.player_id).collect();

        let stayed: Vec<DivisionMembership> = members
            .into_iter()
            .filter(|m| {
                !promoted_ids.contains(&m.player_id) && !relegated_ids.contains(&m.player_id)
            })
            .collect();

        Ok(DivisionPartition {
            number: division.number,
            promoted,
            stayed,
            relegated,
        })
    }
}
