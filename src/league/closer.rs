//! Season close procedure
//!
//! Closing a season freezes play and produces final standings: every division
//! sweeps its unplayed fixtures into forfeits, ranks its members and persists
//! their final positions, then the season flips to `closed`. Every step is
//! idempotent, so a run that dies partway is simply repeated from the start on
//! the next tick.

use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use tracing::{debug, info, warn};

use crate::error::{LeagueError, Result};
use crate::league::standings::StandingsRanker;
use crate::metrics::MetricsCollector;
use crate::store::LeagueStore;
use crate::types::{ReportLine, Season, SeasonId, SeasonReport, SeasonStatus};
use crate::utils::is_last_day_of_month;

/// Runs the month-end close over the current season
pub struct SeasonCloser {
    store: Arc<dyn LeagueStore>,
    ranker: StandingsRanker,
    metrics_collector: Arc<MetricsCollector>,
}

impl SeasonCloser {
    /// Create a closer with a default metrics collector
    pub fn new(store: Arc<dyn LeagueStore>) -> Self {
        let metrics_collector = Arc::new(MetricsCollector::new().unwrap_or_else(|_| {
            warn!("Failed to create metrics collector, using default");
            MetricsCollector::default()
        }));
        Self::with_metrics(store, metrics_collector)
    }

    /// Create a closer with a shared metrics collector
    pub fn with_metrics(
        store: Arc<dyn LeagueStore>,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            store,
            ranker: StandingsRanker::new(),
            metrics_collector,
        }
    }

    /// Close the current season if the calendar says so.
    ///
    /// On the final day of the current season's month it is closed and its
    /// report returned. A season stuck in `closing` from an interrupted run
    /// is finished no matter the date, and a season whose month has already
    /// passed closes at the first opportunity. Any other day is a no-op.
    pub fn close_if_due(&self, today: NaiveDate) -> Result<Option<SeasonReport>> {
        let season = match self.store.current_season()? {
            Some(season) => season,
            None => return Ok(None),
        };

        if season.status == SeasonStatus::Closing {
            info!(
                "Finishing interrupted close of season {}",
                season.display_name
            );
            return self.close_season(&season).map(Some);
        }

        if (season.year, season.month) < (today.year(), today.month()) {
            info!("Season {} is past its month, closing late", season.display_name);
            return self.close_season(&season).map(Some);
        }

        // A season for a month that has not ended yet, like one opened by a
        // rollover earlier the same day, is never due.
        if !is_last_day_of_month(today)
            || (season.year, season.month) != (today.year(), today.month())
        {
            return Ok(None);
        }

        self.close_season(&season).map(Some)
    }

    /// Administrative "close now": close the current season no matter the
    /// date. Fails with `NotFound` when no season is open.
    pub fn close_active_season(&self) -> Result<SeasonReport> {
        let season = self.store.current_season()?.ok_or_else(|| {
            anyhow::Error::from(LeagueError::NotFound {
                message: "no season to close".to_string(),
            })
        })?;
        self.close_season(&season)
    }

    /// Run the close procedure over one season.
    ///
    /// Order matters: the season leaves `active` first so no new result can
    /// land between the forfeit sweep and the final status flip, and `closed`
    /// is only written after every position is persisted.
    pub fn close_season(&self, season: &Season) -> Result<SeasonReport> {
        let timer = self.metrics_collector.start_timer();
        info!("Closing season {}", season.display_name);

        if season.status == SeasonStatus::Active {
            self.store
                .update_season_status(&season.id, SeasonStatus::Closing)?;
        }

        let divisions = self.store.divisions_for_season(&season.id)?;
        let mut total_forfeits = 0;

        for division in &divisions {
            let swept = self.store.forfeit_pending_matches(&division.id)?;
            total_forfeits += swept;
            if swept > 0 {
                debug!(
                    "Division {}: {} unplayed fixtures forfeited",
                    division.number, swept
                );
            }

            let memberships = self.store.memberships_for_division(&division.id)?;
            let matches = self.store.matches_for_division(&division.id)?;
            let ranked = self.ranker.rank(&memberships, &matches);
            for (index, membership) in ranked.iter().enumerate() {
                self.store.set_position(&membership.id, index as u32 + 1)?;
            }
            debug!(
                "Division {}: positions persisted for {} members",
                division.number,
                ranked.len()
            );
        }

        self.store
            .update_season_status(&season.id, SeasonStatus::Closed)?;

        let duration = timer.stop();
        self.metrics_collector
            .record_season_closed(total_forfeits, duration);
        info!(
            "Season {} closed - divisions: {}, forfeits: {}, duration: {:.2}ms",
            season.display_name,
            divisions.len(),
            total_forfeits,
            duration.as_secs_f64() * 1000.0
        );

        self.build_report(&season.id)
    }

    /// Build the close report from persisted positions.
    ///
    /// Also used on its own when a report failed to deliver and the season is
    /// already closed.
    pub fn build_report(&self, season_id: &SeasonId) -> Result<SeasonReport> {
        let season = self.store.get_season(season_id)?.ok_or_else(|| {
            anyhow::Error::from(LeagueError::NotFound {
                message: format!("season {}", season_id),
            })
        })?;

        let mut lines = Vec::new();
        for division in self.store.divisions_for_season(season_id)? {
            let mut memberships = self.store.memberships_for_division(&division.id)?;
            memberships.sort_by_key(|m| m.position.unwrap_or(u32::MAX));
            for membership in memberships {
                let rank = match membership.position {
                    Some(rank) => rank,
                    None => continue,
                };
                let player = self.store.get_player(&membership.player_id)?.ok_or_else(|| {
                    anyhow::Error::from(LeagueError::InconsistentState {
                        message: format!(
                            "membership {} references missing player {}",
                            membership.id, membership.player_id
                        ),
                    })
                })?;
                lines.push(ReportLine {
                    division_number: division.number,
                    rank,
                    player_name: player.display_name,
                    points: membership.total_points,
                });
            }
        }

        Ok(SeasonReport {
            season_id: season.id,
            season_name: season.display_name,
            lines,
        })
    }
}
