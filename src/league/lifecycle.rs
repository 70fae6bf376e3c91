//! Daily season lifecycle orchestration
//!
//! One `daily_tick` per day drives the whole month boundary: close the season
//! on its final day, send the standings report to the admins, open the next
//! season, and announce it. Notification failures never derail the cycle;
//! undelivered close reports are retried on later ticks through the season's
//! `report_sent` marker.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::amqp::Notifier;
use crate::error::{LeagueError, Result};
use crate::league::closer::SeasonCloser;
use crate::league::rollover::SeasonRollover;
use crate::metrics::MetricsCollector;
use crate::store::LeagueStore;
use crate::types::{Notification, Player, RolloverSummary, SeasonId, SeasonReport};
use crate::utils::current_timestamp;

/// What a single daily tick did
#[derive(Debug, Clone)]
pub enum TickOutcome {
    /// Nothing was due
    Idle,
    /// The current season closed and the next one was opened
    SeasonRolled {
        report: SeasonReport,
        rollover: RolloverSummary,
    },
    /// A close had finished earlier without its rollover; the rollover ran now
    RolloverResumed(RolloverSummary),
    /// A previously undelivered close report went out
    ReportRetried(SeasonId),
}

/// Chains close, notification and rollover across the month boundary
pub struct SeasonLifecycle {
    store: Arc<dyn LeagueStore>,
    closer: SeasonCloser,
    rollover: SeasonRollover,
    notifier: Arc<dyn Notifier>,
    metrics_collector: Arc<MetricsCollector>,
}

impl SeasonLifecycle {
    /// Create a lifecycle with a default metrics collector
    pub fn new(store: Arc<dyn LeagueStore>, notifier: Arc<dyn Notifier>) -> Self {
        let metrics_collector = Arc::new(MetricsCollector::new().unwrap_or_else(|_| {
            warn!("Failed to create metrics collector, using default");
            MetricsCollector::default()
        }));
        Self::with_metrics(store, notifier, metrics_collector)
    }

    /// Create a lifecycle with a shared metrics collector
    pub fn with_metrics(
        store: Arc<dyn LeagueStore>,
        notifier: Arc<dyn Notifier>,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            closer: SeasonCloser::with_metrics(store.clone(), metrics_collector.clone()),
            rollover: SeasonRollover::with_metrics(store.clone(), metrics_collector.clone()),
            store,
            notifier,
            metrics_collector,
        }
    }

    /// Run one lifecycle tick for the given date.
    ///
    /// On the season's final day this closes it, reports the standings to the
    /// admins and opens the next season. On any other day it looks for work
    /// left over from an interrupted run: a close without its rollover is
    /// resumed, an unsent close report is re-delivered. Ticking repeatedly on
    /// the same date is safe.
    ///
    /// A rollover that finds inconsistent state propagates its error without
    /// touching the already-closed season; the resume path picks the rollover
    /// up once the state is repaired.
    pub async fn daily_tick(&self, today: NaiveDate) -> Result<TickOutcome> {
        debug!("Lifecycle tick for {}", today);

        if let Some(report) = self.closer.close_if_due(today)? {
            if let Err(e) = self.deliver_report(&report).await {
                warn!(
                    "Close report for {} not delivered, will retry on a later tick: {}",
                    report.season_name, e
                );
            }

            let rollover = self.rollover.prepare_next_season()?;
            if let Err(e) = self.deliver_summary(&rollover).await {
                warn!(
                    "Rollover summary for {} not delivered: {}",
                    rollover.season.display_name, e
                );
            }

            info!(
                "Season {} closed, {} is open",
                report.season_name, rollover.season.display_name
            );
            return Ok(TickOutcome::SeasonRolled { report, rollover });
        }

        if self.store.current_season()?.is_none() {
            let closed = match self.store.latest_closed_season()? {
                Some(closed) => closed,
                None => {
                    debug!("No season configured yet");
                    return Ok(TickOutcome::Idle);
                }
            };

            // A close went through but its rollover never ran. An unsent
            // close report is picked up on the next tick.
            info!(
                "No open season after {}, resuming rollover",
                closed.display_name
            );
            let rollover = self.rollover.prepare_next_season()?;
            if let Err(e) = self.deliver_summary(&rollover).await {
                warn!(
                    "Rollover summary for {} not delivered: {}",
                    rollover.season.display_name, e
                );
            }
            return Ok(TickOutcome::RolloverResumed(rollover));
        }

        if let Some(closed) = self.store.latest_closed_season()? {
            if !closed.report_sent {
                info!("Retrying close report for {}", closed.display_name);
                let report = self.closer.build_report(&closed.id)?;
                return match self.deliver_report(&report).await {
                    Ok(()) => Ok(TickOutcome::ReportRetried(closed.id)),
                    Err(e) => {
                        warn!(
                            "Close report for {} failed again: {}",
                            closed.display_name, e
                        );
                        Ok(TickOutcome::Idle)
                    }
                };
            }
        }

        Ok(TickOutcome::Idle)
    }

    /// Deliver the close report to every active admin and mark the season
    /// notified once all of them got it. With nobody to notify the marker is
    /// set immediately so the retry path does not spin forever.
    async fn deliver_report(&self, report: &SeasonReport) -> Result<()> {
        let admins = self.admin_recipients()?;
        if admins.is_empty() {
            warn!(
                "No active admins to receive the close report for {}",
                report.season_name
            );
            self.store.mark_report_sent(&report.season_id)?;
            return Ok(());
        }

        let text = report.to_string();
        let mut failures = 0usize;
        for admin in &admins {
            let delivered = self
                .notifier
                .notify(Notification {
                    recipient: admin.contact_handle.clone(),
                    text: text.clone(),
                    action_link: None,
                    timestamp: current_timestamp(),
                })
                .await;
            match delivered {
                Ok(()) => self.metrics_collector.record_notification("report", true),
                Err(e) => {
                    warn!(
                        "Close report delivery to {} failed: {}",
                        admin.display_name, e
                    );
                    self.metrics_collector.record_notification("report", false);
                    failures += 1;
                }
            }
        }

        if failures > 0 {
            return Err(LeagueError::InternalError {
                message: format!(
                    "close report delivery failed for {} of {} admins",
                    failures,
                    admins.len()
                ),
            }
            .into());
        }

        self.store.mark_report_sent(&report.season_id)?;
        info!(
            "Close report for {} delivered to {} admins",
            report.season_name,
            admins.len()
        );
        Ok(())
    }

    /// Announce the new season to every active admin. Best effort; there is
    /// no persistent marker behind this one.
    async fn deliver_summary(&self, rollover: &RolloverSummary) -> Result<()> {
        let admins = self.admin_recipients()?;
        let text = rollover.to_string();
        let mut failures = 0usize;
        for admin in &admins {
            let delivered = self
                .notifier
                .notify(Notification {
                    recipient: admin.contact_handle.clone(),
                    text: text.clone(),
                    action_link: None,
                    timestamp: current_timestamp(),
                })
                .await;
            match delivered {
                Ok(()) => self.metrics_collector.record_notification("summary", true),
                Err(e) => {
                    warn!(
                        "Rollover summary delivery to {} failed: {}",
                        admin.display_name, e
                    );
                    self.metrics_collector
                        .record_notification("summary", false);
                    failures += 1;
                }
            }
        }

        if failures > 0 {
            return Err(LeagueError::InternalError {
                message: format!(
                    "rollover summary delivery failed for {} of {} admins",
                    failures,
                    admins.len()
                ),
            }
            .into());
        }
        Ok(())
    }

    fn admin_recipients(&self) -> Result<Vec<Player>> {
        Ok(self
            .store
            .list_players()?
            .into_iter()
            .filter(|player| player.is_admin && player.is_active)
            .collect())
    }
}
