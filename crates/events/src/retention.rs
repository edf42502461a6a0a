//! Periodic cleanup of old digest events and alerts.
//!
//! Events are kept for `factor x` the longest digest period so a slow
//! weekly run still finds its window; alerts are kept for the configured
//! alert retention, measured from their last activity.

use std::sync::Arc;
use std::time::Duration;

use herald_core::clock::Clock;
use herald_core::config::HeraldConfig;
use tokio_util::sync::CancellationToken;

use crate::error::EventsError;
use crate::store::NotificationStore;

/// Rows removed by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub events_deleted: u64,
    pub alerts_deleted: u64,
}

/// Deletes digest events and alerts past their retention, once per
/// configured sweep interval.
pub struct RetentionSweeper {
    store: Arc<dyn NotificationStore>,
    clock: Arc<dyn Clock>,
    event_retention: chrono::Duration,
    alert_retention: chrono::Duration,
    interval: Duration,
}

impl RetentionSweeper {
    /// Takes both retentions and the sweep interval from `config`.
    pub fn new(config: &HeraldConfig, store: Arc<dyn NotificationStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            event_retention: config.event_retention(),
            alert_retention: config.alert_retention(),
            interval: config.sweep_interval,
        }
    }

    /// Delete everything past its retention as of now.
    pub async fn sweep_once(&self) -> Result<SweepSummary, EventsError> {
        let now = self.clock.now();
        // A cutoff before the earliest representable instant has nothing to delete.
        let events_deleted = match now.checked_sub_signed(self.event_retention) {
            Some(cutoff) => self.store.delete_events_older_than(cutoff).await?,
            None => 0,
        };
        let alerts_deleted = match now.checked_sub_signed(self.alert_retention) {
            Some(cutoff) => self.store.delete_alerts_older_than(cutoff).await?,
            None => 0,
        };
        Ok(SweepSummary {
            events_deleted,
            alerts_deleted,
        })
    }

    /// Run the sweep loop until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            event_retention_days = self.event_retention.num_days(),
            alert_retention_days = self.alert_retention.num_days(),
            interval_secs = self.interval.as_secs(),
            "Retention sweep started"
        );

        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Retention sweep stopping");
                    break;
                }
                _ = interval.tick() => {
                    match self.sweep_once().await {
                        Ok(summary) if summary != SweepSummary::default() => {
                            tracing::info!(
                                events_deleted = summary.events_deleted,
                                alerts_deleted = summary.alerts_deleted,
                                "Retention sweep: purged old rows"
                            );
                        }
                        Ok(_) => tracing::debug!("Retention sweep: no rows to purge"),
                        Err(e) => tracing::error!(error = %e, "Retention sweep failed"),
                    }
                }
            }
        }
    }
}
