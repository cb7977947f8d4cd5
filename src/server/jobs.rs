use sea_orm::{DatabaseConnection, DbErr};
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info, instrument};

use crate::db::services::{RefreshSummary, link_validity_service};
use crate::services::link_probe::LinkProber;

pub const REFRESH_INTERVAL: Duration = Duration::from_secs(60 * 60);
pub const PURGE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Out-of-band maintenance of the link validity cache. Each job is a single
/// pass; callers decide when to trigger it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkJob {
    /// Re-probe every cached url.
    Refresh,
    /// Delete cached rows currently marked invalid.
    Purge,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum JobReport {
    Refresh(RefreshSummary),
    Purge { removed: u64 },
}

impl LinkJob {
    pub fn name(&self) -> &'static str {
        match self {
            LinkJob::Refresh => "refresh-links",
            LinkJob::Purge => "purge-invalid-links",
        }
    }

    #[instrument(skip(db, prober), fields(job = self.name()))]
    pub async fn run(&self, db: &DatabaseConnection, prober: &dyn LinkProber) -> Result<JobReport, DbErr> {
        match self {
            LinkJob::Refresh => Ok(JobReport::Refresh(
                link_validity_service::refresh_all(db, prober).await?,
            )),
            LinkJob::Purge => Ok(JobReport::Purge {
                removed: link_validity_service::purge_invalid(db).await?,
            }),
        }
    }
}

/// Optional in-process trigger for the link jobs, used by the `schedule`
/// command. The jobs themselves hold no timer state.
pub struct LinkMaintenanceScheduler {
    db: DatabaseConnection,
    prober: Arc<dyn LinkProber>,
}

impl LinkMaintenanceScheduler {
    pub fn new(db: DatabaseConnection, prober: Arc<dyn LinkProber>) -> Self {
        Self { db, prober }
    }

    /// Runs forever. Jobs execute one at a time on this task, so a slow
    /// refresh delays the next tick instead of overlapping another job.
    pub async fn run_periodic_tasks(self: Arc<Self>, refresh_every: Duration, purge_every: Duration) {
        info!(?refresh_every, ?purge_every, "Starting link maintenance tasks.");
        let mut refresh_interval = time::interval(refresh_every);
        let mut purge_interval = time::interval(purge_every);
        refresh_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        purge_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first purge waits a full period so fresh failures get a refresh cycle of grace.
        purge_interval.tick().await;

        loop {
            let job = tokio::select! {
                _ = refresh_interval.tick() => LinkJob::Refresh,
                _ = purge_interval.tick() => LinkJob::Purge,
            };
            self.run_job(job).await;
        }
    }

    async fn run_job(&self, job: LinkJob) -> Option<JobReport> {
        match job.run(&self.db, self.prober.as_ref()).await {
            Ok(report) => Some(report),
            Err(e) => {
                error!(job = job.name(), error = %e, "Link maintenance job failed.");
                None
            }
        }
    }
}
