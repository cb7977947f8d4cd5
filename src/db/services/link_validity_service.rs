//! The link validity cache.
//!
//! One row per raw URL, shared by every user. A url is probed once on first
//! resolution; later resolutions read the row. Keeping it fresh is the job
//! of [`refresh_all`] (hourly) and [`purge_invalid`] (daily), which are
//! triggered from outside the request path.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DbConn, DbErr, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::db::entities::{link_validity, prelude::LinkValidity};
use crate::db::is_unique_violation;
use crate::services::link_probe::LinkProber;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshSummary {
    pub checked: usize,
    pub valid: usize,
    pub invalid: usize,
}

pub async fn find_by_url(db: &DbConn, url: &str) -> Result<Option<link_validity::Model>, DbErr> {
    LinkValidity::find()
        .filter(link_validity::Column::Url.eq(url))
        .one(db)
        .await
}

/// Returns the cached validity of `url`, probing and storing it on first use.
#[instrument(skip(db, prober))]
pub async fn resolve(
    db: &DbConn,
    prober: &dyn LinkProber,
    url: &str,
) -> Result<link_validity::Model, DbErr> {
    if let Some(cached) = find_by_url(db, url).await? {
        debug!(is_valid = cached.is_valid, "Link validity served from cache.");
        return Ok(cached);
    }

    let outcome = prober.probe(url).await;
    let row = link_validity::ActiveModel {
        url: Set(url.to_string()),
        title: Set(outcome.title),
        is_valid: Set(outcome.is_valid),
        updated_at: Set(Utc::now()),
        ..Default::default()
    };

    match row.insert(db).await {
        Ok(model) => {
            info!(is_valid = model.is_valid, "Cached new link validity.");
            Ok(model)
        }
        // Another request probed the same url first; theirs is as good as ours.
        Err(db_err) if is_unique_violation(&db_err) => find_by_url(db, url)
            .await?
            .ok_or_else(|| DbErr::RecordNotFound(format!("link validity for {url}"))),
        Err(db_err) => Err(db_err),
    }
}

/// Re-probes every cached url and stores the new validity and title.
///
/// A failed probe marks the row invalid and keeps the last known title.
pub async fn refresh_all(db: &DbConn, prober: &dyn LinkProber) -> Result<RefreshSummary, DbErr> {
    let rows = LinkValidity::find()
        .order_by_asc(link_validity::Column::Id)
        .all(db)
        .await?;

    let mut summary = RefreshSummary::default();
    for row in rows {
        let outcome = prober.probe(&row.url).await;
        summary.checked += 1;
        if outcome.is_valid {
            summary.valid += 1;
        } else {
            summary.invalid += 1;
        }

        let url = row.url.clone();
        let mut active: link_validity::ActiveModel = row.into();
        active.is_valid = Set(outcome.is_valid);
        if let Some(title) = outcome.title {
            active.title = Set(Some(title));
        }
        active.updated_at = Set(Utc::now());

        // Row may have been purged concurrently; keep going with the rest.
        if let Err(e) = active.update(db).await {
            warn!(url = %url, error = %e, "Failed to store refreshed link validity.");
        }
    }

    info!(
        checked = summary.checked,
        valid = summary.valid,
        invalid = summary.invalid,
        "Link validity refresh finished."
    );
    Ok(summary)
}

/// Deletes every row currently marked invalid. Returns the number removed.
pub async fn purge_invalid(db: &DbConn) -> Result<u64, DbErr> {
    let result = LinkValidity::delete_many()
        .filter(link_validity::Column::IsValid.eq(false))
        .exec(db)
        .await?;
    info!(deleted = result.rows_affected, "Purged invalid link validity rows.");
    Ok(result.rows_affected)
}
