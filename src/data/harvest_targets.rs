//! Database operations for harvest-target bookkeeping.

use crate::data::models::{HarvestTarget, HarvestTargetStatus};
use crate::error::Result;
use sqlx::PgPool;
use uuid::Uuid;

pub async fn find(edition_id: Uuid, partition_key: &str, db_pool: &PgPool) -> Result<Option<HarvestTarget>> {
    let target = sqlx::query_as::<_, HarvestTarget>(
        "SELECT * FROM harvest_targets WHERE edition_id = $1 AND partition_key = $2",
    )
    .bind(edition_id)
    .bind(partition_key)
    .fetch_optional(db_pool)
    .await?;
    Ok(target)
}

/// Create or update the target's `expected_count` on first partition probe,
/// lazily creating the row. `original_expected` is set only once, on the
/// very first probe.
pub async fn upsert_expected(
    edition_id: Uuid,
    partition_key: &str,
    expected_count: i64,
    db_pool: &PgPool,
) -> Result<HarvestTarget> {
    let target = sqlx::query_as::<_, HarvestTarget>(
        "INSERT INTO harvest_targets (edition_id, partition_key, expected_count, original_expected, status) \
         VALUES ($1, $2, $3, $3, 'harvesting') \
         ON CONFLICT (edition_id, partition_key) \
         DO UPDATE SET expected_count = $3, updated_at = NOW() \
         RETURNING *",
    )
    .bind(edition_id)
    .bind(partition_key)
    .bind(expected_count)
    .fetch_one(db_pool)
    .await?;
    Ok(target)
}

pub async fn increment_actual(
    edition_id: Uuid,
    partition_key: &str,
    delta: i64,
    db_pool: &PgPool,
) -> Result<()> {
    sqlx::query(
        "UPDATE harvest_targets SET actual_count = actual_count + $3, updated_at = NOW() \
         WHERE edition_id = $1 AND partition_key = $2",
    )
    .bind(edition_id)
    .bind(partition_key)
    .bind(delta)
    .execute(db_pool)
    .await?;
    Ok(())
}

pub async fn record_page_attempt(
    edition_id: Uuid,
    partition_key: &str,
    succeeded: bool,
    db_pool: &PgPool,
) -> Result<()> {
    let column = if succeeded { "pages_succeeded" } else { "pages_failed" };
    sqlx::query(&format!(
        "UPDATE harvest_targets SET pages_attempted = pages_attempted + 1, {column} = {column} + 1, updated_at = NOW() \
         WHERE edition_id = $1 AND partition_key = $2",
    ))
    .bind(edition_id)
    .bind(partition_key)
    .execute(db_pool)
    .await?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn finalize(
    edition_id: Uuid,
    partition_key: &str,
    status: HarvestTargetStatus,
    gap_reason: Option<&str>,
    gap_details: Option<serde_json::Value>,
    final_gs_count: Option<i64>,
    db_pool: &PgPool,
) -> Result<()> {
    sqlx::query(
        "UPDATE harvest_targets SET status = $3, gap_reason = $4, gap_details = $5, \
            final_gs_count = $6, updated_at = NOW() \
         WHERE edition_id = $1 AND partition_key = $2",
    )
    .bind(edition_id)
    .bind(partition_key)
    .bind(status)
    .bind(gap_reason)
    .bind(gap_details.map(sqlx::types::Json))
    .bind(final_gs_count)
    .execute(db_pool)
    .await?;
    Ok(())
}

pub async fn incomplete_for_edition(edition_id: Uuid, db_pool: &PgPool) -> Result<Vec<HarvestTarget>> {
    let targets = sqlx::query_as::<_, HarvestTarget>(
        "SELECT * FROM harvest_targets WHERE edition_id = $1 AND status != 'complete'",
    )
    .bind(edition_id)
    .fetch_all(db_pool)
    .await?;
    Ok(targets)
}

/// Every harvest target recorded for an edition, complete or not. Used to
/// synthesise a resume state for an orphaned edition at startup.
pub async fn all_for_edition(edition_id: Uuid, db_pool: &PgPool) -> Result<Vec<HarvestTarget>> {
    let targets = sqlx::query_as::<_, HarvestTarget>("SELECT * FROM harvest_targets WHERE edition_id = $1")
        .bind(edition_id)
        .fetch_all(db_pool)
        .await?;
    Ok(targets)
}

/// `(sum(expected_count), sum(actual_count))` across every target recorded
/// for an edition, used to decide whether a stalled edition's residual gap
/// is small enough to auto-complete rather than keep retrying forever.
pub async fn gap_summary(edition_id: Uuid, db_pool: &PgPool) -> Result<(i64, i64)> {
    let row: (Option<i64>, Option<i64>) = sqlx::query_as(
        "SELECT COALESCE(SUM(expected_count), 0), COALESCE(SUM(actual_count), 0) \
         FROM harvest_targets WHERE edition_id = $1",
    )
    .bind(edition_id)
    .fetch_one(db_pool)
    .await?;
    Ok((row.0.unwrap_or(0), row.1.unwrap_or(0)))
}

/// Mark every non-complete target of an edition `complete` with the given
/// `gap_reason`, used when a stalled edition's remaining gap is judged
/// unfetchable rather than kept in the auto-resume rotation forever.
pub async fn auto_complete_remaining(edition_id: Uuid, gap_reason: &str, db_pool: &PgPool) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE harvest_targets SET status = 'complete', gap_reason = $2, updated_at = NOW() \
         WHERE edition_id = $1 AND status != 'complete'",
    )
    .bind(edition_id)
    .bind(gap_reason)
    .execute(db_pool)
    .await?;
    Ok(result.rows_affected())
}
