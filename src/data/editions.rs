//! Database operations for editions.

use crate::data::models::{Edition, HarvestResumeState};
use crate::error::Result;
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

pub async fn find(id: Uuid, db_pool: &PgPool) -> Result<Option<Edition>> {
    let edition = sqlx::query_as::<_, Edition>("SELECT * FROM editions WHERE id = $1")
        .bind(id)
        .fetch_optional(db_pool)
        .await?;
    Ok(edition)
}

/// All selected, non-excluded, non-merged Editions for a SeedPaper, the
/// harvester's inputs. Merged-into editions are excluded because their
/// citations are recorded against their canonical root instead.
pub async fn selected_for_paper(seed_paper_id: Uuid, db_pool: &PgPool) -> Result<Vec<Edition>> {
    let editions = sqlx::query_as::<_, Edition>(
        "SELECT * FROM editions \
         WHERE seed_paper_id = $1 AND selected AND NOT excluded AND merged_into_edition_id IS NULL",
    )
    .bind(seed_paper_id)
    .fetch_all(db_pool)
    .await?;
    Ok(editions)
}

/// The external ids of every edition merged (directly or transitively) into
/// `canonical_id`, so the harvester can also sweep their citations into the
/// canonical root.
pub async fn merged_descendant_external_ids(
    canonical_id: Uuid,
    db_pool: &PgPool,
) -> Result<Vec<String>> {
    let ids: Vec<Option<String>> = sqlx::query_scalar(
        "WITH RECURSIVE descendants AS ( \
            SELECT id, external_id FROM editions WHERE merged_into_edition_id = $1 \
            UNION ALL \
            SELECT e.id, e.external_id FROM editions e \
            JOIN descendants d ON e.merged_into_edition_id = d.id \
         ) SELECT external_id FROM descendants",
    )
    .bind(canonical_id)
    .fetch_all(db_pool)
    .await?;
    Ok(ids.into_iter().flatten().collect())
}

pub async fn update_resume_state(
    id: Uuid,
    state: &HarvestResumeState,
    db_pool: &PgPool,
) -> Result<()> {
    sqlx::query("UPDATE editions SET harvest_resume_state = $2, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .bind(Json(state))
        .execute(db_pool)
        .await?;
    Ok(())
}

/// Recompute `harvested_citation_count` / `last_harvested_at` from the
/// Citation table.
pub async fn refresh_harvested_count(id: Uuid, db_pool: &PgPool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "UPDATE editions e SET \
            harvested_citation_count = (SELECT COUNT(*) FROM citations c WHERE c.edition_id = e.id), \
            last_harvested_at = NOW(), \
            updated_at = NOW() \
         WHERE e.id = $1 \
         RETURNING e.harvested_citation_count",
    )
    .bind(id)
    .fetch_one(db_pool)
    .await?;
    Ok(count)
}

pub async fn increment_stall_count(id: Uuid, db_pool: &PgPool) -> Result<i32> {
    let count: i32 = sqlx::query_scalar(
        "UPDATE editions SET harvest_stall_count = harvest_stall_count + 1, updated_at = NOW() \
         WHERE id = $1 RETURNING harvest_stall_count",
    )
    .bind(id)
    .fetch_one(db_pool)
    .await?;
    Ok(count)
}

pub async fn reset_stall_count(id: Uuid, db_pool: &PgPool) -> Result<()> {
    sqlx::query("UPDATE editions SET harvest_stall_count = 0, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .execute(db_pool)
        .await?;
    Ok(())
}

/// Editions that look like they were mid-(year-partitioned) harvest when
/// the process died, but never got a resume state synthesised.
pub async fn find_orphans(year_partition_threshold: i64, db_pool: &PgPool) -> Result<Vec<Edition>> {
    let editions = sqlx::query_as::<_, Edition>(
        "SELECT * FROM editions \
         WHERE COALESCE(reported_citation_count, 0) >= $1 \
           AND harvested_citation_count > 100 \
           AND harvest_resume_state IS NULL",
    )
    .bind(year_partition_threshold)
    .fetch_all(db_pool)
    .await?;
    Ok(editions)
}

/// Maximum hops walked while checking a proposed merge for cycles. The
/// merge forest is expected to be shallow (editions merge directly into a
/// canonical root), so this bounds a pathological chain without needing a
/// recursive CTE for every merge.
const MERGE_CYCLE_CHECK_DEPTH: u32 = 64;

/// Idempotent: merging `id` into `canonical_id` twice is a no-op. Rejects a
/// merge that would create a cycle (walking `canonical_id`'s own
/// `merged_into_edition_id` chain and finding `id`), keeping the merge
/// forest acyclic per the data-model invariant.
pub async fn merge_into(id: Uuid, canonical_id: Uuid, db_pool: &PgPool) -> Result<()> {
    if id == canonical_id {
        anyhow::bail!("cannot merge an edition into itself");
    }

    let mut cursor = canonical_id;
    for _ in 0..MERGE_CYCLE_CHECK_DEPTH {
        if cursor == id {
            anyhow::bail!("merging {id} into {canonical_id} would create a cycle");
        }
        let next: Option<Uuid> =
            sqlx::query_scalar("SELECT merged_into_edition_id FROM editions WHERE id = $1")
                .bind(cursor)
                .fetch_optional(db_pool)
                .await?
                .flatten();
        match next {
            Some(next_id) => cursor = next_id,
            None => break,
        }
    }

    sqlx::query("UPDATE editions SET merged_into_edition_id = $2, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .bind(canonical_id)
        .execute(db_pool)
        .await?;
    Ok(())
}
