//! Database operations for seed papers.

use crate::data::models::{ResolutionState, SeedPaper};
use crate::error::Result;
use sqlx::PgPool;
use uuid::Uuid;

pub async fn find(id: Uuid, db_pool: &PgPool) -> Result<Option<SeedPaper>> {
    let paper = sqlx::query_as::<_, SeedPaper>("SELECT * FROM seed_papers WHERE id = $1")
        .bind(id)
        .fetch_optional(db_pool)
        .await?;
    Ok(paper)
}

pub async fn mark_resolved(id: Uuid, external_id: &str, db_pool: &PgPool) -> Result<()> {
    sqlx::query(
        "UPDATE seed_papers SET resolution_state = $2, external_id = $3, updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(id)
    .bind(ResolutionState::Resolved)
    .bind(external_id)
    .execute(db_pool)
    .await?;
    Ok(())
}

/// Recompute `total_harvested_citations` / `any_edition_harvested_at` as an
/// aggregate over the paper's Editions.
pub async fn refresh_rollups(id: Uuid, db_pool: &PgPool) -> Result<()> {
    sqlx::query(
        "UPDATE seed_papers p SET \
            total_harvested_citations = COALESCE((SELECT SUM(e.harvested_citation_count) FROM editions e WHERE e.seed_paper_id = p.id), 0), \
            any_edition_harvested_at = (SELECT MAX(e.last_harvested_at) FROM editions e WHERE e.seed_paper_id = p.id), \
            updated_at = NOW() \
         WHERE p.id = $1",
    )
    .bind(id)
    .execute(db_pool)
    .await?;
    Ok(())
}

/// Editions eligible for auto-resume, grouped by SeedPaper. Returns
/// `(seed_paper_id, edition_id)` pairs; callers group by the first element
/// to enforce "one job per paper per scan".
pub async fn find_auto_resume_candidates(
    skip_threshold: i64,
    stall_limit: i32,
    db_pool: &PgPool,
) -> Result<Vec<(Uuid, Uuid)>> {
    let rows: Vec<(Uuid, Uuid)> = sqlx::query_as(
        "SELECT e.seed_paper_id, e.id FROM editions e \
         JOIN seed_papers p ON p.id = e.seed_paper_id \
         WHERE e.selected AND NOT p.harvest_paused \
           AND e.harvested_citation_count < COALESCE(e.reported_citation_count, 0) \
           AND COALESCE(e.reported_citation_count, 0) <= $1 \
           AND e.harvest_stall_count < $2 \
           AND EXISTS ( \
               SELECT 1 FROM harvest_targets t \
               WHERE t.edition_id = e.id AND t.status != 'complete' \
           ) \
           AND ( \
               (COALESCE(e.reported_citation_count, 0) - e.harvested_citation_count) >= 50 \
               OR (COALESCE(e.reported_citation_count, 0) > 0 \
                   AND (COALESCE(e.reported_citation_count, 0) - e.harvested_citation_count)::float8 \
                       / e.reported_citation_count::float8 >= 0.05) \
           )",
    )
    .bind(skip_threshold)
    .bind(stall_limit)
    .fetch_all(db_pool)
    .await?;
    Ok(rows)
}
