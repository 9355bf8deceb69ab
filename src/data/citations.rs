//! Database operations for the Citation Store Writer.

use crate::error::Result;
use crate::search::parse::ParsedResult;
use sqlx::PgPool;
use uuid::Uuid;

/// Outcome of upserting one parsed page's worth of results.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpsertCounts {
    pub new_citations: i64,
    pub duplicates: i64,
}

/// Upsert a batch of parsed results for one Edition, keyed by
/// `(seed_paper_id, external_result_id)`. Every write is
/// `ON CONFLICT ... DO UPDATE SET encounter_count = encounter_count + 1`,
/// giving correct idempotent at-least-once ingestion under worker restarts,
/// concurrent editions, and page-buffer retries.
///
/// `intersection_count` is always written as `1`: it's reserved for a
/// cross-paper analytics module this crate does not implement.
pub async fn upsert_batch(
    seed_paper_id: Uuid,
    edition_id: Uuid,
    results: &[ParsedResult],
    db_pool: &PgPool,
) -> Result<UpsertCounts> {
    if results.is_empty() {
        return Ok(UpsertCounts::default());
    }

    let external_ids: Vec<&str> = results.iter().map(|r| r.external_id.as_str()).collect();
    let cluster_ids: Vec<Option<&str>> = results.iter().map(|r| r.cluster_id.as_deref()).collect();
    let titles: Vec<&str> = results.iter().map(|r| r.title.as_str()).collect();
    let raw_authors: Vec<Option<&str>> = results.iter().map(|r| r.raw_authors.as_deref()).collect();
    let years: Vec<Option<i32>> = results.iter().map(|r| r.year).collect();
    let venues: Vec<Option<&str>> = results.iter().map(|r| r.venue.as_deref()).collect();
    let abstracts: Vec<Option<&str>> = results.iter().map(|r| r.abstract_snippet.as_deref()).collect();
    let links: Vec<Option<&str>> = results.iter().map(|r| r.link.as_deref()).collect();

    let inserted_ids: Vec<(Uuid, bool)> = sqlx::query_as(
        r#"
        INSERT INTO citations (
            seed_paper_id, edition_id, external_result_id, cluster_id,
            title, raw_authors, year, venue, abstract_snippet, link,
            encounter_count, intersection_count
        )
        SELECT $1, $2, v.external_id, v.cluster_id, v.title, v.raw_authors,
               v.year, v.venue, v.abstract_snippet, v.link, 1, 1
        FROM UNNEST($3::text[], $4::text[], $5::text[], $6::text[], $7::int4[],
                     $8::text[], $9::text[], $10::text[])
            AS v(external_id, cluster_id, title, raw_authors, year, venue, abstract_snippet, link)
        ON CONFLICT (seed_paper_id, external_result_id)
        DO UPDATE SET encounter_count = citations.encounter_count + 1, updated_at = NOW()
        RETURNING id, (xmax = 0) AS inserted
        "#,
    )
    .bind(seed_paper_id)
    .bind(edition_id)
    .bind(&external_ids)
    .bind(&cluster_ids)
    .bind(&titles)
    .bind(&raw_authors)
    .bind(&years)
    .bind(&venues)
    .bind(&abstracts)
    .bind(&links)
    .fetch_all(db_pool)
    .await?;

    let new_citations = inserted_ids.iter().filter(|(_, inserted)| *inserted).count() as i64;
    let duplicates = inserted_ids.len() as i64 - new_citations;

    Ok(UpsertCounts {
        new_citations,
        duplicates,
    })
}

pub async fn count_for_edition(edition_id: Uuid, db_pool: &PgPool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM citations WHERE edition_id = $1")
        .bind(edition_id)
        .fetch_one(db_pool)
        .await?;
    Ok(count)
}

/// Rows observed for an edition within a given year, used by the
/// resume-page arithmetic.
pub async fn count_for_edition_year(edition_id: Uuid, year: i32, db_pool: &PgPool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM citations WHERE edition_id = $1 AND year = $2",
    )
    .bind(edition_id)
    .bind(year)
    .fetch_one(db_pool)
    .await?;
    Ok(count)
}
