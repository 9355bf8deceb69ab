//! Database operations for the failed-fetch retry ledger.

use crate::data::models::{FailedFetch, FailedFetchStatus};
use crate::error::Result;
use sqlx::PgPool;
use uuid::Uuid;

#[allow(clippy::too_many_arguments)]
pub async fn insert(
    edition_id: Uuid,
    partition_key: &str,
    page_offset: i32,
    url: &str,
    last_error: &str,
    db_pool: &PgPool,
) -> Result<FailedFetch> {
    let fetch = sqlx::query_as::<_, FailedFetch>(
        "INSERT INTO failed_fetches (edition_id, partition_key, page_offset, url, last_error, status) \
         VALUES ($1, $2, $3, $4, $5, 'pending') \
         RETURNING *",
    )
    .bind(edition_id)
    .bind(partition_key)
    .bind(page_offset)
    .bind(url)
    .bind(last_error)
    .fetch_one(db_pool)
    .await?;
    Ok(fetch)
}

pub async fn retryable(limit: i64, db_pool: &PgPool) -> Result<Vec<FailedFetch>> {
    let rows = sqlx::query_as::<_, FailedFetch>(
        "SELECT * FROM failed_fetches WHERE status IN ('pending', 'retrying') \
         ORDER BY created_at ASC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(db_pool)
    .await?;
    Ok(rows)
}

pub async fn mark_retrying(id: Uuid, db_pool: &PgPool) -> Result<()> {
    sqlx::query(
        "UPDATE failed_fetches SET status = 'retrying', retry_count = retry_count + 1, updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(id)
    .execute(db_pool)
    .await?;
    Ok(())
}

pub async fn mark_succeeded(id: Uuid, recovered_citations: i32, db_pool: &PgPool) -> Result<()> {
    sqlx::query(
        "UPDATE failed_fetches SET status = 'succeeded', recovered_citations = $2, updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(id)
    .bind(recovered_citations)
    .execute(db_pool)
    .await?;
    Ok(())
}

pub async fn mark_failed(id: Uuid, error: &str, db_pool: &PgPool) -> Result<()> {
    sqlx::query(
        "UPDATE failed_fetches SET status = 'pending', last_error = $2, updated_at = NOW() WHERE id = $1",
    )
    .bind(id)
    .bind(error)
    .execute(db_pool)
    .await?;
    Ok(())
}

pub async fn abandon(id: Uuid, db_pool: &PgPool) -> Result<()> {
    sqlx::query("UPDATE failed_fetches SET status = 'abandoned', updated_at = NOW() WHERE id = $1")
        .bind(id)
        .execute(db_pool)
        .await?;
    Ok(())
}

pub async fn status_of(id: Uuid, db_pool: &PgPool) -> Result<Option<FailedFetchStatus>> {
    let status = sqlx::query_scalar::<_, FailedFetchStatus>(
        "SELECT status FROM failed_fetches WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(db_pool)
    .await?;
    Ok(status)
}
