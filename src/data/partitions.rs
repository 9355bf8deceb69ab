//! Database operations for the Partition Planner's audit trail:
//! `PartitionRun`, `PartitionLlmCall`, `PartitionTermAttempt`, `PartitionQuery`.

use crate::data::models::{
    PartitionLlmCall, PartitionQuery, PartitionRun, PartitionRunStatus, PartitionTermAttempt,
};
use crate::error::Result;
use sqlx::PgPool;
use uuid::Uuid;

#[allow(clippy::too_many_arguments)]
pub async fn create_run(
    edition_id: Uuid,
    parent_run_id: Option<Uuid>,
    recursion_depth: i32,
    query_context: &str,
    language_filter: Option<&str>,
    initial_count: i64,
    target_count: i64,
    db_pool: &PgPool,
) -> Result<PartitionRun> {
    let run = sqlx::query_as::<_, PartitionRun>(
        "INSERT INTO partition_runs \
            (edition_id, parent_run_id, recursion_depth, query_context, language_filter, \
             initial_count, target_count, status) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending') \
         RETURNING *",
    )
    .bind(edition_id)
    .bind(parent_run_id)
    .bind(recursion_depth)
    .bind(query_context)
    .bind(language_filter)
    .bind(initial_count)
    .bind(target_count)
    .fetch_one(db_pool)
    .await?;
    Ok(run)
}

pub async fn find_run(id: Uuid, db_pool: &PgPool) -> Result<Option<PartitionRun>> {
    let run = sqlx::query_as::<_, PartitionRun>("SELECT * FROM partition_runs WHERE id = $1")
        .bind(id)
        .fetch_optional(db_pool)
        .await?;
    Ok(run)
}

pub async fn set_status(id: Uuid, status: PartitionRunStatus, db_pool: &PgPool) -> Result<()> {
    sqlx::query("UPDATE partition_runs SET status = $2, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .bind(status)
        .execute(db_pool)
        .await?;
    Ok(())
}

pub async fn set_error_stage(id: Uuid, stage: &str, db_pool: &PgPool) -> Result<()> {
    sqlx::query(
        "UPDATE partition_runs SET status = 'failed', error_stage = $2, updated_at = NOW() WHERE id = $1",
    )
    .bind(id)
    .bind(stage)
    .execute(db_pool)
    .await?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn finalize_run(
    id: Uuid,
    exclusion_set_count: i32,
    exclusion_harvested: i64,
    inclusion_harvested: i64,
    terms_kept: &[String],
    gap_details: Option<serde_json::Value>,
    db_pool: &PgPool,
) -> Result<()> {
    sqlx::query(
        "UPDATE partition_runs SET status = 'completed', exclusion_set_count = $2, \
            exclusion_harvested = $3, inclusion_harvested = $4, terms_kept = $5, \
            gap_details = $6, updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(id)
    .bind(exclusion_set_count)
    .bind(exclusion_harvested)
    .bind(inclusion_harvested)
    .bind(sqlx::types::Json(terms_kept))
    .bind(gap_details.map(sqlx::types::Json))
    .execute(db_pool)
    .await?;
    Ok(())
}

pub async fn children_of(parent_run_id: Uuid, db_pool: &PgPool) -> Result<Vec<PartitionRun>> {
    let runs = sqlx::query_as::<_, PartitionRun>(
        "SELECT * FROM partition_runs WHERE parent_run_id = $1 ORDER BY created_at ASC",
    )
    .bind(parent_run_id)
    .fetch_all(db_pool)
    .await?;
    Ok(runs)
}

#[allow(clippy::too_many_arguments)]
pub async fn record_llm_call(
    partition_run_id: Uuid,
    call_number: i32,
    prompt: &str,
    response: &str,
    input_tokens: i32,
    output_tokens: i32,
    latency_ms: i32,
    terms_suggested: &[String],
    db_pool: &PgPool,
) -> Result<PartitionLlmCall> {
    let call = sqlx::query_as::<_, PartitionLlmCall>(
        "INSERT INTO partition_llm_calls \
            (partition_run_id, call_number, prompt, response, input_tokens, output_tokens, \
             latency_ms, terms_suggested) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         RETURNING *",
    )
    .bind(partition_run_id)
    .bind(call_number)
    .bind(prompt)
    .bind(response)
    .bind(input_tokens)
    .bind(output_tokens)
    .bind(latency_ms)
    .bind(sqlx::types::Json(terms_suggested))
    .fetch_one(db_pool)
    .await?;
    Ok(call)
}

#[allow(clippy::too_many_arguments)]
pub async fn record_term_attempt(
    partition_run_id: Uuid,
    llm_call_id: Uuid,
    term: &str,
    attempt_number: i32,
    count_before: i64,
    count_after: i64,
    kept: bool,
    db_pool: &PgPool,
) -> Result<PartitionTermAttempt> {
    let reduction = count_before - count_after;
    let attempt = sqlx::query_as::<_, PartitionTermAttempt>(
        "INSERT INTO partition_term_attempts \
            (partition_run_id, llm_call_id, term, attempt_number, count_before, count_after, \
             reduction, kept) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         RETURNING *",
    )
    .bind(partition_run_id)
    .bind(llm_call_id)
    .bind(term)
    .bind(attempt_number)
    .bind(count_before)
    .bind(count_after)
    .bind(reduction)
    .bind(kept)
    .fetch_one(db_pool)
    .await?;
    Ok(attempt)
}

pub async fn attempt_count(partition_run_id: Uuid, db_pool: &PgPool) -> Result<i64> {
    let count =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM partition_term_attempts WHERE partition_run_id = $1")
            .bind(partition_run_id)
            .fetch_one(db_pool)
            .await?;
    Ok(count)
}

/// Count of attempts, in submission order, whose `reduction` was zero,
/// read back from the tail. Used for the 15-consecutive-zero-reduction
/// stuck detector.
pub async fn consecutive_zero_reductions(partition_run_id: Uuid, db_pool: &PgPool) -> Result<i32> {
    let reductions: Vec<i64> = sqlx::query_scalar(
        "SELECT reduction FROM partition_term_attempts \
         WHERE partition_run_id = $1 ORDER BY attempt_number DESC",
    )
    .bind(partition_run_id)
    .fetch_all(db_pool)
    .await?;

    let mut streak = 0;
    for reduction in reductions {
        if reduction == 0 {
            streak += 1;
        } else {
            break;
        }
    }
    Ok(streak)
}

pub async fn record_query(
    partition_run_id: Uuid,
    query_kind: &str,
    query_text: &str,
    reported_count: i64,
    db_pool: &PgPool,
) -> Result<PartitionQuery> {
    let query = sqlx::query_as::<_, PartitionQuery>(
        "INSERT INTO partition_queries (partition_run_id, query_kind, query_text, reported_count) \
         VALUES ($1, $2, $3, $4) \
         RETURNING *",
    )
    .bind(partition_run_id)
    .bind(query_kind)
    .bind(query_text)
    .bind(reported_count)
    .fetch_one(db_pool)
    .await?;
    Ok(query)
}
