#[allow(dead_code)]
mod helpers;

use citegraph_harvester::data::jobs;
use citegraph_harvester::data::models::{JobKind, JobPriority, JobStatus, ResolutionState};
use serde_json::json;
use sqlx::PgPool;

#[sqlx::test]
async fn fetch_and_lock_empty_queue(pool: PgPool) {
    let result = jobs::fetch_and_lock_job(&pool).await.unwrap();
    assert!(result.is_none());
}

#[sqlx::test]
async fn fetch_and_lock_returns_job_and_marks_running(pool: PgPool) {
    let seed_paper_id = helpers::insert_seed_paper(&pool, "A Paper", ResolutionState::Resolved).await;
    let inserted = jobs::insert(
        JobKind::ExtractCitations,
        json!({ "edition_ids": [] }),
        JobPriority::Normal,
        Some(seed_paper_id),
        None,
        None,
        &pool,
    )
    .await
    .unwrap();

    let locked = jobs::fetch_and_lock_job(&pool).await.unwrap().expect("job should be locked");
    assert_eq!(locked.id, inserted.id);
    assert_eq!(locked.status, JobStatus::Running);
    assert!(locked.started_at.is_some());

    // A second concurrent poll sees nothing; the row is already running.
    assert!(jobs::fetch_and_lock_job(&pool).await.unwrap().is_none());
}

#[sqlx::test]
async fn fetch_and_lock_respects_priority_then_age(pool: PgPool) {
    let seed_paper_id = helpers::insert_seed_paper(&pool, "A Paper", ResolutionState::Resolved).await;
    let low = jobs::insert(
        JobKind::ExtractCitations,
        json!({}),
        JobPriority::Low,
        Some(seed_paper_id),
        None,
        None,
        &pool,
    )
    .await
    .unwrap();
    let high = jobs::insert(
        JobKind::RetryFailedFetches,
        json!({}),
        JobPriority::High,
        None,
        None,
        None,
        &pool,
    )
    .await
    .unwrap();

    let locked = jobs::fetch_and_lock_job(&pool).await.unwrap().unwrap();
    assert_eq!(locked.id, high.id, "higher priority job should be locked first");

    let locked2 = jobs::fetch_and_lock_job(&pool).await.unwrap().unwrap();
    assert_eq!(locked2.id, low.id);
}

#[sqlx::test]
async fn enqueue_singleton_per_paper_returns_existing(pool: PgPool) {
    use citegraph_harvester::db::context::DbContext;
    use citegraph_harvester::events::EventBuffer;
    use std::sync::Arc;

    let ctx = DbContext::new(pool.clone(), Arc::new(EventBuffer::new(16)));
    let seed_paper_id = helpers::insert_seed_paper(&pool, "A Paper", ResolutionState::Resolved).await;

    let first = ctx
        .jobs()
        .enqueue(JobKind::ExtractCitations, json!({}), JobPriority::Normal, Some(seed_paper_id), None, None)
        .await
        .unwrap();
    let second = ctx
        .jobs()
        .enqueue(JobKind::ExtractCitations, json!({}), JobPriority::Normal, Some(seed_paper_id), None, None)
        .await
        .unwrap();

    assert_eq!(first.id, second.id, "second enqueue should return the existing pending job");

    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM jobs WHERE seed_paper_id = $1")
        .bind(seed_paper_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count.0, 1);
}

#[sqlx::test]
async fn enqueue_fetch_more_editions_is_scoped_per_language(pool: PgPool) {
    use citegraph_harvester::db::context::DbContext;
    use citegraph_harvester::events::EventBuffer;
    use std::sync::Arc;

    let ctx = DbContext::new(pool.clone(), Arc::new(EventBuffer::new(16)));
    let seed_paper_id = helpers::insert_seed_paper(&pool, "A Paper", ResolutionState::Resolved).await;

    let german = ctx
        .jobs()
        .enqueue(
            JobKind::FetchMoreEditions,
            json!({ "language": "de" }),
            JobPriority::Normal,
            Some(seed_paper_id),
            None,
            None,
        )
        .await
        .unwrap();
    let german_again = ctx
        .jobs()
        .enqueue(
            JobKind::FetchMoreEditions,
            json!({ "language": "de" }),
            JobPriority::Normal,
            Some(seed_paper_id),
            None,
            None,
        )
        .await
        .unwrap();
    let japanese = ctx
        .jobs()
        .enqueue(
            JobKind::FetchMoreEditions,
            json!({ "language": "ja" }),
            JobPriority::Normal,
            Some(seed_paper_id),
            None,
            None,
        )
        .await
        .unwrap();

    assert_eq!(german.id, german_again.id, "same-language request should dedupe");
    assert_ne!(german.id, japanese.id, "a different language is not a duplicate");

    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM jobs WHERE seed_paper_id = $1")
        .bind(seed_paper_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count.0, 2);
}

#[sqlx::test]
async fn heartbeat_updates_progress_and_keeps_running(pool: PgPool) {
    let seed_paper_id = helpers::insert_seed_paper(&pool, "A Paper", ResolutionState::Resolved).await;
    jobs::insert(
        JobKind::ExtractCitations,
        json!({}),
        JobPriority::Normal,
        Some(seed_paper_id),
        None,
        None,
        &pool,
    )
    .await
    .unwrap();
    let locked = jobs::fetch_and_lock_job(&pool).await.unwrap().unwrap();

    jobs::heartbeat(locked.id, 42, Some("halfway there"), &pool).await.unwrap();

    let refreshed = jobs::find(locked.id, &pool).await.unwrap().unwrap();
    assert_eq!(refreshed.progress, 42);
    assert_eq!(refreshed.progress_message.as_deref(), Some("halfway there"));
    assert_eq!(refreshed.status, JobStatus::Running);
}

#[sqlx::test]
async fn complete_and_fail_are_terminal(pool: PgPool) {
    let seed_paper_id = helpers::insert_seed_paper(&pool, "A Paper", ResolutionState::Resolved).await;
    let job = jobs::insert(
        JobKind::ExtractCitations,
        json!({}),
        JobPriority::Normal,
        Some(seed_paper_id),
        None,
        None,
        &pool,
    )
    .await
    .unwrap();
    jobs::fetch_and_lock_job(&pool).await.unwrap();

    jobs::complete(job.id, json!({ "citations_saved": 3 }), &pool).await.unwrap();
    let completed = jobs::find(job.id, &pool).await.unwrap().unwrap();
    assert_eq!(completed.status, JobStatus::Completed);
    assert_eq!(completed.progress, 100);
    assert!(completed.completed_at.is_some());
}

#[sqlx::test]
async fn reset_zombies_frees_stale_running_jobs_not_currently_owned(pool: PgPool) {
    let seed_paper_id = helpers::insert_seed_paper(&pool, "A Paper", ResolutionState::Resolved).await;
    let job = jobs::insert(
        JobKind::ExtractCitations,
        json!({}),
        JobPriority::Normal,
        Some(seed_paper_id),
        None,
        None,
        &pool,
    )
    .await
    .unwrap();
    jobs::fetch_and_lock_job(&pool).await.unwrap();

    // Backdate the heartbeat so it looks like it has been running a long time.
    sqlx::query("UPDATE jobs SET started_at = NOW() - INTERVAL '1 hour' WHERE id = $1")
        .bind(job.id)
        .execute(&pool)
        .await
        .unwrap();

    let reset = jobs::reset_zombies(60, &[], &pool).await.unwrap();
    assert_eq!(reset, vec![job.id]);

    let refreshed = jobs::find(job.id, &pool).await.unwrap().unwrap();
    assert_eq!(refreshed.status, JobStatus::Pending);
    assert!(refreshed.started_at.is_none());
}

#[sqlx::test]
async fn reset_zombies_skips_ids_this_process_still_owns(pool: PgPool) {
    let seed_paper_id = helpers::insert_seed_paper(&pool, "A Paper", ResolutionState::Resolved).await;
    let job = jobs::insert(
        JobKind::ExtractCitations,
        json!({}),
        JobPriority::Normal,
        Some(seed_paper_id),
        None,
        None,
        &pool,
    )
    .await
    .unwrap();
    jobs::fetch_and_lock_job(&pool).await.unwrap();
    sqlx::query("UPDATE jobs SET started_at = NOW() - INTERVAL '1 hour' WHERE id = $1")
        .bind(job.id)
        .execute(&pool)
        .await
        .unwrap();

    let reset = jobs::reset_zombies(60, &[job.id], &pool).await.unwrap();
    assert!(reset.is_empty());
    let refreshed = jobs::find(job.id, &pool).await.unwrap().unwrap();
    assert_eq!(refreshed.status, JobStatus::Running);
}
