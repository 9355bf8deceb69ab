#[allow(dead_code)]
mod helpers;

use citegraph_harvester::data::harvest_targets;
use citegraph_harvester::data::models::{HarvestTargetStatus, ResolutionState};
use sqlx::PgPool;

#[sqlx::test]
async fn upsert_expected_creates_row_on_first_probe(pool: PgPool) {
    let seed_paper_id = helpers::insert_seed_paper(&pool, "A Paper", ResolutionState::Resolved).await;
    let edition_id = helpers::insert_edition(&pool, seed_paper_id, "ext-1", Some(10)).await;

    let target = harvest_targets::upsert_expected(edition_id, "en:2020", 37, &pool).await.unwrap();
    assert_eq!(target.expected_count, 37);
    assert_eq!(target.original_expected, 37);
    assert_eq!(target.status, HarvestTargetStatus::Harvesting);
}

#[sqlx::test]
async fn upsert_expected_on_conflict_updates_expected_but_preserves_original(pool: PgPool) {
    let seed_paper_id = helpers::insert_seed_paper(&pool, "A Paper", ResolutionState::Resolved).await;
    let edition_id = helpers::insert_edition(&pool, seed_paper_id, "ext-1", Some(10)).await;

    harvest_targets::upsert_expected(edition_id, "en:2020", 37, &pool).await.unwrap();
    let updated = harvest_targets::upsert_expected(edition_id, "en:2020", 40, &pool).await.unwrap();

    assert_eq!(updated.expected_count, 40);
    assert_eq!(updated.original_expected, 37, "original_expected should be set only on first probe");
}

#[sqlx::test]
async fn increment_actual_and_record_page_attempt_accumulate(pool: PgPool) {
    let seed_paper_id = helpers::insert_seed_paper(&pool, "A Paper", ResolutionState::Resolved).await;
    let edition_id = helpers::insert_edition(&pool, seed_paper_id, "ext-1", Some(10)).await;
    harvest_targets::upsert_expected(edition_id, "en:2020", 37, &pool).await.unwrap();

    harvest_targets::increment_actual(edition_id, "en:2020", 10, &pool).await.unwrap();
    harvest_targets::increment_actual(edition_id, "en:2020", 5, &pool).await.unwrap();
    harvest_targets::record_page_attempt(edition_id, "en:2020", true, &pool).await.unwrap();
    harvest_targets::record_page_attempt(edition_id, "en:2020", true, &pool).await.unwrap();
    harvest_targets::record_page_attempt(edition_id, "en:2020", false, &pool).await.unwrap();

    let target = harvest_targets::find(edition_id, "en:2020", &pool).await.unwrap().unwrap();
    assert_eq!(target.actual_count, 15);
    assert_eq!(target.pages_attempted, 3);
    assert_eq!(target.pages_succeeded, 2);
    assert_eq!(target.pages_failed, 1);
}

#[sqlx::test]
async fn finalize_records_terminal_status_and_gap_reason(pool: PgPool) {
    let seed_paper_id = helpers::insert_seed_paper(&pool, "A Paper", ResolutionState::Resolved).await;
    let edition_id = helpers::insert_edition(&pool, seed_paper_id, "ext-1", Some(10)).await;
    harvest_targets::upsert_expected(edition_id, "en:2020", 37, &pool).await.unwrap();

    harvest_targets::finalize(
        edition_id,
        "en:2020",
        HarvestTargetStatus::Incomplete,
        Some("result_count_mismatch"),
        Some(serde_json::json!({ "expected": 37, "actual": 20 })),
        Some(20),
        &pool,
    )
    .await
    .unwrap();

    let target = harvest_targets::find(edition_id, "en:2020", &pool).await.unwrap().unwrap();
    assert_eq!(target.status, HarvestTargetStatus::Incomplete);
    assert_eq!(target.gap_reason.as_deref(), Some("result_count_mismatch"));
    assert_eq!(target.final_gs_count, Some(20));
}

#[sqlx::test]
async fn incomplete_for_edition_excludes_completed_targets(pool: PgPool) {
    let seed_paper_id = helpers::insert_seed_paper(&pool, "A Paper", ResolutionState::Resolved).await;
    let edition_id = helpers::insert_edition(&pool, seed_paper_id, "ext-1", Some(10)).await;

    harvest_targets::upsert_expected(edition_id, "en:2019", 10, &pool).await.unwrap();
    harvest_targets::upsert_expected(edition_id, "en:2020", 10, &pool).await.unwrap();
    harvest_targets::finalize(edition_id, "en:2019", HarvestTargetStatus::Complete, None, None, Some(10), &pool)
        .await
        .unwrap();

    let incomplete = harvest_targets::incomplete_for_edition(edition_id, &pool).await.unwrap();
    assert_eq!(incomplete.len(), 1);
    assert_eq!(incomplete[0].partition_key, "en:2020");
}

#[sqlx::test]
async fn all_for_edition_returns_every_target_regardless_of_status(pool: PgPool) {
    let seed_paper_id = helpers::insert_seed_paper(&pool, "A Paper", ResolutionState::Resolved).await;
    let edition_id = helpers::insert_edition(&pool, seed_paper_id, "ext-1", Some(10)).await;

    harvest_targets::upsert_expected(edition_id, "en:2019", 10, &pool).await.unwrap();
    harvest_targets::upsert_expected(edition_id, "en:2020", 10, &pool).await.unwrap();
    harvest_targets::finalize(edition_id, "en:2019", HarvestTargetStatus::Complete, None, None, Some(10), &pool)
        .await
        .unwrap();

    let all = harvest_targets::all_for_edition(edition_id, &pool).await.unwrap();
    assert_eq!(all.len(), 2);
}

#[sqlx::test]
async fn gap_summary_sums_expected_and_actual_across_targets(pool: PgPool) {
    let seed_paper_id = helpers::insert_seed_paper(&pool, "A Paper", ResolutionState::Resolved).await;
    let edition_id = helpers::insert_edition(&pool, seed_paper_id, "ext-1", Some(10)).await;

    harvest_targets::upsert_expected(edition_id, "en:2019", 30, &pool).await.unwrap();
    harvest_targets::upsert_expected(edition_id, "en:2020", 70, &pool).await.unwrap();
    harvest_targets::increment_actual(edition_id, "en:2019", 30, &pool).await.unwrap();
    harvest_targets::increment_actual(edition_id, "en:2020", 50, &pool).await.unwrap();

    let (expected, actual) = harvest_targets::gap_summary(edition_id, &pool).await.unwrap();
    assert_eq!(expected, 100);
    assert_eq!(actual, 80);
}

#[sqlx::test]
async fn auto_complete_remaining_only_touches_non_complete_targets(pool: PgPool) {
    let seed_paper_id = helpers::insert_seed_paper(&pool, "A Paper", ResolutionState::Resolved).await;
    let edition_id = helpers::insert_edition(&pool, seed_paper_id, "ext-1", Some(10)).await;

    harvest_targets::upsert_expected(edition_id, "en:2019", 10, &pool).await.unwrap();
    harvest_targets::upsert_expected(edition_id, "en:2020", 10, &pool).await.unwrap();
    harvest_targets::finalize(edition_id, "en:2019", HarvestTargetStatus::Complete, None, None, Some(10), &pool)
        .await
        .unwrap();

    let affected = harvest_targets::auto_complete_remaining(edition_id, "stall_residual_gap", &pool).await.unwrap();
    assert_eq!(affected, 1);

    let target_2020 = harvest_targets::find(edition_id, "en:2020", &pool).await.unwrap().unwrap();
    assert_eq!(target_2020.status, HarvestTargetStatus::Complete);
    assert_eq!(target_2020.gap_reason.as_deref(), Some("stall_residual_gap"));

    let target_2019 = harvest_targets::find(edition_id, "en:2019", &pool).await.unwrap().unwrap();
    assert_eq!(target_2019.gap_reason, None, "already-complete target's gap_reason should be untouched");
}
