#[allow(dead_code)]
mod helpers;

use citegraph_harvester::data::citations;
use citegraph_harvester::data::models::ResolutionState;
use citegraph_harvester::search::ParsedResult;
use sqlx::PgPool;

fn result(external_id: &str, title: &str, year: Option<i32>) -> ParsedResult {
    ParsedResult {
        external_id: external_id.to_string(),
        cluster_id: None,
        title: title.to_string(),
        raw_authors: Some("J. Doe".to_string()),
        year,
        venue: Some("Journal of Tests".to_string()),
        abstract_snippet: None,
        link: None,
        citation_count: None,
        author_profile_links: vec![],
    }
}

#[sqlx::test]
async fn upsert_batch_empty_slice_is_a_noop(pool: PgPool) {
    let seed_paper_id = helpers::insert_seed_paper(&pool, "Seed", ResolutionState::Resolved).await;
    let edition_id = helpers::insert_edition(&pool, seed_paper_id, "ext-1", Some(10)).await;

    let counts = citations::upsert_batch(seed_paper_id, edition_id, &[], &pool).await.unwrap();
    assert_eq!(counts.new_citations, 0);
    assert_eq!(counts.duplicates, 0);
}

#[sqlx::test]
async fn upsert_batch_inserts_new_rows(pool: PgPool) {
    let seed_paper_id = helpers::insert_seed_paper(&pool, "Seed", ResolutionState::Resolved).await;
    let edition_id = helpers::insert_edition(&pool, seed_paper_id, "ext-1", Some(10)).await;

    let results = vec![
        result("cite-1", "Citing Paper One", Some(2019)),
        result("cite-2", "Citing Paper Two", Some(2020)),
    ];
    let counts = citations::upsert_batch(seed_paper_id, edition_id, &results, &pool).await.unwrap();
    assert_eq!(counts.new_citations, 2);
    assert_eq!(counts.duplicates, 0);

    let stored = citations::count_for_edition(edition_id, &pool).await.unwrap();
    assert_eq!(stored, 2);
}

#[sqlx::test]
async fn upsert_batch_reencounter_increments_counter_instead_of_duplicating(pool: PgPool) {
    let seed_paper_id = helpers::insert_seed_paper(&pool, "Seed", ResolutionState::Resolved).await;
    let edition_id = helpers::insert_edition(&pool, seed_paper_id, "ext-1", Some(10)).await;

    let first_pass = vec![result("cite-1", "Citing Paper", Some(2019))];
    citations::upsert_batch(seed_paper_id, edition_id, &first_pass, &pool).await.unwrap();

    let second_pass = vec![result("cite-1", "Citing Paper", Some(2019))];
    let counts = citations::upsert_batch(seed_paper_id, edition_id, &second_pass, &pool).await.unwrap();
    assert_eq!(counts.new_citations, 0);
    assert_eq!(counts.duplicates, 1);

    let encounter_count: (i32,) = sqlx::query_as("SELECT encounter_count FROM citations WHERE external_result_id = 'cite-1'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(encounter_count.0, 2);

    // Only one row exists per (seed_paper_id, external_result_id).
    let stored = citations::count_for_edition(edition_id, &pool).await.unwrap();
    assert_eq!(stored, 1);
}

#[sqlx::test]
async fn count_for_edition_year_filters_by_year(pool: PgPool) {
    let seed_paper_id = helpers::insert_seed_paper(&pool, "Seed", ResolutionState::Resolved).await;
    let edition_id = helpers::insert_edition(&pool, seed_paper_id, "ext-1", Some(10)).await;

    let results = vec![
        result("cite-2019", "From 2019", Some(2019)),
        result("cite-2020-a", "From 2020 A", Some(2020)),
        result("cite-2020-b", "From 2020 B", Some(2020)),
    ];
    citations::upsert_batch(seed_paper_id, edition_id, &results, &pool).await.unwrap();

    assert_eq!(citations::count_for_edition_year(edition_id, 2020, &pool).await.unwrap(), 2);
    assert_eq!(citations::count_for_edition_year(edition_id, 2019, &pool).await.unwrap(), 1);
    assert_eq!(citations::count_for_edition_year(edition_id, 1999, &pool).await.unwrap(), 0);
}
