#[allow(dead_code)]
mod helpers;

use citegraph_harvester::data::editions;
use citegraph_harvester::data::models::ResolutionState;
use sqlx::PgPool;

#[sqlx::test]
async fn merge_into_sets_canonical_root(pool: PgPool) {
    let seed_paper_id = helpers::insert_seed_paper(&pool, "A Paper", ResolutionState::Resolved).await;
    let root = helpers::insert_edition(&pool, seed_paper_id, "ext-root", Some(100)).await;
    let translation = helpers::insert_edition(&pool, seed_paper_id, "ext-translation", Some(10)).await;

    editions::merge_into(translation, root, &pool).await.unwrap();

    let merged = editions::find(translation, &pool).await.unwrap().unwrap();
    assert_eq!(merged.merged_into_edition_id, Some(root));
}

#[sqlx::test]
async fn merge_into_is_idempotent(pool: PgPool) {
    let seed_paper_id = helpers::insert_seed_paper(&pool, "A Paper", ResolutionState::Resolved).await;
    let root = helpers::insert_edition(&pool, seed_paper_id, "ext-root", Some(100)).await;
    let translation = helpers::insert_edition(&pool, seed_paper_id, "ext-translation", Some(10)).await;

    editions::merge_into(translation, root, &pool).await.unwrap();
    editions::merge_into(translation, root, &pool).await.unwrap();

    let merged = editions::find(translation, &pool).await.unwrap().unwrap();
    assert_eq!(merged.merged_into_edition_id, Some(root));
}

#[sqlx::test]
async fn merge_into_rejects_self_merge(pool: PgPool) {
    let seed_paper_id = helpers::insert_seed_paper(&pool, "A Paper", ResolutionState::Resolved).await;
    let edition_id = helpers::insert_edition(&pool, seed_paper_id, "ext-1", Some(10)).await;

    let result = editions::merge_into(edition_id, edition_id, &pool).await;
    assert!(result.is_err());
}

#[sqlx::test]
async fn merge_into_rejects_a_cycle(pool: PgPool) {
    let seed_paper_id = helpers::insert_seed_paper(&pool, "A Paper", ResolutionState::Resolved).await;
    let a = helpers::insert_edition(&pool, seed_paper_id, "ext-a", Some(100)).await;
    let b = helpers::insert_edition(&pool, seed_paper_id, "ext-b", Some(10)).await;

    // b merges into a...
    editions::merge_into(b, a, &pool).await.unwrap();
    // ...so a merging into b would close a cycle.
    let result = editions::merge_into(a, b, &pool).await;
    assert!(result.is_err(), "merging a root into its own descendant should be rejected");

    let a_after = editions::find(a, &pool).await.unwrap().unwrap();
    assert_eq!(a_after.merged_into_edition_id, None, "rejected merge must not mutate the row");
}

#[sqlx::test]
async fn merged_descendant_external_ids_follows_transitive_merges(pool: PgPool) {
    let seed_paper_id = helpers::insert_seed_paper(&pool, "A Paper", ResolutionState::Resolved).await;
    let root = helpers::insert_edition(&pool, seed_paper_id, "ext-root", Some(100)).await;
    let child = helpers::insert_edition(&pool, seed_paper_id, "ext-child", Some(10)).await;
    let grandchild = helpers::insert_edition(&pool, seed_paper_id, "ext-grandchild", Some(5)).await;

    editions::merge_into(child, root, &pool).await.unwrap();
    editions::merge_into(grandchild, child, &pool).await.unwrap();

    let mut descendants = editions::merged_descendant_external_ids(root, &pool).await.unwrap();
    descendants.sort();
    assert_eq!(descendants, vec!["ext-child".to_string(), "ext-grandchild".to_string()]);
}
