use citegraph_harvester::data::models::ResolutionState;
use sqlx::PgPool;
use uuid::Uuid;

/// Insert a SeedPaper row with sensible defaults, returning its id.
#[allow(dead_code)]
pub async fn insert_seed_paper(pool: &PgPool, title: &str, resolution_state: ResolutionState) -> Uuid {
    let external_id = matches!(resolution_state, ResolutionState::Resolved).then(|| format!("ext-{title}"));
    let (id,): (Uuid,) = sqlx::query_as(
        "INSERT INTO seed_papers (canonical_title, resolution_state, external_id) \
         VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(title)
    .bind(resolution_state)
    .bind(external_id)
    .fetch_one(pool)
    .await
    .expect("insert_seed_paper failed");
    id
}

/// Insert an Edition row tied to `seed_paper_id`, returning its id.
#[allow(dead_code)]
pub async fn insert_edition(
    pool: &PgPool,
    seed_paper_id: Uuid,
    external_id: &str,
    reported_citation_count: Option<i64>,
) -> Uuid {
    let (id,): (Uuid,) = sqlx::query_as(
        "INSERT INTO editions (seed_paper_id, external_id, title, reported_citation_count, selected) \
         VALUES ($1, $2, $3, $4, true) RETURNING id",
    )
    .bind(seed_paper_id)
    .bind(external_id)
    .bind(format!("edition of {seed_paper_id}"))
    .bind(reported_citation_count)
    .fetch_one(pool)
    .await
    .expect("insert_edition failed");
    id
}
