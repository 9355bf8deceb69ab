//! Citation Store Writer with harvest-target progress events.

use crate::data::citations::{self as data, UpsertCounts};
use crate::db::context::DbContext;
use crate::error::Result;
use crate::events::{DomainEvent, HarvestTargetEvent};
use crate::search::ParsedResult;
use uuid::Uuid;

pub struct CitationOps<'a> {
    ctx: &'a DbContext,
}

impl<'a> CitationOps<'a> {
    pub fn new(ctx: &'a DbContext) -> Self {
        Self { ctx }
    }

    pub async fn upsert_batch(
        &self,
        seed_paper_id: Uuid,
        edition_id: Uuid,
        results: &[ParsedResult],
    ) -> Result<UpsertCounts> {
        let counts = data::upsert_batch(seed_paper_id, edition_id, results, self.ctx.pool()).await?;
        self.ctx.events().publish(DomainEvent::HarvestTarget(HarvestTargetEvent::Progress {
            id: edition_id,
            fetched_count: counts.new_citations + counts.duplicates,
            reported_count: 0,
        }));
        Ok(counts)
    }

    pub async fn count_for_edition(&self, edition_id: Uuid) -> Result<i64> {
        data::count_for_edition(edition_id, self.ctx.pool()).await
    }

    pub async fn count_for_edition_year(&self, edition_id: Uuid, year: i32) -> Result<i64> {
        data::count_for_edition_year(edition_id, year, self.ctx.pool()).await
    }
}
