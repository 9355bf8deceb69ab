//! Aggregate Updater: recomputes Edition and SeedPaper rollups after
//! each page/edition/paper completion. Each step is its own short statement
//! rather than a long-held transaction, so no lock is ever held across a
//! Search Client or LLM call.

use crate::db::context::DbContext;
use crate::error::Result;
use tracing::debug;
use uuid::Uuid;

pub struct AggregateOps<'a> {
    ctx: &'a DbContext,
}

impl<'a> AggregateOps<'a> {
    pub fn new(ctx: &'a DbContext) -> Self {
        Self { ctx }
    }

    /// Refresh one Edition's harvested count, then roll that up into its
    /// SeedPaper. Safe to call after every buffered page is drained.
    pub async fn refresh_edition(&self, edition_id: Uuid, seed_paper_id: Uuid) -> Result<i64> {
        let count = self.ctx.editions().refresh_harvested_count(edition_id).await?;
        self.ctx.seed_papers().refresh_rollups(seed_paper_id).await?;
        debug!(%edition_id, %seed_paper_id, harvested = count, "refreshed aggregate rollups");
        Ok(count)
    }

    /// Refresh every selected Edition for a paper, then the paper rollup
    /// once at the end.
    pub async fn refresh_paper(&self, seed_paper_id: Uuid) -> Result<()> {
        for edition in self.ctx.editions().selected_for_paper(seed_paper_id).await? {
            self.ctx.editions().refresh_harvested_count(edition.id).await?;
        }
        self.ctx.seed_papers().refresh_rollups(seed_paper_id).await?;
        Ok(())
    }
}
