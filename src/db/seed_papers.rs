//! SeedPaper operations, a thin pass-through over [`crate::data::seed_papers`].

use crate::data::models::SeedPaper;
use crate::data::seed_papers as data;
use crate::db::context::DbContext;
use crate::error::Result;
use uuid::Uuid;

pub struct SeedPaperOps<'a> {
    ctx: &'a DbContext,
}

impl<'a> SeedPaperOps<'a> {
    pub fn new(ctx: &'a DbContext) -> Self {
        Self { ctx }
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<SeedPaper>> {
        data::find(id, self.ctx.pool()).await
    }

    pub async fn mark_resolved(&self, id: Uuid, external_id: &str) -> Result<()> {
        data::mark_resolved(id, external_id, self.ctx.pool()).await
    }

    pub async fn refresh_rollups(&self, id: Uuid) -> Result<()> {
        data::refresh_rollups(id, self.ctx.pool()).await
    }

    pub async fn find_auto_resume_candidates(
        &self,
        skip_threshold: i64,
        stall_limit: i32,
    ) -> Result<Vec<(Uuid, Uuid)>> {
        data::find_auto_resume_candidates(skip_threshold, stall_limit, self.ctx.pool()).await
    }
}
