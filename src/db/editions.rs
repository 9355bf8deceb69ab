//! Edition operations, a thin pass-through over [`crate::data::editions`].

use crate::data::editions as data;
use crate::data::models::{Edition, HarvestResumeState};
use crate::db::context::DbContext;
use crate::error::Result;
use uuid::Uuid;

pub struct EditionOps<'a> {
    ctx: &'a DbContext,
}

impl<'a> EditionOps<'a> {
    pub fn new(ctx: &'a DbContext) -> Self {
        Self { ctx }
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<Edition>> {
        data::find(id, self.ctx.pool()).await
    }

    pub async fn selected_for_paper(&self, seed_paper_id: Uuid) -> Result<Vec<Edition>> {
        data::selected_for_paper(seed_paper_id, self.ctx.pool()).await
    }

    pub async fn merged_descendant_external_ids(&self, canonical_id: Uuid) -> Result<Vec<String>> {
        data::merged_descendant_external_ids(canonical_id, self.ctx.pool()).await
    }

    pub async fn update_resume_state(&self, id: Uuid, state: &HarvestResumeState) -> Result<()> {
        data::update_resume_state(id, state, self.ctx.pool()).await
    }

    pub async fn refresh_harvested_count(&self, id: Uuid) -> Result<i64> {
        data::refresh_harvested_count(id, self.ctx.pool()).await
    }

    pub async fn increment_stall_count(&self, id: Uuid) -> Result<i32> {
        data::increment_stall_count(id, self.ctx.pool()).await
    }

    pub async fn reset_stall_count(&self, id: Uuid) -> Result<()> {
        data::reset_stall_count(id, self.ctx.pool()).await
    }

    pub async fn find_orphans(&self, year_partition_threshold: i64) -> Result<Vec<Edition>> {
        data::find_orphans(year_partition_threshold, self.ctx.pool()).await
    }

    pub async fn merge_into(&self, id: Uuid, canonical_id: Uuid) -> Result<()> {
        data::merge_into(id, canonical_id, self.ctx.pool()).await
    }
}
