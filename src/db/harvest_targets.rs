//! Harvest-target bookkeeping with completion events, mirroring [`crate::db::jobs`].

use crate::data::harvest_targets as data;
use crate::data::models::{HarvestTarget, HarvestTargetStatus};
use crate::db::context::DbContext;
use crate::error::Result;
use crate::events::{DomainEvent, HarvestTargetEvent};
use uuid::Uuid;

pub struct HarvestTargetOps<'a> {
    ctx: &'a DbContext,
}

impl<'a> HarvestTargetOps<'a> {
    pub fn new(ctx: &'a DbContext) -> Self {
        Self { ctx }
    }

    pub async fn find(&self, edition_id: Uuid, partition_key: &str) -> Result<Option<HarvestTarget>> {
        data::find(edition_id, partition_key, self.ctx.pool()).await
    }

    pub async fn upsert_expected(
        &self,
        edition_id: Uuid,
        partition_key: &str,
        expected_count: i64,
    ) -> Result<HarvestTarget> {
        data::upsert_expected(edition_id, partition_key, expected_count, self.ctx.pool()).await
    }

    pub async fn record_page_attempt(&self, edition_id: Uuid, partition_key: &str, succeeded: bool) -> Result<()> {
        if succeeded {
            data::record_page_attempt(edition_id, partition_key, true, self.ctx.pool()).await
        } else {
            data::record_page_attempt(edition_id, partition_key, false, self.ctx.pool()).await
        }
    }

    pub async fn increment_actual(&self, edition_id: Uuid, partition_key: &str, delta: i64) -> Result<()> {
        data::increment_actual(edition_id, partition_key, delta, self.ctx.pool()).await
    }

    pub async fn finalize(
        &self,
        edition_id: Uuid,
        partition_key: &str,
        status: HarvestTargetStatus,
        gap_reason: Option<&str>,
        gap_details: Option<serde_json::Value>,
        final_gs_count: Option<i64>,
        target_id: Uuid,
    ) -> Result<()> {
        data::finalize(edition_id, partition_key, status, gap_reason, gap_details, final_gs_count, self.ctx.pool())
            .await?;
        self.ctx.events().publish(DomainEvent::HarvestTarget(HarvestTargetEvent::Completed {
            id: target_id,
            gap_reason: gap_reason.map(str::to_string),
        }));
        Ok(())
    }

    pub async fn incomplete_for_edition(&self, edition_id: Uuid) -> Result<Vec<HarvestTarget>> {
        data::incomplete_for_edition(edition_id, self.ctx.pool()).await
    }

    pub async fn all_for_edition(&self, edition_id: Uuid) -> Result<Vec<HarvestTarget>> {
        data::all_for_edition(edition_id, self.ctx.pool()).await
    }

    pub async fn gap_summary(&self, edition_id: Uuid) -> Result<(i64, i64)> {
        data::gap_summary(edition_id, self.ctx.pool()).await
    }

    pub async fn auto_complete_remaining(&self, edition_id: Uuid, gap_reason: &str) -> Result<u64> {
        let affected = data::auto_complete_remaining(edition_id, gap_reason, self.ctx.pool()).await?;
        if affected > 0 {
            self.ctx
                .events()
                .publish(DomainEvent::HarvestTarget(HarvestTargetEvent::Completed { id: edition_id, gap_reason: Some(gap_reason.to_string()) }));
        }
        Ok(affected)
    }
}
