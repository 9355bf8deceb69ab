//! Partition Planner audit-trail operations, a thin pass-through over
//! [`crate::data::partitions`] — this module's SQL doesn't touch progress
//! state others observe, so no domain events are published here.

use crate::data::models::{PartitionLlmCall, PartitionQuery, PartitionRun, PartitionRunStatus, PartitionTermAttempt};
use crate::data::partitions as data;
use crate::db::context::DbContext;
use crate::error::Result;
use uuid::Uuid;

pub struct PartitionOps<'a> {
    ctx: &'a DbContext,
}

impl<'a> PartitionOps<'a> {
    pub fn new(ctx: &'a DbContext) -> Self {
        Self { ctx }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create_run(
        &self,
        edition_id: Uuid,
        parent_run_id: Option<Uuid>,
        recursion_depth: i32,
        query_context: &str,
        language_filter: Option<&str>,
        initial_count: i64,
        target_count: i64,
    ) -> Result<PartitionRun> {
        data::create_run(
            edition_id,
            parent_run_id,
            recursion_depth,
            query_context,
            language_filter,
            initial_count,
            target_count,
            self.ctx.pool(),
        )
        .await
    }

    pub async fn find_run(&self, id: Uuid) -> Result<Option<PartitionRun>> {
        data::find_run(id, self.ctx.pool()).await
    }

    pub async fn set_status(&self, id: Uuid, status: PartitionRunStatus) -> Result<()> {
        data::set_status(id, status, self.ctx.pool()).await
    }

    pub async fn set_error_stage(&self, id: Uuid, stage: &str) -> Result<()> {
        data::set_error_stage(id, stage, self.ctx.pool()).await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn finalize_run(
        &self,
        id: Uuid,
        exclusion_set_count: i32,
        exclusion_harvested: i64,
        inclusion_harvested: i64,
        terms_kept: &[String],
        gap_details: Option<serde_json::Value>,
    ) -> Result<()> {
        data::finalize_run(
            id,
            exclusion_set_count,
            exclusion_harvested,
            inclusion_harvested,
            terms_kept,
            gap_details,
            self.ctx.pool(),
        )
        .await
    }

    pub async fn children_of(&self, parent_run_id: Uuid) -> Result<Vec<PartitionRun>> {
        data::children_of(parent_run_id, self.ctx.pool()).await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn record_llm_call(
        &self,
        partition_run_id: Uuid,
        call_number: i32,
        prompt: &str,
        response: &str,
        input_tokens: i32,
        output_tokens: i32,
        latency_ms: i32,
        terms_suggested: &[String],
    ) -> Result<PartitionLlmCall> {
        data::record_llm_call(
            partition_run_id,
            call_number,
            prompt,
            response,
            input_tokens,
            output_tokens,
            latency_ms,
            terms_suggested,
            self.ctx.pool(),
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn record_term_attempt(
        &self,
        partition_run_id: Uuid,
        llm_call_id: Uuid,
        term: &str,
        attempt_number: i32,
        count_before: i64,
        count_after: i64,
        kept: bool,
    ) -> Result<PartitionTermAttempt> {
        data::record_term_attempt(
            partition_run_id,
            llm_call_id,
            term,
            attempt_number,
            count_before,
            count_after,
            kept,
            self.ctx.pool(),
        )
        .await
    }

    pub async fn attempt_count(&self, partition_run_id: Uuid) -> Result<i64> {
        data::attempt_count(partition_run_id, self.ctx.pool()).await
    }

    pub async fn consecutive_zero_reductions(&self, partition_run_id: Uuid) -> Result<i32> {
        data::consecutive_zero_reductions(partition_run_id, self.ctx.pool()).await
    }

    pub async fn record_query(
        &self,
        partition_run_id: Uuid,
        query_kind: &str,
        query_text: &str,
        reported_count: i64,
    ) -> Result<PartitionQuery> {
        data::record_query(partition_run_id, query_kind, query_text, reported_count, self.ctx.pool()).await
    }
}
