//! Failed-fetch retry ledger, a thin pass-through over [`crate::data::failed_fetches`].

use crate::data::failed_fetches as data;
use crate::data::models::FailedFetch;
use crate::db::context::DbContext;
use crate::error::Result;
use uuid::Uuid;

pub struct FailedFetchOps<'a> {
    ctx: &'a DbContext,
}

impl<'a> FailedFetchOps<'a> {
    pub fn new(ctx: &'a DbContext) -> Self {
        Self { ctx }
    }

    pub async fn insert(
        &self,
        edition_id: Uuid,
        partition_key: &str,
        page_offset: i32,
        url: &str,
        last_error: &str,
    ) -> Result<FailedFetch> {
        data::insert(edition_id, partition_key, page_offset, url, last_error, self.ctx.pool()).await
    }

    pub async fn retryable(&self, limit: i64) -> Result<Vec<FailedFetch>> {
        data::retryable(limit, self.ctx.pool()).await
    }

    pub async fn mark_retrying(&self, id: Uuid) -> Result<()> {
        data::mark_retrying(id, self.ctx.pool()).await
    }

    pub async fn mark_succeeded(&self, id: Uuid, recovered_citations: i32) -> Result<()> {
        data::mark_succeeded(id, recovered_citations, self.ctx.pool()).await
    }

    pub async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()> {
        data::mark_failed(id, error, self.ctx.pool()).await
    }

    pub async fn abandon(&self, id: Uuid) -> Result<()> {
        data::abandon(id, self.ctx.pool()).await
    }
}
