//! Shared database handle: a connection pool plus the event bus ops publish
//! into.

use crate::db::{
    aggregate::AggregateOps, citations::CitationOps, editions::EditionOps, failed_fetches::FailedFetchOps,
    harvest_targets::HarvestTargetOps, jobs::JobOps, partitions::PartitionOps, seed_papers::SeedPaperOps,
};
use crate::events::EventBuffer;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct DbContext {
    pool: PgPool,
    events: Arc<EventBuffer>,
}

impl DbContext {
    pub fn new(pool: PgPool, events: Arc<EventBuffer>) -> Self {
        Self { pool, events }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn events(&self) -> &Arc<EventBuffer> {
        &self.events
    }

    pub fn jobs(&self) -> JobOps<'_> {
        JobOps::new(self)
    }

    pub fn citations(&self) -> CitationOps<'_> {
        CitationOps::new(self)
    }

    pub fn harvest_targets(&self) -> HarvestTargetOps<'_> {
        HarvestTargetOps::new(self)
    }

    pub fn partitions(&self) -> PartitionOps<'_> {
        PartitionOps::new(self)
    }

    pub fn failed_fetches(&self) -> FailedFetchOps<'_> {
        FailedFetchOps::new(self)
    }

    pub fn seed_papers(&self) -> SeedPaperOps<'_> {
        SeedPaperOps::new(self)
    }

    pub fn editions(&self) -> EditionOps<'_> {
        EditionOps::new(self)
    }

    pub fn aggregate(&self) -> AggregateOps<'_> {
        AggregateOps::new(self)
    }
}
