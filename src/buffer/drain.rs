//! Background drain of the durable page buffer, run as a managed
//! [`Service`] alongside the job engine.

use crate::buffer::page::PageBuffer;
use crate::db::DbContext;
use crate::services::Service;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct BufferDrainService {
    buffer: Arc<PageBuffer>,
    db: DbContext,
    drain_interval: Duration,
    cleanup_max_age: Duration,
}

impl BufferDrainService {
    pub fn new(buffer: Arc<PageBuffer>, db: DbContext, cleanup_max_age: Duration) -> Self {
        Self {
            buffer,
            db,
            drain_interval: Duration::from_secs(30),
            cleanup_max_age,
        }
    }

    async fn drain_once(&self) -> crate::error::Result<()> {
        for page in self.buffer.pending_pages().await? {
            match self
                .db
                .citations()
                .upsert_batch(page.seed_paper_id, page.target_edition_id, &page.papers)
                .await
            {
                Ok(counts) => {
                    info!(
                        job_id = %page.job_id,
                        page_num = page.page_num,
                        new = counts.new_citations,
                        duplicates = counts.duplicates,
                        "drained retryable page"
                    );
                    self.buffer.mark_saved(page.job_id, page.page_num).await?;
                }
                Err(e) => {
                    warn!(job_id = %page.job_id, page_num = page.page_num, error = %e, "retry still failing");
                    self.buffer.mark_failed(page, &e.to_string()).await?;
                }
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        let removed = self.buffer.cleanup_old(self.cleanup_max_age).await?;
        if removed > 0 {
            info!(removed, "cleaned up stale in-progress pages");
        }
        Ok(())
    }
}

#[async_trait]
impl Service for BufferDrainService {
    fn name(&self) -> &'static str {
        "buffer_drain"
    }

    async fn run(&mut self) -> Result<(), anyhow::Error> {
        let mut interval = tokio::time::interval(self.drain_interval);
        loop {
            interval.tick().await;
            if let Err(e) = self.drain_once().await {
                warn!(error = %e, "buffer drain pass failed");
            }
        }
    }

    async fn shutdown(&mut self) -> Result<(), anyhow::Error> {
        Ok(())
    }
}
