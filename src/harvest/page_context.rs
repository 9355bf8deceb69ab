//! Per-page callback contract, replacing nested mutable counters captured by
//! closures with a plain struct passed by reference.
//!
//! The single most important invariant of the harvester lives here: after
//! every parsed page, before the fetch loop continues, papers are written to
//! the durable Page Buffer *and* upserted into the Citation store, and both
//! the HarvestTarget row and the Edition's `harvest_resume_state` are updated
//! — all before the caller is allowed to request the next page.

use crate::buffer::{BufferedPage, PageBuffer};
use crate::data::models::HarvestResumeState;
use crate::db::DbContext;
use crate::error::Result;
use crate::search::ParsedResult;
use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

/// Mutable state threaded through one edition/partition harvest task.
pub struct PageSaveContext {
    pub job_id: Uuid,
    pub seed_paper_id: Uuid,
    /// The canonical edition citations are recorded against.
    pub target_edition_id: Uuid,
    /// The edition whose `harvest_resume_state` column this task owns. Equal
    /// to `target_edition_id` except when sweeping a merged descendant's
    /// external id on the canonical edition's behalf.
    pub resume_edition_id: Uuid,
    pub partition_key: String,
    pub resume_state: HarvestResumeState,
    /// Whether `on_page` persists `resume_state` back to the Edition row.
    /// The top-level year/direct-fetch context owns that column; language
    /// and author-letter sub-partitions share the same `resume_edition_id`
    /// but must not overwrite its year-level checkpoint with their own
    /// page cursor.
    pub track_resume: bool,
    pub total_new_citations: i64,
    pub total_duplicates: i64,
    pub pages_processed: u32,
}

impl PageSaveContext {
    pub fn new(
        job_id: Uuid,
        seed_paper_id: Uuid,
        target_edition_id: Uuid,
        resume_edition_id: Uuid,
        partition_key: impl Into<String>,
        resume_state: HarvestResumeState,
    ) -> Self {
        Self {
            job_id,
            seed_paper_id,
            target_edition_id,
            resume_edition_id,
            partition_key: partition_key.into(),
            resume_state,
            track_resume: true,
            total_new_citations: 0,
            total_duplicates: 0,
            pages_processed: 0,
        }
    }

    /// A context for a sub-partition (language or author-letter pool) that
    /// shares its parent's `resume_edition_id` without owning its checkpoint.
    pub fn new_sub_partition(
        job_id: Uuid,
        seed_paper_id: Uuid,
        target_edition_id: Uuid,
        resume_edition_id: Uuid,
        partition_key: impl Into<String>,
    ) -> Self {
        let mut ctx = Self::new(job_id, seed_paper_id, target_edition_id, resume_edition_id, partition_key, HarvestResumeState::default());
        ctx.track_resume = false;
        ctx
    }

    /// Handle one successfully parsed page: buffer, upsert, bookkeep, resume.
    pub async fn on_page(
        &mut self,
        db: &DbContext,
        buffer: &PageBuffer,
        page_num: u32,
        results: Vec<ParsedResult>,
    ) -> Result<()> {
        let page = BufferedPage {
            job_id: self.job_id,
            seed_paper_id: self.seed_paper_id,
            edition_id: self.resume_edition_id,
            target_edition_id: self.target_edition_id,
            partition_key: self.partition_key.clone(),
            page_num,
            papers: results.clone(),
            created_at: Utc::now(),
            retry_count: 0,
            last_error: None,
        };
        buffer.save_page(&page).await?;

        match db.citations().upsert_batch(self.seed_paper_id, self.target_edition_id, &results).await {
            Ok(counts) => {
                buffer.mark_saved(self.job_id, page_num).await?;
                self.total_new_citations += counts.new_citations;
                self.total_duplicates += counts.duplicates;
                self.pages_processed += 1;
                db.harvest_targets()
                    .increment_actual(self.target_edition_id, &self.partition_key, counts.new_citations)
                    .await?;
                db.harvest_targets()
                    .record_page_attempt(self.target_edition_id, &self.partition_key, true)
                    .await?;
            }
            Err(e) => {
                warn!(job_id = %self.job_id, page_num, error = %e, "citation upsert failed, buffering for retry");
                buffer.mark_failed(page, &e.to_string()).await?;
                db.harvest_targets()
                    .record_page_attempt(self.target_edition_id, &self.partition_key, false)
                    .await?;
            }
        }

        if self.track_resume {
            self.resume_state.last_page = page_num + 1;
            db.editions().update_resume_state(self.resume_edition_id, &self.resume_state).await?;
        }
        Ok(())
    }

    /// Handle a page whose fetch retries were exhausted.
    pub async fn on_page_failed(&self, db: &DbContext, page_num: u32, url: &str, err: &str) -> Result<()> {
        db.failed_fetches()
            .insert(self.target_edition_id, &self.partition_key, page_num as i32, url, err)
            .await?;
        db.harvest_targets()
            .record_page_attempt(self.target_edition_id, &self.partition_key, false)
            .await?;
        Ok(())
    }
}
