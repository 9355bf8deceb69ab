//! Job-queue operations that wrap [`crate::data::jobs`] with event emission.

use crate::data::jobs as data;
use crate::data::models::{Job, JobKind, JobPriority};
use crate::db::context::DbContext;
use crate::error::Result;
use crate::events::{DomainEvent, JobEvent};
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub struct JobOps<'a> {
    ctx: &'a DbContext,
}

impl<'a> JobOps<'a> {
    pub fn new(ctx: &'a DbContext) -> Self {
        Self { ctx }
    }

    pub async fn fetch_and_lock(&self) -> Result<Option<Job>> {
        let job = data::fetch_and_lock_job(self.ctx.pool()).await?;
        if let Some(job) = &job {
            self.ctx.events().publish(DomainEvent::Job(JobEvent::Locked { id: job.id }));
        }
        Ok(job)
    }

    pub async fn heartbeat(&self, job_id: Uuid, progress: i32, message: Option<&str>) -> Result<()> {
        data::heartbeat(job_id, progress, message, self.ctx.pool()).await
    }

    pub async fn complete(&self, job: &Job, result: serde_json::Value) -> Result<()> {
        data::complete(job.id, result, self.ctx.pool()).await?;
        self.ctx.events().publish(DomainEvent::Job(JobEvent::Completed {
            id: job.id,
            kind: format!("{:?}", job.kind),
        }));
        Ok(())
    }

    pub async fn fail(&self, job: &Job, error: &str) -> Result<()> {
        data::fail(job.id, error, self.ctx.pool()).await?;
        self.ctx.events().publish(DomainEvent::Job(JobEvent::Failed {
            id: job.id,
            kind: format!("{:?}", job.kind),
            error: error.to_string(),
        }));
        Ok(())
    }

    pub async fn cancel(&self, job_id: Uuid) -> Result<bool> {
        data::cancel(job_id, self.ctx.pool()).await
    }

    /// Returns the existing job unchanged if a `pending|running` job already
    /// satisfies the kind's singleton rule.
    pub async fn enqueue(
        &self,
        kind: JobKind,
        params: serde_json::Value,
        priority: JobPriority,
        seed_paper_id: Option<Uuid>,
        callback_url: Option<&str>,
        callback_secret: Option<&str>,
    ) -> Result<Job> {
        if kind.is_singleton_per_paper() {
            if let Some(paper_id) = seed_paper_id {
                let language = matches!(kind, JobKind::FetchMoreEditions)
                    .then(|| params.get("language").and_then(|v| v.as_str()))
                    .flatten();
                if let Some(existing) = data::find_pending_or_running(kind, paper_id, language, self.ctx.pool()).await? {
                    return Ok(existing);
                }
            }
        } else if matches!(kind, JobKind::RetryFailedFetches) {
            if let Some(existing) = data::find_pending_or_running_global(kind, self.ctx.pool()).await? {
                return Ok(existing);
            }
        }

        let job = data::insert(
            kind,
            params,
            priority,
            seed_paper_id,
            callback_url,
            callback_secret,
            self.ctx.pool(),
        )
        .await?;
        self.ctx.events().publish(DomainEvent::Job(JobEvent::Created {
            id: job.id,
            kind: format!("{:?}", job.kind),
        }));
        Ok(job)
    }

    pub async fn reset_zombies(&self, heartbeat_timeout_secs: i64, currently_running: &[Uuid]) -> Result<Vec<Uuid>> {
        data::reset_zombies(heartbeat_timeout_secs, currently_running, self.ctx.pool()).await
    }

    pub async fn force_unlock_all(&self) -> Result<u64> {
        data::force_unlock_all(self.ctx.pool()).await
    }

    pub async fn count_created_since(&self, window_secs: i64) -> Result<i64> {
        data::count_created_since(window_secs, self.ctx.pool()).await
    }

    pub async fn find(&self, job_id: Uuid) -> Result<Option<Job>> {
        data::find(job_id, self.ctx.pool()).await
    }

    pub async fn recently_finished(&self, since: DateTime<Utc>) -> Result<Vec<Job>> {
        data::recently_finished(since, self.ctx.pool()).await
    }
}
