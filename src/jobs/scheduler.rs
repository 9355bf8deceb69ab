//! Background maintenance for the Job Engine: recovers editions orphaned by a
//! prior crash, resets zombie jobs whose worker died mid-heartbeat, and
//! auto-resumes editions that have fallen behind their reported citation
//! count, via the same kind of periodic sweep-and-requeue loop a background
//! maintenance task runs over any at-least-once job queue.

use crate::data::models::{HarvestResumeState, HarvestTargetStatus, JobKind, JobPriority};
use crate::db::context::DbContext;
use crate::jobs::params::ExtractCitationsParams;
use crate::search::client::OVERFLOW_THRESHOLD;
use crate::services::Service;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

pub struct JobScheduler {
    db: DbContext,
    running: Arc<DashMap<Uuid, ()>>,
    worker_count: u32,
    heartbeat_timeout: Duration,
    zombie_scan_interval: Duration,
    auto_resume_interval: Duration,
    job_rate_window: Duration,
    job_rate_limit: u32,
    auto_resume_skip_threshold: i64,
    stall_limit: u32,
    shutdown_tx: Option<broadcast::Sender<()>>,
}

impl JobScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: DbContext,
        running: Arc<DashMap<Uuid, ()>>,
        worker_count: u32,
        heartbeat_timeout: Duration,
        zombie_scan_interval: Duration,
        auto_resume_interval: Duration,
        job_rate_window: Duration,
        job_rate_limit: u32,
        auto_resume_skip_threshold: i64,
        stall_limit: u32,
    ) -> Self {
        Self {
            db,
            running,
            worker_count,
            heartbeat_timeout,
            zombie_scan_interval,
            auto_resume_interval,
            job_rate_window,
            job_rate_limit,
            auto_resume_skip_threshold,
            stall_limit,
            shutdown_tx: None,
        }
    }

    /// Runs once at startup. An Edition with a reported count above the
    /// overflow threshold, over 100 citations already harvested, and no
    /// resume state was interrupted mid-sweep by a crash before its first
    /// checkpoint write. Synthesize a resume state from its completed
    /// harvest targets so the next auto-resume pass doesn't restart the
    /// whole year sweep from scratch.
    async fn recover_orphans(&self) {
        let orphans = match self.db.editions().find_orphans(OVERFLOW_THRESHOLD).await {
            Ok(orphans) => orphans,
            Err(e) => {
                warn!(error = %e, "failed to scan for orphaned editions");
                return;
            }
        };
        if orphans.is_empty() {
            return;
        }
        info!(count = orphans.len(), "recovering orphaned editions");

        for edition in orphans {
            let targets = match self.db.harvest_targets().all_for_edition(edition.id).await {
                Ok(targets) => targets,
                Err(e) => {
                    warn!(edition_id = %edition.id, error = %e, "failed to load harvest targets for orphan recovery");
                    continue;
                }
            };
            let completed_years: Vec<i32> = targets
                .iter()
                .filter(|t| t.status == HarvestTargetStatus::Complete)
                .filter_map(|t| t.partition_key.rsplit(':').next())
                .filter_map(|segment| segment.parse::<i32>().ok())
                .collect::<HashSet<_>>()
                .into_iter()
                .collect();

            let state = HarvestResumeState {
                current_year: None,
                last_page: 0,
                completed_years,
            };
            if let Err(e) = self.db.editions().update_resume_state(edition.id, &state).await {
                warn!(edition_id = %edition.id, error = %e, "failed to write synthesized resume state");
            } else {
                info!(edition_id = %edition.id, completed_years = state.completed_years.len(), "synthesized resume state for orphaned edition");
            }
        }
    }

    async fn scan_zombies(&self) {
        let currently_running: Vec<Uuid> = self.running.iter().map(|entry| *entry.key()).collect();
        match self
            .db
            .jobs()
            .reset_zombies(self.heartbeat_timeout.as_secs() as i64, &currently_running)
            .await
        {
            Ok(reset) if !reset.is_empty() => {
                warn!(count = reset.len(), "reset zombie jobs with stale heartbeats");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "zombie scan failed"),
        }
    }

    async fn auto_resume(&self) {
        let candidates = match self
            .db
            .seed_papers()
            .find_auto_resume_candidates(self.auto_resume_skip_threshold, self.stall_limit as i32)
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(error = %e, "failed to query auto-resume candidates");
                return;
            }
        };
        if candidates.is_empty() {
            return;
        }

        let mut seen_papers = HashSet::new();
        let mut enqueued = 0usize;
        for (seed_paper_id, edition_id) in candidates {
            if !seen_papers.insert(seed_paper_id) {
                continue;
            }
            if self.running.len() as u32 >= self.worker_count {
                break;
            }

            let params = ExtractCitationsParams {
                edition_ids: vec![edition_id],
                is_resume: true,
                ..Default::default()
            };
            let params = match serde_json::to_value(&params) {
                Ok(value) => value,
                Err(e) => {
                    warn!(error = %e, "failed to serialize auto-resume params");
                    continue;
                }
            };
            match self
                .db
                .jobs()
                .enqueue(JobKind::ExtractCitations, params, JobPriority::Normal, Some(seed_paper_id), None, None)
                .await
            {
                Ok(_) => enqueued += 1,
                Err(e) => warn!(seed_paper_id = %seed_paper_id, error = %e, "failed to enqueue auto-resume job"),
            }
        }
        if enqueued > 0 {
            info!(enqueued, "auto-resumed stalled editions");
        }
    }

    async fn monitor_job_rate(&self) {
        match self.db.jobs().count_created_since(self.job_rate_window.as_secs() as i64).await {
            Ok(count) if count as u32 > self.job_rate_limit => {
                warn!(count, limit = self.job_rate_limit, window = ?self.job_rate_window, "job creation rate exceeds configured limit");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "failed to check job creation rate"),
        }
    }
}

#[async_trait::async_trait]
impl Service for JobScheduler {
    fn name(&self) -> &'static str {
        "job_scheduler"
    }

    async fn run(&mut self) -> Result<(), anyhow::Error> {
        self.recover_orphans().await;

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        self.shutdown_tx = Some(shutdown_tx);

        let mut zombie_tick = tokio::time::interval(self.zombie_scan_interval);
        let mut resume_tick = tokio::time::interval(self.auto_resume_interval);
        let mut rate_tick = tokio::time::interval(self.job_rate_window);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("job scheduler shutting down");
                    return Ok(());
                }
                _ = zombie_tick.tick() => self.scan_zombies().await,
                _ = resume_tick.tick() => self.auto_resume().await,
                _ = rate_tick.tick() => self.monitor_job_rate().await,
            }
        }
    }

    async fn shutdown(&mut self) -> Result<(), anyhow::Error> {
        let Some(shutdown_tx) = self.shutdown_tx.take() else {
            return Ok(());
        };
        let _ = shutdown_tx.send(());
        Ok(())
    }
}
