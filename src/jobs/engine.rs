//! The job worker pool: `worker_count` tasks that poll-and-lock jobs off the
//! queue, dispatch them, and record the outcome, using `FOR UPDATE SKIP
//! LOCKED` so multiple workers never grab the same row.

use crate::data::models::JobStatus;
use crate::jobs::dispatch::{self, DispatchContext};
use crate::jobs::webhook;
use crate::services::Service;
use crate::status::{ServiceStatus, ServiceStatusRegistry};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

pub struct JobWorkerPool {
    ctx: DispatchContext,
    http: reqwest::Client,
    worker_count: u32,
    running: Arc<DashMap<Uuid, ()>>,
    status: ServiceStatusRegistry,
    worker_handles: Vec<JoinHandle<()>>,
    shutdown_tx: Option<broadcast::Sender<()>>,
}

impl JobWorkerPool {
    pub fn new(
        ctx: DispatchContext,
        http: reqwest::Client,
        worker_count: u32,
        running: Arc<DashMap<Uuid, ()>>,
        status: ServiceStatusRegistry,
    ) -> Self {
        Self {
            ctx,
            http,
            worker_count,
            running,
            status,
            worker_handles: Vec::new(),
            shutdown_tx: None,
        }
    }

    async fn start(&mut self) {
        match self.ctx.db.jobs().force_unlock_all().await {
            Ok(0) => {}
            Ok(count) => warn!(count, "force-unlocked stale running jobs from previous run"),
            Err(e) => warn!(error = ?e, "failed to force-unlock stale jobs"),
        }

        let (shutdown_tx, _) = broadcast::channel(1);
        self.shutdown_tx = Some(shutdown_tx.clone());

        for id in 0..self.worker_count {
            let ctx = self.ctx.clone();
            let http = self.http.clone();
            let running = self.running.clone();
            let shutdown_rx = shutdown_tx.subscribe();
            self.worker_handles.push(tokio::spawn(run_worker(id, ctx, http, running, shutdown_rx)));
        }
        info!(worker_count = self.worker_handles.len(), "job worker pool started");
        self.status.set("job_workers", ServiceStatus::Active);
    }
}

#[async_trait::async_trait]
impl Service for JobWorkerPool {
    fn name(&self) -> &'static str {
        "job_workers"
    }

    async fn run(&mut self) -> Result<(), anyhow::Error> {
        self.start().await;
        std::future::pending::<()>().await;
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), anyhow::Error> {
        self.status.set("job_workers", ServiceStatus::Disabled);
        let Some(shutdown_tx) = self.shutdown_tx.take() else {
            return Err(anyhow::anyhow!("job worker pool was never started"));
        };
        let _ = shutdown_tx.send(());

        let results = futures::future::join_all(self.worker_handles.drain(..)).await;
        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            return Err(anyhow::anyhow!("{failed} job worker task(s) panicked during shutdown"));
        }
        info!("job worker pool shut down");
        Ok(())
    }
}

async fn run_worker(
    id: u32,
    ctx: DispatchContext,
    http: reqwest::Client,
    running: Arc<DashMap<Uuid, ()>>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    info!(worker_id = id, "job worker started");
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!(worker_id = id, "job worker shutting down");
                break;
            }
            fetched = ctx.db.jobs().fetch_and_lock() => {
                match fetched {
                    Ok(Some(job)) => {
                        let job_id = job.id;
                        running.insert(job_id, ());
                        let _ = ctx.db.jobs().heartbeat(job_id, 0, Some("started")).await;

                        let cancel_watch = {
                            let db = ctx.db.clone();
                            async move {
                                loop {
                                    tokio::time::sleep(Duration::from_secs(5)).await;
                                    match db.jobs().find(job_id).await {
                                        Ok(Some(j)) if j.status == JobStatus::Cancelled => return,
                                        Ok(None) => return,
                                        _ => {}
                                    }
                                }
                            }
                        };

                        let outcome = tokio::select! {
                            result = dispatch::dispatch(&job, &ctx) => Some(result),
                            _ = cancel_watch => None,
                        };
                        running.remove(&job_id);

                        match outcome {
                            Some(Ok(value)) => {
                                if let Err(e) = ctx.db.jobs().complete(&job, value).await {
                                    error!(worker_id = id, job_id = %job_id, error = %e, "failed to mark job completed");
                                }
                            }
                            Some(Err(e)) => {
                                warn!(worker_id = id, job_id = %job_id, error = %e, "job failed");
                                if let Err(inner) = ctx.db.jobs().fail(&job, &e.to_string()).await {
                                    error!(worker_id = id, job_id = %job_id, error = %inner, "failed to mark job failed");
                                }
                            }
                            None => {
                                info!(worker_id = id, job_id = %job_id, "job cancelled, abandoning in-flight work");
                                continue;
                            }
                        }

                        if let Ok(Some(finished)) = ctx.db.jobs().find(job_id).await {
                            webhook::deliver(&http, &finished).await;
                        }
                    }
                    Ok(None) => {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                    Err(e) => {
                        warn!(worker_id = id, error = %e, "failed to fetch job");
                        tokio::time::sleep(Duration::from_secs(10)).await;
                    }
                }
            }
        }
    }
}
