use clap::Parser;
use dashmap::DashMap;
use figment::value::UncasedStr;
use figment::{Figment, providers::Env};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use uuid::Uuid;

use citegraph_harvester::buffer::{BufferDrainService, PageBuffer};
use citegraph_harvester::cli::{Args, ServiceName};
use citegraph_harvester::collaborators::UnconfiguredCollaborator;
use citegraph_harvester::config::Config;
use citegraph_harvester::data;
use citegraph_harvester::db::DbContext;
use citegraph_harvester::events::EventBuffer;
use citegraph_harvester::jobs::{DispatchContext, JobScheduler, JobWorkerPool, dispatch};
use citegraph_harvester::llm::{self, HttpLlmOracle};
use citegraph_harvester::logging;
use citegraph_harvester::search::SearchClient;
use citegraph_harvester::services::ServiceResult;
use citegraph_harvester::services::manager::ServiceManager;
use citegraph_harvester::status::ServiceStatusRegistry;

/// Buffer capacity for the in-process domain event ring.
const EVENT_BUFFER_CAPACITY: usize = 4096;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let config: Config = Figment::new()
        .merge(Env::raw().map(|k| {
            if k == UncasedStr::new("RAILWAY_DEPLOYMENT_DRAINING_SECONDS") {
                "SHUTDOWN_TIMEOUT".into()
            } else {
                k.into()
            }
        }))
        .extract()
        .expect("Failed to load config");

    logging::setup_logging(&config, args.tracing);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = env!("GIT_COMMIT_SHORT"),
        environment = if cfg!(debug_assertions) { "development" } else { "production" },
        "starting citation graph harvester"
    );

    let db_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .expect("Failed to create database pool");

    info!(
        shutdown_timeout = format!("{:.2?}", config.shutdown_timeout),
        worker_count = config.job_engine.worker_count,
        "configuration loaded"
    );

    let events = Arc::new(EventBuffer::new(EVENT_BUFFER_CAPACITY));
    let db = DbContext::new(db_pool, events);

    let search = Arc::new(
        SearchClient::new(config.search_proxy.clone(), config.search_proxy.search_rpm, config.search_proxy.proxy_poll_rpm)
            .expect("failed to build search client"),
    );
    let llm: Arc<dyn llm::LlmOracle> =
        Arc::new(HttpLlmOracle::new(config.llm.clone()).expect("failed to build LLM oracle client"));
    let buffer = Arc::new(
        PageBuffer::new(config.page_buffer.directory.clone(), config.page_buffer.max_retries)
            .await
            .expect("failed to initialize page buffer"),
    );

    let dispatch_ctx = DispatchContext {
        db: db.clone(),
        search: search.clone(),
        llm,
        buffer: buffer.clone(),
        resolver: Arc::new(UnconfiguredCollaborator { name: "paper resolver" }),
        editions: Arc::new(UnconfiguredCollaborator { name: "edition discovery" }),
        thinker: Arc::new(UnconfiguredCollaborator { name: "thinker bibliography" }),
        smart_skip_ratio: config.job_engine.smart_skip_ratio,
        auto_complete_ratio: config.job_engine.auto_complete_ratio,
        stall_limit: config.job_engine.stall_limit,
    };

    if let Some(kind) = args.run_job.as_deref() {
        run_single_job(kind, dispatch_ctx).await;
        return;
    }

    let http = reqwest::Client::builder()
        .timeout(config.webhook.default_timeout)
        .build()
        .expect("failed to build webhook http client");
    let running: Arc<DashMap<Uuid, ()>> = Arc::new(DashMap::new());
    let status = ServiceStatusRegistry::new();

    let job_workers = Box::new(JobWorkerPool::new(
        dispatch_ctx.clone(),
        http,
        config.job_engine.worker_count,
        running.clone(),
        status.clone(),
    ));
    let job_scheduler = Box::new(JobScheduler::new(
        db.clone(),
        running,
        config.job_engine.worker_count,
        config.job_engine.heartbeat_timeout,
        config.job_engine.zombie_scan_interval,
        config.job_engine.auto_resume_interval,
        config.job_engine.job_rate_window,
        config.job_engine.job_rate_limit,
        config.job_engine.auto_resume_skip_threshold,
        config.job_engine.stall_limit,
    ));
    let buffer_drain = Box::new(BufferDrainService::new(buffer, db, config.page_buffer.max_age));

    let shutdown_timeout = config.shutdown_timeout;
    let mut service_manager = ServiceManager::new();
    service_manager.register_service(ServiceName::JobWorkers.as_str(), job_workers);
    service_manager.register_service(ServiceName::JobScheduler.as_str(), job_scheduler);
    service_manager.register_service(ServiceName::BufferDrain.as_str(), buffer_drain);
    service_manager.spawn_all();

    let ctrl_c = async {
        signal::ctrl_c().await.expect("Failed to install CTRL+C signal handler");
        info!("received ctrl+c, gracefully shutting down...");
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm_stream = signal(SignalKind::terminate()).expect("Failed to install SIGTERM signal handler");
        sigterm_stream.recv().await;
        info!("received SIGTERM, gracefully shutting down...");
    };

    #[cfg(not(unix))]
    let sigterm = async {
        std::future::pending::<()>().await;
    };

    let mut exit_code = 0;

    tokio::select! {
        (service_name, result) = service_manager.run() => {
            match result {
                ServiceResult::GracefulShutdown => {
                    info!(service = service_name, "service completed gracefully");
                }
                ServiceResult::NormalCompletion => {
                    warn!(service = service_name, "service completed unexpectedly");
                    exit_code = 1;
                }
                ServiceResult::Error(e) => {
                    error!(service = service_name, error = ?e, "service failed");
                    exit_code = 1;
                }
            }

            match service_manager.shutdown(shutdown_timeout).await {
                Ok(elapsed) => {
                    info!(remaining = format!("{:.2?}", shutdown_timeout - elapsed), "graceful shutdown complete");
                }
                Err(pending_services) => {
                    warn!(
                        pending_count = pending_services.len(),
                        pending_services = ?pending_services,
                        "graceful shutdown elapsed - {} service(s) did not complete",
                        pending_services.len()
                    );
                    exit_code = if exit_code == 0 { 2 } else { exit_code };
                }
            }
        }
        _ = ctrl_c => {
            info!("user requested shutdown via ctrl+c");
            if let Err(pending_services) = service_manager.shutdown(shutdown_timeout).await {
                warn!(
                    pending_count = pending_services.len(),
                    pending_services = ?pending_services,
                    "graceful shutdown elapsed - {} service(s) did not complete",
                    pending_services.len()
                );
                exit_code = 2;
            }
        }
        _ = sigterm => {
            info!("system requested shutdown via SIGTERM");
            if let Err(pending_services) = service_manager.shutdown(shutdown_timeout).await {
                warn!(
                    pending_count = pending_services.len(),
                    pending_services = ?pending_services,
                    "graceful shutdown elapsed - {} service(s) did not complete",
                    pending_services.len()
                );
                exit_code = 2;
            }
        }
    }

    info!(exit_code, "application shutdown complete");
    std::process::exit(exit_code);
}

/// `--run-job <kind>`: enqueue and immediately run a single job of the given
/// kind against the configured database, print its result, and exit without
/// starting the long-running services. Intended for operational one-offs
/// (e.g. forcing a retry sweep from a shell).
async fn run_single_job(kind: &str, ctx: DispatchContext) {
    let kind: data::models::JobKind = match serde_json::from_value(serde_json::Value::String(kind.to_string())) {
        Ok(kind) => kind,
        Err(e) => {
            error!(kind, error = %e, "unrecognized job kind");
            std::process::exit(2);
        }
    };

    let job = match ctx
        .db
        .jobs()
        .enqueue(kind, serde_json::json!({}), data::models::JobPriority::High, None, None, None)
        .await
    {
        Ok(job) => job,
        Err(e) => {
            error!(error = %e, "failed to enqueue one-off job");
            std::process::exit(1);
        }
    };

    match dispatch::dispatch(&job, &ctx).await {
        Ok(result) => {
            if let Err(e) = ctx.db.jobs().complete(&job, result.clone()).await {
                warn!(error = %e, "ran job but failed to record completion");
            }
            info!(job_id = %job.id, result = %result, "one-off job completed");
            std::process::exit(0);
        }
        Err(e) => {
            if let Err(inner) = ctx.db.jobs().fail(&job, &e.to_string()).await {
                warn!(error = %inner, "ran job but failed to record failure");
            }
            error!(job_id = %job.id, error = %e, "one-off job failed");
            std::process::exit(1);
        }
    }
}
