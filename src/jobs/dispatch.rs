//! Routes a locked [`Job`] to its handler by [`JobKind`].

use crate::buffer::PageBuffer;
use crate::collaborators::{EditionDiscovery, PaperResolver, ThinkerBibliography};
use crate::data::models::{HarvestTargetStatus, Job, JobKind, JobPriority};
use crate::db::DbContext;
use crate::error::Result;
use crate::harvest::{reverify_gs_count, CitationHarvester};
use crate::jobs::params::{
    ExtractCitationsParams, FetchMoreEditionsParams, HarvestResult, PartitionHarvestTestParams,
    RetryFailedFetchesParams, VerifyAndRepairParams,
};
use crate::llm::LlmOracle;
use crate::search::{SearchClient, SearchFilters, SearchQuery};
use anyhow::Context;
use serde_json::{Value, json};
use tracing::{info, warn};

/// Shared handles every dispatch needs, built once in `main` and cloned
/// cheaply (everything inside is an `Arc` or a `Clone`-able pool/handle).
#[derive(Clone)]
pub struct DispatchContext {
    pub db: DbContext,
    pub search: std::sync::Arc<SearchClient>,
    pub llm: std::sync::Arc<dyn LlmOracle>,
    pub buffer: std::sync::Arc<PageBuffer>,
    pub resolver: std::sync::Arc<dyn PaperResolver>,
    pub editions: std::sync::Arc<dyn EditionDiscovery>,
    pub thinker: std::sync::Arc<dyn ThinkerBibliography>,
    pub smart_skip_ratio: f64,
    pub auto_complete_ratio: f64,
    pub stall_limit: u32,
}

/// Execute `job` to completion and return its `result` JSON blob. Errors
/// propagate to the caller, which marks the Job `failed`.
pub async fn dispatch(job: &Job, ctx: &DispatchContext) -> Result<Value> {
    match job.kind {
        JobKind::ExtractCitations => extract_citations(job, ctx).await,
        JobKind::PartitionHarvestTest => partition_harvest_test(job, ctx).await,
        JobKind::RetryFailedFetches => retry_failed_fetches(job, ctx).await,
        JobKind::VerifyAndRepair => verify_and_repair(job, ctx).await,
        JobKind::Resolve => resolve(job, ctx).await,
        JobKind::DiscoverEditions => discover_editions(job, ctx).await,
        JobKind::FetchMoreEditions => fetch_more_editions(job, ctx).await,
        JobKind::ThinkerDiscoverWorks => thinker_discover_works(job, ctx).await,
        JobKind::ThinkerHarvestCitations => thinker_harvest_citations(job, ctx).await,
    }
}

async fn extract_citations(job: &Job, ctx: &DispatchContext) -> Result<Value> {
    let params: ExtractCitationsParams = serde_json::from_value(job.params.0.clone())
        .context("parsing extract_citations params")?;
    let seed_paper_id = job
        .seed_paper_id
        .ok_or_else(|| anyhow::anyhow!("extract_citations job has no seed_paper_id"))?;
    let seed_paper = ctx
        .db
        .seed_papers()
        .find(seed_paper_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("seed paper {seed_paper_id} not found"))?;

    let harvester = CitationHarvester::new(&ctx.db, &ctx.search, ctx.llm.as_ref(), &ctx.buffer, ctx.smart_skip_ratio, ctx.auto_complete_ratio, ctx.stall_limit);
    let edition_ids = if params.edition_ids.is_empty() { None } else { Some(params.edition_ids.as_slice()) };
    let outcome = harvester.harvest_paper(job.id, &seed_paper, edition_ids).await?;

    Ok(serde_json::to_value(HarvestResult {
        citations_saved: outcome.citations_saved,
        duplicates: outcome.duplicates,
        pages_processed: outcome.pages_processed as i64,
        editions_processed: outcome.editions_processed as i64,
    })?)
}

async fn partition_harvest_test(job: &Job, ctx: &DispatchContext) -> Result<Value> {
    let params: PartitionHarvestTestParams = serde_json::from_value(job.params.0.clone())
        .context("parsing partition_harvest_test params")?;
    let edition = ctx
        .db
        .editions()
        .find(params.edition_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("edition {} not found", params.edition_id))?;
    let external_id = edition
        .external_id
        .clone()
        .ok_or_else(|| anyhow::anyhow!("edition {} has no external id to harvest against", edition.id))?;

    let harvester = CitationHarvester::new(&ctx.db, &ctx.search, ctx.llm.as_ref(), &ctx.buffer, ctx.smart_skip_ratio, ctx.auto_complete_ratio, ctx.stall_limit);
    let outcome = harvester
        .harvest_year_diagnostic(job.id, &edition, &external_id, params.year, params.total_count)
        .await?;

    Ok(serde_json::to_value(HarvestResult {
        citations_saved: outcome.citations_saved,
        duplicates: outcome.duplicates,
        pages_processed: outcome.pages_processed as i64,
        editions_processed: 1,
    })?)
}

/// Drain the failed-fetch retry ledger: re-request each retryable page
/// directly by its stored URL and re-upsert whatever comes back.
async fn retry_failed_fetches(job: &Job, ctx: &DispatchContext) -> Result<Value> {
    let params: RetryFailedFetchesParams = serde_json::from_value(job.params.0.clone())
        .context("parsing retry_failed_fetches params")?;

    let candidates = ctx.db.failed_fetches().retryable(500).await?;
    let mut recovered = 0i64;
    let mut abandoned = 0i64;
    let mut still_failing = 0i64;

    for failed in candidates {
        if failed.retry_count as u32 >= params.max_retries {
            ctx.db.failed_fetches().abandon(failed.id).await?;
            abandoned += 1;
            continue;
        }
        ctx.db.failed_fetches().mark_retrying(failed.id).await?;

        let Some(edition) = ctx.db.editions().find(failed.edition_id).await? else {
            ctx.db.failed_fetches().abandon(failed.id).await?;
            abandoned += 1;
            continue;
        };

        match ctx.search.fetch_result_page(&failed.url).await {
            Ok(html) => match crate::search::parse::parse_page(&html) {
                Ok(page) => {
                    let counts = ctx
                        .db
                        .citations()
                        .upsert_batch(edition.seed_paper_id, failed.edition_id, &page.results)
                        .await?;
                    ctx.db
                        .failed_fetches()
                        .mark_succeeded(failed.id, (counts.new_citations + counts.duplicates) as i32)
                        .await?;
                    recovered += counts.new_citations;
                }
                Err(e) => {
                    warn!(failed_fetch_id = %failed.id, error = %e, "retry parse failed");
                    ctx.db.failed_fetches().mark_failed(failed.id, &e.to_string()).await?;
                    still_failing += 1;
                }
            },
            Err(e) => {
                warn!(failed_fetch_id = %failed.id, error = %e, "retry fetch failed");
                ctx.db.failed_fetches().mark_failed(failed.id, &e.to_string()).await?;
                still_failing += 1;
            }
        }
    }

    Ok(json!({
        "recovered_citations": recovered,
        "abandoned": abandoned,
        "still_failing": still_failing,
    }))
}

/// Re-verify reported counts for an edition's incomplete partitions and,
/// when `fix_gaps` is set, re-harvest any partition whose gap persists.
async fn verify_and_repair(job: &Job, ctx: &DispatchContext) -> Result<Value> {
    let params: VerifyAndRepairParams = serde_json::from_value(job.params.0.clone())
        .context("parsing verify_and_repair params")?;

    let editions = if params.edition_ids.is_empty() {
        ctx.db.editions().selected_for_paper(params.paper_id).await?
    } else {
        let mut out = Vec::new();
        for id in &params.edition_ids {
            if let Some(edition) = ctx.db.editions().find(*id).await? {
                out.push(edition);
            }
        }
        out
    };

    let harvester = CitationHarvester::new(&ctx.db, &ctx.search, ctx.llm.as_ref(), &ctx.buffer, ctx.smart_skip_ratio, ctx.auto_complete_ratio, ctx.stall_limit);
    let mut verified = 0i64;
    let mut repaired = 0i64;
    let mut still_gapped = 0i64;

    for edition in &editions {
        let Some(external_id) = edition.external_id.clone() else { continue };
        let targets = ctx.db.harvest_targets().incomplete_for_edition(edition.id).await?;

        for target in targets {
            let Some(year) = target.partition_key.rsplit(':').next().and_then(|s| s.parse::<i32>().ok()) else {
                continue;
            };
            if let Some(start) = params.year_start {
                if year < start {
                    continue;
                }
            }
            if let Some(end) = params.year_end {
                if year > end {
                    continue;
                }
            }

            let query = SearchQuery::citing(
                external_id.clone(),
                SearchFilters {
                    year_low: Some(year),
                    year_high: Some(year),
                    ..Default::default()
                },
                0,
            );
            // §4.1: fetch first and last page, compare counts, fetch any
            // missing pages.
            let first_count = match ctx.search.count_only(&query).await {
                Ok(count) => count,
                Err(e) => {
                    warn!(edition_id = %edition.id, year, error = %e, "verify_and_repair first-page count failed");
                    continue;
                }
            };
            let (last_count, gap_reason, gap_details) = reverify_gs_count(&ctx.search, &query, first_count).await;
            verified += 1;

            let gap = (last_count - target.actual_count).max(0);
            if gap > 0 {
                if params.fix_gaps {
                    match harvester.harvest_year_diagnostic(job.id, edition, &external_id, year, last_count).await {
                        Ok(outcome) => {
                            repaired += outcome.citations_saved;
                            info!(edition_id = %edition.id, year, recovered = outcome.citations_saved, "gap repaired");
                        }
                        Err(e) => {
                            warn!(edition_id = %edition.id, year, error = %e, "gap repair harvest failed");
                            still_gapped += 1;
                        }
                    }
                } else {
                    still_gapped += 1;
                }
            }

            let actual_after = ctx
                .db
                .harvest_targets()
                .find(edition.id, &target.partition_key)
                .await?
                .map(|t| t.actual_count)
                .unwrap_or(target.actual_count);
            let status = if last_count == 0 || actual_after as f64 >= ctx.auto_complete_ratio * last_count as f64 {
                HarvestTargetStatus::Complete
            } else {
                HarvestTargetStatus::Incomplete
            };
            ctx.db
                .harvest_targets()
                .finalize(edition.id, &target.partition_key, status, gap_reason.as_deref(), gap_details, Some(last_count), edition.id)
                .await?;
        }
    }

    ctx.db.aggregate().refresh_paper(params.paper_id).await?;

    Ok(json!({
        "partitions_verified": verified,
        "citations_repaired": repaired,
        "still_gapped": still_gapped,
    }))
}

async fn resolve(job: &Job, ctx: &DispatchContext) -> Result<Value> {
    let seed_paper_id = job
        .seed_paper_id
        .ok_or_else(|| anyhow::anyhow!("resolve job has no seed_paper_id"))?;
    let seed_paper = ctx
        .db
        .seed_papers()
        .find(seed_paper_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("seed paper {seed_paper_id} not found"))?;

    let external_id = ctx.resolver.resolve(&seed_paper).await?;
    ctx.db.seed_papers().mark_resolved(seed_paper_id, &external_id).await?;
    Ok(json!({ "external_id": external_id }))
}

async fn discover_editions(job: &Job, ctx: &DispatchContext) -> Result<Value> {
    let seed_paper_id = job
        .seed_paper_id
        .ok_or_else(|| anyhow::anyhow!("discover_editions job has no seed_paper_id"))?;
    let seed_paper = ctx
        .db
        .seed_papers()
        .find(seed_paper_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("seed paper {seed_paper_id} not found"))?;

    let count = ctx.editions.discover_editions(&seed_paper).await?;
    Ok(json!({ "editions_discovered": count }))
}

async fn fetch_more_editions(job: &Job, ctx: &DispatchContext) -> Result<Value> {
    let params: FetchMoreEditionsParams =
        serde_json::from_value(job.params.0.clone()).context("parsing fetch_more_editions params")?;
    let seed_paper_id = job
        .seed_paper_id
        .ok_or_else(|| anyhow::anyhow!("fetch_more_editions job has no seed_paper_id"))?;
    let seed_paper = ctx
        .db
        .seed_papers()
        .find(seed_paper_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("seed paper {seed_paper_id} not found"))?;

    let count = ctx
        .editions
        .fetch_more_editions(&seed_paper, &params.language, params.max_results)
        .await?;
    Ok(json!({ "editions_discovered": count }))
}

async fn thinker_discover_works(job: &Job, ctx: &DispatchContext) -> Result<Value> {
    let seed_paper_id = job
        .seed_paper_id
        .ok_or_else(|| anyhow::anyhow!("thinker_discover_works job has no seed_paper_id"))?;
    let count = ctx.thinker.discover_works(seed_paper_id).await?;
    Ok(json!({ "works_discovered": count }))
}

async fn thinker_harvest_citations(job: &Job, ctx: &DispatchContext) -> Result<Value> {
    let seed_paper_id = job
        .seed_paper_id
        .ok_or_else(|| anyhow::anyhow!("thinker_harvest_citations job has no seed_paper_id"))?;
    let count = ctx.thinker.harvest_citations(seed_paper_id).await?;
    Ok(json!({ "citations_harvested": count }))
}

/// Exposed for the auto-resume scheduler, which enqueues `extract_citations`
/// jobs without going through a higher-level HTTP surface this crate doesn't
/// have.
pub fn default_extract_citations_priority() -> JobPriority {
    JobPriority::Normal
}
