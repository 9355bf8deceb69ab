//! The Stratified Harvester: per-edition citation collection strategy
//! selected by reported citation count, durably writing pages through
//! [`PageSaveContext`] and falling back to language stratification or
//! author-letter partitioning when the index's 1000-result cap is hit.

pub mod languages;
pub mod page_context;
pub mod resume;

use crate::buffer::PageBuffer;
use crate::data::models::{Edition, HarvestResumeState, HarvestTargetStatus, SeedPaper};
use crate::db::DbContext;
use crate::error::{Result, SearchClientError};
use crate::llm::LlmOracle;
use crate::partition::{HarvestableQuery, PartitionPlanner, PlanRequest};
use crate::search::{OVERFLOW_THRESHOLD, SearchClient, SearchFilters, SearchQuery};
use chrono::{Datelike, Utc};
use page_context::PageSaveContext;
use rand::Rng;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// A year sweep gives up after this many consecutive empty years, provided
/// the year under evaluation is older than this many years ago.
const CONSECUTIVE_EMPTY_YEAR_LIMIT: u32 = 10;
const STALE_SWEEP_YEAR_CUTOFF: i32 = 20;
const DEFAULT_MIN_YEAR: i32 = 1950;
const SUSPICIOUSLY_RECENT_WINDOW: i32 = 3;

/// Accumulated totals across every source and partition a harvest touches.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct HarvestOutcome {
    pub citations_saved: i64,
    pub duplicates: i64,
    pub pages_processed: u32,
    pub editions_processed: u32,
}

impl HarvestOutcome {
    fn absorb_ctx(&mut self, ctx: &PageSaveContext) {
        self.citations_saved += ctx.total_new_citations;
        self.duplicates += ctx.total_duplicates;
        self.pages_processed += ctx.pages_processed;
    }

    fn merge(&mut self, other: HarvestOutcome) {
        self.citations_saved += other.citations_saved;
        self.duplicates += other.duplicates;
        self.pages_processed += other.pages_processed;
        self.editions_processed += other.editions_processed;
    }
}

/// Below this residual gap (expected - actual, summed over all of an
/// edition's harvest targets), a stalled edition is auto-completed rather
/// than kept in the auto-resume rotation indefinitely.
const STALL_RESIDUAL_GAP_THRESHOLD: i64 = 100;

pub struct CitationHarvester<'a> {
    db: &'a DbContext,
    search: &'a SearchClient,
    llm: &'a dyn LlmOracle,
    buffer: &'a PageBuffer,
    smart_skip_ratio: f64,
    auto_complete_ratio: f64,
    stall_limit: u32,
}

impl<'a> CitationHarvester<'a> {
    pub fn new(
        db: &'a DbContext,
        search: &'a SearchClient,
        llm: &'a dyn LlmOracle,
        buffer: &'a PageBuffer,
        smart_skip_ratio: f64,
        auto_complete_ratio: f64,
        stall_limit: u32,
    ) -> Self {
        Self {
            db,
            search,
            llm,
            buffer,
            smart_skip_ratio,
            auto_complete_ratio,
            stall_limit,
        }
    }

    /// Harvest every eligible selected Edition of `seed_paper`, optionally
    /// restricted to `edition_ids`. Errors inside a single Edition are
    /// logged and do not abort the remaining Editions.
    pub async fn harvest_paper(
        &self,
        job_id: Uuid,
        seed_paper: &SeedPaper,
        edition_ids: Option<&[Uuid]>,
    ) -> Result<HarvestOutcome> {
        let mut outcome = HarvestOutcome::default();
        let editions = self.db.editions().selected_for_paper(seed_paper.id).await?;

        for edition in editions {
            if let Some(ids) = edition_ids {
                if !ids.contains(&edition.id) {
                    continue;
                }
            }
            if edition.should_skip() {
                continue;
            }
            match self.harvest_edition(job_id, seed_paper, &edition).await {
                Ok(edition_outcome) => outcome.merge(edition_outcome),
                Err(e) => {
                    warn!(edition_id = %edition.id, error = %e, "edition harvest failed, continuing with next edition");
                }
            }
            pace(3_000, 3_000).await;
        }

        self.db.aggregate().refresh_paper(seed_paper.id).await?;
        Ok(outcome)
    }

    /// Harvest one canonical Edition: its own external id plus every merged
    /// descendant's external id, all citations recorded against it.
    pub async fn harvest_edition(
        &self,
        job_id: Uuid,
        seed_paper: &SeedPaper,
        edition: &Edition,
    ) -> Result<HarvestOutcome> {
        let Some(canonical_external_id) = edition.external_id.clone() else {
            return Ok(HarvestOutcome::default());
        };
        let mut outcome = HarvestOutcome::default();
        let mut resume_state = edition.harvest_resume_state.clone().map(|j| j.0).unwrap_or_default();

        outcome.merge(
            self.harvest_source(
                job_id,
                seed_paper,
                edition,
                &canonical_external_id,
                "primary",
                &mut resume_state,
            )
            .await?,
        );

        for (idx, descendant_id) in self.db.editions().merged_descendant_external_ids(edition.id).await?.into_iter().enumerate() {
            let tag = format!("merged{idx}");
            outcome.merge(
                self.harvest_source(job_id, seed_paper, edition, &descendant_id, &tag, &mut resume_state)
                    .await?,
            );
        }

        self.db.editions().refresh_harvested_count(edition.id).await?;
        self.reconcile_stall(edition, &outcome).await?;
        outcome.editions_processed += 1;
        Ok(outcome)
    }

    /// §7 "stall": an edition whose run produced no new-or-duplicate
    /// citations while it still has incomplete targets gets its stall
    /// counter bumped; at `stall_limit` it drops out of auto-resume until a
    /// human unpauses it. If the residual gap is already small (≥
    /// `auto_complete_ratio` harvested, or an absolute gap under
    /// [`STALL_RESIDUAL_GAP_THRESHOLD`]), auto-complete the remaining
    /// targets and reset the counter instead of looping on an unfetchable
    /// tail forever.
    async fn reconcile_stall(&self, edition: &Edition, outcome: &HarvestOutcome) -> Result<()> {
        let incomplete = self.db.harvest_targets().incomplete_for_edition(edition.id).await?;
        if incomplete.is_empty() {
            self.db.editions().reset_stall_count(edition.id).await?;
            return Ok(());
        }

        let (expected_total, actual_total) = self.db.harvest_targets().gap_summary(edition.id).await?;
        let gap = (expected_total - actual_total).max(0);
        let completion_ratio = if expected_total > 0 { actual_total as f64 / expected_total as f64 } else { 1.0 };

        if completion_ratio >= self.auto_complete_ratio || gap < STALL_RESIDUAL_GAP_THRESHOLD {
            self.db.harvest_targets().auto_complete_remaining(edition.id, "stall_residual_gap").await?;
            self.db.editions().reset_stall_count(edition.id).await?;
            return Ok(());
        }

        let made_progress = outcome.citations_saved > 0 || outcome.duplicates > 0;
        if made_progress {
            self.db.editions().reset_stall_count(edition.id).await?;
            return Ok(());
        }

        let stall_count = self.db.editions().increment_stall_count(edition.id).await?;
        if stall_count as u32 >= self.stall_limit {
            warn!(edition_id = %edition.id, stall_count, "edition exceeded stall limit, removed from auto-resume until unpaused");
        }
        Ok(())
    }

    /// Run the per-edition strategy (direct fetch vs. year sweep) against
    /// one external id, writing all citations against `edition.id`.
    async fn harvest_source(
        &self,
        job_id: Uuid,
        seed_paper: &SeedPaper,
        edition: &Edition,
        source_external_id: &str,
        source_tag: &str,
        resume_state: &mut HarvestResumeState,
    ) -> Result<HarvestOutcome> {
        let reported = self.search.count_only(&SearchQuery::citing(source_external_id, SearchFilters::default(), 0)).await?;
        if reported <= OVERFLOW_THRESHOLD {
            let partition_key = format!("{source_tag}:direct");
            self.db.harvest_targets().upsert_expected(edition.id, &partition_key, reported).await?;
            let mut ctx = PageSaveContext::new(job_id, seed_paper.id, edition.id, edition.id, partition_key.clone(), resume_state.clone());
            let query = SearchQuery::citing(source_external_id, SearchFilters::default(), ctx.resume_state.last_page);
            self.paginate(&mut ctx, query, reported.max(0) as u32).await?;
            *resume_state = ctx.resume_state.clone();
            let mut out = HarvestOutcome::default();
            out.absorb_ctx(&ctx);
            self.finalize_target(edition.id, &partition_key, reported, &out).await?;
            return Ok(out);
        }

        self.year_sweep(job_id, seed_paper, edition, source_external_id, source_tag, resume_state).await
    }

    async fn year_sweep(
        &self,
        job_id: Uuid,
        seed_paper: &SeedPaper,
        edition: &Edition,
        source_external_id: &str,
        source_tag: &str,
        resume_state: &mut HarvestResumeState,
    ) -> Result<HarvestOutcome> {
        let current_year = Utc::now().year();
        let min_year = min_sweep_year(edition, seed_paper, current_year);
        let mut year = resume_state.current_year.unwrap_or(current_year);
        let mut consecutive_empty = 0u32;
        let mut outcome = HarvestOutcome::default();

        while year >= min_year {
            let partition_key = format!("{source_tag}:{year}");
            let filters = SearchFilters {
                year_low: Some(year),
                year_high: Some(year),
                ..Default::default()
            };
            let year_query = SearchQuery::citing(source_external_id, filters, 0);
            let expected = self.search.count_only(&year_query).await.unwrap_or(0);
            self.db.harvest_targets().upsert_expected(edition.id, &partition_key, expected).await?;

            if expected == 0 {
                consecutive_empty += 1;
                resume_state.complete_year_marker_only(year);
                if consecutive_empty >= CONSECUTIVE_EMPTY_YEAR_LIMIT && year < current_year - STALE_SWEEP_YEAR_CUTOFF {
                    info!(edition_id = %edition.id, year, "consecutive empty years reached, terminating sweep");
                    break;
                }
                year -= 1;
                continue;
            }

            let db_count = self.db.citations().count_for_edition_year(edition.id, year).await.unwrap_or(0);
            if expected > 0 && db_count as f64 >= self.smart_skip_ratio * expected as f64 {
                self.db
                    .harvest_targets()
                    .finalize(edition.id, &partition_key, HarvestTargetStatus::Complete, Some("near_complete"), None, Some(expected), edition.id)
                    .await?;
                consecutive_empty = 0;
                resume_state.complete_year_marker_only(year);
                year -= 1;
                continue;
            }

            let carried_last_page = if resume_state.current_year == Some(year) { resume_state.last_page } else { 0 };
            let resume_page = resume::compute_resume_page(carried_last_page, db_count);
            resume_state.current_year = Some(year);
            resume_state.last_page = resume_page;

            let mut ctx = PageSaveContext::new(job_id, seed_paper.id, edition.id, edition.id, partition_key.clone(), resume_state.clone());

            if expected <= OVERFLOW_THRESHOLD {
                let query = SearchQuery::citing(source_external_id, year_query.filters.clone(), resume_page);
                self.paginate(&mut ctx, query, expected as u32).await?;
            } else {
                self.partitioned_year_harvest(&mut ctx, source_external_id, year, expected).await?;
            }

            *resume_state = ctx.resume_state.clone();
            outcome.absorb_ctx(&ctx);

            let final_db_count = self.db.citations().count_for_edition_year(edition.id, year).await.unwrap_or(0);
            let (last_gs_count, gap_reason, gap_details) =
                reverify_gs_count(self.search, &year_query, expected).await;
            let status = if last_gs_count == 0 || final_db_count as f64 >= self.auto_complete_ratio * last_gs_count as f64 {
                consecutive_empty = 0;
                HarvestTargetStatus::Complete
            } else {
                HarvestTargetStatus::Incomplete
            };
            self.db
                .harvest_targets()
                .finalize(edition.id, &partition_key, status, gap_reason.as_deref(), gap_details, Some(last_gs_count), edition.id)
                .await?;

            if ctx.pages_processed == 0 {
                consecutive_empty += 1;
            } else {
                consecutive_empty = 0;
            }
            resume_state.complete_year_marker_only(year);

            pace(2_000, 2_000).await;
            year -= 1;
        }

        Ok(outcome)
    }

    /// Year expected > 1000: language stratification, falling back to
    /// author-letter partitioning for the English remainder if it also
    /// overflows.
    async fn partitioned_year_harvest(
        &self,
        ctx: &mut PageSaveContext,
        source_external_id: &str,
        year: i32,
        _year_expected: i64,
    ) -> Result<()> {
        for (name, lang_code) in languages::STRATIFICATION_LANGUAGES {
            let filters = SearchFilters {
                language: Some(lang_code.to_string()),
                year_low: Some(year),
                year_high: Some(year),
                ..Default::default()
            };
            let probe = SearchQuery::citing(source_external_id, filters.clone(), 0);
            let count = self.search.count_only(&probe).await.unwrap_or(0);
            if count == 0 {
                continue;
            }
            let partition_key = format!("{}:{year}:{lang_code}", ctx.partition_key.split(':').next().unwrap_or("primary"));
            if count <= OVERFLOW_THRESHOLD {
                self.db.harvest_targets().upsert_expected(ctx.target_edition_id, &partition_key, count).await?;
                let mut lang_ctx = PageSaveContext::new_sub_partition(ctx.job_id, ctx.seed_paper_id, ctx.target_edition_id, ctx.resume_edition_id, partition_key.clone());
                let query = SearchQuery::citing(source_external_id, filters, 0);
                self.paginate(&mut lang_ctx, query, count as u32).await?;
                ctx.total_new_citations += lang_ctx.total_new_citations;
                ctx.total_duplicates += lang_ctx.total_duplicates;
                ctx.pages_processed += lang_ctx.pages_processed;
                self.finalize_target(ctx.target_edition_id, &partition_key, count, &{
                    let mut o = HarvestOutcome::default();
                    o.absorb_ctx(&lang_ctx);
                    o
                })
                .await?;
            } else {
                warn!(name, year, count, "language partition still overflows, falling back to author-letter split");
                self.author_letter_partition(ctx, source_external_id, year, Some(lang_code)).await?;
            }
            pace(2_000, 3_000).await;
        }

        let english_filters = SearchFilters {
            language: Some(languages::ENGLISH_FILTER.to_string()),
            year_low: Some(year),
            year_high: Some(year),
            ..Default::default()
        };
        let english_probe = SearchQuery::citing(source_external_id, english_filters.clone(), 0);
        let english_count = self.search.count_only(&english_probe).await.unwrap_or(0);
        let english_key = format!("{}:{year}:en", ctx.partition_key.split(':').next().unwrap_or("primary"));

        if english_count <= OVERFLOW_THRESHOLD {
            self.db.harvest_targets().upsert_expected(ctx.target_edition_id, &english_key, english_count).await?;
            let mut en_ctx = PageSaveContext::new_sub_partition(ctx.job_id, ctx.seed_paper_id, ctx.target_edition_id, ctx.resume_edition_id, english_key.clone());
            let query = SearchQuery::citing(source_external_id, english_filters, 0);
            self.paginate(&mut en_ctx, query, english_count as u32).await?;
            ctx.total_new_citations += en_ctx.total_new_citations;
            ctx.total_duplicates += en_ctx.total_duplicates;
            ctx.pages_processed += en_ctx.pages_processed;
            let mut o = HarvestOutcome::default();
            o.absorb_ctx(&en_ctx);
            self.finalize_target(ctx.target_edition_id, &english_key, english_count, &o).await?;
            return Ok(());
        }

        let planner = PartitionPlanner::new(self.db, self.search, self.llm);
        let title = format!("edition:{}", ctx.target_edition_id);
        let plan = planner
            .plan(PlanRequest {
                edition_id: ctx.target_edition_id,
                parent_run_id: None,
                recursion_depth: 0,
                query_context: english_key.clone(),
                language_filter: Some(languages::ENGLISH_FILTER.to_string()),
                base_query: SearchQuery::citing(source_external_id, english_filters, 0),
                initial_count: english_count,
                title,
                year: Some(year),
            })
            .await?;

        for harvestable in plan {
            self.harvest_planned_query(ctx, harvestable).await?;
            pace(2_000, 3_000).await;
        }

        Ok(())
    }

    async fn harvest_planned_query(&self, ctx: &mut PageSaveContext, planned: HarvestableQuery) -> Result<()> {
        self.db
            .harvest_targets()
            .upsert_expected(ctx.target_edition_id, &planned.partition_key, planned.expected_count)
            .await?;
        let mut planned_ctx = PageSaveContext::new_sub_partition(
            ctx.job_id,
            ctx.seed_paper_id,
            ctx.target_edition_id,
            ctx.resume_edition_id,
            planned.partition_key.clone(),
        );
        let max_results = planned.expected_count.min(OVERFLOW_THRESHOLD).max(0) as u32;
        self.paginate(&mut planned_ctx, planned.query, max_results).await?;
        ctx.total_new_citations += planned_ctx.total_new_citations;
        ctx.total_duplicates += planned_ctx.total_duplicates;
        ctx.pages_processed += planned_ctx.pages_processed;
        let mut o = HarvestOutcome::default();
        o.absorb_ctx(&planned_ctx);
        self.finalize_target(ctx.target_edition_id, &planned.partition_key, planned.expected_count, &o).await?;
        if let Some(reason) = planned.gap_reason {
            self.db
                .harvest_targets()
                .finalize(
                    ctx.target_edition_id,
                    &planned.partition_key,
                    HarvestTargetStatus::Incomplete,
                    Some(&reason),
                    None,
                    Some(planned.expected_count),
                    ctx.target_edition_id,
                )
                .await?;
        }
        Ok(())
    }

    /// The largest-overflow fallback: partition by author-surname initial,
    /// subdividing by venue pool if a letter is itself still over the cap.
    async fn author_letter_partition(
        &self,
        ctx: &mut PageSaveContext,
        source_external_id: &str,
        year: i32,
        language: Option<&str>,
    ) -> Result<()> {
        for letter in 'a'..='z' {
            let mut filters = SearchFilters {
                year_low: Some(year),
                year_high: Some(year),
                author_letter: Some(letter),
                language: language.map(str::to_string),
                ..Default::default()
            };
            let probe = SearchQuery::citing(source_external_id, filters.clone(), 0);
            let count = self.search.count_only(&probe).await.unwrap_or(0);
            if count == 0 {
                continue;
            }
            let letter_key = format!("{}:{year}:letter:{letter}", ctx.partition_key.split(':').next().unwrap_or("primary"));

            if count <= OVERFLOW_THRESHOLD {
                self.harvest_letter_pool(ctx, source_external_id, &letter_key, filters, count).await?;
                continue;
            }

            let mut exclude_pool = filters.clone();
            exclude_pool.exclude_venues = languages::DEFAULT_EXCLUDED_VENUES.iter().map(|s| s.to_string()).collect();
            let exclude_probe = SearchQuery::citing(source_external_id, exclude_pool.clone(), 0);
            let exclude_count = self.search.count_only(&exclude_probe).await.unwrap_or(count);

            filters.include_any_venues = languages::DEFAULT_EXCLUDED_VENUES.iter().map(|s| s.to_string()).collect();
            let include_probe = SearchQuery::citing(source_external_id, filters.clone(), 0);
            let include_count = self.search.count_only(&include_probe).await.unwrap_or(0);

            if exclude_count <= OVERFLOW_THRESHOLD && include_count <= OVERFLOW_THRESHOLD {
                self.harvest_letter_pool(ctx, source_external_id, &format!("{letter_key}:excl"), exclude_pool, exclude_count)
                    .await?;
                self.harvest_letter_pool(ctx, source_external_id, &format!("{letter_key}:incl"), filters, include_count)
                    .await?;
            } else {
                warn!(letter, year, "author-letter venue split still overflows, flagging for manual review");
                self.db.harvest_targets().upsert_expected(ctx.target_edition_id, &letter_key, count).await?;
                self.db
                    .harvest_targets()
                    .finalize(
                        ctx.target_edition_id,
                        &letter_key,
                        HarvestTargetStatus::Incomplete,
                        Some("partition_cannot_reduce"),
                        None,
                        Some(count),
                        ctx.target_edition_id,
                    )
                    .await?;
            }
            pace(2_000, 3_000).await;
        }
        Ok(())
    }

    async fn harvest_letter_pool(
        &self,
        ctx: &mut PageSaveContext,
        source_external_id: &str,
        partition_key: &str,
        filters: SearchFilters,
        expected: i64,
    ) -> Result<()> {
        self.db.harvest_targets().upsert_expected(ctx.target_edition_id, partition_key, expected).await?;
        let mut pool_ctx = PageSaveContext::new_sub_partition(
            ctx.job_id,
            ctx.seed_paper_id,
            ctx.target_edition_id,
            ctx.resume_edition_id,
            partition_key.to_string(),
        );
        let query = SearchQuery::citing(source_external_id, filters, 0);
        self.paginate(&mut pool_ctx, query, expected.max(0) as u32).await?;
        ctx.total_new_citations += pool_ctx.total_new_citations;
        ctx.total_duplicates += pool_ctx.total_duplicates;
        ctx.pages_processed += pool_ctx.pages_processed;
        let mut o = HarvestOutcome::default();
        o.absorb_ctx(&pool_ctx);
        self.finalize_target(ctx.target_edition_id, partition_key, expected, &o).await
    }

    /// Manual single-year diagnostic entry point for the
    /// `partition_harvest_test` job kind: run the overflow-handling strategy
    /// for one (edition, year) pair against a caller-supplied total count,
    /// independent of the edition's own resume state.
    pub async fn harvest_year_diagnostic(
        &self,
        job_id: Uuid,
        edition: &Edition,
        source_external_id: &str,
        year: i32,
        total_count: i64,
    ) -> Result<HarvestOutcome> {
        let partition_key = format!("diagnostic:{year}");
        self.db.harvest_targets().upsert_expected(edition.id, &partition_key, total_count).await?;
        let mut ctx = PageSaveContext::new_sub_partition(job_id, edition.seed_paper_id, edition.id, edition.id, partition_key.clone());

        if total_count <= OVERFLOW_THRESHOLD {
            let filters = SearchFilters {
                year_low: Some(year),
                year_high: Some(year),
                ..Default::default()
            };
            let query = SearchQuery::citing(source_external_id, filters, 0);
            self.paginate(&mut ctx, query, total_count.max(0) as u32).await?;
        } else {
            self.partitioned_year_harvest(&mut ctx, source_external_id, year, total_count).await?;
        }

        let mut outcome = HarvestOutcome::default();
        outcome.absorb_ctx(&ctx);
        self.finalize_target(edition.id, &partition_key, total_count, &outcome).await?;
        Ok(outcome)
    }

    async fn finalize_target(&self, edition_id: Uuid, partition_key: &str, expected: i64, _outcome: &HarvestOutcome) -> Result<()> {
        let actual = self
            .db
            .harvest_targets()
            .find(edition_id, partition_key)
            .await?
            .map(|t| t.actual_count)
            .unwrap_or(0);
        let status = if expected == 0 || actual as f64 >= self.auto_complete_ratio * expected as f64 {
            HarvestTargetStatus::Complete
        } else {
            HarvestTargetStatus::Incomplete
        };
        self.db
            .harvest_targets()
            .finalize(edition_id, partition_key, status, None, None, Some(expected), edition_id)
            .await
    }

    /// Fetches pages one at a time so the page buffer and Citation writes can
    /// be awaited between pages, preserving the ordering guarantee that the
    /// next page is never fetched before the previous page's DB commit
    /// attempt completes. Stops on max-results, an empty page, or 3
    /// consecutive page failures.
    async fn paginate(&self, ctx: &mut PageSaveContext, mut query: SearchQuery, max_results: u32) -> Result<u32> {
        let mut consecutive_failures = 0u32;
        let mut total_fetched = 0u32;

        loop {
            if total_fetched >= max_results {
                break;
            }
            match self.search.fetch_query_page(&query).await {
                Ok(page) => {
                    consecutive_failures = 0;
                    if page.results.is_empty() {
                        break;
                    }
                    total_fetched += page.results.len() as u32;
                    ctx.on_page(self.db, self.buffer, query.start_page, page.results).await?;
                    query.start_page += 1;
                    pace(2_000, 4_000).await;
                }
                Err(e) => {
                    consecutive_failures += 1;
                    let url = self.search.build_url(&query);
                    let is_retryable_exhausted = matches!(e, SearchClientError::BudgetExhausted { .. }) || !e.is_transient();
                    ctx.on_page_failed(self.db, query.start_page, &url, &e.to_string()).await?;
                    if consecutive_failures >= 3 || is_retryable_exhausted {
                        warn!(page = query.start_page, error = %e, "page fetch abandoned after exhausting retries");
                        break;
                    }
                    query.start_page += 1;
                }
            }
        }
        Ok(total_fetched)
    }
}

/// Re-read the index's currently reported total via the last page of
/// `query` (computed assuming `first` results) and classify drift from
/// `first` as `gs_estimate_changed`. The index's reported total can shrink
/// or grow between the first page of a harvest and its last; when it does,
/// the last-page count is the one worth trusting going forward.
pub(crate) async fn reverify_gs_count(
    search: &SearchClient,
    query: &SearchQuery,
    first: i64,
) -> (i64, Option<String>, Option<serde_json::Value>) {
    let last = match search.verify_last_page(query.clone(), first).await {
        Ok(page) => page.reported_total.unwrap_or(first),
        Err(e) => {
            warn!(error = %e, "last-page re-verification failed, keeping first-page count");
            return (first, None, None);
        }
    };
    if last == first {
        return (last, None, None);
    }
    (
        last,
        Some("gs_estimate_changed".to_string()),
        Some(serde_json::json!({ "first": first, "last": last, "estimate_change": last - first })),
    )
}

fn min_sweep_year(edition: &Edition, seed_paper: &SeedPaper, current_year: i32) -> i32 {
    let candidate = edition.publication_year.or(seed_paper.year);
    match candidate {
        Some(year) if year <= current_year - SUSPICIOUSLY_RECENT_WINDOW => year,
        _ => DEFAULT_MIN_YEAR,
    }
}

async fn pace(min_ms: u64, max_ms: u64) {
    let delay = if min_ms == max_ms {
        min_ms
    } else {
        rand::rng().random_range(min_ms..=max_ms)
    };
    tokio::time::sleep(Duration::from_millis(delay)).await;
}

impl HarvestResumeState {
    fn complete_year_marker_only(&mut self, year: i32) {
        if !self.completed_years.contains(&year) {
            self.completed_years.push(year);
        }
        if self.current_year == Some(year) {
            self.current_year = None;
            self.last_page = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edition_with_year(year: Option<i32>) -> Edition {
        Edition {
            id: Uuid::new_v4(),
            seed_paper_id: Uuid::new_v4(),
            external_id: Some("abc".to_string()),
            title: "Test".to_string(),
            language: None,
            reported_citation_count: Some(2000),
            harvested_citation_count: 0,
            last_harvested_at: None,
            harvest_stall_count: 0,
            merged_into_edition_id: None,
            selected: true,
            excluded: false,
            harvest_resume_state: None,
            publication_year: year,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn seed_paper() -> SeedPaper {
        SeedPaper {
            id: Uuid::new_v4(),
            canonical_title: "Test".to_string(),
            authors: None,
            year: None,
            venue: None,
            external_id: Some("abc".to_string()),
            reported_citation_count: Some(2000),
            resolution_state: crate::data::models::ResolutionState::Resolved,
            harvest_paused: false,
            total_harvested_citations: 0,
            any_edition_harvested_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn min_sweep_year_uses_edition_publication_year_when_old_enough() {
        let edition = edition_with_year(Some(1998));
        assert_eq!(min_sweep_year(&edition, &seed_paper(), 2026), 1998);
    }

    #[test]
    fn min_sweep_year_falls_back_to_default_when_suspiciously_recent() {
        let edition = edition_with_year(Some(2025));
        assert_eq!(min_sweep_year(&edition, &seed_paper(), 2026), DEFAULT_MIN_YEAR);
    }

    #[test]
    fn min_sweep_year_falls_back_to_default_when_missing() {
        let edition = edition_with_year(None);
        assert_eq!(min_sweep_year(&edition, &seed_paper(), 2026), DEFAULT_MIN_YEAR);
    }
}
