//! Partition Planner: when an edition's citing-works query overflows
//! the index's 1000-result cap, ask the LLM oracle for exclusion terms that
//! split the query into an under-cap "exclusion branch" (everything not
//! matching the kept terms) and a complementary "inclusion branch" (what got
//! excluded), recursing into the inclusion branch if it still overflows.

use crate::data::models::PartitionRunStatus;
use crate::db::DbContext;
use crate::error::{PartitionError, Result};
use crate::llm::LlmOracle;
use crate::search::{OVERFLOW_THRESHOLD, SearchClient, SearchQuery};
use tracing::{info, warn};
use uuid::Uuid;

/// Hard ceiling on term attempts across a single partition run.
pub const MAX_TERM_ATTEMPTS: i32 = 200;
/// Consecutive zero-reduction attempts before a run is declared stuck.
pub const STUCK_THRESHOLD: i32 = 15;
/// Deepest a partition run may recurse into its own inclusion branch.
pub const MAX_RECURSION_DEPTH: i32 = 3;

/// One harvestable query produced by the planner, guaranteed to report at
/// most `OVERFLOW_THRESHOLD` results at the time it was verified (modulo the
/// "harvest-and-warn" gap case, flagged via `gap_reason`).
pub struct HarvestableQuery {
    pub partition_key: String,
    pub query: SearchQuery,
    pub expected_count: i64,
    pub gap_reason: Option<String>,
}

pub struct PlanRequest {
    pub edition_id: Uuid,
    pub parent_run_id: Option<Uuid>,
    pub recursion_depth: i32,
    pub query_context: String,
    pub language_filter: Option<String>,
    pub base_query: SearchQuery,
    pub initial_count: i64,
    pub title: String,
    pub year: Option<i32>,
}

pub struct PartitionPlanner<'a> {
    db: &'a DbContext,
    search: &'a SearchClient,
    llm: &'a dyn LlmOracle,
}

impl<'a> PartitionPlanner<'a> {
    pub fn new(db: &'a DbContext, search: &'a SearchClient, llm: &'a dyn LlmOracle) -> Self {
        Self { db, search, llm }
    }

    /// Drive the planner to completion for one edition, returning every
    /// harvestable sub-query discovered (iteratively — a work stack rather
    /// than async recursion — up to `MAX_RECURSION_DEPTH`).
    pub async fn plan(&self, seed: PlanRequest) -> Result<Vec<HarvestableQuery>> {
        let mut stack = vec![seed];
        let mut harvestable = Vec::new();

        while let Some(work) = stack.pop() {
            match self.plan_one(&work).await {
                Ok(PartitionOutcome::Resolved { exclusion, inclusion }) => {
                    harvestable.push(exclusion);
                    match inclusion {
                        Some(Inclusion::Terminal(query)) => harvestable.push(query),
                        Some(Inclusion::Recurse(request)) => stack.push(request),
                        None => {}
                    }
                }
                Ok(PartitionOutcome::Overflowed { fallback }) => {
                    warn!(
                        edition_id = %work.edition_id,
                        depth = work.recursion_depth,
                        "partition recursion depth exceeded, harvesting capped fallback with gap"
                    );
                    harvestable.push(fallback);
                }
                Err(e) => {
                    warn!(edition_id = %work.edition_id, error = %e, "partition run failed outright");
                    harvestable.push(HarvestableQuery {
                        partition_key: format!("{}#error", work.query_context),
                        query: work.base_query,
                        expected_count: work.initial_count,
                        gap_reason: Some(match &e {
                            PartitionError::Stuck { .. } => "partition_cannot_reduce".to_string(),
                            PartitionError::MaxAttemptsExceeded => "partition_cannot_reduce".to_string(),
                            PartitionError::RecursionDepthExceeded => "recursion_depth_exceeded".to_string(),
                            PartitionError::NoTermsSuggested => "partition_cannot_reduce".to_string(),
                        }),
                    });
                }
            }
        }

        Ok(harvestable)
    }

    async fn plan_one(&self, work: &PlanRequest) -> std::result::Result<PartitionOutcome, PartitionError> {
        let run = self
            .db
            .partitions()
            .create_run(
                work.edition_id,
                work.parent_run_id,
                work.recursion_depth,
                &work.query_context,
                work.language_filter.as_deref(),
                work.initial_count,
                OVERFLOW_THRESHOLD,
            )
            .await
            .map_err(|_| PartitionError::NoTermsSuggested)?;
        self.db
            .partitions()
            .set_status(run.id, PartitionRunStatus::Harvesting)
            .await
            .ok();

        let mut excluded_terms: Vec<String> = Vec::new();
        let mut current_count = work.initial_count;
        let mut consecutive_zero = 0;
        let mut attempt_number = 0;
        let mut call_number = 0;

        'outer: while current_count > OVERFLOW_THRESHOLD {
            if attempt_number >= MAX_TERM_ATTEMPTS {
                self.db.partitions().set_error_stage(run.id, "partition_cannot_reduce").await.ok();
                return Err(PartitionError::MaxAttemptsExceeded);
            }

            call_number += 1;
            let suggestion = self
                .llm
                .suggest_exclusion_terms(&work.title, work.year, current_count, &excluded_terms)
                .await
                .map_err(|_| PartitionError::NoTermsSuggested)?;
            if suggestion.terms.is_empty() {
                self.db.partitions().set_error_stage(run.id, "partition_cannot_reduce").await.ok();
                return Err(PartitionError::NoTermsSuggested);
            }

            let llm_call = self
                .db
                .partitions()
                .record_llm_call(
                    run.id,
                    call_number,
                    &suggestion.prompt,
                    &suggestion.response,
                    suggestion.input_tokens.unwrap_or(0),
                    suggestion.output_tokens.unwrap_or(0),
                    suggestion.latency.as_millis() as i32,
                    &suggestion.terms,
                )
                .await
                .map_err(|_| PartitionError::NoTermsSuggested)?;

            for term in &suggestion.terms {
                attempt_number += 1;
                if attempt_number > MAX_TERM_ATTEMPTS {
                    self.db.partitions().set_error_stage(run.id, "partition_cannot_reduce").await.ok();
                    return Err(PartitionError::MaxAttemptsExceeded);
                }

                let mut candidate_query = work.base_query.clone();
                candidate_query.filters.exclude_title_terms = excluded_terms.clone();
                candidate_query.filters.exclude_title_terms.push(term.clone());

                let count_after = self.search.count_only(&candidate_query).await.unwrap_or(current_count);
                let kept = count_after < current_count;

                self.db
                    .partitions()
                    .record_query(run.id, "term_exclusion_probe", &candidate_query.render_q(), count_after)
                    .await
                    .ok();
                self.db
                    .partitions()
                    .record_term_attempt(run.id, llm_call.id, term, attempt_number, current_count, count_after, kept)
                    .await
                    .ok();

                if kept {
                    excluded_terms.push(term.clone());
                    current_count = count_after;
                    consecutive_zero = 0;
                } else {
                    consecutive_zero += 1;
                }

                if current_count <= OVERFLOW_THRESHOLD {
                    break 'outer;
                }
                if consecutive_zero >= STUCK_THRESHOLD {
                    self.db.partitions().set_error_stage(run.id, "partition_cannot_reduce").await.ok();
                    return Err(PartitionError::Stuck { consecutive_zero_reductions: consecutive_zero as u32 });
                }
            }
        }

        // Re-verify before handing the exclusion branch off to the harvester:
        // the LLM's term counts can drift between suggestion and harvest time.
        let mut exclusion_query = work.base_query.clone();
        exclusion_query.filters.exclude_title_terms = excluded_terms.clone();
        let verified_count = self.search.count_only(&exclusion_query).await.unwrap_or(current_count);
        self.db
            .partitions()
            .record_query(run.id, "exclusion_harvest", &exclusion_query.render_q(), verified_count)
            .await
            .ok();

        let mut inclusion_query = work.base_query.clone();
        inclusion_query.filters.include_any_title_terms = excluded_terms.clone();
        let inclusion_count = self.search.count_only(&inclusion_query).await.unwrap_or(0);
        self.db
            .partitions()
            .record_query(run.id, "inclusion_probe", &inclusion_query.render_q(), inclusion_count)
            .await
            .ok();

        // The index's reported totals fluctuate between planning and
        // harvesting; if the re-verified count slipped back above the cap,
        // harvest anyway (capped at OVERFLOW_THRESHOLD by the harvester) and
        // flag the gap rather than failing the partition.
        let slipped_above_cap = verified_count > OVERFLOW_THRESHOLD;
        let exclusion_gap_reason = if slipped_above_cap {
            warn!(
                edition_id = %work.edition_id,
                run_id = %run.id,
                verified_count,
                "re-verified exclusion count slipped above the overflow cap, harvesting capped fallback"
            );
            Some("count_slipped_above_cap".to_string())
        } else {
            None
        };

        let partition_key = format!("{}#excl{}", work.query_context, work.recursion_depth);
        let gap_details = exclusion_gap_reason.as_ref().map(|reason| {
            serde_json::json!({ "reason": reason, "verified_count": verified_count, "cap": OVERFLOW_THRESHOLD })
        });
        self.db
            .partitions()
            .finalize_run(run.id, excluded_terms.len() as i32, verified_count, inclusion_count, &excluded_terms, gap_details)
            .await
            .ok();

        info!(
            edition_id = %work.edition_id,
            run_id = %run.id,
            terms_kept = excluded_terms.len(),
            verified_count,
            inclusion_count,
            "partition run resolved exclusion branch"
        );

        let exclusion = HarvestableQuery {
            partition_key,
            query: exclusion_query,
            expected_count: verified_count,
            gap_reason: exclusion_gap_reason,
        };

        if inclusion_count <= OVERFLOW_THRESHOLD {
            // Already under the cap: hand it straight to the harvester as its
            // own partition rather than pushing it back through `plan_one`,
            // which would re-run the outer loop with no excluded terms yet
            // and wipe `include_any_title_terms` back to the full base query.
            let inclusion_key = format!("{}#incl{}", work.query_context, work.recursion_depth);
            return Ok(PartitionOutcome::Resolved {
                exclusion,
                inclusion: Some(Inclusion::Terminal(HarvestableQuery {
                    partition_key: inclusion_key,
                    query: inclusion_query,
                    expected_count: inclusion_count,
                    gap_reason: None,
                })),
            });
        }

        if work.recursion_depth + 1 > MAX_RECURSION_DEPTH {
            return Ok(PartitionOutcome::Overflowed {
                fallback: HarvestableQuery {
                    partition_key: format!("{}#incl_capped", work.query_context),
                    query: inclusion_query,
                    expected_count: inclusion_count,
                    gap_reason: Some("recursion_depth_exceeded".to_string()),
                },
            });
        }

        Ok(PartitionOutcome::Resolved {
            exclusion,
            inclusion: Some(Inclusion::Recurse(PlanRequest {
                edition_id: work.edition_id,
                parent_run_id: Some(run.id),
                recursion_depth: work.recursion_depth + 1,
                query_context: format!("{}#incl{}", work.query_context, work.recursion_depth),
                language_filter: work.language_filter.clone(),
                base_query: inclusion_query,
                initial_count: inclusion_count,
                title: work.title.clone(),
                year: work.year,
            })),
        })
    }
}

/// What to do with a partition run's inclusion branch: harvest it directly
/// (already under the cap) or feed it back through `plan_one` (still needs
/// term exclusion).
enum Inclusion {
    Terminal(HarvestableQuery),
    Recurse(PlanRequest),
}

enum PartitionOutcome {
    Resolved { exclusion: HarvestableQuery, inclusion: Option<Inclusion> },
    Overflowed { fallback: HarvestableQuery },
}
