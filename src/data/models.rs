//! Persisted entity types.
//!
//! Enum columns bind as Postgres native enums via `sqlx::Type`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

/// `seed_papers.resolution_state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "resolution_state", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ResolutionState {
    Pending,
    NeedsReconciliation,
    Resolved,
    Error,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SeedPaper {
    pub id: Uuid,
    pub canonical_title: String,
    pub authors: Option<String>,
    pub year: Option<i32>,
    pub venue: Option<String>,
    pub external_id: Option<String>,
    pub reported_citation_count: Option<i64>,
    pub resolution_state: ResolutionState,
    pub harvest_paused: bool,
    pub total_harvested_citations: i64,
    pub any_edition_harvested_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Edition {
    pub id: Uuid,
    pub seed_paper_id: Uuid,
    pub external_id: Option<String>,
    pub title: String,
    pub language: Option<String>,
    pub reported_citation_count: Option<i64>,
    pub harvested_citation_count: i64,
    pub last_harvested_at: Option<DateTime<Utc>>,
    pub harvest_stall_count: i32,
    pub merged_into_edition_id: Option<Uuid>,
    pub selected: bool,
    pub excluded: bool,
    pub harvest_resume_state: Option<Json<HarvestResumeState>>,
    pub publication_year: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Edition {
    /// Whether the harvester should skip this edition outright: no external
    /// id, zero reported citations, or already fully harvested.
    pub fn should_skip(&self) -> bool {
        self.external_id.is_none()
            || self.reported_citation_count == Some(0)
            || self
                .reported_citation_count
                .is_some_and(|reported| self.harvested_citation_count >= reported)
    }
}

/// Opaque, per-Edition resume checkpoint stored as a JSON blob.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarvestResumeState {
    pub current_year: Option<i32>,
    pub last_page: u32,
    pub completed_years: Vec<i32>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Citation {
    pub id: Uuid,
    pub seed_paper_id: Uuid,
    pub edition_id: Uuid,
    pub external_result_id: String,
    pub cluster_id: Option<String>,
    pub title: String,
    pub raw_authors: Option<String>,
    pub year: Option<i32>,
    pub venue: Option<String>,
    pub abstract_snippet: Option<String>,
    pub link: Option<String>,
    pub encounter_count: i32,
    /// Always written as `1`; reserved for a cross-paper analytics module
    /// this crate does not implement.
    pub intersection_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `jobs.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// `jobs.kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Resolve,
    DiscoverEditions,
    FetchMoreEditions,
    ExtractCitations,
    PartitionHarvestTest,
    RetryFailedFetches,
    VerifyAndRepair,
    ThinkerDiscoverWorks,
    ThinkerHarvestCitations,
}

impl JobKind {
    /// Kinds bound by the "single pending|running job per SeedPaper" rule.
    /// `fetch_more_editions` is scoped per-language by the caller,
    /// `retry_failed_fetches` is scoped globally (no SeedPaper).
    pub fn is_singleton_per_paper(&self) -> bool {
        matches!(
            self,
            JobKind::ExtractCitations | JobKind::FetchMoreEditions
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_priority", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    Low,
    Normal,
    High,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Job {
    pub id: Uuid,
    pub kind: JobKind,
    pub status: JobStatus,
    pub priority: JobPriority,
    pub progress: i32,
    pub progress_message: Option<String>,
    pub params: Json<serde_json::Value>,
    pub result: Option<Json<serde_json::Value>>,
    pub error: Option<String>,
    pub seed_paper_id: Option<Uuid>,
    pub callback_url: Option<String>,
    pub callback_secret: Option<String>,
    pub attempt_count: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// `harvest_targets.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "harvest_target_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum HarvestTargetStatus {
    Harvesting,
    Complete,
    Incomplete,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct HarvestTarget {
    pub id: Uuid,
    pub edition_id: Uuid,
    /// Either a year (`"2020"`) or an author-letter bucket (`"letter:a"`).
    pub partition_key: String,
    pub expected_count: i64,
    pub original_expected: i64,
    pub final_gs_count: Option<i64>,
    pub actual_count: i64,
    pub status: HarvestTargetStatus,
    pub gap_reason: Option<String>,
    pub gap_details: Option<Json<serde_json::Value>>,
    pub pages_attempted: i32,
    pub pages_succeeded: i32,
    pub pages_failed: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl HarvestTarget {
    pub fn gap(&self) -> i64 {
        (self.expected_count - self.actual_count).max(0)
    }

    pub fn gap_ratio(&self) -> f64 {
        if self.expected_count == 0 {
            0.0
        } else {
            self.gap() as f64 / self.expected_count as f64
        }
    }
}

/// `failed_fetches.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "failed_fetch_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FailedFetchStatus {
    Pending,
    Retrying,
    Succeeded,
    Abandoned,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FailedFetch {
    pub id: Uuid,
    pub edition_id: Uuid,
    pub partition_key: String,
    pub page_offset: i32,
    pub url: String,
    pub retry_count: i32,
    pub last_error: Option<String>,
    pub status: FailedFetchStatus,
    pub recovered_citations: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `partition_runs.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "partition_run_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PartitionRunStatus {
    Pending,
    Harvesting,
    Completed,
    Failed,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PartitionRun {
    pub id: Uuid,
    pub edition_id: Uuid,
    pub parent_run_id: Option<Uuid>,
    pub recursion_depth: i32,
    pub query_context: String,
    pub language_filter: Option<String>,
    pub initial_count: i64,
    pub target_count: i64,
    pub exclusion_set_count: Option<i32>,
    pub exclusion_harvested: Option<i64>,
    pub inclusion_harvested: Option<i64>,
    pub terms_kept: Json<Vec<String>>,
    pub status: PartitionRunStatus,
    pub error_stage: Option<String>,
    pub gap_details: Option<Json<serde_json::Value>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PartitionLlmCall {
    pub id: Uuid,
    pub partition_run_id: Uuid,
    pub call_number: i32,
    pub prompt: String,
    pub response: String,
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub latency_ms: i32,
    pub terms_suggested: Json<Vec<String>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PartitionTermAttempt {
    pub id: Uuid,
    pub partition_run_id: Uuid,
    pub llm_call_id: Option<Uuid>,
    pub term: String,
    pub attempt_number: i32,
    pub count_before: i64,
    pub count_after: i64,
    pub reduction: i64,
    pub kept: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PartitionQuery {
    pub id: Uuid,
    pub partition_run_id: Uuid,
    pub query_kind: String,
    pub query_text: String,
    pub reported_count: i64,
    pub created_at: DateTime<Utc>,
}
