//! Typed parameter and result payloads for each [`JobKind`](crate::data::models::JobKind).
//!
//! Jobs persist `params`/`result` as opaque JSON; these types give the
//! dispatcher a typed view over that blob without changing the storage
//! format. Unknown/extra fields in stored params are ignored on purpose —
//! old enqueued jobs from a previous binary version should still parse.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn default_max_citations_per_edition() -> i64 {
    1000
}
fn default_skip_threshold() -> i64 {
    50_000
}
fn default_max_retries() -> u32 {
    50
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct ExtractCitationsParams {
    #[serde(default)]
    pub edition_ids: Vec<Uuid>,
    #[serde(default = "default_max_citations_per_edition")]
    pub max_citations_per_edition: i64,
    #[serde(default = "default_skip_threshold")]
    pub skip_threshold: i64,
    #[serde(default)]
    pub is_refresh: bool,
    #[serde(default)]
    pub year_low: Option<i32>,
    #[serde(default)]
    pub batch_id: Option<String>,
    #[serde(default)]
    pub is_resume: bool,
    #[serde(default)]
    pub resume_state: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FetchMoreEditionsParams {
    pub language: String,
    #[serde(default)]
    pub max_results: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct RetryFailedFetchesParams {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct VerifyAndRepairParams {
    pub paper_id: Uuid,
    #[serde(default)]
    pub edition_ids: Vec<Uuid>,
    #[serde(default)]
    pub year_start: Option<i32>,
    #[serde(default)]
    pub year_end: Option<i32>,
    #[serde(default)]
    pub fix_gaps: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PartitionHarvestTestParams {
    pub edition_id: Uuid,
    pub year: i32,
    pub total_count: i64,
}

/// The minimum shape every `extract_citations`-family job writes as its
/// `result` blob.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct HarvestResult {
    pub citations_saved: i64,
    pub duplicates: i64,
    pub pages_processed: i64,
    pub editions_processed: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_citations_params_fill_defaults_from_empty_object() {
        let params: ExtractCitationsParams = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(params.max_citations_per_edition, 1000);
        assert_eq!(params.skip_threshold, 50_000);
        assert!(params.edition_ids.is_empty());
        assert!(!params.is_resume);
    }

    #[test]
    fn unknown_fields_in_stored_params_are_ignored() {
        let params: ExtractCitationsParams = serde_json::from_value(serde_json::json!({
            "max_citations_per_edition": 500,
            "an_old_field_we_dropped": "whatever",
        }))
        .unwrap();
        assert_eq!(params.max_citations_per_edition, 500);
    }
}
