//! Outbound webhook delivery for job completion/failure, HMAC-signed with
//! `hmac` + `sha2`, hex-encoded into a header.

use crate::data::models::{Job, JobKind, JobStatus};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::{debug, warn};

type HmacSha256 = Hmac<Sha256>;

fn job_kind_str(kind: JobKind) -> &'static str {
    match kind {
        JobKind::Resolve => "resolve",
        JobKind::DiscoverEditions => "discover_editions",
        JobKind::FetchMoreEditions => "fetch_more_editions",
        JobKind::ExtractCitations => "extract_citations",
        JobKind::PartitionHarvestTest => "partition_harvest_test",
        JobKind::RetryFailedFetches => "retry_failed_fetches",
        JobKind::VerifyAndRepair => "verify_and_repair",
        JobKind::ThinkerDiscoverWorks => "thinker_discover_works",
        JobKind::ThinkerHarvestCitations => "thinker_harvest_citations",
    }
}

fn job_status_str(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Pending => "pending",
        JobStatus::Running => "running",
        JobStatus::Completed => "completed",
        JobStatus::Failed => "failed",
        JobStatus::Cancelled => "cancelled",
    }
}

/// Build the callback body for a finished job. Exposed separately from
/// [`deliver`] so the signature can be computed over exactly this value.
pub fn build_payload(job: &Job) -> Value {
    json!({
        "event": format!("job.{}", job_status_str(job.status)),
        "job_id": job.id,
        "job_type": job_kind_str(job.kind),
        "status": job_status_str(job.status),
        "seed_paper_id": job.seed_paper_id,
        "result": job.result.as_ref().map(|r| r.0.clone()),
        "error": job.error,
        "progress": job.progress,
        "timestamp": Utc::now().to_rfc3339(),
    })
}

/// Canonical JSON: object keys sorted recursively, so the signature is
/// stable regardless of field insertion order on either side.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted = serde_json::Map::new();
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

fn sign(secret: &str, body: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body.as_bytes());
    Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// POST the job's completion payload to its `callback_url`. Delivery
/// failure is logged and swallowed: webhook delivery never fails the Job.
pub async fn deliver(http: &reqwest::Client, job: &Job) {
    let Some(url) = job.callback_url.as_deref() else {
        return;
    };

    let payload = canonicalize(&build_payload(job));
    let body = match serde_json::to_string(&payload) {
        Ok(body) => body,
        Err(e) => {
            warn!(job_id = %job.id, error = %e, "failed to serialise webhook payload");
            return;
        }
    };

    let mut request = http
        .post(url)
        .header("Content-Type", "application/json")
        .body(body.clone());

    if let Some(secret) = job.callback_secret.as_deref() {
        if let Some(signature) = sign(secret, &body) {
            request = request.header("X-Webhook-Signature", signature);
        }
    }

    match request.send().await {
        Ok(response) if response.status().is_success() => {
            debug!(job_id = %job.id, url, "webhook delivered");
        }
        Ok(response) => {
            warn!(job_id = %job.id, url, status = %response.status(), "webhook endpoint returned non-success");
        }
        Err(e) => {
            warn!(job_id = %job.id, url, error = %e, "webhook delivery failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_sorts_object_keys() {
        let value = json!({"b": 1, "a": 2});
        assert_eq!(
            serde_json::to_string(&canonicalize(&value)).unwrap(),
            r#"{"a":2,"b":1}"#
        );
    }

    #[test]
    fn sign_is_deterministic_for_same_secret_and_body() {
        let a = sign("sekrit", r#"{"a":1}"#).unwrap();
        let b = sign("sekrit", r#"{"a":1}"#).unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("sha256="));
    }

    #[test]
    fn sign_differs_for_different_secrets() {
        let a = sign("sekrit-one", "body").unwrap();
        let b = sign("sekrit-two", "body").unwrap();
        assert_ne!(a, b);
    }
}
