//! Configuration module for the citation harvester.
//!
//! This module handles loading and parsing configuration from environment variables
//! using the figment crate. It supports flexible duration parsing that accepts both
//! numeric values (interpreted as seconds) and duration strings with units.

use fundu::{DurationParser, TimeUnit};
use serde::{Deserialize, Deserializer};
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration containing all sub-configurations.
#[derive(Deserialize)]
pub struct Config {
    /// Log level for the application.
    ///
    /// This value is used to set the log level for this application's target specifically.
    /// e.g. "debug" would be similar to "warn,citegraph_harvester=debug,..."
    ///
    /// Valid values are: "trace", "debug", "info", "warn", "error"
    /// Defaults to "info" if not specified
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Database connection URL.
    pub database_url: String,

    /// Graceful shutdown timeout duration.
    ///
    /// Accepts both numeric values (seconds) and duration strings.
    /// Defaults to 8 seconds if not specified.
    #[serde(
        default = "default_shutdown_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub shutdown_timeout: Duration,

    /// Job engine tuning (worker count, heartbeat, auto-resume cadence).
    #[serde(default)]
    pub job_engine: JobEngineConfig,

    /// Search index / fetch-proxy client configuration.
    pub search_proxy: SearchProxyConfig,

    /// LLM oracle configuration (exclusion-term suggestions).
    pub llm: LlmOracleConfig,

    /// Durable page buffer configuration.
    #[serde(default)]
    pub page_buffer: PageBufferConfig,

    /// Outbound webhook defaults.
    #[serde(default)]
    pub webhook: WebhookConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(8)
}

/// Tuning knobs for the job engine's background loops.
///
/// The distilled behaviour (20 workers, a 30 minute zombie heartbeat
/// timeout, a 5 minute zombie scan, a 15 second auto-resume cadence, and a
/// 50-jobs/60s creation-rate warning threshold) becomes this struct's
/// defaults, with every value left configurable.
#[derive(Deserialize, Clone, Debug)]
pub struct JobEngineConfig {
    #[serde(default = "default_worker_count")]
    pub worker_count: u32,

    #[serde(
        default = "default_heartbeat_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub heartbeat_timeout: Duration,

    #[serde(
        default = "default_zombie_scan_interval",
        deserialize_with = "deserialize_duration"
    )]
    pub zombie_scan_interval: Duration,

    #[serde(
        default = "default_auto_resume_interval",
        deserialize_with = "deserialize_duration"
    )]
    pub auto_resume_interval: Duration,

    #[serde(
        default = "default_job_rate_window",
        deserialize_with = "deserialize_duration"
    )]
    pub job_rate_window: Duration,

    #[serde(default = "default_job_rate_limit")]
    pub job_rate_limit: u32,

    /// Smart-skip threshold: a partition already this complete in the DB is
    /// marked complete with a `near_complete` gap reason without fetching.
    #[serde(default = "default_smart_skip_ratio")]
    pub smart_skip_ratio: f64,

    /// Auto-complete threshold for a finished year/letter sweep.
    #[serde(default = "default_auto_complete_ratio")]
    pub auto_complete_ratio: f64,

    /// Stall counter ceiling before an edition is dropped from auto-resume.
    #[serde(default = "default_stall_limit")]
    pub stall_limit: u32,

    /// Auto-resume never picks up an edition whose reported citation count
    /// exceeds this — beyond it, a year sweep is too expensive to restart
    /// opportunistically every 15 seconds and should instead be driven by an
    /// explicit `extract_citations` job.
    #[serde(default = "default_auto_resume_skip_threshold")]
    pub auto_resume_skip_threshold: i64,
}

impl Default for JobEngineConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            heartbeat_timeout: default_heartbeat_timeout(),
            zombie_scan_interval: default_zombie_scan_interval(),
            auto_resume_interval: default_auto_resume_interval(),
            job_rate_window: default_job_rate_window(),
            job_rate_limit: default_job_rate_limit(),
            smart_skip_ratio: default_smart_skip_ratio(),
            auto_complete_ratio: default_auto_complete_ratio(),
            stall_limit: default_stall_limit(),
            auto_resume_skip_threshold: default_auto_resume_skip_threshold(),
        }
    }
}

fn default_worker_count() -> u32 {
    20
}
fn default_heartbeat_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}
fn default_zombie_scan_interval() -> Duration {
    Duration::from_secs(5 * 60)
}
fn default_auto_resume_interval() -> Duration {
    Duration::from_secs(15)
}
fn default_job_rate_window() -> Duration {
    Duration::from_secs(60)
}
fn default_job_rate_limit() -> u32 {
    50
}
fn default_smart_skip_ratio() -> f64 {
    0.90
}
fn default_auto_complete_ratio() -> f64 {
    0.95
}
fn default_stall_limit() -> u32 {
    20
}
fn default_auto_resume_skip_threshold() -> i64 {
    50_000
}

/// Configuration for the third-party fetch proxy and the search client's
/// retry/backoff behaviour.
#[derive(Deserialize, Clone, Debug)]
pub struct SearchProxyConfig {
    pub base_url: String,
    pub api_key: String,

    #[serde(
        default = "default_request_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub request_timeout: Duration,

    #[serde(
        default = "default_total_retry_budget",
        deserialize_with = "deserialize_duration"
    )]
    pub total_retry_budget: Duration,

    #[serde(
        default = "default_max_backoff",
        deserialize_with = "deserialize_duration"
    )]
    pub max_backoff: Duration,

    #[serde(default = "default_async_poll_attempts")]
    pub async_poll_attempts: u32,

    #[serde(
        default = "default_async_poll_interval",
        deserialize_with = "deserialize_duration"
    )]
    pub async_poll_interval: Duration,

    /// Whether to attempt a direct (non-proxied) fetch as a last resort
    /// after the retry budget is exhausted. Expected to fail in practice.
    #[serde(default)]
    pub attempt_direct_fallback: bool,

    /// Search-result page requests per minute, shared across all workers.
    #[serde(default = "default_search_rpm")]
    pub search_rpm: u32,

    /// Fetch-proxy async-job poll requests per minute, shared across all
    /// workers. Cheaper than a search request so this is more generous.
    #[serde(default = "default_proxy_poll_rpm")]
    pub proxy_poll_rpm: u32,
}

fn default_search_rpm() -> u32 {
    30
}
fn default_proxy_poll_rpm() -> u32 {
    120
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(45)
}
fn default_total_retry_budget() -> Duration {
    Duration::from_secs(150)
}
fn default_max_backoff() -> Duration {
    Duration::from_secs(8)
}
fn default_async_poll_attempts() -> u32 {
    15
}
fn default_async_poll_interval() -> Duration {
    Duration::from_secs(2)
}

/// Configuration for the LLM exclusion-term oracle.
#[derive(Deserialize, Clone, Debug)]
pub struct LlmOracleConfig {
    pub base_url: String,
    pub api_key: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

/// Configuration for the durable on-disk page buffer.
#[derive(Deserialize, Clone, Debug)]
pub struct PageBufferConfig {
    /// Root directory holding `in_progress/`, `failed/`, `permanent_failed/`.
    /// Defaults to an ephemeral location under the OS temp dir.
    #[serde(default = "default_buffer_directory")]
    pub directory: PathBuf,

    #[serde(default = "default_buffer_max_retries")]
    pub max_retries: u32,

    #[serde(
        default = "default_buffer_max_age",
        deserialize_with = "deserialize_duration"
    )]
    pub max_age: Duration,
}

impl Default for PageBufferConfig {
    fn default() -> Self {
        Self {
            directory: default_buffer_directory(),
            max_retries: default_buffer_max_retries(),
            max_age: default_buffer_max_age(),
        }
    }
}

fn default_buffer_directory() -> PathBuf {
    std::env::temp_dir().join("citegraph-harvester").join("pages")
}
fn default_buffer_max_retries() -> u32 {
    5
}
fn default_buffer_max_age() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

/// Defaults applied to outbound webhook callbacks.
#[derive(Deserialize, Clone, Debug)]
pub struct WebhookConfig {
    #[serde(
        default = "default_webhook_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub default_timeout: Duration,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            default_timeout: default_webhook_timeout(),
        }
    }
}

fn default_webhook_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Duration parser configured to handle various time units with seconds as default.
///
/// Supports:
/// - Seconds (s) - default unit
/// - Milliseconds (ms)
/// - Minutes (m)
///
/// Does not support fractions, exponents, or infinity values.
/// Allows for whitespace between the number and the time unit.
/// Allows for multiple time units to be specified (summed together, e.g "10s 2m" = 130 seconds).
const DURATION_PARSER: DurationParser<'static> = DurationParser::builder()
    .time_units(&[TimeUnit::Second, TimeUnit::MilliSecond, TimeUnit::Minute])
    .parse_multiple(None)
    .allow_time_unit_delimiter()
    .disable_infinity()
    .disable_fraction()
    .disable_exponent()
    .default_unit(TimeUnit::Second)
    .build();

/// Custom deserializer for duration fields that accepts both numeric and string values.
///
/// - `1` -> 1 second
/// - `"30s"` -> 30 seconds
/// - `"2 m"` -> 2 minutes
/// - `"1500ms"` -> 1.5 seconds
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Visitor;

    struct DurationVisitor;

    impl<'de> Visitor<'de> for DurationVisitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a duration string or number")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            DURATION_PARSER
                .parse(value)
                .map_err(|e| {
                    serde::de::Error::custom(format!(
                        "Invalid duration format '{}': {}. Examples: '5' (5 seconds), '3500ms', '30s', '2m'",
                        value, e
                    ))
                })?
                .try_into()
                .map_err(|e| serde::de::Error::custom(format!("Duration conversion error: {}", e)))
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(Duration::from_secs(value))
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            if value < 0 {
                return Err(serde::de::Error::custom("Duration cannot be negative"));
            }
            Ok(Duration::from_secs(value as u64))
        }
    }

    deserializer.deserialize_any(DurationVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_engine_defaults_match_expected_tuning() {
        let cfg = JobEngineConfig::default();
        assert_eq!(cfg.worker_count, 20);
        assert_eq!(cfg.heartbeat_timeout, Duration::from_secs(30 * 60));
        assert_eq!(cfg.auto_resume_interval, Duration::from_secs(15));
        assert_eq!(cfg.job_rate_limit, 50);
        assert_eq!(cfg.smart_skip_ratio, 0.90);
        assert_eq!(cfg.auto_complete_ratio, 0.95);
        assert_eq!(cfg.stall_limit, 20);
        assert_eq!(cfg.auto_resume_skip_threshold, 50_000);
    }
}
