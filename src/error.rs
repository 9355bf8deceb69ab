//! Error types shared across the harvesting core.
//!
//! Most application code propagates errors with `anyhow` (see [`Result`]) the
//! way the rest of this codebase does; the enums below exist for the call
//! sites that need to *classify* a failure (is this `transient_fetch`, or
//! `page_parse_fail`, or something that should abort the job?) rather than
//! just log and bubble it up.

use thiserror::Error;

/// Crate-wide result alias for application code that propagates with `?`.
pub type Result<T> = anyhow::Result<T>;

/// Errors surfaced by the search client's `fetch_result_page` and the
/// higher-level operations built on it.
#[derive(Debug, Error)]
pub enum SearchClientError {
    #[error("search proxy returned rate-limited response")]
    RateLimited,

    #[error("async fetch-proxy job did not complete within the polling budget")]
    ProxyJobTimedOut,

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to parse result page: {0}")]
    ParseFailed(String),

    #[error("total retry budget of {budget_secs}s exhausted")]
    BudgetExhausted { budget_secs: u64 },
}

impl SearchClientError {
    /// Whether this error is worth retrying within the call's own budget,
    /// as opposed to a terminal condition.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SearchClientError::RateLimited
                | SearchClientError::ProxyJobTimedOut
                | SearchClientError::Http(_)
        )
    }
}

/// Errors from the partition planner's term-discovery loop.
#[derive(Debug, Error)]
pub enum PartitionError {
    #[error("LLM oracle returned no new candidate terms")]
    NoTermsSuggested,

    #[error("{consecutive_zero_reductions} consecutive term attempts produced zero reduction")]
    Stuck {
        consecutive_zero_reductions: u32,
    },

    #[error("exhausted MAX_TERM_ATTEMPTS without reaching the target count")]
    MaxAttemptsExceeded,

    #[error("recursion depth exceeded while partitioning the inclusion set")]
    RecursionDepthExceeded,
}

/// Errors from the durable page buffer.
#[derive(Debug, Error)]
pub enum BufferError {
    #[error("buffer io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("buffer serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
