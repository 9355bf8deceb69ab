//! The Search Client: one primitive operation — fetch a result page
//! for a query, retried and backed off against a fetch proxy — plus the
//! higher-level paginated operations built on it.

use crate::config::SearchProxyConfig;
use crate::error::SearchClientError;
use crate::search::parse::{self, ParsedPage};
use crate::search::query::SearchQuery;
use crate::search::rate_limit::{RequestKind, SearchRateLimiter};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// The index's hard cap on results per query. Crossing this
/// triggers stratification/partitioning rather than a direct fetch.
pub const OVERFLOW_THRESHOLD: i64 = 1000;

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum ProxyResponse {
    Done { html: String },
    Pending { job_id: String },
    Error { message: String },
}

pub struct SearchClient {
    http: reqwest::Client,
    config: SearchProxyConfig,
    rate_limiter: SearchRateLimiter,
}

impl SearchClient {
    pub fn new(config: SearchProxyConfig, search_rpm: u32, proxy_poll_rpm: u32) -> Result<Self, SearchClientError> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            http,
            config,
            rate_limiter: SearchRateLimiter::new(search_rpm, proxy_poll_rpm),
        })
    }

    /// Fetch raw HTML for a single URL via the fetch proxy, retrying with
    /// exponential backoff (capped at `max_backoff`) until `total_retry_budget`
    /// is exhausted. The proxy may answer synchronously or hand back an
    /// async job id to poll.
    pub async fn fetch_result_page(&self, url: &str) -> Result<String, SearchClientError> {
        let deadline = Instant::now() + self.config.total_retry_budget;
        let mut backoff = Duration::from_millis(500);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            if Instant::now() >= deadline {
                warn!(url, attempt, "search client retry budget exhausted");
                if self.config.attempt_direct_fallback {
                    return self.fetch_direct(url).await;
                }
                return Err(SearchClientError::BudgetExhausted {
                    budget_secs: self.config.total_retry_budget.as_secs(),
                });
            }

            self.rate_limiter.wait_for_permission(RequestKind::Search).await;
            match self.try_fetch_once(url).await {
                Ok(html) => {
                    debug!(url, attempt, "search client fetch succeeded");
                    return Ok(html);
                }
                Err(e) if e.is_transient() => {
                    warn!(url, attempt, error = %e, backoff = ?backoff, "transient fetch failure, retrying");
                    tokio::time::sleep(backoff.min(self.config.max_backoff)).await;
                    backoff = (backoff * 2).min(self.config.max_backoff);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_fetch_once(&self, url: &str) -> Result<String, SearchClientError> {
        let response = self
            .http
            .post(format!("{}/fetch", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&serde_json::json!({ "url": url }))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SearchClientError::RateLimited);
        }
        let proxy_response: ProxyResponse = response.error_for_status()?.json().await?;

        match proxy_response {
            ProxyResponse::Done { html } => Ok(html),
            ProxyResponse::Error { message } => Err(SearchClientError::ParseFailed(message)),
            ProxyResponse::Pending { job_id } => self.poll_async_job(&job_id).await,
        }
    }

    async fn poll_async_job(&self, job_id: &str) -> Result<String, SearchClientError> {
        for attempt in 0..self.config.async_poll_attempts {
            self.rate_limiter
                .wait_for_permission(RequestKind::ProxyPoll)
                .await;
            tokio::time::sleep(self.config.async_poll_interval).await;

            let response = self
                .http
                .get(format!("{}/jobs/{job_id}", self.config.base_url))
                .bearer_auth(&self.config.api_key)
                .send()
                .await?
                .error_for_status()?;
            let proxy_response: ProxyResponse = response.json().await?;

            match proxy_response {
                ProxyResponse::Done { html } => return Ok(html),
                ProxyResponse::Error { message } => return Err(SearchClientError::ParseFailed(message)),
                ProxyResponse::Pending { .. } => {
                    debug!(job_id, attempt, "proxy job still pending");
                }
            }
        }
        Err(SearchClientError::ProxyJobTimedOut)
    }

    /// Last-resort direct fetch after the retry budget is exhausted. Expected
    /// to fail in practice — the index blocks direct automated traffic — and
    /// is never relied upon.
    async fn fetch_direct(&self, url: &str) -> Result<String, SearchClientError> {
        let response = self.http.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }

    pub async fn fetch_query_page(&self, query: &SearchQuery) -> Result<ParsedPage, SearchClientError> {
        let url = self.build_url(query);
        let html = self.fetch_result_page(&url).await?;
        parse::parse_page(&html)
    }

    pub(crate) fn build_url(&self, query: &SearchQuery) -> String {
        let mut url = url::Url::parse(&self.config.base_url).expect("configured base_url must be valid");
        url.set_path("/scholar");
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("q", &query.render_q());
            pairs.append_pair("start", &query.offset().to_string());
            if let Some(id) = &query.cites_external_id {
                pairs.append_pair("cites", id);
            }
            if let Some(lang) = &query.filters.language {
                pairs.append_pair("lr", lang);
            }
            if let Some(low) = query.filters.year_low {
                pairs.append_pair("as_ylo", &low.to_string());
            }
            if let Some(high) = query.filters.year_high {
                pairs.append_pair("as_yhi", &high.to_string());
            }
        }
        url.to_string()
    }

    /// `count_only(query, filters)`: fetch one page, return only the
    /// reported total.
    pub async fn count_only(&self, query: &SearchQuery) -> Result<i64, SearchClientError> {
        let page = self.fetch_query_page(query).await?;
        Ok(page.reported_total.unwrap_or(0))
    }

    /// Fetch the page starting at `max(0, expected - RESULTS_PER_PAGE)` to
    /// confirm the last page exists and read the *current* reported count —
    /// the index's total can drift between the first page of a harvest and
    /// its last.
    pub async fn verify_last_page(
        &self,
        mut query: SearchQuery,
        expected: i64,
    ) -> Result<ParsedPage, SearchClientError> {
        let last_page = ((expected - SearchQuery::RESULTS_PER_PAGE as i64).max(0)
            / SearchQuery::RESULTS_PER_PAGE as i64) as u32;
        query.start_page = last_page;
        self.fetch_query_page(&query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::query::SearchFilters;

    fn test_config() -> SearchProxyConfig {
        SearchProxyConfig {
            base_url: "https://example-index.test".to_string(),
            api_key: "test-key".to_string(),
            request_timeout: Duration::from_secs(45),
            total_retry_budget: Duration::from_secs(150),
            max_backoff: Duration::from_secs(8),
            async_poll_attempts: 15,
            async_poll_interval: Duration::from_secs(2),
            attempt_direct_fallback: false,
            search_rpm: 30,
            proxy_poll_rpm: 120,
        }
    }

    #[test]
    fn build_url_includes_cites_and_filters() {
        let client = SearchClient::new(test_config(), 30, 60).unwrap();
        let query = SearchQuery::citing("abc123", SearchFilters {
            language: Some("lang_de".to_string()),
            year_low: Some(2015),
            ..Default::default()
        }, 2);
        let url = client.build_url(&query);
        assert!(url.contains("cites=abc123"));
        assert!(url.contains("lr=lang_de"));
        assert!(url.contains("as_ylo=2015"));
        assert!(url.contains("start=20"));
    }
}
