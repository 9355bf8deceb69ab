//! Token-bucket rate limiting for the search index and the fetch proxy's
//! async-job polling cadence, split per request type so a burst of status
//! polls can't starve the search budget.

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Which budget a call draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// A search-index fetch (direct or via the fetch proxy).
    Search,
    /// A poll of an async fetch-proxy job's status.
    ProxyPoll,
}

pub struct SearchRateLimiter {
    search: Arc<DefaultDirectRateLimiter>,
    proxy_poll: Arc<DefaultDirectRateLimiter>,
}

impl SearchRateLimiter {
    /// `search_rpm` is deliberately conservative: sleep-based pacing
    /// between pages (2-4s) already does most of the work, this limiter is
    /// a second line of defense against bursts.
    pub fn new(search_rpm: u32, proxy_poll_rpm: u32) -> Self {
        let search_quota = Quota::per_minute(NonZeroU32::new(search_rpm.max(1)).unwrap());
        let proxy_quota = Quota::per_minute(NonZeroU32::new(proxy_poll_rpm.max(1)).unwrap());
        Self {
            search: Arc::new(RateLimiter::direct(search_quota)),
            proxy_poll: Arc::new(RateLimiter::direct(proxy_quota)),
        }
    }

    pub async fn wait_for_permission(&self, kind: RequestKind) {
        let limiter = match kind {
            RequestKind::Search => &self.search,
            RequestKind::ProxyPoll => &self.proxy_poll,
        };
        limiter.until_ready().await;
    }
}
