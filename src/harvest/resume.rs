//! Resume-page arithmetic for restarted year/partition sweeps.
//!
//! The index returns a fixed 10 results per page; [`SearchQuery::RESULTS_PER_PAGE`]
//! is that constant. This module is pure so the boundary behaviour is
//! covered without a database.

use crate::search::SearchQuery;

/// `max(resume_state.last_page, db_count_for_year / RESULTS_PER_PAGE)`.
///
/// Guards against replaying already-saved pages when the previous run
/// crashed between committing citations and persisting `harvest_resume_state`
/// (the DB count moved on, but the resume checkpoint didn't).
pub fn compute_resume_page(resume_last_page: u32, db_count_for_partition: i64) -> u32 {
    let from_db_count = (db_count_for_partition / SearchQuery::RESULTS_PER_PAGE as i64).max(0) as u32;
    resume_last_page.max(from_db_count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resume_page_prefers_whichever_estimate_is_further_along() {
        assert_eq!(compute_resume_page(3, 25), 3);
        assert_eq!(compute_resume_page(1, 95), 9);
        assert_eq!(compute_resume_page(0, 0), 0);
    }

    #[test]
    fn resume_page_handles_exact_page_boundary() {
        assert_eq!(compute_resume_page(0, 30), 3);
    }
}
