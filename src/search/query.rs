//! Query construction for the search index.

/// A filter on a citing-works query: language, year bounds, title-term
/// exclusions/inclusions, and author/venue filters.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub language: Option<String>,
    pub year_low: Option<i32>,
    pub year_high: Option<i32>,
    /// Title terms to exclude (`-intitle:"term"`), built by the Partition
    /// Planner.
    pub exclude_title_terms: Vec<String>,
    /// Title terms such that the query matches if *any* is present
    /// (`intitle:"t1" OR intitle:"t2" OR ...`), used for a partition's
    /// inclusion set.
    pub include_any_title_terms: Vec<String>,
    /// Restrict to authors whose surname starts with this letter.
    pub author_letter: Option<char>,
    pub exclude_venues: Vec<String>,
    pub include_any_venues: Vec<String>,
}

/// One query against "works citing `cites_external_id`", or a free-text
/// search when `cites_external_id` is `None`.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub cites_external_id: Option<String>,
    pub text: Option<String>,
    pub filters: SearchFilters,
    pub start_page: u32,
}

impl SearchQuery {
    pub fn citing(external_id: impl Into<String>, filters: SearchFilters, start_page: u32) -> Self {
        Self {
            cites_external_id: Some(external_id.into()),
            text: None,
            filters,
            start_page,
        }
    }

    pub fn text_search(text: impl Into<String>, filters: SearchFilters) -> Self {
        Self {
            cites_external_id: None,
            text: Some(text.into()),
            filters,
            start_page: 0,
        }
    }

    /// Results per page is a fixed index behaviour. The resume-page
    /// arithmetic in `harvest::resume` depends on this not changing.
    pub const RESULTS_PER_PAGE: u32 = 10;

    /// Render this query's `q` parameter. Exclusion/inclusion title terms
    /// and venue filters are appended as the index's own boolean operators;
    /// multi-language filters are never issued in a single combined request.
    pub fn render_q(&self) -> String {
        let mut parts = Vec::new();
        if let Some(text) = &self.text {
            parts.push(text.clone());
        }
        for term in &self.filters.exclude_title_terms {
            parts.push(format!("-intitle:\"{term}\""));
        }
        if !self.filters.include_any_title_terms.is_empty() {
            let clause = self
                .filters
                .include_any_title_terms
                .iter()
                .map(|t| format!("intitle:\"{t}\""))
                .collect::<Vec<_>>()
                .join(" OR ");
            parts.push(format!("({clause})"));
        }
        if let Some(letter) = self.filters.author_letter {
            parts.push(format!("author:\"{letter}*\""));
        }
        if !self.filters.exclude_venues.is_empty() {
            for venue in &self.filters.exclude_venues {
                parts.push(format!("-source:\"{venue}\""));
            }
        }
        if !self.filters.include_any_venues.is_empty() {
            let clause = self
                .filters
                .include_any_venues
                .iter()
                .map(|v| format!("source:\"{v}\""))
                .collect::<Vec<_>>()
                .join(" OR ");
            parts.push(format!("({clause})"));
        }
        parts.join(" ")
    }

    pub fn offset(&self) -> u32 {
        self.start_page * Self::RESULTS_PER_PAGE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_q_combines_exclusions_and_inclusions() {
        let mut filters = SearchFilters::default();
        filters.exclude_title_terms = vec!["cultural".to_string(), "social".to_string()];
        let query = SearchQuery::citing("123abc", filters, 0);
        let rendered = query.render_q();
        assert!(rendered.contains("-intitle:\"cultural\""));
        assert!(rendered.contains("-intitle:\"social\""));
    }

    #[test]
    fn render_q_builds_inclusion_or_clause() {
        let mut filters = SearchFilters::default();
        filters.include_any_title_terms = vec!["cultural".to_string(), "social".to_string()];
        let query = SearchQuery::text_search("", filters);
        assert_eq!(
            query.render_q().trim(),
            "(intitle:\"cultural\" OR intitle:\"social\")"
        );
    }

    #[test]
    fn offset_uses_fixed_results_per_page() {
        let query = SearchQuery::citing("abc", SearchFilters::default(), 3);
        assert_eq!(query.offset(), 30);
    }
}
