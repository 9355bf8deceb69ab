//! HTML parsing for search-index result pages.
//!
//! The index's markup is plain HTML with no stable DOM structure worth
//! depending on a parser crate for; per-field regexes (several of them
//! multi-lingual, since the index localizes "Cited by" / "About N results"
//! strings) mirror how the original scraper extracted these fields.

use crate::error::SearchClientError;
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone)]
pub struct ParsedResult {
    pub external_id: String,
    pub cluster_id: Option<String>,
    pub title: String,
    pub raw_authors: Option<String>,
    pub year: Option<i32>,
    pub venue: Option<String>,
    pub abstract_snippet: Option<String>,
    pub link: Option<String>,
    pub citation_count: Option<i64>,
    pub author_profile_links: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    pub results: Vec<ParsedResult>,
    /// The index's reported total-results count for this query, parsed
    /// from "About N results" (or a localized equivalent). `None` when the
    /// page doesn't carry a totals header (e.g. a malformed response).
    pub reported_total: Option<i64>,
}

fn result_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)<div class="gs_ri">.*?data-cid="(?P<cid>[^"]+)".*?<h3[^>]*><a[^>]*href="(?P<link>[^"]*)"[^>]*>(?P<title>.*?)</a></h3>.*?<div class="gs_a">(?P<authorline>.*?)</div>.*?<div class="gs_rs">(?P<snippet>.*?)</div>.*?</div>"#)
            .expect("static result block regex must compile")
    })
}

/// "Cited by 1,234" / "Zitiert von 1.234" / "被引用次数：1234" and siblings.
/// The count is always the first run of digits (with locale thousands
/// separators stripped) following a recognised marker phrase.
fn cited_by_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)(?:cited by|zitiert von|citée? par|citado por|citato da|geciteerd door|被引用次数[:：]?|引用元|인용한|cité par)\s*[:：]?\s*([\d.,\x{00A0}\x{202F}\s]+)",
        )
        .expect("static cited-by regex must compile")
    })
}

/// "About 12,300 results" and localized equivalents.
fn reported_total_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)(?:about|environ|ungefähr|aproximadamente|circa|ongeveer|około|yaklaşık|약)\s+([\d.,\x{00A0}\x{202F}\s]+)\s+results?",
        )
        .expect("static reported-total regex must compile")
    })
}

/// A year token embedded in the author/venue line, e.g. "J Smith, A Doe - Journal of Things, 2019 - publisher.com".
fn year_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(19|20)\d{2}\b").expect("static year regex must compile"))
}

fn author_profile_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"href="(/citations\?user=[^"]+)""#).expect("static author profile regex must compile")
    })
}

fn strip_tags(fragment: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let tag_re = RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("static tag-stripping regex must compile"));
    htmlize::unescape(tag_re.replace_all(fragment, "")).trim().to_string()
}

/// Parse locale-formatted digit groups (`"1,234"`, `"1.234"`, `"1 234"`)
/// into a plain integer by stripping every non-digit character.
fn parse_locale_number(raw: &str) -> Option<i64> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        None
    } else {
        digits.parse().ok()
    }
}

pub fn parse_page(html: &str) -> Result<ParsedPage, SearchClientError> {
    let reported_total = reported_total_re()
        .captures(html)
        .and_then(|caps| parse_locale_number(&caps[1]));

    let mut results = Vec::new();
    for caps in result_block_re().captures_iter(html) {
        let title = strip_tags(&caps["title"]);
        if title.is_empty() {
            continue;
        }
        let authorline = strip_tags(&caps["authorline"]);
        let whole_block = caps.get(0).map(|m| m.as_str()).unwrap_or_default();

        results.push(ParsedResult {
            external_id: caps["cid"].to_string(),
            cluster_id: None,
            title,
            year: year_re()
                .find(&authorline)
                .and_then(|m| m.as_str().parse().ok()),
            venue: parse_venue(&authorline),
            raw_authors: if authorline.is_empty() {
                None
            } else {
                Some(authorline)
            },
            abstract_snippet: {
                let snippet = strip_tags(&caps["snippet"]);
                if snippet.is_empty() {
                    None
                } else {
                    Some(snippet)
                }
            },
            link: {
                let link = caps["link"].to_string();
                if link.is_empty() { None } else { Some(link) }
            },
            citation_count: cited_by_re()
                .captures(whole_block)
                .and_then(|caps| parse_locale_number(&caps[1])),
            author_profile_links: author_profile_re()
                .captures_iter(whole_block)
                .map(|c| c[1].to_string())
                .collect(),
        });
    }

    if results.is_empty() && reported_total.is_none() {
        return Err(SearchClientError::ParseFailed(
            "page matched neither a result block nor a reported-total header".to_string(),
        ));
    }

    Ok(ParsedPage {
        results,
        reported_total,
    })
}

/// The author line is conventionally `"Authors - Venue, Year - Domain"`;
/// the venue segment is the middle dash-delimited piece, best-effort.
fn parse_venue(authorline: &str) -> Option<String> {
    let segments: Vec<&str> = authorline.split(" - ").collect();
    segments.get(1).map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_reported_total_in_english() {
        let html = r#"<div id="gs_ab_md">About 3,500 results (0.04 sec)</div>"#;
        let page = parse_page(html);
        assert_eq!(page.unwrap().reported_total, Some(3500));
    }

    #[test]
    fn parses_reported_total_localized() {
        let html = r#"<div>Ungefähr 1.234 Ergebnisse</div>"#;
        let page = parse_page(html);
        assert_eq!(page.unwrap().reported_total, Some(1234));
    }

    #[test]
    fn cited_by_extracts_locale_number() {
        let caps = cited_by_re().captures("Cited by 1,234").unwrap();
        assert_eq!(parse_locale_number(&caps[1]), Some(1234));
    }

    #[test]
    fn parse_venue_extracts_middle_segment() {
        assert_eq!(
            parse_venue("J Smith, A Doe - Journal of Things, 2019 - publisher.com"),
            Some("Journal of Things, 2019".to_string())
        );
    }

    #[test]
    fn parse_fails_on_unrecognised_page() {
        let result = parse_page("<html><body>nothing recognisable here</body></html>");
        assert!(result.is_err());
    }
}
