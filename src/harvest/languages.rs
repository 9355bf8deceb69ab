//! Fixed language stratification order.
//!
//! Each non-English language is probed separately — multi-language filters
//! are not issued in a single request — before falling back to the Partition
//! Planner for the English remainder.

/// `(display name, index language filter code)`, in probing order.
pub const STRATIFICATION_LANGUAGES: &[(&str, &str)] = &[
    ("Chinese (Simplified)", "lang_zh-CN"),
    ("Chinese (Traditional)", "lang_zh-TW"),
    ("Japanese", "lang_ja"),
    ("Korean", "lang_ko"),
    ("German", "lang_de"),
    ("French", "lang_fr"),
    ("Spanish", "lang_es"),
    ("Portuguese", "lang_pt"),
    ("Italian", "lang_it"),
    ("Dutch", "lang_nl"),
    ("Polish", "lang_pl"),
    ("Turkish", "lang_tr"),
];

pub const ENGLISH_FILTER: &str = "lang_en";

/// Default venues excluded on the first pass of author-letter partitioning,
/// before the list is extended or LLM-augmented.
pub const DEFAULT_EXCLUDED_VENUES: &[&str] = &[
    "arXiv", "SSRN", "ResearchGate", "bioRxiv", "medRxiv", "Academia.edu",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stratification_order_leads_with_chinese_and_ends_before_english() {
        assert_eq!(STRATIFICATION_LANGUAGES.first().unwrap().0, "Chinese (Simplified)");
        assert_eq!(STRATIFICATION_LANGUAGES.last().unwrap().0, "Turkish");
        assert!(STRATIFICATION_LANGUAGES.iter().all(|(name, _)| *name != "English"));
    }
}
