// 🔤 Text Analysis - vendor normalization, keyword extraction, pattern mining
//
// Everything here is a pure function of its input. Normalized text is
// uppercase, punctuation-free and single-spaced, so literal rules compare
// against a stable shape.

use regex::Regex;
use std::collections::{HashMap, HashSet};

/// Words that say something about the payment rail, not the merchant
pub const GENERIC_TRANSACTION_WORDS: &[&str] = &[
    "PAYMENT",
    "PURCHASE",
    "POS",
    "DEBIT",
    "CREDIT",
    "TRANSACTION",
    "WITHDRAWAL",
    "DEPOSIT",
    "FEE",
    "CHARGE",
    "ACH",
    "TRANSFER",
];

/// Legal-entity suffixes stripped as whole words
pub const BUSINESS_SUFFIXES: &[&str] = &[
    "INC",
    "LLC",
    "LTD",
    "CORP",
    "CORPORATION",
    "CO",
    "INCORPORATED",
    "LIMITED",
    "COMPANY",
];

/// Separator used by processors for compound merchant codes (UBER*EATS)
pub const COMPOUND_SEPARATOR: char = '*';

/// Numeric shapes offered as regex candidates
pub const NUMERIC_SHAPES: &[&str] = &[r"\d{4}", r"\d{6}", r"\d{2}/\d{2}", r"#\d+"];

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Minimum occurrences for a token or prefix to count as "common"
pub fn min_occurrences(sample_size: usize) -> usize {
    (sample_size / 5).max(2)
}

// ============================================================================
// TEXT ANALYZER
// ============================================================================

#[derive(Debug, Clone)]
pub struct TextAnalyzer {
    generic_words: HashSet<&'static str>,
    business_suffixes: HashSet<&'static str>,
    numeric_shapes: Vec<(&'static str, Regex)>,
}

impl TextAnalyzer {
    pub fn new() -> Self {
        TextAnalyzer {
            generic_words: GENERIC_TRANSACTION_WORDS.iter().copied().collect(),
            business_suffixes: BUSINESS_SUFFIXES.iter().copied().collect(),
            numeric_shapes: NUMERIC_SHAPES
                .iter()
                .filter_map(|shape| Regex::new(shape).ok().map(|re| (*shape, re)))
                .collect(),
        }
    }

    /// Normalize a vendor/description for matching.
    ///
    /// "Uber*Eats Pending, Inc." → "UBER EATS PENDING"
    pub fn normalize_vendor_name(&self, text: &str) -> String {
        let upper = text.to_uppercase();
        let stripped = self.strip_business_suffixes(&upper);

        let cleaned: String = stripped
            .chars()
            .map(|c| {
                if is_word_char(c) || c.is_whitespace() || c == COMPOUND_SEPARATOR {
                    c
                } else {
                    ' '
                }
            })
            .collect();

        cleaned
            .split(|c: char| c.is_whitespace() || c == COMPOUND_SEPARATOR)
            .filter(|token| !token.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Remove suffix words (and one trailing '.') from uppercase text
    fn strip_business_suffixes(&self, text: &str) -> String {
        let chars: Vec<char> = text.chars().collect();
        let mut out = String::with_capacity(text.len());
        let mut i = 0;

        while i < chars.len() {
            if !is_word_char(chars[i]) {
                out.push(chars[i]);
                i += 1;
                continue;
            }

            let start = i;
            while i < chars.len() && is_word_char(chars[i]) {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();

            if self.business_suffixes.contains(word.as_str()) {
                if i < chars.len() && chars[i] == '.' {
                    i += 1;
                }
                continue;
            }
            out.push_str(&word);
        }

        out
    }

    /// Merchant-bearing tokens of a description, in order of appearance
    pub fn extract_keywords(&self, text: &str) -> Vec<String> {
        let cleaned: String = text
            .to_uppercase()
            .chars()
            .map(|c| if is_word_char(c) || c.is_whitespace() { c } else { ' ' })
            .collect();

        cleaned
            .split_whitespace()
            .filter(|word| !self.generic_words.contains(word) && word.chars().count() > 2)
            .map(String::from)
            .collect()
    }

    /// Common keywords with their occurrence counts, most frequent first.
    /// Ties keep first-seen order.
    pub fn keyword_frequencies<S: AsRef<str>>(&self, descriptions: &[S]) -> Vec<(String, usize)> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        let mut order: Vec<String> = Vec::new();

        for description in descriptions {
            let normalized = self.normalize_vendor_name(description.as_ref());
            for keyword in self.extract_keywords(&normalized) {
                let count = counts.entry(keyword.clone()).or_insert(0);
                if *count == 0 {
                    order.push(keyword);
                }
                *count += 1;
            }
        }

        let threshold = min_occurrences(descriptions.len());
        let mut frequent: Vec<(String, usize)> = order
            .into_iter()
            .filter_map(|keyword| {
                let count = counts.get(&keyword).copied().unwrap_or(0);
                (count >= threshold).then_some((keyword, count))
            })
            .collect();

        frequent.sort_by(|a, b| b.1.cmp(&a.1));
        frequent
    }

    /// Tokens present in a meaningful share of the descriptions
    pub fn find_common_patterns<S: AsRef<str>>(&self, descriptions: &[S]) -> Vec<String> {
        self.keyword_frequencies(descriptions)
            .into_iter()
            .map(|(keyword, _)| keyword)
            .collect()
    }

    /// Candidate regex fragments: anchored common prefixes, then numeric shapes.
    pub fn suggest_regex_patterns<S: AsRef<str>>(&self, descriptions: &[S]) -> Vec<String> {
        let mut prefix_counts: HashMap<String, usize> = HashMap::new();
        let mut prefix_order: Vec<String> = Vec::new();

        for description in descriptions {
            let normalized = self.normalize_vendor_name(description.as_ref());
            let Some(prefix) = normalized.split_whitespace().next() else {
                continue;
            };
            // Short prefixes ("TO", "AT") carry no merchant signal
            if prefix.chars().count() <= 2 {
                continue;
            }
            let count = prefix_counts.entry(prefix.to_string()).or_insert(0);
            if *count == 0 {
                prefix_order.push(prefix.to_string());
            }
            *count += 1;
        }

        let threshold = min_occurrences(descriptions.len());
        let mut patterns: Vec<String> = prefix_order
            .into_iter()
            .filter(|prefix| prefix_counts.get(prefix).copied().unwrap_or(0) >= threshold)
            .map(|prefix| format!("^{}", regex::escape(&prefix)))
            .collect();

        // Shapes are checked on the raw text: normalization erases '#' and '/'
        let uppercased: Vec<String> = descriptions
            .iter()
            .map(|d| d.as_ref().to_uppercase())
            .collect();
        for (shape, re) in &self.numeric_shapes {
            if uppercased.iter().any(|d| re.is_match(d)) {
                patterns.push(shape.to_string());
            }
        }

        patterns
    }
}

impl Default for TextAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// SIMILARITY
// ============================================================================

/// Sequence-similarity ratio of two strings, case-insensitive, in [0, 1].
///
/// 2·M / T where M is the number of characters in recursively matched
/// longest common blocks and T the combined length. Two empty strings are
/// identical (1.0).
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();

    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }

    2.0 * matching_characters(&a, &b) as f64 / total as f64
}

fn matching_characters(a: &[char], b: &[char]) -> usize {
    let mut matched = 0;
    let mut pending = vec![(0, a.len(), 0, b.len())];

    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let (i, j, size) = longest_common_block(a, b, alo, ahi, blo, bhi);
        if size == 0 {
            continue;
        }
        matched += size;

        if alo < i && blo < j {
            pending.push((alo, i, blo, j));
        }
        if i + size < ahi && j + size < bhi {
            pending.push((i + size, ahi, j + size, bhi));
        }
    }

    matched
}

/// Longest common run in a[alo..ahi] × b[blo..bhi].
/// Earliest end in `a` wins ties, then earliest end in `b`.
fn longest_common_block(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let width = bhi - blo;
    let mut best = (alo, blo, 0);
    let mut prev = vec![0usize; width + 1];

    for i in alo..ahi {
        let mut row = vec![0usize; width + 1];
        for j in blo..bhi {
            if a[i] == b[j] {
                let k = prev[j - blo] + 1;
                row[j - blo + 1] = k;
                if k > best.2 {
                    best = (i + 1 - k, j + 1 - k, k);
                }
            }
        }
        prev = row;
    }

    best
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_suffixes_and_punctuation() {
        let analyzer = TextAnalyzer::new();
        assert_eq!(analyzer.normalize_vendor_name("Acme Widgets, Inc."), "ACME WIDGETS");
        assert_eq!(analyzer.normalize_vendor_name("ELECTRIC CO BILL"), "ELECTRIC BILL");
        assert_eq!(analyzer.normalize_vendor_name("TRADER JOE'S #456"), "TRADER JOE S 456");
        // Suffix words inside longer words survive
        assert_eq!(analyzer.normalize_vendor_name("COSTCO WHOLESALE"), "COSTCO WHOLESALE");
    }

    #[test]
    fn test_normalize_splits_compound_codes() {
        let analyzer = TextAnalyzer::new();
        assert_eq!(analyzer.normalize_vendor_name("uber*eats  pizzahut"), "UBER EATS PIZZAHUT");
        assert_eq!(analyzer.normalize_vendor_name("DOORDASH*SUBWAY"), "DOORDASH SUBWAY");
        assert_eq!(analyzer.normalize_vendor_name("UBER *TRIP"), "UBER TRIP");
        assert_eq!(analyzer.normalize_vendor_name("  "), "");
    }

    #[test]
    fn test_extract_keywords_drops_generic_and_short() {
        let analyzer = TextAnalyzer::new();
        let keywords = analyzer.extract_keywords("POS DEBIT Whole Foods MKT #12 ACH");
        assert_eq!(keywords, vec!["WHOLE", "FOODS", "MKT"]);
    }

    #[test]
    fn test_find_common_patterns_ranked_by_frequency() {
        let analyzer = TextAnalyzer::new();
        let descriptions = [
            "SAFEWAY #789",
            "SAFEWAY #012",
            "SAFEWAY FUEL",
            "SHELL FUEL",
            "TARGET STORE",
        ];
        let common = analyzer.find_common_patterns(&descriptions);
        assert_eq!(common, vec!["SAFEWAY", "FUEL"]);
    }

    #[test]
    fn test_find_common_patterns_threshold_scales() {
        let analyzer = TextAnalyzer::new();
        // 15 descriptions → threshold 3; "LYFT" occurs twice only
        let mut descriptions: Vec<String> = (0..13).map(|i| format!("STORE{} ITEM", i)).collect();
        descriptions.push("LYFT RIDE".to_string());
        descriptions.push("LYFT RIDE".to_string());
        let common = analyzer.find_common_patterns(&descriptions);
        assert_eq!(common, vec!["ITEM"]);
    }

    #[test]
    fn test_suggest_regex_patterns() {
        let analyzer = TextAnalyzer::new();
        let descriptions = [
            "AMAZON.COM*123ABC",
            "AMAZON MKTP 2024",
            "TARGET #4455",
            "CHECK 12/31",
        ];
        let patterns = analyzer.suggest_regex_patterns(&descriptions);
        assert!(patterns.contains(&"^AMAZON".to_string()));
        assert!(patterns.contains(&r"\d{4}".to_string()));
        assert!(patterns.contains(&r"\d{2}/\d{2}".to_string()));
        assert!(patterns.contains(&r"#\d+".to_string()));
        assert!(!patterns.contains(&r"\d{6}".to_string()));
        assert!(!patterns.iter().any(|p| p == "^TARGET"));
    }

    #[test]
    fn test_similarity_ratio() {
        assert_eq!(similarity("abcd", "bcde"), 0.75);
        assert_eq!(similarity("Netflix", "NETFLIX"), 1.0);
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("abc", ""), 0.0);
        assert_eq!(similarity("abc", "xyz"), 0.0);
    }

    #[test]
    fn test_similarity_of_store_numbers() {
        let score = similarity("WALMART GROCERY #123", "WALMART GROCERY #456");
        assert!((score - 0.85).abs() < 1e-9, "got {}", score);
        assert!(similarity("WALMART GROCERY", "SPOTIFY PREMIUM") < 0.5);
    }
}
