// 💡 Pattern Suggestion Engine
//
// Turns transactions confirmed for one category into ranked candidate rules.
//
// Candidate sources, in generation order:
//   1. Exact     - normalized descriptions seen more than once
//   2. Known     - configured vendor aliases present in the set (base 0.95)
//   3. Substring - top common keywords
//   4. Regex     - anchored prefixes / numeric shapes matching >1 transaction
//
// Suggestions are ephemeral: recomputed per call, never stored.

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::config::KnownVendors;
use crate::entities::{CategoryId, Transaction, TransactionId};
use crate::error::Result;
use crate::rules::{NewRule, PatternMatcher};
use crate::text::TextAnalyzer;

/// Cap on evidence kept per suggestion
pub const MAX_SAMPLES: usize = 5;

/// How many common keywords become substring candidates
pub const MAX_SUBSTRING_CANDIDATES: usize = 5;

/// Base confidence of an injected known-vendor alias
pub const KNOWN_VENDOR_CONFIDENCE: f64 = 0.95;

// ============================================================================
// SUGGESTION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatternKind {
    Exact,
    Substring,
    Regex,
}

impl PatternKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternKind::Exact => "exact",
            PatternKind::Substring => "substring",
            PatternKind::Regex => "regex",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub pattern: String,
    pub category_id: CategoryId,
    pub is_regex: bool,

    /// Heuristic in [0, 1]
    pub confidence: f64,

    pub kind: PatternKind,

    /// Up to MAX_SAMPLES matching transactions
    pub matching_transactions: Vec<TransactionId>,

    /// Up to MAX_SAMPLES matching descriptions
    pub sample_matches: Vec<String>,
}

impl Suggestion {
    /// Rule payload for accepting this suggestion
    pub fn to_new_rule(&self) -> NewRule {
        NewRule {
            pattern: self.pattern.clone(),
            category_id: self.category_id,
            priority: 0,
            is_regex: self.is_regex,
        }
    }
}

/// Confidence for a candidate matching `matches` of `total` transactions.
///
/// `known_vendor` only affects exact candidates.
pub fn score_confidence(matches: usize, total: usize, kind: PatternKind, known_vendor: bool) -> f64 {
    if total == 0 {
        return 0.0;
    }

    let mut base = matches as f64 / total as f64;

    match kind {
        PatternKind::Exact => {
            base = (base * 2.0).min(1.0);
            if known_vendor {
                base = (base * 1.5).min(1.0);
            }
        }
        PatternKind::Substring => base *= 0.9,
        PatternKind::Regex => base *= 0.8,
    }

    // Sample size adjustment
    if total < 5 {
        base *= 0.8;
    } else if total > 20 {
        base *= 1.2;
    }

    base.clamp(0.0, 1.0)
}

/// All `parts` occur in `text`, left to right, without overlapping
fn contains_in_order(text: &str, parts: &[&str]) -> bool {
    let mut rest = text;
    for part in parts {
        match rest.find(part) {
            Some(pos) => rest = &rest[pos + part.len()..],
            None => return false,
        }
    }
    true
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct PatternSuggestionEngine {
    analyzer: TextAnalyzer,
    known_vendors: KnownVendors,
}

impl PatternSuggestionEngine {
    pub fn new(known_vendors: KnownVendors) -> Self {
        PatternSuggestionEngine {
            analyzer: TextAnalyzer::new(),
            known_vendors,
        }
    }

    pub fn analyzer(&self) -> &TextAnalyzer {
        &self.analyzer
    }

    pub fn known_vendors(&self) -> &KnownVendors {
        &self.known_vendors
    }

    /// Ranked candidate rules for `category_id`, mined from the members of
    /// `transactions` already assigned to it. Other transactions are ignored.
    pub fn analyze(&self, transactions: &[Transaction], category_id: CategoryId) -> Vec<Suggestion> {
        let members: Vec<&Transaction> = transactions
            .iter()
            .filter(|tx| tx.category_id == Some(category_id))
            .collect();

        if members.is_empty() {
            return Vec::new();
        }

        let descriptions: Vec<&str> = members.iter().map(|tx| tx.description.as_str()).collect();
        let uppercased: Vec<String> = descriptions.iter().map(|d| d.to_uppercase()).collect();
        let total = descriptions.len();
        let all_aliases = self.known_vendors.all_aliases();

        let mut suggestions = Vec::new();

        // 1. Exact repeats
        for (pattern, count) in self.exact_repeats(&descriptions) {
            if count < 2 {
                continue;
            }
            let known = all_aliases.iter().any(|alias| pattern.contains(alias.as_str()));
            let confidence = score_confidence(count, total, PatternKind::Exact, known);
            suggestions.extend(self.build(pattern, category_id, PatternKind::Exact, confidence, &members));
        }

        // 2. Known vendors for this category
        for alias in self.known_vendors.aliases_for(category_id) {
            let joined = self.known_vendors.joined(&alias);
            let present = uppercased
                .iter()
                .any(|d| d.contains(alias.as_str()) || d.contains(joined.as_str()));
            if present {
                suggestions.extend(self.build(
                    alias,
                    category_id,
                    PatternKind::Exact,
                    KNOWN_VENDOR_CONFIDENCE,
                    &members,
                ));
            }
        }

        // 3. Common substrings
        for token in self
            .analyzer
            .find_common_patterns(&descriptions)
            .into_iter()
            .take(MAX_SUBSTRING_CANDIDATES)
        {
            let matches = uppercased.iter().filter(|d| d.contains(token.as_str())).count();
            let confidence = score_confidence(matches, total, PatternKind::Substring, false);
            suggestions.extend(self.build(token, category_id, PatternKind::Substring, confidence, &members));
        }

        // 4. Regex shapes
        for pattern in self.analyzer.suggest_regex_patterns(&descriptions) {
            let Ok(matcher) = PatternMatcher::compile(&pattern, true) else {
                continue;
            };
            let matches = uppercased.iter().filter(|d| matcher.is_match(d)).count();
            if matches > 1 {
                let confidence = score_confidence(matches, total, PatternKind::Regex, false);
                suggestions.extend(self.build(pattern, category_id, PatternKind::Regex, confidence, &members));
            }
        }

        suggestions.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        // Same pattern from two sources: keep the higher-ranked one
        let mut seen = HashSet::new();
        suggestions.retain(|s| seen.insert((s.pattern.to_uppercase(), s.is_regex)));

        debug!(
            "Generated {} suggestions for category {} from {} transactions",
            suggestions.len(),
            category_id,
            total
        );

        suggestions
    }

    /// Normalized descriptions with occurrence counts, first-seen order
    fn exact_repeats(&self, descriptions: &[&str]) -> Vec<(String, usize)> {
        let mut counts: Vec<(String, usize)> = Vec::new();
        for description in descriptions {
            let normalized = self.analyzer.normalize_vendor_name(description);
            match counts.iter_mut().find(|(p, _)| *p == normalized) {
                Some((_, count)) => *count += 1,
                None => counts.push((normalized, 1)),
            }
        }
        counts
    }

    /// Attach evidence to a candidate. Candidates that match nothing, even
    /// after the multi-word and alias fallbacks, are dropped.
    fn build(
        &self,
        pattern: String,
        category_id: CategoryId,
        kind: PatternKind,
        confidence: f64,
        members: &[&Transaction],
    ) -> Option<Suggestion> {
        let is_regex = kind == PatternKind::Regex;
        let matcher = match PatternMatcher::compile(&pattern, is_regex) {
            Ok(matcher) => matcher,
            Err(e) => {
                debug!("Discarding candidate '{}': {}", pattern, e);
                return None;
            }
        };

        let mut confidence = confidence;
        let mut matched: Vec<&Transaction> = members
            .iter()
            .copied()
            .filter(|tx| matcher.is_match(&tx.description))
            .collect();

        let upper = pattern.to_uppercase();

        // Multi-word literal: accept its words appearing in order
        if matched.is_empty() && !is_regex && upper.contains(' ') {
            let parts: Vec<&str> = upper.split_whitespace().collect();
            matched = members
                .iter()
                .copied()
                .filter(|tx| contains_in_order(&tx.description.to_uppercase(), &parts))
                .collect();
            if !matched.is_empty() && kind == PatternKind::Exact {
                confidence = (confidence * 1.5).min(1.0);
            }
        }

        // Known alias written with the join character ("UBER*EATS")
        if matched.is_empty() && !is_regex {
            let alias = self
                .known_vendors
                .all_aliases()
                .into_iter()
                .find(|alias| upper.contains(alias.as_str()));
            if let Some(alias) = alias {
                let joined = self.known_vendors.joined(&alias);
                matched = members
                    .iter()
                    .copied()
                    .filter(|tx| {
                        let desc = tx.description.to_uppercase();
                        desc.contains(alias.as_str()) || desc.contains(joined.as_str())
                    })
                    .collect();
                if !matched.is_empty() && kind == PatternKind::Exact {
                    confidence = (confidence * 2.0).min(1.0);
                }
            }
        }

        if matched.is_empty() {
            debug!("Discarding candidate '{}': no matching transactions", pattern);
            return None;
        }

        Some(Suggestion {
            pattern,
            category_id,
            is_regex,
            confidence: confidence.clamp(0.0, 1.0),
            kind,
            matching_transactions: matched.iter().take(MAX_SAMPLES).map(|tx| tx.id).collect(),
            sample_matches: matched
                .iter()
                .take(MAX_SAMPLES)
                .map(|tx| tx.description.clone())
                .collect(),
        })
    }
}

impl Default for PatternSuggestionEngine {
    fn default() -> Self {
        Self::new(KnownVendors::default())
    }
}

// ============================================================================
// PATTERN EFFECTIVENESS
// ============================================================================

/// How a prospective rule would play out over a transaction set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternEffectiveness {
    pub matching_transactions: usize,
    pub unique_descriptions: usize,
    pub total_amount: f64,

    /// Share of the uncategorized transactions this pattern would catch
    pub impact_on_uncategorized: f64,

    pub sample_matches: Vec<String>,
}

pub fn pattern_effectiveness(
    pattern: &str,
    is_regex: bool,
    transactions: &[Transaction],
) -> Result<PatternEffectiveness> {
    let matcher = PatternMatcher::compile(pattern, is_regex)?;

    let matched: Vec<&Transaction> = transactions
        .iter()
        .filter(|tx| matcher.is_match(&tx.description))
        .collect();

    let uncategorized_total = transactions.iter().filter(|tx| !tx.is_categorized()).count();
    let uncategorized_matched = matched.iter().filter(|tx| !tx.is_categorized()).count();

    let unique: HashSet<&str> = matched.iter().map(|tx| tx.description.as_str()).collect();

    Ok(PatternEffectiveness {
        matching_transactions: matched.len(),
        unique_descriptions: unique.len(),
        total_amount: matched.iter().map(|tx| tx.amount).sum(),
        impact_on_uncategorized: if uncategorized_total > 0 {
            uncategorized_matched as f64 / uncategorized_total as f64
        } else {
            0.0
        },
        sample_matches: matched
            .iter()
            .take(MAX_SAMPLES)
            .map(|tx| tx.description.clone())
            .collect(),
    })
}

// ============================================================================
// TESTS
// ============================================================================
