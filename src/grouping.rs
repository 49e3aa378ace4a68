// 🧩 Similarity Grouping - batch uncategorized transactions for review
//
// Greedy, order-preserving clustering: each unassigned transaction seeds a
// cluster of every still-unassigned peer whose description is similar
// enough. Pairwise comparison makes this O(n²) in the uncategorized count.

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::entities::{Transaction, TransactionId};
use crate::rules::PatternMatcher;
use crate::suggestion::MAX_SAMPLES;
use crate::text::{similarity, TextAnalyzer};

/// Token-based suggestions per cluster
pub const MAX_CLUSTER_SUGGESTIONS: usize = 3;

// ============================================================================
// RESULT TYPES
// ============================================================================

/// A regex candidate proposed for a cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSuggestion {
    pub pattern: String,
    pub is_regex: bool,

    /// Share of the similar transactions containing the token (1.0 for
    /// the single-transaction literal)
    pub confidence: f64,

    /// Matches across the full transaction set
    pub match_count: usize,

    pub sample_matches: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityCluster {
    /// Members, seed first, in input order
    pub transactions: Vec<Transaction>,
    pub count: usize,
    pub total_amount: f64,
    pub suggestions: Vec<ClusterSuggestion>,
}

impl SimilarityCluster {
    pub fn seed(&self) -> Option<&Transaction> {
        self.transactions.first()
    }
}

// ============================================================================
// GROUPER
// ============================================================================

pub struct SimilarityGrouper {
    analyzer: TextAnalyzer,

    /// Similarity must exceed this to join a cluster (default: 0.8)
    pub threshold: f64,
}

impl SimilarityGrouper {
    pub fn new() -> Self {
        SimilarityGrouper {
            analyzer: TextAnalyzer::new(),
            threshold: 0.8,
        }
    }

    pub fn with_threshold(threshold: f64) -> Self {
        SimilarityGrouper {
            threshold,
            ..Self::new()
        }
    }

    fn is_similar(&self, a: &str, b: &str) -> bool {
        similarity(a, b) > self.threshold
    }

    /// Entries of `pool` whose description is similar to `description`
    pub fn find_similar<'a>(&self, description: &str, pool: &'a [Transaction]) -> Vec<&'a Transaction> {
        pool.iter()
            .filter(|tx| self.is_similar(description, &tx.description))
            .collect()
    }

    /// Candidate patterns for transactions like `description`.
    ///
    /// With fewer than 2 similar entries in `full_set` the only candidate
    /// is an anchored, escaped literal of `description` itself.
    pub fn suggest_pattern(&self, description: &str, full_set: &[Transaction]) -> Vec<ClusterSuggestion> {
        let similar = self.find_similar(description, full_set);

        if similar.len() < 2 {
            let pattern = format!("(?i)^{}$", regex::escape(description));
            let (match_count, mut sample_matches) = self.evaluate(&pattern, full_set);
            if sample_matches.is_empty() {
                sample_matches.push(description.to_string());
            }
            return vec![ClusterSuggestion {
                pattern,
                is_regex: true,
                confidence: 1.0,
                match_count: match_count.max(1),
                sample_matches,
            }];
        }

        let descriptions: Vec<&str> = similar.iter().map(|tx| tx.description.as_str()).collect();

        self.analyzer
            .keyword_frequencies(&descriptions)
            .into_iter()
            .take(MAX_CLUSTER_SUGGESTIONS)
            .map(|(token, count)| {
                let pattern = format!("(?i){}", regex::escape(&token));
                let (match_count, sample_matches) = self.evaluate(&pattern, full_set);
                ClusterSuggestion {
                    pattern,
                    is_regex: true,
                    confidence: (count as f64 / similar.len() as f64).min(1.0),
                    match_count,
                    sample_matches,
                }
            })
            .collect()
    }

    /// Match count and first descriptions of a regex over `transactions`
    fn evaluate(&self, pattern: &str, transactions: &[Transaction]) -> (usize, Vec<String>) {
        let Ok(matcher) = PatternMatcher::compile(pattern, true) else {
            return (0, Vec::new());
        };

        let matched: Vec<&Transaction> = transactions
            .iter()
            .filter(|tx| matcher.is_match(&tx.description))
            .collect();

        let samples = matched
            .iter()
            .take(MAX_SAMPLES)
            .map(|tx| tx.description.clone())
            .collect();

        (matched.len(), samples)
    }

    /// Partition the uncategorized members of `full_set` into clusters,
    /// largest first. Every uncategorized transaction lands in exactly one.
    pub fn group_uncategorized(&self, full_set: &[Transaction]) -> Vec<SimilarityCluster> {
        let uncategorized: Vec<&Transaction> =
            full_set.iter().filter(|tx| !tx.is_categorized()).collect();

        let mut assigned: HashSet<TransactionId> = HashSet::new();
        let mut clusters = Vec::new();

        for seed in &uncategorized {
            if assigned.contains(&seed.id) {
                continue;
            }

            // Seed always belongs to its own cluster, even when a threshold
            // of 1.0 or more would reject self-similarity
            let members: Vec<Transaction> = uncategorized
                .iter()
                .filter(|tx| !assigned.contains(&tx.id))
                .filter(|tx| tx.id == seed.id || self.is_similar(&seed.description, &tx.description))
                .map(|tx| (*tx).clone())
                .collect();

            assigned.extend(members.iter().map(|tx| tx.id));

            let total_amount = members.iter().map(|tx| tx.amount).sum();
            let suggestions = self.suggest_pattern(&seed.description, full_set);

            clusters.push(SimilarityCluster {
                count: members.len(),
                transactions: members,
                total_amount,
                suggestions,
            });
        }

        clusters.sort_by(|a, b| b.count.cmp(&a.count));

        debug!(
            "Grouped {} uncategorized transactions into {} clusters",
            uncategorized.len(),
            clusters.len()
        );

        clusters
    }
}

impl Default for SimilarityGrouper {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::CategoryId;
    use chrono::NaiveDate;

    fn tx(id: i64, description: &str, amount: f64) -> Transaction {
        Transaction::new(
            TransactionId(id),
            NaiveDate::from_ymd_opt(2024, 4, 2).unwrap(),
            description,
            amount,
        )
    }

    fn mixed_set() -> Vec<Transaction> {
        vec![
            tx(1, "WALMART GROCERY #123", -40.0),
            tx(2, "NETFLIX.COM", -15.99),
            tx(3, "WALMART GROCERY #456", -22.5),
            tx(4, "LOCAL BAKERY", -8.0),
            tx(5, "NETFLIX.COM", -15.99),
            tx(6, "SHELL OIL 1234", -30.0).with_category(CategoryId(3)),
            tx(7, "WALMART GROCERY #789", -10.0),
        ]
    }

    #[test]
    fn test_single_unmatched_merchant() {
        let grouper = SimilarityGrouper::new();
        let set = vec![tx(1, "NEW MERCHANT XYZ", -99.0)];

        let clusters = grouper.group_uncategorized(&set);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].count, 1);
        assert_eq!(clusters[0].total_amount, -99.0);

        let suggestions = &clusters[0].suggestions;
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].pattern, "(?i)^NEW MERCHANT XYZ$");
        assert_eq!(suggestions[0].confidence, 1.0);
    }

    #[test]
    fn test_literal_fallback_matches_only_identical() {
        let grouper = SimilarityGrouper::new();
        let set = vec![
            tx(1, "NEW MERCHANT XYZ", -1.0),
            tx(2, "OLD MERCHANT XYZW LTD", -1.0),
            tx(3, "COFFEE SHOP", -1.0),
        ];

        let suggestions = grouper.suggest_pattern("NEW MERCHANT XYZ", &set);
        assert_eq!(suggestions.len(), 1);

        let matcher = PatternMatcher::compile(&suggestions[0].pattern, true).unwrap();
        let matching: Vec<_> = set.iter().filter(|t| matcher.is_match(&t.description)).map(|t| t.id).collect();
        assert_eq!(matching, vec![TransactionId(1)]);
        assert!(matcher.is_match("new merchant xyz"));
    }

    #[test]
    fn test_group_uncategorized_partitions() {
        let grouper = SimilarityGrouper::new();
        let set = mixed_set();
        let clusters = grouper.group_uncategorized(&set);

        let mut seen = HashSet::new();
        for cluster in &clusters {
            assert_eq!(cluster.count, cluster.transactions.len());
            for member in &cluster.transactions {
                assert!(seen.insert(member.id), "{} in two clusters", member.id);
            }
        }
        let expected: HashSet<_> = set.iter().filter(|t| !t.is_categorized()).map(|t| t.id).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_clusters_sorted_by_size() {
        let grouper = SimilarityGrouper::new();
        let clusters = grouper.group_uncategorized(&mixed_set());

        let counts: Vec<_> = clusters.iter().map(|c| c.count).collect();
        assert_eq!(counts, vec![3, 2, 1]);
        assert_eq!(clusters[0].seed().map(|t| t.id), Some(TransactionId(1)));
        assert!((clusters[0].total_amount - -72.5).abs() < 1e-9);
    }

    #[test]
    fn test_cluster_suggestions_from_common_tokens() {
        let grouper = SimilarityGrouper::new();
        let clusters = grouper.group_uncategorized(&mixed_set());

        let walmart = &clusters[0].suggestions;
        assert_eq!(walmart[0].pattern, "(?i)WALMART");
        assert_eq!(walmart[0].match_count, 3);
        assert_eq!(walmart[0].confidence, 1.0);
        assert!(walmart.len() <= MAX_CLUSTER_SUGGESTIONS);
    }

    #[test]
    fn test_match_count_uses_full_set() {
        let grouper = SimilarityGrouper::new();
        let set = vec![
            tx(1, "WALMART GROCERY #123", -1.0),
            tx(2, "WALMART GROCERY #456", -1.0),
            tx(3, "WALMART PHARMACY", -1.0),
        ];

        let suggestions = grouper.suggest_pattern("WALMART GROCERY #123", &set);
        let walmart = suggestions
            .iter()
            .find(|s| s.pattern == "(?i)WALMART")
            .expect("token suggestion");
        assert_eq!(walmart.match_count, 3);
        assert_eq!(walmart.confidence, 1.0);
    }

    #[test]
    fn test_seed_kept_when_threshold_rejects_everything() {
        let grouper = SimilarityGrouper::with_threshold(1.0);
        let set = vec![tx(1, "SAME", -1.0), tx(2, "SAME", -1.0)];

        assert!(grouper.find_similar("SAME", &set).is_empty());
        let clusters = grouper.group_uncategorized(&set);
        assert_eq!(clusters.len(), 2);
        assert!(clusters.iter().all(|c| c.count == 1));
    }

    #[test]
    fn test_empty_set() {
        let grouper = SimilarityGrouper::new();
        assert!(grouper.group_uncategorized(&[]).is_empty());
    }
}
