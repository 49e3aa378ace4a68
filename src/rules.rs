// 🏷️ Categorization Rules - Rules as Data
// Priority-ordered pattern rules mapping transaction text to a category

use anyhow::{Context as AnyhowContext, Result as AnyResult};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fs;
use std::path::Path;

use crate::entities::{CategoryId, RuleId, Transaction};
use crate::error::{CategorizerError, Result};
use crate::store::RuleStore;
use crate::text::TextAnalyzer;

// ============================================================================
// RULE DEFINITION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,

    /// Literal substring or regex, matched case-insensitively
    pub pattern: String,

    /// Category to assign
    pub category_id: CategoryId,

    /// Priority (higher = applied first)
    pub priority: i32,

    pub is_regex: bool,

    pub created_at: DateTime<Utc>,
}

impl Rule {
    /// Total evaluation order: priority desc, created_at asc, id asc
    pub fn precedence(&self, other: &Rule) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then(self.created_at.cmp(&other.created_at))
            .then(self.id.cmp(&other.id))
    }
}

/// A rule as submitted to a rule store, before it has an identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRule {
    pub pattern: String,
    pub category_id: CategoryId,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub is_regex: bool,
}

impl NewRule {
    /// Literal substring rule
    pub fn literal(pattern: impl Into<String>, category_id: CategoryId) -> Self {
        NewRule {
            pattern: pattern.into(),
            category_id,
            priority: 0,
            is_regex: false,
        }
    }

    pub fn regex(pattern: impl Into<String>, category_id: CategoryId) -> Self {
        NewRule {
            pattern: pattern.into(),
            category_id,
            priority: 0,
            is_regex: true,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Reject rules that could never be evaluated
    pub fn validate(&self) -> Result<()> {
        PatternMatcher::compile(&self.pattern, self.is_regex).map(|_| ())
    }

    pub fn into_rule(self, id: RuleId, created_at: DateTime<Utc>) -> Rule {
        Rule {
            id,
            pattern: self.pattern,
            category_id: self.category_id,
            priority: self.priority,
            is_regex: self.is_regex,
            created_at,
        }
    }
}

/// Partial update of a stored rule; None leaves a field unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleUpdate {
    pub pattern: Option<String>,
    pub category_id: Option<CategoryId>,
    pub priority: Option<i32>,
    pub is_regex: Option<bool>,
}

impl RuleUpdate {
    /// Apply onto an existing rule, validating the result
    pub fn apply(&self, rule: &Rule) -> Result<Rule> {
        let mut updated = rule.clone();
        if let Some(pattern) = &self.pattern {
            updated.pattern = pattern.clone();
        }
        if let Some(category_id) = self.category_id {
            updated.category_id = category_id;
        }
        if let Some(priority) = self.priority {
            updated.priority = priority;
        }
        if let Some(is_regex) = self.is_regex {
            updated.is_regex = is_regex;
        }

        PatternMatcher::compile(&updated.pattern, updated.is_regex)?;
        Ok(updated)
    }
}

/// Load rules from a JSON file: `[{"pattern": "...", "category_id": 1, ...}]`
pub fn load_rules_json<P: AsRef<Path>>(path: P) -> AnyResult<Vec<NewRule>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read rules file: {:?}", path.as_ref()))?;

    let rules: Vec<NewRule> =
        serde_json::from_str(&content).context("Failed to parse rules JSON")?;

    Ok(rules)
}

// ============================================================================
// PATTERN MATCHER
// ============================================================================

/// Compiled form of a (pattern, is_regex) pair
#[derive(Debug, Clone)]
pub enum PatternMatcher {
    /// Uppercased literal, searched as a substring of uppercased text
    Literal(String),
    /// Case-insensitive regex, searched anywhere in the text
    Regex(Regex),
}

impl PatternMatcher {
    pub fn compile(pattern: &str, is_regex: bool) -> Result<Self> {
        if pattern.trim().is_empty() {
            return Err(CategorizerError::EmptyPattern);
        }

        if is_regex {
            let re = RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|source| CategorizerError::InvalidPattern {
                    pattern: pattern.to_string(),
                    source,
                })?;
            Ok(PatternMatcher::Regex(re))
        } else {
            Ok(PatternMatcher::Literal(pattern.to_uppercase()))
        }
    }

    pub fn is_match(&self, text: &str) -> bool {
        match self {
            PatternMatcher::Literal(needle) => text.to_uppercase().contains(needle.as_str()),
            PatternMatcher::Regex(re) => re.is_match(text),
        }
    }
}

// ============================================================================
// RULE SET (ordered, compiled snapshot)
// ============================================================================

struct CompiledRule {
    rule: Rule,
    /// None when the stored pattern no longer compiles; such rules are skipped
    matcher: Option<PatternMatcher>,
}

pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    pub fn empty() -> Self {
        RuleSet { rules: Vec::new() }
    }

    /// Compile and order a rule snapshot
    pub fn from_rules(mut rules: Vec<Rule>) -> Self {
        rules.sort_by(|a, b| a.precedence(b));

        let compiled = rules
            .into_iter()
            .map(|rule| {
                let matcher = match PatternMatcher::compile(&rule.pattern, rule.is_regex) {
                    Ok(matcher) => Some(matcher),
                    Err(e) => {
                        warn!("Skipping rule {} ('{}'): {}", rule.id, rule.pattern, e);
                        None
                    }
                };
                CompiledRule { rule, matcher }
            })
            .collect();

        RuleSet { rules: compiled }
    }

    /// First rule (in precedence order) whose pattern matches `text`
    pub fn find_match(&self, text: &str) -> Option<&Rule> {
        self.rules
            .iter()
            .find(|cr| cr.matcher.as_ref().is_some_and(|m| m.is_match(text)))
            .map(|cr| &cr.rule)
    }

    /// Rules in evaluation order (including ones skipped as invalid)
    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().map(|cr| &cr.rule)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::empty()
    }
}

// ============================================================================
// CATEGORIZATION RESULT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Categorization {
    Matched(CategoryId),
    Unmatched,
}

impl Categorization {
    pub fn category_id(&self) -> Option<CategoryId> {
        match self {
            Categorization::Matched(id) => Some(*id),
            Categorization::Unmatched => None,
        }
    }

    pub fn is_matched(&self) -> bool {
        matches!(self, Categorization::Matched(_))
    }
}

// ============================================================================
// RULE-BASED CATEGORIZER
// ============================================================================

pub struct RuleBasedCategorizer {
    analyzer: TextAnalyzer,
    rules: RuleSet,
}

impl RuleBasedCategorizer {
    /// Categorizer with no rules; everything is Unmatched until refreshed
    pub fn new() -> Self {
        RuleBasedCategorizer {
            analyzer: TextAnalyzer::new(),
            rules: RuleSet::empty(),
        }
    }

    pub fn from_rules(rules: Vec<Rule>) -> Self {
        RuleBasedCategorizer {
            analyzer: TextAnalyzer::new(),
            rules: RuleSet::from_rules(rules),
        }
    }

    pub fn from_store<R: RuleStore + ?Sized>(store: &R) -> Result<Self> {
        let mut categorizer = Self::new();
        categorizer.refresh(store)?;
        Ok(categorizer)
    }

    /// Re-read the rule list. Required after any out-of-band rule change.
    pub fn refresh<R: RuleStore + ?Sized>(&mut self, store: &R) -> Result<()> {
        self.rules = RuleSet::from_rules(store.rules()?);
        debug!("Loaded {} categorization rules", self.rules.len());
        Ok(())
    }

    /// Normalized description, followed by the normalized vendor if given
    pub fn match_text(&self, description: &str, vendor: Option<&str>) -> String {
        let normalized = self.analyzer.normalize_vendor_name(description);
        match vendor {
            Some(vendor) => format!(
                "{} {}",
                normalized,
                self.analyzer.normalize_vendor_name(vendor)
            ),
            None => normalized,
        }
    }

    /// The rule that decides `description`, if any
    pub fn matching_rule(&self, description: &str, vendor: Option<&str>) -> Option<&Rule> {
        self.rules.find_match(&self.match_text(description, vendor))
    }

    /// Classify a description.
    ///
    /// `amount` is accepted so amount-aware matching can be added without
    /// changing callers; default matching ignores it.
    pub fn categorize(&self, description: &str, _amount: f64, vendor: Option<&str>) -> Categorization {
        match self.matching_rule(description, vendor) {
            Some(rule) => Categorization::Matched(rule.category_id),
            None => Categorization::Unmatched,
        }
    }

    /// Categorize copies of `transactions`; the input is left untouched
    pub fn categorize_batch(&self, transactions: &[Transaction]) -> Vec<Transaction> {
        transactions
            .iter()
            .map(|tx| {
                let mut categorized = tx.clone();
                categorized.category_id = self
                    .categorize(&tx.description, tx.amount, tx.vendor.as_deref())
                    .category_id();
                categorized
            })
            .collect()
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

impl Default for RuleBasedCategorizer {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
