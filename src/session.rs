// 🧭 Review Session - walk uncategorized transactions one at a time
//
// States:
//   Idle ──start()──▶ Active ──decide()/skip()──▶ Active | Completed
//   any  ──reset()──▶ Idle
//
// Invariant: reviewed + remaining == total for the whole session.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::entities::{CategoryId, Transaction, TransactionId};
use crate::error::{CategorizerError, Result};
use crate::rules::{Rule, RuleBasedCategorizer};
use crate::store::{RuleStore, TransactionSource};
use crate::suggestion::{PatternSuggestionEngine, Suggestion};

/// Confidence shown when an existing rule already covers a transaction
pub const EXISTING_RULE_CONFIDENCE: f64 = 0.9;

// ============================================================================
// SESSION TYPES
// ============================================================================

/// A transaction under review plus what the current rules say about it.
/// The suggested category is display context only; nothing is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionReview {
    pub transaction: Transaction,
    pub suggested_category: Option<CategoryId>,
    pub matching_rule: Option<Rule>,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    Active(TransactionReview),
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub total: usize,
    pub reviewed: usize,
    pub remaining: usize,
    pub progress: f64,
}

// ============================================================================
// REVIEW SESSION
// ============================================================================

pub struct ReviewSession<S> {
    id: Uuid,
    store: S,
    categorizer: RuleBasedCategorizer,
    engine: PatternSuggestionEngine,
    neighborhood_limit: usize,
    state: SessionState,
    total: usize,
    reviewed: usize,
    /// Transactions already presented (decided or skipped)
    visited: HashSet<TransactionId>,
    last_suggestions: Vec<Suggestion>,
}

impl<S: TransactionSource + RuleStore> ReviewSession<S> {
    /// Idle session over `store`, with rules loaded from it
    pub fn new(store: S, config: &EngineConfig) -> Result<Self> {
        let categorizer = RuleBasedCategorizer::from_store(&store)?;
        Ok(Self::with_parts(
            store,
            categorizer,
            PatternSuggestionEngine::new(config.known_vendors.clone()),
            config.neighborhood_limit,
        ))
    }

    pub fn with_parts(
        store: S,
        categorizer: RuleBasedCategorizer,
        engine: PatternSuggestionEngine,
        neighborhood_limit: usize,
    ) -> Self {
        ReviewSession {
            id: Uuid::new_v4(),
            store,
            categorizer,
            engine,
            neighborhood_limit,
            state: SessionState::Idle,
            total: 0,
            reviewed: 0,
            visited: HashSet::new(),
            last_suggestions: Vec::new(),
        }
    }

    /// Handle id, regenerated on every start()
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn current(&self) -> Option<&TransactionReview> {
        match &self.state {
            SessionState::Active(review) => Some(review),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, SessionState::Active(_))
    }

    /// Suggestions produced by the most recent decide()
    pub fn last_suggestions(&self) -> &[Suggestion] {
        &self.last_suggestions
    }

    pub fn categorizer(&self) -> &RuleBasedCategorizer {
        &self.categorizer
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Load the uncategorized queue and present its first transaction
    pub fn start(&mut self) -> Result<SessionStats> {
        let queue = self.store.uncategorized()?;

        self.id = Uuid::new_v4();
        self.total = queue.len();
        self.reviewed = 0;
        self.visited.clear();
        self.last_suggestions.clear();

        self.state = match queue.into_iter().next() {
            Some(first) => {
                self.visited.insert(first.id);
                SessionState::Active(self.prepare(first))
            }
            None => SessionState::Completed,
        };

        info!("Review session {} started with {} transactions", self.id, self.total);
        Ok(self.stats())
    }

    /// Assign `category_id` to the transaction under review and mine
    /// suggestions from its keyword neighborhood. Empty = no suggestions.
    pub fn decide(&mut self, transaction_id: TransactionId, category_id: CategoryId) -> Result<Vec<Suggestion>> {
        let current = match &self.state {
            SessionState::Active(review) => review.transaction.clone(),
            _ => return Err(CategorizerError::NoActiveSession),
        };

        if current.id != transaction_id {
            return Err(CategorizerError::NotUnderReview {
                expected: current.id,
                got: transaction_id,
            });
        }

        self.store.set_category(transaction_id, category_id)?;

        let decided = current.with_category(category_id);
        let neighborhood = self.neighborhood(&decided)?;
        let suggestions = self.engine.analyze(&neighborhood, category_id);

        debug!(
            "Transaction {} → category {}: {} neighbors, {} suggestions",
            transaction_id,
            category_id,
            neighborhood.len(),
            suggestions.len()
        );

        self.reviewed += 1;
        self.advance()?;

        self.last_suggestions = suggestions.clone();
        Ok(suggestions)
    }

    /// Defer the current transaction for the rest of the session
    pub fn skip(&mut self) -> Result<()> {
        if !self.is_active() {
            return Err(CategorizerError::NoActiveSession);
        }
        self.advance()
    }

    /// Store a suggestion as a rule and make it visible to matching at once
    pub fn accept_suggestion(&mut self, suggestion: &Suggestion) -> Result<Rule> {
        let rule = self.store.add_rule(suggestion.to_new_rule())?;
        self.categorizer.refresh(&self.store)?;

        // Re-evaluate the display context against the new rule set
        if let SessionState::Active(review) = &self.state {
            let transaction = review.transaction.clone();
            self.state = SessionState::Active(self.prepare(transaction));
        }

        info!("Accepted rule {} ('{}' → {})", rule.id, rule.pattern, rule.category_id);
        Ok(rule)
    }

    pub fn stats(&self) -> SessionStats {
        let remaining = self.remaining();
        SessionStats {
            total: self.total,
            reviewed: self.reviewed,
            remaining,
            progress: if self.total > 0 {
                self.reviewed as f64 / self.total as f64
            } else {
                0.0
            },
        }
    }

    /// Back to Idle; counters and suggestions are cleared
    pub fn reset(&mut self) {
        self.state = SessionState::Idle;
        self.total = 0;
        self.reviewed = 0;
        self.visited.clear();
        self.last_suggestions.clear();
    }

    fn remaining(&self) -> usize {
        self.total.saturating_sub(self.reviewed)
    }

    fn prepare(&self, transaction: Transaction) -> TransactionReview {
        match self
            .categorizer
            .matching_rule(&transaction.description, transaction.vendor.as_deref())
        {
            Some(rule) => TransactionReview {
                suggested_category: Some(rule.category_id),
                matching_rule: Some(rule.clone()),
                confidence: Some(EXISTING_RULE_CONFIDENCE),
                transaction,
            },
            None => TransactionReview {
                transaction,
                suggested_category: None,
                matching_rule: None,
                confidence: None,
            },
        }
    }

    /// Present the next unvisited uncategorized transaction, or complete
    fn advance(&mut self) -> Result<()> {
        if self.remaining() == 0 {
            self.state = SessionState::Completed;
            return Ok(());
        }

        let next = self
            .store
            .uncategorized()?
            .into_iter()
            .find(|tx| !self.visited.contains(&tx.id));

        self.state = match next {
            Some(tx) => {
                self.visited.insert(tx.id);
                SessionState::Active(self.prepare(tx))
            }
            None => SessionState::Completed,
        };

        if self.state == SessionState::Completed {
            info!("Review session {} completed", self.id);
        }
        Ok(())
    }

    /// The decided transaction plus up to `neighborhood_limit - 1` others
    /// sharing one of its keywords
    fn neighborhood(&self, decided: &Transaction) -> Result<Vec<Transaction>> {
        let mut seen: HashSet<TransactionId> = HashSet::new();
        seen.insert(decided.id);
        let mut neighborhood = vec![decided.clone()];

        for keyword in self.engine.analyzer().extract_keywords(&decided.description) {
            if neighborhood.len() >= self.neighborhood_limit {
                break;
            }
            let budget = self.neighborhood_limit - neighborhood.len();
            for tx in self.store.find_by_keyword(&keyword, &seen, budget)? {
                if seen.insert(tx.id) {
                    neighborhood.push(tx);
                }
            }
        }

        neighborhood.truncate(self.neighborhood_limit.max(1));
        Ok(neighborhood)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KnownVendors;
    use crate::entities::NewTransaction;
    use crate::rules::NewRule;
    use crate::store::InMemoryStore;
    use chrono::NaiveDate;

    fn new_tx(description: &str) -> NewTransaction {
        NewTransaction::new(NaiveDate::from_ymd_opt(2024, 5, 10).unwrap(), description, -20.0)
    }

    fn store_with(descriptions: &[&str]) -> InMemoryStore {
        let mut store = InMemoryStore::new();
        for d in descriptions {
            store.add_transaction(new_tx(d));
        }
        store
    }

    fn assert_invariant<S: TransactionSource + RuleStore>(session: &ReviewSession<S>, total: usize) {
        let stats = session.stats();
        assert_eq!(stats.total, total);
        assert_eq!(stats.reviewed + stats.remaining, total);
    }

    #[test]
    fn test_empty_queue_completes_immediately() {
        let mut session = ReviewSession::new(InMemoryStore::new(), &EngineConfig::default()).unwrap();
        let stats = session.start().unwrap();

        assert_eq!(stats, SessionStats { total: 0, reviewed: 0, remaining: 0, progress: 0.0 });
        assert_eq!(session.state(), &SessionState::Completed);
        assert!(session.current().is_none());
        assert!(matches!(session.skip(), Err(CategorizerError::NoActiveSession)));
    }

    #[test]
    fn test_decide_requires_active_session() {
        let store = store_with(&["NETFLIX.COM"]);
        let mut session = ReviewSession::new(store, &EngineConfig::default()).unwrap();

        assert!(matches!(
            session.decide(TransactionId(1), CategoryId(4)),
            Err(CategorizerError::NoActiveSession)
        ));
        assert!(matches!(session.skip(), Err(CategorizerError::NoActiveSession)));
        assert_eq!(session.stats().progress, 0.0);
    }

    #[test]
    fn test_walk_to_completion() {
        let store = store_with(&["NETFLIX.COM", "SPOTIFY USA", "HULU"]);
        let mut session = ReviewSession::new(store, &EngineConfig::default()).unwrap();
        session.start().unwrap();
        assert_invariant(&session, 3);

        while let Some(review) = session.current() {
            let id = review.transaction.id;
            session.decide(id, CategoryId(4)).unwrap();
            assert_invariant(&session, 3);
        }

        let stats = session.stats();
        assert_eq!(stats.reviewed, 3);
        assert_eq!(stats.remaining, 0);
        assert_eq!(stats.progress, 1.0);
        assert_eq!(session.state(), &SessionState::Completed);
        assert!(session.store().uncategorized().unwrap().is_empty());
    }

    #[test]
    fn test_skip_defers_without_counting() {
        let store = store_with(&["NETFLIX.COM", "SPOTIFY USA", "HULU"]);
        let mut session = ReviewSession::new(store, &EngineConfig::default()).unwrap();
        session.start().unwrap();

        let skipped = session.current().unwrap().transaction.id;
        session.skip().unwrap();
        assert_invariant(&session, 3);
        assert_eq!(session.stats().reviewed, 0);

        while let Some(review) = session.current() {
            assert_ne!(review.transaction.id, skipped);
            let id = review.transaction.id;
            session.decide(id, CategoryId(4)).unwrap();
            assert_invariant(&session, 3);
        }

        assert_eq!(session.stats().reviewed, 2);
        assert_eq!(session.stats().remaining, 1);
        let left: Vec<_> = session.store().uncategorized().unwrap().iter().map(|t| t.id).collect();
        assert_eq!(left, vec![skipped]);
    }

    #[test]
    fn test_existing_rule_is_display_context_only() {
        let mut store = store_with(&["NETFLIX.COM"]);
        store.add_rule(NewRule::literal("NETFLIX", CategoryId(4))).unwrap();

        let mut session = ReviewSession::new(store, &EngineConfig::default()).unwrap();
        session.start().unwrap();

        let review = session.current().unwrap();
        assert_eq!(review.suggested_category, Some(CategoryId(4)));
        assert_eq!(review.confidence, Some(EXISTING_RULE_CONFIDENCE));
        assert_eq!(review.matching_rule.as_ref().map(|r| r.pattern.as_str()), Some("NETFLIX"));
        assert_eq!(session.store().uncategorized().unwrap().len(), 1);
    }

    #[test]
    fn test_decide_other_transaction_is_rejected() {
        let store = store_with(&["NETFLIX.COM", "HULU"]);
        let mut session = ReviewSession::new(store, &EngineConfig::default()).unwrap();
        session.start().unwrap();

        let err = session.decide(TransactionId(2), CategoryId(4)).unwrap_err();
        assert!(matches!(
            err,
            CategorizerError::NotUnderReview { expected: TransactionId(1), got: TransactionId(2) }
        ));
        assert_eq!(session.current().map(|r| r.transaction.id), Some(TransactionId(1)));
        assert_eq!(session.stats().reviewed, 0);
    }

    #[test]
    fn test_decide_mines_neighborhood_and_accept_refreshes() {
        let mut store = store_with(&[
            "WALMART GROCERY #123",
            "WALMART SUPERCENTER",
            "WALMART GROCERY #456",
        ]);
        store.set_category(TransactionId(2), CategoryId(1)).unwrap();

        let mut session = ReviewSession::new(&mut store, &EngineConfig::default()).unwrap();
        session.start().unwrap();
        assert_eq!(session.stats().total, 2);

        let suggestions = session.decide(TransactionId(1), CategoryId(1)).unwrap();
        let top = suggestions.first().expect("suggestions");
        assert_eq!(top.pattern, "WALMART");
        assert_eq!(top.matching_transactions, vec![TransactionId(1), TransactionId(2)]);
        assert_eq!(session.last_suggestions(), suggestions.as_slice());

        // Next transaction has no rule yet
        let review = session.current().unwrap();
        assert_eq!(review.transaction.id, TransactionId(3));
        assert_eq!(review.suggested_category, None);

        let rule = session.accept_suggestion(top).unwrap();
        assert_eq!(rule.category_id, CategoryId(1));
        assert_eq!(session.categorizer().rule_count(), 1);
        assert_eq!(session.current().unwrap().suggested_category, Some(CategoryId(1)));

        drop(session);
        assert_eq!(store.rules().unwrap().len(), 1);
    }

    #[test]
    fn test_neighborhood_limit_bounds_evidence() {
        let store = store_with(&["NETFLIX.COM", "NETFLIX.COM", "NETFLIX.COM"]);
        let config = EngineConfig {
            neighborhood_limit: 1,
            ..EngineConfig::default()
        };
        let mut session = ReviewSession::new(store, &config).unwrap();
        session.start().unwrap();

        let suggestions = session.decide(TransactionId(1), CategoryId(4)).unwrap();
        assert!(suggestions.is_empty());
    }

    #[test]
    fn test_known_vendor_config_reaches_engine() {
        let store = store_with(&["UBER*EATS PIZZAHUT"]);
        let config = EngineConfig {
            known_vendors: KnownVendors::new().with(CategoryId(2), ["UBER EATS"]),
            ..EngineConfig::default()
        };
        let mut session = ReviewSession::new(store, &config).unwrap();
        session.start().unwrap();

        let suggestions = session.decide(TransactionId(1), CategoryId(2)).unwrap();
        assert_eq!(suggestions[0].pattern, "UBER EATS");
    }

    #[test]
    fn test_reset_returns_to_idle() {
        let store = store_with(&["NETFLIX.COM", "HULU"]);
        let mut session = ReviewSession::new(store, &EngineConfig::default()).unwrap();
        let first_id = session.id();
        session.start().unwrap();
        assert_ne!(session.id(), first_id);

        session.reset();
        assert_eq!(session.state(), &SessionState::Idle);
        assert_eq!(session.stats().total, 0);
        assert!(session.last_suggestions().is_empty());
        assert!(matches!(session.skip(), Err(CategorizerError::NoActiveSession)));
    }
}
