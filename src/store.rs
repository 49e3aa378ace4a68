// 🔌 Boundaries - transaction source, rule store, category directory
//
// The engine reads snapshots through these traits and writes only category
// assignments and rules. `SqliteStore` (db.rs) is the persistent adapter;
// `InMemoryStore` backs tests and embedders that hold data themselves.

use chrono::Utc;
use std::collections::HashSet;

use crate::entities::{
    Category, CategoryId, NewCategory, NewTransaction, RuleId, Transaction, TransactionId,
};
use crate::error::{CategorizerError, Result};
use crate::rules::{NewRule, Rule, RuleUpdate};

// ============================================================================
// BOUNDARY TRAITS
// ============================================================================

pub trait TransactionSource {
    /// All transactions with no category, in the source's review order
    fn uncategorized(&self) -> Result<Vec<Transaction>>;

    /// Transactions whose description contains `keyword` (case-insensitive),
    /// skipping ids in `exclude`, at most `limit` of them
    fn find_by_keyword(
        &self,
        keyword: &str,
        exclude: &HashSet<TransactionId>,
        limit: usize,
    ) -> Result<Vec<Transaction>>;

    fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>>;

    fn set_category(&mut self, id: TransactionId, category_id: CategoryId) -> Result<()>;
}

pub trait RuleStore {
    /// Every stored rule; order is not significant (see `RuleSet`)
    fn rules(&self) -> Result<Vec<Rule>>;

    /// Validate and append a rule
    fn add_rule(&mut self, rule: NewRule) -> Result<Rule>;

    fn update_rule(&mut self, id: RuleId, update: RuleUpdate) -> Result<Rule>;

    fn delete_rule(&mut self, id: RuleId) -> Result<()>;

    /// Bulk load. Every rule is validated before anything is written.
    fn import_rules(&mut self, rules: Vec<NewRule>, clear_existing: bool) -> Result<usize>;
}

pub trait CategoryDirectory {
    fn categories(&self) -> Result<Vec<Category>>;

    fn category(&self, id: CategoryId) -> Result<Option<Category>> {
        Ok(self.categories()?.into_iter().find(|c| c.id == id))
    }

    /// Ok if `id` names a known category
    fn validate(&self, id: CategoryId) -> Result<()> {
        match self.category(id)? {
            Some(_) => Ok(()),
            None => Err(CategorizerError::UnknownCategory(id)),
        }
    }
}

// Lets a session borrow a store instead of owning it

impl<T: TransactionSource + ?Sized> TransactionSource for &mut T {
    fn uncategorized(&self) -> Result<Vec<Transaction>> {
        (**self).uncategorized()
    }

    fn find_by_keyword(
        &self,
        keyword: &str,
        exclude: &HashSet<TransactionId>,
        limit: usize,
    ) -> Result<Vec<Transaction>> {
        (**self).find_by_keyword(keyword, exclude, limit)
    }

    fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>> {
        (**self).transaction(id)
    }

    fn set_category(&mut self, id: TransactionId, category_id: CategoryId) -> Result<()> {
        (**self).set_category(id, category_id)
    }
}

impl<T: RuleStore + ?Sized> RuleStore for &mut T {
    fn rules(&self) -> Result<Vec<Rule>> {
        (**self).rules()
    }

    fn add_rule(&mut self, rule: NewRule) -> Result<Rule> {
        (**self).add_rule(rule)
    }

    fn update_rule(&mut self, id: RuleId, update: RuleUpdate) -> Result<Rule> {
        (**self).update_rule(id, update)
    }

    fn delete_rule(&mut self, id: RuleId) -> Result<()> {
        (**self).delete_rule(id)
    }

    fn import_rules(&mut self, rules: Vec<NewRule>, clear_existing: bool) -> Result<usize> {
        (**self).import_rules(rules, clear_existing)
    }
}

impl<T: CategoryDirectory + ?Sized> CategoryDirectory for &mut T {
    fn categories(&self) -> Result<Vec<Category>> {
        (**self).categories()
    }
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

/// Vec-backed store. Uncategorized transactions come back in insertion order.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    transactions: Vec<Transaction>,
    rules: Vec<Rule>,
    categories: Vec<Category>,
    next_transaction_id: i64,
    next_rule_id: i64,
    next_category_id: i64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with existing snapshots (ids are kept as given)
    pub fn with_transactions(transactions: Vec<Transaction>) -> Self {
        let next_transaction_id = transactions.iter().map(|t| t.id.value()).max().unwrap_or(0);
        InMemoryStore {
            transactions,
            next_transaction_id,
            ..Self::default()
        }
    }

    pub fn add_transaction(&mut self, new: NewTransaction) -> Transaction {
        self.next_transaction_id += 1;
        let tx = new.into_transaction(TransactionId(self.next_transaction_id));
        self.transactions.push(tx.clone());
        tx
    }

    pub fn add_category(&mut self, new: NewCategory) -> Result<Category> {
        if let Some(parent) = new.parent_id {
            self.validate(parent)?;
        }
        self.next_category_id += 1;
        let mut category = Category::new(CategoryId(self.next_category_id), new.name, new.parent_id);
        category.created_at = Some(Utc::now());
        self.categories.push(category.clone());
        Ok(category)
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    fn store_rule(&mut self, rule: NewRule) -> Rule {
        self.next_rule_id += 1;
        let rule = rule.into_rule(RuleId(self.next_rule_id), Utc::now());
        self.rules.push(rule.clone());
        rule
    }
}

impl TransactionSource for InMemoryStore {
    fn uncategorized(&self) -> Result<Vec<Transaction>> {
        Ok(self
            .transactions
            .iter()
            .filter(|t| !t.is_categorized())
            .cloned()
            .collect())
    }

    fn find_by_keyword(
        &self,
        keyword: &str,
        exclude: &HashSet<TransactionId>,
        limit: usize,
    ) -> Result<Vec<Transaction>> {
        let needle = keyword.to_uppercase();
        Ok(self
            .transactions
            .iter()
            .filter(|t| !exclude.contains(&t.id))
            .filter(|t| t.description.to_uppercase().contains(&needle))
            .take(limit)
            .cloned()
            .collect())
    }

    fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>> {
        Ok(self.transactions.iter().find(|t| t.id == id).cloned())
    }

    fn set_category(&mut self, id: TransactionId, category_id: CategoryId) -> Result<()> {
        let tx = self
            .transactions
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(CategorizerError::TransactionNotFound(id))?;
        tx.category_id = Some(category_id);
        Ok(())
    }
}

impl RuleStore for InMemoryStore {
    fn rules(&self) -> Result<Vec<Rule>> {
        Ok(self.rules.clone())
    }

    fn add_rule(&mut self, rule: NewRule) -> Result<Rule> {
        rule.validate()?;
        Ok(self.store_rule(rule))
    }

    fn update_rule(&mut self, id: RuleId, update: RuleUpdate) -> Result<Rule> {
        let existing = self
            .rules
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(CategorizerError::RuleNotFound(id))?;
        let updated = update.apply(existing)?;
        *existing = updated.clone();
        Ok(updated)
    }

    fn delete_rule(&mut self, id: RuleId) -> Result<()> {
        let before = self.rules.len();
        self.rules.retain(|r| r.id != id);
        if self.rules.len() == before {
            return Err(CategorizerError::RuleNotFound(id));
        }
        Ok(())
    }

    fn import_rules(&mut self, rules: Vec<NewRule>, clear_existing: bool) -> Result<usize> {
        for rule in &rules {
            rule.validate()?;
        }
        if clear_existing {
            self.rules.clear();
        }
        let count = rules.len();
        for rule in rules {
            self.store_rule(rule);
        }
        Ok(count)
    }
}

impl CategoryDirectory for InMemoryStore {
    fn categories(&self) -> Result<Vec<Category>> {
        Ok(self.categories.clone())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn new_tx(description: &str) -> NewTransaction {
        NewTransaction::new(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(), description, 12.5)
    }

    #[test]
    fn test_uncategorized_in_insertion_order() {
        let mut store = InMemoryStore::new();
        let a = store.add_transaction(new_tx("NETFLIX.COM"));
        let b = store.add_transaction(new_tx("SPOTIFY"));
        let c = store.add_transaction(new_tx("HULU"));
        store.set_category(b.id, CategoryId(4)).unwrap();

        let ids: Vec<_> = store.uncategorized().unwrap().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![a.id, c.id]);
    }

    #[test]
    fn test_find_by_keyword_excludes_and_limits() {
        let mut store = InMemoryStore::new();
        let first = store.add_transaction(new_tx("Walmart Grocery"));
        store.add_transaction(new_tx("WALMART SUPERCENTER"));
        store.add_transaction(new_tx("walmart.com"));
        store.add_transaction(new_tx("TARGET"));

        let exclude: HashSet<_> = [first.id].into_iter().collect();
        let found = store.find_by_keyword("WALMART", &exclude, 10).unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|t| t.id != first.id));

        let capped = store.find_by_keyword("walmart", &HashSet::new(), 1).unwrap();
        assert_eq!(capped.len(), 1);
    }

    #[test]
    fn test_set_category_unknown_transaction() {
        let mut store = InMemoryStore::new();
        assert!(matches!(
            store.set_category(TransactionId(42), CategoryId(1)),
            Err(CategorizerError::TransactionNotFound(TransactionId(42)))
        ));
    }

    #[test]
    fn test_add_rule_rejects_bad_regex() {
        let mut store = InMemoryStore::new();
        assert!(store.add_rule(NewRule::regex("([", CategoryId(1))).is_err());
        assert!(store.rules().unwrap().is_empty());

        let rule = store.add_rule(NewRule::literal("NETFLIX", CategoryId(4))).unwrap();
        assert_eq!(rule.id, RuleId(1));
    }

    #[test]
    fn test_import_rules_is_all_or_nothing() {
        let mut store = InMemoryStore::new();
        store.add_rule(NewRule::literal("HULU", CategoryId(4))).unwrap();

        let batch = vec![
            NewRule::literal("NETFLIX", CategoryId(4)),
            NewRule::regex("(", CategoryId(4)),
        ];
        assert!(store.import_rules(batch, true).is_err());
        assert_eq!(store.rules().unwrap().len(), 1);

        let batch = vec![
            NewRule::literal("NETFLIX", CategoryId(4)),
            NewRule::literal("SPOTIFY", CategoryId(4)),
        ];
        assert_eq!(store.import_rules(batch, true).unwrap(), 2);
        let patterns: Vec<_> = store.rules().unwrap().into_iter().map(|r| r.pattern).collect();
        assert_eq!(patterns, vec!["NETFLIX", "SPOTIFY"]);
    }

    #[test]
    fn test_update_and_delete_rule() {
        let mut store = InMemoryStore::new();
        let rule = store.add_rule(NewRule::literal("UBER", CategoryId(5))).unwrap();

        let update = RuleUpdate {
            category_id: Some(CategoryId(6)),
            ..Default::default()
        };
        let updated = store.update_rule(rule.id, update).unwrap();
        assert_eq!(updated.category_id, CategoryId(6));
        assert_eq!(updated.created_at, rule.created_at);

        store.delete_rule(rule.id).unwrap();
        assert!(matches!(
            store.delete_rule(rule.id),
            Err(CategorizerError::RuleNotFound(_))
        ));
    }

    #[test]
    fn test_category_directory_validation() {
        let mut store = InMemoryStore::new();
        let food = store.add_category(NewCategory::root("Food")).unwrap();
        store
            .add_category(NewCategory::child_of("Restaurants", food.id))
            .unwrap();

        assert!(store.validate(food.id).is_ok());
        assert!(matches!(
            store.validate(CategoryId(99)),
            Err(CategorizerError::UnknownCategory(CategoryId(99)))
        ));
        assert!(store
            .add_category(NewCategory::child_of("Orphan", CategoryId(99)))
            .is_err());
    }
}
