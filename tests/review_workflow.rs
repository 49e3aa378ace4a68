// End-to-end review flows over SqliteStore

use chrono::NaiveDate;
use std::io::Write;

use txn_categorizer::{
    load_csv, CategorizerError, CategoryDirectory, CategoryId, EngineConfig, KnownVendors,
    NewCategory, NewRule, NewTransaction, ReviewSession, RuleBasedCategorizer, RuleStore,
    SessionState, SimilarityGrouper, SqliteStore, TransactionId, TransactionSource,
};

fn new_tx(description: &str, amount: f64) -> NewTransaction {
    NewTransaction::new(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(), description, amount)
}

fn store_with(descriptions: &[&str]) -> SqliteStore {
    let store = SqliteStore::open_in_memory().unwrap();
    let rows: Vec<NewTransaction> = descriptions.iter().map(|d| new_tx(d, -25.0)).collect();
    store.insert_transactions(&rows).unwrap();
    store
}

#[test]
fn test_csv_import_is_idempotent() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "date,description,amount,vendor").unwrap();
    writeln!(file, "2024-03-01,NETFLIX.COM,-15.99,").unwrap();
    writeln!(file, "2024-03-02,SHELL OIL 1234,-40.00,Shell").unwrap();

    let rows = load_csv(file.path()).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].vendor, None);
    assert_eq!(rows[1].vendor.as_deref(), Some("Shell"));

    let store = SqliteStore::open_in_memory().unwrap();
    let first = store.insert_transactions(&rows).unwrap();
    let second = store.insert_transactions(&rows).unwrap();

    assert_eq!((first.inserted, first.duplicates), (2, 0));
    assert_eq!((second.inserted, second.duplicates), (0, 2));
    assert_eq!(store.count_transactions().unwrap(), 2);

    // Newest first
    let queue = store.uncategorized().unwrap();
    assert_eq!(queue[0].description, "SHELL OIL 1234");
}

#[test]
fn test_higher_priority_rule_wins() {
    let mut store = store_with(&["NETFLIX.COM"]);
    store.add_rule(NewRule::literal("NETFLIX", CategoryId(4))).unwrap();
    store
        .add_rule(NewRule::regex(r"NETFLIX\.COM", CategoryId(5)).with_priority(10))
        .unwrap();

    let categorizer = RuleBasedCategorizer::from_store(&store).unwrap();
    let result = categorizer.categorize("NETFLIX.COM", -15.99, None);
    assert_eq!(result.category_id(), Some(CategoryId(5)));
}

#[test]
fn test_invalid_import_writes_nothing() {
    let mut store = SqliteStore::open_in_memory().unwrap();
    let rules = vec![
        NewRule::literal("NETFLIX", CategoryId(4)),
        NewRule::regex("(unclosed", CategoryId(4)),
    ];

    let err = store.import_rules(rules, false).unwrap_err();
    assert!(matches!(err, CategorizerError::InvalidPattern { .. }));
    assert!(store.rules().unwrap().is_empty());
}

#[test]
fn test_batch_categorize_then_apply() {
    let mut store = store_with(&["NETFLIX.COM", "SHELL OIL 1234", "LOCAL BAKERY"]);
    store.add_rule(NewRule::literal("NETFLIX", CategoryId(4))).unwrap();
    store.add_rule(NewRule::regex("^SHELL", CategoryId(3))).unwrap();

    let categorizer = RuleBasedCategorizer::from_store(&store).unwrap();
    let uncategorized = store.uncategorized().unwrap();
    let categorized = categorizer.categorize_batch(&uncategorized);

    // Batch is pure: nothing persisted yet
    assert_eq!(store.uncategorized().unwrap().len(), 3);
    assert_eq!(categorized.len(), 3);
    assert_eq!(
        categorized.iter().filter(|tx| tx.is_categorized()).count(),
        2
    );

    for tx in &categorized {
        if let Some(rule) = categorizer.matching_rule(&tx.description, tx.vendor.as_deref()) {
            store.apply_rule(tx.id, rule).unwrap();
        }
    }

    let left = store.uncategorized().unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].description, "LOCAL BAKERY");
    assert_eq!(store.transactions_in_category(CategoryId(4)).unwrap().len(), 1);
}

#[test]
fn test_review_session_mines_and_accepts_rule() {
    let mut store = store_with(&[
        "WALMART GROCERY #123",
        "WALMART SUPERCENTER",
        "TRADER JOE'S #456",
        "WALMART GROCERY #456",
    ]);
    let groceries = store.add_category(NewCategory::root("Groceries")).unwrap();
    store.set_category(TransactionId(2), groceries.id).unwrap();
    store.set_category(TransactionId(3), groceries.id).unwrap();

    let config = EngineConfig {
        known_vendors: KnownVendors::new().with(groceries.id, ["WALMART"]),
        ..EngineConfig::default()
    };
    let mut session = ReviewSession::new(store, &config).unwrap();

    let stats = session.start().unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(session.current().map(|r| r.transaction.id), Some(TransactionId(1)));

    let suggestions = session.decide(TransactionId(1), groceries.id).unwrap();
    let top = suggestions.first().expect("at least one suggestion");
    assert_eq!(top.pattern, "WALMART");
    assert!(!top.is_regex);
    assert!(top.confidence > 0.5);
    assert_eq!(top.matching_transactions, vec![TransactionId(1), TransactionId(2)]);

    let stats = session.stats();
    assert_eq!(stats.reviewed + stats.remaining, stats.total);
    assert_eq!(session.current().map(|r| r.transaction.id), Some(TransactionId(4)));
    assert_eq!(session.current().and_then(|r| r.suggested_category), None);

    let rule = session.accept_suggestion(top).unwrap();
    assert_eq!(rule.category_id, groceries.id);
    assert_eq!(
        session.current().and_then(|r| r.suggested_category),
        Some(groceries.id)
    );

    session.decide(TransactionId(4), groceries.id).unwrap();
    assert_eq!(session.state(), &SessionState::Completed);
    assert_eq!(session.stats().progress, 1.0);

    let store = session.into_store();
    assert!(store.uncategorized().unwrap().is_empty());
    assert_eq!(store.rules().unwrap().len(), 1);
    assert_eq!(store.transactions_in_category(groceries.id).unwrap().len(), 4);
    assert!(store.validate(groceries.id).is_ok());
}

#[test]
fn test_session_over_borrowed_store_with_skip() {
    let mut store = store_with(&["NETFLIX.COM", "HULU", "SPOTIFY USA"]);

    {
        let mut session = ReviewSession::new(&mut store, &EngineConfig::default()).unwrap();
        session.start().unwrap();
        session.skip().unwrap();

        while let Some(review) = session.current() {
            let id = review.transaction.id;
            session.decide(id, CategoryId(4)).unwrap();
        }

        let stats = session.stats();
        assert_eq!((stats.reviewed, stats.remaining, stats.total), (2, 1, 3));
    }

    let left = store.uncategorized().unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].id, TransactionId(1));
}

#[test]
fn test_new_merchant_gets_anchored_literal() {
    let store = store_with(&["NEW MERCHANT XYZ"]);
    let grouper = SimilarityGrouper::new();

    let clusters = grouper.group_uncategorized(&store.all_transactions().unwrap());
    assert_eq!(clusters.len(), 1);
    assert_eq!(clusters[0].count, 1);
    assert_eq!(clusters[0].suggestions[0].pattern, "(?i)^NEW MERCHANT XYZ$");
    assert_eq!(clusters[0].suggestions[0].confidence, 1.0);
}
