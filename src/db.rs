// 🗄️ SQLite persistence - transactions, categories, categorization rules
//
// Implements every engine boundary (TransactionSource, RuleStore,
// CategoryDirectory) over one connection. Imports are idempotent: the
// SHA-256 hash of date/description/amount/vendor is UNIQUE.

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, info};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use std::path::Path;

use crate::entities::{
    Category, CategoryId, NewCategory, NewTransaction, RuleId, Transaction, TransactionId,
};
use crate::error::{CategorizerError, Result};
use crate::rules::{NewRule, Rule, RuleUpdate};
use crate::store::{CategoryDirectory, RuleStore, TransactionSource};

const DATE_FORMAT: &str = "%Y-%m-%d";

const TRANSACTION_COLUMNS: &str = "id, date, description, amount, category_id, vendor";

const RULE_COLUMNS: &str = "id, pattern, category_id, priority, is_regex, created_at";

/// Outcome of an import
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub inserted: usize,
    pub duplicates: usize,
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> rusqlite::Result<()> {
    // ==========================================================================
    // Categories (optionally hierarchical)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT UNIQUE NOT NULL,
            parent_id INTEGER,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Categorization rules
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS categorization_rules (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            pattern TEXT NOT NULL,
            category_id INTEGER NOT NULL,
            priority INTEGER NOT NULL DEFAULT 0,
            is_regex INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Transactions
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            idempotency_hash TEXT UNIQUE NOT NULL,
            date TEXT NOT NULL,
            description TEXT NOT NULL,
            amount REAL NOT NULL,
            category_id INTEGER,
            vendor TEXT,
            rule_id INTEGER,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_transactions_category ON transactions(category_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(date)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_rules_priority ON categorization_rules(priority)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// CSV LOADING
// ============================================================================

/// Read `date,description,amount[,vendor]` rows (date as YYYY-MM-DD)
pub fn load_csv(csv_path: &Path) -> anyhow::Result<Vec<NewTransaction>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(csv_path)
        .with_context(|| format!("Failed to open CSV file: {:?}", csv_path))?;

    let mut transactions = Vec::new();

    for (line, result) in rdr.deserialize().enumerate() {
        let transaction: NewTransaction = result
            .with_context(|| format!("Failed to deserialize transaction on row {}", line + 1))?;
        transactions.push(transaction);
    }

    debug!("Loaded {} rows from {:?}", transactions.len(), csv_path);
    Ok(transactions)
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn parse_date(value: &str, column: usize) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e)))
}

fn parse_timestamp(value: &str, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e)))
}

fn row_to_transaction(row: &Row) -> rusqlite::Result<Transaction> {
    let date: String = row.get(1)?;
    Ok(Transaction {
        id: TransactionId(row.get(0)?),
        date: parse_date(&date, 1)?,
        description: row.get(2)?,
        amount: row.get(3)?,
        category_id: row.get::<_, Option<i64>>(4)?.map(CategoryId),
        vendor: row.get(5)?,
    })
}

fn row_to_rule(row: &Row) -> rusqlite::Result<Rule> {
    let created_at: String = row.get(5)?;
    Ok(Rule {
        id: RuleId(row.get(0)?),
        pattern: row.get(1)?,
        category_id: CategoryId(row.get(2)?),
        priority: row.get(3)?,
        is_regex: row.get(4)?,
        created_at: parse_timestamp(&created_at, 5)?,
    })
}

fn row_to_category(row: &Row) -> rusqlite::Result<Category> {
    let created_at: String = row.get(3)?;
    Ok(Category {
        id: CategoryId(row.get(0)?),
        name: row.get(1)?,
        parent_id: row.get::<_, Option<i64>>(2)?.map(CategoryId),
        created_at: Some(parse_timestamp(&created_at, 3)?),
    })
}

/// Escape LIKE wildcards so a keyword matches literally
fn like_pattern(keyword: &str) -> String {
    let mut escaped = String::with_capacity(keyword.len() + 2);
    escaped.push('%');
    for c in keyword.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

// ============================================================================
// SQLITE STORE
// ============================================================================

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) a database file, WAL journal enabled
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!("Opened {:?} (journal_mode={})", path.as_ref(), mode);
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        setup_database(&conn)?;
        Ok(SqliteStore { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Insert new transactions; rows already imported count as duplicates
    pub fn insert_transactions(&self, transactions: &[NewTransaction]) -> Result<ImportSummary> {
        let mut inserted = 0;
        let mut duplicates = 0;

        for tx in transactions {
            let result = self.conn.execute(
                "INSERT INTO transactions (idempotency_hash, date, description, amount, vendor)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    tx.idempotency_hash(),
                    tx.date.format(DATE_FORMAT).to_string(),
                    tx.description,
                    tx.amount,
                    tx.vendor,
                ],
            );

            match result {
                Ok(_) => inserted += 1,
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    duplicates += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        info!("Inserted {} transactions, skipped {} duplicates", inserted, duplicates);
        Ok(ImportSummary { inserted, duplicates })
    }

    pub fn all_transactions(&self) -> Result<Vec<Transaction>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM transactions ORDER BY date DESC, id ASC",
            TRANSACTION_COLUMNS
        ))?;
        let transactions = stmt
            .query_map([], row_to_transaction)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(transactions)
    }

    pub fn transactions_in_category(&self, category_id: CategoryId) -> Result<Vec<Transaction>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM transactions WHERE category_id = ?1 ORDER BY date DESC, id ASC",
            TRANSACTION_COLUMNS
        ))?;
        let transactions = stmt
            .query_map([category_id.value()], row_to_transaction)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(transactions)
    }

    /// Assign a category and remember which rule decided it
    pub fn apply_rule(&mut self, id: TransactionId, rule: &Rule) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE transactions SET category_id = ?1, rule_id = ?2 WHERE id = ?3",
            params![rule.category_id.value(), rule.id.value(), id.value()],
        )?;
        if updated == 0 {
            return Err(CategorizerError::TransactionNotFound(id));
        }
        Ok(())
    }

    pub fn count_transactions(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn add_category(&mut self, category: NewCategory) -> Result<Category> {
        if let Some(parent) = category.parent_id {
            self.validate(parent)?;
        }

        let created_at = Utc::now();
        self.conn.execute(
            "INSERT INTO categories (name, parent_id, created_at) VALUES (?1, ?2, ?3)",
            params![
                category.name,
                category.parent_id.map(|p| p.value()),
                created_at.to_rfc3339()
            ],
        )?;

        Ok(Category {
            id: CategoryId(self.conn.last_insert_rowid()),
            name: category.name,
            parent_id: category.parent_id,
            created_at: Some(created_at),
        })
    }

    fn rule(&self, id: RuleId) -> Result<Option<Rule>> {
        let rule = self
            .conn
            .query_row(
                &format!("SELECT {} FROM categorization_rules WHERE id = ?1", RULE_COLUMNS),
                [id.value()],
                row_to_rule,
            )
            .optional()?;
        Ok(rule)
    }
}

fn insert_rule(conn: &Connection, rule: NewRule) -> rusqlite::Result<Rule> {
    let created_at = Utc::now();
    conn.execute(
        "INSERT INTO categorization_rules (pattern, category_id, priority, is_regex, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            rule.pattern,
            rule.category_id.value(),
            rule.priority,
            rule.is_regex,
            created_at.to_rfc3339()
        ],
    )?;
    Ok(rule.into_rule(RuleId(conn.last_insert_rowid()), created_at))
}

impl TransactionSource for SqliteStore {
    fn uncategorized(&self) -> Result<Vec<Transaction>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM transactions WHERE category_id IS NULL ORDER BY date DESC, id ASC",
            TRANSACTION_COLUMNS
        ))?;
        let transactions = stmt
            .query_map([], row_to_transaction)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(transactions)
    }

    fn find_by_keyword(
        &self,
        keyword: &str,
        exclude: &HashSet<TransactionId>,
        limit: usize,
    ) -> Result<Vec<Transaction>> {
        let excluded: Vec<i64> = exclude.iter().map(|id| id.value()).collect();
        let excluded_json = serde_json::to_string(&excluded).unwrap_or_else(|_| "[]".to_string());

        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM transactions
             WHERE description LIKE ?1 ESCAPE '\\'
               AND id NOT IN (SELECT value FROM json_each(?2))
             ORDER BY date DESC, id ASC
             LIMIT ?3",
            TRANSACTION_COLUMNS
        ))?;
        let transactions = stmt
            .query_map(
                params![like_pattern(keyword), excluded_json, limit as i64],
                row_to_transaction,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(transactions)
    }

    fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>> {
        let tx = self
            .conn
            .query_row(
                &format!("SELECT {} FROM transactions WHERE id = ?1", TRANSACTION_COLUMNS),
                [id.value()],
                row_to_transaction,
            )
            .optional()?;
        Ok(tx)
    }

    fn set_category(&mut self, id: TransactionId, category_id: CategoryId) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE transactions SET category_id = ?1, rule_id = NULL WHERE id = ?2",
            params![category_id.value(), id.value()],
        )?;
        if updated == 0 {
            return Err(CategorizerError::TransactionNotFound(id));
        }
        Ok(())
    }
}

impl RuleStore for SqliteStore {
    fn rules(&self) -> Result<Vec<Rule>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM categorization_rules ORDER BY priority DESC, created_at ASC, id ASC",
            RULE_COLUMNS
        ))?;
        let rules = stmt
            .query_map([], row_to_rule)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rules)
    }

    fn add_rule(&mut self, rule: NewRule) -> Result<Rule> {
        rule.validate()?;
        let rule = insert_rule(&self.conn, rule)?;
        debug!("Added rule {} ('{}' → {})", rule.id, rule.pattern, rule.category_id);
        Ok(rule)
    }

    fn update_rule(&mut self, id: RuleId, update: RuleUpdate) -> Result<Rule> {
        let existing = self.rule(id)?.ok_or(CategorizerError::RuleNotFound(id))?;
        let updated = update.apply(&existing)?;

        self.conn.execute(
            "UPDATE categorization_rules
             SET pattern = ?1, category_id = ?2, priority = ?3, is_regex = ?4
             WHERE id = ?5",
            params![
                updated.pattern,
                updated.category_id.value(),
                updated.priority,
                updated.is_regex,
                id.value()
            ],
        )?;
        Ok(updated)
    }

    fn delete_rule(&mut self, id: RuleId) -> Result<()> {
        let deleted = self
            .conn
            .execute("DELETE FROM categorization_rules WHERE id = ?1", [id.value()])?;
        if deleted == 0 {
            return Err(CategorizerError::RuleNotFound(id));
        }
        self.conn.execute(
            "UPDATE transactions SET rule_id = NULL WHERE rule_id = ?1",
            [id.value()],
        )?;
        Ok(())
    }

    fn import_rules(&mut self, rules: Vec<NewRule>, clear_existing: bool) -> Result<usize> {
        for rule in &rules {
            rule.validate()?;
        }

        let tx = self.conn.transaction()?;
        if clear_existing {
            tx.execute("DELETE FROM categorization_rules", [])?;
        }
        let count = rules.len();
        for rule in rules {
            insert_rule(&tx, rule)?;
        }
        tx.commit()?;

        info!("Imported {} rules (replace existing: {})", count, clear_existing);
        Ok(count)
    }
}

impl CategoryDirectory for SqliteStore {
    fn categories(&self) -> Result<Vec<Category>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, parent_id, created_at FROM categories ORDER BY id")?;
        let categories = stmt
            .query_map([], row_to_category)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(categories)
    }

    fn category(&self, id: CategoryId) -> Result<Option<Category>> {
        let category = self
            .conn
            .query_row(
                "SELECT id, name, parent_id, created_at FROM categories WHERE id = ?1",
                [id.value()],
                row_to_category,
            )
            .optional()?;
        Ok(category)
    }
}

// ============================================================================
// TESTS
// ============================================================================
