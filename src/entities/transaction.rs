// 🧾 Transaction Entity - snapshot of a record owned by the transaction source
//
// The engine reads snapshots and proposes category updates; it never owns
// storage and never deletes a transaction.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::ids::{CategoryId, TransactionId};

// ============================================================================
// STORED TRANSACTION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Stable identity assigned by the transaction source
    pub id: TransactionId,

    pub date: NaiveDate,

    /// Free-text description as it appears on the statement
    pub description: String,

    /// Signed amount in account currency
    pub amount: f64,

    /// None = uncategorized
    pub category_id: Option<CategoryId>,

    /// Optional merchant/vendor name supplied by the importer
    #[serde(default)]
    pub vendor: Option<String>,
}

impl Transaction {
    pub fn new(
        id: TransactionId,
        date: NaiveDate,
        description: impl Into<String>,
        amount: f64,
    ) -> Self {
        Transaction {
            id,
            date,
            description: description.into(),
            amount,
            category_id: None,
            vendor: None,
        }
    }

    pub fn with_category(mut self, category_id: CategoryId) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn with_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = Some(vendor.into());
        self
    }

    pub fn is_categorized(&self) -> bool {
        self.category_id.is_some()
    }
}

// ============================================================================
// NEW TRANSACTION (import payload, no identity yet)
// ============================================================================

/// Row shape accepted by the importers (CSV: date,description,amount,vendor)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub date: NaiveDate,
    pub description: String,
    pub amount: f64,
    #[serde(default)]
    pub vendor: Option<String>,
}

impl NewTransaction {
    pub fn new(date: NaiveDate, description: impl Into<String>, amount: f64) -> Self {
        NewTransaction {
            date,
            description: description.into(),
            amount,
            vendor: None,
        }
    }

    /// Hash used to make imports idempotent.
    /// NOTE: this is for de-duplication of imports, not identity.
    pub fn idempotency_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!(
            "{}|{}|{:.4}|{}",
            self.date,
            self.description.trim(),
            self.amount,
            self.vendor.as_deref().unwrap_or("")
        ));
        format!("{:x}", hasher.finalize())
    }

    /// Attach an identity, producing an uncategorized snapshot
    pub fn into_transaction(self, id: TransactionId) -> Transaction {
        Transaction {
            id,
            date: self.date,
            description: self.description,
            amount: self.amount,
            category_id: None,
            vendor: self.vendor,
        }
    }
}
