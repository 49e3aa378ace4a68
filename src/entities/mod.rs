// Entity Models
// Snapshots of records owned by the external boundaries (transaction source,
// category directory). Identities are opaque to the engine.

pub mod ids;
pub mod transaction;
pub mod category;

pub use ids::{CategoryId, RuleId, TransactionId};
pub use transaction::{NewTransaction, Transaction};
pub use category::{Category, CategoryTree, NewCategory};
