// ⚙️ Engine Configuration
//
// Lookup order for `EngineConfig::load()`:
//   1. file named by TXN_CATEGORIZER_CONFIG
//   2. ./categorizer.json
//   3. defaults
// TXN_CATEGORIZER_DB then overrides `database_path`.

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::entities::CategoryId;

pub const CONFIG_ENV: &str = "TXN_CATEGORIZER_CONFIG";
pub const DATABASE_ENV: &str = "TXN_CATEGORIZER_DB";
pub const CONFIG_FILENAME: &str = "categorizer.json";

// ============================================================================
// KNOWN VENDORS
// ============================================================================

/// Per-category vendor aliases that get a fixed high-confidence suggestion
/// whenever they show up in a category's transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnownVendors {
    /// category_id → aliases, e.g. 2 → ["UBER EATS", "DOORDASH"]
    pub aliases: BTreeMap<CategoryId, Vec<String>>,

    /// Character processors put between alias words ("UBER*EATS")
    pub join_char: char,
}

impl Default for KnownVendors {
    fn default() -> Self {
        KnownVendors {
            aliases: BTreeMap::new(),
            join_char: '*',
        }
    }
}

impl KnownVendors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: register aliases for a category
    pub fn with<I, S>(mut self, category_id: CategoryId, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases
            .entry(category_id)
            .or_default()
            .extend(aliases.into_iter().map(|a| a.into().to_uppercase()));
        self
    }

    /// Uppercased aliases configured for one category
    pub fn aliases_for(&self, category_id: CategoryId) -> Vec<String> {
        self.aliases
            .get(&category_id)
            .map(|list| list.iter().map(|a| a.to_uppercase()).collect())
            .unwrap_or_default()
    }

    /// Uppercased aliases across every category
    pub fn all_aliases(&self) -> Vec<String> {
        self.aliases
            .values()
            .flatten()
            .map(|a| a.to_uppercase())
            .collect()
    }

    /// "UBER EATS" → "UBER*EATS"
    pub fn joined(&self, alias: &str) -> String {
        alias.replace(' ', &self.join_char.to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.values().all(|list| list.is_empty())
    }
}

// ============================================================================
// ENGINE CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// SQLite database file
    pub database_path: PathBuf,

    /// Similarity above which two descriptions share a cluster
    pub similarity_threshold: f64,

    /// Max transactions gathered around a decision for suggestion mining
    pub neighborhood_limit: usize,

    pub known_vendors: KnownVendors,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            database_path: PathBuf::from("transactions.db"),
            similarity_threshold: 0.8,
            neighborhood_limit: 100,
            known_vendors: KnownVendors::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: EngineConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;

        Ok(config)
    }

    /// Resolve configuration from the environment and working directory
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) => {
                info!("Loading config from {} ({})", path, CONFIG_ENV);
                Self::from_file(&path)?
            }
            Err(_) if Path::new(CONFIG_FILENAME).exists() => {
                info!("Loading config from ./{}", CONFIG_FILENAME);
                Self::from_file(CONFIG_FILENAME)?
            }
            Err(_) => {
                debug!("No config file found, using defaults");
                Self::default()
            }
        };

        if let Ok(db) = std::env::var(DATABASE_ENV) {
            config.database_path = PathBuf::from(db);
        }

        Ok(config)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.database_path, PathBuf::from("transactions.db"));
        assert_eq!(config.similarity_threshold, 0.8);
        assert_eq!(config.neighborhood_limit, 100);
        assert!(config.known_vendors.is_empty());
        assert_eq!(config.known_vendors.join_char, '*');
    }

    #[test]
    fn test_from_file_partial_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "similarity_threshold": 0.75,
                "known_vendors": {{ "aliases": {{ "2": ["Uber Eats", "DOORDASH"] }} }}
            }}"#
        )
        .unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.similarity_threshold, 0.75);
        assert_eq!(config.neighborhood_limit, 100);
        assert_eq!(
            config.known_vendors.aliases_for(CategoryId(2)),
            vec!["UBER EATS", "DOORDASH"]
        );
        assert_eq!(config.known_vendors.join_char, '*');
    }

    #[test]
    fn test_from_file_missing_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(EngineConfig::from_file(dir.path().join("nope.json")).is_err());
    }

    #[test]
    fn test_known_vendor_helpers() {
        let vendors = KnownVendors::new()
            .with(CategoryId(2), ["uber eats"])
            .with(CategoryId(4), ["NETFLIX", "SPOTIFY"]);

        assert_eq!(vendors.joined("UBER EATS"), "UBER*EATS");
        assert_eq!(vendors.all_aliases(), vec!["UBER EATS", "NETFLIX", "SPOTIFY"]);
        assert!(vendors.aliases_for(CategoryId(9)).is_empty());
    }
}
