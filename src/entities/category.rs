// 🏷️ Category Entity - user-defined, optionally hierarchical labels
//
// Categories are supplied by the category directory. Matching and suggestion
// never consult them; they exist for validation and display.
//
// Hierarchy: parent_id creates a tree ("Food" → "Restaurants" → "Fast Food")

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::ids::CategoryId;

// ============================================================================
// CATEGORY ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,

    /// Display name (e.g., "Restaurants")
    pub name: String,

    /// Parent category; root categories have None
    pub parent_id: Option<CategoryId>,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Category {
    pub fn new(id: CategoryId, name: impl Into<String>, parent_id: Option<CategoryId>) -> Self {
        Category {
            id,
            name: name.into(),
            parent_id,
            created_at: None,
        }
    }

    /// Check if this is a root category (no parent)
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Payload for creating a category through a directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCategory {
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<CategoryId>,
}

impl NewCategory {
    pub fn root(name: impl Into<String>) -> Self {
        NewCategory {
            name: name.into(),
            parent_id: None,
        }
    }

    pub fn child_of(name: impl Into<String>, parent_id: CategoryId) -> Self {
        NewCategory {
            name: name.into(),
            parent_id: Some(parent_id),
        }
    }
}

// ============================================================================
// CATEGORY TREE (read-only view over a directory snapshot)
// ============================================================================

pub struct CategoryTree<'a> {
    categories: &'a [Category],
}

impl<'a> CategoryTree<'a> {
    pub fn new(categories: &'a [Category]) -> Self {
        CategoryTree { categories }
    }

    pub fn find_by_id(&self, id: CategoryId) -> Option<&'a Category> {
        self.categories.iter().find(|c| c.id == id)
    }

    /// Find category by name (case-insensitive)
    pub fn find_by_name(&self, name: &str) -> Option<&'a Category> {
        self.categories
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn root_categories(&self) -> Vec<&'a Category> {
        self.categories.iter().filter(|c| c.is_root()).collect()
    }

    pub fn get_children(&self, parent_id: CategoryId) -> Vec<&'a Category> {
        self.categories
            .iter()
            .filter(|c| c.parent_id == Some(parent_id))
            .collect()
    }

    pub fn get_parent(&self, category: &Category) -> Option<&'a Category> {
        category.parent_id.and_then(|id| self.find_by_id(id))
    }

    /// Names from the root down to `id`, e.g. ["Food", "Restaurants"].
    /// Stops at a dangling parent or a cycle instead of looping.
    pub fn get_path(&self, id: CategoryId) -> Vec<String> {
        let mut path = Vec::new();
        let mut seen = HashSet::new();
        let mut current = self.find_by_id(id);

        while let Some(category) = current {
            if !seen.insert(category.id) {
                break;
            }
            path.insert(0, category.name.clone());
            current = self.get_parent(category);
        }

        path
    }

    pub fn get_path_string(&self, id: CategoryId) -> String {
        self.get_path(id).join(" → ")
    }

    /// Depth in the tree (root = 0)
    pub fn get_depth(&self, id: CategoryId) -> usize {
        self.get_path(id).len().saturating_sub(1)
    }

    pub fn is_ancestor(&self, ancestor_id: CategoryId, descendant_id: CategoryId) -> bool {
        let mut seen = HashSet::new();
        let mut current = self
            .find_by_id(descendant_id)
            .and_then(|c| self.get_parent(c));

        while let Some(category) = current {
            if category.id == ancestor_id {
                return true;
            }
            if !seen.insert(category.id) {
                return false;
            }
            current = self.get_parent(category);
        }

        false
    }
}

// ============================================================================
// TESTS
// ============================================================================
