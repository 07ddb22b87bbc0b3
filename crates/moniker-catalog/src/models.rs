//! Business models: metrics and concepts that appear across monikers.
//!
//! `describe` lists the models whose `appears_in` patterns match the described
//! path. Patterns are exact paths or use `*` as a wildcard.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::{Result, poison_err};

/// Where a model appears.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonikerLink {
    /// Path pattern; `*` matches any run of characters.
    pub moniker_pattern: String,
    /// Column carrying the model's value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_name: Option<String>,
    /// Free-text notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl MonikerLink {
    /// Returns true if the pattern matches `path`.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        wildcard_match(&self.moniker_pattern, path)
    }
}

/// A business model definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessModel {
    /// Model path, e.g. `risk.metrics/dv01`.
    #[serde(default)]
    pub path: String,
    /// Human-readable name.
    #[serde(default)]
    pub display_name: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Calculation formula.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    /// Unit of measure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Value type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    /// Owner of the methodology.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub methodology_owner: Option<String>,
    /// Documentation URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation_url: Option<String>,
    /// Monikers this model appears in.
    #[serde(default)]
    pub appears_in: Vec<MonikerLink>,
    /// Tags.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
}

/// Thread-safe table of business models keyed by path.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: RwLock<BTreeMap<String, BusinessModel>>,
}

impl ModelRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a model.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry lock is poisoned.
    pub fn register(&self, model: BusinessModel) -> Result<()> {
        let mut models = self.models.write().map_err(poison_err)?;
        models.insert(model.path.clone(), model);
        Ok(())
    }

    /// Inserts or replaces many models.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry lock is poisoned.
    pub fn register_all(&self, items: impl IntoIterator<Item = BusinessModel>) -> Result<usize> {
        let mut models = self.models.write().map_err(poison_err)?;
        let mut count = 0;
        for model in items {
            models.insert(model.path.clone(), model);
            count += 1;
        }
        Ok(count)
    }

    /// Looks up a model by path.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry lock is poisoned.
    pub fn get(&self, path: &str) -> Result<Option<BusinessModel>> {
        Ok(self.models.read().map_err(poison_err)?.get(path).cloned())
    }

    /// Returns every model, sorted by path.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry lock is poisoned.
    pub fn list(&self) -> Result<Vec<BusinessModel>> {
        Ok(self.models.read().map_err(poison_err)?.values().cloned().collect())
    }

    /// Returns the models that appear in `path`, sorted by model path.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry lock is poisoned.
    pub fn models_for_moniker(&self, path: &str) -> Result<Vec<BusinessModel>> {
        let models = self.models.read().map_err(poison_err)?;
        Ok(models
            .values()
            .filter(|model| model.appears_in.iter().any(|link| link.matches(path)))
            .cloned()
            .collect())
    }
}

/// Matches `text` against `pattern`, where `*` matches any run of characters.
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let mut parts = pattern.split('*');
    let Some(first) = parts.next() else {
        return text.is_empty();
    };
    let Some(mut rest) = text.strip_prefix(first) else {
        return false;
    };
    let remaining: Vec<&str> = parts.collect();
    let Some((last, middle)) = remaining.split_last() else {
        return rest.is_empty();
    };
    for part in middle {
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    rest.ends_with(last)
}
