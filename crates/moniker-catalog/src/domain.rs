//! Domain registry.
//!
//! Domains are the top-level namespaces of the catalog. Their metadata is the
//! ownership fallback of last resort.

use std::collections::BTreeMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use moniker_core::path::top_level;

use crate::error::{Result, poison_err};
use crate::ownership::{Ownership, OwnershipRole};

/// Metadata for a top-level domain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    /// Domain name; the first token of every path under it.
    #[serde(default)]
    pub name: String,
    /// Human-readable name.
    #[serde(default)]
    pub display_name: String,
    /// Short code used in reports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_code: Option<String>,
    /// Data category (market data, reference, risk, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_category: Option<String>,
    /// UI colour.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Accountable owner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Technical custodian.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tech_custodian: Option<String>,
    /// Business steward.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_steward: Option<String>,
    /// Confidentiality label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidentiality: Option<String>,
    /// Whether the domain holds personal data.
    #[serde(default)]
    pub pii: bool,
    /// Support channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_channel: Option<String>,
    /// Wiki page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wiki_link: Option<String>,
    /// Free-text notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Domain {
    /// Creates a domain with only a name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            ..Self::default()
        }
    }

    /// Maps domain contacts onto ownership roles.
    #[must_use]
    pub fn ownership_fallback(&self) -> Ownership {
        let mut ownership = Ownership::new();
        let pairs = [
            (OwnershipRole::AccountableOwner, &self.owner),
            (OwnershipRole::DataSpecialist, &self.tech_custodian),
            (OwnershipRole::SupportChannel, &self.help_channel),
        ];
        for (role, value) in pairs {
            if let Some(value) = value {
                ownership.set(role, value.clone());
            }
        }
        ownership
    }
}

/// Thread-safe table of domains keyed by name.
#[derive(Debug, Default)]
pub struct DomainRegistry {
    domains: RwLock<BTreeMap<String, Domain>>,
}

impl DomainRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a domain.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry lock is poisoned.
    pub fn register(&self, domain: Domain) -> Result<()> {
        let mut domains = self.domains.write().map_err(poison_err)?;
        domains.insert(domain.name.clone(), domain);
        Ok(())
    }

    /// Inserts or replaces many domains.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry lock is poisoned.
    pub fn register_all(&self, items: impl IntoIterator<Item = Domain>) -> Result<usize> {
        let mut domains = self.domains.write().map_err(poison_err)?;
        let mut count = 0;
        for domain in items {
            domains.insert(domain.name.clone(), domain);
            count += 1;
        }
        Ok(count)
    }

    /// Looks up a domain by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry lock is poisoned.
    pub fn get(&self, name: &str) -> Result<Option<Domain>> {
        let domains = self.domains.read().map_err(poison_err)?;
        Ok(domains.get(name).cloned())
    }

    /// Returns the domain owning `path` (by its top-level token).
    ///
    /// # Errors
    ///
    /// Returns an error if the registry lock is poisoned.
    pub fn domain_for_path(&self, path: &str) -> Result<Option<Domain>> {
        self.get(top_level(path))
    }

    /// Returns every domain, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry lock is poisoned.
    pub fn list(&self) -> Result<Vec<Domain>> {
        let domains = self.domains.read().map_err(poison_err)?;
        Ok(domains.values().cloned().collect())
    }

    /// Returns the number of domains.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry lock is poisoned.
    pub fn len(&self) -> Result<usize> {
        Ok(self.domains.read().map_err(poison_err)?.len())
    }

    /// Returns true if no domain is registered.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry lock is poisoned.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_for_path_uses_top_level_token() {
        let registry = DomainRegistry::new();
        registry.register(Domain::new("risk")).unwrap();
        registry.register(Domain::new("prices")).unwrap();

        let found = registry.domain_for_path("risk.cvar/desk").unwrap().unwrap();
        assert_eq!(found.name, "risk");
        assert!(registry.domain_for_path("rates/swaps").unwrap().is_none());
        assert_eq!(registry.len().unwrap(), 2);
        let names: Vec<_> = registry.list().unwrap().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["prices", "risk"]);
    }

    #[test]
    fn fallback_maps_contacts_to_roles() {
        let domain = Domain {
            owner: Some("owner@firm.com".to_string()),
            tech_custodian: Some("custodian@firm.com".to_string()),
            business_steward: Some("steward@firm.com".to_string()),
            ..Domain::new("risk")
        };
        let fallback = domain.ownership_fallback();
        assert_eq!(fallback.get(OwnershipRole::AccountableOwner), Some("owner@firm.com"));
        assert_eq!(fallback.get(OwnershipRole::DataSpecialist), Some("custodian@firm.com"));
        assert!(fallback.get(OwnershipRole::SupportChannel).is_none());
    }
}
