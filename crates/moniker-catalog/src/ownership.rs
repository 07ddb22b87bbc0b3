//! Ownership roles and inheritance.
//!
//! Ownership is an open record over a fixed set of named roles. Every role is
//! independently optional and independently inherited: a node that defines
//! only `support_channel` still inherits `accountable_owner` from its nearest
//! ancestor that defines it, and finally from its domain.
//!
//! Resolution never iterates named fields; it walks [`OwnershipRole::ALL`],
//! so adding a role needs no change to the algorithm.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::Domain;
use crate::error::CatalogError;

/// A recognized governance role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnershipRole {
    /// Business owner accountable for the data.
    AccountableOwner,
    /// Technical owner / data specialist.
    DataSpecialist,
    /// Where consumers ask for help.
    SupportChannel,
    /// Accountable data owner principal.
    Adop,
    /// Accountable data steward.
    Ads,
    /// Accountable data access lead.
    Adal,
    /// Display name of the ADOP.
    AdopName,
    /// Display name of the ADS.
    AdsName,
    /// Display name of the ADAL.
    AdalName,
    /// Link to the owning UI or dashboard.
    Ui,
}

impl OwnershipRole {
    /// Every recognized role, in resolution order.
    pub const ALL: [Self; 10] = [
        Self::AccountableOwner,
        Self::DataSpecialist,
        Self::SupportChannel,
        Self::Adop,
        Self::Ads,
        Self::Adal,
        Self::AdopName,
        Self::AdsName,
        Self::AdalName,
        Self::Ui,
    ];

    /// Returns the wire name of the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AccountableOwner => "accountable_owner",
            Self::DataSpecialist => "data_specialist",
            Self::SupportChannel => "support_channel",
            Self::Adop => "adop",
            Self::Ads => "ads",
            Self::Adal => "adal",
            Self::AdopName => "adop_name",
            Self::AdsName => "ads_name",
            Self::AdalName => "adal_name",
            Self::Ui => "ui",
        }
    }
}

impl fmt::Display for OwnershipRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OwnershipRole {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| CatalogError::validation(format!("unknown ownership role '{s}'")))
    }
}

/// Ownership roles defined directly on a node.
///
/// Deserializes from a map of role name to value; `null` or empty values
/// leave the role undefined.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, Option<String>>",
    into = "BTreeMap<OwnershipRole, String>"
)]
pub struct Ownership(BTreeMap<OwnershipRole, String>);

impl Ownership {
    /// Creates an empty ownership record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a role, returning the updated record.
    #[must_use]
    pub fn with(mut self, role: OwnershipRole, value: impl Into<String>) -> Self {
        self.set(role, value);
        self
    }

    /// Sets a role; an empty value clears it.
    pub fn set(&mut self, role: OwnershipRole, value: impl Into<String>) {
        let value = value.into();
        if value.trim().is_empty() {
            self.0.remove(&role);
        } else {
            self.0.insert(role, value);
        }
    }

    /// Returns the value of a role defined here.
    #[must_use]
    pub fn get(&self, role: OwnershipRole) -> Option<&str> {
        self.0.get(&role).map(String::as_str)
    }

    /// Returns true if no role is defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates defined roles in role order.
    pub fn iter(&self) -> impl Iterator<Item = (OwnershipRole, &str)> {
        self.0.iter().map(|(role, value)| (*role, value.as_str()))
    }

    /// Returns the roles defined here.
    #[must_use]
    pub fn defined_roles(&self) -> Vec<OwnershipRole> {
        self.0.keys().copied().collect()
    }

    /// Applies an edit: roles present in `patch` overwrite, empty values clear.
    pub fn apply(&mut self, patch: &OwnershipPatch) {
        for (role, value) in &patch.0 {
            self.set(*role, value.clone());
        }
    }
}

impl TryFrom<BTreeMap<String, Option<String>>> for Ownership {
    type Error = CatalogError;

    fn try_from(raw: BTreeMap<String, Option<String>>) -> Result<Self, Self::Error> {
        let mut ownership = Self::new();
        for (key, value) in raw {
            let role: OwnershipRole = key.parse()?;
            if let Some(value) = value {
                ownership.set(role, value);
            }
        }
        Ok(ownership)
    }
}

impl From<Ownership> for BTreeMap<OwnershipRole, String> {
    fn from(value: Ownership) -> Self {
        value.0
    }
}

/// An ownership edit. Unlike [`Ownership`], it keeps empty values so that a
/// patch can clear a role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnershipPatch(pub BTreeMap<OwnershipRole, String>);

impl OwnershipPatch {
    /// Sets a role in the patch (an empty value clears the role when applied).
    #[must_use]
    pub fn with(mut self, role: OwnershipRole, value: impl Into<String>) -> Self {
        self.0.insert(role, value.into());
        self
    }
}

impl From<&Ownership> for OwnershipPatch {
    fn from(value: &Ownership) -> Self {
        Self(value.0.clone())
    }
}

/// Where an effective ownership value was defined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "at", rename_all = "snake_case")]
pub enum OwnershipSource {
    /// Defined on the catalog node at this path.
    Node(String),
    /// Supplied by the named domain as the last resort.
    Domain(String),
}

/// An effective value with its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedField {
    /// Effective value.
    pub value: String,
    /// Where the value was defined.
    pub source: OwnershipSource,
}

/// Effective ownership of a path, computed on demand.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolvedOwnership(BTreeMap<OwnershipRole, ResolvedField>);

impl ResolvedOwnership {
    /// Resolves ownership from a nearest-first chain of `(path, ownership)`
    /// pairs, falling back to `domain` for roles no node defines.
    pub fn resolve<'a, I>(chain: I, domain: Option<&Domain>) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a Ownership)>,
    {
        let mut fields = BTreeMap::new();
        for (path, ownership) in chain {
            for role in OwnershipRole::ALL {
                if fields.contains_key(&role) {
                    continue;
                }
                if let Some(value) = ownership.get(role) {
                    fields.insert(
                        role,
                        ResolvedField {
                            value: value.to_string(),
                            source: OwnershipSource::Node(path.to_string()),
                        },
                    );
                }
            }
        }

        if let Some(domain) = domain {
            for (role, value) in domain.ownership_fallback().iter() {
                fields.entry(role).or_insert_with(|| ResolvedField {
                    value: value.to_string(),
                    source: OwnershipSource::Domain(domain.name.clone()),
                });
            }
        }

        Self(fields)
    }

    /// Returns the resolved field for a role.
    #[must_use]
    pub fn get(&self, role: OwnershipRole) -> Option<&ResolvedField> {
        self.0.get(&role)
    }

    /// Returns the effective value of a role.
    #[must_use]
    pub fn value(&self, role: OwnershipRole) -> Option<&str> {
        self.0.get(&role).map(|field| field.value.as_str())
    }

    /// Returns where a role's value was defined.
    #[must_use]
    pub fn source(&self, role: OwnershipRole) -> Option<&OwnershipSource> {
        self.0.get(&role).map(|field| &field.source)
    }

    /// Iterates resolved roles in role order.
    pub fn iter(&self) -> impl Iterator<Item = (OwnershipRole, &ResolvedField)> {
        self.0.iter().map(|(role, field)| (*role, field))
    }

    /// Returns true if no role resolved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the effective values without provenance.
    #[must_use]
    pub fn to_ownership(&self) -> Ownership {
        let mut ownership = Ownership::new();
        for (role, field) in &self.0 {
            ownership.set(*role, field.value.clone());
        }
        ownership
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain() -> Domain {
        Domain {
            owner: Some("head-of-risk@firm.com".to_string()),
            help_channel: Some("#risk-help".to_string()),
            ..Domain::new("risk")
        }
    }

    #[test]
    fn child_wins_per_role() {
        let leaf = Ownership::new().with(OwnershipRole::SupportChannel, "#cvar");
        let parent = Ownership::new()
            .with(OwnershipRole::AccountableOwner, "alice")
            .with(OwnershipRole::SupportChannel, "#risk");
        let resolved =
            ResolvedOwnership::resolve([("risk.cvar", &leaf), ("risk", &parent)], None);

        assert_eq!(resolved.value(OwnershipRole::SupportChannel), Some("#cvar"));
        assert_eq!(
            resolved.source(OwnershipRole::SupportChannel),
            Some(&OwnershipSource::Node("risk.cvar".to_string()))
        );
        assert_eq!(resolved.value(OwnershipRole::AccountableOwner), Some("alice"));
        assert_eq!(
            resolved.source(OwnershipRole::AccountableOwner),
            Some(&OwnershipSource::Node("risk".to_string()))
        );
        assert!(resolved.get(OwnershipRole::DataSpecialist).is_none());
    }

    #[test]
    fn domain_is_last_resort() {
        let leaf = Ownership::new().with(OwnershipRole::AccountableOwner, "bob");
        let resolved = ResolvedOwnership::resolve([("risk.cvar", &leaf)], Some(&domain()));

        assert_eq!(resolved.value(OwnershipRole::AccountableOwner), Some("bob"));
        assert_eq!(resolved.value(OwnershipRole::SupportChannel), Some("#risk-help"));
        assert_eq!(
            resolved.source(OwnershipRole::SupportChannel),
            Some(&OwnershipSource::Domain("risk".to_string()))
        );
        assert!(resolved.value(OwnershipRole::Adop).is_none());
    }

    #[test]
    fn unresolved_role_has_no_provenance() {
        let resolved = ResolvedOwnership::resolve(std::iter::empty(), None);
        assert!(resolved.is_empty());
        assert!(resolved.source(OwnershipRole::Ui).is_none());
    }

    #[test]
    fn deserializes_nulls_and_rejects_unknown_roles() {
        let ownership: Ownership =
            serde_yaml::from_str("accountable_owner: alice\nads: null\nui: ''\n").unwrap();
        assert_eq!(ownership.defined_roles(), vec![OwnershipRole::AccountableOwner]);

        let err = serde_yaml::from_str::<Ownership>("chief_wizard: merlin\n").unwrap_err();
        assert!(err.to_string().contains("unknown ownership role"));
    }

    #[test]
    fn patch_overwrites_and_clears() {
        let mut ownership = Ownership::new()
            .with(OwnershipRole::AccountableOwner, "alice")
            .with(OwnershipRole::Ui, "https://ui");
        let patch = OwnershipPatch::default()
            .with(OwnershipRole::AccountableOwner, "carol")
            .with(OwnershipRole::Ui, "");
        ownership.apply(&patch);
        assert_eq!(ownership.get(OwnershipRole::AccountableOwner), Some("carol"));
        assert!(ownership.get(OwnershipRole::Ui).is_none());
    }

    #[test]
    fn resolved_serializes_with_provenance() {
        let leaf = Ownership::new().with(OwnershipRole::Ads, "dan");
        let resolved = ResolvedOwnership::resolve([("prices", &leaf)], None);
        let json = serde_json::to_value(&resolved).unwrap();
        assert_eq!(json["ads"]["value"], "dan");
        assert_eq!(json["ads"]["source"]["kind"], "node");
        assert_eq!(json["ads"]["source"]["at"], "prices");
    }
}
