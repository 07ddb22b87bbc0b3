//! Governance audit log entries.
//!
//! One entry per accepted governance mutation. The log is append-only:
//! entries are never reordered or removed.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of governance mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// A node's lifecycle status changed.
    StatusChanged,
    /// A node's ownership was edited.
    OwnershipUpdated,
    /// A node's descriptive metadata was edited.
    MetadataUpdated,
    /// A creation request was submitted.
    RequestSubmitted,
    /// A creation request was approved.
    RequestApproved,
    /// A creation request was rejected.
    RequestRejected,
    /// A review comment was added.
    RequestCommented,
    /// The catalog node set was replaced wholesale.
    CatalogReloaded,
}

impl AuditAction {
    /// Returns the wire name of the action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StatusChanged => "status_changed",
            Self::OwnershipUpdated => "ownership_updated",
            Self::MetadataUpdated => "metadata_updated",
            Self::RequestSubmitted => "request_submitted",
            Self::RequestApproved => "request_approved",
            Self::RequestRejected => "request_rejected",
            Self::RequestCommented => "request_commented",
            Self::CatalogReloaded => "catalog_reloaded",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// When the mutation was accepted.
    pub timestamp: DateTime<Utc>,
    /// Affected path.
    pub path: String,
    /// What happened.
    pub action: AuditAction,
    /// Who did it.
    pub actor: String,
    /// Free-text detail.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub details: String,
    /// Value before the change, when meaningful.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<String>,
    /// Value after the change, when meaningful.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<String>,
}

impl AuditEntry {
    /// Creates an entry stamped with the current time.
    #[must_use]
    pub fn new(path: impl Into<String>, action: AuditAction, actor: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            path: path.into(),
            action,
            actor: actor.into(),
            details: String::new(),
            old_value: None,
            new_value: None,
        }
    }

    /// Sets the free-text detail.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }

    /// Records the before/after values.
    #[must_use]
    pub fn with_change(mut self, old: impl Into<String>, new: impl Into<String>) -> Self {
        self.old_value = Some(old.into());
        self.new_value = Some(new.into());
        self
    }
}
