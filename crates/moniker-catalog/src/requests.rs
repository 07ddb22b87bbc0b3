//! Governance requests for new catalog paths.
//!
//! A request moves `pending_review → approved` or `pending_review → rejected`;
//! both targets are terminal. The [`RequestRegistry`] only stores requests;
//! the transitions and their catalog side effects live in
//! [`crate::workflow::GovernanceWorkflow`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use moniker_core::RequestId;

use crate::error::{CatalogError, Result, poison_err};
use crate::node::SourceType;
use crate::ownership::Ownership;

/// Status of a governance request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Awaiting review.
    PendingReview,
    /// Approved; the node is active.
    Approved,
    /// Rejected; the node is back in draft.
    Rejected,
    /// Activated by an external process after approval.
    Active,
}

impl RequestStatus {
    /// Every status.
    pub const ALL: [Self; 4] = [
        Self::PendingReview,
        Self::Approved,
        Self::Rejected,
        Self::Active,
    ];

    /// Returns the wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PendingReview => "pending_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Active => "active",
        }
    }

    /// Returns true while the request still reserves its path.
    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::PendingReview)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| {
                CatalogError::validation(format!(
                    "unknown request status '{s}' (expected one of: {})",
                    Self::ALL.map(Self::as_str).join(", ")
                ))
            })
    }
}

/// Whether a request creates a new domain or a path under an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DomainLevel {
    /// A bare top-level name with no separators.
    TopLevel,
    /// Anything nested under an existing path.
    SubPath,
}

/// What a review comment did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    /// Plain comment.
    Comment,
    /// Approval.
    Approve,
    /// Rejection.
    Reject,
}

/// A review comment. Comments are kept in the order they were added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewComment {
    /// When the comment was added.
    pub timestamp: DateTime<Utc>,
    /// Who added it.
    pub author: String,
    /// Free text.
    pub content: String,
    /// What the comment did.
    pub action: ReviewAction,
}

/// Input for a new request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitRequest {
    /// Target path.
    pub path: String,
    /// Proposed display name.
    #[serde(default)]
    pub display_name: String,
    /// Proposed description.
    #[serde(default)]
    pub description: String,
    /// Why the path is needed.
    #[serde(default)]
    pub justification: String,
    /// Requester identity.
    pub requester: String,
    /// Proposed ownership.
    #[serde(default)]
    pub ownership: Ownership,
    /// Proposed source type.
    #[serde(default)]
    pub source_type: Option<SourceType>,
    /// Proposed tags.
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

/// A governance request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonikerRequest {
    /// Assigned on submission.
    pub id: RequestId,
    /// Target path.
    pub path: String,
    /// Proposed display name.
    pub display_name: String,
    /// Proposed description.
    pub description: String,
    /// Why the path is needed.
    pub justification: String,
    /// Requester identity.
    pub requester: String,
    /// Proposed ownership.
    pub proposed_ownership: Ownership,
    /// Proposed source type.
    pub source_type: Option<SourceType>,
    /// Proposed tags.
    pub tags: BTreeSet<String>,
    /// Derived from path shape.
    pub domain_level: DomainLevel,
    /// Current status.
    pub status: RequestStatus,
    /// Submission time.
    pub created_at: DateTime<Utc>,
    /// Last transition time.
    pub updated_at: DateTime<Utc>,
    /// Approver, once approved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    /// Rejecter, once rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_by: Option<String>,
    /// Rejection reason, once rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    /// Review comments in the order added.
    #[serde(default)]
    pub comments: Vec<ReviewComment>,
}

impl MonikerRequest {
    /// Creates a pending request from submission input.
    #[must_use]
    pub fn pending(input: SubmitRequest, domain_level: DomainLevel) -> Self {
        let id = RequestId::generate();
        let now = Utc::now();
        Self {
            id,
            path: input.path,
            display_name: input.display_name,
            description: input.description,
            justification: input.justification,
            requester: input.requester,
            proposed_ownership: input.ownership,
            source_type: input.source_type,
            tags: input.tags,
            domain_level,
            status: RequestStatus::PendingReview,
            created_at: now,
            updated_at: now,
            approved_by: None,
            rejected_by: None,
            rejection_reason: None,
            comments: Vec::new(),
        }
    }

    /// Appends a review comment.
    pub fn add_comment(
        &mut self,
        author: impl Into<String>,
        content: impl Into<String>,
        action: ReviewAction,
    ) {
        let now = Utc::now();
        self.comments.push(ReviewComment {
            timestamp: now,
            author: author.into(),
            content: content.into(),
            action,
        });
        self.updated_at = now;
    }
}

/// Requests plus per-status counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestListing {
    /// Matching requests, oldest first.
    pub requests: Vec<MonikerRequest>,
    /// Counts over all requests; every status is present.
    pub counts: BTreeMap<RequestStatus, usize>,
}

/// Thread-safe store of requests, ordered by id (and so by submission time).
#[derive(Debug, Default)]
pub struct RequestRegistry {
    requests: RwLock<BTreeMap<RequestId, MonikerRequest>>,
}

impl RequestRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a request by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn get(&self, id: RequestId) -> Result<Option<MonikerRequest>> {
        Ok(self.requests.read().map_err(poison_err)?.get(&id).cloned())
    }

    /// Returns the pending request for `path`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn pending_for_path(&self, path: &str) -> Result<Option<MonikerRequest>> {
        let requests = self.requests.read().map_err(poison_err)?;
        Ok(requests
            .values()
            .find(|r| r.status.is_pending() && r.path == path)
            .cloned())
    }

    /// Lists requests, optionally filtered by status, with counts by status.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn list(&self, status: Option<RequestStatus>) -> Result<RequestListing> {
        let requests = self.requests.read().map_err(poison_err)?;
        let mut counts: BTreeMap<RequestStatus, usize> =
            RequestStatus::ALL.into_iter().map(|s| (s, 0)).collect();
        for request in requests.values() {
            *counts.entry(request.status).or_default() += 1;
        }
        let mut matching: Vec<MonikerRequest> = requests
            .values()
            .filter(|r| status.is_none_or(|s| r.status == s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(RequestListing {
            requests: matching,
            counts,
        })
    }

    /// Returns the number of stored requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn len(&self) -> Result<usize> {
        Ok(self.requests.read().map_err(poison_err)?.len())
    }

    /// Returns true if no request is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Stores a request, replacing any with the same id.
    pub(crate) fn insert(&self, request: MonikerRequest) -> Result<()> {
        let mut requests = self.requests.write().map_err(poison_err)?;
        requests.insert(request.id, request);
        Ok(())
    }

    pub(crate) fn remove(&self, id: RequestId) -> Result<Option<MonikerRequest>> {
        Ok(self.requests.write().map_err(poison_err)?.remove(&id))
    }
}
