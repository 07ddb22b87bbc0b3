//! Request/approval workflow over the catalog.
//!
//! Every governance write goes through [`GovernanceWorkflow`], which holds a
//! single gate for the duration of each check-then-commit sequence. Readers
//! never take the gate; they only see the registry after a commit.
//!
//! ```text
//! submit ──► pending_review ──approve──► approved   (node → active)
//!                          └──reject───► rejected   (node → draft)
//! ```

use std::sync::{Arc, Mutex};

use chrono::Utc;
use moniker_core::RequestId;
use moniker_core::moniker::validate_path;

use crate::audit::{AuditAction, AuditEntry};
use crate::error::{CatalogError, Result, poison_err};
use crate::metrics;
use crate::node::{CatalogNode, NodeStatus};
use crate::ownership::OwnershipPatch;
use crate::registry::{CatalogRegistry, NodePatch};
use crate::requests::{
    DomainLevel, MonikerRequest, RequestListing, RequestRegistry, RequestStatus, ReviewAction,
    SubmitRequest,
};

/// Serializes governance writes against the catalog and request store.
#[derive(Debug)]
pub struct GovernanceWorkflow {
    catalog: Arc<CatalogRegistry>,
    requests: Arc<RequestRegistry>,
    gate: Mutex<()>,
}

impl GovernanceWorkflow {
    /// Creates a workflow over the given stores.
    #[must_use]
    pub fn new(catalog: Arc<CatalogRegistry>, requests: Arc<RequestRegistry>) -> Self {
        Self {
            catalog,
            requests,
            gate: Mutex::new(()),
        }
    }

    /// Returns the catalog this workflow writes to.
    #[must_use]
    pub fn catalog(&self) -> &Arc<CatalogRegistry> {
        &self.catalog
    }

    /// Returns the request store.
    #[must_use]
    pub fn requests(&self) -> &Arc<RequestRegistry> {
        &self.requests
    }

    /// Submits a request for a new path and reserves the path with a
    /// `pending_review` placeholder node.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::Validation`] if the path does not parse or its
    ///   anchor is not registered.
    /// - [`CatalogError::Conflict`] if the path already exists (other than as
    ///   a draft) or already has a pending request.
    pub fn submit(&self, mut input: SubmitRequest) -> Result<MonikerRequest> {
        let path = clean_path(&input.path)?;
        let domain_level = domain_level(&path);
        input.path.clone_from(&path);

        let _gate = self.gate.lock().map_err(poison_err)?;

        if let Some(anchor) = anchor_path(&path) {
            if !self.catalog.exists(anchor)? {
                metrics::record_rejection("unanchored");
                return Err(CatalogError::validation(format!(
                    "cannot submit '{path}': parent '{anchor}' is not registered"
                )));
            }
        }
        if let Some(pending) = self.requests.pending_for_path(&path)? {
            metrics::record_rejection("duplicate_request");
            return Err(CatalogError::conflict(format!(
                "request {} is already pending for '{path}'",
                pending.id
            )));
        }
        let draft = self.catalog.get(&path)?;
        if let Some(existing) = &draft {
            if existing.status != NodeStatus::Draft {
                metrics::record_rejection("duplicate_path");
                return Err(CatalogError::conflict(format!(
                    "'{path}' already exists with status {}",
                    existing.status
                )));
            }
        }

        let request = MonikerRequest::pending(input, domain_level);
        let placeholder = match draft {
            Some(draft) => merge_into_draft(draft, &request),
            None => placeholder_node(&request, NodeStatus::PendingReview),
        };
        let audit = AuditEntry::new(&path, AuditAction::RequestSubmitted, &request.requester)
            .with_details(format!("request {}", request.id));

        self.requests.insert(request.clone())?;
        if let Err(e) = self.catalog.commit(vec![placeholder], vec![audit]) {
            self.requests.remove(request.id)?;
            return Err(e);
        }

        metrics::record_mutation("submit");
        tracing::info!(
            path = %path,
            request_id = %request.id,
            requester = %request.requester,
            "request submitted"
        );
        Ok(request)
    }

    /// Approves a pending request and activates its node.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::Validation`] if `reason` is blank.
    /// - [`CatalogError::NotFound`] if the request does not exist.
    /// - [`CatalogError::InvalidTransition`] if the request is not pending.
    pub fn approve(&self, id: RequestId, actor: &str, reason: &str) -> Result<MonikerRequest> {
        let reason = require_reason(reason, "approve")?;
        let _gate = self.gate.lock().map_err(poison_err)?;

        let mut request = self.pending_request(id, "approve")?;
        request.status = RequestStatus::Approved;
        request.approved_by = Some(actor.to_string());
        request.add_comment(actor, reason, ReviewAction::Approve);

        let node = match self.catalog.get(&request.path)? {
            Some(mut node) => {
                node.status = NodeStatus::Active;
                node.ownership
                    .apply(&OwnershipPatch::from(&request.proposed_ownership));
                node.updated_at = Some(Utc::now());
                node
            }
            None => placeholder_node(&request, NodeStatus::Active),
        };
        let audit = AuditEntry::new(&request.path, AuditAction::RequestApproved, actor)
            .with_details(format!("request {}: {reason}", request.id))
            .with_change(NodeStatus::PendingReview.as_str(), NodeStatus::Active.as_str());

        self.catalog.commit(vec![node], vec![audit])?;
        self.requests.insert(request.clone())?;

        metrics::record_mutation("approve");
        tracing::info!(path = %request.path, request_id = %id, actor, "request approved");
        Ok(request)
    }

    /// Rejects a pending request and returns its node to draft.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::Validation`] if `reason` is blank.
    /// - [`CatalogError::NotFound`] if the request does not exist.
    /// - [`CatalogError::InvalidTransition`] if the request is not pending.
    pub fn reject(&self, id: RequestId, actor: &str, reason: &str) -> Result<MonikerRequest> {
        let reason = require_reason(reason, "reject")?;
        let _gate = self.gate.lock().map_err(poison_err)?;

        let mut request = self.pending_request(id, "reject")?;
        request.status = RequestStatus::Rejected;
        request.rejected_by = Some(actor.to_string());
        request.rejection_reason = Some(reason.to_string());
        request.add_comment(actor, reason, ReviewAction::Reject);

        let node = match self.catalog.get(&request.path)? {
            Some(mut node) => {
                node.status = NodeStatus::Draft;
                node.updated_at = Some(Utc::now());
                node
            }
            None => placeholder_node(&request, NodeStatus::Draft),
        };
        let audit = AuditEntry::new(&request.path, AuditAction::RequestRejected, actor)
            .with_details(format!("request {}: {reason}", request.id))
            .with_change(NodeStatus::PendingReview.as_str(), NodeStatus::Draft.as_str());

        self.catalog.commit(vec![node], vec![audit])?;
        self.requests.insert(request.clone())?;

        metrics::record_mutation("reject");
        tracing::info!(path = %request.path, request_id = %id, actor, "request rejected");
        Ok(request)
    }

    /// Appends a plain review comment to a request in any state.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::Validation`] if `content` is blank.
    /// - [`CatalogError::NotFound`] if the request does not exist.
    pub fn add_comment(&self, id: RequestId, author: &str, content: &str) -> Result<MonikerRequest> {
        let content = content.trim();
        if content.is_empty() {
            return Err(CatalogError::validation("comment must not be empty"));
        }
        let _gate = self.gate.lock().map_err(poison_err)?;

        let mut request = self.get_request(id)?;
        request.add_comment(author, content, ReviewAction::Comment);
        self.requests.insert(request.clone())?;
        self.catalog.add_audit_entry(
            AuditEntry::new(&request.path, AuditAction::RequestCommented, author)
                .with_details(format!("request {}", request.id)),
        )?;

        metrics::record_mutation("comment");
        Ok(request)
    }

    /// Returns a request by id.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] if the request does not exist.
    pub fn get_request(&self, id: RequestId) -> Result<MonikerRequest> {
        self.requests.get(id)?.ok_or_else(|| CatalogError::NotFound {
            entity: "request",
            name: id.to_string(),
        })
    }

    /// Lists requests, optionally filtered by a status name.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Validation`] for an unknown status.
    pub fn list_requests(&self, status: Option<&str>) -> Result<RequestListing> {
        let status = status
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse::<RequestStatus>)
            .transpose()?;
        self.requests.list(status)
    }

    /// Sets a node's lifecycle status by name.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::Validation`] for an unknown status.
    /// - [`CatalogError::NotFound`] if the path is not registered.
    pub fn update_node_status(&self, path: &str, status: &str, actor: &str) -> Result<CatalogNode> {
        let status: NodeStatus = status.parse()?;
        let _gate = self.gate.lock().map_err(poison_err)?;
        let node = self
            .catalog
            .update_status(path, status, actor)?
            .ok_or_else(|| CatalogError::path_not_found(path))?;
        metrics::record_mutation("update_status");
        Ok(node)
    }

    /// Edits the ownership defined at a path.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] if the path is not registered.
    pub fn update_ownership(
        &self,
        path: &str,
        patch: &OwnershipPatch,
        actor: &str,
    ) -> Result<CatalogNode> {
        let _gate = self.gate.lock().map_err(poison_err)?;
        let node = self
            .catalog
            .update_ownership(path, patch, actor)?
            .ok_or_else(|| CatalogError::path_not_found(path))?;
        metrics::record_mutation("update_ownership");
        Ok(node)
    }

    /// Edits descriptive metadata at a path.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] if the path is not registered.
    pub fn update_metadata(&self, path: &str, patch: &NodePatch, actor: &str) -> Result<CatalogNode> {
        let _gate = self.gate.lock().map_err(poison_err)?;
        let node = self
            .catalog
            .update_metadata(path, patch, actor)?
            .ok_or_else(|| CatalogError::path_not_found(path))?;
        metrics::record_mutation("update_metadata");
        Ok(node)
    }

    fn pending_request(&self, id: RequestId, action: &str) -> Result<MonikerRequest> {
        let request = self.get_request(id)?;
        if !request.status.is_pending() {
            metrics::record_rejection("not_pending");
            return Err(CatalogError::invalid_transition(format!(
                "cannot {action} request {id}: status is {}",
                request.status
            )));
        }
        Ok(request)
    }
}

fn clean_path(raw: &str) -> Result<String> {
    let cleaned = raw.trim().trim_matches('/').trim();
    if cleaned.is_empty() {
        return Err(CatalogError::validation("path must not be empty"));
    }
    validate_path(cleaned).map_err(|e| CatalogError::validation(e.to_string()))
}

fn domain_level(path: &str) -> DomainLevel {
    if path.contains(['.', '/']) {
        DomainLevel::SubPath
    } else {
        DomainLevel::TopLevel
    }
}

/// The registered path a sub-path submission hangs under.
fn anchor_path(path: &str) -> Option<&str> {
    if let Some((first, _)) = path.split_once('/') {
        return Some(first);
    }
    path.rsplit_once('.').map(|(parent, _)| parent)
}

fn require_reason<'a>(reason: &'a str, action: &str) -> Result<&'a str> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(CatalogError::validation(format!(
            "a reason is required to {action} a request"
        )));
    }
    Ok(reason)
}

fn placeholder_node(request: &MonikerRequest, status: NodeStatus) -> CatalogNode {
    let mut node = CatalogNode::new(&request.path)
        .with_display_name(&request.display_name)
        .with_description(&request.description)
        .with_status(status)
        .with_ownership(request.proposed_ownership.clone())
        .with_tags(request.tags.iter().cloned());
    node.created_at = Some(request.created_at);
    stamp_request(&mut node, request);
    node
}

/// Folds a resubmission into the draft left by an earlier rejection. The
/// draft keeps its binding, policies and metadata; proposed fields that
/// were supplied win.
fn merge_into_draft(mut draft: CatalogNode, request: &MonikerRequest) -> CatalogNode {
    draft.status = NodeStatus::PendingReview;
    if !request.display_name.trim().is_empty() {
        draft.display_name.clone_from(&request.display_name);
    }
    if !request.description.trim().is_empty() {
        draft.description.clone_from(&request.description);
    }
    draft
        .ownership
        .apply(&OwnershipPatch::from(&request.proposed_ownership));
    draft.tags.extend(request.tags.iter().cloned());
    stamp_request(&mut draft, request);
    draft
}

fn stamp_request(node: &mut CatalogNode, request: &MonikerRequest) {
    if let Some(source_type) = request.source_type {
        node.metadata.insert(
            "requested_source_type".to_string(),
            serde_json::Value::String(source_type.to_string()),
        );
    }
    node.metadata.insert(
        "request_id".to_string(),
        serde_json::Value::String(request.id.to_string()),
    );
    node.updated_at = Some(request.updated_at);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{SourceBinding, SourceType};
    use crate::ownership::{Ownership, OwnershipRole};

    fn workflow() -> GovernanceWorkflow {
        let catalog = Arc::new(CatalogRegistry::new());
        catalog.register(CatalogNode::new("risk")).unwrap();
        GovernanceWorkflow::new(catalog, Arc::new(RequestRegistry::new()))
    }

    fn submit(path: &str) -> SubmitRequest {
        SubmitRequest {
            path: path.to_string(),
            display_name: "New".to_string(),
            requester: "alice".to_string(),
            ownership: Ownership::new().with(OwnershipRole::AccountableOwner, "alice"),
            ..SubmitRequest::default()
        }
    }

    #[test]
    fn domain_level_follows_path_shape() {
        assert_eq!(domain_level("rates"), DomainLevel::TopLevel);
        assert_eq!(domain_level("risk.cvar"), DomainLevel::SubPath);
        assert_eq!(domain_level("risk/desk"), DomainLevel::SubPath);
    }

    #[test]
    fn anchor_uses_first_slash_segment_or_dot_parent() {
        assert_eq!(anchor_path("rates"), None);
        assert_eq!(anchor_path("risk.cvar.daily"), Some("risk.cvar"));
        assert_eq!(anchor_path("risk.cvar/desk/x"), Some("risk.cvar"));
    }

    #[test]
    fn submit_reserves_path_with_placeholder() {
        let wf = workflow();
        let request = wf.submit(submit(" /risk.cvar/ ")).unwrap();
        assert_eq!(request.path, "risk.cvar");
        assert_eq!(request.status, RequestStatus::PendingReview);
        assert_eq!(request.domain_level, DomainLevel::SubPath);

        let node = wf.catalog().get("risk.cvar").unwrap().unwrap();
        assert_eq!(node.status, NodeStatus::PendingReview);

        let audit = wf.catalog().audit_log(Some("risk.cvar"), None).unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].action, AuditAction::RequestSubmitted);
    }

    #[test]
    fn submit_rejects_unanchored_sub_path() {
        let wf = workflow();
        let err = wf.submit(submit("rates.curves")).unwrap_err();
        assert!(matches!(err, CatalogError::Validation { .. }));
        assert!(!wf.catalog().exists("rates.curves").unwrap());
        assert!(wf.requests().is_empty().unwrap());
    }

    #[test]
    fn submit_rejects_unparseable_path() {
        let wf = workflow();
        let err = wf.submit(submit("risk..cvar")).unwrap_err();
        assert!(matches!(err, CatalogError::Validation { .. }));
    }

    #[test]
    fn duplicate_submission_conflicts() {
        let wf = workflow();
        wf.submit(submit("risk.cvar")).unwrap();
        let err = wf.submit(submit("risk.cvar")).unwrap_err();
        assert!(matches!(err, CatalogError::Conflict { .. }));
        assert_eq!(wf.requests().len().unwrap(), 1);
    }

    #[test]
    fn existing_path_conflicts() {
        let wf = workflow();
        let err = wf.submit(submit("risk")).unwrap_err();
        assert!(matches!(err, CatalogError::Conflict { .. }));
    }

    #[test]
    fn approve_activates_node_and_applies_ownership() {
        let wf = workflow();
        let request = wf.submit(submit("risk.cvar")).unwrap();
        let approved = wf.approve(request.id, "bob", "looks good").unwrap();
        assert_eq!(approved.status, RequestStatus::Approved);
        assert_eq!(approved.approved_by.as_deref(), Some("bob"));
        assert_eq!(approved.comments.len(), 1);
        assert_eq!(approved.comments[0].action, ReviewAction::Approve);

        let node = wf.catalog().get("risk.cvar").unwrap().unwrap();
        assert_eq!(node.status, NodeStatus::Active);
        assert_eq!(
            node.ownership.get(OwnershipRole::AccountableOwner),
            Some("alice")
        );
    }

    #[test]
    fn second_approval_is_rejected_without_changes() {
        let wf = workflow();
        let request = wf.submit(submit("risk.cvar")).unwrap();
        let approved = wf.approve(request.id, "bob", "ok").unwrap();
        let audit_len = wf.catalog().audit_log(None, None).unwrap().len();

        let err = wf.approve(request.id, "bob", "again").unwrap_err();
        assert!(matches!(err, CatalogError::InvalidTransition { .. }));
        assert_eq!(wf.get_request(request.id).unwrap(), approved);
        assert_eq!(wf.catalog().audit_log(None, None).unwrap().len(), audit_len);
    }

    #[test]
    fn reject_returns_node_to_draft_and_allows_resubmission() {
        let wf = workflow();
        let request = wf.submit(submit("risk.cvar")).unwrap();
        let rejected = wf.reject(request.id, "bob", "wrong domain").unwrap();
        assert_eq!(rejected.status, RequestStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("wrong domain"));

        let node = wf.catalog().get("risk.cvar").unwrap().unwrap();
        assert_eq!(node.status, NodeStatus::Draft);

        let again = wf.submit(submit("risk.cvar")).unwrap();
        assert_ne!(again.id, request.id);
    }

    #[test]
    fn resubmission_keeps_the_draft_binding_and_metadata() {
        let wf = workflow();
        let request = wf.submit(submit("risk.cvar")).unwrap();
        wf.reject(request.id, "bob", "add a binding first").unwrap();

        let mut draft = wf.catalog().get("risk.cvar").unwrap().unwrap();
        draft.source_binding = Some(SourceBinding::new(SourceType::Snowflake));
        draft
            .metadata
            .insert("steward_note".to_string(), serde_json::json!("wired up"));
        wf.catalog().register(draft).unwrap();

        let mut again = submit("risk.cvar");
        again.display_name = "CVaR".to_string();
        again.tags.insert("regulatory".to_string());
        let resubmitted = wf.submit(again).unwrap();

        let node = wf.catalog().get("risk.cvar").unwrap().unwrap();
        assert_eq!(node.status, NodeStatus::PendingReview);
        assert_eq!(node.display_name, "CVaR");
        assert!(node.tags.contains("regulatory"));
        assert_eq!(
            node.source_binding.map(|b| b.source_type),
            Some(SourceType::Snowflake)
        );
        assert_eq!(node.metadata["steward_note"], serde_json::json!("wired up"));
        assert_eq!(
            node.metadata["request_id"],
            serde_json::json!(resubmitted.id.to_string())
        );
        assert_eq!(
            node.ownership.get(OwnershipRole::AccountableOwner),
            Some("alice")
        );
    }

    #[test]
    fn blank_reason_is_rejected() {
        let wf = workflow();
        let request = wf.submit(submit("risk.cvar")).unwrap();
        let err = wf.approve(request.id, "bob", "  ").unwrap_err();
        assert!(matches!(err, CatalogError::Validation { .. }));
        assert!(wf.get_request(request.id).unwrap().status.is_pending());
    }

    #[test]
    fn comments_append_in_order() {
        let wf = workflow();
        let request = wf.submit(submit("risk.cvar")).unwrap();
        wf.add_comment(request.id, "carol", "first").unwrap();
        let updated = wf.add_comment(request.id, "dave", "second").unwrap();
        let contents: Vec<_> = updated.comments.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
    }

    #[test]
    fn unknown_request_is_not_found() {
        let wf = workflow();
        let err = wf.approve(RequestId::generate(), "bob", "ok").unwrap_err();
        assert!(matches!(err, CatalogError::NotFound { entity: "request", .. }));
    }

    #[test]
    fn list_requests_validates_status() {
        let wf = workflow();
        wf.submit(submit("risk.cvar")).unwrap();
        let listing = wf.list_requests(Some("pending_review")).unwrap();
        assert_eq!(listing.requests.len(), 1);
        assert!(matches!(
            wf.list_requests(Some("bogus")).unwrap_err(),
            CatalogError::Validation { .. }
        ));
    }

    #[test]
    fn update_node_status_by_name() {
        let wf = workflow();
        let node = wf.update_node_status("risk", "deprecated", "admin").unwrap();
        assert_eq!(node.status, NodeStatus::Deprecated);
        assert!(matches!(
            wf.update_node_status("risk", "gone", "admin").unwrap_err(),
            CatalogError::Validation { .. }
        ));
        assert!(matches!(
            wf.update_node_status("nope", "active", "admin").unwrap_err(),
            CatalogError::NotFound { .. }
        ));
    }
}
