//! # moniker-catalog
//!
//! The hierarchical catalog behind moniker resolution.
//!
//! This crate provides:
//!
//! - **Catalog Registry**: Path-keyed nodes with lifecycle status, search, and an append-only audit log
//! - **Ownership Inheritance**: Per-role resolution from a node through its ancestors to its domain
//! - **Domains and Models**: Top-level domain metadata and business-model definitions
//! - **Governance Workflow**: Submission, review, approval and rejection of new paths
//! - **Access Policies**: Query-pattern checks with row-count estimates
//! - **Loader**: YAML/JSON catalog documents merged in configured order
//!
//! ## Example
//!
//! ```rust
//! use moniker_catalog::prelude::*;
//!
//! let catalog = CatalogRegistry::new();
//! catalog
//!     .register(CatalogNode::new("risk").with_ownership(
//!         Ownership::new().with(OwnershipRole::AccountableOwner, "risk-owner@firm.com"),
//!     ))
//!     .unwrap();
//! catalog.register(CatalogNode::new("risk.cvar")).unwrap();
//!
//! let owners = catalog
//!     .resolve_ownership("risk.cvar", &DomainRegistry::new())
//!     .unwrap();
//! assert_eq!(
//!     owners.value(OwnershipRole::AccountableOwner),
//!     Some("risk-owner@firm.com")
//! );
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod access;
pub mod audit;
pub mod domain;
pub mod error;
pub mod loader;
pub mod metrics;
pub mod models;
pub mod node;
pub mod ownership;
pub mod registry;
pub mod requests;
pub mod workflow;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::access::{AccessDecision, AccessPolicy};
    pub use crate::audit::{AuditAction, AuditEntry};
    pub use crate::domain::{Domain, DomainRegistry};
    pub use crate::error::{CatalogError, Result};
    pub use crate::models::{BusinessModel, ModelRegistry};
    pub use crate::node::{CatalogNode, NodeStatus, SourceBinding, SourceType};
    pub use crate::ownership::{
        Ownership, OwnershipPatch, OwnershipRole, OwnershipSource, ResolvedOwnership,
    };
    pub use crate::registry::{CatalogRegistry, NodePatch};
    pub use crate::requests::{MonikerRequest, RequestRegistry, RequestStatus, SubmitRequest};
    pub use crate::workflow::GovernanceWorkflow;
}

pub use access::{AccessDecision, AccessPolicy};
pub use audit::{AuditAction, AuditEntry};
pub use domain::{Domain, DomainRegistry};
pub use error::{CatalogError, Result};
pub use loader::DocumentFormat;
pub use models::{BusinessModel, ModelRegistry, MonikerLink};
pub use node::{CatalogNode, NodeStatus, SourceBinding, SourceType};
pub use ownership::{
    Ownership, OwnershipPatch, OwnershipRole, OwnershipSource, ResolvedField, ResolvedOwnership,
};
pub use registry::{BindingMatch, CatalogRegistry, CatalogStats, CatalogTree, NodePatch};
pub use requests::{
    DomainLevel, MonikerRequest, RequestListing, RequestRegistry, RequestStatus, ReviewAction,
    ReviewComment, SubmitRequest,
};
pub use workflow::GovernanceWorkflow;
