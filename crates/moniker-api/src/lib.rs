//! # moniker-api
//!
//! HTTP mirror of the moniker resolution service.
//!
//! This crate is a thin composition layer; resolution, governance and
//! caching live in `moniker-service` and below. It provides:
//!
//! - **Configuration**: `MONIKER_*` environment variables
//! - **Routing**: One route per service operation
//! - **Caller Context**: Identity headers and bearer write tokens
//! - **Observability**: Prometheus metrics and request ids
//!
//! ## Endpoints
//!
//! ```text
//! GET  /health                      - Health check
//! GET  /metrics                     - Prometheus metrics
//! GET  /resolve/{*moniker}          - Resolve to a source binding
//! GET  /fetch/{*moniker}            - Resolve and return data
//! GET  /describe/{*path}            - Node metadata and ownership
//! GET  /list/{*path}                - Direct children
//! GET  /lineage/{*path}             - Ownership provenance
//! GET  /catalog/{search,stats,tree,audit,cache}
//! PUT  /catalog/{status,ownership,metadata}
//! POST /requests                    - Submit a governance request
//! GET  /requests, /requests/{id}
//! POST /requests/{id}/{approve,reject,comments}
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use moniker_api::prelude::*;
//!
//! let config = Config::from_env()?;
//! let service = Arc::new(build_service(&config)?);
//! Server::new(config, service).serve(std::future::pending()).await?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bootstrap;
pub mod config;
pub mod context;
pub mod error;
pub mod metrics;
pub mod routes;
pub mod server;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::bootstrap::build_service;
    pub use crate::config::Config;
    pub use crate::context::RequestContext;
    pub use crate::error::{ApiError, ApiResult};
    pub use crate::server::{AppState, Server, router};
}
