//! Observability infrastructure for the moniker resolver.
//!
//! Structured logging with consistent spans. Library crates only emit
//! `tracing` events; installing a subscriber is the binary's job.

use std::sync::Once;

use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Safe to call multiple times; subsequent calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g., `info`, `moniker_cache=debug`)
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Creates a span for catalog operations.
///
/// ```rust
/// use moniker_core::observability::catalog_span;
///
/// let span = catalog_span("update_status", "risk.cvar");
/// let _guard = span.enter();
/// ```
#[must_use]
pub fn catalog_span(operation: &str, path: &str) -> Span {
    tracing::info_span!("catalog", op = operation, path = path)
}

/// Creates a span for a resolve call.
#[must_use]
pub fn resolve_span(moniker: &str) -> Span {
    tracing::info_span!("resolve", moniker = moniker)
}

/// Creates a span for a cached-query refresh.
#[must_use]
pub fn refresh_span(path: &str) -> Span {
    tracing::info_span!("refresh", path = path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_is_idempotent() {
        init_logging(LogFormat::Pretty);
        init_logging(LogFormat::Json);
    }

    #[test]
    fn span_helpers_enter() {
        let span = catalog_span("register", "risk");
        let _guard = span.enter();
        tracing::info!("inside catalog span");
        let _resolve = resolve_span("risk.cvar").entered();
        let _refresh = refresh_span("risk.cvar").entered();
    }
}
