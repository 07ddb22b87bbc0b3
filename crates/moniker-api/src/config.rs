//! Server configuration.
//!
//! Read from `MONIKER_*` environment variables. Parsing goes through a lookup
//! function so tests can supply variables without touching the process
//! environment.

use std::path::PathBuf;
use std::time::Duration;

use moniker_cache::{LocalCacheConfig, QueryManagerConfig};
use moniker_core::{Error, Result};
use moniker_service::{ServiceConfig, WriteTokens};

/// Default HTTP port.
pub const DEFAULT_HTTP_PORT: u16 = 8060;

/// Server configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    /// HTTP listen port.
    pub http_port: u16,
    /// Pretty logs and relaxed startup checks.
    pub debug: bool,
    /// Catalog files or directories, merged in order.
    pub catalog_paths: Vec<PathBuf>,
    /// Domain definitions file.
    pub domains_path: Option<PathBuf>,
    /// Business-model definitions file.
    pub models_path: Option<PathBuf>,
    /// Local result cache capacity.
    pub cache_max_entries: usize,
    /// Local result cache TTL in seconds.
    pub cache_ttl_secs: u64,
    /// Cached query refresh tick in seconds.
    pub refresh_tick_secs: u64,
    /// Bound on a single source fetch in seconds.
    pub fetch_timeout_secs: u64,
    /// Secret for the submit privilege.
    pub submit_token: Option<String>,
    /// Secret for the approve privilege.
    pub approve_token: Option<String>,
    /// Legacy secret filling whichever split secret is unset.
    pub write_token: Option<String>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |secret: &Option<String>| secret.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("Config")
            .field("http_port", &self.http_port)
            .field("debug", &self.debug)
            .field("catalog_paths", &self.catalog_paths)
            .field("domains_path", &self.domains_path)
            .field("models_path", &self.models_path)
            .field("cache_max_entries", &self.cache_max_entries)
            .field("cache_ttl_secs", &self.cache_ttl_secs)
            .field("refresh_tick_secs", &self.refresh_tick_secs)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("submit_token", &redact(&self.submit_token))
            .field("approve_token", &redact(&self.approve_token))
            .field("write_token", &redact(&self.write_token))
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let cache = LocalCacheConfig::default();
        let queries = QueryManagerConfig::default();
        Self {
            http_port: DEFAULT_HTTP_PORT,
            debug: false,
            catalog_paths: Vec::new(),
            domains_path: None,
            models_path: None,
            cache_max_entries: cache.max_entries,
            cache_ttl_secs: cache.default_ttl.as_secs(),
            refresh_tick_secs: queries.tick.as_secs(),
            fetch_timeout_secs: queries.fetch_timeout.as_secs(),
            submit_token: None,
            approve_token: None,
            write_token: None,
        }
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] naming the first variable that fails
    /// to parse.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through `lookup`, which returns a variable's raw
    /// value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] naming the first variable that fails
    /// to parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env = Env(lookup);
        let mut config = Self::default();

        if let Some(port) = env.u16("MONIKER_HTTP_PORT")? {
            config.http_port = port;
        }
        if let Some(debug) = env.bool("MONIKER_DEBUG")? {
            config.debug = debug;
        }
        if let Some(paths) = env.string("MONIKER_CATALOG_PATHS") {
            config.catalog_paths = paths
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .collect();
        }
        config.domains_path = env.string("MONIKER_DOMAINS_PATH").map(PathBuf::from);
        config.models_path = env.string("MONIKER_MODELS_PATH").map(PathBuf::from);

        if let Some(max) = env.usize("MONIKER_CACHE_MAX_ENTRIES")? {
            config.cache_max_entries = max;
        }
        if let Some(ttl) = env.u64("MONIKER_CACHE_TTL_SECS")? {
            config.cache_ttl_secs = ttl;
        }
        if let Some(tick) = env.u64("MONIKER_REFRESH_TICK_SECS")? {
            config.refresh_tick_secs = tick;
        }
        if let Some(timeout) = env.u64("MONIKER_FETCH_TIMEOUT_SECS")? {
            config.fetch_timeout_secs = timeout;
        }

        config.submit_token = env.string("MONIKER_SUBMIT_TOKEN");
        config.approve_token = env.string("MONIKER_APPROVE_TOKEN");
        config.write_token = env.string("MONIKER_WRITE_TOKEN");

        if config.refresh_tick_secs == 0 {
            return Err(Error::InvalidInput(
                "MONIKER_REFRESH_TICK_SECS must be greater than 0".to_string(),
            ));
        }
        Ok(config)
    }

    /// Returns the write-token gate derived from the configured secrets.
    #[must_use]
    pub fn write_tokens(&self) -> WriteTokens {
        WriteTokens::from_secrets(
            self.submit_token.as_deref(),
            self.approve_token.as_deref(),
            self.write_token.as_deref(),
        )
    }

    /// Returns the resolution service configuration.
    #[must_use]
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            local_cache: LocalCacheConfig {
                max_entries: self.cache_max_entries,
                default_ttl: Duration::from_secs(self.cache_ttl_secs),
            },
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
            ..ServiceConfig::default()
        }
    }

    /// Returns the cached query manager configuration.
    #[must_use]
    pub fn query_manager_config(&self) -> QueryManagerConfig {
        QueryManagerConfig {
            tick: Duration::from_secs(self.refresh_tick_secs),
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
        }
    }
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.0)(name).and_then(|v| {
            let trimmed = v.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
    }

    fn u16(&self, name: &str) -> Result<Option<u16>> {
        let Some(v) = self.string(name) else {
            return Ok(None);
        };
        v.parse::<u16>()
            .map(Some)
            .map_err(|e| Error::InvalidInput(format!("{name} must be a u16: {e}")))
    }

    fn u64(&self, name: &str) -> Result<Option<u64>> {
        let Some(v) = self.string(name) else {
            return Ok(None);
        };
        v.parse::<u64>()
            .map(Some)
            .map_err(|e| Error::InvalidInput(format!("{name} must be a u64: {e}")))
    }

    fn usize(&self, name: &str) -> Result<Option<usize>> {
        let Some(v) = self.string(name) else {
            return Ok(None);
        };
        v.parse::<usize>()
            .map(Some)
            .map_err(|e| Error::InvalidInput(format!("{name} must be a usize: {e}")))
    }

    fn bool(&self, name: &str) -> Result<Option<bool>> {
        let Some(v) = self.string(name) else {
            return Ok(None);
        };
        match v.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "y" => Ok(Some(true)),
            "false" | "0" | "no" | "n" => Ok(Some(false)),
            _ => Err(Error::InvalidInput(format!(
                "{name} must be a boolean (true/false/1/0)"
            ))),
        }
    }
}
