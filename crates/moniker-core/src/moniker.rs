//! Moniker grammar.
//!
//! A moniker addresses a data asset by a hierarchical name:
//!
//! ```text
//! [moniker://][namespace@]base(.base)*(/segment)*[@version][?key=value(&key=value)*]
//! ```
//!
//! The dot-joined *base* tokens identify the logical asset; the slash-joined
//! *filter segments* narrow the returned data and are opaque to the resolver.
//! The literal `ALL` is never a valid token: callers omit a segment to mean
//! "all values".
//!
//! # Example
//!
//! ```rust
//! use moniker_core::moniker::{Moniker, VersionKind};
//!
//! let m = Moniker::parse("moniker://prices.equity/AAPL@20260115?format=json").unwrap();
//! assert_eq!(m.base(), ["prices", "equity"]);
//! assert_eq!(m.segments(), ["AAPL"]);
//! assert_eq!(m.version_kind(), Some(VersionKind::Date));
//! assert_eq!(m.param("format"), Some("json"));
//! assert_eq!(m.to_string(), "prices.equity/AAPL@20260115?format=json");
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Scheme prefix accepted (and stripped) by the parser.
pub const SCHEME: &str = "moniker://";

/// Reserved literal meaning "all values"; rejected wherever a token is expected.
pub const RESERVED_ALL: &str = "ALL";

/// Maximum length of a single base token or filter segment.
pub const MAX_TOKEN_LEN: usize = 128;

/// Maximum length of a namespace prefix.
pub const MAX_NAMESPACE_LEN: usize = 64;

/// Semantic classification of a `@version` suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionKind {
    /// A calendar date, `YYYYMMDD`.
    Date,
    /// A relative lookback window such as `3M` or `5D`.
    Lookback,
    /// A sampling frequency: `daily`, `weekly` or `monthly`.
    Frequency,
    /// The most recent available version.
    Latest,
    /// The full time series.
    All,
    /// Any other alphanumeric tag.
    Custom,
}

impl VersionKind {
    /// Classifies a version token.
    #[must_use]
    pub fn classify(version: &str) -> Self {
        let lower = version.to_ascii_lowercase();
        if version.len() == 8 && version.bytes().all(|b| b.is_ascii_digit()) {
            return Self::Date;
        }
        if is_lookback(&lower) {
            return Self::Lookback;
        }
        match lower.as_str() {
            "daily" | "weekly" | "monthly" => Self::Frequency,
            "latest" => Self::Latest,
            "all" => Self::All,
            _ => Self::Custom,
        }
    }
}

fn is_lookback(lower: &str) -> bool {
    let Some(unit) = lower.chars().last() else {
        return false;
    };
    let digits = &lower[..lower.len() - unit.len_utf8()];
    matches!(unit, 'y' | 'm' | 'w' | 'd')
        && !digits.is_empty()
        && digits.bytes().all(|b| b.is_ascii_digit())
}

/// A parsed moniker.
///
/// Immutable once parsed. Equality compares every component, so two monikers
/// differing only in version or parameters are distinct resolution keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Moniker {
    namespace: Option<String>,
    base: Vec<String>,
    segments: Vec<String>,
    version: Option<String>,
    params: Vec<(String, String)>,
}

impl Moniker {
    /// Parses a moniker string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the input is empty (after stripping the
    /// optional scheme), uses an unknown scheme, contains an empty token
    /// (leading, trailing or doubled separators), contains a token with
    /// invalid characters, or uses the reserved `ALL` literal as a token.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let body = if let Some(rest) = trimmed.strip_prefix(SCHEME) {
            rest
        } else if trimmed.contains("://") {
            return Err(Error::parse(format!(
                "unsupported scheme in '{trimmed}': expected '{SCHEME}' or none"
            )));
        } else {
            trimmed
        };

        let (body, query) = match body.split_once('?') {
            Some((body, query)) => (body, Some(query)),
            None => (body, None),
        };
        if body.is_empty() {
            return Err(Error::parse("empty moniker"));
        }

        let (body, version) = split_version(body)?;
        let (namespace, path) = split_namespace(body)?;
        let (base, segments) = split_path(path)?;
        let params = query.map(parse_params).transpose()?.unwrap_or_default();

        Ok(Self {
            namespace,
            base,
            segments,
            version,
            params,
        })
    }

    /// Returns the optional namespace prefix.
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Returns the base tokens (never empty).
    #[must_use]
    pub fn base(&self) -> &[String] {
        &self.base
    }

    /// Returns the filter segments, in order.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Returns the top-level domain token.
    #[must_use]
    pub fn domain(&self) -> &str {
        self.base.first().map_or("", String::as_str)
    }

    /// Returns the raw version suffix, if any.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Returns the classified version suffix, if any.
    #[must_use]
    pub fn version_kind(&self) -> Option<VersionKind> {
        self.version.as_deref().map(VersionKind::classify)
    }

    /// Returns the version as a date string when it is a `YYYYMMDD` date.
    #[must_use]
    pub fn version_date(&self) -> Option<&str> {
        match self.version_kind() {
            Some(VersionKind::Date) => self.version(),
            _ => None,
        }
    }

    /// Returns true if the version is absent or `latest`.
    #[must_use]
    pub fn is_latest(&self) -> bool {
        matches!(self.version_kind(), None | Some(VersionKind::Latest))
    }

    /// Returns the query parameters, in order.
    #[must_use]
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// Returns the first value of a query parameter.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the canonical catalog path: base tokens joined by `.`, then
    /// filter segments each prefixed by `/`.
    #[must_use]
    pub fn path(&self) -> String {
        let mut path = self.base.join(".");
        for segment in &self.segments {
            path.push('/');
            path.push_str(segment);
        }
        path
    }

    /// Returns the canonical form with the `moniker://` scheme.
    #[must_use]
    pub fn uri(&self) -> String {
        format!("{SCHEME}{self}")
    }
}

impl fmt::Display for Moniker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(namespace) = &self.namespace {
            write!(f, "{namespace}@")?;
        }
        f.write_str(&self.path())?;
        if let Some(version) = &self.version {
            write!(f, "@{version}")?;
        }
        for (idx, (key, value)) in self.params.iter().enumerate() {
            let sep = if idx == 0 { '?' } else { '&' };
            write!(f, "{sep}{key}={value}")?;
        }
        Ok(())
    }
}

impl FromStr for Moniker {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Moniker {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Moniker {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Validates that `path` is a well-formed catalog path and returns its
/// canonical form.
///
/// # Errors
///
/// Returns [`Error::Parse`] if the path is not a valid moniker path, or if it
/// carries a namespace, version or query string.
pub fn validate_path(path: &str) -> Result<String> {
    let moniker = Moniker::parse(path)?;
    if moniker.namespace.is_some() || moniker.version.is_some() || !moniker.params.is_empty() {
        return Err(Error::parse(format!(
            "'{path}' is not a plain catalog path"
        )));
    }
    Ok(moniker.path())
}

/// A trailing `@token` after the last separator is a version.
fn split_version(body: &str) -> Result<(&str, Option<String>)> {
    let Some(at) = body.rfind('@') else {
        return Ok((body, None));
    };
    if body.rfind(['.', '/']).is_some_and(|sep| sep > at) {
        return Ok((body, None));
    }
    let version = &body[at + 1..];
    validate_version(version)?;
    Ok((&body[..at], Some(version.to_string())))
}

fn validate_version(version: &str) -> Result<()> {
    if version.is_empty() {
        return Err(Error::parse("empty version after '@'"));
    }
    if !version.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(Error::parse(format!(
            "invalid version '{version}': must be alphanumeric"
        )));
    }
    Ok(())
}

fn split_namespace(body: &str) -> Result<(Option<String>, &str)> {
    let Some(at) = body.find('@') else {
        return Ok((None, body));
    };
    let namespace = &body[..at];
    if body[..at].contains(['.', '/']) {
        return Err(Error::parse(format!("unexpected '@' in '{body}'")));
    }
    if !is_valid_namespace(namespace) {
        return Err(Error::parse(format!(
            "invalid namespace '{namespace}': must start with a letter and contain only \
             alphanumerics, '-' or '_'"
        )));
    }
    Ok((Some(namespace.to_string()), &body[at + 1..]))
}

fn is_valid_namespace(namespace: &str) -> bool {
    let mut chars = namespace.chars();
    namespace.len() <= MAX_NAMESPACE_LEN
        && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn split_path(path: &str) -> Result<(Vec<String>, Vec<String>)> {
    if path.is_empty() {
        return Err(Error::parse("empty moniker path"));
    }
    let (head, rest) = match path.split_once('/') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };

    let base = head
        .split('.')
        .map(|token| validate_token(token, false, path))
        .collect::<Result<Vec<_>>>()?;
    let segments = rest
        .map(|rest| {
            rest.split('/')
                .map(|segment| validate_token(segment, true, path))
                .collect::<Result<Vec<_>>>()
        })
        .transpose()?
        .unwrap_or_default();

    Ok((base, segments))
}

fn validate_token(token: &str, allow_dot: bool, path: &str) -> Result<String> {
    if token.is_empty() {
        return Err(Error::parse(format!(
            "empty token in '{path}' (leading, trailing or doubled separator)"
        )));
    }
    if token.eq_ignore_ascii_case(RESERVED_ALL) {
        return Err(Error::parse(format!(
            "'{token}' is reserved in '{path}': omit the segment to select all values"
        )));
    }
    if token.len() > MAX_TOKEN_LEN {
        return Err(Error::parse(format!(
            "token in '{path}' exceeds {MAX_TOKEN_LEN} characters"
        )));
    }
    let mut chars = token.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphanumeric())
        && chars.all(|c| {
            c.is_ascii_alphanumeric() || c == '_' || c == '-' || (allow_dot && c == '.')
        });
    if !valid {
        return Err(Error::parse(format!(
            "invalid token '{token}' in '{path}': must start with an alphanumeric and contain \
             only alphanumerics, '-' or '_'"
        )));
    }
    Ok(token.to_string())
}

fn parse_params(query: &str) -> Result<Vec<(String, String)>> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            if key.is_empty() {
                return Err(Error::parse(format!("empty parameter name in '{query}'")));
            }
            Ok((key.to_string(), value.to_string()))
        })
        .collect()
}
