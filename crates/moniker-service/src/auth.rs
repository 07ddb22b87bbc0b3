//! Write-token gate for governance operations.
//!
//! Two privileges are configured independently. A legacy single secret fills
//! whichever split secret is unset. A privilege with no secret is disabled.

use std::fmt;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{Result, ServiceError};

/// A write privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Privilege {
    /// Submit requests and add comments.
    Submit,
    /// Approve, reject, and edit catalog nodes.
    Approve,
}

impl Privilege {
    /// Returns the privilege name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::Approve => "approve",
        }
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configured secrets for the write privileges.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct WriteTokens {
    submit: Option<String>,
    approve: Option<String>,
}

impl fmt::Debug for WriteTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |secret: &Option<String>| secret.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("WriteTokens")
            .field("submit", &redact(&self.submit))
            .field("approve", &redact(&self.approve))
            .finish()
    }
}

impl WriteTokens {
    /// Builds the gate from configured secrets. Empty strings count as unset.
    #[must_use]
    pub fn from_secrets(submit: Option<&str>, approve: Option<&str>, legacy: Option<&str>) -> Self {
        let normalize = |secret: Option<&str>| {
            secret
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let legacy = normalize(legacy);
        Self {
            submit: normalize(submit).or_else(|| legacy.clone()),
            approve: normalize(approve).or(legacy),
        }
    }

    /// A gate with every privilege disabled.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Returns true if the privilege has a configured secret.
    #[must_use]
    pub fn is_enabled(&self, privilege: Privilege) -> bool {
        self.secret(privilege).is_some()
    }

    /// Logs a warning for every disabled privilege.
    pub fn warn_if_disabled(&self) {
        for privilege in [Privilege::Submit, Privilege::Approve] {
            if !self.is_enabled(privilege) {
                tracing::warn!(
                    privilege = %privilege,
                    "no write token configured; {privilege} operations are disabled"
                );
            }
        }
    }

    /// Checks a presented bearer token against the privilege's secret.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Unauthorized`] if the privilege is disabled, no
    /// token was presented, or the token does not match.
    pub fn authorize(&self, privilege: Privilege, presented: Option<&str>) -> Result<()> {
        let Some(secret) = self.secret(privilege) else {
            return Err(ServiceError::unauthorized(format!(
                "{privilege} operations are disabled: no write token configured"
            )));
        };
        let Some(presented) = presented.filter(|t| !t.is_empty()) else {
            return Err(ServiceError::unauthorized("write token required"));
        };
        if constant_time_eq(secret, presented) {
            Ok(())
        } else {
            tracing::warn!(privilege = %privilege, "rejected invalid write token");
            Err(ServiceError::unauthorized("invalid write token"))
        }
    }

    fn secret(&self, privilege: Privilege) -> Option<&str> {
        match privilege {
            Privilege::Submit => self.submit.as_deref(),
            Privilege::Approve => self.approve.as_deref(),
        }
    }
}

/// Compares SHA-256 digests so timing reveals neither content nor length.
fn constant_time_eq(expected: &str, presented: &str) -> bool {
    let expected = Sha256::digest(expected.as_bytes());
    let presented = Sha256::digest(presented.as_bytes());
    expected
        .iter()
        .zip(presented.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
