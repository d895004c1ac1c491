//! Consent records and history entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::ConsentError;

/// Purpose a user can authorize caching for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConsentCategory {
    CachePersonalData,
    CacheFinancialData,
    CacheLocationData,
    CacheHealthData,
}

impl ConsentCategory {
    pub const ALL: [ConsentCategory; 4] = [
        ConsentCategory::CachePersonalData,
        ConsentCategory::CacheFinancialData,
        ConsentCategory::CacheLocationData,
        ConsentCategory::CacheHealthData,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConsentCategory::CachePersonalData => "cache-personal-data",
            ConsentCategory::CacheFinancialData => "cache-financial-data",
            ConsentCategory::CacheLocationData => "cache-location-data",
            ConsentCategory::CacheHealthData => "cache-health-data",
        }
    }
}

impl fmt::Display for ConsentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsentCategory {
    type Err = ConsentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ConsentCategory::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ConsentError::UnknownCategory(s.to_string()))
    }
}

/// How consent was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConsentMethod {
    #[default]
    Explicit,
    Implied,
    OptOut,
}

/// Current consent state for one user and one category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRecord {
    pub category: ConsentCategory,
    pub granted: bool,
    pub granted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
    pub method: ConsentMethod,
    /// Domains the grant applies to; empty means every domain
    #[serde(default)]
    pub scopes: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revocation_reason: Option<String>,
}

impl ConsentRecord {
    /// Granted, not revoked and not expired at `now`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        if !self.granted || self.revoked_at.is_some() {
            return false;
        }
        match self.expires_at {
            Some(expires) => now < expires,
            None => true,
        }
    }

    /// Whether the grant covers `scope` (case-insensitive).
    pub fn covers(&self, scope: &str) -> bool {
        self.scopes.is_empty() || self.scopes.iter().any(|s| s.eq_ignore_ascii_case(scope))
    }
}

/// State transition recorded in a user's consent history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsentAction {
    Granted,
    Renewed,
    Revoked,
}

/// Audit trail entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentHistoryEntry {
    pub at: DateTime<Utc>,
    pub category: ConsentCategory,
    pub action: ConsentAction,
    pub method: ConsentMethod,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub scopes: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
