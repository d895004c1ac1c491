//! Per-user consent ledger
//!
//! Tracks whether a user has authorized caching of personal or sensitive
//! data, per consent category. Records are kept after revocation and every
//! state change is appended to a capped, per-user history.
//!
//! Operations on an unknown user are no-ops returning empty results: no
//! consent is the safe default.

pub mod record;

pub use record::{
    ConsentAction, ConsentCategory, ConsentHistoryEntry, ConsentMethod, ConsentRecord,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::clock::{Clock, SystemClock, add_duration};
use crate::error::{ConsentError, Result};

/// Default consent lifetime (30 days)
const DEFAULT_CONSENT_SECS: u64 = 30 * 24 * 60 * 60;

/// History entries kept per user
const DEFAULT_HISTORY_CAP: usize = 100;

/// Consent ledger settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentSettings {
    /// Lifetime of a grant when none is given; 0 means grants never expire
    #[serde(default = "default_duration_secs")]
    pub default_duration_secs: u64,

    #[serde(default = "default_history_cap")]
    pub max_history_per_user: usize,
}

fn default_duration_secs() -> u64 {
    DEFAULT_CONSENT_SECS
}

fn default_history_cap() -> usize {
    DEFAULT_HISTORY_CAP
}

impl Default for ConsentSettings {
    fn default() -> Self {
        Self {
            default_duration_secs: DEFAULT_CONSENT_SECS,
            max_history_per_user: DEFAULT_HISTORY_CAP,
        }
    }
}

/// Options for [`ConsentLedger::grant`]
#[derive(Debug, Clone, Default)]
pub struct GrantOptions {
    /// Grant lifetime; falls back to the configured default
    pub duration: Option<Duration>,
    pub method: ConsentMethod,
    /// Domains covered; empty covers every domain
    pub scopes: Vec<String>,
}

/// Options for [`ConsentLedger::revoke`]
#[derive(Debug, Clone, Default)]
pub struct RevokeOptions {
    pub reason: Option<String>,
}

/// Filter for [`ConsentLedger::history`]
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub category: Option<ConsentCategory>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl HistoryFilter {
    fn matches(&self, entry: &ConsentHistoryEntry) -> bool {
        self.category.is_none_or(|c| c == entry.category)
            && self.from.is_none_or(|from| entry.at >= from)
            && self.to.is_none_or(|to| entry.at <= to)
    }
}

/// Everything the ledger holds about one user
#[derive(Debug, Clone, Serialize)]
pub struct ConsentExport {
    pub user_id: String,
    pub exported_at: DateTime<Utc>,
    pub records: Vec<ConsentRecord>,
    /// Newest first
    pub history: Vec<ConsentHistoryEntry>,
}

#[derive(Debug, Default)]
struct UserConsent {
    records: HashMap<ConsentCategory, ConsentRecord>,
    /// Oldest at the front
    history: VecDeque<ConsentHistoryEntry>,
}

impl UserConsent {
    fn push_history(&mut self, entry: ConsentHistoryEntry, cap: usize) {
        self.history.push_back(entry);
        while self.history.len() > cap {
            self.history.pop_front();
        }
    }
}

/// Thread-safe consent ledger
pub struct ConsentLedger {
    users: RwLock<HashMap<String, UserConsent>>,
    settings: ConsentSettings,
    clock: Arc<dyn Clock>,
}

impl Default for ConsentLedger {
    fn default() -> Self {
        Self::new(ConsentSettings::default())
    }
}

impl ConsentLedger {
    pub fn new(settings: ConsentSettings) -> Self {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    pub fn with_clock(settings: ConsentSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            settings,
            clock,
        }
    }

    pub fn settings(&self) -> &ConsentSettings {
        &self.settings
    }

    /// Whether `user_id` currently authorizes `category`, optionally for `scope`.
    pub fn has_consent(&self, user_id: &str, category: ConsentCategory, scope: Option<&str>) -> bool {
        let now = self.clock.now();
        let users = self.users.read().unwrap_or_else(|e| e.into_inner());
        users
            .get(user_id)
            .and_then(|u| u.records.get(&category))
            .is_some_and(|r| r.is_active(now) && scope.is_none_or(|s| r.covers(s)))
    }

    /// Grant (or renew) consent for each category.
    pub fn grant(
        &self,
        user_id: &str,
        categories: &[ConsentCategory],
        options: &GrantOptions,
    ) -> Result<Vec<ConsentRecord>> {
        validate_request(user_id, categories)?;

        let now = self.clock.now();
        let duration = options
            .duration
            .unwrap_or(Duration::from_secs(self.settings.default_duration_secs));
        let expires_at = (!duration.is_zero()).then(|| add_duration(now, duration));
        let scopes: BTreeSet<String> = options
            .scopes
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let mut users = self.users.write().unwrap_or_else(|e| e.into_inner());
        let user = users.entry(user_id.to_string()).or_default();
        let mut granted = Vec::with_capacity(categories.len());

        for &category in unique(categories).iter() {
            let renewed = user
                .records
                .get(&category)
                .is_some_and(|r| r.is_active(now));

            let record = ConsentRecord {
                category,
                granted: true,
                granted_at: now,
                expires_at,
                revoked_at: None,
                method: options.method,
                scopes: scopes.clone(),
                revocation_reason: None,
            };
            user.records.insert(category, record.clone());
            user.push_history(
                ConsentHistoryEntry {
                    at: now,
                    category,
                    action: if renewed {
                        ConsentAction::Renewed
                    } else {
                        ConsentAction::Granted
                    },
                    method: options.method,
                    scopes: scopes.clone(),
                    reason: None,
                },
                self.settings.max_history_per_user,
            );
            log::info!(
                "Consent {} for user {}: {}",
                if renewed { "renewed" } else { "granted" },
                user_id,
                category
            );
            granted.push(record);
        }

        Ok(granted)
    }

    /// Revoke consent for each category; returns the categories that were active.
    pub fn revoke(
        &self,
        user_id: &str,
        categories: &[ConsentCategory],
        options: &RevokeOptions,
    ) -> Result<Vec<ConsentCategory>> {
        validate_request(user_id, categories)?;

        let now = self.clock.now();
        let mut users = self.users.write().unwrap_or_else(|e| e.into_inner());
        let Some(user) = users.get_mut(user_id) else {
            return Ok(Vec::new());
        };

        let mut revoked = Vec::new();
        for &category in unique(categories).iter() {
            let Some(record) = user.records.get_mut(&category) else {
                continue;
            };
            if !record.is_active(now) {
                continue;
            }
            record.granted = false;
            record.revoked_at = Some(now);
            record.revocation_reason = options.reason.clone();
            let entry = ConsentHistoryEntry {
                at: now,
                category,
                action: ConsentAction::Revoked,
                method: record.method,
                scopes: record.scopes.clone(),
                reason: options.reason.clone(),
            };
            user.push_history(entry, self.settings.max_history_per_user);
            log::info!("Consent revoked for user {}: {}", user_id, category);
            revoked.push(category);
        }

        Ok(revoked)
    }

    /// History for a user, newest first.
    pub fn history(&self, user_id: &str, filter: &HistoryFilter) -> Vec<ConsentHistoryEntry> {
        let users = self.users.read().unwrap_or_else(|e| e.into_inner());
        users
            .get(user_id)
            .map(|u| {
                u.history
                    .iter()
                    .rev()
                    .filter(|e| filter.matches(e))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Categories currently granted to a user
    pub fn active_categories(&self, user_id: &str) -> Vec<ConsentCategory> {
        let now = self.clock.now();
        let users = self.users.read().unwrap_or_else(|e| e.into_inner());
        let mut active: Vec<_> = users
            .get(user_id)
            .map(|u| {
                u.records
                    .values()
                    .filter(|r| r.is_active(now))
                    .map(|r| r.category)
                    .collect()
            })
            .unwrap_or_default();
        active.sort();
        active
    }

    /// Full dump of a user's records and history.
    pub fn export(&self, user_id: &str) -> ConsentExport {
        let exported_at = self.clock.now();
        let users = self.users.read().unwrap_or_else(|e| e.into_inner());
        let (mut records, history) = users
            .get(user_id)
            .map(|u| {
                (
                    u.records.values().cloned().collect::<Vec<_>>(),
                    u.history.iter().rev().cloned().collect::<Vec<_>>(),
                )
            })
            .unwrap_or_default();
        records.sort_by_key(|r| r.category);

        ConsentExport {
            user_id: user_id.to_string(),
            exported_at,
            records,
            history,
        }
    }

    /// Remove every record and history entry for a user.
    pub fn erase(&self, user_id: &str) -> bool {
        let mut users = self.users.write().unwrap_or_else(|e| e.into_inner());
        let existed = users.remove(user_id).is_some();
        if existed {
            log::info!("Erased consent data for user {}", user_id);
        }
        existed
    }

    /// Number of users with any consent data
    pub fn user_count(&self) -> usize {
        self.users.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

fn validate_request(user_id: &str, categories: &[ConsentCategory]) -> Result<()> {
    if user_id.trim().is_empty() {
        return Err(ConsentError::MissingUserId.into());
    }
    if categories.is_empty() {
        return Err(ConsentError::NoCategories.into());
    }
    Ok(())
}

/// Deduplicate categories while keeping the caller's order.
fn unique(categories: &[ConsentCategory]) -> Vec<ConsentCategory> {
    let mut seen = BTreeSet::new();
    categories.iter().copied().filter(|c| seen.insert(*c)).collect()
}
