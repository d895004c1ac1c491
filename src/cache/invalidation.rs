//! Domain event invalidation table
//!
//! Maps `(domain, event)` to the tags of entries the event makes stale. The
//! tag `all` drops every entry of the domain; any other tag matches entries
//! of the domain whose key or operation contains it (case-insensitive).

use serde::{Deserialize, Serialize};

/// Tag that clears a whole domain
pub const ALL_TAG: &str = "all";

/// One event-to-tags mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationRule {
    pub domain: String,
    pub event: String,
    pub tags: Vec<String>,
}

/// Extra rules appended to the built-in table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvalidationSettings {
    #[serde(default)]
    pub rules: Vec<InvalidationRule>,
}

const DEFAULT_EVENTS: &[(&str, &str, &[&str])] = &[
    // New credentials may change what the user is entitled to see
    ("banking", "token_refreshed", &[ALL_TAG]),
    ("banking", "transaction_created", &["balance", "transaction"]),
    ("banking", "account_updated", &["account", "balance"]),
    ("banking", "payment_sent", &["balance", "transaction", "payment"]),
    ("user", "profile_updated", &["profile", "user"]),
    ("user", "logged_out", &[ALL_TAG]),
    ("weather", "forecast_updated", &["forecast"]),
];

/// Lookup table for domain events
#[derive(Debug, Clone)]
pub struct InvalidationTable {
    rules: Vec<InvalidationRule>,
}

impl Default for InvalidationTable {
    fn default() -> Self {
        let rules = DEFAULT_EVENTS
            .iter()
            .map(|(domain, event, tags)| InvalidationRule {
                domain: domain.to_string(),
                event: event.to_string(),
                tags: tags.iter().map(|t| t.to_string()).collect(),
            })
            .collect();
        Self { rules }
    }
}

impl InvalidationTable {
    /// Built-in table plus `extra` rules
    pub fn with_rules(extra: &[InvalidationRule]) -> Self {
        let mut table = Self::default();
        table.rules.extend(extra.iter().cloned());
        table
    }

    pub fn rules(&self) -> &[InvalidationRule] {
        &self.rules
    }

    /// Tags cleared by `event` in `domain`, merged across matching rules.
    /// `None` when the event is unknown for the domain.
    pub fn tags_for(&self, domain: &str, event: &str) -> Option<Vec<String>> {
        let mut tags: Vec<String> = Vec::new();
        let mut found = false;
        for rule in self
            .rules
            .iter()
            .filter(|r| r.domain.eq_ignore_ascii_case(domain) && r.event.eq_ignore_ascii_case(event))
        {
            found = true;
            for tag in &rule.tags {
                let tag = tag.to_ascii_lowercase();
                if !tags.contains(&tag) {
                    tags.push(tag);
                }
            }
        }
        found.then_some(tags)
    }
}

/// Whether an entry with this key and operation carries one of `tags`.
pub fn matches_tags(key: &str, operation: &str, tags: &[String]) -> bool {
    let key = key.to_ascii_lowercase();
    let operation = operation.to_ascii_lowercase();
    tags.iter()
        .any(|tag| tag == ALL_TAG || key.contains(tag.as_str()) || operation.contains(tag.as_str()))
}
