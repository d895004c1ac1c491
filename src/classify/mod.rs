//! Sensitivity classification for values offered to the cache
//!
//! The classifier is a pure function of a value and its call context: it
//! never looks at stored state, so the same input always yields the same
//! [`Classification`]. Policy lives in data (the marker table in [`rules`]
//! plus [`ClassifierSettings`]), not in branching code.

pub mod rules;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

use crate::cache::CacheTtl;
use crate::consent::ConsentCategory;
use rules::{MarkerFamily, MarkerRule};

/// Sensitivity tier of a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensitivityLevel {
    Public,
    Personal,
    Sensitive,
    Secret,
}

impl fmt::Display for SensitivityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SensitivityLevel::Public => "public",
            SensitivityLevel::Personal => "personal",
            SensitivityLevel::Sensitive => "sensitive",
            SensitivityLevel::Secret => "secret",
        };
        f.write_str(s)
    }
}

/// Call context a value was produced in
#[derive(Debug, Clone, Default)]
pub struct ClassifyContext {
    /// Producing domain, e.g. "banking" or "weather"
    pub domain: String,
    /// Operation that produced the value, e.g. "getAccountBalance"
    pub operation: String,
}

impl ClassifyContext {
    pub fn new(domain: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            operation: operation.into(),
        }
    }
}

/// Caching recommendation for a single value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub level: SensitivityLevel,
    pub cacheable: bool,
    /// Recommended lifetime; 0 means do not cache
    pub ttl_seconds: u64,
    pub requires_encryption: bool,
    pub requires_consent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consent_category: Option<ConsentCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_rule: Option<String>,
    /// Human-readable justification, for logs and statistics only
    pub reason: String,
}

impl Classification {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    fn not_cacheable(mut self, reason: String) -> Self {
        self.cacheable = false;
        self.ttl_seconds = 0;
        self.reason = reason;
        self
    }
}

/// Per-domain policy override.
///
/// `operation` is matched as a case-insensitive substring of the operation
/// name; when absent the override covers the whole domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainOverride {
    pub domain: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,

    /// Data from this domain/operation is never cached
    #[serde(default)]
    pub never_cache: bool,

    /// Upper bound on the recommended TTL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_ttl_secs: Option<u64>,
}

impl DomainOverride {
    fn applies_to(&self, ctx: &ClassifyContext) -> bool {
        if !self.domain.eq_ignore_ascii_case(&ctx.domain) {
            return false;
        }
        match &self.operation {
            Some(op) => ctx
                .operation
                .to_ascii_lowercase()
                .contains(&op.to_ascii_lowercase()),
            None => true,
        }
    }
}

/// Classifier policy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierSettings {
    #[serde(default = "default_public_ttl")]
    pub public_ttl_secs: u64,

    #[serde(default = "default_personal_ttl")]
    pub personal_ttl_secs: u64,

    /// Ceiling for sensitive data; also clamps caller TTL overrides
    #[serde(default = "default_sensitive_ttl")]
    pub sensitive_ttl_secs: u64,

    /// Whether personal-tier data is consent-gated (default: no)
    #[serde(default)]
    pub personal_requires_consent: bool,

    /// Domains whose data is always treated as financial
    #[serde(default = "default_financial_domains")]
    pub financial_domains: Vec<String>,

    #[serde(default = "default_overrides")]
    pub overrides: Vec<DomainOverride>,
}

fn default_public_ttl() -> u64 {
    CacheTtl::PUBLIC.as_secs()
}

fn default_personal_ttl() -> u64 {
    CacheTtl::PERSONAL.as_secs()
}

fn default_sensitive_ttl() -> u64 {
    CacheTtl::SENSITIVE_CEILING.as_secs()
}

fn default_financial_domains() -> Vec<String> {
    ["banking", "finance", "financial", "payments", "trading", "investments"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_overrides() -> Vec<DomainOverride> {
    vec![
        // Login and token exchange responses
        DomainOverride {
            domain: "auth".to_string(),
            operation: None,
            never_cache: true,
            max_ttl_secs: None,
        },
        // Money movement confirmations must always be fetched live
        DomainOverride {
            domain: "banking".to_string(),
            operation: Some("transfer".to_string()),
            never_cache: true,
            max_ttl_secs: None,
        },
        DomainOverride {
            domain: "banking".to_string(),
            operation: Some("payment".to_string()),
            never_cache: true,
            max_ttl_secs: None,
        },
        DomainOverride {
            domain: "weather".to_string(),
            operation: None,
            never_cache: false,
            max_ttl_secs: Some(15 * 60),
        },
    ]
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            public_ttl_secs: default_public_ttl(),
            personal_ttl_secs: default_personal_ttl(),
            sensitive_ttl_secs: default_sensitive_ttl(),
            personal_requires_consent: false,
            financial_domains: default_financial_domains(),
            overrides: default_overrides(),
        }
    }
}

/// Stateless value classifier
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<MarkerRule>,
    settings: ClassifierSettings,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(ClassifierSettings::default())
    }
}

impl Classifier {
    pub fn new(settings: ClassifierSettings) -> Self {
        Self {
            rules: rules::default_rules(),
            settings,
        }
    }

    pub fn settings(&self) -> &ClassifierSettings {
        &self.settings
    }

    pub fn rules(&self) -> &[MarkerRule] {
        &self.rules
    }

    /// TTL ceiling for sensitive data
    pub fn sensitive_ceiling(&self) -> Duration {
        Duration::from_secs(self.settings.sensitive_ttl_secs)
    }

    /// Whether `domain` is configured as a financial domain
    pub fn is_financial_domain(&self, domain: &str) -> bool {
        self.settings
            .financial_domains
            .iter()
            .any(|d| d.eq_ignore_ascii_case(domain))
    }

    /// Classify a value produced in `ctx`.
    pub fn classify(&self, value: &Value, ctx: &ClassifyContext) -> Classification {
        let text = canonical_text(value);
        let marker = rules::first_match(&self.rules, &text);
        let mut result = self.infer(marker, ctx);

        for ov in self.settings.overrides.iter().filter(|o| o.applies_to(ctx)) {
            if ov.never_cache {
                let reason = match &ov.operation {
                    Some(op) => format!(
                        "override: '{}' operations matching '{}' are never cached",
                        ov.domain, op
                    ),
                    None => format!("override: '{}' data is never cached", ov.domain),
                };
                return result.not_cacheable(reason);
            }
            if let Some(max) = ov.max_ttl_secs
                && result.cacheable
                && result.ttl_seconds > max
            {
                result.ttl_seconds = max;
                result.reason = format!("{}; ttl capped at {}s for '{}'", result.reason, max, ov.domain);
            }
        }

        result
    }

    fn infer(&self, marker: Option<&MarkerRule>, ctx: &ClassifyContext) -> Classification {
        let matched_rule = marker.map(|m| m.name.to_string());
        let family = marker.map(|m| m.family);

        if family == Some(MarkerFamily::Credential) {
            return Classification {
                level: SensitivityLevel::Secret,
                cacheable: false,
                ttl_seconds: 0,
                requires_encryption: false,
                requires_consent: false,
                consent_category: None,
                matched_rule,
                reason: "credential marker present; secrets are never cached".to_string(),
            };
        }

        let financial_domain = self.is_financial_domain(&ctx.domain);
        if family == Some(MarkerFamily::Financial) || financial_domain {
            let reason = if financial_domain {
                format!("'{}' is a financial domain", ctx.domain)
            } else {
                "financial marker present".to_string()
            };
            return self.sensitive(ConsentCategory::CacheFinancialData, matched_rule, reason);
        }

        match family {
            Some(MarkerFamily::Health) => self.sensitive(
                ConsentCategory::CacheHealthData,
                matched_rule,
                "health marker present".to_string(),
            ),
            Some(f @ (MarkerFamily::Personal | MarkerFamily::Location)) => Classification {
                level: SensitivityLevel::Personal,
                cacheable: true,
                ttl_seconds: self.settings.personal_ttl_secs,
                requires_encryption: false,
                requires_consent: self.settings.personal_requires_consent,
                consent_category: f.consent_category(),
                matched_rule,
                reason: format!("{} marker present", f.as_str()),
            },
            _ => Classification {
                level: SensitivityLevel::Public,
                cacheable: true,
                ttl_seconds: self.settings.public_ttl_secs,
                requires_encryption: false,
                requires_consent: false,
                consent_category: None,
                matched_rule: None,
                reason: "no policy markers".to_string(),
            },
        }
    }

    fn sensitive(
        &self,
        category: ConsentCategory,
        matched_rule: Option<String>,
        reason: String,
    ) -> Classification {
        Classification {
            level: SensitivityLevel::Sensitive,
            cacheable: true,
            ttl_seconds: self.settings.sensitive_ttl_secs,
            requires_encryption: true,
            requires_consent: true,
            consent_category: Some(category),
            matched_rule,
            reason,
        }
    }
}

/// Canonical text form scanned by the marker rules.
fn canonical_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn classify(value: Value, domain: &str, operation: &str) -> Classification {
        Classifier::default().classify(&value, &ClassifyContext::new(domain, operation))
    }

    #[test]
    fn test_secret_is_never_cacheable() {
        let c = classify(json!({"access_token": "abc", "balance": 3}), "banking", "getToken");
        assert_eq!(c.level, SensitivityLevel::Secret);
        assert!(!c.cacheable);
        assert_eq!(c.ttl_seconds, 0);
        assert_eq!(c.matched_rule.as_deref(), Some("credential-field"));
    }

    #[test]
    fn test_secret_regardless_of_domain() {
        let c = classify(json!({"password": "hunter2"}), "weather", "getForecast");
        assert_eq!(c.level, SensitivityLevel::Secret);
    }

    #[test]
    fn test_financial_marker_is_sensitive() {
        let c = classify(json!({"balance": 1520.75, "currency": "EUR"}), "accounts", "getBalance");
        assert_eq!(c.level, SensitivityLevel::Sensitive);
        assert!(c.cacheable);
        assert!(c.requires_encryption);
        assert!(c.requires_consent);
        assert_eq!(c.consent_category, Some(ConsentCategory::CacheFinancialData));
        assert_eq!(c.ttl_seconds, CacheTtl::SENSITIVE_CEILING.as_secs());
    }

    #[test]
    fn test_financial_domain_without_markers() {
        let c = classify(json!({"branch": "Main St"}), "banking", "getBranch");
        assert_eq!(c.level, SensitivityLevel::Sensitive);
        assert!(c.reason.contains("financial domain"));
    }

    #[test]
    fn test_health_marker_uses_health_category() {
        let c = classify(json!({"diagnosis": "J45"}), "clinic", "getVisit");
        assert_eq!(c.level, SensitivityLevel::Sensitive);
        assert_eq!(c.consent_category, Some(ConsentCategory::CacheHealthData));
    }

    #[test]
    fn test_personal_without_consent_by_default() {
        let c = classify(json!({"email": "ada@example.org"}), "crm", "getContact");
        assert_eq!(c.level, SensitivityLevel::Personal);
        assert!(c.cacheable);
        assert!(!c.requires_encryption);
        assert!(!c.requires_consent);
        assert_eq!(c.ttl_seconds, CacheTtl::PERSONAL.as_secs());
    }

    #[test]
    fn test_personal_consent_policy_flag() {
        let classifier = Classifier::new(ClassifierSettings {
            personal_requires_consent: true,
            ..Default::default()
        });
        let c = classifier.classify(
            &json!({"latitude": 59.9, "longitude": 10.7}),
            &ClassifyContext::new("maps", "whereAmI"),
        );
        assert_eq!(c.level, SensitivityLevel::Personal);
        assert!(c.requires_consent);
        assert_eq!(c.consent_category, Some(ConsentCategory::CacheLocationData));
    }

    #[test]
    fn test_public_default() {
        let c = classify(json!({"items": [1, 2, 3]}), "catalog", "listItems");
        assert_eq!(c.level, SensitivityLevel::Public);
        assert!(c.cacheable);
        assert!(!c.requires_encryption);
        assert_eq!(c.ttl_seconds, CacheTtl::PUBLIC.as_secs());
    }

    #[test]
    fn test_domain_override_never_cache() {
        let c = classify(json!({"status": "ok"}), "auth", "login");
        assert!(!c.cacheable);
        assert_eq!(c.ttl_seconds, 0);
        assert!(c.reason.contains("override"));
    }

    #[test]
    fn test_operation_override_is_substring_match() {
        let c = classify(json!({"id": "tx-1"}), "Banking", "createTransfer");
        assert!(!c.cacheable);

        let c = classify(json!({"id": "acct-1"}), "banking", "getAccount");
        assert!(c.cacheable);
    }

    #[test]
    fn test_max_ttl_override_caps_public_ttl() {
        let c = classify(json!({"city": "Oslo", "temp_c": -3}), "weather", "getForecast");
        assert_eq!(c.level, SensitivityLevel::Public);
        assert_eq!(c.ttl_seconds, 15 * 60);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let value = json!({"email": "a@b.io", "n": 1});
        let ctx = ClassifyContext::new("crm", "get");
        let classifier = Classifier::default();
        assert_eq!(classifier.classify(&value, &ctx), classifier.classify(&value, &ctx));
    }

    #[test]
    fn test_plain_string_values_are_scanned() {
        let c = classify(json!("Authorization: Bearer abcdefghijkl"), "misc", "echo");
        assert_eq!(c.level, SensitivityLevel::Secret);
    }
}
