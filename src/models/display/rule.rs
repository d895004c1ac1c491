//! Marker rule and domain override display models

use serde::Serialize;
use tabled::Tabled;

use guardcache::classify::DomainOverride;
use guardcache::classify::rules::MarkerRule;

use crate::output::formatters::format_ttl;

/// One row of the marker rule table, in evaluation order
#[derive(Debug, Clone, Tabled, Serialize)]
pub struct RuleDisplay {
    #[tabled(rename = "#")]
    pub order: usize,

    #[tabled(rename = "RULE")]
    pub name: String,

    #[tabled(rename = "FAMILY")]
    pub family: String,

    /// Consent category guarding matches, or "--"
    #[tabled(rename = "CONSENT")]
    pub consent: String,

    #[tabled(skip)]
    pub pattern: String,
}

impl RuleDisplay {
    pub fn new(order: usize, rule: &MarkerRule) -> Self {
        Self {
            order,
            name: rule.name.to_string(),
            family: rule.family.as_str().to_string(),
            consent: rule
                .family
                .consent_category()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "--".to_string()),
            pattern: rule.pattern.as_str().to_string(),
        }
    }
}

/// One domain override
#[derive(Debug, Clone, Tabled, Serialize)]
pub struct OverrideDisplay {
    #[tabled(rename = "DOMAIN")]
    pub domain: String,

    #[tabled(rename = "OPERATION")]
    pub operation: String,

    #[tabled(rename = "POLICY")]
    pub policy: String,
}

impl From<&DomainOverride> for OverrideDisplay {
    fn from(ov: &DomainOverride) -> Self {
        let policy = match (ov.never_cache, ov.max_ttl_secs) {
            (true, _) => "never cache".to_string(),
            (false, Some(max)) => format!("ttl <= {}", format_ttl(max)),
            (false, None) => "--".to_string(),
        };
        Self {
            domain: ov.domain.clone(),
            operation: ov.operation.clone().unwrap_or_else(|| "*".to_string()),
            policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardcache::classify::rules::default_rules;

    #[test]
    fn test_rule_display_credential_has_no_consent() {
        let rules = default_rules();
        let display = RuleDisplay::new(1, &rules[0]);

        assert_eq!(display.name, "credential-field");
        assert_eq!(display.family, "credential");
        assert_eq!(display.consent, "--");
    }

    #[test]
    fn test_override_display() {
        let ov = DomainOverride {
            domain: "weather".to_string(),
            operation: None,
            never_cache: false,
            max_ttl_secs: Some(900),
        };
        let display = OverrideDisplay::from(&ov);

        assert_eq!(display.operation, "*");
        assert_eq!(display.policy, "ttl <= 15m");
    }

    #[test]
    fn test_override_display_never_cache() {
        let ov = DomainOverride {
            domain: "banking".to_string(),
            operation: Some("transfer".to_string()),
            never_cache: true,
            max_ttl_secs: None,
        };
        assert_eq!(OverrideDisplay::from(&ov).policy, "never cache");
    }
}
