//! Invalidation event display model

use serde::Serialize;
use tabled::Tabled;

use guardcache::cache::InvalidationRule;

/// One domain event and the tags it clears
#[derive(Debug, Clone, Tabled, Serialize)]
pub struct EventDisplay {
    #[tabled(rename = "DOMAIN")]
    pub domain: String,

    #[tabled(rename = "EVENT")]
    pub event: String,

    #[tabled(rename = "CLEARS")]
    pub clears: String,
}

impl From<&InvalidationRule> for EventDisplay {
    fn from(rule: &InvalidationRule) -> Self {
        Self {
            domain: rule.domain.clone(),
            event: rule.event.clone(),
            clears: rule.tags.join(", "),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_display_joins_tags() {
        let rule = InvalidationRule {
            domain: "banking".to_string(),
            event: "payment_sent".to_string(),
            tags: vec!["balance".to_string(), "payment".to_string()],
        };
        let display = EventDisplay::from(&rule);

        assert_eq!(display.clears, "balance, payment");
    }
}
