//! Marker rule table used by the classifier
//!
//! Rules are evaluated in table order against the canonical JSON text of a
//! value. The first matching rule wins, so the table is ordered from the most
//! to the least restrictive marker family.

use regex::Regex;
use serde::Serialize;

use crate::consent::ConsentCategory;

/// Family of policy-relevant markers a rule detects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MarkerFamily {
    /// Passwords, API keys, tokens, private keys
    Credential,
    /// Account numbers, balances, transactions, card data
    Financial,
    /// Medical records, diagnoses, prescriptions
    Health,
    /// Contact details and government identifiers
    Personal,
    /// Coordinates and geolocation
    Location,
}

impl MarkerFamily {
    /// Consent category guarding data of this family, if any
    pub fn consent_category(&self) -> Option<ConsentCategory> {
        match self {
            MarkerFamily::Credential => None,
            MarkerFamily::Financial => Some(ConsentCategory::CacheFinancialData),
            MarkerFamily::Health => Some(ConsentCategory::CacheHealthData),
            MarkerFamily::Personal => Some(ConsentCategory::CachePersonalData),
            MarkerFamily::Location => Some(ConsentCategory::CacheLocationData),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MarkerFamily::Credential => "credential",
            MarkerFamily::Financial => "financial",
            MarkerFamily::Health => "health",
            MarkerFamily::Personal => "personal",
            MarkerFamily::Location => "location",
        }
    }
}

/// A compiled marker rule
#[derive(Debug, Clone)]
pub struct MarkerRule {
    pub name: &'static str,
    pub family: MarkerFamily,
    pub pattern: Regex,
}

/// Default marker table: (rule name, family, pattern).
///
/// Field markers match a JSON object key (`"key":`) so that the same word
/// appearing inside a string value does not trigger them. Credential and
/// financial words match anywhere inside a key (`db_password`, `accountBalance`).
pub const DEFAULT_MARKERS: &[(&str, MarkerFamily, &str)] = &[
    (
        "credential-field",
        MarkerFamily::Credential,
        r#"(?i)"[^"]*(password|passwd|passphrase|secret|token|api[_-]?key|private[_-]?key|credential|authorization)[^"]*":"#,
    ),
    (
        "bearer-token",
        MarkerFamily::Credential,
        r"(?i)\bbearer\s+[a-z0-9\-._~+/]{8,}",
    ),
    (
        "private-key-block",
        MarkerFamily::Credential,
        r"-----BEGIN [A-Z ]*PRIVATE KEY-----",
    ),
    (
        "financial-field",
        MarkerFamily::Financial,
        r#"(?i)"[^"]*(balance|transaction|iban|swift[_-]?code|routing|sort[_-]?code|card[_-]?number|cvv|credit[_-]?limit|account[_-]?(number|id|no))[^"]*":"#,
    ),
    (
        "health-field",
        MarkerFamily::Health,
        r#"(?i)"(diagnosis|diagnoses|medications?|prescriptions?|medical[_-]?record|allergies|blood[_-]?type)":"#,
    ),
    (
        "personal-field",
        MarkerFamily::Personal,
        r#"(?i)"(e[_-]?mail|phone|phone[_-]?number|mobile|ssn|social[_-]?security[_-]?number|date[_-]?of[_-]?birth|dob|birth[_-]?date|address|street|postal[_-]?code|zip[_-]?code|first[_-]?name|last[_-]?name|full[_-]?name|passport[_-]?number)":"#,
    ),
    (
        "email-value",
        MarkerFamily::Personal,
        r"(?i)[a-z0-9._%+-]+@[a-z0-9-]+(\.[a-z0-9-]+)*\.[a-z]{2,}",
    ),
    (
        "location-field",
        MarkerFamily::Location,
        r#"(?i)"(lat|latitude|lng|lon|longitude|geolocation|gps|coordinates)":"#,
    ),
];

/// Compile the default marker table.
pub fn default_rules() -> Vec<MarkerRule> {
    DEFAULT_MARKERS
        .iter()
        .filter_map(|(name, family, pattern)| match Regex::new(pattern) {
            Ok(pattern) => Some(MarkerRule {
                name,
                family: *family,
                pattern,
            }),
            Err(e) => {
                log::error!("Skipping marker rule {}: {}", name, e);
                None
            }
        })
        .collect()
}

/// Return the first rule matching `text`, in table order.
pub fn first_match<'a>(rules: &'a [MarkerRule], text: &str) -> Option<&'a MarkerRule> {
    rules.iter().find(|rule| rule.pattern.is_match(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matched(text: &str) -> Option<&'static str> {
        let rules = default_rules();
        first_match(&rules, text).map(|r| r.name)
    }

    #[test]
    fn test_all_default_rules_compile() {
        assert_eq!(default_rules().len(), DEFAULT_MARKERS.len());
    }

    #[test]
    fn test_credential_field_camel_and_snake_case() {
        assert_eq!(matched(r#"{"accessToken":"abc"}"#), Some("credential-field"));
        assert_eq!(matched(r#"{"refresh_token":"abc"}"#), Some("credential-field"));
        assert_eq!(matched(r#"{"API-KEY":"abc"}"#), Some("credential-field"));
    }

    #[test]
    fn test_credential_word_inside_compound_key() {
        for text in [
            r#"{"token":"eyJhbGciOiJIUzI1NiJ9.abc"}"#,
            r#"{"db_password":"hunter2"}"#,
            r#"{"userPassword":"hunter2"}"#,
            r#"{"secretKey":"abc"}"#,
            r#"{"config":{"smtpCredentials":"x"}}"#,
        ] {
            assert_eq!(matched(text), Some("credential-field"), "{}", text);
        }
    }

    #[test]
    fn test_word_inside_value_is_not_a_field_marker() {
        assert_eq!(matched(r#"{"hint":"forgot password?"}"#), None);
    }

    #[test]
    fn test_bearer_token_in_value() {
        assert_eq!(
            matched(r#"{"header":"Bearer eyJhbGciOiJIUzI1NiJ9"}"#),
            Some("bearer-token")
        );
    }

    #[test]
    fn test_credential_wins_over_financial() {
        assert_eq!(
            matched(r#"{"balance":10,"password":"hunter2"}"#),
            Some("credential-field")
        );
    }

    #[test]
    fn test_financial_fields() {
        assert_eq!(matched(r#"{"accountNumber":"123"}"#), Some("financial-field"));
        assert_eq!(matched(r#"{"transactions":[]}"#), Some("financial-field"));
    }

    #[test]
    fn test_financial_word_inside_compound_key() {
        for text in [
            r#"{"accountBalance":1520.75}"#,
            r#"{"balances":[1,2]}"#,
            r#"{"recentTransactions":[]}"#,
            r#"{"payee_iban":"NO93"}"#,
            r#"{"maskedCardNumber":"**** 1234"}"#,
        ] {
            assert_eq!(matched(text), Some("financial-field"), "{}", text);
        }
    }

    #[test]
    fn test_financial_word_in_value_only() {
        assert_eq!(matched(r#"{"note":"check your balance"}"#), None);
    }

    #[test]
    fn test_personal_markers() {
        assert_eq!(matched(r#"{"firstName":"Ada"}"#), Some("personal-field"));
        assert_eq!(
            matched(r#"{"contact":"ada@example.org"}"#),
            Some("email-value")
        );
    }

    #[test]
    fn test_location_marker() {
        assert_eq!(
            matched(r#"{"latitude":51.5,"longitude":-0.12}"#),
            Some("location-field")
        );
    }

    #[test]
    fn test_public_weather_payload() {
        assert_eq!(
            matched(r#"{"city":"Oslo","condition":"snow","temp_c":-3}"#),
            None
        );
    }

    #[test]
    fn test_family_consent_categories() {
        assert_eq!(MarkerFamily::Credential.consent_category(), None);
        assert_eq!(
            MarkerFamily::Financial.consent_category(),
            Some(ConsentCategory::CacheFinancialData)
        );
        assert_eq!(
            MarkerFamily::Location.consent_category(),
            Some(ConsentCategory::CacheLocationData)
        );
    }
}
