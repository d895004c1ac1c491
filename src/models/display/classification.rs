//! Classification report for the `classify` command

use colored::Colorize;
use serde::Serialize;

use guardcache::classify::Classification;
use guardcache::error::Result;

use crate::cli::OutputFormat;
use crate::output::formatters::{colored_level, format_ttl, yes_no};
use crate::output::{Formattable, json, table};

/// A classification together with the context it was computed in
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationReport {
    pub domain: String,
    pub operation: String,
    #[serde(flatten)]
    pub classification: Classification,
}

impl ClassificationReport {
    fn fields(&self) -> Vec<(&'static str, String)> {
        let c = &self.classification;
        vec![
            ("domain", self.domain.clone()),
            ("operation", self.operation.clone()),
            ("level", c.level.to_string()),
            ("cacheable", yes_no(c.cacheable).to_string()),
            ("ttl", format_ttl(c.ttl_seconds)),
            ("encryption", yes_no(c.requires_encryption).to_string()),
            ("consent", yes_no(c.requires_consent).to_string()),
            (
                "category",
                c.consent_category
                    .map(|cat| cat.to_string())
                    .unwrap_or_else(|| "--".to_string()),
            ),
            ("rule", c.matched_rule.clone().unwrap_or_else(|| "--".to_string())),
            ("reason", c.reason.clone()),
        ]
    }

    fn pretty(&self) -> String {
        let c = &self.classification;
        let verdict = if c.cacheable {
            format!("cache for {}", format_ttl(c.ttl_seconds)).green()
        } else {
            "do not cache".red()
        };

        let mut out = format!("{} {}\n", colored_level(c.level), verdict);
        out.push_str(&format!("  {}\n", c.reason.dimmed()));
        if c.requires_encryption {
            out.push_str("  encrypted at rest\n");
        }
        if let Some(category) = c.consent_category
            && c.requires_consent
        {
            out.push_str(&format!("  requires consent: {}\n", category));
        }
        if let Some(rule) = &c.matched_rule {
            out.push_str(&format!("  matched rule: {}\n", rule));
        }
        out.trim_end().to_string()
    }
}

impl Formattable for ClassificationReport {
    fn format(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Pretty => Ok(self.pretty()),
            OutputFormat::Table => Ok(table::format_fields(&self.fields())),
            OutputFormat::Json => Ok(json::format_json(self)?),
        }
    }
}
