//! Rules command implementation

use colored::Colorize;

use guardcache::classify::Classifier;
use guardcache::error::Result;

use crate::cli::OutputFormat;
use crate::cli::args::GlobalOptions;
use crate::models::{OverrideDisplay, RuleDisplay};
use crate::output::{json, table};

#[derive(serde::Serialize)]
struct RulesOutput<'a> {
    markers: &'a [RuleDisplay],
    overrides: &'a [OverrideDisplay],
    financial_domains: &'a [String],
}

/// Print marker rules, financial domains and domain overrides
pub fn run(opts: &GlobalOptions) -> Result<()> {
    let config = opts.load_config()?;
    let classifier = Classifier::new(config.classifier);

    let markers: Vec<RuleDisplay> = classifier
        .rules()
        .iter()
        .enumerate()
        .map(|(i, rule)| RuleDisplay::new(i + 1, rule))
        .collect();
    let overrides: Vec<OverrideDisplay> = classifier
        .settings()
        .overrides
        .iter()
        .map(OverrideDisplay::from)
        .collect();
    let financial_domains = &classifier.settings().financial_domains;

    match opts.format {
        OutputFormat::Json => {
            let output = RulesOutput {
                markers: &markers,
                overrides: &overrides,
                financial_domains,
            };
            println!("{}", json::format_json(&output)?);
        }
        OutputFormat::Pretty | OutputFormat::Table => {
            println!("{}", "Marker rules (first match wins)".bold());
            println!("{}\n", table::format_table(&markers));
            println!(
                "{} {}\n",
                "Financial domains:".bold(),
                financial_domains.join(", ")
            );
            println!("{}", "Domain overrides".bold());
            println!("{}", table::format_table(&overrides));
        }
    }

    Ok(())
}
