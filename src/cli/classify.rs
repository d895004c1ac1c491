//! Classify command implementation

use log::debug;
use serde_json::Value;
use std::io::Read;
use std::path::Path;

use guardcache::classify::{Classifier, ClassifyContext};
use guardcache::error::Result;

use crate::cli::args::GlobalOptions;
use crate::models::ClassificationReport;
use crate::output::Formattable;

/// Run the classify command against a file or stdin
pub fn run(
    opts: &GlobalOptions,
    domain: &str,
    operation: &str,
    input: Option<&Path>,
) -> Result<()> {
    let config = opts.load_config()?;
    let text = read_input(input)?;
    let value = parse_document(&text);

    debug!(
        "Classifying {} bytes for {}/{}",
        text.len(),
        domain,
        operation
    );

    let classifier = Classifier::new(config.classifier);
    let classification = classifier.classify(&value, &ClassifyContext::new(domain, operation));

    ClassificationReport {
        domain: domain.to_string(),
        operation: operation.to_string(),
        classification,
    }
    .print(opts.format)
}

fn read_input(input: Option<&Path>) -> Result<String> {
    match input {
        Some(path) if path != Path::new("-") => Ok(std::fs::read_to_string(path)?),
        _ => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

/// Parse input as JSON; anything else is classified as a plain string.
fn parse_document(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.trim().to_string()))
}
