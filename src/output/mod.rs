//! Output formatting for CLI results

use serde::Serialize;
use tabled::Tabled;

use crate::cli::OutputFormat;
use guardcache::error::Result;

pub mod formatters;
pub mod json;
pub mod table;

/// Trait for types that can be formatted for output
pub trait Formattable {
    /// Format the data according to the specified format
    fn format(&self, format: OutputFormat) -> Result<String>;

    /// Format and print to stdout
    fn print(&self, format: OutputFormat) -> Result<()> {
        let output = self.format(format)?;
        println!("{}", output);
        Ok(())
    }
}

/// Lists render the same table for pretty and table output
impl<T: Tabled + Serialize> Formattable for Vec<T> {
    fn format(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Pretty | OutputFormat::Table => Ok(table::format_table(self)),
            OutputFormat::Json => Ok(json::format_json(self)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Tabled, Serialize)]
    struct Row {
        #[tabled(rename = "NAME")]
        name: String,
    }

    #[test]
    fn test_vec_formats_as_table() {
        let rows = vec![Row {
            name: "credential-field".to_string(),
        }];
        let out = rows.format(OutputFormat::Table).unwrap();
        assert!(out.contains("NAME"));
        assert!(out.contains("credential-field"));
    }

    #[test]
    fn test_vec_formats_as_json() {
        let rows = vec![Row {
            name: "x".to_string(),
        }];
        let out = rows.format(OutputFormat::Json).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["data"][0]["name"], "x");
    }
}
