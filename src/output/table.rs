//! Table output formatting

use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Rows},
};

/// Format rows as a rounded table
pub fn format_table<T: Tabled>(data: &[T]) -> String {
    if data.is_empty() {
        return "Nothing to show.".to_string();
    }

    let mut table = Table::new(data);
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()));

    table.to_string()
}

#[derive(Tabled)]
struct FieldRow<'a> {
    #[tabled(rename = "FIELD")]
    name: &'a str,
    #[tabled(rename = "VALUE")]
    value: &'a str,
}

/// Format `(field, value)` pairs as a two-column table
pub fn format_fields(fields: &[(&str, String)]) -> String {
    let rows: Vec<FieldRow<'_>> = fields
        .iter()
        .map(|(name, value)| FieldRow {
            name: *name,
            value: value.as_str(),
        })
        .collect();
    format_table(&rows)
}
