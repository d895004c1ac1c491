//! Reusable formatting utilities for CLI output

use colored::{ColoredString, Colorize};

use guardcache::classify::SensitivityLevel;

/// Format a TTL in seconds as a compact human-readable string.
///
/// # Example output
/// - `1h`, `1h 30m` (hours, minutes)
/// - `5m`, `2m 5s`
/// - `never` for zero
pub fn format_ttl(secs: u64) -> String {
    if secs == 0 {
        return "never".to_string();
    }

    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;

    let mut parts = Vec::new();
    if hours > 0 {
        parts.push(format!("{}h", hours));
    }
    if mins > 0 {
        parts.push(format!("{}m", mins));
    }
    if secs > 0 {
        parts.push(format!("{}s", secs));
    }
    parts.join(" ")
}

/// Sensitivity level highlighted for terminal output
pub fn colored_level(level: SensitivityLevel) -> ColoredString {
    let text = level.to_string();
    match level {
        SensitivityLevel::Public => text.green(),
        SensitivityLevel::Personal => text.cyan(),
        SensitivityLevel::Sensitive => text.yellow(),
        SensitivityLevel::Secret => text.red().bold(),
    }
}

/// `yes` / `no`
pub fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_ttl() {
        assert_eq!(format_ttl(3600), "1h");
        assert_eq!(format_ttl(5400), "1h 30m");
        assert_eq!(format_ttl(300), "5m");
        assert_eq!(format_ttl(125), "2m 5s");
        assert_eq!(format_ttl(45), "45s");
    }

    #[test]
    fn test_format_ttl_zero() {
        assert_eq!(format_ttl(0), "never");
    }

    #[test]
    fn test_colored_level_keeps_text() {
        colored::control::set_override(false);
        assert_eq!(colored_level(SensitivityLevel::Secret).to_string(), "secret");
    }
}
