//! CSV and JSON exports of reports and purchase orders.

mod inventory;
mod procurement;

pub use inventory::*;
pub use procurement::*;

use serde::Serialize;

/// A report that can be written out for spreadsheets or other systems.
pub trait ReportExport: Serialize {
    /// Export to JSON.
    fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Export to CSV, header row first.
    fn to_csv(&self) -> String;
}

/// Escape a string for CSV output.
pub(crate) fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn opt_csv(s: Option<&str>) -> String {
    s.map(escape_csv).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_escaping() {
        assert_eq!(escape_csv("simple"), "simple");
        assert_eq!(escape_csv("with,comma"), "\"with,comma\"");
        assert_eq!(escape_csv("with\"quote"), "\"with\"\"quote\"");
        assert_eq!(escape_csv("two\nlines"), "\"two\nlines\"");
        assert_eq!(opt_csv(None), "");
    }
}
