//! Terminal output helpers
//!
//! Colored status messages and the codespace listing table.

use tabled::{settings::Style, Table, Tabled};

use coderev_core::types::Codespace;

/// Format a list of codespaces as an ASCII table
pub fn format_codespaces(codespaces: &[Codespace]) -> String {
    if codespaces.is_empty() {
        return "No codespaces found".to_string();
    }

    #[derive(Tabled)]
    struct CodespaceRow {
        #[tabled(rename = "NAME")]
        name: String,
        #[tabled(rename = "BRANCH")]
        branch: String,
        #[tabled(rename = "STATE")]
        state: String,
        #[tabled(rename = "MACHINE")]
        machine: String,
    }

    let rows: Vec<CodespaceRow> = codespaces
        .iter()
        .map(|cs| CodespaceRow {
            name: cs.name.clone(),
            branch: or_dash(cs.branch()),
            state: or_dash(&cs.state),
            machine: or_dash(&cs.machine.display_name),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

fn or_dash(s: &str) -> String {
    if s.is_empty() {
        "-".to_string()
    } else {
        s.to_string()
    }
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow with a warning symbol prefix
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an informational message in cyan with an info symbol prefix
pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_codespaces_empty() {
        assert_eq!(format_codespaces(&[]), "No codespaces found");
    }

    #[test]
    fn test_format_codespaces_table_has_columns() {
        let cs: Codespace = serde_json::from_str(
            r#"{
                "name": "cs-1",
                "state": "Available",
                "git_status": {"ref": "main"},
                "machine": {"display_name": "2 cores, 8 GB RAM"}
            }"#,
        )
        .unwrap();
        let table = format_codespaces(&[cs]);
        assert!(table.contains("NAME"));
        assert!(table.contains("cs-1"));
        assert!(table.contains("main"));
        assert!(table.contains("Available"));
    }
}
