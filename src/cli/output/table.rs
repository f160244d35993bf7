//! Table output formatting for CLI commands using comfy-table.
//!
//! Colors respect `NO_COLOR` through `console`'s color detection.

use comfy_table::{presets, Cell, CellAlignment, Color, ContentArrangement, Table};
use console::style;

use crate::domain::models::MigrationStatus;

/// A borderless list table with uppercase, left-aligned headers.
pub fn list_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(h.to_uppercase()).set_alignment(CellAlignment::Left)),
        );
    table
}

/// Render the table to string with a count header.
pub fn render_list(entity_name: &str, table: Table, total: usize) -> String {
    if total == 0 {
        return format!("No {entity_name}s found.");
    }
    let noun = if total == 1 {
        entity_name.to_string()
    } else {
        format!("{entity_name}s")
    };
    format!("{} {noun}:\n{table}", style(total).bold())
}

/// A status cell, colored when the terminal supports it.
pub fn status_cell(status: MigrationStatus) -> Cell {
    let cell = Cell::new(status.as_str());
    if !console::colors_enabled() {
        return cell;
    }
    match status {
        MigrationStatus::Pending => cell.fg(Color::Blue),
        MigrationStatus::Running => cell.fg(Color::Yellow),
        MigrationStatus::Completed => cell.fg(Color::Green),
        MigrationStatus::Failed => cell.fg(Color::Red),
        MigrationStatus::Cancelled => cell.fg(Color::DarkGrey),
    }
}

/// Colored status text for detail views.
pub fn styled_status(status: MigrationStatus) -> String {
    let text = status.as_str();
    match status {
        MigrationStatus::Pending => style(text).blue().to_string(),
        MigrationStatus::Running => style(text).yellow().to_string(),
        MigrationStatus::Completed => style(text).green().bold().to_string(),
        MigrationStatus::Failed => style(text).red().bold().to_string(),
        MigrationStatus::Cancelled => style(text).dim().to_string(),
    }
}
