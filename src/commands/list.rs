//! The `list` table: one row per worktree, columns from configuration.

use anstyle::Style;

use super::App;
use crate::config::{ListColumn, ListTableConfig};
use crate::errors::WorktreeError;
use crate::path::display_path;
use crate::snapshot::{Snapshot, WorktreeStatus};
use unicode_width::UnicodeWidthStr;

type CommandResult = std::result::Result<i32, WorktreeError>;

pub fn list(app: &App) -> CommandResult {
    let snapshot = app.ws.snapshot()?;

    if app.reporter.is_json() {
        app.reporter.ok(
            "ok",
            Some(app.repo_root()),
            serde_json::to_value(&snapshot)?,
            "",
        );
        return Ok(0);
    }

    let width = terminal_size::terminal_size()
        .map(|(terminal_size::Width(w), _)| w as usize)
        .unwrap_or(100);
    let table = render_table(&snapshot, &app.ws.config.list, app.full_path, width);
    anstream::println!("{table}");
    Ok(0)
}

fn cell(status: &WorktreeStatus, column: ListColumn, snapshot: &Snapshot, full_path: bool) -> String {
    match column {
        ListColumn::Branch => {
            let name = status.entry.branch.as_deref().unwrap_or("(detached)");
            if status.is_primary {
                format!("{name} [primary]")
            } else {
                name.to_string()
            }
        }
        ListColumn::Dirty => match status.dirty {
            Some(true) => "*".to_string(),
            Some(false) => String::new(),
            None => "?".to_string(),
        },
        ListColumn::Merged => match status.merged.overall {
            Some(true) => "yes".to_string(),
            Some(false) => "no".to_string(),
            None => "?".to_string(),
        },
        ListColumn::Pr => status
            .pr
            .status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string()),
        ListColumn::Locked => {
            if status.locked.value {
                "locked".to_string()
            } else {
                String::new()
            }
        }
        ListColumn::Ahead => status
            .upstream
            .ahead
            .map(|n| n.to_string())
            .unwrap_or_else(|| "-".to_string()),
        ListColumn::Behind => status
            .upstream
            .behind
            .map(|n| n.to_string())
            .unwrap_or_else(|| "-".to_string()),
        ListColumn::Path => display_path(&status.entry.path, &snapshot.repo_root, full_path),
    }
}

fn header(column: ListColumn) -> &'static str {
    match column {
        ListColumn::Branch => "BRANCH",
        ListColumn::Dirty => "DIRTY",
        ListColumn::Merged => "MERGED",
        ListColumn::Pr => "PR",
        ListColumn::Locked => "LOCKED",
        ListColumn::Ahead => "AHEAD",
        ListColumn::Behind => "BEHIND",
        ListColumn::Path => "PATH",
    }
}

/// Render the table at a fixed width. Deterministic for a given snapshot
/// and width: columns grow to their widest cell, and only the path column
/// shrinks (down to `minWidth`) when the table would overflow.
pub fn render_table(
    snapshot: &Snapshot,
    config: &ListTableConfig,
    full_path: bool,
    width: usize,
) -> String {
    let columns = &config.columns;

    let rows: Vec<Vec<String>> = snapshot
        .worktrees
        .iter()
        .map(|status| {
            columns
                .iter()
                .map(|&column| cell(status, column, snapshot, full_path))
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = columns
        .iter()
        .map(|&column| header(column).width())
        .collect();
    for row in &rows {
        for (i, value) in row.iter().enumerate() {
            widths[i] = widths[i].max(value.width());
        }
    }

    // Shrink the path column when the table overflows the terminal.
    if config.path_truncate
        && let Some(path_index) = columns.iter().position(|&c| c == ListColumn::Path)
    {
        let gaps = 2 * columns.len().saturating_sub(1);
        let others: usize = widths
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != path_index)
            .map(|(_, w)| w)
            .sum();
        let available = width.saturating_sub(others + gaps);
        let min_width = config.path_min_width as usize;
        if widths[path_index] > available {
            widths[path_index] = available.max(min_width);
        }
    }

    let bold = Style::new().bold();
    let mut out = String::new();
    let header_row: Vec<String> = columns
        .iter()
        .map(|&column| header(column).to_string())
        .collect();
    out.push_str(&format!(
        "{bold}{}{bold:#}",
        format_row(&header_row, &widths)
    ));
    for row in &rows {
        out.push('\n');
        out.push_str(&format_row(row, &widths));
    }
    out
}

fn format_row(cells: &[String], widths: &[usize]) -> String {
    let mut parts = Vec::with_capacity(cells.len());
    for (i, value) in cells.iter().enumerate() {
        let truncated = truncate_to(value, widths[i]);
        if i == cells.len() - 1 {
            // No trailing padding on the last column.
            parts.push(truncated);
        } else {
            let pad = widths[i].saturating_sub(truncated.width());
            parts.push(format!("{truncated}{}", " ".repeat(pad)));
        }
    }
    parts.join("  ").trim_end().to_string()
}

/// Truncate keeping the tail, which for paths is the discriminating part.
fn truncate_to(value: &str, max_width: usize) -> String {
    if value.width() <= max_width {
        return value.to_string();
    }
    let mut tail: Vec<char> = Vec::new();
    let mut used = 1; // the ellipsis
    for c in value.chars().rev() {
        let char_width = unicode_width::UnicodeWidthChar::width(c).unwrap_or(0);
        if used + char_width > max_width {
            break;
        }
        used += char_width;
        tail.push(c);
    }
    tail.reverse();
    format!("…{}", tail.into_iter().collect::<String>())
}
