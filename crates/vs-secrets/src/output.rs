//! Terminal output for vs-secrets commands
//!
//! Commands report one line per solution, prefixed by a mark for the outcome.
//! `status` renders all solutions as a single table.

use console::{style, StyledObject};
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt::Display;
use tabled::{settings::Style, Table, Tabled};
use vs_secrets_sync::SyncStatus;

/// Outcome mark printed in front of a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    Done,
    Info,
    Warn,
    Failed,
}

impl Mark {
    fn symbol(self) -> StyledObject<&'static str> {
        match self {
            Mark::Done => style("✓").green().bold(),
            Mark::Info => style("ℹ").blue().bold(),
            Mark::Warn => style("⚠").yellow().bold(),
            Mark::Failed => style("✗").red().bold(),
        }
    }
}

/// Warnings and failures go to stderr
pub fn line(mark: Mark, msg: &str) {
    match mark {
        Mark::Done | Mark::Info => println!("{} {}", mark.symbol(), msg),
        Mark::Warn | Mark::Failed => eprintln!("{} {}", mark.symbol(), msg),
    }
}

pub fn success(msg: &str) {
    line(Mark::Done, msg);
}

pub fn info(msg: &str) {
    line(Mark::Info, msg);
}

pub fn warning(msg: &str) {
    line(Mark::Warn, msg);
}

pub fn error(msg: &str) {
    line(Mark::Failed, msg);
}

/// `✓ Contoso: pushed`
pub fn solution_line(mark: Mark, solution: &str, detail: impl Display) {
    line(mark, &format!("{}: {}", style(solution).bold(), detail));
}

/// Section title for listings
pub fn section(title: &str) {
    println!("\n{}", style(title).bold().underlined());
}

/// Indented `name: value` entry under a section
pub fn field(name: &str, value: impl Display) {
    println!("  {}: {}", style(name).dim(), value);
}

/// One row of the status table
#[derive(Tabled)]
pub struct StatusRow {
    solution: String,
    #[tabled(rename = "secret files")]
    secret_files: usize,
    status: String,
}

impl StatusRow {
    pub fn new(solution: &str, secret_files: usize, status: SyncStatus) -> Self {
        Self {
            solution: solution.to_string(),
            secret_files,
            status: status_cell(status),
        }
    }
}

/// Green when synchronized, red when the user must act, yellow otherwise
fn status_cell(status: SyncStatus) -> String {
    let text = status.to_string();
    if status.is_synchronized() {
        style(text).green().to_string()
    } else if status.is_error() {
        style(text).red().to_string()
    } else {
        style(text).yellow().to_string()
    }
}

pub fn render_status_table(rows: Vec<StatusRow>) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

pub fn status_table(rows: Vec<StatusRow>) {
    println!("{}", render_status_table(rows));
}

/// Spinner shown while the remote repository is queried
pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        pb.set_style(template);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(120));
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use vs_secrets_sync::DiffCounts;

    #[test]
    fn test_status_cell_text() {
        let cell = status_cell(SyncStatus::CloudOnly { invalid_key: true });
        assert_eq!(console::strip_ansi_codes(&cell), "Cloud only (invalid key)");
    }

    #[test]
    fn test_status_table_lists_every_solution() {
        let counts = DiffCounts {
            different: 1,
            equal: 1,
            ..DiffCounts::default()
        };
        let table = render_status_table(vec![
            StatusRow::new("Contoso", 2, SyncStatus::Synchronized),
            StatusRow::new("Fabrikam", 2, SyncStatus::NotSynchronized(counts)),
        ]);
        let plain = console::strip_ansi_codes(&table);

        assert!(plain.contains("secret files"));
        assert!(plain.contains("Contoso"));
        assert!(plain.contains("Synchronized"));
        assert!(plain.contains("Not synchronized (0 local only, 0 remote only, 1 different)"));
    }
}
