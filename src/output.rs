//! Output formatting and styling module.
//!
//! Provides a centralized interface for all CLI output, including colored output,
//! progress tracking, and formatted tables. Color and Unicode symbols are
//! switched through a [`DisplayConfig`] carried by each [`OutputFormatter`].

use crate::executor::ExecutionResult;
use crate::planner::Action;
use crate::undo::{Run, UndoReport};
use colored::{Color, Colorize};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::path::Path;

/// Display switches for terminal output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayConfig {
    /// Emit ANSI colors.
    pub color: bool,
    /// Use Unicode symbols; plain ASCII otherwise.
    pub unicode: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            color: true,
            unicode: true,
        }
    }
}

/// Manages all CLI output with consistent styling and formatting.
///
/// This struct provides methods for:
/// - Success, error, warning and info messages
/// - The action preview and per-folder summary table
/// - Execution, undo and history reports
/// - Progress bars for move batches
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputFormatter {
    display: DisplayConfig,
}

impl OutputFormatter {
    pub fn new(display: DisplayConfig) -> Self {
        Self { display }
    }

    fn paint(&self, text: &str, color: Color) -> String {
        if self.display.color {
            text.color(color).to_string()
        } else {
            text.to_string()
        }
    }

    fn strong(&self, text: &str) -> String {
        if self.display.color {
            text.bold().to_string()
        } else {
            text.to_string()
        }
    }

    fn symbol(&self, unicode: &'static str, ascii: &'static str) -> &'static str {
        if self.display.unicode { unicode } else { ascii }
    }

    /// Prints a success message in green with a checkmark.
    pub fn success(&self, message: &str) {
        println!("{} {}", self.paint(self.symbol("✓", "[ok]"), Color::Green), message);
    }

    /// Prints an error message in red to stderr.
    pub fn error(&self, message: &str) {
        eprintln!("{} {}", self.paint(self.symbol("✗", "[error]"), Color::Red), message);
    }

    /// Prints a warning message in yellow.
    pub fn warning(&self, message: &str) {
        println!("{} {}", self.paint(self.symbol("⚠", "[warn]"), Color::Yellow), message);
    }

    /// Prints an info message in cyan.
    pub fn info(&self, message: &str) {
        println!("{}", self.paint(message, Color::Cyan));
    }

    /// Prints a section header.
    pub fn header(&self, header: &str) {
        println!("\n{}", self.strong(header));
    }

    /// Prints a dry-run notice message.
    pub fn dry_run_notice(&self, message: &str) {
        println!("{}", self.paint(&format!("[DRY RUN] {}", message), Color::Yellow));
    }

    /// Creates and returns a progress bar for file operations.
    pub fn create_progress_bar(&self, total: u64) -> ProgressBar {
        let (template, chars) = if self.display.unicode {
            ("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}", "█▓░")
        } else {
            ("[{bar:40}] {pos}/{len} {msg}", "#>-")
        };
        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(template)
                .expect("Invalid progress bar template")
                .progress_chars(chars),
        );
        pb
    }

    /// Ends a move progress bar at the number of moves actually made.
    pub fn finish_progress_bar(&self, pb: &ProgressBar, moved: usize) {
        settle_progress_bar(pb, moved);
        pb.finish_and_clear();
    }

    /// One preview line: `doc.pdf -> Documents/doc.pdf (extension '.pdf' -> Documents)`.
    pub fn format_action(&self, root: &Path, action: &Action) -> String {
        format!(
            "{} {} {} {}",
            relative_display(root, &action.source),
            self.symbol("→", "->"),
            self.paint(&relative_display(root, &action.target), Color::Green),
            self.paint(&format!("({})", action.reason), Color::BrightBlack)
        )
    }

    /// Prints every planned action.
    pub fn preview(&self, root: &Path, actions: &[Action]) {
        self.header("PLANNED MOVES");
        for action in actions {
            println!("  {}", self.format_action(root, action));
        }
    }

    /// Formats a table of file counts per target folder.
    pub fn format_summary_table(
        &self,
        folder_counts: &BTreeMap<String, usize>,
        total_files: usize,
    ) -> String {
        let width = folder_counts
            .keys()
            .map(|name| name.len())
            .max()
            .unwrap_or(0)
            .max("Folder".len());

        let plural = |n: usize| if n == 1 { "file" } else { "files" };
        let rule = "-".repeat(width + 10);

        let mut lines = vec![
            format!("{:<width$} | Files", "Folder", width = width),
            rule.clone(),
        ];
        for (folder, count) in folder_counts {
            lines.push(format!(
                "{:<width$} | {} {}",
                folder,
                self.paint(&count.to_string(), Color::Green),
                plural(*count),
                width = width
            ));
        }
        lines.push(rule);
        lines.push(format!(
            "{:<width$} | {} {}",
            "Total",
            self.paint(&total_files.to_string(), Color::Green),
            plural(total_files),
            width = width
        ));
        lines.join("\n")
    }

    /// Prints the per-folder summary of a plan.
    pub fn summary_table(&self, root: &Path, actions: &[Action]) {
        self.header("SUMMARY");
        println!(
            "{}",
            self.format_summary_table(&folder_counts(root, actions), actions.len())
        );
    }

    /// Prints the outcome of an executor run.
    pub fn execution_report(&self, result: &ExecutionResult, dry_run: bool) {
        if dry_run {
            self.dry_run_notice(&format!(
                "{} file(s) would be moved. No files were modified.",
                result.moved_count
            ));
            return;
        }

        self.success(&format!("Moved: {}", result.moved_count));
        if result.skipped_count > 0 {
            self.warning(&format!("Skipped: {}", result.skipped_count));
        }
        for error in &result.errors {
            self.error(error);
        }
    }

    /// Prints the outcome of an undo.
    pub fn undo_report(&self, report: &UndoReport) {
        self.success(&format!("Restored: {}", report.restored));
        if report.skipped > 0 {
            self.warning(&format!("Skipped: {}", report.skipped));
        }
        for error in &report.errors {
            self.error(error);
        }
    }

    /// Formats one journaled run for the history listing.
    pub fn format_run(&self, index: usize, run: &Run) -> String {
        format!(
            "#{} {} [{}] {} move(s)",
            index + 1,
            self.strong(&run.timestamp),
            run.collision_mode,
            run.moves.len()
        )
    }

    /// Prints the journaled runs, oldest first.
    pub fn history(&self, runs: &[Run]) {
        if runs.is_empty() {
            self.info("No journaled runs.");
            return;
        }
        self.header("HISTORY");
        for (index, run) in runs.iter().enumerate() {
            println!("  {}", self.format_run(index, run));
        }
    }
}

/// Counts planned moves per target folder, relative to `root`.
pub fn folder_counts(root: &Path, actions: &[Action]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for action in actions {
        let folder = action
            .target
            .parent()
            .map(|dir| relative_display(root, dir))
            .unwrap_or_default();
        *counts.entry(folder).or_insert(0) += 1;
    }
    counts
}

fn settle_progress_bar(pb: &ProgressBar, moved: usize) {
    pb.set_length(moved as u64);
    pb.set_position(moved as u64);
}

fn relative_display(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}
