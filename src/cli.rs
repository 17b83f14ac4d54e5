//! Command-line interface module for dirsort.
//!
//! This module handles all CLI-related functionality including:
//! - Command parsing
//! - Pre-flight validation of the source directory
//! - Planning, preview and execution of moves
//! - Journaling and undo

use crate::config::Settings;
use crate::executor::{CollisionMode, Executor};
use crate::output::{DisplayConfig, OutputFormatter};
use crate::path_guard::{normalize, validate_source_dir};
use crate::planner::Planner;
use crate::rules::RuleSet;
use crate::undo::{MoveRecord, UndoJournal, UndoOutcome};
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

/// Sort files into folders by extension, with undo.
#[derive(Debug, Parser)]
#[command(name = "dirsort", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Settings file (defaults to ./.dirsortrc.toml, then ~/.config/dirsort/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Use plain ASCII symbols
    #[arg(long, global = true)]
    pub ascii: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Move files into folders chosen by their extension
    Organize(OrganizeArgs),
    /// Revert the most recent organize run
    Undo {
        /// Directory that was organized
        dir: PathBuf,
    },
    /// List journaled runs that can be undone
    History {
        /// Directory that was organized
        dir: PathBuf,
    },
}

#[derive(Debug, Clone, Default, Args)]
pub struct OrganizeArgs {
    /// Directory to organize
    pub dir: PathBuf,

    /// Show what would be moved without changing anything
    #[arg(long)]
    pub dry_run: bool,

    /// What to do when a destination already exists
    #[arg(long, value_enum)]
    pub collision: Option<CollisionMode>,

    /// Abort if more regular files than this are found
    #[arg(long, value_name = "N")]
    pub max_files: Option<usize>,

    /// Only organize paths matching this glob (repeatable)
    #[arg(long, value_name = "GLOB")]
    pub include: Vec<String>,

    /// Never organize paths matching this glob (repeatable)
    #[arg(long, value_name = "GLOB")]
    pub exclude: Vec<String>,

    /// Flat TOML file of `extension = "folder"` rules
    #[arg(long, value_name = "FILE")]
    pub rules: Option<PathBuf>,

    /// Also descend into .git, .hg and .svn directories
    #[arg(long)]
    pub include_vcs: bool,
}

/// Runs the CLI application for parsed arguments.
///
/// Settings are loaded from `--config` or the default locations, then the
/// command is dispatched through [`run_with_settings`].
///
/// # Examples
///
/// ```no_run
/// use clap::Parser;
/// use dirsort::cli::{Cli, run_cli};
///
/// let cli = Cli::parse_from(["dirsort", "organize", "/path/to/directory", "--dry-run"]);
/// match run_cli(&cli) {
///     Ok(()) => println!("Operation completed successfully"),
///     Err(e) => eprintln!("Error: {}", e),
/// }
/// ```
pub fn run_cli(cli: &Cli) -> Result<(), String> {
    let settings = Settings::load(cli.config.as_deref())
        .map_err(|e| format!("Error loading configuration: {}", e))?;
    let output = OutputFormatter::new(DisplayConfig {
        color: !cli.no_color,
        unicode: !cli.ascii,
    });
    run_with_settings(&cli.command, settings, &output)
}

/// Dispatches a command with already loaded settings.
pub fn run_with_settings(
    command: &Command,
    settings: Settings,
    output: &OutputFormatter,
) -> Result<(), String> {
    match command {
        Command::Organize(args) => organize_directory(args, settings, output),
        Command::Undo { dir } => undo_organization(dir, output),
        Command::History { dir } => show_history(dir, output),
    }
}

/// Plans, previews and (unless dry run) executes an organize run.
///
/// This function:
/// 1. Applies command-line overrides to the settings
/// 2. Refuses unsafe source directories
/// 3. Plans moves from the rule set
/// 4. Prints the preview and per-folder summary
/// 5. Moves files and journals every move for undo
fn organize_directory(
    args: &OrganizeArgs,
    settings: Settings,
    output: &OutputFormatter,
) -> Result<(), String> {
    let settings = apply_overrides(settings, args);
    let rules = match &args.rules {
        Some(path) => RuleSet::load(path).map_err(|e| format!("Error loading rules: {}", e))?,
        None => settings.rule_set(),
    };
    let planner = Planner::new(&rules, settings.plan_options()).map_err(|e| e.to_string())?;

    let root = resolve_root(&args.dir)?;
    validate_source_dir(&root)
        .map_err(|e| format!("Refusing to organize {}: {}", root.display(), e))?;

    if args.dry_run {
        output.dry_run_notice(&format!("Analyzing contents of: {}", root.display()));
    } else {
        output.info(&format!("Organizing contents of: {}", root.display()));
    }

    let actions = planner.plan(&root).map_err(|e| e.to_string())?;
    if actions.is_empty() {
        output.info("No files found to organize.");
        return Ok(());
    }

    output.preview(&root, &actions);
    output.summary_table(&root, &actions);

    let executor = Executor::new(settings.collision);
    if args.dry_run {
        let result = executor.execute(&actions, true, None);
        output.execution_report(&result, true);
        return Ok(());
    }

    let progress = output.create_progress_bar(actions.len() as u64);
    let mut moves = Vec::new();
    let mut on_moved = |from: &Path, to: &Path| {
        moves.push(MoveRecord::new(from, to));
        progress.inc(1);
    };
    let result = executor.execute(&actions, false, Some(&mut on_moved));
    output.finish_progress_bar(&progress, result.moved_count);

    let journaled = !moves.is_empty();
    if let Err(e) = UndoJournal::append_run(&root, settings.collision, moves) {
        output.warning(&format!("Could not save undo journal: {}", e));
        output.warning("Undo will not be available for this run.");
    } else if journaled {
        output.info(&format!(
            "Journal saved. Use 'dirsort undo {}' to revert changes.",
            root.display()
        ));
    }

    output.execution_report(&result, false);
    if !result.is_clean() {
        output.warning("Some files could not be organized. Please review errors above.");
    }
    Ok(())
}

/// Undoes the most recent organize run of `dir`.
fn undo_organization(dir: &Path, output: &OutputFormatter) -> Result<(), String> {
    let root = resolve_root(dir)?;
    validate_source_dir(&root)
        .map_err(|e| format!("Refusing to undo in {}: {}", root.display(), e))?;

    output.info("Undoing previous organization...");
    match UndoJournal::undo_last(&root).map_err(|e| e.to_string())? {
        UndoOutcome::Undone(report) => output.undo_report(&report),
        UndoOutcome::NothingToUndo => output.info("Nothing to undo."),
    }
    Ok(())
}

fn show_history(dir: &Path, output: &OutputFormatter) -> Result<(), String> {
    let root = resolve_root(dir)?;
    let runs = UndoJournal::runs(&root).map_err(|e| e.to_string())?;
    output.history(&runs);
    Ok(())
}

fn apply_overrides(mut settings: Settings, args: &OrganizeArgs) -> Settings {
    if let Some(mode) = args.collision {
        settings.collision = mode;
    }
    if let Some(max_files) = args.max_files {
        settings.max_files = max_files;
    }
    settings.include.extend(args.include.iter().cloned());
    settings.exclude.extend(args.exclude.iter().cloned());
    if args.include_vcs {
        settings.skip_vcs = false;
    }
    settings
}

fn resolve_root(dir: &Path) -> Result<PathBuf, String> {
    if !dir.is_dir() {
        return Err(format!("Not a directory: {}", dir.display()));
    }
    std::path::absolute(dir)
        .map(|p| normalize(&p))
        .map_err(|e| format!("Error resolving {}: {}", dir.display(), e))
}
