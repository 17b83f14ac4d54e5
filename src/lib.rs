//! dirsort - sort files into extension-based folders, safely and reversibly
//!
//! This library plans moves from an extension to folder rule set, checks every
//! destination against path-traversal and symlink policies, executes the moves
//! with a chosen collision strategy, and journals each run so it can be undone.

pub mod cli;
pub mod config;
pub mod executor;
pub mod filters;
pub mod output;
pub mod path_guard;
pub mod planner;
pub mod rules;
pub mod undo;

pub use config::{ConfigError, Settings};
pub use executor::{CollisionMode, ExecutionResult, Executor};
pub use filters::{FilterError, PathFilters};
pub use output::{DisplayConfig, OutputFormatter};
pub use path_guard::GuardError;
pub use planner::{Action, PlanError, PlanOptions, Planner, plan};
pub use rules::{RuleError, RuleSet};
pub use undo::{MoveRecord, Run, UndoJournal, UndoOutcome, UndoReport};
