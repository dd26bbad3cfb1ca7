//! Migration Definitions - Core types shared by the forward and rollback paths

use std::path::PathBuf;

/// Migration direction for execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationDirection {
    /// Moves the schema to the next version
    Forward,
    /// Exact inverse of the forward script of the same version
    Undo,
}

impl MigrationDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationDirection::Forward => "forward",
            MigrationDirection::Undo => "undo",
        }
    }
}

/// A generated migration script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    /// Zero-padded version prefix
    pub version: String,
    pub filename: String,
    pub content: String,
    pub direction: MigrationDirection,
}

/// Result of a forward migration
#[derive(Debug, Clone)]
pub struct MigrationRunResult {
    pub previous_version: u32,
    pub version: u32,
    pub forward_file: PathBuf,
    pub undo_file: PathBuf,
    /// Tables touched by this version
    pub tables: Vec<String>,
    pub forward_statements: usize,
    pub undo_statements: usize,
    /// Nothing was written or executed
    pub dry_run: bool,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

/// Outcome of asking for a forward migration
#[derive(Debug, Clone)]
pub enum MigrationOutcome {
    /// Models match the recorded state
    NoChanges { version: u32 },
    Applied(MigrationRunResult),
}

/// Result of a rollback
#[derive(Debug, Clone)]
pub struct RollbackResult {
    pub from_version: u32,
    pub to_version: u32,
    /// Versions whose undo scripts ran, newest first
    pub rolled_back: Vec<u32>,
    /// Destination paths of archived files
    pub archived_files: Vec<PathBuf>,
    pub rollback_count: u32,
    pub dry_run: bool,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

/// What a single engine invocation did
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Migrated(MigrationOutcome),
    RolledBack(RollbackResult),
}
