//! Migration Rollback - Walks the schema back to an earlier version
//!
//! Every precondition is checked before the first undo script runs: the
//! target is below the current version, strict mode agrees with the target
//! snapshot, the target snapshot is readable and every version in
//! `(target, current]` has an undo script. Undo scripts then run newest first
//! and each version's files are archived under the new rollback count.

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Instant;

use crate::config::{read_version, write_version};
use crate::definitions::RollbackResult;
use crate::error::{MigrateError, MigrateResult};
use crate::options::RunOptions;
use crate::runner::MigrationRunner;
use crate::state::SchemaState;
use crate::verify::verify_models_match_target;

/// Resolve the rollback target: explicit, or the previous version
pub fn determine_target(current_version: u32, requested: Option<u32>) -> MigrateResult<u32> {
    let target = requested.unwrap_or_else(|| current_version.saturating_sub(1));
    if target >= current_version {
        return Err(MigrateError::rollback(format!(
            "current version is {}, cannot roll forward to {}",
            current_version, target
        )));
    }
    Ok(target)
}

/// Extension trait for MigrationRunner to add rollback functionality
#[async_trait]
pub trait MigrationRollback {
    /// Roll back to `options.target_version`, or one version back
    async fn rollback(&self, options: &RunOptions) -> MigrateResult<RollbackResult>;

    /// Snapshot recorded for `version`; version 0 may be an empty state
    fn target_snapshot(&self, version: u32) -> MigrateResult<SchemaState>;

    /// Confirm the version pointer and state file reflect `target`
    fn verify_rollback(&self, target: u32) -> MigrateResult<()>;
}

#[async_trait]
impl<'a> MigrationRollback for MigrationRunner<'a> {
    async fn rollback(&self, options: &RunOptions) -> MigrateResult<RollbackResult> {
        let start_time = Instant::now();
        let config = self.config();
        let manager = self.manager();

        let current_version = config.current_version()?;
        let target = determine_target(current_version, options.target_version)?;

        let target_state = self.target_snapshot(target)?;
        if options.strict_enabled(config) {
            let models = self.locate_models()?;
            verify_models_match_target(&models, &target_state, target)?;
        }

        let mut plan: Vec<(u32, Vec<PathBuf>)> = Vec::new();
        for version in ((target + 1)..=current_version).rev() {
            let undo_files = manager.find_undo_files(version)?;
            if undo_files.is_empty() {
                return Err(MigrateError::rollback(format!(
                    "no undo files found for version {}",
                    manager.version_prefix(version)
                )));
            }
            plan.push((version, undo_files));
        }

        let current_state = SchemaState::load(&config.paths.state_file, current_version)?;
        let rollback_count = current_state.rollback_count() + 1;

        tracing::info!(
            "Rolling back from version {} to {}",
            current_version,
            target
        );

        let mut rolled_back = Vec::with_capacity(plan.len());
        let mut archived_files = Vec::new();

        for (version, undo_files) in plan {
            for file in &undo_files {
                if options.dry_run {
                    tracing::info!("[DRY RUN] Would execute rollback: {}", file.display());
                    continue;
                }

                tracing::info!("Executing rollback: {}", file.display());
                if let Err(e) = self.database().execute_file(file).await {
                    if rolled_back.is_empty() {
                        return Err(e);
                    }
                    return Err(MigrateError::consistency(
                        version,
                        format!("undo failed after rolling back {:?}: {}", rolled_back, e),
                    ));
                }
            }

            if !options.dry_run {
                let archived = manager
                    .archive_version(version, rollback_count)
                    .map_err(|e| MigrateError::consistency(version - 1, e))?;
                archived_files.extend(archived);
            }
            rolled_back.push(version);
        }

        let result = RollbackResult {
            from_version: current_version,
            to_version: target,
            rolled_back,
            archived_files,
            rollback_count,
            dry_run: options.dry_run,
            execution_time_ms: 0,
        };

        if options.dry_run {
            return Ok(RollbackResult {
                execution_time_ms: start_time.elapsed().as_millis(),
                ..result
            });
        }

        // version 0 always restores an empty schema, whatever its snapshot holds
        let mut restored = if target == 0 {
            SchemaState::default()
        } else {
            target_state
        };
        restored.meta.rollback_count = rollback_count;
        restored.save(&config.paths.state_file).map_err(|e| {
            MigrateError::consistency(target, format!("schema state not restored: {}", e))
        })?;
        write_version(config.version_file(), target).map_err(|e| {
            MigrateError::consistency(target, format!("version pointer not updated: {}", e))
        })?;

        self.verify_rollback(target)
            .map_err(|e| MigrateError::consistency(target, format!("rollback verification failed: {}", e)))?;

        tracing::info!("Successfully rolled back to version {}", target);
        tracing::info!("Rollback count: {}", rollback_count);

        Ok(RollbackResult {
            execution_time_ms: start_time.elapsed().as_millis(),
            ..result
        })
    }

    fn target_snapshot(&self, version: u32) -> MigrateResult<SchemaState> {
        let history_file = self.manager().history_file(version);
        if version == 0 && !history_file.exists() {
            return Ok(SchemaState::default());
        }
        SchemaState::read(&history_file)
    }

    fn verify_rollback(&self, target: u32) -> MigrateResult<()> {
        let config = self.config();

        let version = read_version(config.version_file())?;
        if version != target {
            return Err(MigrateError::verification(format!(
                "config version mismatch after rollback (expected {}, got {})",
                target, version
            )));
        }

        let state = SchemaState::read(&config.paths.state_file)?;
        if target == 0 {
            if !state.tables.is_empty() {
                return Err(MigrateError::verification(
                    "state file not empty after rollback to version 0",
                ));
            }
            return Ok(());
        }

        let snapshot = SchemaState::read(self.manager().history_file(target))?;
        if !state.same_tables(&snapshot) {
            return Err(MigrateError::verification(
                "state file does not match history for target version",
            ));
        }
        Ok(())
    }
}
