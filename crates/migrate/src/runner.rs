//! Migration Runner - Generates and applies the next schema version
//!
//! A forward run reads the version pointer and the recorded state, checks the
//! live schema, diffs the models, writes the version's forward and undo
//! scripts and executes the forward script. Only then is the new state
//! committed: history snapshot, current state, version pointer.

use chrono::Utc;
use std::time::Instant;

use crate::config::{write_version, Config};
use crate::database::SchemaDatabase;
use crate::definitions::{MigrationOutcome, MigrationRunResult};
use crate::diff::generate;
use crate::discovery::{DiscoveredModel, ModelLocator};
use crate::error::{MigrateError, MigrateResult};
use crate::manager::{MigrationConfig, MigrationManager};
use crate::options::RunOptions;
use crate::state::SchemaState;
use crate::verify::verify_live_schema;

/// Migration runner that executes migrations against a database
pub struct MigrationRunner<'a> {
    config: &'a Config,
    manager: MigrationManager,
    db: &'a dyn SchemaDatabase,
}

impl<'a> MigrationRunner<'a> {
    /// Create a new migration runner
    pub fn new(config: &'a Config, db: &'a dyn SchemaDatabase) -> Self {
        Self {
            config,
            manager: MigrationManager::with_config(MigrationConfig::from(config)),
            db,
        }
    }

    pub fn config(&self) -> &Config {
        self.config
    }

    /// Get the migration manager
    pub fn manager(&self) -> &MigrationManager {
        &self.manager
    }

    pub fn database(&self) -> &dyn SchemaDatabase {
        self.db
    }

    pub fn locate_models(&self) -> MigrateResult<Vec<DiscoveredModel>> {
        ModelLocator::new(self.config).locate()
    }

    /// Generate and apply the next version, if the models changed
    pub async fn run_migrations(&self, options: &RunOptions) -> MigrateResult<MigrationOutcome> {
        let start_time = Instant::now();

        let current_version = self.config.current_version()?;
        let new_version = current_version.checked_add(1).ok_or_else(|| {
            MigrateError::config(format!("version {} cannot be incremented", current_version))
        })?;

        let previous = SchemaState::load(&self.config.paths.state_file, current_version)?;
        verify_live_schema(self.db, &previous).await?;

        let models = self.locate_models()?;
        let change_set = generate(&models, &previous);
        if change_set.is_empty() {
            tracing::info!(
                "No schema changes detected. Staying at version {}",
                self.manager.version_prefix(current_version)
            );
            return Ok(MigrationOutcome::NoChanges {
                version: current_version,
            });
        }

        let (forward, undo) = self
            .manager
            .build_migrations(&change_set, new_version, Utc::now());
        let forward_path = self.manager.migration_path(&forward);
        let undo_path = self.manager.migration_path(&undo);

        if options.verbose {
            tracing::info!("Forward SQL for {}:\n{}", forward.filename, forward.content);
            tracing::info!("Undo SQL for {}:\n{}", undo.filename, undo.content);
        } else {
            tracing::debug!("Forward SQL for {}:\n{}", forward.filename, forward.content);
        }

        let mut result = MigrationRunResult {
            previous_version: current_version,
            version: new_version,
            forward_file: forward_path.clone(),
            undo_file: undo_path.clone(),
            tables: change_set.table_names(),
            forward_statements: change_set.forward_statements(),
            undo_statements: change_set.undo_statements(),
            dry_run: options.dry_run,
            execution_time_ms: 0,
        };

        if options.dry_run {
            tracing::info!("[DRY RUN] Would write {}", forward_path.display());
            tracing::info!("[DRY RUN] Would write {}", undo_path.display());
            tracing::info!("[DRY RUN] Would apply migration: {}", forward.filename);
            result.execution_time_ms = start_time.elapsed().as_millis();
            return Ok(MigrationOutcome::Applied(result));
        }

        self.config.ensure_dirs()?;
        self.manager.write_migration(&forward)?;
        self.manager.write_migration(&undo)?;

        tracing::info!("Applying: {}", forward.filename);
        if let Err(e) = self.db.execute_file(&forward_path).await {
            tracing::warn!(
                "Migration {} failed; state and version were left at {}",
                forward.filename,
                self.manager.version_prefix(current_version)
            );
            return Err(e);
        }

        self.commit(current_version, new_version, &previous, &change_set.new_state)?;

        result.execution_time_ms = start_time.elapsed().as_millis();
        tracing::info!(
            "Version {} successfully applied ({} statements)",
            self.manager.version_prefix(new_version),
            result.forward_statements
        );
        Ok(MigrationOutcome::Applied(result))
    }

    /// Persist snapshot, state and version pointer after the SQL ran
    fn commit(
        &self,
        current_version: u32,
        new_version: u32,
        previous: &SchemaState,
        new_state: &SchemaState,
    ) -> MigrateResult<()> {
        let history_file = self.manager.history_file(current_version);
        previous.save(&history_file).map_err(|e| {
            MigrateError::consistency(new_version, format!("history snapshot not saved: {}", e))
        })?;

        new_state.save(&self.config.paths.state_file).map_err(|e| {
            MigrateError::consistency(new_version, format!("schema state not saved: {}", e))
        })?;

        write_version(self.config.version_file(), new_version).map_err(|e| {
            MigrateError::consistency(new_version, format!("version pointer not updated: {}", e))
        })?;

        Ok(())
    }
}
