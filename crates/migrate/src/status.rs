//! Read-only status report

use std::collections::BTreeMap;

use crate::config::Config;
use crate::diff::generate;
use crate::discovery::{ModelConfig, ModelLocator};
use crate::error::MigrateResult;
use crate::manager::{MigrationConfig, MigrationManager};
use crate::state::SchemaState;

/// Recorded table and its column count
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableStatus {
    pub name: String,
    pub columns: usize,
}

/// Snapshot of the migration bookkeeping
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub version: u32,
    pub version_prefix: String,
    pub rollback_count: u32,
    pub tables: Vec<TableStatus>,
    /// Migration files on disk per version
    pub versions: BTreeMap<u32, Vec<String>>,
    pub models: Vec<ModelConfig>,
    /// Tables the next forward migration would touch
    pub pending_tables: Vec<String>,
    pub pending_statements: usize,
}

impl StatusReport {
    pub fn is_up_to_date(&self) -> bool {
        self.pending_tables.is_empty()
    }

    /// Versions up to the pointer with no undo script on disk
    pub fn missing_undo(&self) -> Vec<u32> {
        (1..=self.version)
            .filter(|v| {
                !self
                    .versions
                    .get(v)
                    .map(|files| files.iter().any(|f| f.contains("undo")))
                    .unwrap_or(false)
            })
            .collect()
    }
}

/// Build a status report without touching the database
pub fn status(config: &Config) -> MigrateResult<StatusReport> {
    let manager = MigrationManager::with_config(MigrationConfig::from(config));
    let version = config.current_version()?;
    let state = SchemaState::load(&config.paths.state_file, version)?;

    let models = ModelLocator::new(config).locate()?;
    let change_set = generate(&models, &state);

    Ok(StatusReport {
        version,
        version_prefix: manager.version_prefix(version),
        rollback_count: state.rollback_count(),
        tables: state
            .tables
            .iter()
            .map(|(name, fields)| TableStatus {
                name: name.clone(),
                columns: fields.len(),
            })
            .collect(),
        versions: manager.list_versions()?,
        models: models.into_iter().map(|m| m.config).collect(),
        pending_tables: change_set.table_names(),
        pending_statements: change_set.forward_statements(),
    })
}
