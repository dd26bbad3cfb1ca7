//! Migration Manager - File system operations for migrations
//!
//! Names, writes, finds and archives the versioned migration scripts and
//! history snapshots.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::definitions::{Migration, MigrationDirection};
use crate::diff::ChangeSet;
use crate::error::{MigrateError, MigrateResult};

/// Filesystem layout of the migration artifacts
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    pub migration_dir: PathBuf,
    pub history_dir: PathBuf,
    pub archived_dir: PathBuf,
    /// Base name of generated scripts, e.g. `migration.sql`
    pub migration_file: String,
    pub version_prefix_length: usize,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for MigrationConfig {
    fn from(config: &Config) -> Self {
        Self {
            migration_dir: config.paths.migration_dir.clone(),
            history_dir: config.paths.history_dir.clone(),
            archived_dir: config.archived_dir(),
            migration_file: config.settings.migration_file.clone(),
            version_prefix_length: config.settings.version_prefix_length,
        }
    }
}

/// Migration manager for generated scripts and snapshots
#[derive(Debug, Clone, Default)]
pub struct MigrationManager {
    config: MigrationConfig,
}

impl MigrationManager {
    /// Create a new migration manager with custom configuration
    pub fn with_config(config: MigrationConfig) -> Self {
        Self { config }
    }

    /// Zero-padded version prefix
    pub fn version_prefix(&self, version: u32) -> String {
        format!(
            "{:0width$}",
            version,
            width = self.config.version_prefix_length
        )
    }

    pub fn forward_filename(&self, version: u32) -> String {
        format!("{}_{}", self.version_prefix(version), self.config.migration_file)
    }

    pub fn undo_filename(&self, version: u32) -> String {
        format!(
            "{}_undo_{}",
            self.version_prefix(version),
            self.config.migration_file
        )
    }

    pub fn migration_path(&self, migration: &Migration) -> PathBuf {
        self.config.migration_dir.join(&migration.filename)
    }

    /// History snapshot holding the state recorded at `version`
    pub fn history_file(&self, version: u32) -> PathBuf {
        self.config
            .history_dir
            .join(format!("schema_state_{}.json", self.version_prefix(version)))
    }

    /// Build the forward and undo scripts of a change set
    pub fn build_migrations(
        &self,
        change_set: &ChangeSet,
        version: u32,
        generated_at: DateTime<Utc>,
    ) -> (Migration, Migration) {
        let forward = self.build_migration(
            version,
            MigrationDirection::Forward,
            &change_set.forward_sql(),
            generated_at,
        );
        let undo = self.build_migration(
            version,
            MigrationDirection::Undo,
            &change_set.undo_sql(),
            generated_at,
        );
        (forward, undo)
    }

    fn build_migration(
        &self,
        version: u32,
        direction: MigrationDirection,
        body: &str,
        generated_at: DateTime<Utc>,
    ) -> Migration {
        let prefix = self.version_prefix(version);
        let filename = match direction {
            MigrationDirection::Forward => self.forward_filename(version),
            MigrationDirection::Undo => self.undo_filename(version),
        };
        let content = format!(
            "-- Combined Migrations Version: {} ({})\n\
             -- Generated: {}\n\
             -- This file contains all migrations for this version\n\n\
             {}",
            prefix,
            direction.as_str(),
            generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
            body
        );

        Migration {
            version: prefix,
            filename,
            content,
            direction,
        }
    }

    /// Write a script into the migration directory, creating it if needed
    pub fn write_migration(&self, migration: &Migration) -> MigrateResult<PathBuf> {
        fs::create_dir_all(&self.config.migration_dir).map_err(|e| {
            MigrateError::config(format!("Failed to create migrations directory: {}", e))
        })?;

        let path = self.migration_path(migration);
        fs::write(&path, &migration.content)?;
        tracing::debug!("Wrote {}", path.display());
        Ok(path)
    }

    /// Files in the migration directory belonging to `version`
    pub fn version_files(&self, version: u32) -> MigrateResult<Vec<PathBuf>> {
        let prefix = format!("{}_", self.version_prefix(version));
        let mut files: Vec<PathBuf> = self
            .migration_entries()?
            .into_iter()
            .filter(|(name, _)| name.starts_with(&prefix))
            .map(|(_, path)| path)
            .collect();
        files.sort();
        Ok(files)
    }

    /// Undo scripts of `version`
    pub fn find_undo_files(&self, version: u32) -> MigrateResult<Vec<PathBuf>> {
        let prefix = format!("{}_", self.version_prefix(version));
        let mut files: Vec<PathBuf> = self
            .migration_entries()?
            .into_iter()
            .filter(|(name, _)| {
                name.strip_prefix(&prefix)
                    .map(|rest| rest.starts_with("undo_") || rest.ends_with("_undo.sql"))
                    .unwrap_or(false)
            })
            .map(|(_, path)| path)
            .collect();
        files.sort();
        Ok(files)
    }

    /// Versions present in the migration directory with their file names
    pub fn list_versions(&self) -> MigrateResult<BTreeMap<u32, Vec<String>>> {
        let mut versions: BTreeMap<u32, Vec<String>> = BTreeMap::new();
        for (name, _) in self.migration_entries()? {
            let Some((digits, _)) = name.split_once('_') else {
                continue;
            };
            if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }
            if let Ok(version) = digits.parse::<u32>() {
                versions.entry(version).or_default().push(name);
            }
        }
        for names in versions.values_mut() {
            names.sort();
        }
        Ok(versions)
    }

    /// Move the scripts and history snapshot of `version` into the archive
    /// directory, each prefixed with the rollback count.
    pub fn archive_version(&self, version: u32, rollback_count: u32) -> MigrateResult<Vec<PathBuf>> {
        let archive_dir = &self.config.archived_dir;
        fs::create_dir_all(archive_dir).map_err(|e| {
            MigrateError::rollback(format!("Failed to create archive directory: {}", e))
        })?;

        let mut sources = self.version_files(version)?;
        let snapshot = self.history_file(version);
        if snapshot.exists() {
            sources.push(snapshot);
        }

        let mut archived = Vec::with_capacity(sources.len());
        for source in sources {
            let destination = archive_destination(archive_dir, &source, rollback_count)?;
            fs::rename(&source, &destination).map_err(|e| {
                MigrateError::rollback(format!(
                    "Failed to archive {}: {}",
                    source.display(),
                    e
                ))
            })?;
            tracing::debug!("Archived {} to {}", source.display(), destination.display());
            archived.push(destination);
        }

        Ok(archived)
    }

    fn migration_entries(&self) -> MigrateResult<Vec<(String, PathBuf)>> {
        let dir = &self.config.migration_dir;
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                entries.push((name.to_string(), path.clone()));
            }
        }
        Ok(entries)
    }
}

fn archive_destination(archive_dir: &Path, source: &Path, rollback_count: u32) -> MigrateResult<PathBuf> {
    let name = source
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| MigrateError::rollback(format!("Invalid file name {}", source.display())))?;
    Ok(archive_dir.join(format!("{}_{}", rollback_count, name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::generate;
    use crate::state::SchemaState;
    use tempfile::TempDir;

    fn manager_in(root: &Path) -> MigrationManager {
        MigrationManager::with_config(MigrationConfig {
            migration_dir: root.join("migrations"),
            history_dir: root.join("history"),
            archived_dir: root.join("migrations").join("archived"),
            migration_file: "migration.sql".to_string(),
            version_prefix_length: 5,
        })
    }

    #[test]
    fn test_filenames() {
        let manager = MigrationManager::default();
        assert_eq!(manager.forward_filename(1), "00001_migration.sql");
        assert_eq!(manager.undo_filename(12), "00012_undo_migration.sql");
        assert_eq!(
            manager.history_file(2),
            PathBuf::from("migrations/history/schema_state_00002.json")
        );
    }

    #[test]
    fn test_build_and_write_migrations() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager_in(temp_dir.path());

        let mut previous = SchemaState::default();
        previous.tables.insert(
            "books".to_string(),
            vec![crate::fields::Field::new("ID", "i32").primary()],
        );
        let change_set = generate(&[], &previous);

        let (forward, undo) = manager.build_migrations(&change_set, 3, Utc::now());
        assert_eq!(forward.version, "00003");
        assert!(forward
            .content
            .starts_with("-- Combined Migrations Version: 00003 (forward)\n"));
        assert!(forward
            .content
            .contains("-- Table: books\nDROP TABLE IF EXISTS books CASCADE;\n"));
        assert_eq!(undo.direction, MigrationDirection::Undo);
        assert!(undo.content.contains("CREATE TABLE IF NOT EXISTS books"));

        let path = manager.write_migration(&forward).unwrap();
        manager.write_migration(&undo).unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), forward.content);

        assert_eq!(manager.version_files(3).unwrap().len(), 2);
        let undo_files = manager.find_undo_files(3).unwrap();
        assert_eq!(undo_files.len(), 1);
        assert!(undo_files[0].ends_with("00003_undo_migration.sql"));
        assert!(manager.find_undo_files(2).unwrap().is_empty());
    }

    #[test]
    fn test_archive_version() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager_in(temp_dir.path());
        let migrations = temp_dir.path().join("migrations");
        fs::create_dir_all(&migrations).unwrap();
        fs::create_dir_all(temp_dir.path().join("history")).unwrap();

        fs::write(migrations.join("00002_migration.sql"), "-- forward").unwrap();
        fs::write(migrations.join("00002_undo_migration.sql"), "-- undo").unwrap();
        fs::write(migrations.join("00001_migration.sql"), "-- keep").unwrap();
        fs::write(manager.history_file(2), "{}").unwrap();

        let archived = manager.archive_version(2, 3).unwrap();
        assert_eq!(archived.len(), 3);

        let archive_dir = migrations.join("archived");
        assert!(archive_dir.join("3_00002_migration.sql").exists());
        assert!(archive_dir.join("3_00002_undo_migration.sql").exists());
        assert!(archive_dir.join("3_schema_state_00002.json").exists());
        assert!(migrations.join("00001_migration.sql").exists());
        assert!(!manager.history_file(2).exists());
    }

    #[test]
    fn test_list_versions() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager_in(temp_dir.path());
        let migrations = temp_dir.path().join("migrations");
        fs::create_dir_all(migrations.join("archived")).unwrap();

        fs::write(migrations.join("00001_migration.sql"), "").unwrap();
        fs::write(migrations.join("00001_undo_migration.sql"), "").unwrap();
        fs::write(migrations.join("00002_migration.sql"), "").unwrap();
        fs::write(migrations.join("README.md"), "").unwrap();

        let versions = manager.list_versions().unwrap();
        assert_eq!(versions.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(
            versions[&1],
            vec!["00001_migration.sql", "00001_undo_migration.sql"]
        );
    }
}
