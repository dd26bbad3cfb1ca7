//! Migration configuration
//!
//! The configuration is a single JSON document. Apart from the `version`
//! key it is read-only for the engine: `version` is the global pointer to the
//! current schema version and is rewritten after every successful forward
//! migration or rollback.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{MigrateError, MigrateResult};
use crate::naming::TableNaming;
use crate::state::write_json_atomic;

/// Default location of the configuration document
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Environment variable that overrides the configuration path
pub const CONFIG_ENV_VAR: &str = "TIDEMARK_CONFIG";

/// Top-level configuration document
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub database: DatabaseConfig,
    pub settings: SettingsConfig,
    /// Current schema version (the version pointer)
    pub version: u32,
    /// Explicit model list; when empty the model directory is scanned
    pub models: Vec<ModelEntry>,
    /// Require in-source models to match the rollback target
    pub strict_mode: bool,
    /// File this configuration was loaded from
    #[serde(skip)]
    source: Option<PathBuf>,
}

/// Filesystem locations used by the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// File holding the version pointer; defaults to the loaded config file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    pub model_dir: PathBuf,
    pub state_file: PathBuf,
    pub migration_dir: PathBuf,
    pub history_dir: PathBuf,
    /// Defaults to `<migration_dir>/archived`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived_dir: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            config_file: None,
            model_dir: PathBuf::from("src/models"),
            state_file: PathBuf::from("migrations/schema_state.json"),
            migration_dir: PathBuf::from("migrations"),
            history_dir: PathBuf::from("migrations/history"),
            archived_dir: None,
        }
    }
}

/// How SQL scripts reach the database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseClient {
    /// sqlx connection pool
    #[default]
    Native,
    /// External `psql` command-line client
    Psql,
}

/// Database connection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
    pub sslmode: String,
    pub client: DatabaseClient,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            name: "postgres".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            sslmode: "disable".to_string(),
            client: DatabaseClient::Native,
        }
    }
}

/// Generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    /// Width of the zero-padded version prefix
    pub version_prefix_length: usize,
    /// Base name of generated migration files
    pub migration_file: String,
    pub table_naming: TableNaming,
    pub pluralize_tables: bool,
    /// Struct names that never become tables
    pub ignored_models: Vec<String>,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            version_prefix_length: 5,
            migration_file: "migration.sql".to_string(),
            table_naming: TableNaming::SnakeCase,
            pluralize_tables: true,
            ignored_models: Vec::new(),
        }
    }
}

/// Explicitly configured model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelEntry {
    /// Source file, relative to the model directory
    pub source_file: PathBuf,
    pub struct_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_file: Option<String>,
}

impl Config {
    /// Load and validate a configuration document
    pub fn load(path: impl AsRef<Path>) -> MigrateResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            MigrateError::config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let mut config: Config = serde_json::from_str(&content).map_err(|e| {
            MigrateError::config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.source = Some(path.to_path_buf());
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> MigrateResult<()> {
        if self.settings.version_prefix_length == 0 {
            return Err(MigrateError::config(
                "settings.version_prefix_length must be greater than 0",
            ));
        }
        if self.settings.migration_file.trim().is_empty() {
            return Err(MigrateError::config("settings.migration_file must not be empty"));
        }

        let required = [
            ("paths.model_dir", &self.paths.model_dir),
            ("paths.state_file", &self.paths.state_file),
            ("paths.migration_dir", &self.paths.migration_dir),
            ("paths.history_dir", &self.paths.history_dir),
        ];
        for (field, value) in required {
            if value.as_os_str().is_empty() {
                return Err(MigrateError::config(format!("{} must not be empty", field)));
            }
        }

        for model in &self.models {
            if model.struct_name.trim().is_empty() {
                return Err(MigrateError::config(format!(
                    "model entry for {} has an empty struct_name",
                    model.source_file.display()
                )));
            }
        }

        Ok(())
    }

    /// Write a default configuration unless `path` already exists
    pub fn write_default(path: impl AsRef<Path>) -> MigrateResult<bool> {
        let path = path.as_ref();
        if path.exists() {
            return Ok(false);
        }
        write_json_atomic(path, &Config::default())?;
        Ok(true)
    }

    /// Attach the path this configuration belongs to
    pub fn with_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(path.into());
        self
    }

    /// File holding the version pointer
    pub fn version_file(&self) -> PathBuf {
        self.paths
            .config_file
            .clone()
            .or_else(|| self.source.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Directory receiving archived files after a rollback
    pub fn archived_dir(&self) -> PathBuf {
        self.paths
            .archived_dir
            .clone()
            .unwrap_or_else(|| self.paths.migration_dir.join("archived"))
    }

    /// Zero-padded version prefix
    pub fn version_prefix(&self, version: u32) -> String {
        format!(
            "{:0width$}",
            version,
            width = self.settings.version_prefix_length
        )
    }

    /// Create the directories the engine writes into
    pub fn ensure_dirs(&self) -> MigrateResult<()> {
        for dir in [&self.paths.migration_dir, &self.paths.history_dir] {
            fs::create_dir_all(dir).map_err(|e| {
                MigrateError::config(format!(
                    "Failed to create directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Read the current version pointer from disk
    pub fn current_version(&self) -> MigrateResult<u32> {
        read_version(self.version_file())
    }
}

#[derive(Deserialize)]
struct VersionOnly {
    #[serde(default)]
    version: u32,
}

/// Read just the `version` key of a configuration document
pub fn read_version(path: impl AsRef<Path>) -> MigrateResult<u32> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        MigrateError::config(format!("Failed to read {}: {}", path.display(), e))
    })?;
    let parsed: VersionOnly = serde_json::from_str(&content).map_err(|e| {
        MigrateError::config(format!("Failed to parse {}: {}", path.display(), e))
    })?;
    Ok(parsed.version)
}

/// Rewrite the `version` key, preserving every other key of the document
pub fn write_version(path: impl AsRef<Path>, version: u32) -> MigrateResult<()> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    let mut document: serde_json::Value = serde_json::from_str(&content)?;
    let object = document.as_object_mut().ok_or_else(|| {
        MigrateError::config(format!("{} is not a JSON object", path.display()))
    })?;
    object.insert("version".to_string(), serde_json::Value::from(version));
    write_json_atomic(path, &document)
}
