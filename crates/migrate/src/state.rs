//! Schema state store
//!
//! The state file records the field set the engine last generated DDL for,
//! per table, plus the number of rollbacks performed so far. History
//! snapshots use the same document format.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

use crate::error::{MigrateError, MigrateResult};
use crate::fields::Field;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateMeta {
    #[serde(default)]
    pub rollback_count: u32,
}

/// Last recorded field set per table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaState {
    #[serde(default)]
    pub meta: StateMeta,
    #[serde(default)]
    pub tables: BTreeMap<String, Vec<Field>>,
}

impl SchemaState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the current state.
    ///
    /// A missing or unreadable file is only acceptable before the first
    /// migration, when the version pointer is still 0.
    pub fn load(path: impl AsRef<Path>, current_version: u32) -> MigrateResult<Self> {
        let path = path.as_ref();
        match Self::read(path) {
            Ok(state) => Ok(state),
            Err(e) if current_version == 0 => {
                tracing::warn!(
                    "Starting from an empty schema state ({}): {}",
                    path.display(),
                    e
                );
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Read a state or snapshot file, failing on any problem
    pub fn read(path: impl AsRef<Path>) -> MigrateResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| MigrateError::state(path, format!("Failed to read: {}", e)))?;
        serde_json::from_str(&content)
            .map_err(|e| MigrateError::state(path, format!("Failed to parse: {}", e)))
    }

    /// Pretty-print the state and atomically replace `path`
    pub fn save(&self, path: impl AsRef<Path>) -> MigrateResult<()> {
        let path = path.as_ref();
        write_json_atomic(path, self)
            .map_err(|e| MigrateError::state(path, format!("Failed to save: {}", e)))
    }

    /// Write an empty state unless one already exists
    pub fn init(path: impl AsRef<Path>) -> MigrateResult<bool> {
        let path = path.as_ref();
        if path.exists() {
            return Ok(false);
        }
        Self::default().save(path)?;
        tracing::info!("Initialized schema state at {}", path.display());
        Ok(true)
    }

    pub fn rollback_count(&self) -> u32 {
        self.meta.rollback_count
    }

    pub fn fields(&self, table: &str) -> Option<&[Field]> {
        self.tables.get(table).map(Vec::as_slice)
    }

    /// Structural equality, ignoring the rollback counter
    pub fn same_tables(&self, other: &SchemaState) -> bool {
        self.tables == other.tables
    }
}

/// Serialize `value` as pretty JSON into a temp file next to `path`, then
/// rename it over `path`. A failure leaves any previous file untouched.
pub(crate) fn write_json_atomic<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> MigrateResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut temp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut temp, value)?;
    temp.write_all(b"\n")?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| MigrateError::Io(e.error))?;
    Ok(())
}
