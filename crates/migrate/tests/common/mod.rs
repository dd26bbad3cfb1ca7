//! Shared fixtures: a temporary project layout and an in-memory database
//! that interprets the generated DDL.

#![allow(dead_code)]

use async_trait::async_trait;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

use tidemark_migrate::{
    ColumnInfo, Config, MigrateError, MigrateResult, SchemaDatabase, SchemaState,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub sql_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Constraint {
    name: String,
    column: String,
    references: String,
}

#[derive(Debug, Default)]
struct Simulation {
    tables: BTreeMap<String, Vec<Column>>,
    constraints: BTreeMap<String, Vec<Constraint>>,
    executed: Vec<String>,
    fail_on: Option<String>,
}

struct Patterns {
    create: Regex,
    drop_table: Regex,
    add_column: Regex,
    drop_column: Regex,
    alter_type: Regex,
    add_constraint: Regex,
    drop_constraint: Regex,
    inline_constraint: Regex,
}

impl Patterns {
    fn new() -> Self {
        Self {
            create: Regex::new(r"(?s)^CREATE TABLE IF NOT EXISTS (\w+) \((.*)\)$").unwrap(),
            drop_table: Regex::new(r"^DROP TABLE IF EXISTS (\w+) CASCADE$").unwrap(),
            add_column: Regex::new(r"^ALTER TABLE (\w+) ADD COLUMN IF NOT EXISTS (.+)$").unwrap(),
            drop_column: Regex::new(r"^ALTER TABLE (\w+) DROP COLUMN IF EXISTS (\w+) CASCADE$")
                .unwrap(),
            alter_type: Regex::new(r"^ALTER TABLE (\w+) ALTER COLUMN (\w+) TYPE (.+) USING (\w+)::(.+)$")
                .unwrap(),
            add_constraint: Regex::new(
                r"^ALTER TABLE (\w+) ADD CONSTRAINT (\w+) FOREIGN KEY \((\w+)\) REFERENCES (\w+)\((\w+)\)$",
            )
            .unwrap(),
            drop_constraint: Regex::new(r"^ALTER TABLE (\w+) DROP CONSTRAINT IF EXISTS (\w+)$")
                .unwrap(),
            inline_constraint: Regex::new(
                r"^CONSTRAINT (\w+) FOREIGN KEY \((\w+)\) REFERENCES (\w+)\((\w+)\)$",
            )
            .unwrap(),
        }
    }
}

/// Parse `<name> <type>[ PRIMARY KEY| NOT NULL][ DEFAULT v]`
fn parse_column(definition: &str) -> Result<Column, String> {
    let (name, rest) = definition
        .trim()
        .split_once(' ')
        .ok_or_else(|| format!("bad column definition: {}", definition))?;
    let mut sql_type = rest;
    for marker in [" PRIMARY KEY", " NOT NULL", " DEFAULT "] {
        if let Some(idx) = sql_type.find(marker) {
            sql_type = &sql_type[..idx];
        }
    }
    Ok(Column {
        name: name.to_lowercase(),
        sql_type: sql_type.trim().to_string(),
    })
}

/// Statements of a script, with comment lines removed
pub fn statements(script: &str) -> Vec<String> {
    let body: Vec<&str> = script
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect();
    body.join("\n")
        .split(';')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Simulation {
    fn apply(&mut self, statement: &str, p: &Patterns) -> Result<(), String> {
        if let Some(c) = p.create.captures(statement) {
            let table = c[1].to_lowercase();
            if self.tables.contains_key(&table) {
                return Ok(());
            }
            let mut columns = Vec::new();
            let mut constraints = Vec::new();
            for part in c[2].split(",\n") {
                let part = part.trim();
                if part.is_empty() {
                    continue;
                }
                if let Some(k) = p.inline_constraint.captures(part) {
                    constraints.push((k[1].to_string(), k[2].to_lowercase(), k[3].to_lowercase()));
                } else {
                    columns.push(parse_column(part)?);
                }
            }
            self.tables.insert(table.clone(), columns);
            for (name, column, references) in constraints {
                self.add_constraint(&table, &name, &column, &references)?;
            }
            return Ok(());
        }

        if let Some(c) = p.drop_table.captures(statement) {
            let table = c[1].to_lowercase();
            self.tables.remove(&table);
            self.constraints.remove(&table);
            for list in self.constraints.values_mut() {
                list.retain(|k| k.references != table);
            }
            return Ok(());
        }

        if let Some(c) = p.add_column.captures(statement) {
            let table = c[1].to_lowercase();
            let column = parse_column(&c[2])?;
            let columns = self
                .tables
                .get_mut(&table)
                .ok_or_else(|| format!("relation {} does not exist", table))?;
            if !columns.iter().any(|existing| existing.name == column.name) {
                columns.push(column);
            }
            return Ok(());
        }

        if let Some(c) = p.drop_column.captures(statement) {
            let table = c[1].to_lowercase();
            let column = c[2].to_lowercase();
            let columns = self
                .tables
                .get_mut(&table)
                .ok_or_else(|| format!("relation {} does not exist", table))?;
            columns.retain(|existing| existing.name != column);
            if let Some(list) = self.constraints.get_mut(&table) {
                list.retain(|k| k.column != column);
            }
            return Ok(());
        }

        if let Some(c) = p.alter_type.captures(statement) {
            let table = c[1].to_lowercase();
            let column = c[2].to_lowercase();
            if c[3] != c[5] || !c[4].eq_ignore_ascii_case(&c[2]) {
                return Err(format!("inconsistent cast in {}", statement));
            }
            let target = self
                .tables
                .get_mut(&table)
                .and_then(|columns| columns.iter_mut().find(|existing| existing.name == column))
                .ok_or_else(|| format!("column {} of {} does not exist", column, table))?;
            target.sql_type = c[3].to_string();
            return Ok(());
        }

        if let Some(c) = p.add_constraint.captures(statement) {
            return self.add_constraint(
                &c[1].to_lowercase(),
                &c[2],
                &c[3].to_lowercase(),
                &c[4].to_lowercase(),
            );
        }

        if let Some(c) = p.drop_constraint.captures(statement) {
            let table = c[1].to_lowercase();
            if !self.tables.contains_key(&table) {
                return Err(format!("relation {} does not exist", table));
            }
            if let Some(list) = self.constraints.get_mut(&table) {
                list.retain(|k| k.name != c[2]);
            }
            return Ok(());
        }

        Err(format!("unsupported statement: {}", statement))
    }

    fn add_constraint(
        &mut self,
        table: &str,
        name: &str,
        column: &str,
        references: &str,
    ) -> Result<(), String> {
        if !self.tables.contains_key(references) {
            return Err(format!("referenced relation {} does not exist", references));
        }
        let has_column = self
            .tables
            .get(table)
            .map(|columns| columns.iter().any(|c| c.name == column))
            .unwrap_or(false);
        if !has_column {
            return Err(format!("column {} of {} does not exist", column, table));
        }
        let list = self.constraints.entry(table.to_string()).or_default();
        if list.iter().any(|k| k.name == name) {
            return Err(format!("constraint {} already exists", name));
        }
        list.push(Constraint {
            name: name.to_string(),
            column: column.to_string(),
            references: references.to_string(),
        });
        Ok(())
    }
}

/// Catalog spelling of a generated column type
fn catalog_type(sql_type: &str) -> String {
    match sql_type {
        "VARCHAR" => "character varying".to_string(),
        "TIMESTAMP" => "timestamp without time zone".to_string(),
        "FLOAT" => "double precision".to_string(),
        other => other.to_lowercase(),
    }
}

/// In-memory PostgreSQL stand-in that executes generated DDL
pub struct SimulatedDatabase {
    inner: Mutex<Simulation>,
    patterns: Patterns,
}

impl SimulatedDatabase {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Simulation::default()),
            patterns: Patterns::new(),
        }
    }

    /// Apply a script directly, bypassing the file system
    pub fn apply_sql(&self, script: &str) -> Result<(), String> {
        let mut sim = self.inner.lock().unwrap();
        for statement in statements(script) {
            sim.apply(&statement, &self.patterns)?;
        }
        Ok(())
    }

    /// File names of executed scripts, in order
    pub fn executed(&self) -> Vec<String> {
        self.inner.lock().unwrap().executed.clone()
    }

    pub fn fail_on(&self, script: &str) {
        self.inner.lock().unwrap().fail_on = Some(script.to_string());
    }

    pub fn tables(&self) -> Vec<String> {
        self.inner.lock().unwrap().tables.keys().cloned().collect()
    }

    /// `(name, type)` pairs of a table
    pub fn columns(&self, table: &str) -> Option<Vec<(String, String)>> {
        self.inner.lock().unwrap().tables.get(table).map(|columns| {
            columns
                .iter()
                .map(|c| (c.name.clone(), c.sql_type.clone()))
                .collect()
        })
    }

    pub fn has_constraint(&self, table: &str, name: &str) -> bool {
        self.inner
            .lock()
            .unwrap()
            .constraints
            .get(table)
            .map(|list| list.iter().any(|k| k.name == name))
            .unwrap_or(false)
    }

    /// Change a column behind the engine's back
    pub fn tamper_column_type(&self, table: &str, column: &str, sql_type: &str) {
        let mut sim = self.inner.lock().unwrap();
        if let Some(existing) = sim
            .tables
            .get_mut(table)
            .and_then(|columns| columns.iter_mut().find(|c| c.name == column))
        {
            existing.sql_type = sql_type.to_string();
        }
    }
}

#[async_trait]
impl SchemaDatabase for SimulatedDatabase {
    async fn execute_file(&self, path: &Path) -> MigrateResult<()> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let script = fs::read_to_string(path)?;

        {
            let mut sim = self.inner.lock().unwrap();
            sim.executed.push(name.clone());
            if sim.fail_on.as_deref() == Some(name.as_str()) {
                return Err(MigrateError::execution(&name, "simulated failure"));
            }
        }

        self.apply_sql(&script)
            .map_err(|e| MigrateError::execution(&name, e))
    }

    async fn table_columns(&self, table: &str) -> MigrateResult<Vec<ColumnInfo>> {
        Ok(self
            .columns(&table.to_lowercase())
            .unwrap_or_default()
            .into_iter()
            .map(|(name, sql_type)| ColumnInfo::new(name, catalog_type(&sql_type)))
            .collect())
    }
}

/// A throwaway project: config, models, state and migration directories
pub struct Project {
    pub dir: TempDir,
    pub config_path: PathBuf,
}

impl Project {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("models")).unwrap();

        let config = serde_json::json!({
            "paths": {
                "model_dir": root.join("models"),
                "state_file": root.join("schema_state.json"),
                "migration_dir": root.join("migrations"),
                "history_dir": root.join("migrations").join("history"),
            },
            "database": { "name": "shop", "user": "shop" },
            "settings": { "version_prefix_length": 5 },
            "version": 0,
            "strict_mode": false,
            "deployment": { "owner": "ops" }
        });
        let config_path = root.join("config.json");
        fs::write(&config_path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        Self { dir, config_path }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Edit the raw configuration document in place
    pub fn update_config(&self, edit: impl FnOnce(&mut serde_json::Value)) {
        let mut document: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&self.config_path).unwrap()).unwrap();
        edit(&mut document);
        fs::write(
            &self.config_path,
            serde_json::to_string_pretty(&document).unwrap(),
        )
        .unwrap();
    }

    pub fn raw_config(&self) -> serde_json::Value {
        serde_json::from_str(&fs::read_to_string(&self.config_path).unwrap()).unwrap()
    }

    pub fn config(&self) -> Config {
        Config::load(&self.config_path).unwrap()
    }

    pub fn write_model(&self, file: &str, source: &str) {
        fs::write(self.root().join("models").join(file), source).unwrap();
    }

    pub fn remove_model(&self, file: &str) {
        fs::remove_file(self.root().join("models").join(file)).unwrap();
    }

    pub fn version(&self) -> u32 {
        self.config().current_version().unwrap()
    }

    pub fn state(&self) -> SchemaState {
        SchemaState::read(self.root().join("schema_state.json")).unwrap()
    }

    pub fn migration_dir(&self) -> PathBuf {
        self.root().join("migrations")
    }

    pub fn migration_file(&self, name: &str) -> PathBuf {
        self.migration_dir().join(name)
    }

    pub fn history_file(&self, prefix: &str) -> PathBuf {
        self.migration_dir()
            .join("history")
            .join(format!("schema_state_{}.json", prefix))
    }

    pub fn archived_file(&self, name: &str) -> PathBuf {
        self.migration_dir().join("archived").join(name)
    }

    pub fn read(&self, path: impl AsRef<Path>) -> String {
        fs::read_to_string(path).unwrap()
    }
}

pub const BOOK_V1: &str = r#"
pub struct Book {
    pub ID: i32,
    pub Title: String,
    pub Author: String,
}
"#;

pub const BOOK_V2: &str = r#"
pub struct Book {
    pub ID: i32,
    pub Title: String,
    pub Author: String,
    pub Description: String,
}
"#;

pub const SHOP_V3: &str = r#"
pub struct Product {
    pub ID: i32,
    pub Name: String,
    pub Price: f64,
}

pub struct Variant {
    pub ID: i32,
    pub Product_ID: i32,
    #[migrate(default = 0, not_null)]
    pub Stock: i32,
}
"#;
