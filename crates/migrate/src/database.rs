//! Database backends
//!
//! The engine needs two things from a database: running a generated script
//! file, and reading the column catalog of a table. Scripts go through either
//! a sqlx pool or the external `psql` client.

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use sqlx::{Executor, Row};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tokio::process::Command;

use crate::config::{DatabaseClient, DatabaseConfig};
use crate::error::{MigrateError, MigrateResult};

/// Connection string that overrides the configured parameters
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

const COLUMNS_QUERY: &str = "SELECT column_name::text AS column_name, data_type::text AS data_type \
     FROM information_schema.columns \
     WHERE table_name = $1 AND table_schema = current_schema() \
     ORDER BY ordinal_position";

/// A column as reported by the database catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// Database operations used by migrations and verification
#[async_trait]
pub trait SchemaDatabase: Send + Sync {
    /// Execute every statement of a script file
    async fn execute_file(&self, path: &Path) -> MigrateResult<()>;

    /// Columns of `table` in the current schema; empty when the table is absent
    async fn table_columns(&self, table: &str) -> MigrateResult<Vec<ColumnInfo>>;
}

fn script_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// sqlx-backed database
pub struct PostgresDatabase {
    pool: PgPool,
}

impl PostgresDatabase {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect using `DATABASE_URL` when set, the configured parameters otherwise
    pub async fn connect(config: &DatabaseConfig) -> MigrateResult<Self> {
        let options = connect_options(config)?;
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| MigrateError::config(format!("Failed to connect to database: {}", e)))?;
        Ok(Self::new(pool))
    }
}

/// Connection options for the native backend
pub fn connect_options(config: &DatabaseConfig) -> MigrateResult<PgConnectOptions> {
    if let Ok(url) = env::var(DATABASE_URL_ENV) {
        return PgConnectOptions::from_str(&url)
            .map_err(|e| MigrateError::config(format!("Invalid {}: {}", DATABASE_URL_ENV, e)));
    }

    let ssl_mode = PgSslMode::from_str(&config.sslmode).map_err(|e| {
        MigrateError::config(format!("Invalid sslmode {}: {}", config.sslmode, e))
    })?;

    let mut options = PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .database(&config.name)
        .ssl_mode(ssl_mode);
    if !config.password.is_empty() {
        options = options.password(&config.password);
    }
    Ok(options)
}

#[async_trait]
impl SchemaDatabase for PostgresDatabase {
    async fn execute_file(&self, path: &Path) -> MigrateResult<()> {
        let name = script_name(path);
        let sql = fs::read_to_string(path)
            .map_err(|e| MigrateError::execution(&name, format!("Failed to read script: {}", e)))?;

        // Without bind arguments the script is sent as one simple query, so
        // PostgreSQL runs all of its statements in a single implicit transaction.
        self.pool
            .execute(sql.as_str())
            .await
            .map_err(|e| MigrateError::execution(&name, e))?;
        Ok(())
    }

    async fn table_columns(&self, table: &str) -> MigrateResult<Vec<ColumnInfo>> {
        let rows = sqlx::query(COLUMNS_QUERY)
            .bind(table.to_lowercase())
            .fetch_all(&self.pool)
            .await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            columns.push(ColumnInfo {
                name: row.try_get("column_name")?,
                data_type: row.try_get("data_type")?,
            });
        }
        Ok(columns)
    }
}

/// Runs scripts through the `psql` command-line client
pub struct PsqlClient {
    config: DatabaseConfig,
    program: String,
}

impl PsqlClient {
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            config,
            program: "psql".to_string(),
        }
    }

    /// Use a different client binary
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.arg("-v").arg("ON_ERROR_STOP=1");

        match env::var(DATABASE_URL_ENV) {
            Ok(url) => {
                command.arg("-d").arg(url);
            }
            Err(_) => {
                command
                    .arg("-h")
                    .arg(&self.config.host)
                    .arg("-p")
                    .arg(self.config.port.to_string())
                    .arg("-U")
                    .arg(&self.config.user)
                    .arg("-d")
                    .arg(&self.config.name)
                    .env("PGPASSWORD", &self.config.password)
                    .env("PGSSLMODE", &self.config.sslmode);
            }
        }
        command
    }

    async fn run(&self, name: &str, mut command: Command) -> MigrateResult<String> {
        let output = command.output().await.map_err(|e| {
            MigrateError::execution(name, format!("Failed to start {}: {}", self.program, e))
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        tracing::debug!("{} output for {}:\n{}{}", self.program, name, stdout, stderr);

        if !output.status.success() || stderr.contains("ERROR:") {
            return Err(MigrateError::execution(
                name,
                format!("{} exited with {}: {}", self.program, output.status, stderr.trim()),
            ));
        }
        Ok(stdout)
    }
}

#[async_trait]
impl SchemaDatabase for PsqlClient {
    async fn execute_file(&self, path: &Path) -> MigrateResult<()> {
        let name = script_name(path);
        let mut command = self.command();
        command.arg("-f").arg(path);
        self.run(&name, command).await?;
        Ok(())
    }

    async fn table_columns(&self, table: &str) -> MigrateResult<Vec<ColumnInfo>> {
        let query = format!(
            "SELECT column_name, data_type FROM information_schema.columns \
             WHERE table_name = '{}' AND table_schema = current_schema() \
             ORDER BY ordinal_position",
            table.to_lowercase().replace('\'', "''")
        );

        let mut command = self.command();
        command.args(["-A", "-t", "-F", "|", "-c"]).arg(query);
        let output = self.run("information_schema.columns", command).await?;

        Ok(parse_psql_columns(&output))
    }
}

/// Parse unaligned `name|type` rows
fn parse_psql_columns(output: &str) -> Vec<ColumnInfo> {
    output
        .lines()
        .filter_map(|line| line.split_once('|'))
        .map(|(name, data_type)| ColumnInfo::new(name.trim(), data_type.trim()))
        .collect()
}

/// Open the configured backend
pub async fn connect(config: &DatabaseConfig) -> MigrateResult<Box<dyn SchemaDatabase>> {
    match config.client {
        DatabaseClient::Native => {
            tracing::debug!("Connecting to {}:{} via sqlx", config.host, config.port);
            Ok(Box::new(PostgresDatabase::connect(config).await?))
        }
        DatabaseClient::Psql => {
            tracing::debug!("Using psql client for {}:{}", config.host, config.port);
            Ok(Box::new(PsqlClient::new(config.clone())))
        }
    }
}
