//! # tidemark-migrate: model-driven schema migrations
//!
//! Infers table definitions from Rust model structs, diffs them against the
//! last recorded schema state, writes versioned forward and undo scripts,
//! applies them to PostgreSQL and rolls back to any recorded version.
//!
//! ```ignore
//! let config = Config::load("config.json")?;
//! let db = database::connect(&config.database).await?;
//! let outcome = tidemark_migrate::run(&config, &RunOptions::new(), db.as_ref()).await?;
//! ```

pub mod config;
pub mod database;
pub mod definitions;
pub mod diff;
pub mod discovery;
pub mod error;
pub mod fields;
pub mod manager;
pub mod naming;
pub mod options;
pub mod rollback;
pub mod runner;
pub mod schema_builder;
pub mod state;
pub mod status;
pub mod verify;

// Re-export core types
pub use config::{Config, DatabaseClient, DatabaseConfig, ModelEntry, CONFIG_ENV_VAR, DEFAULT_CONFIG_PATH};
pub use database::{ColumnInfo, PostgresDatabase, PsqlClient, SchemaDatabase};
pub use definitions::*;
pub use diff::{diff, generate, ChangeSet, TableDiff};
pub use discovery::{DiscoveredModel, ModelConfig, ModelLocator};
pub use error::{MigrateError, MigrateResult};
pub use fields::{Field, FieldExtractor};
pub use manager::{MigrationConfig, MigrationManager};
pub use naming::{NamingStrategy, TableNaming};
pub use options::RunOptions;
pub use rollback::MigrationRollback;
pub use runner::MigrationRunner;
pub use state::SchemaState;
pub use status::{status, StatusReport};

/// Run the forward or rollback path selected by `options`
pub async fn run(
    config: &Config,
    options: &RunOptions,
    db: &dyn SchemaDatabase,
) -> MigrateResult<RunOutcome> {
    let runner = MigrationRunner::new(config, db);
    if options.rollback {
        Ok(RunOutcome::RolledBack(runner.rollback(options).await?))
    } else {
        Ok(RunOutcome::Migrated(runner.run_migrations(options).await?))
    }
}
