use anyhow::Context;
use std::path::Path;

use tidemark_migrate::{
    database, Config, MigrationOutcome, MigrationRunner, RunOptions, SchemaState,
};

use super::report;

pub async fn run(config_path: &Path, options: RunOptions) -> anyhow::Result<()> {
    let config = Config::load(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    tracing::debug!("Using configuration {}", config_path.display());

    let version = config.current_version().map_err(report)?;
    if version == 0 && !options.dry_run {
        SchemaState::init(&config.paths.state_file).map_err(report)?;
    }

    let db = database::connect(&config.database).await.map_err(report)?;
    let runner = MigrationRunner::new(&config, db.as_ref());

    match runner.run_migrations(&options).await.map_err(report)? {
        MigrationOutcome::NoChanges { version } => {
            println!(
                "✅ No schema changes detected. Staying at version {}",
                config.version_prefix(version)
            );
        }
        MigrationOutcome::Applied(result) if result.dry_run => {
            println!(
                "🔍 [DRY RUN] Version {} would touch {} table(s): {}",
                config.version_prefix(result.version),
                result.tables.len(),
                result.tables.join(", ")
            );
            println!("   Forward statements: {}", result.forward_statements);
            println!("   Undo statements: {}", result.undo_statements);
        }
        MigrationOutcome::Applied(result) => {
            println!(
                "✅ Migrated from version {} to {}",
                config.version_prefix(result.previous_version),
                config.version_prefix(result.version)
            );
            println!("   Tables: {}", result.tables.join(", "));
            println!("   Forward: {}", result.forward_file.display());
            println!("   Undo: {}", result.undo_file.display());
            println!("   Took {}ms", result.execution_time_ms);
        }
    }

    Ok(())
}
