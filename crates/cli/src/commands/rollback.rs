use anyhow::Context;
use std::path::Path;

use tidemark_migrate::{database, Config, MigrationRollback, MigrationRunner, RunOptions};

use super::report;

pub async fn run(config_path: &Path, options: RunOptions) -> anyhow::Result<()> {
    let config = Config::load(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    tracing::debug!("Using configuration {}", config_path.display());

    let db = database::connect(&config.database).await.map_err(report)?;
    let runner = MigrationRunner::new(&config, db.as_ref());
    let result = runner.rollback(&options).await.map_err(report)?;

    let versions: Vec<String> = result
        .rolled_back
        .iter()
        .map(|v| config.version_prefix(*v))
        .collect();

    if result.dry_run {
        println!(
            "🔍 [DRY RUN] Would roll back from version {} to {}",
            config.version_prefix(result.from_version),
            config.version_prefix(result.to_version)
        );
        println!("   Undo order: {}", versions.join(", "));
        return Ok(());
    }

    println!(
        "⏪ Rolled back from version {} to {}",
        config.version_prefix(result.from_version),
        config.version_prefix(result.to_version)
    );
    println!("   Undone: {}", versions.join(", "));
    println!("   Rollback count: {}", result.rollback_count);
    for file in &result.archived_files {
        println!("   📦 {}", file.display());
    }
    println!("   Took {}ms", result.execution_time_ms);

    Ok(())
}
