use anyhow::Context;
use std::path::Path;

use tidemark_migrate::{status, Config};

use super::report;

pub fn run(config_path: &Path) -> anyhow::Result<()> {
    let config = Config::load(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    let report_data = status(&config).map_err(report)?;

    println!("📊 Migration Status");
    println!("   Version: {}", report_data.version_prefix);
    println!("   Rollback count: {}", report_data.rollback_count);

    if report_data.tables.is_empty() {
        println!("   No tables recorded");
    } else {
        println!("   Tables:");
        for table in &report_data.tables {
            println!("     {} ({} columns)", table.name, table.columns);
        }
    }

    if !report_data.versions.is_empty() {
        println!("   Migration files:");
        for (version, files) in &report_data.versions {
            let marker = if *version <= report_data.version { "✅" } else { "⏳" };
            println!("     {} {}: {}", marker, config.version_prefix(*version), files.join(", "));
        }
    }

    for model in &report_data.models {
        match &model.output_file {
            Some(out) => println!(
                "   Model {} -> {} ({})",
                model.declaration_name, model.table_name, out
            ),
            None => println!("   Model {} -> {}", model.declaration_name, model.table_name),
        }
    }

    let missing = report_data.missing_undo();
    if !missing.is_empty() {
        let prefixes: Vec<String> = missing.iter().map(|v| config.version_prefix(*v)).collect();
        println!("⚠️ Missing undo scripts for: {}", prefixes.join(", "));
    }

    if report_data.is_up_to_date() {
        println!("✅ Models match the recorded state");
    } else {
        println!(
            "⏳ Pending changes: {} statement(s) on {}",
            report_data.pending_statements,
            report_data.pending_tables.join(", ")
        );
    }

    Ok(())
}
