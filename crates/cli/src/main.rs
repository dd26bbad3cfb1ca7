mod commands;
mod logging;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::*;
use tidemark_migrate::{RunOptions, CONFIG_ENV_VAR, DEFAULT_CONFIG_PATH};

#[derive(Parser, Debug)]
#[command(name = "tidemark")]
#[command(about = "Model-driven PostgreSQL schema migrations")]
#[command(version)]
struct Cli {
    /// Roll back instead of migrating forward
    #[arg(short = 'r', long)]
    rollback: bool,

    /// Log generated SQL and client output
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Show what would happen without writing files or running SQL
    #[arg(short = 'd', long = "dry-run")]
    dry_run: bool,

    /// Rollback target version (defaults to the previous version)
    #[arg(short = 't', long, value_name = "N")]
    target: Option<u32>,

    /// Configuration file
    #[arg(short = 'c', long, env = CONFIG_ENV_VAR, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Require models to match the rollback target
    #[arg(long)]
    strict: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the recorded version, tables and pending model changes
    Status,

    /// Write a default configuration and an empty schema state
    Init,
}

impl Cli {
    fn run_options(&self) -> RunOptions {
        RunOptions::new()
            .dry_run(self.dry_run)
            .verbose(self.verbose)
            .rollback(self.rollback)
            .target(self.target)
            .strict(self.strict)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose)?;

    match cli.command {
        Some(Commands::Status) => status::run(&cli.config)?,
        Some(Commands::Init) => init::run(&cli.config)?,
        None if cli.rollback => rollback::run(&cli.config, cli.run_options()).await?,
        None => {
            if cli.target.is_some() {
                anyhow::bail!("--target is only valid together with --rollback");
            }
            migrate::run(&cli.config, cli.run_options()).await?;
        }
    }

    Ok(())
}
