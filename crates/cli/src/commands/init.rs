use anyhow::Context;
use std::path::Path;

use tidemark_migrate::{Config, SchemaState};

use super::report;

pub fn run(config_path: &Path) -> anyhow::Result<()> {
    if Config::write_default(config_path).map_err(report)? {
        println!("✅ Created {}", config_path.display());
    } else {
        println!("   {} already exists", config_path.display());
    }

    let config = Config::load(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    let state_file = &config.paths.state_file;
    if SchemaState::init(state_file).map_err(report)? {
        println!("✅ Created {}", state_file.display());
    } else {
        println!("   {} already exists", state_file.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_init_keeps_existing_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        let state_file = temp_dir.path().join("state").join("schema_state.json");
        let document = serde_json::json!({
            "paths": { "state_file": state_file },
            "version": 0,
            "team": "data"
        });
        fs::write(&config_path, document.to_string()).unwrap();

        run(&config_path).unwrap();

        let state = SchemaState::read(&state_file).unwrap();
        assert!(state.tables.is_empty());
        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&config_path).unwrap()).unwrap();
        assert_eq!(raw["team"], "data");

        // running again is harmless
        run(&config_path).unwrap();
    }

    #[test]
    fn test_default_config_round_trips() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");

        assert!(Config::write_default(&config_path).unwrap());
        let config = Config::load(&config_path).unwrap();
        assert_eq!(config.version, 0);
        assert_eq!(config.settings.version_prefix_length, 5);
        assert!(!Config::write_default(&config_path).unwrap());
    }
}
