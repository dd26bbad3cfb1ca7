//! Model discovery
//!
//! Finds the declarations that represent persisted tables, either from the
//! explicit `models` list of the configuration or by scanning the model
//! directory for structs with named fields.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{Config, ModelEntry};
use crate::error::{MigrateError, MigrateResult};
use crate::fields::{Field, FieldExtractor, ParsedStruct};
use crate::naming::NamingStrategy;

/// Where a model comes from and which table it maps to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    pub source_file: PathBuf,
    pub declaration_name: String,
    pub table_name: String,
    pub output_file: Option<String>,
}

/// A model together with its extracted fields
#[derive(Debug, Clone)]
pub struct DiscoveredModel {
    pub config: ModelConfig,
    pub fields: Vec<Field>,
}

impl DiscoveredModel {
    pub fn table_name(&self) -> &str {
        &self.config.table_name
    }
}

/// Locates models for a configuration
pub struct ModelLocator<'a> {
    config: &'a Config,
    naming: NamingStrategy,
    extractor: FieldExtractor,
}

impl<'a> ModelLocator<'a> {
    pub fn new(config: &'a Config) -> Self {
        let naming = NamingStrategy::new(
            config.settings.table_naming,
            config.settings.pluralize_tables,
        );
        Self {
            config,
            naming,
            extractor: FieldExtractor::new(naming),
        }
    }

    /// Discover every model. Any unreadable source aborts discovery.
    pub fn locate(&self) -> MigrateResult<Vec<DiscoveredModel>> {
        let models = if self.config.models.is_empty() {
            self.scan()?
        } else {
            self.from_entries(&self.config.models)?
        };

        if models.is_empty() {
            return Err(MigrateError::extraction(
                &self.config.paths.model_dir,
                "no models found",
            ));
        }

        let mut seen: HashMap<&str, &str> = HashMap::new();
        for model in &models {
            if let Some(other) = seen.insert(model.table_name(), &model.config.declaration_name) {
                return Err(MigrateError::config(format!(
                    "models {} and {} both map to table {}",
                    other,
                    model.config.declaration_name,
                    model.table_name()
                )));
            }
        }

        tracing::debug!("Discovered {} models", models.len());
        Ok(models)
    }

    fn from_entries(&self, entries: &[ModelEntry]) -> MigrateResult<Vec<DiscoveredModel>> {
        let mut parsed_files: BTreeMap<PathBuf, Vec<ParsedStruct>> = BTreeMap::new();
        let mut models = Vec::with_capacity(entries.len());

        for entry in entries {
            let path = self.config.paths.model_dir.join(&entry.source_file);
            if !parsed_files.contains_key(&path) {
                let parsed = self.extractor.parse_file(&path)?;
                parsed_files.insert(path.clone(), parsed);
            }

            let parsed = parsed_files
                .get(&path)
                .and_then(|structs| structs.iter().find(|s| s.name == entry.struct_name))
                .ok_or_else(|| {
                    MigrateError::extraction(
                        &path,
                        format!("struct {} with named fields not found", entry.struct_name),
                    )
                })?;

            let table_name = entry
                .table_name
                .clone()
                .filter(|name| !name.trim().is_empty())
                .or_else(|| parsed.tags.table.clone())
                .unwrap_or_else(|| self.naming.table_name(&parsed.name));

            models.push(DiscoveredModel {
                config: ModelConfig {
                    source_file: entry.source_file.clone(),
                    declaration_name: parsed.name.clone(),
                    table_name,
                    output_file: entry.out_file.clone(),
                },
                fields: parsed.fields.clone(),
            });
        }

        Ok(models)
    }

    fn scan(&self) -> MigrateResult<Vec<DiscoveredModel>> {
        let root = &self.config.paths.model_dir;
        let mut files = Vec::new();
        collect_source_files(root, &mut files)?;
        files.sort();

        let ignored = &self.config.settings.ignored_models;
        let mut models = Vec::new();

        for path in files {
            for parsed in self.extractor.parse_file(&path)? {
                if parsed.tags.skip || ignored.iter().any(|name| name == &parsed.name) {
                    tracing::debug!("Ignoring declaration {}", parsed.name);
                    continue;
                }

                let table_name = parsed
                    .tags
                    .table
                    .clone()
                    .unwrap_or_else(|| self.naming.table_name(&parsed.name));
                let source_file = path.strip_prefix(root).unwrap_or(&path).to_path_buf();

                models.push(DiscoveredModel {
                    config: ModelConfig {
                        source_file,
                        declaration_name: parsed.name,
                        table_name,
                        output_file: None,
                    },
                    fields: parsed.fields,
                });
            }
        }

        Ok(models)
    }
}

/// Recursively collect `.rs` files below `dir`
fn collect_source_files(dir: &Path, files: &mut Vec<PathBuf>) -> MigrateResult<()> {
    let entries = fs::read_dir(dir).map_err(|e| {
        MigrateError::extraction(dir, format!("Failed to read model directory: {}", e))
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| {
            MigrateError::extraction(dir, format!("Failed to read directory entry: {}", e))
        })?;
        let path = entry.path();

        if path.is_dir() {
            collect_source_files(&path, files)?;
        } else if path.extension().map(|ext| ext == "rs").unwrap_or(false) {
            files.push(path);
        }
    }

    Ok(())
}
