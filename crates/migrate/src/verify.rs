//! Schema verification
//!
//! Two read-only checks: the live database must contain every column the
//! recorded state expects, and in strict mode the in-source models must match
//! the snapshot of a rollback target.

use std::collections::HashMap;

use crate::database::SchemaDatabase;
use crate::discovery::DiscoveredModel;
use crate::error::{MigrateError, MigrateResult};
use crate::fields::Field;
use crate::state::SchemaState;

const COMPATIBLE_TYPES: &[&[&str]] = &[
    &["CHAR", "VARCHAR", "TEXT", "CHARACTER", "CHARACTER VARYING"],
    &["INT", "INTEGER", "BIGINT", "SMALLINT", "INT2", "INT4", "INT8"],
    &["FLOAT", "REAL", "DOUBLE PRECISION", "FLOAT4", "FLOAT8"],
    &["TIMESTAMP", "TIMESTAMPTZ", "DATE"],
    &["BOOL", "BOOLEAN"],
];

fn normalize_type(sql_type: &str) -> String {
    let upper = sql_type.trim().to_uppercase();
    let base = upper.split('(').next().unwrap_or(&upper).trim();
    let base = base
        .strip_suffix(" WITHOUT TIME ZONE")
        .or_else(|| base.strip_suffix(" WITH TIME ZONE"))
        .unwrap_or(base);
    base.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whether a catalog type can hold values of the expected SQL type
pub fn type_matches(db_type: &str, expected_type: &str) -> bool {
    let db = normalize_type(db_type);
    let expected = normalize_type(expected_type);

    if db == expected {
        return true;
    }

    COMPATIBLE_TYPES
        .iter()
        .any(|group| group.contains(&db.as_str()) && group.contains(&expected.as_str()))
}

/// Check every recorded table against the live column catalog
pub async fn verify_live_schema(db: &dyn SchemaDatabase, state: &SchemaState) -> MigrateResult<()> {
    for (table, expected) in &state.tables {
        if expected.is_empty() {
            continue;
        }

        let columns = db.table_columns(table).await?;
        let actual: HashMap<String, String> = columns
            .into_iter()
            .map(|column| (column.name.to_lowercase(), column.data_type))
            .collect();

        for field in expected {
            match actual.get(&field.name.to_lowercase()) {
                None => {
                    return Err(MigrateError::verification(format!(
                        "table {}: missing column {} (expected {})",
                        table, field.name, field.sql_type
                    )));
                }
                Some(db_type) if !type_matches(db_type, &field.sql_type) => {
                    return Err(MigrateError::verification(format!(
                        "table {}: type mismatch for {}: database has {}, state expects {}",
                        table, field.name, db_type, field.sql_type
                    )));
                }
                Some(_) => {}
            }
        }

        tracing::debug!("Table {} matches the recorded state", table);
    }

    Ok(())
}

/// Same field names and source types, in the same order
pub fn fields_match(a: &[Field], b: &[Field]) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b)
            .all(|(x, y)| x.name == y.name && x.source_type == y.source_type)
}

/// Strict-mode gate: every model must match the target snapshot
pub fn verify_models_match_target(
    models: &[DiscoveredModel],
    target: &SchemaState,
    target_version: u32,
) -> MigrateResult<()> {
    for model in models {
        let recorded = target.fields(model.table_name()).unwrap_or(&[]);
        if !fields_match(&model.fields, recorded) {
            return Err(MigrateError::verification(format!(
                "strict mode: model {} doesn't match target version {}",
                model.config.declaration_name, target_version
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::ColumnInfo;
    use crate::discovery::ModelConfig;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};

    struct Catalog(HashMap<String, Vec<ColumnInfo>>);

    #[async_trait]
    impl SchemaDatabase for Catalog {
        async fn execute_file(&self, _path: &Path) -> MigrateResult<()> {
            Ok(())
        }

        async fn table_columns(&self, table: &str) -> MigrateResult<Vec<ColumnInfo>> {
            Ok(self.0.get(table).cloned().unwrap_or_default())
        }
    }

    fn books_state() -> SchemaState {
        let mut state = SchemaState::default();
        state.tables.insert(
            "books".to_string(),
            vec![
                Field::new("ID", "i32").primary(),
                Field::new("Title", "String"),
                Field::new("Published", "NaiveDateTime"),
            ],
        );
        state
    }

    #[test]
    fn test_type_matches() {
        assert!(type_matches("character varying", "VARCHAR"));
        assert!(type_matches("VARCHAR(255)", "TEXT"));
        assert!(type_matches("bigint", "INTEGER"));
        assert!(type_matches("double precision", "FLOAT"));
        assert!(type_matches("timestamp without time zone", "TIMESTAMP"));
        assert!(type_matches("timestamp with time zone", "TIMESTAMP"));
        assert!(type_matches("boolean", "BOOLEAN"));
        assert!(!type_matches("integer", "VARCHAR"));
        assert!(!type_matches("boolean", "TEXT"));
    }

    #[tokio::test]
    async fn test_live_schema_matches() {
        let mut catalog = HashMap::new();
        catalog.insert(
            "books".to_string(),
            vec![
                ColumnInfo::new("id", "integer"),
                ColumnInfo::new("title", "character varying"),
                ColumnInfo::new("published", "timestamp without time zone"),
                ColumnInfo::new("extra", "text"),
            ],
        );

        verify_live_schema(&Catalog(catalog), &books_state())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_live_schema_reports_drift() {
        let mut catalog = HashMap::new();
        catalog.insert(
            "books".to_string(),
            vec![
                ColumnInfo::new("id", "integer"),
                ColumnInfo::new("title", "integer"),
                ColumnInfo::new("published", "date"),
            ],
        );
        let err = verify_live_schema(&Catalog(catalog), &books_state())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("type mismatch for Title"));

        let err = verify_live_schema(&Catalog(HashMap::new()), &books_state())
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::Verification(_)));
        assert!(err.to_string().contains("missing column ID"));
    }

    #[test]
    fn test_models_match_target() {
        let target = books_state();
        let model = DiscoveredModel {
            config: ModelConfig {
                source_file: PathBuf::from("book.rs"),
                declaration_name: "Book".to_string(),
                table_name: "books".to_string(),
                output_file: None,
            },
            fields: target.tables["books"].clone(),
        };
        assert!(verify_models_match_target(&[model.clone()], &target, 2).is_ok());

        let mut changed = model;
        changed.fields.push(Field::new("Description", "String"));
        let err = verify_models_match_target(&[changed], &target, 2).unwrap_err();
        assert!(err.to_string().contains("model Book doesn't match target version 2"));

        assert!(!fields_match(
            &[Field::new("Title", "String")],
            &[Field::new("Title", "Option<String>")]
        ));
    }
}
