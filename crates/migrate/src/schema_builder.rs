//! Schema Builder - DDL statements for generated migrations
//!
//! Every statement is idempotent where PostgreSQL allows it (`IF EXISTS` /
//! `IF NOT EXISTS`) so a partially applied script can be re-run.

use crate::fields::Field;

/// Accumulates DDL statements in execution order
#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
    statements: Vec<String>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self {
            statements: Vec::new(),
        }
    }

    /// Create a new table
    pub fn create_table<F>(&mut self, table_name: &str, callback: F) -> &mut Self
    where
        F: FnOnce(&mut TableBuilder),
    {
        let mut table_builder = TableBuilder::new(table_name);
        callback(&mut table_builder);
        self.statements.push(table_builder.to_sql());
        self
    }

    /// Drop a table together with dependent objects
    pub fn drop_table(&mut self, table_name: &str) -> &mut Self {
        self.statements
            .push(format!("DROP TABLE IF EXISTS {} CASCADE;", table_name));
        self
    }

    /// Add a column to an existing table
    pub fn add_column(&mut self, table_name: &str, field: &Field) -> &mut Self {
        self.statements.push(format!(
            "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {};",
            table_name,
            field.column_definition()
        ));
        self
    }

    /// Drop a column together with dependent objects
    pub fn drop_column(&mut self, table_name: &str, column_name: &str) -> &mut Self {
        self.statements.push(format!(
            "ALTER TABLE {} DROP COLUMN IF EXISTS {} CASCADE;",
            table_name, column_name
        ));
        self
    }

    /// Change a column type, casting existing values
    pub fn alter_column_type(
        &mut self,
        table_name: &str,
        column_name: &str,
        sql_type: &str,
    ) -> &mut Self {
        self.statements.push(format!(
            "ALTER TABLE {} ALTER COLUMN {} TYPE {} USING {}::{};",
            table_name, column_name, sql_type, column_name, sql_type
        ));
        self
    }

    /// Add the named foreign key constraint of `field`, if it has one
    pub fn add_foreign_key(&mut self, table_name: &str, field: &Field) -> &mut Self {
        if let Some(constraint) = field.constraint_name(table_name) {
            self.statements.push(format!(
                "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {};",
                table_name, constraint, field.name, field.reference
            ));
        }
        self
    }

    /// Drop the named foreign key constraint of `field`, if it has one
    pub fn drop_foreign_key(&mut self, table_name: &str, field: &Field) -> &mut Self {
        if let Some(constraint) = field.constraint_name(table_name) {
            self.statements.push(format!(
                "ALTER TABLE {} DROP CONSTRAINT IF EXISTS {};",
                table_name, constraint
            ));
        }
        self
    }

    /// Append the statements of another builder
    pub fn extend(&mut self, other: SchemaBuilder) -> &mut Self {
        self.statements.extend(other.statements);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn into_statements(self) -> Vec<String> {
        self.statements
    }

    /// All statements as a single SQL string
    pub fn build(&self) -> String {
        self.statements.join("\n")
    }
}

/// Table builder for CREATE TABLE statements
#[derive(Debug, Clone)]
pub struct TableBuilder {
    table_name: String,
    columns: Vec<String>,
    constraints: Vec<String>,
}

impl TableBuilder {
    pub fn new(table_name: &str) -> Self {
        Self {
            table_name: table_name.to_string(),
            columns: Vec::new(),
            constraints: Vec::new(),
        }
    }

    /// Add a column, and its foreign key constraint when it has one
    pub fn field(&mut self, field: &Field) -> &mut Self {
        self.columns.push(field.column_definition());
        if let Some(constraint) = field.constraint_name(&self.table_name) {
            self.constraints.push(format!(
                "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {}",
                constraint, field.name, field.reference
            ));
        }
        self
    }

    pub fn fields(&mut self, fields: &[Field]) -> &mut Self {
        for field in fields {
            self.field(field);
        }
        self
    }

    /// Build the CREATE TABLE SQL; constraints follow the columns
    pub fn to_sql(&self) -> String {
        let parts: Vec<&str> = self
            .columns
            .iter()
            .chain(self.constraints.iter())
            .map(String::as_str)
            .collect();

        if parts.is_empty() {
            return format!("CREATE TABLE IF NOT EXISTS {} ();", self.table_name);
        }

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n\t{}\n);",
            self.table_name,
            parts.join(",\n\t")
        )
    }
}
