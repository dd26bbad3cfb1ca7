//! Structural diff between the models and the recorded schema state
//!
//! Each change is generated as a forward step together with its inverse. The
//! undo script replays the inverse steps in reverse order, so applying the
//! forward script and then the undo script restores the previous column set.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::discovery::DiscoveredModel;
use crate::fields::Field;
use crate::schema_builder::{SchemaBuilder, TableBuilder};
use crate::state::SchemaState;

/// Forward and undo statements for one table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableDiff {
    pub table: String,
    pub forward: Vec<String>,
    pub undo: Vec<String>,
}

impl TableDiff {
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty() && self.undo.is_empty()
    }
}

/// One forward change and the statements reverting it
struct Step {
    forward: SchemaBuilder,
    undo: SchemaBuilder,
}

impl Step {
    fn new() -> Self {
        Self {
            forward: SchemaBuilder::new(),
            undo: SchemaBuilder::new(),
        }
    }
}

fn assemble(table: &str, steps: Vec<Step>) -> TableDiff {
    let mut forward = SchemaBuilder::new();
    let mut undo = SchemaBuilder::new();
    let mut inverses = Vec::with_capacity(steps.len());

    for step in steps {
        forward.extend(step.forward);
        inverses.push(step.undo);
    }
    for inverse in inverses.into_iter().rev() {
        undo.extend(inverse);
    }

    TableDiff {
        table: table.to_string(),
        forward: forward.into_statements(),
        undo: undo.into_statements(),
    }
}

fn create_table_sql(table: &str, fields: &[Field]) -> String {
    let mut table_builder = TableBuilder::new(table);
    table_builder.fields(fields);
    table_builder.to_sql()
}

/// Diff one table's current fields against its recorded fields.
///
/// `None` means the table was never recorded and is created. A recorded table
/// with no fields exists without columns, so its fields are added one by one.
/// A recorded table whose model lost every field is dropped.
pub fn diff(table: &str, current: &[Field], previous: Option<&[Field]>) -> TableDiff {
    let previous = match previous {
        None if current.is_empty() => {
            return TableDiff {
                table: table.to_string(),
                ..TableDiff::default()
            };
        }
        None => {
            let mut step = Step::new();
            step.forward.create_table(table, |t| {
                t.fields(current);
            });
            step.undo.drop_table(table);
            return assemble(table, vec![step]);
        }
        Some(previous) if current.is_empty() && !previous.is_empty() => {
            return diff_removed_table(table, previous);
        }
        Some(previous) => previous,
    };

    let previous_by_name: HashMap<String, &Field> = previous
        .iter()
        .map(|f| (f.name.to_lowercase(), f))
        .collect();
    let current_names: HashSet<String> = current.iter().map(|f| f.name.to_lowercase()).collect();

    let mut steps = Vec::new();

    for field in current {
        match previous_by_name.get(&field.name.to_lowercase()) {
            None => {
                let mut step = Step::new();
                step.forward
                    .add_column(table, field)
                    .add_foreign_key(table, field);
                step.undo.drop_column(table, &field.name);
                steps.push(step);
            }
            Some(old) => {
                let type_changed = !field.sql_type.eq_ignore_ascii_case(&old.sql_type);
                let key_changed = !field.same_foreign_key(old);
                if !type_changed && !key_changed {
                    continue;
                }

                let mut step = Step::new();
                if key_changed {
                    step.forward.drop_foreign_key(table, old);
                    step.undo.drop_foreign_key(table, field);
                }
                if type_changed {
                    step.forward
                        .alter_column_type(table, &field.name, &field.sql_type);
                    step.undo.alter_column_type(table, &field.name, &old.sql_type);
                }
                if key_changed {
                    step.forward.add_foreign_key(table, field);
                    step.undo.add_foreign_key(table, old);
                }
                steps.push(step);
            }
        }
    }

    for old in previous {
        if current_names.contains(&old.name.to_lowercase()) {
            continue;
        }
        let mut step = Step::new();
        step.forward
            .drop_foreign_key(table, old)
            .drop_column(table, &old.name);
        step.undo.add_column(table, old).add_foreign_key(table, old);
        steps.push(step);
    }

    assemble(table, steps)
}

/// Drop a table that no longer has a model; the undo re-creates it
pub fn diff_removed_table(table: &str, previous: &[Field]) -> TableDiff {
    TableDiff {
        table: table.to_string(),
        forward: vec![format!("DROP TABLE IF EXISTS {} CASCADE;", table)],
        undo: vec![create_table_sql(table, previous)],
    }
}

/// All table diffs of one version plus the state they lead to
#[derive(Debug, Clone)]
pub struct ChangeSet {
    pub tables: Vec<TableDiff>,
    pub new_state: SchemaState,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.tables.iter().all(TableDiff::is_empty)
    }

    pub fn forward_statements(&self) -> usize {
        self.tables.iter().map(|t| t.forward.len()).sum()
    }

    pub fn undo_statements(&self) -> usize {
        self.tables.iter().map(|t| t.undo.len()).sum()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables
            .iter()
            .filter(|t| !t.is_empty())
            .map(|t| t.table.clone())
            .collect()
    }

    /// Forward script body, one commented block per table
    pub fn forward_sql(&self) -> String {
        render_blocks(self.tables.iter().map(|t| (&t.table, &t.forward)))
    }

    /// Undo script body; tables appear in reverse order
    pub fn undo_sql(&self) -> String {
        render_blocks(self.tables.iter().rev().map(|t| (&t.table, &t.undo)))
    }
}

fn render_blocks<'a>(blocks: impl Iterator<Item = (&'a String, &'a Vec<String>)>) -> String {
    let mut sql = String::new();
    for (table, statements) in blocks {
        if statements.is_empty() {
            continue;
        }
        sql.push_str("-- Table: ");
        sql.push_str(table);
        sql.push('\n');
        for statement in statements {
            sql.push_str(statement);
            sql.push('\n');
        }
        sql.push('\n');
    }
    sql
}

/// Indices of `tables` ordered so that a table follows the tables its
/// foreign keys reference. Cycles keep their declaration order.
fn dependency_order(tables: &[(&str, &[Field])]) -> Vec<usize> {
    let index: HashMap<String, usize> = tables
        .iter()
        .enumerate()
        .map(|(i, (name, _))| (name.to_lowercase(), i))
        .collect();

    let mut ordered = Vec::with_capacity(tables.len());
    let mut visited = vec![false; tables.len()];

    fn visit(
        i: usize,
        tables: &[(&str, &[Field])],
        index: &HashMap<String, usize>,
        visited: &mut [bool],
        ordered: &mut Vec<usize>,
    ) {
        if visited[i] {
            return;
        }
        visited[i] = true;
        for field in tables[i].1 {
            let dep = field
                .reference_table()
                .and_then(|t| index.get(&t.to_lowercase()));
            if let Some(&dep) = dep {
                if dep != i {
                    visit(dep, tables, index, visited, ordered);
                }
            }
        }
        ordered.push(i);
    }

    for i in 0..tables.len() {
        visit(i, tables, &index, &mut visited, &mut ordered);
    }
    ordered
}

/// Drop `table`. The undo re-creates it and then restores the foreign keys
/// that `CASCADE` removed from tables which survive this version unchanged.
fn drop_table_diff(
    table: &str,
    old_fields: &[Field],
    previous: &SchemaState,
    surviving: &BTreeMap<String, Vec<Field>>,
) -> TableDiff {
    let mut table_diff = diff_removed_table(table, old_fields);
    let mut restore = SchemaBuilder::new();

    for (other, recorded) in &previous.tables {
        let Some(current) = surviving.get(other) else {
            continue;
        };
        if other.eq_ignore_ascii_case(table) {
            continue;
        }
        for old in recorded {
            let references_dropped = old
                .reference_table()
                .map(|t| t.eq_ignore_ascii_case(table))
                .unwrap_or(false);
            if !references_dropped {
                continue;
            }
            // a key the table's own diff drops or changes is restored by that diff's undo
            let kept = current
                .iter()
                .any(|f| f.name.eq_ignore_ascii_case(&old.name) && f.same_foreign_key(old));
            if kept {
                restore.add_foreign_key(other, old);
            }
        }
    }

    table_diff.undo.extend(restore.into_statements());
    table_diff
}

/// Diff every model against the recorded state.
///
/// Tables recorded in `previous` without a model are dropped, dependents
/// first, so the undo script re-creates referenced tables first. The returned
/// state carries over the rollback counter.
pub fn generate(models: &[DiscoveredModel], previous: &SchemaState) -> ChangeSet {
    let mut tables = Vec::new();
    let mut new_tables = BTreeMap::new();
    let mut dropped: Vec<(&str, &[Field])> = Vec::new();

    let declared: Vec<(&str, &[Field])> = models
        .iter()
        .map(|m| (m.table_name(), m.fields.as_slice()))
        .collect();

    for i in dependency_order(&declared) {
        let (table, fields) = declared[i];
        let recorded = previous.fields(table);

        if fields.is_empty() {
            match recorded {
                Some(old_fields) if !old_fields.is_empty() => dropped.push((table, old_fields)),
                Some(_) => {
                    new_tables.insert(table.to_string(), Vec::new());
                }
                None => {}
            }
            continue;
        }

        let table_diff = diff(table, fields, recorded);
        if !table_diff.is_empty() {
            tracing::debug!(
                "Table {}: {} forward, {} undo statements",
                table,
                table_diff.forward.len(),
                table_diff.undo.len()
            );
            tables.push(table_diff);
        }
        new_tables.insert(table.to_string(), fields.to_vec());
    }

    for (table, old_fields) in &previous.tables {
        if declared.iter().any(|(name, _)| *name == table.as_str()) {
            continue;
        }
        tracing::debug!("Table {} has no model and will be dropped", table);
        dropped.push((table.as_str(), old_fields.as_slice()));
    }

    for i in dependency_order(&dropped).into_iter().rev() {
        let (table, old_fields) = dropped[i];
        tables.push(drop_table_diff(table, old_fields, previous, &new_tables));
    }

    ChangeSet {
        tables,
        new_state: SchemaState {
            meta: previous.meta,
            tables: new_tables,
        },
    }
}
