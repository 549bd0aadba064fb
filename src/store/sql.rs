//! Statement synthesis from a [`Schema`]. Nothing in here touches a connection.

use super::schema::Schema;

pub fn create_table(schema: &Schema) -> String {
    let mut lines = Vec::with_capacity(schema.columns.len() + 1);
    for col in schema.columns {
        let null = if col.nullable { "NULL" } else { "NOT NULL" };
        lines.push(format!("    {} {} {}", col.name, col.ty.sql(), null));
    }
    let keys = schema
        .primary_columns()
        .map(|c| c.name)
        .collect::<Vec<_>>()
        .join(", ");
    lines.push(format!("    PRIMARY KEY ({keys})"));
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
        schema.table,
        lines.join(",\n")
    )
}

pub fn create_indexes(schema: &Schema) -> Vec<String> {
    schema
        .columns
        .iter()
        .filter(|c| c.indexed)
        .map(|c| {
            format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_{col} ON {table}({col})",
                table = schema.table,
                col = c.name
            )
        })
        .collect()
}

/// Columns added after a table first shipped are always nullable; the store refuses to add a
/// NOT NULL one.
pub fn add_column(schema: &Schema, column: &str) -> Option<String> {
    let col = schema.column(column)?;
    Some(format!(
        "ALTER TABLE {} ADD COLUMN {} {}",
        schema.table,
        col.name,
        col.ty.sql()
    ))
}

pub fn insert(schema: &Schema) -> String {
    let names = schema
        .columns
        .iter()
        .map(|c| c.name)
        .collect::<Vec<_>>()
        .join(", ");
    let slots = (1..=schema.columns.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("INSERT INTO {} ({names}) VALUES ({slots})", schema.table)
}

/// Parameters: every non-key column in declaration order, then the key columns.
pub fn update(schema: &Schema) -> String {
    let mut idx = 0usize;
    let set = schema
        .value_columns()
        .map(|c| {
            idx += 1;
            format!("{} = ?{idx}", c.name)
        })
        .collect::<Vec<_>>()
        .join(", ");
    let (clause, _) = key_clause(schema, idx);
    format!("UPDATE {} SET {set} WHERE {clause}", schema.table)
}

pub fn select_by_key(schema: &Schema) -> String {
    let (clause, _) = key_clause(schema, 0);
    format!("SELECT * FROM {} WHERE {clause}", schema.table)
}

pub fn exists(schema: &Schema) -> String {
    let (clause, _) = key_clause(schema, 0);
    format!("SELECT 1 FROM {} WHERE {clause} LIMIT 1", schema.table)
}

pub fn delete(schema: &Schema) -> String {
    let (clause, _) = key_clause(schema, 0);
    format!("DELETE FROM {} WHERE {clause}", schema.table)
}

pub fn select_all(schema: &Schema) -> String {
    format!("SELECT * FROM {}", schema.table)
}

pub fn select_where(schema: &Schema, predicate: &str) -> String {
    format!("SELECT * FROM {} WHERE {}", schema.table, predicate.trim())
}

pub fn count(schema: &Schema) -> String {
    format!("SELECT COUNT(*) FROM {}", schema.table)
}

fn key_clause(schema: &Schema, offset: usize) -> (String, usize) {
    let mut idx = offset;
    let clause = schema
        .primary_columns()
        .map(|c| {
            idx += 1;
            format!("{} = ?{idx}", c.name)
        })
        .collect::<Vec<_>>()
        .join(" AND ");
    (clause, idx)
}
