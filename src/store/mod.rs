//! Generic persistence over one embedded SQLite file.
//!
//! Entities declare their shape once through [`Entity::schema`]; every statement the store runs
//! is synthesized from that declaration by [`sql`]. There is no per-entity SQL anywhere else.

pub mod schema;
pub mod sql;

use std::collections::HashSet;
use std::path::Path;

use rusqlite::types::Value;
use rusqlite::{Connection, params_from_iter};
use tracing::{debug, info};

use crate::error::StoreError;

pub use schema::{Column, ColumnType, Entity, RowValues, Schema};

#[derive(Debug)]
pub struct Store {
    conn: Connection,
    registered: HashSet<&'static str>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Directory {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let conn = Connection::open(path).map_err(|source| StoreError::Open {
            path: path.display().to_string(),
            source,
        })?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(|source| StoreError::Open {
                path: path.display().to_string(),
                source,
            })?;
        info!(path = %path.display(), "opened store");
        Ok(Self::with_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|source| StoreError::Open {
            path: ":memory:".to_string(),
            source,
        })?;
        Ok(Self::with_connection(conn))
    }

    fn with_connection(conn: Connection) -> Self {
        Self {
            conn,
            registered: HashSet::new(),
        }
    }

    /// Validates the declaration, creates the table and its indexes, and adds any declared
    /// column the existing table lacks. A missing NOT NULL column is a schema error: old rows
    /// would hold NULL there and fail to decode.
    pub fn register<T: Entity>(&mut self) -> Result<(), StoreError> {
        let schema = T::schema();
        schema.validate()?;

        self.conn
            .execute_batch(&sql::create_table(schema))
            .map_err(|e| StoreError::query(schema.table, e))?;

        let existing = self.existing_columns(schema.table)?;
        for col in schema.columns {
            if existing.contains(col.name) {
                continue;
            }
            if !col.nullable {
                return Err(StoreError::schema(
                    schema.table,
                    format!(
                        "column '{}' is missing from the existing table and is not nullable; \
                         only nullable columns can be added",
                        col.name
                    ),
                ));
            }
            if let Some(stmt) = sql::add_column(schema, col.name) {
                info!(table = schema.table, column = col.name, "adding column");
                self.conn
                    .execute_batch(&stmt)
                    .map_err(|e| StoreError::query(schema.table, e))?;
            }
        }

        for stmt in sql::create_indexes(schema) {
            self.conn
                .execute_batch(&stmt)
                .map_err(|e| StoreError::query(schema.table, e))?;
        }
        self.registered.insert(schema.table);
        debug!(table = schema.table, "registered entity");
        Ok(())
    }

    fn existing_columns(&self, table: &str) -> Result<HashSet<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({table})"))
            .map_err(|e| StoreError::query(table, e))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .map_err(|e| StoreError::query(table, e))?;
        let mut out = HashSet::new();
        for name in names {
            out.insert(name.map_err(|e| StoreError::query(table, e))?);
        }
        Ok(out)
    }

    fn ensure_registered<T: Entity>(&self) -> Result<&'static Schema, StoreError> {
        let schema = T::schema();
        if !self.registered.contains(schema.table) {
            return Err(StoreError::schema(schema.table, "entity was never registered"));
        }
        Ok(schema)
    }

    /// Upsert keyed by primary key: UPDATE when the row exists, INSERT otherwise.
    pub fn save<T: Entity>(&self, entity: &mut T) -> Result<(), StoreError> {
        let schema = self.ensure_registered::<T>()?;
        save_on(&self.conn, schema, entity)
    }

    /// Saves the whole batch in one transaction; any failure rolls every row back.
    pub fn bulk_save<T: Entity>(&mut self, entities: &mut [T]) -> Result<usize, StoreError> {
        let schema = self.ensure_registered::<T>()?;
        let tx = self
            .conn
            .transaction()
            .map_err(|e| StoreError::query(schema.table, e))?;
        for entity in entities.iter_mut() {
            save_on(&tx, schema, entity)?;
        }
        tx.commit().map_err(|e| StoreError::query(schema.table, e))?;
        Ok(entities.len())
    }

    pub fn exists<T: Entity>(&self, entity: &T) -> Result<bool, StoreError> {
        let schema = self.ensure_registered::<T>()?;
        let values = checked_values(schema, entity)?;
        exists_on(&self.conn, schema, &schema.key_params(&values))
    }

    /// `key` must name every primary-key column exactly once.
    pub fn find_by_primary_key<T: Entity>(
        &self,
        key: &[(&str, Value)],
    ) -> Result<Option<T>, StoreError> {
        let schema = self.ensure_registered::<T>()?;
        let params = ordered_key(schema, key)?;
        let mut rows = self.query::<T>(schema, &sql::select_by_key(schema), &params)?;
        Ok(rows.pop())
    }

    pub fn find_where<T: Entity>(
        &self,
        predicate: &str,
        args: &[Value],
    ) -> Result<Vec<T>, StoreError> {
        let schema = self.ensure_registered::<T>()?;
        self.query::<T>(schema, &sql::select_where(schema, predicate), args)
    }

    pub fn find_all<T: Entity>(&self) -> Result<Vec<T>, StoreError> {
        let schema = self.ensure_registered::<T>()?;
        self.query::<T>(schema, &sql::select_all(schema), &[])
    }

    pub fn count<T: Entity>(&self) -> Result<usize, StoreError> {
        let schema = self.ensure_registered::<T>()?;
        let n = self
            .conn
            .query_row(&sql::count(schema), [], |row| row.get::<_, i64>(0))
            .map_err(|e| StoreError::query(schema.table, e))?;
        Ok(usize::try_from(n).unwrap_or_default())
    }

    /// Returns whether a row was removed.
    pub fn delete<T: Entity>(&self, entity: &T) -> Result<bool, StoreError> {
        let schema = self.ensure_registered::<T>()?;
        let values = checked_values(schema, entity)?;
        let removed = self
            .conn
            .prepare_cached(&sql::delete(schema))
            .and_then(|mut stmt| stmt.execute(params_from_iter(schema.key_params(&values))))
            .map_err(|e| StoreError::query(schema.table, e))?;
        Ok(removed > 0)
    }

    fn query<T: Entity>(
        &self,
        schema: &'static Schema,
        statement: &str,
        args: &[Value],
    ) -> Result<Vec<T>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached(statement)
            .map_err(|e| StoreError::query(schema.table, e))?;
        let mut rows = stmt
            .query(params_from_iter(args.iter()))
            .map_err(|e| StoreError::query(schema.table, e))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| StoreError::query(schema.table, e))? {
            let mut values = Vec::with_capacity(schema.columns.len());
            for col in schema.columns {
                let value = row
                    .get::<_, Value>(col.name)
                    .map_err(|e| StoreError::query(schema.table, e))?;
                values.push(value);
            }
            out.push(T::from_values(&RowValues::new(schema, &values))?);
        }
        Ok(out)
    }
}

fn save_on<T: Entity>(
    conn: &Connection,
    schema: &'static Schema,
    entity: &mut T,
) -> Result<(), StoreError> {
    entity.before_save();
    let values = checked_values(schema, entity)?;
    let present = exists_on(conn, schema, &schema.key_params(&values))?;

    let (statement, params) = if present {
        (sql::update(schema), schema.update_params(&values))
    } else {
        (sql::insert(schema), values)
    };
    conn.prepare_cached(&statement)
        .and_then(|mut stmt| stmt.execute(params_from_iter(params)))
        .map_err(|e| StoreError::query(schema.table, e))?;

    entity.after_save();
    Ok(())
}

fn exists_on(
    conn: &Connection,
    schema: &'static Schema,
    key: &[Value],
) -> Result<bool, StoreError> {
    let mut stmt = conn
        .prepare_cached(&sql::exists(schema))
        .map_err(|e| StoreError::query(schema.table, e))?;
    stmt.exists(params_from_iter(key.iter()))
        .map_err(|e| StoreError::query(schema.table, e))
}

fn checked_values<T: Entity>(schema: &'static Schema, entity: &T) -> Result<Vec<Value>, StoreError> {
    let values = entity.to_values();
    if values.len() != schema.columns.len() {
        return Err(StoreError::schema(
            schema.table,
            format!(
                "entity produced {} values for {} columns",
                values.len(),
                schema.columns.len()
            ),
        ));
    }
    Ok(values)
}

fn ordered_key(schema: &'static Schema, key: &[(&str, Value)]) -> Result<Vec<Value>, StoreError> {
    let mismatch = |reason: String| StoreError::KeyMismatch {
        table: schema.table.to_string(),
        reason,
    };
    let primary = schema.primary_columns().collect::<Vec<_>>();
    if key.len() != primary.len() {
        return Err(mismatch(format!(
            "expected {} key columns, got {}",
            primary.len(),
            key.len()
        )));
    }
    let mut out = Vec::with_capacity(primary.len());
    for col in primary {
        let value = key
            .iter()
            .find(|(name, _)| *name == col.name)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| mismatch(format!("missing key column '{}'", col.name)))?;
        out.push(value);
    }
    Ok(out)
}
