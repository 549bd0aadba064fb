use std::collections::HashSet;

use rusqlite::types::Value;

use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    pub fn sql(self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }
}

/// One persisted field: its column name, storage type, and key/index membership.
#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
    pub primary: bool,
    pub indexed: bool,
    pub nullable: bool,
}

impl Column {
    pub const fn new(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            primary: false,
            indexed: false,
            nullable: false,
        }
    }

    pub const fn integer(name: &'static str) -> Self {
        Self::new(name, ColumnType::Integer)
    }

    pub const fn real(name: &'static str) -> Self {
        Self::new(name, ColumnType::Real)
    }

    pub const fn text(name: &'static str) -> Self {
        Self::new(name, ColumnType::Text)
    }

    pub const fn primary(self) -> Self {
        Self {
            primary: true,
            ..self
        }
    }

    pub const fn indexed(self) -> Self {
        Self {
            indexed: true,
            ..self
        }
    }

    pub const fn nullable(self) -> Self {
        Self {
            nullable: true,
            ..self
        }
    }
}

/// Declared persistent shape of one entity type.
#[derive(Debug)]
pub struct Schema {
    pub table: &'static str,
    pub columns: &'static [Column],
}

impl Schema {
    pub fn primary_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.primary)
    }

    pub fn value_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| !c.primary)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if !is_identifier(self.table) {
            return Err(StoreError::schema(self.table, "table name is not an identifier"));
        }
        if self.columns.is_empty() {
            return Err(StoreError::schema(self.table, "no columns declared"));
        }
        let mut seen = HashSet::new();
        for col in self.columns {
            if !is_identifier(col.name) {
                return Err(StoreError::schema(
                    self.table,
                    format!("column name '{}' is not an identifier", col.name),
                ));
            }
            if !seen.insert(col.name) {
                return Err(StoreError::schema(
                    self.table,
                    format!("column '{}' declared twice", col.name),
                ));
            }
            if col.primary && col.nullable {
                return Err(StoreError::schema(
                    self.table,
                    format!("primary key column '{}' cannot be nullable", col.name),
                ));
            }
        }
        if self.primary_columns().next().is_none() {
            return Err(StoreError::schema(self.table, "no primary key column"));
        }
        Ok(())
    }

    /// Splits a full row (in declaration order) into the SET values followed by key values,
    /// which is the parameter order of the generated UPDATE.
    pub(crate) fn update_params(&self, values: &[Value]) -> Vec<Value> {
        let mut set = Vec::with_capacity(values.len());
        let mut keys = Vec::new();
        for (col, value) in self.columns.iter().zip(values) {
            if col.primary {
                keys.push(value.clone());
            } else {
                set.push(value.clone());
            }
        }
        set.extend(keys);
        set
    }

    pub(crate) fn key_params(&self, values: &[Value]) -> Vec<Value> {
        self.columns
            .iter()
            .zip(values)
            .filter(|(col, _)| col.primary)
            .map(|(_, v)| v.clone())
            .collect()
    }
}

/// A persistable record. `to_values` must yield one value per declared column, in order.
pub trait Entity: Sized {
    fn schema() -> &'static Schema;

    fn to_values(&self) -> Vec<Value>;

    fn from_values(row: &RowValues<'_>) -> Result<Self, StoreError>;

    fn before_save(&mut self) {}

    fn after_save(&self) {}
}

/// Typed accessors over one decoded row.
pub struct RowValues<'a> {
    schema: &'static Schema,
    values: &'a [Value],
}

impl<'a> RowValues<'a> {
    pub(crate) fn new(schema: &'static Schema, values: &'a [Value]) -> Self {
        Self { schema, values }
    }

    fn get(&self, column: &str) -> Result<&Value, StoreError> {
        let idx = self
            .schema
            .columns
            .iter()
            .position(|c| c.name == column)
            .ok_or_else(|| self.decode_err(column, "column not declared"))?;
        self.values
            .get(idx)
            .ok_or_else(|| self.decode_err(column, "column missing from row"))
    }

    fn decode_err(&self, column: &str, reason: &str) -> StoreError {
        StoreError::Decode {
            table: self.schema.table.to_string(),
            column: column.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn opt_int(&self, column: &str) -> Result<Option<i64>, StoreError> {
        match self.get(column)? {
            Value::Null => Ok(None),
            Value::Integer(n) => Ok(Some(*n)),
            Value::Real(f) => Ok(Some(*f as i64)),
            Value::Text(s) => s
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|_| self.decode_err(column, "text is not an integer")),
            Value::Blob(_) => Err(self.decode_err(column, "unexpected blob")),
        }
    }

    pub fn int(&self, column: &str) -> Result<i64, StoreError> {
        self.opt_int(column)?
            .ok_or_else(|| self.decode_err(column, "unexpected NULL"))
    }

    pub fn opt_real(&self, column: &str) -> Result<Option<f64>, StoreError> {
        match self.get(column)? {
            Value::Null => Ok(None),
            Value::Integer(n) => Ok(Some(*n as f64)),
            Value::Real(f) => Ok(Some(*f)),
            Value::Text(s) => s
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|_| self.decode_err(column, "text is not a number")),
            Value::Blob(_) => Err(self.decode_err(column, "unexpected blob")),
        }
    }

    pub fn real(&self, column: &str) -> Result<f64, StoreError> {
        self.opt_real(column)?
            .ok_or_else(|| self.decode_err(column, "unexpected NULL"))
    }

    pub fn opt_text(&self, column: &str) -> Result<Option<String>, StoreError> {
        match self.get(column)? {
            Value::Null => Ok(None),
            Value::Text(s) => Ok(Some(s.clone())),
            Value::Integer(n) => Ok(Some(n.to_string())),
            Value::Real(f) => Ok(Some(f.to_string())),
            Value::Blob(_) => Err(self.decode_err(column, "unexpected blob")),
        }
    }

    pub fn text(&self, column: &str) -> Result<String, StoreError> {
        self.opt_text(column)?
            .ok_or_else(|| self.decode_err(column, "unexpected NULL"))
    }
}

pub fn opt_int(v: Option<i64>) -> Value {
    v.map(Value::Integer).unwrap_or(Value::Null)
}

pub fn opt_real(v: Option<f64>) -> Value {
    v.map(Value::Real).unwrap_or(Value::Null)
}

pub fn opt_text(v: Option<&str>) -> Value {
    v.map(|s| Value::Text(s.to_string())).unwrap_or(Value::Null)
}

fn is_identifier(raw: &str) -> bool {
    let mut chars = raw.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    static NO_KEY: Schema = Schema {
        table: "things",
        columns: &[Column::text("name")],
    };

    static DUPLICATE: Schema = Schema {
        table: "things",
        columns: &[Column::text("name").primary(), Column::integer("name")],
    };

    static BAD_TABLE: Schema = Schema {
        table: "drop table;",
        columns: &[Column::text("name").primary()],
    };

    #[test]
    fn validate_rejects_missing_primary_key() {
        let err = NO_KEY.validate().unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("things"));
    }

    #[test]
    fn validate_rejects_duplicate_and_unsafe_names() {
        assert!(DUPLICATE.validate().is_err());
        assert!(BAD_TABLE.validate().is_err());
    }

    #[test]
    fn update_params_put_keys_last() {
        static S: Schema = Schema {
            table: "t",
            columns: &[
                Column::integer("a").primary(),
                Column::text("b"),
                Column::integer("c").primary(),
                Column::real("d"),
            ],
        };
        let values = vec![
            Value::Integer(1),
            Value::Text("x".into()),
            Value::Integer(3),
            Value::Real(0.5),
        ];
        assert_eq!(
            S.update_params(&values),
            vec![
                Value::Text("x".into()),
                Value::Real(0.5),
                Value::Integer(1),
                Value::Integer(3)
            ]
        );
        assert_eq!(S.key_params(&values), vec![Value::Integer(1), Value::Integer(3)]);
    }
}
