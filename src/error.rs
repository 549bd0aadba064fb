use thiserror::Error;

/// Errors raised by the embedded store. Every variant names the table (or file) involved so a
/// log line is enough to act on.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to open store at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("cannot create store directory {path}: {source}")]
    Directory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid schema for table '{table}': {reason}")]
    Schema { table: String, reason: String },

    #[error("query on table '{table}' failed: {source}")]
    Query {
        table: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("cannot decode column '{column}' of table '{table}': {reason}")]
    Decode {
        table: String,
        column: String,
        reason: String,
    },

    #[error("primary key mismatch for table '{table}': {reason}")]
    KeyMismatch { table: String, reason: String },
}

impl StoreError {
    pub(crate) fn query(table: &str, source: rusqlite::Error) -> Self {
        StoreError::Query {
            table: table.to_string(),
            source,
        }
    }

    pub(crate) fn schema(table: &str, reason: impl Into<String>) -> Self {
        StoreError::Schema {
            table: table.to_string(),
            reason: reason.into(),
        }
    }

    /// Open and schema errors are the only store failures that make the whole run pointless.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StoreError::Open { .. } | StoreError::Directory { .. } | StoreError::Schema { .. }
        )
    }
}
