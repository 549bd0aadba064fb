use rusqlite::types::Value;

use pitchcast::error::StoreError;
use pitchcast::store::{Column, Entity, RowValues, Schema, Store};

static READING_V1: Schema = Schema {
    table: "readings",
    columns: &[
        Column::text("station").primary(),
        Column::integer("day").primary(),
        Column::real("celsius").nullable(),
    ],
};

static READING: Schema = Schema {
    table: "readings",
    columns: &[
        Column::text("station").primary(),
        Column::integer("day").primary(),
        Column::real("celsius").nullable(),
        Column::text("note").nullable().indexed(),
    ],
};

static READING_REVISED: Schema = Schema {
    table: "readings",
    columns: &[
        Column::text("station").primary(),
        Column::integer("day").primary(),
        Column::real("celsius").nullable(),
        Column::integer("revision"),
    ],
};

static LABEL: Schema = Schema {
    table: "labels",
    columns: &[Column::integer("id").primary(), Column::text("label")],
};

#[derive(Debug, Clone, PartialEq)]
struct ReadingV1 {
    station: String,
    day: i64,
    celsius: Option<f64>,
}

impl Entity for ReadingV1 {
    fn schema() -> &'static Schema {
        &READING_V1
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.station.clone()),
            Value::Integer(self.day),
            self.celsius.map(Value::Real).unwrap_or(Value::Null),
        ]
    }

    fn from_values(row: &RowValues<'_>) -> Result<Self, StoreError> {
        Ok(Self {
            station: row.text("station")?,
            day: row.int("day")?,
            celsius: row.opt_real("celsius")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Reading {
    station: String,
    day: i64,
    celsius: Option<f64>,
    note: Option<String>,
}

impl Reading {
    fn new(station: &str, day: i64, celsius: f64) -> Self {
        Self {
            station: station.to_string(),
            day,
            celsius: Some(celsius),
            note: None,
        }
    }
}

impl Entity for Reading {
    fn schema() -> &'static Schema {
        &READING
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.station.clone()),
            Value::Integer(self.day),
            self.celsius.map(Value::Real).unwrap_or(Value::Null),
            self.note.clone().map(Value::Text).unwrap_or(Value::Null),
        ]
    }

    fn from_values(row: &RowValues<'_>) -> Result<Self, StoreError> {
        Ok(Self {
            station: row.text("station")?,
            day: row.int("day")?,
            celsius: row.opt_real("celsius")?,
            note: row.opt_text("note")?,
        })
    }
}

/// Adds a NOT NULL column on top of [`ReadingV1`].
#[derive(Debug, Clone, PartialEq)]
struct RevisedReading {
    station: String,
    day: i64,
    celsius: Option<f64>,
    revision: i64,
}

impl Entity for RevisedReading {
    fn schema() -> &'static Schema {
        &READING_REVISED
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.station.clone()),
            Value::Integer(self.day),
            self.celsius.map(Value::Real).unwrap_or(Value::Null),
            Value::Integer(self.revision),
        ]
    }

    fn from_values(row: &RowValues<'_>) -> Result<Self, StoreError> {
        Ok(Self {
            station: row.text("station")?,
            day: row.int("day")?,
            celsius: row.opt_real("celsius")?,
            revision: row.int("revision")?,
        })
    }
}

/// `label` is NOT NULL, so a `None` makes the write fail inside the store.
#[derive(Debug, Clone, PartialEq)]
struct Label {
    id: i64,
    label: Option<String>,
}

impl Entity for Label {
    fn schema() -> &'static Schema {
        &LABEL
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Integer(self.id),
            self.label.clone().map(Value::Text).unwrap_or(Value::Null),
        ]
    }

    fn from_values(row: &RowValues<'_>) -> Result<Self, StoreError> {
        Ok(Self {
            id: row.int("id")?,
            label: row.opt_text("label")?,
        })
    }
}

fn store() -> Store {
    let mut store = Store::open_in_memory().unwrap();
    store.register::<Reading>().unwrap();
    store.register::<Label>().unwrap();
    store
}

fn key(station: &str, day: i64) -> [(&'static str, Value); 2] {
    [
        ("station", Value::Text(station.to_string())),
        ("day", Value::Integer(day)),
    ]
}

#[test]
fn save_twice_updates_in_place() {
    let store = store();
    let mut r = Reading::new("LHR", 1, 12.5);
    store.save(&mut r).unwrap();
    r.celsius = Some(14.0);
    r.note = Some("revised".to_string());
    store.save(&mut r).unwrap();

    assert_eq!(store.count::<Reading>().unwrap(), 1);
    let back = store
        .find_by_primary_key::<Reading>(&key("LHR", 1))
        .unwrap()
        .unwrap();
    assert_eq!(back, r);
}

#[test]
fn compound_key_distinguishes_rows() {
    let mut store = store();
    let mut rows = vec![
        Reading::new("LHR", 1, 10.0),
        Reading::new("LHR", 2, 11.0),
        Reading::new("MAN", 1, 8.0),
    ];
    assert_eq!(store.bulk_save(&mut rows).unwrap(), 3);
    assert_eq!(store.count::<Reading>().unwrap(), 3);

    let man = store
        .find_by_primary_key::<Reading>(&key("MAN", 1))
        .unwrap()
        .unwrap();
    assert_eq!(man.celsius, Some(8.0));
    assert!(store.exists(&rows[1]).unwrap());
    assert!(
        store
            .find_by_primary_key::<Reading>(&key("MAN", 2))
            .unwrap()
            .is_none()
    );
}

#[test]
fn key_order_in_lookup_does_not_matter() {
    let store = store();
    store.save(&mut Reading::new("LHR", 3, 9.0)).unwrap();
    let found = store
        .find_by_primary_key::<Reading>(&[
            ("day", Value::Integer(3)),
            ("station", Value::Text("LHR".to_string())),
        ])
        .unwrap();
    assert!(found.is_some());
}

#[test]
fn partial_key_is_rejected() {
    let store = store();
    let err = store
        .find_by_primary_key::<Reading>(&[("station", Value::Text("LHR".to_string()))])
        .unwrap_err();
    assert!(matches!(err, StoreError::KeyMismatch { .. }));
    assert!(!err.is_fatal());
}

#[test]
fn find_where_filters_and_orders() {
    let mut store = store();
    let mut rows = (1..=5)
        .map(|day| Reading::new("LHR", day, 10.0 + day as f64))
        .chain([Reading::new("MAN", 1, 3.0)])
        .collect::<Vec<_>>();
    store.bulk_save(&mut rows).unwrap();

    let warm = store
        .find_where::<Reading>(
            "station = ?1 AND celsius > ?2 ORDER BY day DESC",
            &[Value::Text("LHR".to_string()), Value::Real(12.5)],
        )
        .unwrap();
    assert_eq!(warm.iter().map(|r| r.day).collect::<Vec<_>>(), vec![5, 4, 3]);
    assert_eq!(store.find_all::<Reading>().unwrap().len(), 6);
}

#[test]
fn failed_bulk_save_rolls_back_every_row() {
    let mut store = store();
    let mut batch = vec![
        Label {
            id: 1,
            label: Some("ok".to_string()),
        },
        Label { id: 2, label: None },
    ];
    let err = store.bulk_save(&mut batch).unwrap_err();
    assert!(matches!(err, StoreError::Query { .. }));
    assert_eq!(store.count::<Label>().unwrap(), 0);
}

#[test]
fn delete_reports_whether_a_row_went() {
    let store = store();
    let mut r = Reading::new("LHR", 1, 12.5);
    store.save(&mut r).unwrap();
    assert!(store.delete(&r).unwrap());
    assert!(!store.delete(&r).unwrap());
    assert_eq!(store.count::<Reading>().unwrap(), 0);
}

#[test]
fn unregistered_entity_is_a_schema_error() {
    let store = Store::open_in_memory().unwrap();
    let err = store.count::<Reading>().unwrap_err();
    assert!(matches!(err, StoreError::Schema { .. }));
    assert!(err.is_fatal());
}

#[test]
fn new_declared_column_is_added_to_existing_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.sqlite");

    {
        let mut store = Store::open(&path).unwrap();
        store.register::<ReadingV1>().unwrap();
        let mut old = ReadingV1 {
            station: "LHR".to_string(),
            day: 1,
            celsius: Some(7.5),
        };
        store.save(&mut old).unwrap();
    }

    let mut store = Store::open(&path).unwrap();
    store.register::<Reading>().unwrap();
    let back = store
        .find_by_primary_key::<Reading>(&key("LHR", 1))
        .unwrap()
        .unwrap();
    assert_eq!(back.celsius, Some(7.5));
    assert_eq!(back.note, None);

    let mut updated = Reading {
        note: Some("migrated".to_string()),
        ..back
    };
    store.save(&mut updated).unwrap();
    let notes = store
        .find_where::<Reading>("note = ?1", &[Value::Text("migrated".to_string())])
        .unwrap();
    assert_eq!(notes.len(), 1);
}

#[test]
fn required_column_cannot_be_added_to_existing_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.sqlite");

    {
        let mut store = Store::open(&path).unwrap();
        store.register::<ReadingV1>().unwrap();
        let mut old = ReadingV1 {
            station: "LHR".to_string(),
            day: 1,
            celsius: Some(7.5),
        };
        store.save(&mut old).unwrap();
    }

    let mut store = Store::open(&path).unwrap();
    let err = store.register::<RevisedReading>().unwrap_err();
    assert!(matches!(err, StoreError::Schema { .. }));
    assert!(err.is_fatal());
    assert!(err.to_string().contains("revision"));

    // The old shape is untouched and still readable.
    store.register::<ReadingV1>().unwrap();
    assert_eq!(store.find_all::<ReadingV1>().unwrap().len(), 1);
}

#[test]
fn unusable_store_directory_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "file").unwrap();

    let err = Store::open(&blocker.join("store.sqlite")).unwrap_err();
    assert!(matches!(err, StoreError::Directory { .. }));
    assert!(err.is_fatal());
}
