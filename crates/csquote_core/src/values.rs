//! Column/value maps and query row sets.
//!
//! # Responsibility
//! - Carry untyped column values into inserts/updates.
//! - Hand query results back as a forward-only sequence.
//!
//! # Invariants
//! - `ContentValues` keys are unique; `put` replaces.
//! - A `RowSet` yields each row at most once and cannot be rewound.
//! - A `RowSet` holds at most one page of rows and no store lock between pages.

use crate::contract::ResourceUri;
use crate::router::ResourceTag;
use crate::selection::{RowSource, SelectionResult};
use rusqlite::types::Value;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::collections::btree_map;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;

/// Column name to value map used for inserts, updates and result rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentValues {
    values: BTreeMap<String, Value>,
}

impl ContentValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `column`, replacing any previous value.
    pub fn put(&mut self, column: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.values.insert(column.into(), value.into());
        self
    }

    /// Builder-style `put`.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.put(column, value);
        self
    }

    pub fn put_null(&mut self, column: impl Into<String>) -> &mut Self {
        self.values.insert(column.into(), Value::Null);
        self
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    pub fn contains_key(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    /// Text view of a value; numbers are formatted, `NULL` and blobs are `None`.
    pub fn get_as_string(&self, column: &str) -> Option<String> {
        match self.values.get(column)? {
            Value::Text(text) => Some(text.clone()),
            Value::Integer(value) => Some(value.to_string()),
            Value::Real(value) => Some(value.to_string()),
            Value::Null | Value::Blob(_) => None,
        }
    }

    pub fn get_as_i64(&self, column: &str) -> Option<i64> {
        match self.values.get(column)? {
            Value::Integer(value) => Some(*value),
            Value::Real(value) if value.fract() == 0.0 => Some(*value as i64),
            Value::Text(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn get_as_f64(&self, column: &str) -> Option<f64> {
        match self.values.get(column)? {
            Value::Integer(value) => Some(*value as f64),
            Value::Real(value) => Some(*value),
            Value::Text(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.values.remove(column)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.values.iter()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for ContentValues {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(column, value)| (column.into(), value.into()))
                .collect(),
        }
    }
}

impl<'a> IntoIterator for &'a ContentValues {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

impl Serialize for ContentValues {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (column, value) in &self.values {
            match value {
                Value::Null => map.serialize_entry(column, &None::<()>)?,
                Value::Integer(value) => map.serialize_entry(column, value)?,
                Value::Real(value) => map.serialize_entry(column, value)?,
                Value::Text(value) => map.serialize_entry(column, value)?,
                Value::Blob(value) => map.serialize_entry(column, value)?,
            }
        }
        map.end()
    }
}

/// Forward-only, read-once result of a query.
///
/// Rows are pulled from the store one page at a time as iteration reaches
/// them. A page is read with whatever the store holds at that moment.
pub struct RowSet<'s> {
    source: &'s dyn RowSource,
    sql: String,
    binds: Vec<Value>,
    page_size: usize,
    fetched: usize,
    exhausted: bool,
    columns: Vec<String>,
    buffer: VecDeque<ContentValues>,
    tag: Option<ResourceTag>,
    notification_uri: Option<ResourceUri>,
}

impl<'s> RowSet<'s> {
    /// Reads the first page of `sql`, which must end in `LIMIT ? OFFSET ?`.
    pub(crate) fn open(
        source: &'s dyn RowSource,
        sql: String,
        binds: Vec<Value>,
        page_size: usize,
    ) -> SelectionResult<Self> {
        let mut set = Self {
            source,
            sql,
            binds,
            page_size: page_size.max(1),
            fetched: 0,
            exhausted: false,
            columns: Vec::new(),
            buffer: VecDeque::new(),
            tag: None,
            notification_uri: None,
        };
        set.fetch_next_page()?;
        Ok(set)
    }

    /// Attaches the route the rows were read through.
    pub(crate) fn with_origin(mut self, tag: ResourceTag, uri: ResourceUri) -> Self {
        self.tag = Some(tag);
        self.notification_uri = Some(uri);
        self
    }

    /// Column names in selection order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn tag(&self) -> Option<ResourceTag> {
        self.tag
    }

    /// Uri whose change notifications invalidate these rows.
    pub fn notification_uri(&self) -> Option<&ResourceUri> {
        self.notification_uri.as_ref()
    }

    /// Rows read from the store so far.
    pub fn fetched(&self) -> usize {
        self.fetched
    }

    /// Rows read but not yet handed out.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the store has no rows left to read.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    fn fetch_next_page(&mut self) -> SelectionResult<()> {
        self.binds.push(Value::Integer(self.page_size as i64));
        self.binds.push(Value::Integer(self.fetched as i64));
        let page = self.source.fetch_page(&self.sql, &self.binds);
        self.binds.truncate(self.binds.len() - 2);
        let page = page?;

        if self.columns.is_empty() {
            self.columns = page.columns;
        }
        self.exhausted = page.rows.len() < self.page_size;
        self.fetched += page.rows.len();
        self.buffer.extend(page.rows);
        Ok(())
    }
}

impl Iterator for RowSet<'_> {
    type Item = SelectionResult<ContentValues>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(err) = self.fetch_next_page() {
                self.exhausted = true;
                return Some(Err(err));
            }
        }
        self.buffer.pop_front().map(Ok)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let buffered = self.buffer.len();
        (buffered, self.exhausted.then_some(buffered))
    }
}

impl fmt::Debug for RowSet<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowSet")
            .field("columns", &self.columns)
            .field("fetched", &self.fetched)
            .field("buffered", &self.buffer.len())
            .field("exhausted", &self.exhausted)
            .field("tag", &self.tag)
            .field("notification_uri", &self.notification_uri)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::{ContentValues, RowSet};
    use crate::db::DbError;
    use crate::selection::{Page, RowSource, SelectionError, SelectionResult};
    use rusqlite::types::Value;
    use std::cell::Cell;

    #[test]
    fn put_replaces_existing_value() {
        let mut values = ContentValues::new();
        values.put("height", 100_i64).put("height", 120_i64);
        assert_eq!(values.len(), 1);
        assert_eq!(values.get("height"), Some(&Value::Integer(120)));
    }

    #[test]
    fn typed_getters_convert_between_storage_classes() {
        let values = ContentValues::new()
            .with("_id", "W1".to_string())
            .with("height", 200_i64)
            .with("width", 150.5_f64)
            .with("count", "7".to_string())
            .with("missing", None::<i64>);

        assert_eq!(values.get_as_string("_id").as_deref(), Some("W1"));
        assert_eq!(values.get_as_string("height").as_deref(), Some("200"));
        assert_eq!(values.get_as_i64("count"), Some(7));
        assert_eq!(values.get_as_f64("width"), Some(150.5));
        assert_eq!(values.get_as_i64("width"), None);
        assert_eq!(values.get_as_string("missing"), None);
        assert!(values.contains_key("missing"));
    }

    #[test]
    fn serializes_as_flat_json_object() {
        let values = ContentValues::new()
            .with("_id", "R1".to_string())
            .with("height", 200_i64)
            .with("notes", None::<String>);
        let json = serde_json::to_value(&values).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"_id": "R1", "height": 200, "notes": null})
        );
    }

    /// Serves `rows` in `LIMIT ? OFFSET ?` windows and counts round trips.
    struct CountingSource {
        rows: Vec<ContentValues>,
        calls: Cell<usize>,
        fail_after: Option<usize>,
    }

    impl CountingSource {
        fn new(count: usize) -> Self {
            Self {
                rows: (0..count)
                    .map(|index| ContentValues::new().with("_id", format!("id{index}")))
                    .collect(),
                calls: Cell::new(0),
                fail_after: None,
            }
        }
    }

    impl RowSource for CountingSource {
        fn fetch_page(&self, _sql: &str, binds: &[Value]) -> SelectionResult<Page> {
            let calls = self.calls.get();
            self.calls.set(calls + 1);
            if self.fail_after.is_some_and(|limit| calls >= limit) {
                return Err(SelectionError::Db(DbError::Poisoned));
            }
            let (limit, offset) = match binds {
                [.., Value::Integer(limit), Value::Integer(offset)] => {
                    (*limit as usize, *offset as usize)
                }
                other => panic!("page binds missing: {other:?}"),
            };
            Ok(Page {
                columns: vec!["_id".to_string()],
                rows: self.rows.iter().skip(offset).take(limit).cloned().collect(),
            })
        }
    }

    #[test]
    fn row_set_fetches_pages_on_demand() {
        let source = CountingSource::new(5);
        let mut set = RowSet::open(&source, "SELECT".to_string(), Vec::new(), 2).unwrap();
        assert_eq!(source.calls.get(), 1);
        assert_eq!(set.fetched(), 2);
        assert_eq!(set.size_hint(), (2, None));
        assert_eq!(set.columns(), ["_id"]);

        set.next().unwrap().unwrap();
        set.next().unwrap().unwrap();
        assert_eq!(source.calls.get(), 1);

        let third = set.next().unwrap().unwrap();
        assert_eq!(third.get_as_string("_id").as_deref(), Some("id2"));
        assert_eq!(source.calls.get(), 2);
        assert_eq!(set.buffered(), 1);

        assert_eq!(set.by_ref().count(), 2);
        assert!(set.is_exhausted());
        assert!(set.next().is_none());
        assert_eq!(set.fetched(), 5);
    }

    #[test]
    fn row_set_surfaces_page_errors_once() {
        let mut source = CountingSource::new(4);
        source.fail_after = Some(1);
        let mut set = RowSet::open(&source, "SELECT".to_string(), Vec::new(), 2).unwrap();
        assert!(set.next().unwrap().is_ok());
        assert!(set.next().unwrap().is_ok());
        assert!(matches!(set.next(), Some(Err(SelectionError::Db(_)))));
        assert!(set.next().is_none());
    }
}
