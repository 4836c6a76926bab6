//! Table + predicate builder executed against the store.
//!
//! # Responsibility
//! - Accumulate a table name, a projection map and AND-ed predicates.
//! - Turn them into SELECT/UPDATE/DELETE statements and run them.
//! - Provide the predicate-free insert path.
//!
//! # Invariants
//! - The table is set exactly once before any statement is built.
//! - A `Predicate` always has as many bind values as `?` placeholders.
//! - Column and order-by validation happens before the store is touched.
//! - Only plain identifiers are ever interpolated into SQL text, always
//!   double-quoted.
//! - Reads are paged: each page is a `LIMIT ? OFFSET ?` window ordered by the
//!   caller's terms, then by `rowid`.

use crate::db::DbError;
use crate::values::{ContentValues, RowSet};
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, ErrorCode};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::iter::Peekable;
use std::str::Chars;

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
});

/// Rows fetched per round trip when a query does not pick its own page size.
pub const DEFAULT_PAGE_SIZE: usize = 128;

pub type SelectionResult<T> = Result<T, SelectionError>;

#[derive(Debug)]
pub enum SelectionError {
    TableNotSet,
    TableAlreadySet {
        current: String,
        requested: String,
    },
    ArgumentCountMismatch {
        placeholders: usize,
        values: usize,
    },
    /// A predicate fragment was blank.
    EmptyPredicate,
    /// Fragment uses syntax the placeholder scan cannot account for.
    UnsupportedSyntax(&'static str),
    /// Bind values were supplied without a selection fragment.
    ValuesWithoutSelection(usize),
    UnknownColumn(String),
    InvalidIdentifier(String),
    InvalidOrderBy(String),
    /// Insert or update with no column values.
    EmptyValues,
    ConstraintViolation(String),
    Db(DbError),
}

impl Display for SelectionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TableNotSet => write!(f, "selection has no table"),
            Self::TableAlreadySet { current, requested } => write!(
                f,
                "selection table already set to `{current}`; refusing `{requested}`"
            ),
            Self::ArgumentCountMismatch {
                placeholders,
                values,
            } => write!(
                f,
                "selection has {placeholders} placeholder(s) but {values} value(s)"
            ),
            Self::EmptyPredicate => write!(f, "selection fragment is empty"),
            Self::UnsupportedSyntax(reason) => write!(f, "unsupported selection syntax: {reason}"),
            Self::ValuesWithoutSelection(count) => {
                write!(f, "{count} selection value(s) given without a selection")
            }
            Self::UnknownColumn(column) => write!(f, "unknown column: {column}"),
            Self::InvalidIdentifier(value) => write!(f, "invalid column or table name `{value}`"),
            Self::InvalidOrderBy(value) => write!(f, "invalid order by term `{value}`"),
            Self::EmptyValues => write!(f, "no column values given"),
            Self::ConstraintViolation(message) => write!(f, "constraint violation: {message}"),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SelectionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for SelectionError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for SelectionError {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::SqliteFailure(err, message)
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Self::ConstraintViolation(message.unwrap_or_else(|| err.to_string()))
            }
            other => Self::Db(DbError::Sqlite(other)),
        }
    }
}

/// One page of a SELECT: column names plus the rows in the window.
#[derive(Debug, Default)]
pub struct Page {
    pub columns: Vec<String>,
    pub rows: Vec<ContentValues>,
}

/// Runs one page of a paged SELECT.
///
/// `RowSet` calls this again for every page, so implementations must not
/// hold locks between calls.
pub trait RowSource {
    fn fetch_page(&self, sql: &str, binds: &[Value]) -> SelectionResult<Page>;
}

impl RowSource for Connection {
    fn fetch_page(&self, sql: &str, binds: &[Value]) -> SelectionResult<Page> {
        let mut stmt = self.prepare_cached(sql)?;
        let columns = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        let mut rows = stmt.query(params_from_iter(binds))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = ContentValues::new();
            for (index, name) in columns.iter().enumerate() {
                record.put(name.as_str(), row.get::<_, Value>(index)?);
            }
            records.push(record);
        }
        Ok(Page {
            columns,
            rows: records,
        })
    }
}

/// SQL fragment with its positional bind values.
///
/// Only anonymous `?` placeholders are supported. `?` inside quoted literals
/// or `/* */` comments is not a placeholder; numbered or named placeholders
/// and `--` comments are rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    fragment: String,
    values: Vec<Value>,
}

impl Predicate {
    pub fn new(fragment: impl Into<String>, values: Vec<Value>) -> SelectionResult<Self> {
        let fragment = fragment.into();
        if fragment.trim().is_empty() {
            return Err(SelectionError::EmptyPredicate);
        }
        let placeholders = count_placeholders(&fragment)?;
        if placeholders != values.len() {
            return Err(SelectionError::ArgumentCountMismatch {
                placeholders,
                values: values.len(),
            });
        }
        Ok(Self { fragment, values })
    }

    /// `<column> = ?` bound to `value`.
    pub fn equals(column: &str, value: impl Into<Value>) -> SelectionResult<Self> {
        let column = quote_identifier(column)?;
        Self::new(format!("{column} = ?"), vec![value.into()])
    }

    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

/// Accumulates table, projection map and predicates for one statement.
#[derive(Debug, Clone, Default)]
pub struct SelectionBuilder {
    table: Option<String>,
    projection_map: Vec<(String, String)>,
    clauses: Vec<Predicate>,
}

impl SelectionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the target table. Fails if a table is already set.
    pub fn table(mut self, table: &str) -> SelectionResult<Self> {
        if let Some(current) = &self.table {
            return Err(SelectionError::TableAlreadySet {
                current: current.clone(),
                requested: table.to_string(),
            });
        }
        if !is_identifier(table) {
            return Err(SelectionError::InvalidIdentifier(table.to_string()));
        }
        self.table = Some(table.to_string());
        Ok(self)
    }

    /// Records that `column` is read from `table`.
    pub fn map_to_table(mut self, column: &str, table: &str) -> Self {
        match self
            .projection_map
            .iter_mut()
            .find(|(mapped, _)| mapped == column)
        {
            Some(entry) => entry.1 = table.to_string(),
            None => self
                .projection_map
                .push((column.to_string(), table.to_string())),
        }
        self
    }

    pub fn where_predicate(mut self, predicate: Predicate) -> Self {
        self.clauses.push(predicate);
        self
    }

    /// Appends a raw fragment; a blank fragment without values is a no-op.
    pub fn where_raw(self, fragment: &str, values: Vec<Value>) -> SelectionResult<Self> {
        if fragment.trim().is_empty() {
            if !values.is_empty() {
                return Err(SelectionError::ValuesWithoutSelection(values.len()));
            }
            return Ok(self);
        }
        Ok(self.where_predicate(Predicate::new(fragment, values)?))
    }

    /// Appends the caller selection when present.
    pub fn where_selection(self, selection: Option<&Predicate>) -> Self {
        match selection {
            Some(predicate) => self.where_predicate(predicate.clone()),
            None => self,
        }
    }

    pub fn table_name(&self) -> SelectionResult<&str> {
        self.table.as_deref().ok_or(SelectionError::TableNotSet)
    }

    /// Projection map entries as `(column, owning table)`, in mapping order.
    pub fn projection_map(&self) -> &[(String, String)] {
        &self.projection_map
    }

    pub fn clauses(&self) -> &[Predicate] {
        &self.clauses
    }

    /// AND-ed clause text, or `None` when every row matches.
    pub fn selection(&self) -> Option<String> {
        if self.clauses.is_empty() {
            return None;
        }
        Some(
            self.clauses
                .iter()
                .map(|clause| format!("({})", clause.fragment))
                .collect::<Vec<_>>()
                .join(" AND "),
        )
    }

    /// Bind values for `selection()`, in clause order.
    pub fn selection_args(&self) -> Vec<Value> {
        self.clauses
            .iter()
            .flat_map(|clause| clause.values.iter().cloned())
            .collect()
    }

    /// Opens a paged SELECT over the accumulated selection.
    ///
    /// With a projection map, `columns` and `order_by` may only name mapped
    /// columns, and `None` selects every mapped column. Only the first page is
    /// read here; the rest is fetched as the `RowSet` is consumed.
    pub fn query<'s>(
        &self,
        source: &'s dyn RowSource,
        columns: Option<&[&str]>,
        order_by: Option<&str>,
    ) -> SelectionResult<RowSet<'s>> {
        self.query_paged(source, columns, order_by, DEFAULT_PAGE_SIZE)
    }

    /// `query` with an explicit page size (at least one row per page).
    pub fn query_paged<'s>(
        &self,
        source: &'s dyn RowSource,
        columns: Option<&[&str]>,
        order_by: Option<&str>,
        page_size: usize,
    ) -> SelectionResult<RowSet<'s>> {
        let table = quote_identifier(self.table_name()?)?;
        let (projection, ordering) = self.prepare_read(columns, order_by)?;

        let mut sql = format!("SELECT {projection} FROM {table}");
        self.push_where(&mut sql);
        sql.push_str(" ORDER BY ");
        if let Some(ordering) = ordering {
            sql.push_str(&ordering);
            sql.push_str(", ");
        }
        sql.push_str(&format!("{table}.rowid LIMIT ? OFFSET ?"));
        debug!(
            "event=selection_query module=selection status=start table={table} clauses={} page_size={page_size}",
            self.clauses.len()
        );

        RowSet::open(source, sql, self.selection_args(), page_size)
    }

    /// Checks `columns` and `order_by` against the projection map without
    /// touching the store.
    pub fn validate_read(
        &self,
        columns: Option<&[&str]>,
        order_by: Option<&str>,
    ) -> SelectionResult<()> {
        self.table_name()?;
        self.prepare_read(columns, order_by).map(|_| ())
    }

    fn prepare_read(
        &self,
        columns: Option<&[&str]>,
        order_by: Option<&str>,
    ) -> SelectionResult<(String, Option<String>)> {
        let projection = self.build_projection(columns)?;
        let ordering = match order_by {
            Some(order_by) if !order_by.trim().is_empty() => Some(self.build_order_by(order_by)?),
            _ => None,
        };
        Ok((projection, ordering))
    }

    /// Runs an UPDATE of `values` over matching rows; returns the affected count.
    pub fn update(&self, conn: &Connection, values: &ContentValues) -> SelectionResult<usize> {
        let table = quote_identifier(self.table_name()?)?;
        if values.is_empty() {
            return Err(SelectionError::EmptyValues);
        }
        let assignments = values
            .keys()
            .map(|column| quote_identifier(column).map(|column| format!("{column} = ?")))
            .collect::<SelectionResult<Vec<_>>>()?;

        let mut sql = format!("UPDATE {table} SET {}", assignments.join(", "));
        self.push_where(&mut sql);

        let binds = values
            .iter()
            .map(|(_, value)| value.clone())
            .chain(self.selection_args());
        let changed = conn.execute(&sql, params_from_iter(binds))?;
        debug!(
            "event=selection_update module=selection status=ok table={table} columns={} changed={changed}",
            values.len()
        );
        Ok(changed)
    }

    /// Runs a DELETE over matching rows; returns the affected count.
    pub fn delete(&self, conn: &Connection) -> SelectionResult<usize> {
        let table = quote_identifier(self.table_name()?)?;
        let mut sql = format!("DELETE FROM {table}");
        self.push_where(&mut sql);

        let changed = conn.execute(&sql, params_from_iter(self.selection_args()))?;
        debug!("event=selection_delete module=selection status=ok table={table} changed={changed}");
        Ok(changed)
    }

    fn push_where(&self, sql: &mut String) {
        if let Some(selection) = self.selection() {
            sql.push_str(" WHERE ");
            sql.push_str(&selection);
        }
    }

    fn mapped_table(&self, column: &str) -> Option<&str> {
        self.projection_map
            .iter()
            .find(|(mapped, _)| mapped == column)
            .map(|(_, table)| table.as_str())
    }

    /// Resolves one caller column to quoted SQL text, qualified when mapped.
    fn resolve_column(&self, column: &str) -> SelectionResult<String> {
        let column = ensure_identifier(column.trim())?;
        if self.projection_map.is_empty() {
            return quote_identifier(column);
        }
        let table = self
            .mapped_table(column)
            .ok_or_else(|| SelectionError::UnknownColumn(column.to_string()))?;
        Ok(format!(
            "{}.{}",
            quote_identifier(table)?,
            quote_identifier(column)?
        ))
    }

    fn build_projection(&self, columns: Option<&[&str]>) -> SelectionResult<String> {
        let requested = match columns {
            Some(columns) if !columns.is_empty() => columns.to_vec(),
            _ if self.projection_map.is_empty() => return Ok("*".to_string()),
            _ => self
                .projection_map
                .iter()
                .map(|(column, _)| column.as_str())
                .collect(),
        };

        let parts = requested
            .into_iter()
            .map(|column| -> SelectionResult<String> {
                let resolved = self.resolve_column(column)?;
                Ok(format!("{resolved} AS {}", quote_identifier(column.trim())?))
            })
            .collect::<SelectionResult<Vec<_>>>()?;
        Ok(parts.join(", "))
    }

    fn build_order_by(&self, order_by: &str) -> SelectionResult<String> {
        let terms = order_by
            .split(',')
            .map(|term| -> SelectionResult<String> {
                let mut words = term.split_whitespace();
                let column = words
                    .next()
                    .ok_or_else(|| SelectionError::InvalidOrderBy(term.to_string()))?;
                let direction = match words.next() {
                    None => None,
                    Some(word) if word.eq_ignore_ascii_case("asc") => Some("ASC"),
                    Some(word) if word.eq_ignore_ascii_case("desc") => Some("DESC"),
                    Some(_) => return Err(SelectionError::InvalidOrderBy(term.to_string())),
                };
                if words.next().is_some() {
                    return Err(SelectionError::InvalidOrderBy(term.to_string()));
                }
                let resolved = self.resolve_column(column)?;
                Ok(match direction {
                    Some(direction) => format!("{resolved} {direction}"),
                    None => resolved,
                })
            })
            .collect::<SelectionResult<Vec<_>>>()?;
        Ok(terms.join(", "))
    }
}

/// Inserts one full row into `table`.
///
/// Duplicate identifiers and other constraint failures surface as
/// `ConstraintViolation`.
pub fn insert_row(conn: &Connection, table: &str, values: &ContentValues) -> SelectionResult<()> {
    let table = quote_identifier(table)?;
    if values.is_empty() {
        return Err(SelectionError::EmptyValues);
    }
    let columns = values
        .keys()
        .map(quote_identifier)
        .collect::<SelectionResult<Vec<_>>>()?;
    let placeholders = vec!["?"; columns.len()].join(", ");
    let sql = format!(
        "INSERT INTO {table} ({}) VALUES ({placeholders})",
        columns.join(", ")
    );

    conn.execute(&sql, params_from_iter(values.iter().map(|(_, value)| value)))?;
    debug!(
        "event=selection_insert module=selection status=ok table={table} columns={}",
        columns.len()
    );
    Ok(())
}

fn is_identifier(value: &str) -> bool {
    IDENTIFIER.is_match(value)
}

fn ensure_identifier(value: &str) -> SelectionResult<&str> {
    if is_identifier(value) {
        Ok(value)
    } else {
        Err(SelectionError::InvalidIdentifier(value.to_string()))
    }
}

/// Validates `value` and double-quotes it for interpolation.
fn quote_identifier(value: &str) -> SelectionResult<String> {
    ensure_identifier(value).map(|value| format!("\"{value}\""))
}

fn count_placeholders(sql: &str) -> SelectionResult<usize> {
    let mut chars = sql.chars().peekable();
    let mut count = 0;
    while let Some(ch) = chars.next() {
        match ch {
            '\'' | '"' | '`' => skip_until(&mut chars, ch),
            '[' => skip_until(&mut chars, ']'),
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                skip_block_comment(&mut chars);
            }
            // The fragment is wrapped in parentheses; a line comment would eat the `)`.
            '-' if chars.peek() == Some(&'-') => {
                return Err(SelectionError::UnsupportedSyntax("`--` comments"));
            }
            '?' if chars.peek().is_some_and(char::is_ascii_digit) => {
                return Err(SelectionError::UnsupportedSyntax(
                    "numbered placeholders; use `?`",
                ));
            }
            '?' => count += 1,
            ':' | '@' | '$'
                if chars
                    .peek()
                    .is_some_and(|next| next.is_ascii_alphabetic() || *next == '_') =>
            {
                return Err(SelectionError::UnsupportedSyntax(
                    "named placeholders; use `?`",
                ));
            }
            _ => {}
        }
    }
    Ok(count)
}

fn skip_until(chars: &mut Peekable<Chars<'_>>, close: char) {
    for ch in chars.by_ref() {
        if ch == close {
            break;
        }
    }
}

fn skip_block_comment(chars: &mut Peekable<Chars<'_>>) {
    let mut previous = None;
    for ch in chars.by_ref() {
        if previous == Some('*') && ch == '/' {
            break;
        }
        previous = Some(ch);
    }
}
