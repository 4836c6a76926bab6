//! Provider-level error taxonomy.
//!
//! # Responsibility
//! - Give callers one error type for every provider operation.
//! - Keep semantic failures (`UnsupportedResource`, `UnknownColumn`, ...)
//!   distinct from store transport errors.
//!
//! # Invariants
//! - Store errors propagate unchanged inside `Db`.
//! - Nothing here is retried.

use crate::db::DbError;
use crate::selection::SelectionError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug)]
pub enum ProviderError {
    /// Uri matches no route, or a route not valid for the operation.
    UnsupportedResource(String),
    /// Text could not be parsed as a resource uri.
    InvalidUri(String),
    /// Identifier extraction on a uri without a captured segment.
    MalformedIdentifier(String),
    /// Column absent from the active projection map.
    UnknownColumn(String),
    /// Duplicate identifier or other store constraint failure.
    ConstraintViolation(String),
    InvalidSelection(SelectionError),
    Db(DbError),
}

impl Display for ProviderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedResource(uri) => write!(f, "unsupported resource uri: {uri}"),
            Self::InvalidUri(message) => write!(f, "invalid resource uri: {message}"),
            Self::MalformedIdentifier(uri) => write!(f, "uri carries no identifier: {uri}"),
            Self::UnknownColumn(column) => write!(f, "unknown column: {column}"),
            Self::ConstraintViolation(message) => write!(f, "constraint violation: {message}"),
            Self::InvalidSelection(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ProviderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidSelection(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SelectionError> for ProviderError {
    fn from(value: SelectionError) -> Self {
        match value {
            SelectionError::UnknownColumn(column) => Self::UnknownColumn(column),
            SelectionError::ConstraintViolation(message) => Self::ConstraintViolation(message),
            SelectionError::Db(err) => Self::Db(err),
            other => Self::InvalidSelection(other),
        }
    }
}

impl From<DbError> for ProviderError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for ProviderError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}
