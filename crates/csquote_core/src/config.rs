//! Store configuration.
//!
//! # Responsibility
//! - Describe where the provider keeps its SQLite database.
//! - Resolve that location from the process environment.

use std::path::PathBuf;

/// Environment variable naming the database file.
pub const DB_PATH_ENV: &str = "CSQUOTE_DB_PATH";

/// Location of the backing store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreConfig {
    /// Database file path. `None` keeps the store in memory.
    pub db_path: Option<PathBuf>,
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self { db_path: None }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: Some(path.into()),
        }
    }

    /// Reads `CSQUOTE_DB_PATH`; unset or blank means in-memory.
    pub fn from_env() -> Self {
        Self::from_env_value(std::env::var(DB_PATH_ENV).ok())
    }

    fn from_env_value(raw: Option<String>) -> Self {
        match raw {
            Some(value) if !value.trim().is_empty() => Self::file(value.trim()),
            _ => Self::in_memory(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::StoreConfig;
    use std::path::PathBuf;

    #[test]
    fn blank_env_value_falls_back_to_memory() {
        assert_eq!(StoreConfig::from_env_value(None), StoreConfig::in_memory());
        assert_eq!(
            StoreConfig::from_env_value(Some("   ".to_string())),
            StoreConfig::in_memory()
        );
    }

    #[test]
    fn env_value_is_trimmed_into_file_path() {
        let config = StoreConfig::from_env_value(Some(" /tmp/quotes.db \n".to_string()));
        assert_eq!(config.db_path, Some(PathBuf::from("/tmp/quotes.db")));
    }
}
