//! Uri-addressed CRUD access layer for curtain quote data.
//! Jobs, rooms and windows live in one local SQLite store; callers address
//! them through `content://` uris and get change events back.

pub mod config;
pub mod contract;
pub mod db;
pub mod error;
pub mod logging;
pub mod notify;
pub mod provider;
pub mod router;
pub mod selection;
pub mod values;

pub use config::StoreConfig;
pub use contract::{Resource, ResourceUri, CONTENT_AUTHORITY};
pub use error::{ProviderError, ProviderResult};
pub use logging::{init_logging, logging_status, LogLevel, LoggingError};
pub use notify::{ChangeEvent, ChangeNotifier, ChangeObserver, ObserverId, ObserverScope};
pub use provider::{shared_provider, ResourceProvider};
pub use router::ResourceTag;
pub use selection::{Predicate, RowSource, SelectionBuilder, SelectionError, DEFAULT_PAGE_SIZE};
pub use values::{ContentValues, RowSet};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
