//! Uri-addressed CRUD entry points over jobs, rooms and windows.
//!
//! # Responsibility
//! - Route each request uri to a family and scope.
//! - Build the simple (write) or expanded (read) selection for it.
//! - Execute against the store and publish change events.
//!
//! # Invariants
//! - Inserts are only accepted on collection uris.
//! - Every successful insert/update/delete emits exactly one `ChangeEvent`.
//! - Referential links between families are neither validated nor cascaded.

use crate::config::StoreConfig;
use crate::contract::{Resource, ResourceUri, ID};
use crate::db::Store;
use crate::error::{ProviderError, ProviderResult};
use crate::notify::{ChangeEvent, ChangeNotifier};
use crate::router::{ResourceTag, UriRouter, ROUTER};
use crate::selection::{insert_row, Predicate, SelectionBuilder};
use crate::values::{ContentValues, RowSet};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::time::Instant;

static SHARED_PROVIDER: OnceCell<ResourceProvider> = OnceCell::new();

/// Returns the process-wide provider, configured from the environment on first use.
///
/// The store itself stays closed until the first request.
pub fn shared_provider() -> &'static ResourceProvider {
    SHARED_PROVIDER.get_or_init(|| ResourceProvider::new(StoreConfig::from_env()))
}

/// Builds the write-path selection: table plus `_id = ?` for item routes.
pub fn build_simple_selection(
    tag: ResourceTag,
    uri: &ResourceUri,
) -> ProviderResult<SelectionBuilder> {
    let resource = tag.resource();
    let builder = SelectionBuilder::new().table(resource.table())?;
    with_item_clause(builder, tag, uri)
}

/// Builds the read-path selection: simple selection plus a projection map
/// entry for every column the family exposes.
pub fn build_expanded_selection(
    tag: ResourceTag,
    uri: &ResourceUri,
) -> ProviderResult<SelectionBuilder> {
    let table = tag.resource().table();
    let builder = tag
        .resource()
        .columns()
        .iter()
        .fold(SelectionBuilder::new().table(table)?, |builder, column| {
            builder.map_to_table(column, table)
        });
    with_item_clause(builder, tag, uri)
}

fn with_item_clause(
    builder: SelectionBuilder,
    tag: ResourceTag,
    uri: &ResourceUri,
) -> ProviderResult<SelectionBuilder> {
    if !tag.is_item() {
        return Ok(builder);
    }
    let id = tag.resource().get_id(uri)?;
    Ok(builder.where_predicate(Predicate::equals(ID, id)?))
}

/// Same-process CRUD façade over the quote store.
pub struct ResourceProvider {
    router: UriRouter,
    store: Store,
    notifier: ChangeNotifier,
}

impl ResourceProvider {
    /// Creates a provider; the database opens lazily on first request.
    pub fn new(config: StoreConfig) -> Self {
        Self::with_store(Store::new(config))
    }

    pub fn with_store(store: Store) -> Self {
        Self {
            router: ROUTER,
            store,
            notifier: ChangeNotifier::new(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Observer registry for change events.
    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    /// Resolves `uri` or fails with `UnsupportedResource`.
    pub fn resolve(&self, uri: &ResourceUri) -> ProviderResult<ResourceTag> {
        self.router
            .resolve(uri)
            .ok_or_else(|| ProviderError::UnsupportedResource(uri.to_string()))
    }

    /// Content type of the collection or item `uri` names.
    pub fn get_type(&self, uri: &ResourceUri) -> ProviderResult<&'static str> {
        Ok(self.resolve(uri)?.content_type())
    }

    /// Reads rows through the expanded selection, AND-ed with `selection`.
    ///
    /// The returned `RowSet` reads further pages from the store as it is
    /// consumed.
    pub fn query(
        &self,
        uri: &ResourceUri,
        columns: Option<&[&str]>,
        selection: Option<&Predicate>,
        order_by: Option<&str>,
    ) -> ProviderResult<RowSet<'_>> {
        let started_at = Instant::now();
        let tag = self.resolve(uri)?;
        let builder = build_expanded_selection(tag, uri)?.where_selection(selection);
        builder.validate_read(columns, order_by)?;

        let result = builder
            .query(&self.store, columns, order_by)
            .map_err(ProviderError::from);
        match result {
            Ok(rows) => {
                info!(
                    "event=provider_query module=provider status=ok uri={uri} first_page_rows={} exhausted={} duration_ms={}",
                    rows.fetched(),
                    rows.is_exhausted(),
                    started_at.elapsed().as_millis()
                );
                Ok(rows.with_origin(tag, uri.clone()))
            }
            Err(err) => Err(log_failure("provider_query", uri, started_at, err)),
        }
    }

    /// Inserts a full row through a collection uri; returns the new item uri.
    pub fn insert(&self, uri: &ResourceUri, values: &ContentValues) -> ProviderResult<ResourceUri> {
        let started_at = Instant::now();
        let tag = self.resolve(uri)?;
        if tag.is_item() {
            return Err(ProviderError::UnsupportedResource(uri.to_string()));
        }
        let resource = tag.resource();
        let id = values
            .get_as_string(ID)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ProviderError::MalformedIdentifier(uri.to_string()))?;

        let result = self.store.with_connection(|conn| {
            insert_row(conn, resource.table(), values).map_err(ProviderError::from)
        });
        match result {
            Ok(()) => {
                info!(
                    "event=provider_insert module=provider status=ok uri={uri} columns={} duration_ms={}",
                    values.len(),
                    started_at.elapsed().as_millis()
                );
                self.notify_change(resource, uri);
                Ok(resource.build_item_uri(&id))
            }
            Err(err) => Err(log_failure("provider_insert", uri, started_at, err)),
        }
    }

    /// Deletes rows matched by the simple selection AND `selection`.
    pub fn delete(&self, uri: &ResourceUri, selection: Option<&Predicate>) -> ProviderResult<usize> {
        let started_at = Instant::now();
        let tag = self.resolve(uri)?;
        let builder = build_simple_selection(tag, uri)?.where_selection(selection);

        let result = self
            .store
            .with_connection(|conn| builder.delete(conn).map_err(ProviderError::from));
        match result {
            Ok(changed) => {
                info!(
                    "event=provider_delete module=provider status=ok uri={uri} changed={changed} duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                self.notify_change(tag.resource(), uri);
                Ok(changed)
            }
            Err(err) => Err(log_failure("provider_delete", uri, started_at, err)),
        }
    }

    /// Updates rows matched by the simple selection AND `selection`.
    pub fn update(
        &self,
        uri: &ResourceUri,
        values: &ContentValues,
        selection: Option<&Predicate>,
    ) -> ProviderResult<usize> {
        let started_at = Instant::now();
        let tag = self.resolve(uri)?;
        let builder = build_simple_selection(tag, uri)?.where_selection(selection);

        let result = self
            .store
            .with_connection(|conn| builder.update(conn, values).map_err(ProviderError::from));
        match result {
            Ok(changed) => {
                info!(
                    "event=provider_update module=provider status=ok uri={uri} columns={} changed={changed} duration_ms={}",
                    values.len(),
                    started_at.elapsed().as_millis()
                );
                self.notify_change(tag.resource(), uri);
                Ok(changed)
            }
            Err(err) => Err(log_failure("provider_update", uri, started_at, err)),
        }
    }

    fn notify_change(&self, resource: Resource, uri: &ResourceUri) {
        self.notifier.notify(&ChangeEvent {
            resource,
            uri: uri.clone(),
        });
    }
}

fn log_failure(
    event: &str,
    uri: &ResourceUri,
    started_at: Instant,
    err: ProviderError,
) -> ProviderError {
    error!(
        "event={event} module=provider status=error uri={uri} duration_ms={} error={}",
        started_at.elapsed().as_millis(),
        err
    );
    err
}

#[cfg(test)]
mod tests {
    use super::{build_expanded_selection, build_simple_selection, shared_provider};
    use crate::contract::{Resource, ResourceUri};
    use crate::error::ProviderError;
    use crate::router::{resolve, ResourceTag};
    use rusqlite::types::Value;

    fn routed(uri: &ResourceUri) -> ResourceTag {
        resolve(uri).unwrap()
    }

    #[test]
    fn simple_selection_for_item_route_has_id_clause() {
        for resource in Resource::ALL {
            let uri = resource.build_item_uri("X9");
            let builder = build_simple_selection(routed(&uri), &uri).unwrap();
            assert_eq!(builder.table_name().unwrap(), resource.table());
            assert_eq!(builder.selection().as_deref(), Some("(\"_id\" = ?)"));
            assert_eq!(builder.selection_args(), vec![Value::Text("X9".to_string())]);
            assert!(builder.projection_map().is_empty());
        }
    }

    #[test]
    fn simple_selection_for_collection_route_matches_all() {
        for resource in Resource::ALL {
            let uri = resource.content_uri();
            let builder = build_simple_selection(routed(&uri), &uri).unwrap();
            assert!(builder.clauses().is_empty());
            assert!(builder.selection().is_none());
        }
    }

    #[test]
    fn expanded_selection_maps_every_exposed_column() {
        let uri = Resource::Rooms.content_uri();
        let builder = build_expanded_selection(routed(&uri), &uri).unwrap();
        let mapped = builder
            .projection_map()
            .iter()
            .map(|(column, table)| {
                assert_eq!(table, "rooms");
                column.as_str()
            })
            .collect::<Vec<_>>();
        assert!(mapped.contains(&"job_id"));
        assert!(mapped.contains(&"description"));
        assert_eq!(mapped, Resource::Rooms.columns());
    }

    #[test]
    fn item_tag_with_collection_uri_is_malformed() {
        let uri = Resource::Windows.content_uri();
        let err = build_simple_selection(ResourceTag::WindowsItem, &uri).unwrap_err();
        assert!(matches!(err, ProviderError::MalformedIdentifier(_)));
    }

    #[test]
    fn shared_provider_is_created_once() {
        let first = shared_provider();
        let second = shared_provider();
        assert!(std::ptr::eq(first, second));
        assert_eq!(
            first.get_type(&Resource::Jobs.content_uri()).unwrap(),
            Resource::Jobs.content_type()
        );
    }
}
