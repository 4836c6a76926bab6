//! Static uri routing table.
//!
//! # Responsibility
//! - Map a resource uri to the family and collection/item scope it names.
//!
//! # Invariants
//! - The route table is a compile-time constant; nothing registers at runtime.
//! - Patterns match segment by segment; `*` matches exactly one non-empty segment.
//! - Uris under a different authority never match.

use crate::contract::{Resource, ResourceUri, CONTENT_AUTHORITY};
use serde::Serialize;

const WILDCARD: &str = "*";

/// Resolved family plus collection/item scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceTag {
    Jobs,
    JobsItem,
    Rooms,
    RoomsItem,
    Windows,
    WindowsItem,
}

impl ResourceTag {
    pub fn resource(self) -> Resource {
        match self {
            Self::Jobs | Self::JobsItem => Resource::Jobs,
            Self::Rooms | Self::RoomsItem => Resource::Rooms,
            Self::Windows | Self::WindowsItem => Resource::Windows,
        }
    }

    /// Whether the route carries an identifier segment.
    pub fn is_item(self) -> bool {
        matches!(self, Self::JobsItem | Self::RoomsItem | Self::WindowsItem)
    }

    pub fn content_type(self) -> &'static str {
        if self.is_item() {
            self.resource().content_item_type()
        } else {
            self.resource().content_type()
        }
    }
}

/// One `(pattern, tag)` row of the table.
#[derive(Debug, Clone, Copy)]
pub struct Route {
    pub pattern: &'static str,
    pub tag: ResourceTag,
}

const ROUTES: &[Route] = &[
    Route {
        pattern: "jobs",
        tag: ResourceTag::Jobs,
    },
    Route {
        pattern: "jobs/*",
        tag: ResourceTag::JobsItem,
    },
    Route {
        pattern: "rooms",
        tag: ResourceTag::Rooms,
    },
    Route {
        pattern: "rooms/*",
        tag: ResourceTag::RoomsItem,
    },
    Route {
        pattern: "windows",
        tag: ResourceTag::Windows,
    },
    Route {
        pattern: "windows/*",
        tag: ResourceTag::WindowsItem,
    },
];

/// Immutable router over the provider's route table.
#[derive(Debug, Clone, Copy)]
pub struct UriRouter {
    authority: &'static str,
    routes: &'static [Route],
}

impl Default for UriRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl UriRouter {
    pub const fn new() -> Self {
        Self {
            authority: CONTENT_AUTHORITY,
            routes: ROUTES,
        }
    }

    pub fn routes(&self) -> &'static [Route] {
        self.routes
    }

    /// Returns the first route matching `uri`, in table order.
    pub fn resolve(&self, uri: &ResourceUri) -> Option<ResourceTag> {
        if uri.authority() != self.authority {
            return None;
        }
        self.routes
            .iter()
            .find(|route| pattern_matches(route.pattern, uri.segments()))
            .map(|route| route.tag)
    }
}

/// Process-wide router instance.
pub static ROUTER: UriRouter = UriRouter::new();

/// Resolves `uri` against the static route table.
pub fn resolve(uri: &ResourceUri) -> Option<ResourceTag> {
    ROUTER.resolve(uri)
}

fn pattern_matches(pattern: &str, segments: &[String]) -> bool {
    let parts = pattern.split('/').collect::<Vec<_>>();
    parts.len() == segments.len()
        && parts.iter().zip(segments).all(|(part, segment)| {
            if *part == WILDCARD {
                !segment.is_empty()
            } else {
                part == segment
            }
        })
}
