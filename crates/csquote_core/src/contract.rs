//! Resource contract: uris, families, columns and content types.
//!
//! # Responsibility
//! - Define the public address space (`content://<authority>/<family>[/<id>]`).
//! - Name every table and column callers may refer to.
//! - Build and take apart item uris.
//!
//! # Invariants
//! - Every family is keyed by the `_id` text column.
//! - `get_id` only succeeds on `<family>/<id>` shaped uris.
//! - Segments are stored decoded and percent-encoded on display, so any
//!   non-empty identifier round-trips through its item uri.

use crate::error::{ProviderError, ProviderResult};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Bytes left as-is inside a path segment: RFC 3986 unreserved plus `!'()*`.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'!')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*');

pub const CONTENT_SCHEME: &str = "content";
pub const CONTENT_AUTHORITY: &str = "nz.co.curtainsolutions.provider";

/// Identifier column shared by all tables.
pub const ID: &str = "_id";

pub mod jobs {
    pub const ID: &str = super::ID;
    pub const NAME: &str = "name";
    pub const ADDRESS: &str = "address";
    pub const PHONE: &str = "phone";
    pub const NOTES: &str = "notes";

    pub const COLUMNS: &[&str] = &[ID, NAME, ADDRESS, PHONE, NOTES];
}

pub mod rooms {
    pub const ID: &str = super::ID;
    pub const JOB_ID: &str = "job_id";
    pub const DESCRIPTION: &str = "description";

    pub const COLUMNS: &[&str] = &[ID, JOB_ID, DESCRIPTION];
}

pub mod windows {
    pub const ID: &str = super::ID;
    pub const ROOM_ID: &str = "room_id";
    pub const HEIGHT: &str = "height";
    pub const WIDTH: &str = "width";

    pub const COLUMNS: &[&str] = &[ID, ROOM_ID, HEIGHT, WIDTH];
}

/// Store table names.
pub mod tables {
    pub const JOBS: &str = "jobs";
    pub const ROOMS: &str = "rooms";
    pub const WINDOWS: &str = "windows";
}

/// Parsed `content://` uri.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceUri {
    authority: String,
    segments: Vec<String>,
}

impl ResourceUri {
    pub fn new<S: Into<String>>(
        authority: impl Into<String>,
        segments: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            authority: authority.into(),
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Parses `content://<authority>/<segment>/...`.
    ///
    /// A single trailing `/` is ignored; any other empty segment is rejected.
    /// Segments are percent-decoded and must decode to UTF-8.
    pub fn parse(uri: &str) -> ProviderResult<Self> {
        let rest = uri
            .strip_prefix(CONTENT_SCHEME)
            .and_then(|rest| rest.strip_prefix("://"))
            .ok_or_else(|| {
                ProviderError::InvalidUri(format!("`{uri}` must start with {CONTENT_SCHEME}://"))
            })?;

        let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
        if authority.is_empty() {
            return Err(ProviderError::InvalidUri(format!(
                "`{uri}` has an empty authority"
            )));
        }

        let path = path.strip_suffix('/').unwrap_or(path);
        let raw_segments = if path.is_empty() {
            Vec::new()
        } else {
            path.split('/').collect::<Vec<_>>()
        };
        if raw_segments.iter().any(|segment| segment.is_empty()) {
            return Err(ProviderError::InvalidUri(format!(
                "`{uri}` contains an empty path segment"
            )));
        }
        let segments = raw_segments
            .into_iter()
            .map(|segment| {
                percent_decode_str(segment)
                    .decode_utf8()
                    .map(|decoded| decoded.into_owned())
                    .map_err(|_| {
                        ProviderError::InvalidUri(format!(
                            "`{uri}` has a segment that is not valid UTF-8 once decoded"
                        ))
                    })
            })
            .collect::<ProviderResult<Vec<_>>>()?;

        Ok(Self {
            authority: authority.to_string(),
            segments,
        })
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Encoded path without the leading slash, e.g. `rooms/R1`.
    pub fn path(&self) -> String {
        self.segments
            .iter()
            .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn with_appended_segment(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self {
            authority: self.authority.clone(),
            segments,
        }
    }
}

impl fmt::Display for ResourceUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{CONTENT_SCHEME}://{}", self.authority)?;
        for segment in &self.segments {
            write!(f, "/{}", utf8_percent_encode(segment, SEGMENT))?;
        }
        Ok(())
    }
}

impl FromStr for ResourceUri {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// One of the three resource families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Jobs,
    Rooms,
    Windows,
}

impl Resource {
    pub const ALL: [Resource; 3] = [Resource::Jobs, Resource::Rooms, Resource::Windows];

    /// First path segment of this family.
    pub fn path(self) -> &'static str {
        match self {
            Self::Jobs => "jobs",
            Self::Rooms => "rooms",
            Self::Windows => "windows",
        }
    }

    pub fn table(self) -> &'static str {
        match self {
            Self::Jobs => tables::JOBS,
            Self::Rooms => tables::ROOMS,
            Self::Windows => tables::WINDOWS,
        }
    }

    /// Every column the family exposes, identifier first.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Self::Jobs => jobs::COLUMNS,
            Self::Rooms => rooms::COLUMNS,
            Self::Windows => windows::COLUMNS,
        }
    }

    /// Collection uri, e.g. `content://<authority>/rooms`.
    pub fn content_uri(self) -> ResourceUri {
        ResourceUri::new(CONTENT_AUTHORITY, [self.path()])
    }

    /// Item uri for `id`; reserved characters are encoded on display.
    pub fn build_item_uri(self, id: &str) -> ResourceUri {
        self.content_uri().with_appended_segment(id)
    }

    /// Extracts the identifier segment from `<family>/<id>`.
    pub fn get_id(self, uri: &ResourceUri) -> ProviderResult<String> {
        match uri.segments() {
            [family, id] if family == self.path() => Ok(id.clone()),
            _ => Err(ProviderError::MalformedIdentifier(uri.to_string())),
        }
    }

    /// Content type of a collection of this family.
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Jobs => "vnd.android.cursor.dir/vnd.csquote.job",
            Self::Rooms => "vnd.android.cursor.dir/vnd.csquote.room",
            Self::Windows => "vnd.android.cursor.dir/vnd.csquote.window",
        }
    }

    /// Content type of a single item of this family.
    pub fn content_item_type(self) -> &'static str {
        match self {
            Self::Jobs => "vnd.android.cursor.item/vnd.csquote.job",
            Self::Rooms => "vnd.android.cursor.item/vnd.csquote.room",
            Self::Windows => "vnd.android.cursor.item/vnd.csquote.window",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Resource, ResourceUri, CONTENT_AUTHORITY};
    use crate::error::ProviderError;

    const DIR_TYPE_PREFIX: &str = "vnd.android.cursor.dir/vnd.csquote.";
    const ITEM_TYPE_PREFIX: &str = "vnd.android.cursor.item/vnd.csquote.";

    #[test]
    fn parse_and_display_agree() {
        let raw = format!("content://{CONTENT_AUTHORITY}/rooms/R1");
        let uri = ResourceUri::parse(&raw).unwrap();
        assert_eq!(uri.authority(), CONTENT_AUTHORITY);
        assert_eq!(uri.segments(), ["rooms", "R1"]);
        assert_eq!(uri.to_string(), raw);
    }

    #[test]
    fn parse_ignores_single_trailing_slash() {
        let uri: ResourceUri = format!("content://{CONTENT_AUTHORITY}/jobs/")
            .parse()
            .unwrap();
        assert_eq!(uri.segments(), ["jobs"]);
    }

    #[test]
    fn parse_rejects_bad_shapes() {
        for raw in [
            "jobs/J1",
            "http://host/jobs",
            "content:///jobs",
            "content://host/jobs//J1",
        ] {
            let err = ResourceUri::parse(raw).unwrap_err();
            assert!(matches!(err, ProviderError::InvalidUri(_)), "{raw}");
        }
    }

    #[test]
    fn item_uri_round_trips_through_get_id() {
        for resource in Resource::ALL {
            let uri = resource.build_item_uri("abc-1");
            assert_eq!(resource.get_id(&uri).unwrap(), "abc-1");
        }
    }

    #[test]
    fn reserved_characters_in_ids_survive_display_and_parse() {
        for id in ["A/1", "a b", "x?y", "50%", "résumé#2"] {
            let uri = Resource::Jobs.build_item_uri(id);
            let printed = uri.to_string();
            let reparsed = ResourceUri::parse(&printed).unwrap();
            assert_eq!(reparsed, uri, "{printed}");
            assert_eq!(Resource::Jobs.get_id(&reparsed).unwrap(), id);
        }
        assert_eq!(
            Resource::Jobs.build_item_uri("A/1").to_string(),
            format!("content://{CONTENT_AUTHORITY}/jobs/A%2F1")
        );
        assert_eq!(Resource::Rooms.build_item_uri("a b").path(), "rooms/a%20b");
    }

    #[test]
    fn parse_rejects_segments_that_decode_to_invalid_utf8() {
        let err = ResourceUri::parse(&format!("content://{CONTENT_AUTHORITY}/jobs/%FF")).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidUri(_)));
    }

    #[test]
    fn get_id_rejects_collection_and_foreign_uris() {
        let err = Resource::Jobs
            .get_id(&Resource::Jobs.content_uri())
            .unwrap_err();
        assert!(matches!(err, ProviderError::MalformedIdentifier(_)));

        let err = Resource::Jobs
            .get_id(&Resource::Rooms.build_item_uri("R1"))
            .unwrap_err();
        assert!(matches!(err, ProviderError::MalformedIdentifier(_)));
    }

    #[test]
    fn content_types_distinguish_collection_and_item() {
        for resource in Resource::ALL {
            assert!(resource.content_type().starts_with(DIR_TYPE_PREFIX));
            assert!(resource.content_item_type().starts_with(ITEM_TYPE_PREFIX));
            let entity = &resource.content_type()[DIR_TYPE_PREFIX.len()..];
            assert_eq!(&resource.content_item_type()[ITEM_TYPE_PREFIX.len()..], entity);
        }
    }

    #[test]
    fn every_family_exposes_id_first() {
        for resource in Resource::ALL {
            assert_eq!(resource.columns()[0], "_id");
        }
    }
}
