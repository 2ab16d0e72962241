//! Column catalog
//!
//! The fixed set of event fields a query backend can project, filter, and
//! order by. Every column maps to exactly one backend column name.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EventStoreError;

/// Version of the column catalog
///
/// Bumped whenever a column is added to or removed from [`Column`].
pub const CATALOG_VERSION: u32 = 1;

/// A queryable event field
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    EventId,
    GroupId,
    ProjectId,
    Timestamp,
    Culprit,
    Location,
    Message,
    Platform,
    Title,
    Type,
    TagsKey,
    TagsValue,
    Email,
    IpAddress,
    UserId,
    Username,
}

/// Columns needed to bootstrap an [`Event`](crate::Event) stub.
///
/// Callers that load the full body from the node store anyway only need
/// these from the query backend.
pub const MINIMAL_COLUMNS: [Column; 4] = [
    Column::EventId,
    Column::GroupId,
    Column::ProjectId,
    Column::Timestamp,
];

/// Every column the query backend can serve, minimal columns first.
pub const FULL_COLUMNS: [Column; 16] = [
    Column::EventId,
    Column::GroupId,
    Column::ProjectId,
    Column::Timestamp,
    Column::Culprit,
    Column::Location,
    Column::Message,
    Column::Platform,
    Column::Title,
    Column::Type,
    Column::TagsKey,
    Column::TagsValue,
    Column::Email,
    Column::IpAddress,
    Column::UserId,
    Column::Username,
];

impl Column {
    /// Backend column name
    pub const fn as_str(&self) -> &'static str {
        match self {
            Column::EventId => "event_id",
            Column::GroupId => "group_id",
            Column::ProjectId => "project_id",
            Column::Timestamp => "timestamp",
            Column::Culprit => "culprit",
            Column::Location => "location",
            Column::Message => "message",
            Column::Platform => "platform",
            Column::Title => "title",
            Column::Type => "type",
            Column::TagsKey => "tags.key",
            Column::TagsValue => "tags.value",
            Column::Email => "email",
            Column::IpAddress => "ip_address",
            Column::UserId => "user_id",
            Column::Username => "username",
        }
    }

    /// Whether this column belongs to [`MINIMAL_COLUMNS`]
    pub fn is_minimal(&self) -> bool {
        MINIMAL_COLUMNS.contains(self)
    }

    /// Position in [`FULL_COLUMNS`], used to keep projections in catalog order
    fn catalog_position(&self) -> usize {
        FULL_COLUMNS
            .iter()
            .position(|c| c == self)
            .unwrap_or(FULL_COLUMNS.len())
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Column {
    type Err = EventStoreError;

    /// Accepts the backend name (`tags.key`) or the symbolic name (`tags_key`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FULL_COLUMNS
            .iter()
            .copied()
            .find(|c| c.as_str() == s || c.as_str().replace('.', "_") == s)
            .ok_or_else(|| EventStoreError::invalid_column(s))
    }
}

/// Parse a list of column names, failing on the first unknown one
pub fn parse_columns<S: AsRef<str>>(names: &[S]) -> Result<Vec<Column>, EventStoreError> {
    names.iter().map(|name| name.as_ref().parse()).collect()
}

/// Resolve a requested projection into the columns actually sent to the backend
///
/// `None` or an empty request means [`MINIMAL_COLUMNS`]. The minimal columns
/// are always included since an event cannot be built without them.
/// Duplicates are dropped and the result is in catalog order.
pub fn resolve_columns(requested: Option<&[Column]>) -> Vec<Column> {
    let mut columns: Vec<Column> = MINIMAL_COLUMNS.to_vec();
    for column in requested.unwrap_or_default() {
        if !columns.contains(column) {
            columns.push(*column);
        }
    }
    columns.sort_by_key(Column::catalog_position);
    columns
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_is_prefix_of_full() {
        assert_eq!(&FULL_COLUMNS[..MINIMAL_COLUMNS.len()], &MINIMAL_COLUMNS);
        for column in MINIMAL_COLUMNS {
            assert!(column.is_minimal());
        }
        assert!(!Column::Message.is_minimal());
    }

    #[test]
    fn test_backend_names_are_unique() {
        let mut names: Vec<_> = FULL_COLUMNS.iter().map(Column::as_str).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), FULL_COLUMNS.len());
    }

    #[test]
    fn test_parse_backend_and_symbolic_names() {
        assert_eq!("tags.key".parse::<Column>().unwrap(), Column::TagsKey);
        assert_eq!("tags_value".parse::<Column>().unwrap(), Column::TagsValue);
        assert_eq!("ip_address".parse::<Column>().unwrap(), Column::IpAddress);

        let err = "fingerprint".parse::<Column>().unwrap_err();
        assert!(matches!(err, EventStoreError::InvalidColumnSet(ref c) if c == "fingerprint"));
    }

    #[test]
    fn test_parse_columns_fails_fast() {
        let columns = parse_columns(&["event_id", "message"]).unwrap();
        assert_eq!(columns, vec![Column::EventId, Column::Message]);

        let err = parse_columns(&["message", "nope", "also_nope"]).unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_resolve_columns() {
        assert_eq!(resolve_columns(None), MINIMAL_COLUMNS.to_vec());
        assert_eq!(resolve_columns(Some(&[])), MINIMAL_COLUMNS.to_vec());

        let resolved = resolve_columns(Some(&[Column::Username, Column::Message, Column::Message]));
        assert_eq!(
            resolved,
            vec![
                Column::EventId,
                Column::GroupId,
                Column::ProjectId,
                Column::Timestamp,
                Column::Message,
                Column::Username,
            ]
        );

        assert_eq!(resolve_columns(Some(&FULL_COLUMNS)), FULL_COLUMNS.to_vec());
    }
}
