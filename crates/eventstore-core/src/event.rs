//! Event read model
//!
//! Events are immutable once ingested. A query populates only the fields
//! for the columns it projected; the full body stays in the node store.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::column::{Column, FULL_COLUMNS};
use crate::error::EventStoreError;
use crate::node::{NodeHolder, NodeRef};
use crate::query::{Row, Value};

/// Unique key of an event: `(project_id, event_id)`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventKey {
    pub project_id: u64,
    pub event_id: String,
}

impl EventKey {
    pub fn new(project_id: u64, event_id: impl Into<String>) -> Self {
        Self {
            project_id,
            event_id: event_id.into(),
        }
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.project_id, self.event_id)
    }
}

/// An event as seen through the query backend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub event_id: String,
    pub project_id: u64,
    pub group_id: Option<u64>,
    pub timestamp: DateTime<Utc>,

    pub culprit: Option<String>,
    pub location: Option<String>,
    pub message: Option<String>,
    pub platform: Option<String>,
    pub title: Option<String>,
    #[serde(rename = "type")]
    pub event_type: Option<String>,

    pub tag_keys: Option<Vec<String>>,
    pub tag_values: Option<Vec<String>>,

    pub email: Option<String>,
    pub ip_address: Option<String>,
    pub user_id: Option<String>,
    pub username: Option<String>,

    /// Reference to the full body in the node store
    #[serde(skip)]
    pub data: NodeRef,
}

impl Event {
    /// Create an event stub with only the minimal fields set
    pub fn new(
        project_id: u64,
        event_id: impl Into<String>,
        group_id: Option<u64>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let event_id = event_id.into();
        let data = NodeRef::for_event(project_id, &event_id);
        Self {
            event_id,
            project_id,
            group_id,
            timestamp,
            culprit: None,
            location: None,
            message: None,
            platform: None,
            title: None,
            event_type: None,
            tag_keys: None,
            tag_values: None,
            email: None,
            ip_address: None,
            user_id: None,
            username: None,
            data,
        }
    }

    pub fn key(&self) -> EventKey {
        EventKey::new(self.project_id, self.event_id.clone())
    }

    /// Replace the node reference
    pub fn with_node(mut self, data: NodeRef) -> Self {
        self.data = data;
        self
    }

    /// Tags as key/value pairs, if both tag columns were projected
    pub fn tags(&self) -> Option<Vec<(String, String)>> {
        let keys = self.tag_keys.as_ref()?;
        let values = self.tag_values.as_ref()?;
        Some(keys.iter().cloned().zip(values.iter().cloned()).collect())
    }

    /// Look up a single tag value
    pub fn tag(&self, key: &str) -> Option<&str> {
        let keys = self.tag_keys.as_ref()?;
        let values = self.tag_values.as_ref()?;
        keys.iter()
            .position(|k| k == key)
            .and_then(|i| values.get(i))
            .map(String::as_str)
    }

    /// The value this event holds for a column
    pub fn value(&self, column: Column) -> Value {
        match column {
            Column::EventId => Value::from(self.event_id.as_str()),
            Column::GroupId => Value::from(self.group_id),
            Column::ProjectId => Value::from(self.project_id),
            Column::Timestamp => Value::from(self.timestamp),
            Column::Culprit => Value::from(self.culprit.clone()),
            Column::Location => Value::from(self.location.clone()),
            Column::Message => Value::from(self.message.clone()),
            Column::Platform => Value::from(self.platform.clone()),
            Column::Title => Value::from(self.title.clone()),
            Column::Type => Value::from(self.event_type.clone()),
            Column::TagsKey => Value::from(self.tag_keys.clone()),
            Column::TagsValue => Value::from(self.tag_values.clone()),
            Column::Email => Value::from(self.email.clone()),
            Column::IpAddress => Value::from(self.ip_address.clone()),
            Column::UserId => Value::from(self.user_id.clone()),
            Column::Username => Value::from(self.username.clone()),
        }
    }

    /// Every column of this event as a backend row
    pub fn to_row(&self) -> Row {
        FULL_COLUMNS
            .iter()
            .map(|column| (*column, self.value(*column)))
            .collect()
    }

    /// Build an event from a projected backend row
    ///
    /// The identity columns and the timestamp are required; every other
    /// column is populated only if the row carries it.
    pub fn from_row(row: &Row) -> Result<Self, EventStoreError> {
        let event_id = required(row, Column::EventId, take_str)?;
        let project_id = required(row, Column::ProjectId, take_id)?;
        let timestamp = required(row, Column::Timestamp, take_timestamp)?;
        let group_id = take_id(row, Column::GroupId)?;

        let mut event = Event::new(project_id, event_id, group_id, timestamp);
        event.culprit = take_str(row, Column::Culprit)?;
        event.location = take_str(row, Column::Location)?;
        event.message = take_str(row, Column::Message)?;
        event.platform = take_str(row, Column::Platform)?;
        event.title = take_str(row, Column::Title)?;
        event.event_type = take_str(row, Column::Type)?;
        event.tag_keys = take_list(row, Column::TagsKey)?;
        event.tag_values = take_list(row, Column::TagsValue)?;
        event.email = take_str(row, Column::Email)?;
        event.ip_address = take_str(row, Column::IpAddress)?;
        event.user_id = take_str(row, Column::UserId)?;
        event.username = take_str(row, Column::Username)?;
        Ok(event)
    }
}

impl NodeHolder for Event {
    fn node_ref(&self) -> &NodeRef {
        &self.data
    }
}

fn required<T>(
    row: &Row,
    column: Column,
    take: fn(&Row, Column) -> Result<Option<T>, EventStoreError>,
) -> Result<T, EventStoreError> {
    take(row, column)?
        .ok_or_else(|| EventStoreError::invalid_row(format!("missing required column {}", column)))
}

fn mistyped(column: Column, value: &Value) -> EventStoreError {
    EventStoreError::invalid_row(format!("unexpected value for {}: {:?}", column, value))
}

fn take_str(row: &Row, column: Column) -> Result<Option<String>, EventStoreError> {
    match row.get(&column) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Str(s)) => Ok(Some(s.clone())),
        Some(other) => Err(mistyped(column, other)),
    }
}

fn take_id(row: &Row, column: Column) -> Result<Option<u64>, EventStoreError> {
    match row.get(&column) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .map(Some)
            .ok_or_else(|| mistyped(column, value)),
    }
}

fn take_timestamp(row: &Row, column: Column) -> Result<Option<DateTime<Utc>>, EventStoreError> {
    match row.get(&column) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Timestamp(ts)) => Ok(Some(*ts)),
        Some(other) => Err(mistyped(column, other)),
    }
}

fn take_list(row: &Row, column: Column) -> Result<Option<Vec<String>>, EventStoreError> {
    match row.get(&column) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::StrList(list)) => Ok(Some(list.clone())),
        Some(other) => Err(mistyped(column, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::MINIMAL_COLUMNS;
    use crate::node::NodeId;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn sample() -> Event {
        let mut event = Event::new(42, "e1", Some(7), ts(100));
        event.message = Some("boom".into());
        event.tag_keys = Some(vec!["level".into(), "os".into()]);
        event.tag_values = Some(vec!["error".into(), "linux".into()]);
        event.username = Some("jane".into());
        event
    }

    #[test]
    fn test_new_event_references_its_node() {
        let event = Event::new(42, "e1", None, ts(100));
        assert_eq!(event.data.id(), Some(NodeId::for_event(42, "e1")));
        assert_eq!(event.key(), EventKey::new(42, "e1"));
        assert_eq!(event.key().to_string(), "42:e1");
    }

    #[test]
    fn test_row_roundtrip() {
        let event = sample();
        let row = event.to_row();
        assert_eq!(row.len(), FULL_COLUMNS.len());
        assert_eq!(Event::from_row(&row).unwrap(), event);
    }

    #[test]
    fn test_partial_row_leaves_other_fields_empty() {
        let full = sample().to_row();
        let row: Row = full
            .into_iter()
            .filter(|(column, _)| MINIMAL_COLUMNS.contains(column))
            .collect();

        let event = Event::from_row(&row).unwrap();
        assert_eq!(event.group_id, Some(7));
        assert!(event.message.is_none());
        assert!(event.tags().is_none());
    }

    #[test]
    fn test_missing_identity_is_invalid() {
        let mut row = sample().to_row();
        row.remove(&Column::ProjectId);
        let err = Event::from_row(&row).unwrap_err();
        assert!(matches!(err, EventStoreError::InvalidRow(_)));
    }

    #[test]
    fn test_mistyped_value_is_invalid() {
        let mut row = sample().to_row();
        row.insert(Column::Message, Value::Int(3));
        assert!(Event::from_row(&row).is_err());
    }

    #[test]
    fn test_ids_above_i64_roundtrip() {
        let event = Event::new(u64::MAX, "e1", Some(u64::MAX - 1), ts(100));
        let row = event.to_row();
        assert_eq!(row.get(&Column::ProjectId), Some(&Value::UInt(u64::MAX)));

        let decoded = Event::from_row(&row).unwrap();
        assert_eq!(decoded.project_id, u64::MAX);
        assert_eq!(decoded.group_id, Some(u64::MAX - 1));
    }

    #[test]
    fn test_negative_id_is_invalid() {
        let mut row = sample().to_row();
        row.insert(Column::GroupId, Value::Int(-1));
        assert!(matches!(
            Event::from_row(&row),
            Err(EventStoreError::InvalidRow(_))
        ));
    }

    #[test]
    fn test_tags() {
        let event = sample();
        assert_eq!(event.tag("os"), Some("linux"));
        assert_eq!(event.tag("missing"), None);
        assert_eq!(event.tags().unwrap().len(), 2);
    }
}
