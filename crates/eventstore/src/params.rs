//! Parameters of a paginated event listing

use chrono::{DateTime, Utc};
use eventstore_core::{Column, Condition, EventStoreError, FilterKeys, OrderBy, parse_columns};

/// Criteria for [`EventStorage::get_events`](crate::EventStorage::get_events)
///
/// Every unset field takes the service default: the Unix epoch to now,
/// minimal columns, newest first, 100 rows from offset 0.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub columns: Option<Vec<Column>>,
    pub conditions: Vec<Condition>,
    pub filter_keys: FilterKeys,
    pub order_by: Option<Vec<OrderBy>>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl EventQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    pub fn end(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    pub fn columns(mut self, columns: impl Into<Vec<Column>>) -> Self {
        self.columns = Some(columns.into());
        self
    }

    /// Set the projection from column names
    pub fn column_names<S: AsRef<str>>(self, names: &[S]) -> Result<Self, EventStoreError> {
        Ok(self.columns(parse_columns(names)?))
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn conditions(mut self, conditions: impl IntoIterator<Item = Condition>) -> Self {
        self.conditions.extend(conditions);
        self
    }

    pub fn filter_keys(mut self, filter_keys: FilterKeys) -> Self {
        self.filter_keys = filter_keys;
        self
    }

    /// Add a project to the scope
    pub fn project(mut self, project_id: u64) -> Self {
        self.filter_keys.project_ids.push(project_id);
        self
    }

    /// Add a group to the scope
    pub fn group(mut self, group_id: u64) -> Self {
        self.filter_keys.group_ids.push(group_id);
        self
    }

    pub fn order_by(mut self, order_by: impl Into<Vec<OrderBy>>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let query = EventQuery::new()
            .project(42)
            .group(7)
            .limit(2)
            .offset(4)
            .order_by([OrderBy::asc(Column::Timestamp)]);

        assert_eq!(query.filter_keys, FilterKeys::for_project(42).with_group(7));
        assert_eq!(query.limit, Some(2));
        assert_eq!(query.offset, 4);
        assert_eq!(query.order_by.unwrap().len(), 1);
        assert!(query.columns.is_none());
    }

    #[test]
    fn test_column_names() {
        let query = EventQuery::new().column_names(&["message", "tags.key"]).unwrap();
        assert_eq!(query.columns, Some(vec![Column::Message, Column::TagsKey]));

        let err = EventQuery::new().column_names(&["nope"]).unwrap_err();
        assert!(matches!(err, EventStoreError::InvalidColumnSet(_)));
    }
}
