//! Query vocabulary
//!
//! Types handed from the event query service to a [`QueryBackend`](crate::QueryBackend):
//! projected values, predicates, scoping filters, and orderings.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::column::Column;
use crate::error::EventStoreError;

/// A single projected value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Int(i64),
    /// Project and group ids
    UInt(u64),
    Str(String),
    Timestamp(DateTime<Utc>),
    StrList(Vec<String>),
    /// Candidate operand of `In`/`NotIn`
    List(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// An id column value, if it holds a non-negative integer
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(v) => Some(*v),
            Value::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Compare two values of the same kind
    ///
    /// `Null` sorts before everything else. Signed and unsigned integers
    /// compare numerically; other values of different kinds are
    /// incomparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Null, _) => Some(Ordering::Less),
            (_, Value::Null) => Some(Ordering::Greater),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::UInt(a), Value::UInt(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::UInt(b)) => Some(i128::from(*a).cmp(&i128::from(*b))),
            (Value::UInt(a), Value::Int(b)) => Some(i128::from(*a).cmp(&i128::from(*b))),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            (Value::StrList(a), Value::StrList(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Equality across integer kinds, structural otherwise
    pub fn matches(&self, other: &Value) -> bool {
        self == other || self.compare(other) == Some(Ordering::Equal)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::UInt(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Timestamp(value)
    }
}

impl From<Vec<String>> for Value {
    fn from(value: Vec<String>) -> Self {
        Value::StrList(value)
    }
}

impl From<Vec<u64>> for Value {
    fn from(value: Vec<u64>) -> Self {
        Value::List(value.into_iter().map(Value::UInt).collect())
    }
}

impl From<Vec<i64>> for Value {
    fn from(value: Vec<i64>) -> Self {
        Value::List(value.into_iter().map(Value::Int).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// A projected backend row
pub type Row = BTreeMap<Column, Value>;

/// Comparison operator of a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    /// Value is one of the candidates (`StrList`, `List`, or a single
    /// value); a tag list matches when any element is a candidate
    In,
    NotIn,
    /// Substring match on string columns
    Like,
}

/// A backend predicate
///
/// A query's list of conditions is a conjunction; [`Condition::Any`]
/// and [`Condition::All`] nest disjunctions and conjunctions inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Condition {
    Compare {
        column: Column,
        op: Operator,
        value: Value,
    },
    Any(Vec<Condition>),
    All(Vec<Condition>),
}

impl Condition {
    pub fn new(column: Column, op: Operator, value: impl Into<Value>) -> Self {
        Condition::Compare {
            column,
            op,
            value: value.into(),
        }
    }

    pub fn eq(column: Column, value: impl Into<Value>) -> Self {
        Self::new(column, Operator::Eq, value)
    }

    pub fn ne(column: Column, value: impl Into<Value>) -> Self {
        Self::new(column, Operator::Ne, value)
    }

    pub fn lt(column: Column, value: impl Into<Value>) -> Self {
        Self::new(column, Operator::Lt, value)
    }

    pub fn lte(column: Column, value: impl Into<Value>) -> Self {
        Self::new(column, Operator::Lte, value)
    }

    pub fn gt(column: Column, value: impl Into<Value>) -> Self {
        Self::new(column, Operator::Gt, value)
    }

    pub fn gte(column: Column, value: impl Into<Value>) -> Self {
        Self::new(column, Operator::Gte, value)
    }

    pub fn any(conditions: Vec<Condition>) -> Self {
        Condition::Any(conditions)
    }

    pub fn all(conditions: Vec<Condition>) -> Self {
        Condition::All(conditions)
    }

    /// Every column this condition reads
    pub fn columns(&self) -> Vec<Column> {
        match self {
            Condition::Compare { column, .. } => vec![*column],
            Condition::Any(inner) | Condition::All(inner) => {
                inner.iter().flat_map(Condition::columns).collect()
            }
        }
    }
}

/// Project/group scope of a query
///
/// An empty list leaves that dimension unrestricted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterKeys {
    pub project_ids: Vec<u64>,
    pub group_ids: Vec<u64>,
}

impl FilterKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scope to a single project
    pub fn for_project(project_id: u64) -> Self {
        Self {
            project_ids: vec![project_id],
            group_ids: Vec::new(),
        }
    }

    pub fn with_project(mut self, project_id: u64) -> Self {
        self.project_ids.push(project_id);
        self
    }

    pub fn with_group(mut self, group_id: u64) -> Self {
        self.group_ids.push(group_id);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.project_ids.is_empty() && self.group_ids.is_empty()
    }

    /// Whether an event with these ids is inside the scope
    ///
    /// An event without a group never matches a group restriction.
    pub fn matches(&self, project_id: u64, group_id: Option<u64>) -> bool {
        let project_ok = self.project_ids.is_empty() || self.project_ids.contains(&project_id);
        let group_ok = self.group_ids.is_empty()
            || group_id.is_some_and(|group| self.group_ids.contains(&group));
        project_ok && group_ok
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Asc,
    Desc,
}

/// A single ordering term
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: Column,
    pub direction: Direction,
}

impl OrderBy {
    pub const fn asc(column: Column) -> Self {
        Self {
            column,
            direction: Direction::Asc,
        }
    }

    pub const fn desc(column: Column) -> Self {
        Self {
            column,
            direction: Direction::Desc,
        }
    }
}

/// Newest first, event id then project breaking ties so pagination is
/// stable
///
/// `(timestamp, event_id, project_id)` is unique per stored event, so this
/// is a total order; neighbour lookups step through the same order.
pub const DEFAULT_ORDER_BY: [OrderBy; 3] = [
    OrderBy::desc(Column::Timestamp),
    OrderBy::desc(Column::EventId),
    OrderBy::desc(Column::ProjectId),
];

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            Direction::Asc => write!(f, "{}", self.column),
            Direction::Desc => write!(f, "-{}", self.column),
        }
    }
}

impl FromStr for OrderBy {
    type Err = EventStoreError;

    /// `"timestamp"` sorts ascending, `"-timestamp"` descending
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_prefix('-') {
            Some(name) => Ok(OrderBy::desc(name.parse()?)),
            None => Ok(OrderBy::asc(s.parse()?)),
        }
    }
}

/// A fully resolved backend request
///
/// Time range is half-open: `start <= timestamp < end`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub columns: Vec<Column>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub conditions: Vec<Condition>,
    pub filter_keys: FilterKeys,
    pub order_by: Vec<OrderBy>,
    pub limit: usize,
    pub offset: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_compare() {
        assert_eq!(Value::Int(1).compare(&Value::Int(2)), Some(Ordering::Less));
        assert_eq!(Value::Null.compare(&Value::from("a")), Some(Ordering::Less));
        assert_eq!(Value::from("b").compare(&Value::from("a")), Some(Ordering::Greater));
        assert_eq!(Value::Int(1).compare(&Value::from("1")), None);
        assert_eq!(Value::Int(-1).compare(&Value::UInt(u64::MAX)), Some(Ordering::Less));
        assert!(Value::Int(5).matches(&Value::UInt(5)));
        assert!(!Value::Int(5).matches(&Value::from("5")));
    }

    #[test]
    fn test_large_ids_are_kept_exact() {
        assert_eq!(Value::from(u64::MAX), Value::UInt(u64::MAX));
        assert_eq!(Value::from(u64::MAX).as_u64(), Some(u64::MAX));
        assert_eq!(Value::Int(-3).as_u64(), None);
        assert_eq!(
            Value::from(vec![5u64, 6]),
            Value::List(vec![Value::UInt(5), Value::UInt(6)])
        );
    }

    #[test]
    fn test_value_from_option() {
        assert_eq!(Value::from(None::<String>), Value::Null);
        assert_eq!(Value::from(Some(5u64)), Value::UInt(5));
    }

    #[test]
    fn test_filter_keys_matching() {
        let keys = FilterKeys::new();
        assert!(keys.is_empty());
        assert!(keys.matches(1, None));

        let keys = FilterKeys::for_project(42).with_group(7);
        assert!(keys.matches(42, Some(7)));
        assert!(!keys.matches(42, Some(8)));
        assert!(!keys.matches(42, None));
        assert!(!keys.matches(43, Some(7)));
    }

    #[test]
    fn test_order_by_parse() {
        assert_eq!(
            "-timestamp".parse::<OrderBy>().unwrap(),
            OrderBy::desc(Column::Timestamp)
        );
        assert_eq!("event_id".parse::<OrderBy>().unwrap(), OrderBy::asc(Column::EventId));
        assert!("-bogus".parse::<OrderBy>().is_err());

        let rendered: Vec<String> = DEFAULT_ORDER_BY.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["-timestamp", "-event_id", "-project_id"]);
    }

    #[test]
    fn test_condition_columns() {
        let condition = Condition::any(vec![
            Condition::gt(Column::Timestamp, Value::Null),
            Condition::gt(Column::EventId, "abc"),
        ]);
        assert_eq!(condition.columns(), vec![Column::Timestamp, Column::EventId]);

        let nested = Condition::all(vec![
            Condition::eq(Column::EventId, "abc"),
            Condition::gt(Column::ProjectId, 1u64),
        ]);
        assert_eq!(nested.columns(), vec![Column::EventId, Column::ProjectId]);
    }
}
