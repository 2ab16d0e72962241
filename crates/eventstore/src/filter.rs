//! In-process query evaluation
//!
//! Shared by the bundled backends: both hold full rows and answer a
//! [`Query`] by filtering, ordering, paginating, and projecting them here.

use std::cmp::Ordering;

use eventstore_core::{Column, Condition, FilterKeys, Operator, OrderBy, Query, Row, Value};

/// Trailing ordering applied after the requested one so that results are
/// deterministic even when the caller's ordering has ties.
const TIE_BREAK: [OrderBy; 2] = [OrderBy::asc(Column::ProjectId), OrderBy::asc(Column::EventId)];

/// Answer a query over a set of full rows
pub fn execute(rows: impl IntoIterator<Item = Row>, query: &Query) -> Vec<Row> {
    let mut matching: Vec<Row> = rows.into_iter().filter(|row| matches_query(row, query)).collect();

    matching.sort_by(|a, b| {
        compare_rows(a, b, &query.order_by).then_with(|| compare_rows(a, b, &TIE_BREAK))
    });

    matching
        .into_iter()
        .skip(query.offset)
        .take(query.limit)
        .map(|row| project(row, &query.columns))
        .collect()
}

/// Whether a full row satisfies the time range, scope, and every condition
pub fn matches_query(row: &Row, query: &Query) -> bool {
    in_time_range(row, query)
        && matches_filter_keys(row, &query.filter_keys)
        && query.conditions.iter().all(|c| matches_condition(row, c))
}

/// Half-open range check: `start <= timestamp < end`
fn in_time_range(row: &Row, query: &Query) -> bool {
    match row.get(&Column::Timestamp) {
        Some(Value::Timestamp(ts)) => *ts >= query.start && *ts < query.end,
        _ => false,
    }
}

/// Scope check against project/group filter keys
pub fn matches_filter_keys(row: &Row, keys: &FilterKeys) -> bool {
    let project_id = row.get(&Column::ProjectId).and_then(Value::as_u64);
    let group_id = row.get(&Column::GroupId).and_then(Value::as_u64);

    match project_id {
        Some(project_id) => keys.matches(project_id, group_id),
        None => false,
    }
}

/// Evaluate a single condition
///
/// Comparisons against `Null` only succeed for `Eq`/`Ne` with a `Null`
/// operand, mirroring `IS NULL` / `IS NOT NULL`.
pub fn matches_condition(row: &Row, condition: &Condition) -> bool {
    match condition {
        Condition::Any(inner) => inner.iter().any(|c| matches_condition(row, c)),
        Condition::All(inner) => inner.iter().all(|c| matches_condition(row, c)),
        Condition::Compare { column, op, value } => {
            let actual = row.get(column).unwrap_or(&Value::Null);
            compare(actual, *op, value)
        }
    }
}

fn compare(actual: &Value, op: Operator, expected: &Value) -> bool {
    match op {
        Operator::Eq => actual.matches(expected),
        Operator::Ne => !actual.matches(expected),
        Operator::In => contains(expected, actual),
        Operator::NotIn => !actual.is_null() && !contains(expected, actual),
        Operator::Like => match (actual, expected) {
            (Value::Str(text), Value::Str(pattern)) => like(text, pattern),
            _ => false,
        },
        Operator::Lt | Operator::Lte | Operator::Gt | Operator::Gte => {
            if actual.is_null() || expected.is_null() {
                return false;
            }
            match actual.compare(expected) {
                Some(ordering) => match op {
                    Operator::Lt => ordering == Ordering::Less,
                    Operator::Lte => ordering != Ordering::Greater,
                    Operator::Gt => ordering == Ordering::Greater,
                    _ => ordering != Ordering::Less,
                },
                None => false,
            }
        }
    }
}

/// Membership test for `In`/`NotIn`
///
/// A list operand holds the candidates. A list-valued column (tags) matches
/// when any of its elements is a candidate.
fn contains(candidates: &Value, actual: &Value) -> bool {
    let is_candidate = |value: &Value| match candidates {
        Value::StrList(list) => matches!(value, Value::Str(s) if list.contains(s)),
        Value::List(list) => list.iter().any(|candidate| value.matches(candidate)),
        Value::Null => false,
        single => value.matches(single),
    };

    match actual {
        Value::Null => false,
        Value::StrList(items) => items
            .iter()
            .any(|item| is_candidate(&Value::Str(item.clone()))),
        scalar => is_candidate(scalar),
    }
}

/// SQL-style `LIKE` where `%` matches any run of characters
fn like(text: &str, pattern: &str) -> bool {
    let parts: Vec<&str> = pattern.split('%').collect();
    if parts.len() == 1 {
        return text == pattern;
    }

    let first = parts[0];
    let last = parts[parts.len() - 1];
    if !text.starts_with(first) || text.len() < first.len() + last.len() {
        return false;
    }

    let mut rest = &text[first.len()..];
    for part in &parts[1..parts.len() - 1] {
        match rest.find(part) {
            Some(pos) => rest = &rest[pos + part.len()..],
            None => return false,
        }
    }
    rest.ends_with(last)
}

/// Compare two rows under an ordering
pub fn compare_rows(a: &Row, b: &Row, order_by: &[OrderBy]) -> Ordering {
    for term in order_by {
        let left = a.get(&term.column).unwrap_or(&Value::Null);
        let right = b.get(&term.column).unwrap_or(&Value::Null);
        let ordering = left.compare(right).unwrap_or(Ordering::Equal);
        let ordering = match term.direction {
            eventstore_core::Direction::Asc => ordering,
            eventstore_core::Direction::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Keep only the requested columns
pub fn project(mut row: Row, columns: &[Column]) -> Row {
    row.retain(|column, _| columns.contains(column));
    row
}
