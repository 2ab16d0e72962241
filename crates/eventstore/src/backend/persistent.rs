//! Persistent query backend on redb
//!
//! Two tables:
//!
//! ```text
//! events:    project_id (8B BE) | timestamp µs (8B BE, sign-flipped) | event_id -> postcard Row
//! event_ids: project_id (8B BE) | event_id                                      -> events key
//! ```
//!
//! The `events` key orders rows by project and time, so a query scoped to
//! projects only scans the `[start, end)` slice of each project.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eventstore_core::{
    BackendError, Column, Condition, Event, Operator, Query, QueryBackend, Row, Value,
};
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::filter;

// Key: project_id | timestamp | event_id, Value: postcard-encoded full row
const EVENTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("events");

// Key: project_id | event_id, Value: key into EVENTS
const EVENT_IDS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("event_ids");

/// Configuration for the redb backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedbBackendConfig {
    /// Path to the database file
    pub db_path: PathBuf,
}

impl Default for RedbBackendConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/events.redb"),
        }
    }
}

/// redb-backed implementation of QueryBackend
pub struct RedbBackend {
    db: Arc<Database>,
    config: RedbBackendConfig,
}

fn db_err(e: impl std::fmt::Display) -> BackendError {
    BackendError::Database(e.to_string())
}

impl RedbBackend {
    /// Open or create the database
    #[instrument(skip(config), fields(path = %config.db_path.display()))]
    pub fn open(config: RedbBackendConfig) -> Result<Self, BackendError> {
        if let Some(parent) = config.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(&config.db_path).map_err(db_err)?;

        let backend = Self {
            db: Arc::new(db),
            config,
        };
        backend.init_tables()?;

        info!("Opened event database");
        Ok(backend)
    }

    fn init_tables(&self) -> Result<(), BackendError> {
        let write_txn = self.db.begin_write().map_err(db_err)?;
        write_txn.open_table(EVENTS).map_err(db_err)?;
        write_txn.open_table(EVENT_IDS).map_err(db_err)?;
        write_txn.commit().map_err(db_err)?;
        Ok(())
    }

    /// Get the configuration
    pub fn config(&self) -> &RedbBackendConfig {
        &self.config
    }

    /// Store an event, replacing any earlier one with the same key
    ///
    /// Returns `true` if the key was new.
    #[instrument(skip(self, event), fields(event = %event.key()))]
    pub fn insert(&self, event: &Event) -> Result<bool, BackendError> {
        let primary = event_key(event.project_id, event.timestamp, &event.event_id);
        let secondary = id_key(event.project_id, &event.event_id);
        let encoded = postcard::to_allocvec(&event.to_row())
            .map_err(|e| BackendError::Serialization(e.to_string()))?;

        let write_txn = self.db.begin_write().map_err(db_err)?;
        let is_new = {
            let mut ids = write_txn.open_table(EVENT_IDS).map_err(db_err)?;
            let mut events = write_txn.open_table(EVENTS).map_err(db_err)?;

            let previous = ids
                .insert(secondary.as_slice(), primary.as_slice())
                .map_err(db_err)?
                .map(|old| old.value().to_vec());

            if let Some(old_primary) = &previous {
                events.remove(old_primary.as_slice()).map_err(db_err)?;
            }
            events
                .insert(primary.as_slice(), encoded.as_slice())
                .map_err(db_err)?;

            previous.is_none()
        };
        write_txn.commit().map_err(db_err)?;

        debug!(is_new, "Stored event");
        Ok(is_new)
    }

    /// Number of stored events
    pub fn len(&self) -> Result<u64, BackendError> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let table = read_txn.open_table(EVENTS).map_err(db_err)?;
        table.len().map_err(db_err)
    }

    pub fn is_empty(&self) -> Result<bool, BackendError> {
        Ok(self.len()? == 0)
    }

    /// Load the candidate rows for a query
    ///
    /// Narrows by project/time key ranges or the event id index where the
    /// query allows it; the caller still applies the full query.
    fn candidates(&self, query: &Query) -> Result<Vec<Row>, BackendError> {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        let events = read_txn.open_table(EVENTS).map_err(db_err)?;

        let projects: BTreeSet<u64> = query.filter_keys.project_ids.iter().copied().collect();
        let mut rows = Vec::new();

        if projects.is_empty() {
            for entry in events.iter().map_err(db_err)? {
                let (_, value) = entry.map_err(db_err)?;
                rows.push(decode_row(value.value())?);
            }
            return Ok(rows);
        }

        if let Some(event_id) = point_lookup(query) {
            let ids = read_txn.open_table(EVENT_IDS).map_err(db_err)?;
            for project_id in projects {
                let Some(primary) = ids
                    .get(id_key(project_id, event_id).as_slice())
                    .map_err(db_err)?
                else {
                    continue;
                };
                if let Some(value) = events.get(primary.value()).map_err(db_err)? {
                    rows.push(decode_row(value.value())?);
                }
            }
            return Ok(rows);
        }

        if query.start >= query.end {
            return Ok(rows);
        }

        for project_id in projects {
            let lower = time_prefix(project_id, encode_micros(query.start.timestamp_micros()));
            let upper = time_prefix(project_id, encode_micros(ceil_micros(query.end)));
            for entry in events
                .range(lower.as_slice()..upper.as_slice())
                .map_err(db_err)?
            {
                let (_, value) = entry.map_err(db_err)?;
                rows.push(decode_row(value.value())?);
            }
        }

        Ok(rows)
    }
}

#[async_trait]
impl QueryBackend for RedbBackend {
    #[instrument(skip_all, fields(limit = query.limit, offset = query.offset))]
    async fn query(&self, query: &Query) -> Result<Vec<Row>, BackendError> {
        let candidates = self.candidates(query)?;
        let scanned = candidates.len();
        let result = filter::execute(candidates, query);

        debug!(scanned, returned = result.len(), "Served query");
        Ok(result)
    }
}

/// Event id of a top-level `event_id = ?` condition, if the query has one
fn point_lookup(query: &Query) -> Option<&str> {
    query.conditions.iter().find_map(|condition| match condition {
        Condition::Compare {
            column: Column::EventId,
            op: Operator::Eq,
            value: Value::Str(event_id),
        } => Some(event_id.as_str()),
        _ => None,
    })
}

fn decode_row(bytes: &[u8]) -> Result<Row, BackendError> {
    postcard::from_bytes(bytes).map_err(|e| BackendError::Deserialization(e.to_string()))
}

/// Order-preserving encoding of a microsecond timestamp
fn encode_micros(micros: i64) -> [u8; 8] {
    ((micros as u64) ^ (1 << 63)).to_be_bytes()
}

/// Keys truncate to whole microseconds, so an exclusive upper bound must
/// round up to keep rows from its own microsecond in the scan.
fn ceil_micros(ts: DateTime<Utc>) -> i64 {
    let micros = ts.timestamp_micros();
    if ts.timestamp_subsec_nanos() % 1_000 == 0 {
        micros
    } else {
        micros.saturating_add(1)
    }
}

fn time_prefix(project_id: u64, encoded: [u8; 8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(16);
    key.extend_from_slice(&project_id.to_be_bytes());
    key.extend_from_slice(&encoded);
    key
}

fn event_key(project_id: u64, ts: DateTime<Utc>, event_id: &str) -> Vec<u8> {
    let mut key = time_prefix(project_id, encode_micros(ts.timestamp_micros()));
    key.extend_from_slice(event_id.as_bytes());
    key
}

fn id_key(project_id: u64, event_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + event_id.len());
    key.extend_from_slice(&project_id.to_be_bytes());
    key.extend_from_slice(event_id.as_bytes());
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventstore_core::{DEFAULT_ORDER_BY, FULL_COLUMNS, FilterKeys, MINIMAL_COLUMNS};
    use tempfile::TempDir;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn create_test_backend() -> (RedbBackend, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = RedbBackendConfig {
            db_path: temp_dir.path().join("events.redb"),
        };
        let backend = RedbBackend::open(config).unwrap();
        (backend, temp_dir)
    }

    fn query() -> Query {
        Query {
            columns: MINIMAL_COLUMNS.to_vec(),
            start: DateTime::<Utc>::UNIX_EPOCH,
            end: ts(10_000),
            conditions: Vec::new(),
            filter_keys: FilterKeys::new(),
            order_by: DEFAULT_ORDER_BY.to_vec(),
            limit: 100,
            offset: 0,
        }
    }

    fn event_ids(rows: &[Row]) -> Vec<Event> {
        rows.iter().map(|row| Event::from_row(row).unwrap()).collect()
    }

    #[test]
    fn test_timestamp_encoding_preserves_order() {
        let times = [ts(-5), ts(0), ts(1), ts(1_000_000)];
        let encoded: Vec<[u8; 8]> = times
            .iter()
            .map(|t| encode_micros(t.timestamp_micros()))
            .collect();
        for pair in encoded.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        assert!(
            encode_micros(DateTime::<Utc>::MIN_UTC.timestamp_micros())
                < encode_micros(DateTime::<Utc>::MAX_UTC.timestamp_micros())
        );
    }

    #[tokio::test]
    async fn test_sub_microsecond_end_keeps_earlier_rows() {
        let (backend, _temp) = create_test_backend();
        let stored = DateTime::from_timestamp(100, 200).unwrap();
        backend.insert(&Event::new(1, "a", None, stored)).unwrap();

        let mut q = query();
        q.filter_keys = FilterKeys::for_project(1);
        q.end = DateTime::from_timestamp(100, 700).unwrap();
        assert_eq!(event_ids(&backend.query(&q).await.unwrap()).len(), 1);

        q.end = stored;
        assert!(backend.query(&q).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scan_before_epoch() {
        let (backend, _temp) = create_test_backend();
        backend.insert(&Event::new(1, "old", None, ts(-14_182_940))).unwrap();

        let mut q = query();
        q.filter_keys = FilterKeys::for_project(1);
        q.start = DateTime::<Utc>::MIN_UTC;
        let events = event_ids(&backend.query(&q).await.unwrap());
        assert_eq!(events[0].event_id, "old");
    }

    #[tokio::test]
    async fn test_insert_and_range_query() {
        let (backend, _temp) = create_test_backend();
        for (project, id, secs) in [(1, "a", 100), (1, "b", 200), (1, "c", 300), (2, "d", 200)] {
            backend
                .insert(&Event::new(project, id, None, ts(secs)))
                .unwrap();
        }
        assert_eq!(backend.len().unwrap(), 4);

        let mut q = query();
        q.filter_keys = FilterKeys::for_project(1);
        q.start = ts(100);
        q.end = ts(300);

        let events = event_ids(&backend.query(&q).await.unwrap());
        let ids: Vec<_> = events.iter().map(|e| e.event_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);

        // Unscoped query scans every project
        let events = event_ids(&backend.query(&query()).await.unwrap());
        assert_eq!(events.len(), 4);
    }

    #[tokio::test]
    async fn test_reinsert_moves_event() {
        let (backend, _temp) = create_test_backend();
        assert!(backend.insert(&Event::new(1, "a", None, ts(100))).unwrap());
        assert!(!backend.insert(&Event::new(1, "a", Some(9), ts(500))).unwrap());
        assert_eq!(backend.len().unwrap(), 1);

        let mut q = query();
        q.filter_keys = FilterKeys::for_project(1);
        let events = event_ids(&backend.query(&q).await.unwrap());
        assert_eq!(events[0].timestamp, ts(500));
        assert_eq!(events[0].group_id, Some(9));
    }

    #[tokio::test]
    async fn test_point_lookup_uses_full_projection() {
        let (backend, _temp) = create_test_backend();
        let mut event = Event::new(1, "a", None, ts(100));
        event.message = Some("boom".into());
        backend.insert(&event).unwrap();

        let mut q = query();
        q.columns = FULL_COLUMNS.to_vec();
        q.end = DateTime::<Utc>::MAX_UTC;
        q.filter_keys = FilterKeys::for_project(1);
        q.conditions = vec![Condition::eq(Column::EventId, "a")];

        let rows = backend.query(&q).await.unwrap();
        assert_eq!(Event::from_row(&rows[0]).unwrap(), event);

        q.conditions = vec![Condition::eq(Column::EventId, "missing")];
        assert!(backend.query(&q).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_persistence_and_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let config = RedbBackendConfig {
            db_path: temp_dir.path().join("events.redb"),
        };

        {
            let backend = RedbBackend::open(config.clone()).unwrap();
            backend.insert(&Event::new(1, "a", None, ts(100))).unwrap();
        }

        let backend = RedbBackend::open(config).unwrap();
        assert_eq!(backend.len().unwrap(), 1);
        assert!(!backend.is_empty().unwrap());
    }
}
