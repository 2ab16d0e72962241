//! In-memory query backend

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use eventstore_core::{BackendError, Event, EventKey, Query, QueryBackend, Row};
use tracing::trace;

use crate::filter;

/// In-memory implementation of QueryBackend
///
/// Holds full events keyed by `(project_id, event_id)` and answers queries
/// by scanning them.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    events: DashMap<EventKey, Event>,
    /// Number of queries served
    queries: AtomicUsize,
    /// When set, every query fails as if the backend were unreachable
    offline: AtomicBool,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a backend preloaded with events
    pub fn with_events(events: impl IntoIterator<Item = Event>) -> Self {
        let backend = Self::new();
        for event in events {
            backend.insert(event);
        }
        backend
    }

    /// Store an event, replacing any earlier one with the same key
    ///
    /// Returns `true` if the key was new.
    pub fn insert(&self, event: Event) -> bool {
        self.events.insert(event.key(), event).is_none()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of queries served so far
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Simulate the backend going away (or coming back)
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl QueryBackend for InMemoryBackend {
    async fn query(&self, query: &Query) -> Result<Vec<Row>, BackendError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("in-memory backend is offline".into()));
        }

        let rows: Vec<Row> = self.events.iter().map(|entry| entry.value().to_row()).collect();
        let result = filter::execute(rows, query);

        trace!(scanned = self.events.len(), returned = result.len(), "Served query");
        Ok(result)
    }
}
