//! # Event Store
//!
//! Read access to stored events: point lookups, paginated listings,
//! next/previous navigation, and batch hydration of event bodies.
//!
//! The [`EventStorage`] trait is the service surface. [`BackendEventStorage`]
//! implements it over any [`QueryBackend`] (rows of the column catalog) and
//! any [`NodeStore`] (event bodies):
//!
//! ```text
//! caller ── EventStorage ──┬── QueryBackend  (InMemoryBackend, RedbBackend)
//!                          └── NodeStore     (InMemoryNodeStore, FileNodeStore)
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use eventstore::{BackendEventStorage, EventQuery, EventStorage, InMemoryBackend};
//! use eventstore_nodestore::InMemoryNodeStore;
//!
//! let storage = BackendEventStorage::new(
//!     Arc::new(InMemoryBackend::new()),
//!     Arc::new(InMemoryNodeStore::new()),
//! );
//!
//! let page = storage.get_events(EventQuery::new().project(42).limit(2)).await?;
//! let bodies = storage.bind_nodes(&page).await?;
//! ```

pub mod backend;
pub mod config;
pub mod filter;
pub mod hydrate;
pub mod params;
pub mod service;

use async_trait::async_trait;

pub use backend::{InMemoryBackend, RedbBackend, RedbBackendConfig};
pub use config::{DEFAULT_LIMIT, EventStorageConfig};
pub use eventstore_core::*;
pub use hydrate::{BoundNodes, HydratedEvent, bind_node_refs};
pub use params::EventQuery;
pub use service::BackendEventStorage;

/// Read-only access to stored events
///
/// Implementations hold no per-call state and may be shared across tasks.
/// Failures are reported as [`EventStoreError`] and never retried.
#[async_trait]
pub trait EventStorage: Send + Sync {
    /// Columns sufficient to build an event stub
    fn minimal_columns(&self) -> &'static [Column] {
        &MINIMAL_COLUMNS
    }

    /// Every column the backend can serve
    fn full_columns(&self) -> &'static [Column] {
        &FULL_COLUMNS
    }

    /// Look up one event by its `(project_id, event_id)` key
    ///
    /// The minimal columns are always populated; `columns` adds to them.
    /// Returns [`EventStoreError::NotFound`] if there is no such event.
    async fn get_event_by_id(
        &self,
        project_id: u64,
        event_id: &str,
        columns: &[Column],
    ) -> Result<Event, EventStoreError>;

    /// List events matching the query, at most `limit` of them
    async fn get_events(&self, params: EventQuery) -> Result<Vec<Event>, EventStoreError>;

    /// Key of the event immediately after `event` in `[timestamp, event_id]`
    /// order among those matching the filters, or `None` if it is the last
    async fn get_next_event_id(
        &self,
        event: &Event,
        conditions: &[Condition],
        filter_keys: &FilterKeys,
    ) -> Result<Option<EventKey>, EventStoreError>;

    /// Key of the event immediately before `event`, or `None` if it is the
    /// first
    async fn get_prev_event_id(
        &self,
        event: &Event,
        conditions: &[Condition],
        filter_keys: &FilterKeys,
    ) -> Result<Option<EventKey>, EventStoreError>;

    /// Fetch the bodies of a batch of events in one node store round trip
    ///
    /// Missing bodies come back empty. Events without a node reference get
    /// no entry. The events themselves are left untouched.
    async fn bind_nodes(&self, events: &[Event]) -> Result<BoundNodes, EventStoreError>;
}
