//! Backend-agnostic event query service
//!
//! [`BackendEventStorage`] pairs any [`QueryBackend`] with any [`NodeStore`]
//! and implements [`EventStorage`] on top of them. It resolves request
//! defaults, validates the projection and ordering before any I/O, and
//! translates backend failures into [`EventStoreError`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eventstore_core::{
    Column, Condition, DEFAULT_ORDER_BY, Direction, Event, EventKey, EventStoreError,
    FilterKeys, MINIMAL_COLUMNS, NodeStore, OrderBy, Query, QueryBackend, resolve_columns,
};
use tracing::{debug, instrument};

use crate::config::EventStorageConfig;
use crate::hydrate::{BoundNodes, bind_node_refs};
use crate::params::EventQuery;
use crate::EventStorage;

/// Event query service over a query backend and a node store
pub struct BackendEventStorage<B: ?Sized, N: ?Sized> {
    backend: Arc<B>,
    nodes: Arc<N>,
    config: EventStorageConfig,
}

impl<B, N> BackendEventStorage<B, N>
where
    B: QueryBackend + ?Sized,
    N: NodeStore + ?Sized,
{
    /// Create a service with the default configuration
    pub fn new(backend: Arc<B>, nodes: Arc<N>) -> Self {
        Self::with_config(backend, nodes, EventStorageConfig::default())
    }

    pub fn with_config(backend: Arc<B>, nodes: Arc<N>, config: EventStorageConfig) -> Self {
        Self {
            backend,
            nodes,
            config,
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn nodes(&self) -> &Arc<N> {
        &self.nodes
    }

    pub fn config(&self) -> &EventStorageConfig {
        &self.config
    }

    /// Run a resolved query and decode its rows
    async fn run(&self, query: &Query) -> Result<Vec<Event>, EventStoreError> {
        let rows = self.backend.query(query).await?;
        rows.iter().map(Event::from_row).collect()
    }

    /// Query for the event adjacent to `event` in the given direction
    ///
    /// Ascending finds the successor under
    /// `[timestamp, event_id, project_id]`, descending the predecessor
    /// under [`DEFAULT_ORDER_BY`]. Event ids repeat across projects, so the
    /// project id is part of the key being stepped over.
    fn neighbour_query(
        &self,
        event: &Event,
        conditions: &[Condition],
        filter_keys: &FilterKeys,
        direction: Direction,
    ) -> Query {
        let ts = event.timestamp;
        let id = event.event_id.as_str();
        let project_id = event.project_id;

        // With the timestamp bound in place, `(ts, id, project)` is strictly
        // beyond the event iff the timestamp is, or the id is, or the id ties
        // and the project is.
        let (bound, beyond, order_by) = match direction {
            Direction::Asc => (
                Condition::gte(Column::Timestamp, ts),
                Condition::any(vec![
                    Condition::gt(Column::Timestamp, ts),
                    Condition::gt(Column::EventId, id),
                    Condition::all(vec![
                        Condition::eq(Column::EventId, id),
                        Condition::gt(Column::ProjectId, project_id),
                    ]),
                ]),
                DEFAULT_ORDER_BY
                    .iter()
                    .map(|term| OrderBy::asc(term.column))
                    .collect::<Vec<_>>(),
            ),
            Direction::Desc => (
                Condition::lte(Column::Timestamp, ts),
                Condition::any(vec![
                    Condition::lt(Column::Timestamp, ts),
                    Condition::lt(Column::EventId, id),
                    Condition::all(vec![
                        Condition::eq(Column::EventId, id),
                        Condition::lt(Column::ProjectId, project_id),
                    ]),
                ]),
                DEFAULT_ORDER_BY.to_vec(),
            ),
        };

        let mut all_conditions = conditions.to_vec();
        all_conditions.push(bound);
        all_conditions.push(beyond);

        Query {
            columns: MINIMAL_COLUMNS.to_vec(),
            start: DateTime::<Utc>::UNIX_EPOCH,
            end: Utc::now(),
            conditions: all_conditions,
            filter_keys: filter_keys.clone(),
            order_by,
            limit: 1,
            offset: 0,
        }
    }

    async fn neighbour(
        &self,
        event: &Event,
        conditions: &[Condition],
        filter_keys: &FilterKeys,
        direction: Direction,
    ) -> Result<Option<EventKey>, EventStoreError> {
        let query = self.neighbour_query(event, conditions, filter_keys, direction);
        let found = self.run(&query).await?;
        Ok(found.first().map(Event::key))
    }
}

/// Reject orderings the backend cannot sort on
///
/// Tag columns are lists and have no total order.
fn validate_order_by(order_by: &[OrderBy]) -> Result<(), EventStoreError> {
    match order_by
        .iter()
        .find(|o| matches!(o.column, Column::TagsKey | Column::TagsValue))
    {
        Some(o) => Err(EventStoreError::invalid_column(format!(
            "cannot order by list column {}",
            o.column
        ))),
        None => Ok(()),
    }
}

#[async_trait]
impl<B, N> EventStorage for BackendEventStorage<B, N>
where
    B: QueryBackend + ?Sized,
    N: NodeStore + ?Sized,
{
    #[instrument(skip(self, columns))]
    async fn get_event_by_id(
        &self,
        project_id: u64,
        event_id: &str,
        columns: &[Column],
    ) -> Result<Event, EventStoreError> {
        let query = Query {
            columns: resolve_columns(Some(columns)),
            start: DateTime::<Utc>::MIN_UTC,
            end: DateTime::<Utc>::MAX_UTC,
            conditions: vec![Condition::eq(Column::EventId, event_id)],
            filter_keys: FilterKeys::for_project(project_id),
            order_by: DEFAULT_ORDER_BY.to_vec(),
            limit: 1,
            offset: 0,
        };

        self.run(&query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                EventStoreError::not_found(EventKey::new(project_id, event_id).to_string())
            })
    }

    #[instrument(skip(self, params), fields(limit = ?params.limit, offset = params.offset))]
    async fn get_events(&self, params: EventQuery) -> Result<Vec<Event>, EventStoreError> {
        let order_by = params
            .order_by
            .filter(|o| !o.is_empty())
            .unwrap_or_else(|| DEFAULT_ORDER_BY.to_vec());
        validate_order_by(&order_by)?;

        let query = Query {
            columns: resolve_columns(params.columns.as_deref()),
            start: params.start.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            end: params.end.unwrap_or_else(Utc::now),
            conditions: params.conditions,
            filter_keys: params.filter_keys,
            order_by,
            limit: self.config.effective_limit(params.limit),
            offset: params.offset,
        };

        let events = self.run(&query).await?;
        debug!(count = events.len(), "Fetched events");
        Ok(events)
    }

    #[instrument(skip(self, event, conditions, filter_keys), fields(event = %event.key()))]
    async fn get_next_event_id(
        &self,
        event: &Event,
        conditions: &[Condition],
        filter_keys: &FilterKeys,
    ) -> Result<Option<EventKey>, EventStoreError> {
        self.neighbour(event, conditions, filter_keys, Direction::Asc)
            .await
    }

    #[instrument(skip(self, event, conditions, filter_keys), fields(event = %event.key()))]
    async fn get_prev_event_id(
        &self,
        event: &Event,
        conditions: &[Condition],
        filter_keys: &FilterKeys,
    ) -> Result<Option<EventKey>, EventStoreError> {
        self.neighbour(event, conditions, filter_keys, Direction::Desc)
            .await
    }

    #[instrument(skip_all, fields(events = events.len()))]
    async fn bind_nodes(&self, events: &[Event]) -> Result<BoundNodes, EventStoreError> {
        let bound = bind_node_refs(self.nodes.as_ref(), events).await?;
        Ok(BoundNodes::from_bound(events, bound))
    }
}
