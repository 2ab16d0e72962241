//! Command implementations over the on-disk stores

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use eventstore::{
    BackendEventStorage, Column, Condition, Event, EventKey, EventQuery, EventStorage, FilterKeys,
    NodeData, NodeId, OrderBy, RedbBackend, parse_columns,
};
use eventstore_nodestore::{CleanupResult, FileNodeStore};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::config::{AppConfig, ListArgs, NeighbourArgs};
use crate::ingest::{IngestSummary, ingest_file};

/// An event as printed, with its body when one was requested
#[derive(Debug, Serialize)]
pub struct EventOutput {
    #[serde(flatten)]
    pub event: Event,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<NodeData>,
}

/// Which neighbour to look up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Next,
    Prev,
}

/// Event store opened from an [`AppConfig`]
pub struct App {
    storage: BackendEventStorage<RedbBackend, FileNodeStore>,
}

impl App {
    pub async fn open(config: &AppConfig) -> anyhow::Result<Self> {
        let backend = RedbBackend::open(config.backend()).context("open event database")?;
        let nodes = FileNodeStore::new(config.nodestore.clone())
            .await
            .context("open node store")?;

        Ok(Self {
            storage: BackendEventStorage::with_config(
                Arc::new(backend),
                Arc::new(nodes),
                config.query.clone(),
            ),
        })
    }

    pub fn storage(&self) -> &BackendEventStorage<RedbBackend, FileNodeStore> {
        &self.storage
    }

    pub async fn ingest(&self, path: &Path) -> anyhow::Result<IngestSummary> {
        ingest_file(self.storage.backend(), self.storage.nodes().as_ref(), path).await
    }

    pub async fn get(
        &self,
        project_id: u64,
        event_id: &str,
        columns: &[String],
        with_body: bool,
    ) -> anyhow::Result<EventOutput> {
        let columns = parse_columns(columns)?;
        let event = self
            .storage
            .get_event_by_id(project_id, event_id, &columns)
            .await?;
        let mut output = self.attach_bodies(vec![event], with_body).await?;
        output
            .pop()
            .context("lookup returned no event")
    }

    pub async fn list(&self, args: &ListArgs) -> anyhow::Result<Vec<EventOutput>> {
        let mut params = EventQuery::new()
            .filter_keys(FilterKeys {
                project_ids: args.projects.clone(),
                group_ids: args.groups.clone(),
            })
            .offset(args.offset);

        if !args.columns.is_empty() {
            params = params.column_names(&args.columns)?;
        }
        if !args.order_by.is_empty() {
            let order_by = args
                .order_by
                .iter()
                .map(|term| term.parse::<OrderBy>())
                .collect::<Result<Vec<_>, _>>()?;
            params = params.order_by(order_by);
        }
        if let Some(start) = args.start {
            params = params.start(start);
        }
        if let Some(end) = args.end {
            params = params.end(end);
        }
        if let Some(limit) = args.limit {
            params = params.limit(limit);
        }

        let events = self.storage.get_events(params).await?;
        self.attach_bodies(events, args.body).await
    }

    pub async fn neighbour(
        &self,
        args: &NeighbourArgs,
        step: Step,
    ) -> anyhow::Result<Option<EventKey>> {
        let event = self
            .storage
            .get_event_by_id(args.project, &args.event_id, &[])
            .await?;

        let conditions: Vec<Condition> = args
            .group
            .map(|group| Condition::eq(Column::GroupId, group))
            .into_iter()
            .collect();
        let keys = FilterKeys::for_project(args.project);

        let key = match step {
            Step::Next => {
                self.storage
                    .get_next_event_id(&event, &conditions, &keys)
                    .await?
            }
            Step::Prev => {
                self.storage
                    .get_prev_event_id(&event, &conditions, &keys)
                    .await?
            }
        };
        Ok(key)
    }

    /// Delete bodies whose event is no longer in the database
    pub async fn gc(&self) -> anyhow::Result<CleanupResult> {
        let page_size = self.storage.config().effective_limit(None).max(1);
        let mut live = HashSet::new();
        let mut offset = 0;

        loop {
            let page = self
                .storage
                .get_events(
                    EventQuery::new()
                        .start(DateTime::<Utc>::MIN_UTC)
                        .end(DateTime::<Utc>::MAX_UTC)
                        .offset(offset)
                        .limit(page_size),
                )
                .await?;
            live.extend(
                page.iter()
                    .map(|event| NodeId::for_event(event.project_id, &event.event_id)),
            );
            if page.len() < page_size {
                break;
            }
            offset += page.len();
        }

        let result = self
            .storage
            .nodes()
            .cleanup(|id| live.contains(id))
            .await?;
        info!(
            deleted = result.deleted_count,
            retained = result.retained_count,
            "Node cleanup complete"
        );
        Ok(result)
    }

    async fn attach_bodies(
        &self,
        events: Vec<Event>,
        with_body: bool,
    ) -> anyhow::Result<Vec<EventOutput>> {
        if !with_body {
            return Ok(events
                .into_iter()
                .map(|event| EventOutput { event, body: None })
                .collect());
        }

        let bound = self.storage.bind_nodes(&events).await?;
        Ok(bound
            .into_hydrated(events)
            .into_iter()
            .map(|hydrated| EventOutput {
                event: hydrated.event,
                body: hydrated.body,
            })
            .collect())
    }
}

/// Render any output as pretty JSON
pub fn to_json<T: Serialize>(value: &T) -> anyhow::Result<String> {
    let value: Value = serde_json::to_value(value)?;
    Ok(serde_json::to_string_pretty(&value)?)
}
