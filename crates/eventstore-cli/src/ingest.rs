//! JSON-lines import
//!
//! One record per line:
//!
//! ```json
//! {"project_id": 42, "event_id": "e1", "group_id": 7,
//!  "timestamp": "2024-05-01T12:00:00Z", "message": "disk full",
//!  "tags": [["level", "error"]], "body": {"exception": "..."}}
//! ```
//!
//! The indexed fields go to the query backend; `body`, if present, is
//! stored in the node store under the event's node id.

use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use eventstore::{Event, NodeData, NodeId, NodeStore, RedbBackend};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, Deserialize)]
pub struct IngestRecord {
    pub project_id: u64,
    pub event_id: String,
    #[serde(default)]
    pub group_id: Option<u64>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub culprit: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, rename = "type")]
    pub event_type: Option<String>,
    #[serde(default)]
    pub tags: Vec<(String, String)>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub body: Option<Map<String, Value>>,
}

impl IngestRecord {
    /// Split into the indexed event and its body
    pub fn into_parts(self) -> (Event, Option<NodeData>) {
        let mut event = Event::new(self.project_id, self.event_id, self.group_id, self.timestamp);
        event.culprit = self.culprit;
        event.location = self.location;
        event.message = self.message;
        event.platform = self.platform;
        event.title = self.title;
        event.event_type = self.event_type;
        if !self.tags.is_empty() {
            let (keys, values) = self.tags.into_iter().unzip();
            event.tag_keys = Some(keys);
            event.tag_values = Some(values);
        }
        event.email = self.email;
        event.ip_address = self.ip_address;
        event.user_id = self.user_id;
        event.username = self.username;

        let body = self
            .body
            .map(|map| NodeData::from_map(map).with_ref(event.project_id));
        (event, body)
    }
}

/// Outcome of an import
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize)]
pub struct IngestSummary {
    /// Records read
    pub records: usize,
    /// Records whose key was not stored before
    pub new_events: usize,
    /// Bodies written to the node store
    pub bodies: usize,
}

/// Import a JSON-lines file; blank lines are skipped
#[instrument(skip(backend, nodes), fields(path = %path.display()))]
pub async fn ingest_file<N>(
    backend: &RedbBackend,
    nodes: &N,
    path: &Path,
) -> anyhow::Result<IngestSummary>
where
    N: NodeStore + ?Sized,
{
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("read {}", path.display()))?;

    let mut summary = IngestSummary::default();
    for (index, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let record: IngestRecord = serde_json::from_str(line)
            .with_context(|| format!("{}:{}: invalid record", path.display(), index + 1))?;
        let (event, body) = record.into_parts();

        if let Some(body) = body {
            nodes
                .set(&NodeId::for_event(event.project_id, &event.event_id), &body)
                .await?;
            summary.bodies += 1;
        }
        if backend.insert(&event)? {
            summary.new_events += 1;
        }
        summary.records += 1;
        debug!(event = %event.key(), "Ingested event");
    }

    info!(
        records = summary.records,
        new_events = summary.new_events,
        "Ingest complete"
    );
    Ok(summary)
}
