//! Batch body hydration
//!
//! Collects the node references of many records, fetches all bodies with a
//! single multi-get, and hands back fresh bodies without touching the
//! records themselves.

use std::collections::{HashMap, HashSet};

use eventstore_core::{Event, EventKey, NodeData, NodeHolder, NodeId, NodeStore, NodeStoreError};
use tracing::{debug, warn};

/// Fetch the bodies behind a slice of node holders
///
/// Returns one entry per item, aligned with `items`: `None` for items
/// without a node, otherwise the hydrated body (empty when the store has
/// nothing for the node or the stored ref belongs to someone else).
/// Issues exactly one `get_multi`, or none if no item has a node.
pub async fn bind_node_refs<N, T>(
    nodes: &N,
    items: &[T],
) -> Result<Vec<Option<NodeData>>, NodeStoreError>
where
    N: NodeStore + ?Sized,
    T: NodeHolder + Sync,
{
    let mut seen = HashSet::new();
    let node_ids: Vec<NodeId> = items
        .iter()
        .filter_map(|item| item.node_ref().id())
        .filter(|id| seen.insert(*id))
        .collect();

    if node_ids.is_empty() {
        return Ok(vec![None; items.len()]);
    }

    let fetched = nodes.get_multi(&node_ids).await?;
    debug!(
        requested = node_ids.len(),
        found = fetched.len(),
        "Fetched node bodies"
    );

    let bound = items
        .iter()
        .map(|item| {
            let node = item.node_ref();
            let id = node.id()?;
            let body = match fetched.get(&id) {
                Some(data) if data.ref_matches(node.ref_key()) => data.clone().without_ref(),
                Some(data) => {
                    warn!(
                        node = %id.short(),
                        expected = ?node.ref_key(),
                        stored = ?data.stored_ref(),
                        "Node ref mismatch, binding empty body"
                    );
                    NodeData::new()
                }
                None => NodeData::new(),
            };
            Some(body)
        })
        .collect();

    Ok(bound)
}

/// Hydrated bodies keyed by event
///
/// Events without a node reference have no entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundNodes {
    bodies: HashMap<EventKey, NodeData>,
}

impl BoundNodes {
    /// Pair up events with the output of [`bind_node_refs`]
    pub(crate) fn from_bound(events: &[Event], bound: Vec<Option<NodeData>>) -> Self {
        let bodies = events
            .iter()
            .zip(bound)
            .filter_map(|(event, body)| body.map(|body| (event.key(), body)))
            .collect();
        Self { bodies }
    }

    /// Body bound to an event key
    pub fn get(&self, key: &EventKey) -> Option<&NodeData> {
        self.bodies.get(key)
    }

    /// Body bound to an event
    pub fn body_of(&self, event: &Event) -> Option<&NodeData> {
        self.get(&event.key())
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EventKey, &NodeData)> {
        self.bodies.iter()
    }

    /// Combine events with their bodies into new hydrated records
    pub fn into_hydrated(mut self, events: Vec<Event>) -> Vec<HydratedEvent> {
        events
            .into_iter()
            .map(|event| {
                let body = self.bodies.remove(&event.key());
                HydratedEvent { event, body }
            })
            .collect()
    }
}

/// An event together with its hydrated body
#[derive(Debug, Clone, PartialEq)]
pub struct HydratedEvent {
    pub event: Event,
    /// `None` when the event has no node reference
    pub body: Option<NodeData>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use eventstore_core::NodeRef;
    use eventstore_nodestore::InMemoryNodeStore;

    fn event(project_id: u64, event_id: &str) -> Event {
        Event::new(project_id, event_id, None, DateTime::from_timestamp(100, 0).unwrap())
    }

    fn body(message: &str) -> NodeData {
        let mut data = NodeData::new();
        data.insert("message", message);
        data
    }

    #[tokio::test]
    async fn test_single_round_trip() {
        let store = InMemoryNodeStore::new();
        let a = event(1, "a");
        let b = event(1, "b");
        store
            .set(&NodeId::for_event(1, "a"), &body("a").with_ref(1))
            .await
            .unwrap();

        let bound = bind_node_refs(&store, &[a, b]).await.unwrap();
        assert_eq!(bound, vec![Some(body("a")), Some(NodeData::new())]);
        assert_eq!(store.multi_get_calls(), 1);
    }

    #[tokio::test]
    async fn test_no_nodes_means_no_call() {
        let store = InMemoryNodeStore::new();
        let detached = event(1, "a").with_node(NodeRef::detached());

        let bound = bind_node_refs(&store, &[detached]).await.unwrap();
        assert_eq!(bound, vec![None]);
        assert_eq!(store.multi_get_calls(), 0);
    }

    #[tokio::test]
    async fn test_ref_mismatch_binds_empty() {
        let store = InMemoryNodeStore::new();
        let id = NodeId::for_event(1, "a");
        store.set(&id, &body("other tenant").with_ref(2)).await.unwrap();

        let bound = bind_node_refs(&store, &[event(1, "a")]).await.unwrap();
        assert_eq!(bound, vec![Some(NodeData::new())]);
    }

    #[tokio::test]
    async fn test_into_hydrated() {
        let events = vec![event(1, "a"), event(1, "b").with_node(NodeRef::detached())];
        let bound = BoundNodes::from_bound(&events, vec![Some(body("a")), None]);
        assert_eq!(bound.len(), 1);
        assert_eq!(bound.body_of(&events[0]), Some(&body("a")));

        let hydrated = bound.into_hydrated(events.clone());
        assert_eq!(hydrated[0].body, Some(body("a")));
        assert_eq!(hydrated[1].body, None);
        assert_eq!(hydrated[1].event, events[1]);
    }
}
