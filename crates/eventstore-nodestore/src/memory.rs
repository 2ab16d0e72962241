//! In-memory node store
//!
//! Suitable for tests and for embedding the event store without a blob
//! backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use eventstore_core::{NodeData, NodeId, NodeStore, NodeStoreError};
use tracing::trace;

/// In-memory implementation of NodeStore
///
/// Uses `DashMap` for concurrent access and counts `get_multi` round trips.
#[derive(Debug, Default)]
pub struct InMemoryNodeStore {
    nodes: DashMap<NodeId, NodeData>,
    /// Number of `get_multi` calls served
    multi_get_calls: AtomicUsize,
    /// When set, every call fails as if the store were unreachable
    offline: AtomicBool,
}

impl InMemoryNodeStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `get_multi` calls made so far
    pub fn multi_get_calls(&self) -> usize {
        self.multi_get_calls.load(Ordering::SeqCst)
    }

    /// Number of stored bodies
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Simulate the store going away (or coming back)
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), NodeStoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(NodeStoreError::Unavailable("in-memory node store is offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl NodeStore for InMemoryNodeStore {
    async fn get_multi(&self, ids: &[NodeId]) -> Result<HashMap<NodeId, NodeData>, NodeStoreError> {
        self.multi_get_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;

        let found: HashMap<_, _> = ids
            .iter()
            .filter_map(|id| self.nodes.get(id).map(|data| (*id, data.clone())))
            .collect();

        trace!(requested = ids.len(), found = found.len(), "Served multi-get");
        Ok(found)
    }

    async fn set(&self, id: &NodeId, data: &NodeData) -> Result<(), NodeStoreError> {
        self.check_online()?;
        self.nodes.insert(*id, data.clone());
        Ok(())
    }

    async fn delete_multi(&self, ids: &[NodeId]) -> Result<usize, NodeStoreError> {
        self.check_online()?;
        Ok(ids
            .iter()
            .filter(|id| self.nodes.remove(*id).is_some())
            .count())
    }
}
