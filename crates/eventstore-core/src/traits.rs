//! Capability traits consumed by the event query service
//!
//! - [`QueryBackend`]: columnar query execution over stored events
//! - [`NodeStore`]: batch key/value access to event bodies

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::{BackendError, NodeStoreError};
use crate::node::{NodeData, NodeId};
use crate::query::{Query, Row};

/// Query execution over stored events
///
/// Implementations receive a fully resolved [`Query`] and return rows
/// containing exactly the requested columns, ordered and paginated as asked.
#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// Run a query
    async fn query(&self, query: &Query) -> Result<Vec<Row>, BackendError>;
}

/// Batch access to event bodies
///
/// Lookups are multi-gets: absent nodes are simply missing from the result
/// and are never an error.
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Fetch many bodies in one call
    ///
    /// The response carries no ordering guarantee. Implementations may split
    /// large requests into backend-sized chunks internally.
    async fn get_multi(&self, ids: &[NodeId]) -> Result<HashMap<NodeId, NodeData>, NodeStoreError>;

    /// Fetch a single body
    async fn get(&self, id: &NodeId) -> Result<Option<NodeData>, NodeStoreError> {
        let mut found = self.get_multi(std::slice::from_ref(id)).await?;
        Ok(found.remove(id))
    }

    /// Store a body, replacing any previous one
    async fn set(&self, id: &NodeId, data: &NodeData) -> Result<(), NodeStoreError>;

    /// Remove bodies, returning how many existed
    async fn delete_multi(&self, ids: &[NodeId]) -> Result<usize, NodeStoreError>;
}
