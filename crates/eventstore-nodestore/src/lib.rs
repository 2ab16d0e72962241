//! # Event Store Node Store
//!
//! Clients for the node store, the key/value blob store that holds full
//! event bodies addressed by [`NodeId`](eventstore_core::NodeId).
//!
//! ## Implementations
//!
//! - **InMemoryNodeStore**: DashMap-backed store for tests and embedding
//! - **FileNodeStore**: sharded directory store with atomic writes and
//!   transparent batch chunking
//!
//! ## Example
//!
//! ```rust,ignore
//! use eventstore_core::{NodeData, NodeId, NodeStore};
//! use eventstore_nodestore::InMemoryNodeStore;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = InMemoryNodeStore::new();
//!     let id = NodeId::for_event(42, "e1");
//!
//!     store.set(&id, &NodeData::new().with_ref(42)).await.unwrap();
//!
//!     let found = store.get_multi(&[id]).await.unwrap();
//!     assert!(found.contains_key(&id));
//! }
//! ```

pub mod file;
pub mod memory;

// Re-exports
pub use file::{CleanupResult, FileNodeStore, NodeStoreConfig};
pub use memory::InMemoryNodeStore;

// Re-export the trait for convenience
pub use eventstore_core::NodeStore;
