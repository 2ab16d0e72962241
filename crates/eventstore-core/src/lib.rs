//! # Event Store Core
//!
//! Core types, errors, and capability traits for the event store.
//!
//! This crate holds everything the event query service and its backends
//! agree on, so that neither side has to depend on the other:
//!
//! - [`Column`]: the closed catalog of queryable event fields
//! - [`Event`], [`EventKey`]: the read model produced by queries
//! - [`NodeId`], [`NodeRef`], [`NodeData`]: references to event bodies kept
//!   in the node store
//! - [`Query`], [`Condition`], [`FilterKeys`], [`OrderBy`]: the query
//!   vocabulary handed to a [`QueryBackend`]
//! - [`QueryBackend`], [`NodeStore`]: the two consumed capabilities

pub mod column;
pub mod error;
pub mod event;
pub mod node;
pub mod query;
pub mod traits;

// Re-export main types
pub use column::*;
pub use error::*;
pub use event::*;
pub use node::*;
pub use query::*;
pub use traits::*;
