//! Query backends
//!
//! - [`InMemoryBackend`]: DashMap of events, for tests and embedding
//! - [`RedbBackend`]: persistent redb tables keyed for range scans on
//!   `(project_id, timestamp)`

mod memory;
mod persistent;

pub use self::memory::InMemoryBackend;
pub use self::persistent::{RedbBackend, RedbBackendConfig};
