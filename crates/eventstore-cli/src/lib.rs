//! Command-line access to a local event store
//!
//! Events live in a redb database and their bodies in a sharded file node
//! store, both under one data directory.

pub mod app;
pub mod config;
pub mod ingest;

pub use app::{App, EventOutput, Step, to_json};
pub use config::{AppConfig, Cli, Command};
