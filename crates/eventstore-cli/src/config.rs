use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use eventstore::{EventStorageConfig, RedbBackendConfig};
use eventstore_logging::LogConfig;
use eventstore_nodestore::NodeStoreConfig;
use serde::{Deserialize, Serialize};

/// Settings loaded from the TOML config file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Root directory for the event database and node files
    pub data_dir: PathBuf,
    pub query: EventStorageConfig,
    pub nodestore: NodeStoreConfig,
    pub logging: LogConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            query: EventStorageConfig::default(),
            nodestore: NodeStoreConfig::default(),
            logging: LogConfig {
                default_level: "warn".to_string(),
                ..LogConfig::default()
            },
        }
    }
}

impl AppConfig {
    /// Load a config file, or the defaults when no file is given
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("parse config {}", path.display()))
    }

    /// Parse TOML config text
    ///
    /// The node store lives below `data_dir` unless `[nodestore]` sets its
    /// own `base_dir`.
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let table: toml::Table = raw.parse()?;
        let explicit_nodes = table
            .get("nodestore")
            .and_then(|nodestore| nodestore.get("base_dir"))
            .is_some();

        let mut config: Self = toml::Value::Table(table).try_into()?;
        if !explicit_nodes {
            config.nodestore.base_dir = config.data_dir.join("nodes");
        }
        Ok(config)
    }

    /// Point both stores below `dir`
    pub fn with_data_dir(mut self, dir: PathBuf) -> Self {
        self.nodestore.base_dir = dir.join("nodes");
        self.data_dir = dir;
        self
    }

    pub fn backend(&self) -> RedbBackendConfig {
        RedbBackendConfig {
            db_path: self.data_dir.join("events.redb"),
        }
    }
}

#[derive(Parser)]
#[command(name = "eventstore", about = "Query a local event store")]
pub struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Data directory (overrides the config file)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Load events from a JSON-lines file
    Ingest {
        /// File with one event record per line
        file: PathBuf,
    },
    /// Show one event
    Get {
        project: u64,
        event_id: String,
        /// Extra columns to project
        #[arg(long, value_delimiter = ',')]
        columns: Vec<String>,
        /// Include the stored body
        #[arg(long)]
        body: bool,
    },
    /// List events
    List(ListArgs),
    /// Show the key of the event after the given one
    Next(NeighbourArgs),
    /// Show the key of the event before the given one
    Prev(NeighbourArgs),
    /// Delete stored bodies that no event refers to
    Gc,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Restrict to these projects
    #[arg(long = "project")]
    pub projects: Vec<u64>,
    /// Restrict to these groups
    #[arg(long = "group")]
    pub groups: Vec<u64>,
    /// Extra columns to project
    #[arg(long, value_delimiter = ',')]
    pub columns: Vec<String>,
    /// Ordering terms, `-column` for descending
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub order_by: Vec<String>,
    /// Earliest timestamp (inclusive, RFC 3339)
    #[arg(long)]
    pub start: Option<DateTime<Utc>>,
    /// Latest timestamp (exclusive, RFC 3339)
    #[arg(long)]
    pub end: Option<DateTime<Utc>>,
    #[arg(long)]
    pub limit: Option<usize>,
    #[arg(long, default_value_t = 0)]
    pub offset: usize,
    /// Include stored bodies
    #[arg(long)]
    pub body: bool,
}

#[derive(Debug, Args)]
pub struct NeighbourArgs {
    pub project: u64,
    pub event_id: String,
    /// Step within this group only
    #[arg(long)]
    pub group: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_list() {
        let cli = Cli::try_parse_from([
            "eventstore",
            "--data-dir",
            "/tmp/es",
            "list",
            "--project",
            "42",
            "--order-by",
            "-timestamp,event_id",
            "--columns",
            "message,tags.key",
            "--start",
            "2024-01-01T00:00:00Z",
        ])
        .unwrap();

        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/es")));
        let Command::List(args) = cli.command else {
            panic!("expected list");
        };
        assert_eq!(args.projects, vec![42]);
        assert_eq!(args.order_by, vec!["-timestamp", "event_id"]);
        assert_eq!(args.columns, vec!["message", "tags.key"]);
        assert!(args.start.is_some());
        assert_eq!(args.offset, 0);
    }

    #[test]
    fn test_config_sections() {
        let config = AppConfig::parse(
            r#"
            data_dir = "/srv/events"

            [query]
            default_limit = 25

            [nodestore]
            max_batch_size = 64

            [logging]
            default_level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.query.default_limit, 25);
        assert_eq!(config.query.max_limit, Some(10_000));
        assert_eq!(config.nodestore.max_batch_size, 64);
        assert_eq!(config.logging.default_level, "debug");
        assert_eq!(
            config.backend().db_path,
            PathBuf::from("/srv/events/events.redb")
        );
        assert_eq!(config.nodestore.base_dir, PathBuf::from("/srv/events/nodes"));
    }

    #[test]
    fn test_explicit_node_dir_is_kept() {
        let config = AppConfig::parse(
            r#"
            data_dir = "/srv/events"

            [nodestore]
            base_dir = "/mnt/bodies"
            "#,
        )
        .unwrap();
        assert_eq!(config.nodestore.base_dir, PathBuf::from("/mnt/bodies"));

        let config = AppConfig::parse("").unwrap();
        assert_eq!(config.nodestore.base_dir, PathBuf::from("./data/nodes"));
        assert_eq!(config.logging.default_level, "warn");
    }

    #[test]
    fn test_data_dir_override() {
        let config = AppConfig::default().with_data_dir(PathBuf::from("/tmp/es"));
        assert_eq!(config.nodestore.base_dir, PathBuf::from("/tmp/es/nodes"));
        assert_eq!(config.backend().db_path, PathBuf::from("/tmp/es/events.redb"));
    }
}
