//! File-based node store
//!
//! Each body is a JSON file named after its node ID, sharded into
//! subdirectories by the leading hex characters (`ab/cd/abcd...`).

use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use eventstore_core::{NodeData, NodeId, NodeStore, NodeStoreError};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

/// Configuration for the file node store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeStoreConfig {
    /// Base directory for node files
    pub base_dir: PathBuf,
    /// Number of subdirectory levels (for sharding)
    pub shard_depth: u8,
    /// Maximum encoded body size (bytes)
    pub max_blob_size: u64,
    /// Maximum number of nodes read concurrently per chunk of a multi-get
    pub max_batch_size: usize,
}

impl Default for NodeStoreConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("./data/nodes"),
            shard_depth: 2,                   // e.g., ab/cd/abcdef...
            max_blob_size: 100 * 1024 * 1024, // 100MB
            max_batch_size: 500,
        }
    }
}

/// Sharded directory node store
pub struct FileNodeStore {
    config: NodeStoreConfig,
    /// Distinguishes the temp files of concurrent writes
    write_seq: AtomicU64,
}

impl FileNodeStore {
    /// Create a new file node store
    pub async fn new(config: NodeStoreConfig) -> Result<Self, NodeStoreError> {
        fs::create_dir_all(&config.base_dir).await?;

        info!(path = %config.base_dir.display(), "Node store initialized");

        Ok(Self {
            config,
            write_seq: AtomicU64::new(0),
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &NodeStoreConfig {
        &self.config
    }

    /// Check if a node exists
    pub async fn exists(&self, id: &NodeId) -> Result<bool, NodeStoreError> {
        Ok(fs::try_exists(self.node_path(id)).await?)
    }

    /// Load a single node, `None` if it was never written
    async fn load(&self, id: NodeId) -> Result<Option<(NodeId, NodeData)>, NodeStoreError> {
        let bytes = match fs::read(self.node_path(&id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let data: NodeData = serde_json::from_slice(&bytes).map_err(|e| {
            NodeStoreError::Deserialization(format!("node {}: {}", id.short(), e))
        })?;
        Ok(Some((id, data)))
    }

    /// Delete a single node, returning whether it existed
    async fn delete(&self, id: &NodeId) -> Result<bool, NodeStoreError> {
        match fs::remove_file(self.node_path(id)).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Get the file path for a node
    fn node_path(&self, id: &NodeId) -> PathBuf {
        let id_hex = id.to_hex();

        let mut path = self.config.base_dir.clone();

        // Add shard directories
        for i in 0..self.config.shard_depth as usize {
            let start = i * 2;
            let end = start + 2;
            if end <= id_hex.len() {
                path.push(&id_hex[start..end]);
            }
        }

        path.push(&id_hex);
        path
    }

    /// List every stored node (for maintenance)
    pub async fn list_all(&self) -> Result<Vec<NodeId>, NodeStoreError> {
        let mut ids = Vec::new();
        self.collect_nodes(&self.config.base_dir, &mut ids).await?;
        Ok(ids)
    }

    /// Recursively collect node IDs
    fn collect_nodes<'a>(
        &'a self,
        dir: &'a Path,
        ids: &'a mut Vec<NodeId>,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<(), NodeStoreError>> + Send + 'a>> {
        Box::pin(async move {
            let mut entries = fs::read_dir(dir).await?;

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();

                if entry.file_type().await?.is_dir() {
                    self.collect_nodes(&path, ids).await?;
                } else if let Some(name) = path.file_name().and_then(|n| n.to_str())
                    && let Ok(id) = name.parse::<NodeId>()
                {
                    ids.push(id);
                }
            }

            Ok(())
        })
    }

    /// Remove nodes no longer referenced by any event
    ///
    /// Takes a closure that reports whether a node is still live.
    #[instrument(skip_all)]
    pub async fn cleanup<F>(&self, is_live: F) -> Result<CleanupResult, NodeStoreError>
    where
        F: Fn(&NodeId) -> bool,
    {
        let mut result = CleanupResult::default();

        for id in self.list_all().await? {
            if is_live(&id) {
                result.retained_count += 1;
            } else if self.delete(&id).await? {
                result.deleted_count += 1;
            }
        }

        info!(
            deleted = result.deleted_count,
            retained = result.retained_count,
            "Node cleanup complete"
        );

        Ok(result)
    }
}

#[async_trait]
impl NodeStore for FileNodeStore {
    #[instrument(skip_all, fields(requested = ids.len()))]
    async fn get_multi(&self, ids: &[NodeId]) -> Result<HashMap<NodeId, NodeData>, NodeStoreError> {
        let mut seen = HashSet::new();
        let unique: Vec<NodeId> = ids.iter().copied().filter(|id| seen.insert(*id)).collect();

        let mut found = HashMap::with_capacity(unique.len());
        for chunk in unique.chunks(self.config.max_batch_size.max(1)) {
            let loaded = try_join_all(chunk.iter().map(|id| self.load(*id))).await?;
            found.extend(loaded.into_iter().flatten());
        }

        debug!(found = found.len(), "Loaded nodes");
        Ok(found)
    }

    #[instrument(skip(self, data), fields(node = %id.short()))]
    async fn set(&self, id: &NodeId, data: &NodeData) -> Result<(), NodeStoreError> {
        let encoded =
            serde_json::to_vec(data).map_err(|e| NodeStoreError::Serialization(e.to_string()))?;

        if encoded.len() as u64 > self.config.max_blob_size {
            return Err(NodeStoreError::CapacityExceeded {
                size: encoded.len() as u64,
                max: self.config.max_blob_size,
            });
        }

        let path = self.node_path(id);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write atomically (write to temp, then rename)
        let seq = self.write_seq.fetch_add(1, Ordering::Relaxed);
        let temp_path = path.with_extension(format!("{}.{}.tmp", std::process::id(), seq));

        let mut file = File::create(&temp_path).await?;
        file.write_all(&encoded).await?;
        file.sync_all().await?;

        fs::rename(&temp_path, &path).await?;

        debug!(size = encoded.len(), "Stored node");
        Ok(())
    }

    async fn delete_multi(&self, ids: &[NodeId]) -> Result<usize, NodeStoreError> {
        let mut deleted = 0;
        for id in ids {
            if self.delete(id).await? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

/// Result of a node cleanup pass
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupResult {
    /// Number of nodes deleted
    pub deleted_count: usize,
    /// Number of nodes retained
    pub retained_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn create_test_store(max_batch_size: usize) -> (FileNodeStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = NodeStoreConfig {
            base_dir: temp_dir.path().join("nodes"),
            max_batch_size,
            ..Default::default()
        };
        let store = FileNodeStore::new(config).await.unwrap();
        (store, temp_dir)
    }

    fn body(message: &str) -> NodeData {
        let mut data = NodeData::new();
        data.insert("message", message);
        data
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let (store, _temp) = create_test_store(500).await;
        let id = NodeId::for_event(42, "e1");

        store.set(&id, &body("hello")).await.unwrap();
        assert!(store.exists(&id).await.unwrap());

        let loaded = store.get(&id).await.unwrap();
        assert_eq!(loaded, Some(body("hello")));
    }

    #[tokio::test]
    async fn test_get_multi_across_chunks() {
        // Tiny chunks so a single multi-get spans several of them
        let (store, _temp) = create_test_store(2).await;

        let ids: Vec<NodeId> = (0..7).map(|i| NodeId::for_event(1, &format!("e{i}"))).collect();
        for (i, id) in ids.iter().enumerate().filter(|(i, _)| i % 3 != 0) {
            store.set(id, &body(&format!("body {i}"))).await.unwrap();
        }

        let mut request = ids.clone();
        request.push(ids[1]);

        let found = store.get_multi(&request).await.unwrap();
        assert_eq!(found.len(), 4);
        assert!(!found.contains_key(&ids[0]));
        assert_eq!(found[&ids[4]], body("body 4"));
    }

    #[tokio::test]
    async fn test_concurrent_writes_to_one_node() {
        let (store, _temp) = create_test_store(500).await;
        let store = std::sync::Arc::new(store);
        let id = NodeId::for_event(42, "e1");

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move { store.set(&id, &body(&format!("writer {i}"))).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let stored = store.get(&id).await.unwrap().unwrap();
        let message = stored.get("message").and_then(|m| m.as_str()).unwrap();
        assert!(message.starts_with("writer "));

        // Only the node itself is left behind
        let shard = store.node_path(&id).parent().unwrap().to_path_buf();
        let mut entries = fs::read_dir(&shard).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec![id.to_hex()]);
    }

    #[tokio::test]
    async fn test_sharded_layout() {
        let (store, temp) = create_test_store(500).await;
        let id = NodeId::for_event(42, "e1");
        store.set(&id, &body("hello")).await.unwrap();

        let hex = id.to_hex();
        let path = temp
            .path()
            .join("nodes")
            .join(&hex[0..2])
            .join(&hex[2..4])
            .join(&hex);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_corrupt_node_fails() {
        let (store, _temp) = create_test_store(500).await;
        let id = NodeId::for_event(42, "e1");
        store.set(&id, &body("hello")).await.unwrap();

        fs::write(store.node_path(&id), b"not json").await.unwrap();

        let result = store.get_multi(&[id]).await;
        assert!(matches!(result, Err(NodeStoreError::Deserialization(_))));
    }

    #[tokio::test]
    async fn test_capacity_limit() {
        let temp_dir = TempDir::new().unwrap();
        let config = NodeStoreConfig {
            base_dir: temp_dir.path().to_path_buf(),
            max_blob_size: 16,
            ..Default::default()
        };
        let store = FileNodeStore::new(config).await.unwrap();

        let result = store
            .set(&NodeId::for_event(1, "big"), &body("far too long for the limit"))
            .await;
        assert!(matches!(result, Err(NodeStoreError::CapacityExceeded { .. })));
    }

    #[tokio::test]
    async fn test_delete_and_cleanup() {
        let (store, _temp) = create_test_store(500).await;
        let keep = NodeId::for_event(1, "keep");
        let stale = NodeId::for_event(1, "stale");
        let gone = NodeId::for_event(1, "gone");

        for id in [keep, stale, gone] {
            store.set(&id, &body("x")).await.unwrap();
        }

        assert_eq!(store.delete_multi(&[gone, gone]).await.unwrap(), 1);
        assert_eq!(store.list_all().await.unwrap().len(), 2);

        let result = store.cleanup(|id| *id == keep).await.unwrap();
        assert_eq!(result.deleted_count, 1);
        assert_eq!(result.retained_count, 1);
        assert!(store.exists(&keep).await.unwrap());
        assert!(!store.exists(&stale).await.unwrap());
    }
}
