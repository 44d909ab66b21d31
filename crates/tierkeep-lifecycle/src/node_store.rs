//! Persistent node metadata store backed by redb.
//!
//! Nodes are bincode-encoded into a single `nodes` table keyed by node id.
//! Expiration queries are answered with a full table scan filtered by
//! [`ExpirationQuery`]. redb calls block, so the async [`NodeStore`] impl
//! runs them on the blocking thread pool.

use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;
use tierkeep_common::{Error, ExpirationQuery, Node, NodeId, Result};
use tracing::error;

use crate::ports::NodeStore;

const NODES: TableDefinition<&str, &[u8]> = TableDefinition::new("nodes");

/// Error type for node store operations
#[derive(Debug, thiserror::Error)]
pub enum NodeStoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::DatabaseError),
    #[error("redb storage error: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("redb table error: {0}")]
    Table(#[from] redb::TableError),
    #[error("redb transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
    #[error("redb commit error: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<redb::TransactionError> for NodeStoreError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Transaction(Box::new(e))
    }
}

impl From<NodeStoreError> for Error {
    fn from(e: NodeStoreError) -> Self {
        match e {
            NodeStoreError::Io(io) => Self::Io(io),
            NodeStoreError::Bincode(b) => Self::Serialization(b.to_string()),
            other => Self::Storage(other.to_string()),
        }
    }
}

pub type NodeStoreResult<T> = std::result::Result<T, NodeStoreError>;

/// Node metadata store backed by redb
#[derive(Clone)]
pub struct RedbNodeStore {
    db: Arc<Database>,
}

impl RedbNodeStore {
    /// Open (or create) the database at the given path
    pub fn open(path: impl AsRef<Path>) -> NodeStoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Create the table eagerly so later read txns don't fail
        let write_txn = db.begin_write()?;
        {
            let _t = write_txn.open_table(NODES)?;
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Insert or replace a node
    pub fn put(&self, node: &Node) -> NodeStoreResult<()> {
        let bytes = bincode::serialize(node)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(NODES)?;
            table.insert(node.id.as_str(), bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Fetch a node, `None` if absent
    pub fn get(&self, id: &NodeId) -> NodeStoreResult<Option<Node>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(NODES)?;
        let node = match table.get(id.as_str())? {
            Some(value) => Some(bincode::deserialize(value.value())?),
            None => None,
        };
        Ok(node)
    }

    /// Remove a node; returns whether it existed
    pub fn remove(&self, id: &NodeId) -> NodeStoreResult<bool> {
        let write_txn = self.db.begin_write()?;
        let existed = {
            let mut table = write_txn.open_table(NODES)?;
            let removed = table.remove(id.as_str())?;
            removed.is_some()
        };
        write_txn.commit()?;
        Ok(existed)
    }

    /// Every decodable node; undecodable rows are logged and skipped
    pub fn list(&self) -> NodeStoreResult<Vec<Node>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(NODES)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let entry = entry?;
            let key = entry.0.value().to_string();
            match bincode::deserialize::<Node>(entry.1.value()) {
                Ok(node) => result.push(node),
                Err(e) => error!("Failed to decode node '{}': {}", key, e),
            }
        }
        Ok(result)
    }
}

impl RedbNodeStore {
    /// Run a store operation on the blocking pool
    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Self) -> NodeStoreResult<T> + Send + 'static,
    {
        let store = self.clone();
        let result = tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| Error::internal(format!("node store task failed: {e}")))?;
        Ok(result?)
    }
}

#[async_trait]
impl NodeStore for RedbNodeStore {
    async fn find_expired(&self, query: &ExpirationQuery) -> Result<Vec<Node>> {
        let query = *query;
        self.blocking(move |store| {
            let nodes = store.list()?;
            Ok(nodes
                .into_iter()
                .filter(|node| query.matches_node(node))
                .collect())
        })
        .await
    }

    async fn delete(&self, id: &NodeId) -> Result<()> {
        let key = id.clone();
        if self.blocking(move |store| store.remove(&key)).await? {
            Ok(())
        } else {
            Err(Error::NodeNotFound(id.to_string()))
        }
    }

    async fn load(&self, id: &NodeId) -> Result<Node> {
        let key = id.clone();
        self.blocking(move |store| store.get(&key))
            .await?
            .ok_or_else(|| Error::NodeNotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone, Utc};
    use tempfile::tempdir;
    use tierkeep_common::zero_time;

    #[test]
    fn test_put_get_remove() {
        let dir = tempdir().unwrap();
        let store = RedbNodeStore::open(dir.path().join("meta/nodes.redb")).unwrap();
        let node = Node::new("n1").with_location("s3");

        store.put(&node).unwrap();
        assert_eq!(store.get(&node.id).unwrap(), Some(node.clone()));

        assert!(store.remove(&node.id).unwrap());
        assert!(store.get(&node.id).unwrap().is_none());
        assert!(!store.remove(&node.id).unwrap());
    }

    #[test]
    fn test_reopen_keeps_nodes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nodes.redb");
        {
            let store = RedbNodeStore::open(&path).unwrap();
            store.put(&Node::new("n1")).unwrap();
        }
        let store = RedbNodeStore::open(&path).unwrap();
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_find_expired_filters_by_query() {
        let dir = tempdir().unwrap();
        let store = RedbNodeStore::open(dir.path().join("nodes.redb")).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();

        store
            .put(&Node::new("past").with_expiration(now - TimeDelta::minutes(1)))
            .unwrap();
        store
            .put(&Node::new("future").with_expiration(now + TimeDelta::minutes(1)))
            .unwrap();
        store
            .put(&Node::new("zero").with_expiration(zero_time()))
            .unwrap();
        store.put(&Node::new("unset")).unwrap();

        let expired = store
            .find_expired(&ExpirationQuery::new(now))
            .await
            .unwrap();
        let ids: Vec<_> = expired.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["past"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_store_ops_run_off_the_runtime_workers() {
        let dir = tempdir().unwrap();
        let store = Arc::new(RedbNodeStore::open(dir.path().join("nodes.redb")).unwrap());
        for i in 0..8 {
            store.put(&Node::new(format!("n{i}"))).unwrap();
        }

        let mut tasks = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                let id = NodeId::from(format!("n{i}"));
                let node = store.load(&id).await.unwrap();
                store.delete(&node.id).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert!(store.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_and_delete_missing() {
        let dir = tempdir().unwrap();
        let store = RedbNodeStore::open(dir.path().join("nodes.redb")).unwrap();
        let id = NodeId::from("missing");

        assert!(store.load(&id).await.unwrap_err().is_not_found());
        assert!(store.delete(&id).await.unwrap_err().is_not_found());
    }
}
