//! Namespace data actor
//!
//! One per node. Owns the indexer children for every (db, namespace,
//! metric) stored on that node, creating them lazily on first write, and
//! forwards record-level commands to them. Namespace deletion stops the
//! children and erases the namespace directory.

use super::indexer::{IndexerActor, IndexerHandle};
use crate::actor::{ask, reply, send};
use crate::bit::Bit;
use crate::cluster::NodeId;
use crate::metadata::MetricKey;
use crate::schema::Schema;
use crate::sql::{Expression, SelectStatement};
use crate::Result;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

enum NamespaceCommand {
    AddRecord {
        key: MetricKey,
        bit: Bit,
        reply: oneshot::Sender<Result<()>>,
    },
    DeleteRecord {
        key: MetricKey,
        bit: Bit,
        reply: oneshot::Sender<Result<bool>>,
    },
    GetCount {
        key: MetricKey,
        reply: oneshot::Sender<Result<usize>>,
    },
    ExecuteSelect {
        key: MetricKey,
        statement: SelectStatement,
        schema: Schema,
        reply: oneshot::Sender<Result<Vec<Bit>>>,
    },
    ExecuteDelete {
        key: MetricKey,
        condition: Expression,
        reply: oneshot::Sender<Result<usize>>,
    },
    DropMetric {
        key: MetricKey,
        reply: oneshot::Sender<Result<()>>,
    },
    DeleteNamespace {
        db: String,
        namespace: String,
        reply: oneshot::Sender<Result<()>>,
    },
    GetNamespaces {
        db: String,
        reply: oneshot::Sender<Vec<String>>,
    },
    GetMetrics {
        db: String,
        namespace: String,
        reply: oneshot::Sender<Vec<String>>,
    },
    Flush {
        key: MetricKey,
        reply: oneshot::Sender<Result<usize>>,
    },
}

/// Actor owning one node's shard indexes.
pub struct NamespaceDataActor {
    node: NodeId,
    base_path: PathBuf,
    flush_interval: Duration,
    timeout: Duration,
    children: HashMap<MetricKey, IndexerHandle>,
    rx: mpsc::Receiver<NamespaceCommand>,
}

impl NamespaceDataActor {
    /// Spawn the actor for `node`, rooting shards at `base_path`.
    pub fn spawn(
        node: impl Into<NodeId>,
        base_path: impl Into<PathBuf>,
        flush_interval: Duration,
        timeout: Duration,
    ) -> NamespaceDataHandle {
        let (tx, rx) = mpsc::channel(256);
        let actor = Self {
            node: node.into(),
            base_path: base_path.into(),
            flush_interval,
            timeout,
            children: HashMap::new(),
            rx,
        };
        tokio::spawn(actor.run());
        NamespaceDataHandle { tx, timeout }
    }

    async fn run(mut self) {
        while let Some(command) = self.rx.recv().await {
            self.handle(command).await;
        }
        // Queue closed: flush whatever the children still buffer.
        for child in self.children.values() {
            child.cancel();
        }
    }

    fn shard_path(&self, key: &MetricKey) -> PathBuf {
        self.base_path
            .join(&key.db)
            .join(&key.namespace)
            .join(&key.metric)
    }

    /// The child for a metric, created on demand.
    fn child(&mut self, key: &MetricKey) -> Result<IndexerHandle> {
        if let Some(child) = self.children.get(key) {
            return Ok(child.clone());
        }
        let child = IndexerActor::spawn(self.shard_path(key), self.flush_interval, self.timeout)?;
        info!(node = %self.node, metric = %key, "created indexer");
        self.children.insert(key.clone(), child.clone());
        Ok(child)
    }

    /// The child for a metric, but only if the metric was ever written.
    fn existing_child(&mut self, key: &MetricKey) -> Result<Option<IndexerHandle>> {
        if self.children.contains_key(key) || self.shard_path(key).is_dir() {
            self.child(key).map(Some)
        } else {
            Ok(None)
        }
    }

    async fn handle(&mut self, command: NamespaceCommand) {
        match command {
            NamespaceCommand::AddRecord { key, bit, reply: tx } => {
                let result = match self.child(&key) {
                    Ok(child) => child.add_record(bit).await,
                    Err(e) => Err(e),
                };
                reply(tx, result);
            }
            NamespaceCommand::DeleteRecord { key, bit, reply: tx } => {
                let result = match self.existing_child(&key) {
                    Ok(Some(child)) => child.delete_record(bit).await,
                    Ok(None) => Ok(false),
                    Err(e) => Err(e),
                };
                reply(tx, result);
            }
            NamespaceCommand::GetCount { key, reply: tx } => {
                let result = match self.existing_child(&key) {
                    Ok(Some(child)) => child.count().await,
                    Ok(None) => Ok(0),
                    Err(e) => Err(e),
                };
                reply(tx, result);
            }
            NamespaceCommand::ExecuteSelect {
                key,
                statement,
                schema,
                reply: tx,
            } => {
                let result = match self.existing_child(&key) {
                    Ok(Some(child)) => child.execute_select(statement, schema).await,
                    Ok(None) => Ok(Vec::new()),
                    Err(e) => Err(e),
                };
                reply(tx, result);
            }
            NamespaceCommand::ExecuteDelete {
                key,
                condition,
                reply: tx,
            } => {
                let result = match self.existing_child(&key) {
                    Ok(Some(child)) => child.execute_delete(condition).await,
                    Ok(None) => Ok(0),
                    Err(e) => Err(e),
                };
                reply(tx, result);
            }
            NamespaceCommand::DropMetric { key, reply: tx } => {
                let result = match self.existing_child(&key) {
                    Ok(Some(child)) => {
                        self.children.remove(&key);
                        child.stop(true).await
                    }
                    Ok(None) => Ok(()),
                    Err(e) => Err(e),
                };
                if result.is_ok() {
                    info!(node = %self.node, metric = %key, "metric dropped");
                }
                reply(tx, result);
            }
            NamespaceCommand::DeleteNamespace {
                db,
                namespace,
                reply: tx,
            } => {
                reply(tx, self.delete_namespace(&db, &namespace).await);
            }
            NamespaceCommand::GetNamespaces { db, reply: tx } => {
                let mut namespaces: Vec<String> = self
                    .children
                    .keys()
                    .filter(|key| key.db == db)
                    .map(|key| key.namespace.clone())
                    .chain(list_dirs(&self.base_path.join(&db)))
                    .collect();
                namespaces.sort();
                namespaces.dedup();
                reply(tx, namespaces);
            }
            NamespaceCommand::GetMetrics {
                db,
                namespace,
                reply: tx,
            } => {
                let mut metrics: Vec<String> = self
                    .children
                    .keys()
                    .filter(|key| key.db == db && key.namespace == namespace)
                    .map(|key| key.metric.clone())
                    .chain(list_dirs(&self.base_path.join(&db).join(&namespace)))
                    .collect();
                metrics.sort();
                metrics.dedup();
                reply(tx, metrics);
            }
            NamespaceCommand::Flush { key, reply: tx } => {
                let result = match self.existing_child(&key) {
                    Ok(Some(child)) => child.flush().await,
                    Ok(None) => Ok(0),
                    Err(e) => Err(e),
                };
                reply(tx, result);
            }
        }
    }

    async fn delete_namespace(&mut self, db: &str, namespace: &str) -> Result<()> {
        let doomed: Vec<MetricKey> = self
            .children
            .keys()
            .filter(|key| key.db == db && key.namespace == namespace)
            .cloned()
            .collect();
        for key in doomed {
            if let Some(child) = self.children.remove(&key) {
                // The whole namespace directory goes next, so children stop
                // without flushing or erasing their own path.
                if let Err(e) = child.stop(false).await {
                    warn!(metric = %key, error = %e, "stopping indexer failed");
                }
            }
        }

        let dir = self.base_path.join(db).join(namespace);
        if dir.is_dir() {
            std::fs::remove_dir_all(&dir)?;
        }
        info!(node = %self.node, db, namespace, "namespace deleted");
        Ok(())
    }
}

fn list_dirs(path: &std::path::Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(path) else {
        return Vec::new();
    };
    entries
        .filter_map(|entry| {
            let entry = entry.ok()?;
            entry
                .file_type()
                .ok()?
                .is_dir()
                .then(|| entry.file_name().to_string_lossy().into_owned())
        })
        .collect()
}

/// Handle to a node's namespace data actor.
#[derive(Clone)]
pub struct NamespaceDataHandle {
    tx: mpsc::Sender<NamespaceCommand>,
    timeout: Duration,
}

impl NamespaceDataHandle {
    pub async fn add_record(&self, db: &str, namespace: &str, metric: &str, bit: Bit) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        send(
            &self.tx,
            NamespaceCommand::AddRecord {
                key: MetricKey::new(db, namespace, metric),
                bit,
                reply: tx,
            },
        )
        .await?;
        ask(rx, self.timeout).await?
    }

    pub async fn delete_record(
        &self,
        db: &str,
        namespace: &str,
        metric: &str,
        bit: Bit,
    ) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        send(
            &self.tx,
            NamespaceCommand::DeleteRecord {
                key: MetricKey::new(db, namespace, metric),
                bit,
                reply: tx,
            },
        )
        .await?;
        ask(rx, self.timeout).await?
    }

    pub async fn get_count(&self, db: &str, namespace: &str, metric: &str) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        send(
            &self.tx,
            NamespaceCommand::GetCount {
                key: MetricKey::new(db, namespace, metric),
                reply: tx,
            },
        )
        .await?;
        ask(rx, self.timeout).await?
    }

    pub async fn execute_select_statement(
        &self,
        db: &str,
        statement: SelectStatement,
        schema: Schema,
    ) -> Result<Vec<Bit>> {
        let (tx, rx) = oneshot::channel();
        send(
            &self.tx,
            NamespaceCommand::ExecuteSelect {
                key: MetricKey::new(db, &statement.namespace, &statement.metric),
                statement,
                schema,
                reply: tx,
            },
        )
        .await?;
        ask(rx, self.timeout).await?
    }

    pub async fn execute_delete_statement(
        &self,
        db: &str,
        namespace: &str,
        metric: &str,
        condition: Expression,
    ) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        send(
            &self.tx,
            NamespaceCommand::ExecuteDelete {
                key: MetricKey::new(db, namespace, metric),
                condition,
                reply: tx,
            },
        )
        .await?;
        ask(rx, self.timeout).await?
    }

    pub async fn drop_metric(&self, db: &str, namespace: &str, metric: &str) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        send(
            &self.tx,
            NamespaceCommand::DropMetric {
                key: MetricKey::new(db, namespace, metric),
                reply: tx,
            },
        )
        .await?;
        ask(rx, self.timeout).await?
    }

    pub async fn delete_namespace(&self, db: &str, namespace: &str) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        send(
            &self.tx,
            NamespaceCommand::DeleteNamespace {
                db: db.to_string(),
                namespace: namespace.to_string(),
                reply: tx,
            },
        )
        .await?;
        ask(rx, self.timeout).await?
    }

    pub async fn get_namespaces(&self, db: &str) -> Result<Vec<String>> {
        let (tx, rx) = oneshot::channel();
        send(
            &self.tx,
            NamespaceCommand::GetNamespaces {
                db: db.to_string(),
                reply: tx,
            },
        )
        .await?;
        ask(rx, self.timeout).await
    }

    pub async fn get_metrics(&self, db: &str, namespace: &str) -> Result<Vec<String>> {
        let (tx, rx) = oneshot::channel();
        send(
            &self.tx,
            NamespaceCommand::GetMetrics {
                db: db.to_string(),
                namespace: namespace.to_string(),
                reply: tx,
            },
        )
        .await?;
        ask(rx, self.timeout).await
    }

    /// Force a flush of one metric's indexer, for callers needing quiescence.
    pub async fn flush(&self, db: &str, namespace: &str, metric: &str) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        send(
            &self.tx,
            NamespaceCommand::Flush {
                key: MetricKey::new(db, namespace, metric),
                reply: tx,
            },
        )
        .await?;
        ask(rx, self.timeout).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn spawn(dir: &TempDir) -> NamespaceDataHandle {
        NamespaceDataActor::spawn(
            "node-1",
            dir.path(),
            Duration::from_secs(3600),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn test_add_record_and_count_after_flush() {
        let dir = TempDir::new().unwrap();
        let namespace = spawn(&dir);

        namespace
            .add_record("db", "ns", "x", Bit::new(1, 0.5).with_dimension("content", "c"))
            .await
            .unwrap();
        namespace.flush("db", "ns", "x").await.unwrap();

        assert_eq!(namespace.get_count("db", "ns", "x").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_count_of_unknown_metric_is_zero() {
        let dir = TempDir::new().unwrap();
        let namespace = spawn(&dir);
        assert_eq!(namespace.get_count("db", "ns", "nope").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_namespace_and_metric_listing() {
        let dir = TempDir::new().unwrap();
        let namespace = spawn(&dir);

        namespace
            .add_record("db", "registry", "people", Bit::new(1, 1i64))
            .await
            .unwrap();
        namespace
            .add_record("db", "telemetry", "cpu", Bit::new(1, 1i64))
            .await
            .unwrap();

        assert_eq!(
            namespace.get_namespaces("db").await.unwrap(),
            vec!["registry".to_string(), "telemetry".to_string()]
        );
        assert_eq!(
            namespace.get_metrics("db", "registry").await.unwrap(),
            vec!["people".to_string()]
        );
    }

    #[tokio::test]
    async fn test_delete_namespace_erases_shards_and_counts() {
        let dir = TempDir::new().unwrap();
        let namespace = spawn(&dir);

        namespace
            .add_record("db", "ns", "a", Bit::new(1, 1i64))
            .await
            .unwrap();
        namespace
            .add_record("db", "ns", "b", Bit::new(1, 1i64))
            .await
            .unwrap();
        namespace.flush("db", "ns", "a").await.unwrap();
        namespace.flush("db", "ns", "b").await.unwrap();

        namespace.delete_namespace("db", "ns").await.unwrap();

        assert!(!dir.path().join("db/ns").exists());
        assert_eq!(namespace.get_count("db", "ns", "a").await.unwrap(), 0);
        assert_eq!(namespace.get_count("db", "ns", "b").await.unwrap(), 0);
        assert!(namespace.get_namespaces("db").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_drop_metric_removes_its_directory_only() {
        let dir = TempDir::new().unwrap();
        let namespace = spawn(&dir);

        namespace
            .add_record("db", "ns", "keep", Bit::new(1, 1i64))
            .await
            .unwrap();
        namespace
            .add_record("db", "ns", "doomed", Bit::new(1, 1i64))
            .await
            .unwrap();

        namespace.drop_metric("db", "ns", "doomed").await.unwrap();

        assert!(!dir.path().join("db/ns/doomed").exists());
        assert!(dir.path().join("db/ns/keep").exists());
        assert_eq!(
            namespace.get_metrics("db", "ns").await.unwrap(),
            vec!["keep".to_string()]
        );
    }
}
