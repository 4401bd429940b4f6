//! Write path
//!
//! The write coordinator orchestrates schema update, location assignment
//! and record delivery, with at-least-once semantics toward the shard
//! actors: replicas that were written before a partial failure are not
//! rolled back, and redelivery is deduplicated by the shard index.

mod indexer;
mod namespace;

pub use indexer::{IndexerActor, IndexerHandle};
pub use namespace::{NamespaceDataActor, NamespaceDataHandle};

use crate::actor::{ask, reply, send};
use crate::bit::Bit;
use crate::cluster::NodeId;
use crate::metadata::MetadataHandle;
use crate::schema::SchemaHandle;
use crate::sql::DeleteStatement;
use crate::{Error, Result};
use futures::future::join_all;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Acknowledgement of a fully mapped write.
#[derive(Debug, Clone, PartialEq)]
pub struct InputMapped {
    pub db: String,
    pub namespace: String,
    pub metric: String,
    pub record: Bit,
}

enum WriteCommand {
    MapInput {
        db: String,
        namespace: String,
        metric: String,
        bit: Bit,
        reply: oneshot::Sender<Result<InputMapped>>,
    },
    ExecuteDeleteStatement {
        db: String,
        statement: DeleteStatement,
        reply: oneshot::Sender<Result<usize>>,
    },
    DropMetric {
        db: String,
        namespace: String,
        metric: String,
        reply: oneshot::Sender<Result<()>>,
    },
    SubscribeNode {
        node: NodeId,
        handle: NamespaceDataHandle,
        reply: oneshot::Sender<()>,
    },
}

/// Orchestrates the write path.
pub struct WriteCoordinator {
    schema: SchemaHandle,
    metadata: MetadataHandle,
    nodes: HashMap<NodeId, NamespaceDataHandle>,
    rx: mpsc::Receiver<WriteCommand>,
}

impl WriteCoordinator {
    /// Spawn the coordinator. Nodes announce their data actors via
    /// [`WriteCoordinatorHandle::subscribe_node`].
    pub fn spawn(
        schema: SchemaHandle,
        metadata: MetadataHandle,
        timeout: Duration,
    ) -> WriteCoordinatorHandle {
        let (tx, rx) = mpsc::channel(256);
        let actor = Self {
            schema,
            metadata,
            nodes: HashMap::new(),
            rx,
        };
        tokio::spawn(actor.run());
        WriteCoordinatorHandle { tx, timeout }
    }

    async fn run(mut self) {
        while let Some(command) = self.rx.recv().await {
            match command {
                WriteCommand::MapInput {
                    db,
                    namespace,
                    metric,
                    bit,
                    reply: tx,
                } => {
                    let result = self.map_input(&db, &namespace, &metric, bit).await;
                    reply(tx, result);
                }
                WriteCommand::ExecuteDeleteStatement {
                    db,
                    statement,
                    reply: tx,
                } => {
                    let result = self.execute_delete(&db, statement).await;
                    reply(tx, result);
                }
                WriteCommand::DropMetric {
                    db,
                    namespace,
                    metric,
                    reply: tx,
                } => {
                    let result = self.drop_metric(&db, &namespace, &metric).await;
                    reply(tx, result);
                }
                WriteCommand::SubscribeNode {
                    node,
                    handle,
                    reply: tx,
                } => {
                    info!(%node, "namespace data actor subscribed to write coordinator");
                    self.nodes.insert(node, handle);
                    reply(tx, ());
                }
            }
        }
    }

    /// Schema update, location lookup, then fan-out to every node owning a
    /// replica of the record's time bucket.
    async fn map_input(
        &self,
        db: &str,
        namespace: &str,
        metric: &str,
        bit: Bit,
    ) -> Result<InputMapped> {
        if bit.timestamp < 0 {
            return Err(Error::RecordRejected {
                reasons: vec!["timestamp must be non-negative".to_string()],
            });
        }

        // A schema conflict aborts before any location is allocated.
        self.schema
            .update_schema_from_record(db, namespace, metric, &bit)
            .await
            .map_err(Error::into_rejection)?;

        let locations = self
            .metadata
            .get_write_locations(db, namespace, metric, bit.timestamp)
            .await
            .map_err(Error::into_rejection)?;
        if locations.is_empty() {
            return Err(Error::RecordRejected {
                reasons: vec![format!(
                    "no location for metric {metric} at timestamp {}",
                    bit.timestamp
                )],
            });
        }

        let nodes: BTreeSet<&NodeId> = locations.iter().map(|l| &l.node).collect();
        let deliveries = join_all(nodes.iter().map(|node| {
            let bit = bit.clone();
            async move {
                match self.nodes.get(node.as_str()) {
                    Some(handle) => (
                        (*node).clone(),
                        handle.add_record(db, namespace, metric, bit).await,
                    ),
                    None => (
                        (*node).clone(),
                        Err(Error::Internal(format!("no data actor for node {node}"))),
                    ),
                }
            }
        }))
        .await;

        let reasons: Vec<String> = deliveries
            .into_iter()
            .filter_map(|(node, result)| result.err().map(|e| format!("{node}: {e}")))
            .collect();
        if reasons.is_empty() {
            debug!(metric, timestamp = bit.timestamp, "input mapped");
            Ok(InputMapped {
                db: db.to_string(),
                namespace: namespace.to_string(),
                metric: metric.to_string(),
                record: bit,
            })
        } else {
            // Written replicas stay written: the shard index deduplicates
            // redelivery by record identity.
            warn!(metric, ?reasons, "write rejected by some replicas");
            Err(Error::RecordRejected { reasons })
        }
    }

    /// Delete matching records from every node holding shards of the metric.
    async fn execute_delete(&self, db: &str, statement: DeleteStatement) -> Result<usize> {
        let DeleteStatement {
            namespace,
            metric,
            condition,
        } = statement;

        self.schema
            .get_schema(db, &namespace, &metric)
            .await?
            .ok_or_else(|| Error::MissingSchema {
                metric: metric.clone(),
            })?;

        let locations = self.metadata.get_locations(db, &namespace, &metric).await?;
        let nodes: BTreeSet<&NodeId> = locations.iter().map(|l| &l.node).collect();

        let mut deleted = 0;
        for node in nodes {
            let handle = self.nodes.get(node.as_str()).ok_or_else(|| {
                Error::Internal(format!("no data actor for node {node}"))
            })?;
            deleted += handle
                .execute_delete_statement(db, &namespace, &metric, condition.clone())
                .await?;
        }
        Ok(deleted)
    }

    /// Drop the metric everywhere: schema, shards, then metadata.
    async fn drop_metric(&self, db: &str, namespace: &str, metric: &str) -> Result<()> {
        self.schema.delete_schema(db, namespace, metric).await?;
        for (node, handle) in &self.nodes {
            handle.drop_metric(db, namespace, metric).await?;
            debug!(%node, metric, "metric shards dropped");
        }
        self.metadata.drop_metric(db, namespace, metric).await?;
        info!(db, namespace, metric, "metric dropped");
        Ok(())
    }
}

/// Handle to the write coordinator.
#[derive(Clone)]
pub struct WriteCoordinatorHandle {
    tx: mpsc::Sender<WriteCommand>,
    timeout: Duration,
}

impl WriteCoordinatorHandle {
    /// Route a record write: schema validation, location assignment, then
    /// delivery to every replica node.
    pub async fn map_input(
        &self,
        db: &str,
        namespace: &str,
        metric: &str,
        bit: Bit,
    ) -> Result<InputMapped> {
        let (tx, rx) = oneshot::channel();
        send(
            &self.tx,
            WriteCommand::MapInput {
                db: db.to_string(),
                namespace: namespace.to_string(),
                metric: metric.to_string(),
                bit,
                reply: tx,
            },
        )
        .await?;
        ask(rx, self.timeout).await?
    }

    /// Execute a DELETE statement, returning how many records were removed.
    pub async fn execute_delete_statement(
        &self,
        db: &str,
        statement: DeleteStatement,
    ) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        send(
            &self.tx,
            WriteCommand::ExecuteDeleteStatement {
                db: db.to_string(),
                statement,
                reply: tx,
            },
        )
        .await?;
        ask(rx, self.timeout).await?
    }

    /// Drop a metric: schema, shards and metadata.
    pub async fn drop_metric(&self, db: &str, namespace: &str, metric: &str) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        send(
            &self.tx,
            WriteCommand::DropMetric {
                db: db.to_string(),
                namespace: namespace.to_string(),
                metric: metric.to_string(),
                reply: tx,
            },
        )
        .await?;
        ask(rx, self.timeout).await?
    }

    /// Announce the data actor serving a node.
    pub async fn subscribe_node(&self, node: &str, handle: NamespaceDataHandle) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        send(
            &self.tx,
            WriteCommand::SubscribeNode {
                node: node.to_string(),
                handle,
                reply: tx,
            },
        )
        .await?;
        ask(rx, self.timeout).await
    }
}
