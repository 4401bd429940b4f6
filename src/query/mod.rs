//! Read path
//!
//! The read coordinator requires schema presence before any select
//! executes, then fans the statement over the nodes holding the metric's
//! locations and merges their replies, deduplicating replica copies by
//! record identity.

use crate::actor::{ask, reply, send};
use crate::bit::Bit;
use crate::cluster::NodeId;
use crate::index::eval;
use crate::ingester::NamespaceDataHandle;
use crate::metadata::MetadataHandle;
use crate::schema::{Schema, SchemaHandle};
use crate::sql::{OrderDirection, SelectStatement};
use crate::{Error, Result};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

enum ReadCommand {
    ExecuteStatement {
        db: String,
        statement: SelectStatement,
        reply: oneshot::Sender<Result<Vec<Bit>>>,
    },
    GetNamespaces {
        db: String,
        reply: oneshot::Sender<Result<Vec<String>>>,
    },
    GetMetrics {
        db: String,
        namespace: String,
        reply: oneshot::Sender<Result<Vec<String>>>,
    },
    GetSchema {
        db: String,
        namespace: String,
        metric: String,
        reply: oneshot::Sender<Result<Option<Schema>>>,
    },
    SubscribeNode {
        node: NodeId,
        handle: NamespaceDataHandle,
        reply: oneshot::Sender<()>,
    },
}

/// Orchestrates the read path.
pub struct ReadCoordinator {
    schema: SchemaHandle,
    metadata: MetadataHandle,
    nodes: HashMap<NodeId, NamespaceDataHandle>,
    rx: mpsc::Receiver<ReadCommand>,
}

impl ReadCoordinator {
    /// Spawn the coordinator. Nodes announce their data actors via
    /// [`ReadCoordinatorHandle::subscribe_node`].
    pub fn spawn(
        schema: SchemaHandle,
        metadata: MetadataHandle,
        timeout: Duration,
    ) -> ReadCoordinatorHandle {
        let (tx, rx) = mpsc::channel(256);
        let actor = Self {
            schema,
            metadata,
            nodes: HashMap::new(),
            rx,
        };
        tokio::spawn(actor.run());
        ReadCoordinatorHandle { tx, timeout }
    }

    async fn run(mut self) {
        while let Some(command) = self.rx.recv().await {
            match command {
                ReadCommand::ExecuteStatement {
                    db,
                    statement,
                    reply: tx,
                } => {
                    let result = self.execute_statement(&db, statement).await;
                    reply(tx, result);
                }
                ReadCommand::GetNamespaces { db, reply: tx } => {
                    let result = self.get_namespaces(&db).await;
                    reply(tx, result);
                }
                ReadCommand::GetMetrics {
                    db,
                    namespace,
                    reply: tx,
                } => {
                    let result = self.get_metrics(&db, &namespace).await;
                    reply(tx, result);
                }
                ReadCommand::GetSchema {
                    db,
                    namespace,
                    metric,
                    reply: tx,
                } => {
                    let result = self.schema.get_schema(&db, &namespace, &metric).await;
                    reply(tx, result);
                }
                ReadCommand::SubscribeNode {
                    node,
                    handle,
                    reply: tx,
                } => {
                    info!(%node, "namespace data actor subscribed to read coordinator");
                    self.nodes.insert(node, handle);
                    reply(tx, ());
                }
            }
        }
    }

    async fn execute_statement(&self, db: &str, statement: SelectStatement) -> Result<Vec<Bit>> {
        let schema = self
            .schema
            .get_schema(db, &statement.namespace, &statement.metric)
            .await?
            .ok_or_else(|| Error::MissingSchema {
                metric: statement.metric.clone(),
            })?;

        let locations = self
            .metadata
            .get_locations(db, &statement.namespace, &statement.metric)
            .await?;
        let nodes: BTreeSet<&NodeId> = locations.iter().map(|l| &l.node).collect();
        if nodes.is_empty() {
            return Ok(Vec::new());
        }
        debug!(metric = %statement.metric, nodes = nodes.len(), "fanning select over nodes");

        let mut rows = Vec::new();
        let mut seen = HashSet::new();
        for node in nodes {
            let handle = self.nodes.get(node.as_str()).ok_or_else(|| {
                Error::Internal(format!("no data actor for node {node}"))
            })?;
            for row in handle
                .execute_select_statement(db, statement.clone(), schema.clone())
                .await?
            {
                // Replica copies of the same record collapse here.
                if seen.insert(row.clone()) {
                    rows.push(row);
                }
            }
        }

        // Per-node results are already shaped; re-establish global order
        // and limit across the merge.
        if let Some(order_by) = &statement.order_by {
            rows.sort_by(|a, b| {
                let ordering = eval::compare_field(a, b, &order_by.dimension);
                match order_by.direction {
                    OrderDirection::Asc => ordering,
                    OrderDirection::Desc => ordering.reverse(),
                }
            });
        }
        if let Some(limit) = statement.limit {
            rows.truncate(limit as usize);
        }
        Ok(rows)
    }

    async fn get_namespaces(&self, db: &str) -> Result<Vec<String>> {
        let mut namespaces = Vec::new();
        for handle in self.nodes.values() {
            namespaces.extend(handle.get_namespaces(db).await?);
        }
        namespaces.sort();
        namespaces.dedup();
        Ok(namespaces)
    }

    async fn get_metrics(&self, db: &str, namespace: &str) -> Result<Vec<String>> {
        let mut metrics = Vec::new();
        for handle in self.nodes.values() {
            metrics.extend(handle.get_metrics(db, namespace).await?);
        }
        metrics.sort();
        metrics.dedup();
        Ok(metrics)
    }
}

/// Handle to the read coordinator.
#[derive(Clone)]
pub struct ReadCoordinatorHandle {
    tx: mpsc::Sender<ReadCommand>,
    timeout: Duration,
}

impl ReadCoordinatorHandle {
    /// Execute a SELECT. Fails with [`Error::MissingSchema`] when the
    /// metric has no schema yet.
    pub async fn execute_statement(
        &self,
        db: &str,
        statement: SelectStatement,
    ) -> Result<Vec<Bit>> {
        let (tx, rx) = oneshot::channel();
        send(
            &self.tx,
            ReadCommand::ExecuteStatement {
                db: db.to_string(),
                statement,
                reply: tx,
            },
        )
        .await?;
        ask(rx, self.timeout).await?
    }

    /// List namespaces of a db.
    pub async fn get_namespaces(&self, db: &str) -> Result<Vec<String>> {
        let (tx, rx) = oneshot::channel();
        send(
            &self.tx,
            ReadCommand::GetNamespaces {
                db: db.to_string(),
                reply: tx,
            },
        )
        .await?;
        ask(rx, self.timeout).await?
    }

    /// List metrics of a namespace.
    pub async fn get_metrics(&self, db: &str, namespace: &str) -> Result<Vec<String>> {
        let (tx, rx) = oneshot::channel();
        send(
            &self.tx,
            ReadCommand::GetMetrics {
                db: db.to_string(),
                namespace: namespace.to_string(),
                reply: tx,
            },
        )
        .await?;
        ask(rx, self.timeout).await?
    }

    /// Fetch a metric's schema.
    pub async fn get_schema(
        &self,
        db: &str,
        namespace: &str,
        metric: &str,
    ) -> Result<Option<Schema>> {
        let (tx, rx) = oneshot::channel();
        send(
            &self.tx,
            ReadCommand::GetSchema {
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
            ReadCommand::SubscribeNode {
                node: node.to_string(),
                handle,
                reply: tx,
            },
        )
        .await?;
        ask(rx, self.timeout).await
    }
}
