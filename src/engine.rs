//! Engine façade
//!
//! Wires the parser, schema actor, metadata coordinator and read/write
//! coordinators for a single node, and routes SQL text end to end. The
//! individual handles stay reachable for embedders that drive components
//! directly.

use crate::bit::Bit;
use crate::clock::MonotonicClock;
use crate::cluster::{FixedNodeSelector, MetadataBroadcast, NodeId, NodeSelector};
use crate::config::NsdbConfig;
use crate::ingester::{InputMapped, NamespaceDataActor, NamespaceDataHandle, WriteCoordinator, WriteCoordinatorHandle};
use crate::metadata::{MetadataCache, MetadataCoordinator, MetadataEvent, MetadataHandle, MetadataSeed};
use crate::query::{ReadCoordinator, ReadCoordinatorHandle};
use crate::schema::{SchemaActor, SchemaHandle};
use crate::sql::{SqlParser, Statement};
use crate::Result;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

/// Outcome of a routed statement.
#[derive(Debug)]
pub enum StatementResult {
    /// SELECT rows.
    Rows(Vec<Bit>),
    /// INSERT acknowledgement.
    InputMapped(InputMapped),
    /// Number of records a DELETE removed.
    Deleted(usize),
    /// DROP acknowledgement.
    MetricDropped { metric: String },
}

/// A single-node NSDb engine.
pub struct Nsdb {
    node: NodeId,
    parser: SqlParser,
    clock: MonotonicClock,
    broadcast: MetadataBroadcast,
    schema: SchemaHandle,
    metadata: MetadataHandle,
    data: NamespaceDataHandle,
    write: WriteCoordinatorHandle,
    read: ReadCoordinatorHandle,
}

impl Nsdb {
    /// Start the engine on the default node identity.
    pub async fn start(config: NsdbConfig) -> Result<Self> {
        Self::start_on_node(config, "node-0", |node| {
            Arc::new(FixedNodeSelector::new(node))
        })
        .await
    }

    /// Start the engine with an explicit node identity and selection policy.
    pub async fn start_on_node(
        config: NsdbConfig,
        node: impl Into<NodeId>,
        selector: impl FnOnce(&str) -> Arc<dyn NodeSelector>,
    ) -> Result<Self> {
        let node = node.into();
        let broadcast = MetadataBroadcast::default();

        let schema = SchemaActor::spawn(config.http_endpoint_timeout);
        let metadata = MetadataCoordinator::spawn(
            Arc::new(MetadataCache::new()),
            selector(&node),
            broadcast.clone(),
            config.shard_interval_ms(),
            config.dedup_locations,
            config.http_endpoint_timeout,
        );
        metadata.warm_up(MetadataSeed::default()).await?;

        let data = NamespaceDataActor::spawn(
            node.as_str(),
            &config.base_path,
            config.write_scheduler_interval,
            config.http_endpoint_timeout,
        );
        let write = WriteCoordinator::spawn(
            schema.clone(),
            metadata.clone(),
            config.http_endpoint_timeout,
        );
        let read = ReadCoordinator::spawn(
            schema.clone(),
            metadata.clone(),
            config.read_coordinator_timeout,
        );
        write.subscribe_node(&node, data.clone()).await?;
        read.subscribe_node(&node, data.clone()).await?;

        info!(%node, base_path = %config.base_path.display(), "engine started");
        Ok(Self {
            node,
            parser: SqlParser::new(),
            clock: MonotonicClock::new(),
            broadcast,
            schema,
            metadata,
            data,
            write,
            read,
        })
    }

    /// Parse and route one statement against a db and namespace.
    pub async fn execute_sql(
        &self,
        db: &str,
        namespace: &str,
        input: &str,
    ) -> Result<StatementResult> {
        match self.parser.parse(namespace, input)? {
            Statement::Select(select) => {
                let rows = self.read.execute_statement(db, select).await?;
                Ok(StatementResult::Rows(rows))
            }
            Statement::Insert(insert) => {
                let timestamp = insert
                    .timestamp
                    .unwrap_or_else(|| self.clock.now_millis());
                let bit = Bit {
                    timestamp,
                    value: insert.value,
                    dimensions: insert.dimensions,
                };
                let mapped = self
                    .write
                    .map_input(db, namespace, &insert.metric, bit)
                    .await?;
                Ok(StatementResult::InputMapped(mapped))
            }
            Statement::Delete(delete) => {
                let deleted = self.write.execute_delete_statement(db, delete).await?;
                Ok(StatementResult::Deleted(deleted))
            }
            Statement::Drop(drop) => {
                self.write
                    .drop_metric(db, namespace, &drop.metric)
                    .await?;
                Ok(StatementResult::MetricDropped {
                    metric: drop.metric,
                })
            }
        }
    }

    /// This engine's node identity.
    pub fn node(&self) -> &str {
        &self.node
    }

    /// Subscribe to metadata state-change announcements.
    pub fn subscribe_metadata_events(&self) -> broadcast::Receiver<MetadataEvent> {
        self.broadcast.subscribe()
    }

    /// Force-flush one metric's indexer, for callers needing quiescence.
    pub async fn flush_metric(&self, db: &str, namespace: &str, metric: &str) -> Result<usize> {
        self.data.flush(db, namespace, metric).await
    }

    pub fn schema(&self) -> &SchemaHandle {
        &self.schema
    }

    pub fn metadata(&self) -> &MetadataHandle {
        &self.metadata
    }

    pub fn data(&self) -> &NamespaceDataHandle {
        &self.data
    }

    pub fn write(&self) -> &WriteCoordinatorHandle {
        &self.write
    }

    pub fn read(&self) -> &ReadCoordinatorHandle {
        &self.read
    }
}
