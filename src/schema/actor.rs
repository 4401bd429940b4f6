//! Schema actor
//!
//! Sole authority for per-(db, namespace, metric) schemas. Runs as a task
//! draining commands one at a time, so schema evolution is linearized: two
//! concurrent writes with conflicting types cannot both succeed.

use super::Schema;
use crate::actor::{ask, reply, send};
use crate::bit::Bit;
use crate::metadata::MetricKey;
use crate::Result;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

enum SchemaCommand {
    Get {
        key: MetricKey,
        reply: oneshot::Sender<Option<Schema>>,
    },
    UpdateFromRecord {
        key: MetricKey,
        bit: Bit,
        reply: oneshot::Sender<Result<Schema>>,
    },
    Delete {
        key: MetricKey,
        reply: oneshot::Sender<()>,
    },
    DeleteNamespace {
        db: String,
        namespace: String,
        reply: oneshot::Sender<()>,
    },
}

/// The schema authority.
pub struct SchemaActor {
    schemas: HashMap<MetricKey, Schema>,
    rx: mpsc::Receiver<SchemaCommand>,
}

impl SchemaActor {
    /// Spawn the actor, returning its handle.
    pub fn spawn(timeout: Duration) -> SchemaHandle {
        let (tx, rx) = mpsc::channel(256);
        let actor = Self {
            schemas: HashMap::new(),
            rx,
        };
        tokio::spawn(actor.run());
        SchemaHandle { tx, timeout }
    }

    async fn run(mut self) {
        while let Some(command) = self.rx.recv().await {
            self.handle(command);
        }
    }

    fn handle(&mut self, command: SchemaCommand) {
        match command {
            SchemaCommand::Get { key, reply: tx } => {
                reply(tx, self.schemas.get(&key).cloned());
            }
            SchemaCommand::UpdateFromRecord { key, bit, reply: tx } => {
                let candidate = Schema::from_record(&bit);
                let result = match self.schemas.get(&key) {
                    Some(existing) => existing.union(&candidate),
                    None => Ok(candidate),
                };
                match result {
                    Ok(updated) => {
                        debug!(metric = %key, "schema updated");
                        self.schemas.insert(key, updated.clone());
                        reply(tx, Ok(updated));
                    }
                    Err(e) => {
                        info!(metric = %key, error = %e, "schema update rejected");
                        reply(tx, Err(e));
                    }
                }
            }
            SchemaCommand::Delete { key, reply: tx } => {
                self.schemas.remove(&key);
                reply(tx, ());
            }
            SchemaCommand::DeleteNamespace {
                db,
                namespace,
                reply: tx,
            } => {
                self.schemas
                    .retain(|key, _| !(key.db == db && key.namespace == namespace));
                reply(tx, ());
            }
        }
    }
}

/// Cheap cloneable handle to the schema actor.
#[derive(Clone)]
pub struct SchemaHandle {
    tx: mpsc::Sender<SchemaCommand>,
    timeout: Duration,
}

impl SchemaHandle {
    /// Fetch the schema for a metric, if one exists.
    pub async fn get_schema(&self, db: &str, namespace: &str, metric: &str) -> Result<Option<Schema>> {
        let (tx, rx) = oneshot::channel();
        send(
            &self.tx,
            SchemaCommand::Get {
                key: MetricKey::new(db, namespace, metric),
                reply: tx,
            },
        )
        .await?;
        ask(rx, self.timeout).await
    }

    /// Validate a record against the metric's schema and evolve it.
    ///
    /// Fails with [`crate::Error::SchemaConflict`] when a field of the
    /// record disagrees with the pinned type.
    pub async fn update_schema_from_record(
        &self,
        db: &str,
        namespace: &str,
        metric: &str,
        bit: &Bit,
    ) -> Result<Schema> {
        let (tx, rx) = oneshot::channel();
        send(
            &self.tx,
            SchemaCommand::UpdateFromRecord {
                key: MetricKey::new(db, namespace, metric),
                bit: bit.clone(),
                reply: tx,
            },
        )
        .await?;
        ask(rx, self.timeout).await?
    }

    /// Erase the schema of a metric.
    pub async fn delete_schema(&self, db: &str, namespace: &str, metric: &str) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        send(
            &self.tx,
            SchemaCommand::Delete {
                key: MetricKey::new(db, namespace, metric),
                reply: tx,
            },
        )
        .await?;
        ask(rx, self.timeout).await
    }

    /// Erase every schema under a namespace.
    pub async fn delete_namespace(&self, db: &str, namespace: &str) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        send(
            &self.tx,
            SchemaCommand::DeleteNamespace {
                db: db.to_string(),
                namespace: namespace.to_string(),
                reply: tx,
            },
        )
        .await?;
        ask(rx, self.timeout).await
    }
}
