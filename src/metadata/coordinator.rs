//! Metadata coordinator
//!
//! Single writer for location assignment. Starts in warm-up: every command
//! is buffered until the seed arrives, then the seed is replayed into the
//! store, readiness is announced on the cluster broadcast, and the buffer
//! is drained in arrival order.

use super::{Location, MetadataEvent, MetadataStore, MetricInfo, MetricKey};
use crate::actor::{ask, reply, send};
use crate::cluster::{MetadataBroadcast, NodeSelector};
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

/// Seed replayed into the store during warm-up.
#[derive(Debug, Default)]
pub struct MetadataSeed {
    pub locations: Vec<(MetricKey, Location)>,
    pub metric_infos: Vec<(MetricKey, MetricInfo)>,
}

enum MetadataCommand {
    WarmUp {
        seed: MetadataSeed,
        reply: oneshot::Sender<()>,
    },
    GetLocations {
        key: MetricKey,
        reply: oneshot::Sender<Vec<Location>>,
    },
    AddLocation {
        key: MetricKey,
        location: Location,
        reply: oneshot::Sender<Result<Location>>,
    },
    GetWriteLocations {
        key: MetricKey,
        timestamp: i64,
        reply: oneshot::Sender<Result<Vec<Location>>>,
    },
    GetMetricInfo {
        key: MetricKey,
        reply: oneshot::Sender<Option<MetricInfo>>,
    },
    PutMetricInfo {
        key: MetricKey,
        info: MetricInfo,
        reply: oneshot::Sender<Result<()>>,
    },
    DropMetric {
        key: MetricKey,
        reply: oneshot::Sender<()>,
    },
    DeleteNamespace {
        db: String,
        namespace: String,
        reply: oneshot::Sender<()>,
    },
}

/// The location-assignment authority.
pub struct MetadataCoordinator {
    store: Arc<dyn MetadataStore>,
    selector: Arc<dyn NodeSelector>,
    broadcast: MetadataBroadcast,
    default_interval_ms: i64,
    dedup_locations: bool,
    warmed_up: bool,
    stash: Vec<MetadataCommand>,
    rx: mpsc::Receiver<MetadataCommand>,
}

impl MetadataCoordinator {
    /// Spawn the coordinator, returning its handle. The actor stays in
    /// warm-up until [`MetadataHandle::warm_up`] is called.
    pub fn spawn(
        store: Arc<dyn MetadataStore>,
        selector: Arc<dyn NodeSelector>,
        broadcast: MetadataBroadcast,
        default_interval_ms: i64,
        dedup_locations: bool,
        timeout: Duration,
    ) -> MetadataHandle {
        let (tx, rx) = mpsc::channel(256);
        let actor = Self {
            store,
            selector,
            broadcast,
            default_interval_ms,
            dedup_locations,
            warmed_up: false,
            stash: Vec::new(),
            rx,
        };
        tokio::spawn(actor.run());
        MetadataHandle { tx, timeout }
    }

    async fn run(mut self) {
        while let Some(command) = self.rx.recv().await {
            if self.warmed_up {
                self.handle(command).await;
                continue;
            }
            match command {
                MetadataCommand::WarmUp { seed, reply: tx } => {
                    self.warm_up(seed).await;
                    reply(tx, ());
                    let stashed = std::mem::take(&mut self.stash);
                    for buffered in stashed {
                        self.handle(buffered).await;
                    }
                }
                other => self.stash.push(other),
            }
        }
    }

    async fn warm_up(&mut self, seed: MetadataSeed) {
        let locations = seed.locations.len();
        let metric_infos = seed.metric_infos.len();

        for (key, location) in seed.locations {
            self.store.add_location(&key, location).await;
        }
        for (key, info) in seed.metric_infos {
            if let Err(e) = self.store.put_metric_info(&key, info).await {
                debug!(metric = %key, error = %e, "skipping duplicate metric info in seed");
            }
        }

        self.warmed_up = true;
        info!(locations, metric_infos, "metadata warm-up complete");
        // Best-effort readiness announcement.
        self.broadcast.publish(MetadataEvent::WarmedUp {
            locations,
            metric_infos,
        });
    }

    async fn handle(&mut self, command: MetadataCommand) {
        match command {
            MetadataCommand::WarmUp { reply: tx, .. } => {
                // A second seed is a no-op: the coordinator is already serving.
                reply(tx, ());
            }
            MetadataCommand::GetLocations { key, reply: tx } => {
                reply(tx, self.store.locations(&key).await);
            }
            MetadataCommand::AddLocation {
                key,
                location,
                reply: tx,
            } => {
                if self.dedup_locations
                    && self.store.locations(&key).await.contains(&location)
                {
                    debug!(metric = %key, %location, "dropping duplicate location");
                    reply(tx, Ok(location));
                    return;
                }
                self.store.add_location(&key, location.clone()).await;
                self.broadcast.publish(MetadataEvent::LocationsAdded {
                    db: key.db.clone(),
                    namespace: key.namespace.clone(),
                    location: location.clone(),
                });
                reply(tx, Ok(location));
            }
            MetadataCommand::GetWriteLocations {
                key,
                timestamp,
                reply: tx,
            } => {
                let result = self.write_locations(&key, timestamp).await;
                reply(tx, result);
            }
            MetadataCommand::GetMetricInfo { key, reply: tx } => {
                reply(tx, self.store.metric_info(&key).await);
            }
            MetadataCommand::PutMetricInfo {
                key,
                info,
                reply: tx,
            } => {
                let result = self.store.put_metric_info(&key, info.clone()).await;
                if result.is_ok() {
                    self.broadcast.publish(MetadataEvent::MetricInfoPut {
                        db: key.db.clone(),
                        namespace: key.namespace.clone(),
                        info,
                    });
                }
                reply(tx, result);
            }
            MetadataCommand::DropMetric { key, reply: tx } => {
                self.store.delete_locations(&key).await;
                self.store.delete_metric_info(&key).await;
                reply(tx, ());
            }
            MetadataCommand::DeleteNamespace {
                db,
                namespace,
                reply: tx,
            } => {
                self.store.delete_all(&db, &namespace).await;
                reply(tx, ());
            }
        }
    }

    /// Deterministic write-location assignment.
    ///
    /// The active interval is the metric-info override when present, the
    /// configured default otherwise. The timestamp's bucket is floor-aligned
    /// to the interval, so for one metric any two returned ranges are either
    /// identical or disjoint.
    async fn write_locations(&self, key: &MetricKey, timestamp: i64) -> Result<Vec<Location>> {
        let interval = self
            .store
            .metric_info(key)
            .await
            .map_or(self.default_interval_ms, |info| info.shard_interval_ms);
        let from = timestamp.div_euclid(interval) * interval;
        let to = from + interval;

        let cached: Vec<Location> = self
            .store
            .locations(key)
            .await
            .into_iter()
            .filter(|location| location.from == from && location.to == to)
            .collect();
        if !cached.is_empty() {
            return Ok(cached);
        }

        let node = self.selector.select_node(&key.metric, from);
        let location = Location::new(&key.metric, node, from, to);
        self.store.add_location(key, location.clone()).await;
        debug!(metric = %key, %location, "allocated write location");
        self.broadcast.publish(MetadataEvent::LocationsAdded {
            db: key.db.clone(),
            namespace: key.namespace.clone(),
            location: location.clone(),
        });
        Ok(vec![location])
    }
}

/// Cheap cloneable handle to the metadata coordinator.
#[derive(Clone)]
pub struct MetadataHandle {
    tx: mpsc::Sender<MetadataCommand>,
    timeout: Duration,
}

impl MetadataHandle {
    /// Replay the seed and transition the coordinator to ready.
    pub async fn warm_up(&self, seed: MetadataSeed) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        send(&self.tx, MetadataCommand::WarmUp { seed, reply: tx }).await?;
        ask(rx, self.timeout).await
    }

    /// All known locations for a metric.
    pub async fn get_locations(
        &self,
        db: &str,
        namespace: &str,
        metric: &str,
    ) -> Result<Vec<Location>> {
        let (tx, rx) = oneshot::channel();
        send(
            &self.tx,
            MetadataCommand::GetLocations {
                key: MetricKey::new(db, namespace, metric),
                reply: tx,
            },
        )
        .await?;
        ask(rx, self.timeout).await
    }

    /// Append a location for a metric. Callers may add one replica per node.
    pub async fn add_location(
        &self,
        db: &str,
        namespace: &str,
        location: Location,
    ) -> Result<Location> {
        let (tx, rx) = oneshot::channel();
        send(
            &self.tx,
            MetadataCommand::AddLocation {
                key: MetricKey::new(db, namespace, &location.metric),
                location,
                reply: tx,
            },
        )
        .await?;
        ask(rx, self.timeout).await?
    }

    /// The locations a write with this timestamp must be delivered to,
    /// allocating the bucket if needed.
    pub async fn get_write_locations(
        &self,
        db: &str,
        namespace: &str,
        metric: &str,
        timestamp: i64,
    ) -> Result<Vec<Location>> {
        let (tx, rx) = oneshot::channel();
        send(
            &self.tx,
            MetadataCommand::GetWriteLocations {
                key: MetricKey::new(db, namespace, metric),
                timestamp,
                reply: tx,
            },
        )
        .await?;
        ask(rx, self.timeout).await?
    }

    /// The metric's shard-interval override, if registered.
    pub async fn get_metric_info(
        &self,
        db: &str,
        namespace: &str,
        metric: &str,
    ) -> Result<Option<MetricInfo>> {
        let (tx, rx) = oneshot::channel();
        send(
            &self.tx,
            MetadataCommand::GetMetricInfo {
                key: MetricKey::new(db, namespace, metric),
                reply: tx,
            },
        )
        .await?;
        ask(rx, self.timeout).await
    }

    /// Register a shard-interval override. Fails if one is already present.
    pub async fn put_metric_info(
        &self,
        db: &str,
        namespace: &str,
        info: MetricInfo,
    ) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        send(
            &self.tx,
            MetadataCommand::PutMetricInfo {
                key: MetricKey::new(db, namespace, &info.metric),
                info,
                reply: tx,
            },
        )
        .await?;
        ask(rx, self.timeout).await?
    }

    /// Drop a metric's locations and info.
    pub async fn drop_metric(&self, db: &str, namespace: &str, metric: &str) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        send(
            &self.tx,
            MetadataCommand::DropMetric {
                key: MetricKey::new(db, namespace, metric),
                reply: tx,
            },
        )
        .await?;
        ask(rx, self.timeout).await
    }

    /// Drop all metadata under a namespace.
    pub async fn delete_namespace(&self, db: &str, namespace: &str) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        send(
            &self.tx,
            MetadataCommand::DeleteNamespace {
                db: db.to_string(),
                namespace: namespace.to_string(),
                reply: tx,
            },
        )
        .await?;
        ask(rx, self.timeout).await
    }
}
