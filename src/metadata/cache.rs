//! In-memory metadata store
//!
//! Two keyspaces: locations (multi-valued list per metric) and metric
//! infos (single-valued per metric, second put fails). Mutations are
//! serialized per key by the map's shard locking. A durable backing can be
//! layered behind the same trait.

use super::{Location, MetricInfo, MetricKey};
use crate::{Error, Result};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Operations the metadata coordinator asks of its store.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Append a location to the metric's list. Does not deduplicate.
    async fn add_location(&self, key: &MetricKey, location: Location);
    /// All known locations for the metric.
    async fn locations(&self, key: &MetricKey) -> Vec<Location>;
    /// Drop every location of the metric.
    async fn delete_locations(&self, key: &MetricKey);
    /// Register a metric info. Fails if one is already present.
    async fn put_metric_info(&self, key: &MetricKey, info: MetricInfo) -> Result<()>;
    /// The metric's info, if registered.
    async fn metric_info(&self, key: &MetricKey) -> Option<MetricInfo>;
    /// Drop the metric's info.
    async fn delete_metric_info(&self, key: &MetricKey);
    /// Drop both keyspaces for every metric of a namespace.
    async fn delete_all(&self, db: &str, namespace: &str);
}

/// The in-memory store used by a running coordinator.
#[derive(Debug, Default)]
pub struct MetadataCache {
    locations: DashMap<MetricKey, Vec<Location>>,
    metric_infos: DashMap<MetricKey, MetricInfo>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for MetadataCache {
    async fn add_location(&self, key: &MetricKey, location: Location) {
        self.locations
            .entry(key.clone())
            .or_default()
            .push(location);
    }

    async fn locations(&self, key: &MetricKey) -> Vec<Location> {
        self.locations
            .get(key)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    async fn delete_locations(&self, key: &MetricKey) {
        self.locations.remove(key);
    }

    async fn put_metric_info(&self, key: &MetricKey, info: MetricInfo) -> Result<()> {
        if info.shard_interval_ms <= 0 {
            return Err(Error::Config(format!(
                "shard interval for metric {} must be positive",
                info.metric
            )));
        }
        // entry() holds the shard lock, so a concurrent double-put cannot
        // both observe the key as vacant.
        match self.metric_infos.entry(key.clone()) {
            Entry::Occupied(_) => Err(Error::DuplicateMetricInfo {
                metric: key.metric.clone(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(info);
                Ok(())
            }
        }
    }

    async fn metric_info(&self, key: &MetricKey) -> Option<MetricInfo> {
        self.metric_infos.get(key).map(|entry| entry.value().clone())
    }

    async fn delete_metric_info(&self, key: &MetricKey) {
        self.metric_infos.remove(key);
    }

    async fn delete_all(&self, db: &str, namespace: &str) {
        self.locations
            .retain(|key, _| !(key.db == db && key.namespace == namespace));
        self.metric_infos
            .retain(|key, _| !(key.db == db && key.namespace == namespace));
    }
}
