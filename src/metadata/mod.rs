//! Cluster metadata
//!
//! Tracks which time-sharded locations a metric's writes go to, and the
//! per-metric shard-interval overrides. The coordinator is the single
//! writer; the cache is the store it consults.

mod cache;
mod coordinator;

pub use cache::{MetadataCache, MetadataStore};
pub use coordinator::{MetadataCoordinator, MetadataHandle, MetadataSeed};

use crate::cluster::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fully qualified metric coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetricKey {
    pub db: String,
    pub namespace: String,
    pub metric: String,
}

impl MetricKey {
    pub fn new(db: impl Into<String>, namespace: impl Into<String>, metric: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            namespace: namespace.into(),
            metric: metric.into(),
        }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.db, self.namespace, self.metric)
    }
}

/// A half-open time range `[from, to)` on a specific node to which a
/// metric's writes for that range are directed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub metric: String,
    pub node: NodeId,
    pub from: i64,
    pub to: i64,
}

impl Location {
    pub fn new(metric: impl Into<String>, node: impl Into<NodeId>, from: i64, to: i64) -> Self {
        Self {
            metric: metric.into(),
            node: node.into(),
            from,
            to,
        }
    }

    /// Whether the timestamp falls inside `[from, to)`.
    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.from && timestamp < self.to
    }

    /// Whether this location covers exactly the same range as another.
    pub fn same_range(&self, other: &Location) -> bool {
        self.from == other.from && self.to == other.to
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}[{}, {})",
            self.metric, self.node, self.from, self.to
        )
    }
}

/// Per-metric shard-interval override. Immutable once set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricInfo {
    pub metric: String,
    pub shard_interval_ms: i64,
}

impl MetricInfo {
    pub fn new(metric: impl Into<String>, shard_interval_ms: i64) -> Self {
        Self {
            metric: metric.into(),
            shard_interval_ms,
        }
    }
}

/// State-change announcements published on the cluster broadcast.
#[derive(Debug, Clone)]
pub enum MetadataEvent {
    /// The coordinator finished replaying its seed and is ready.
    WarmedUp {
        locations: usize,
        metric_infos: usize,
    },
    /// A location was appended for a metric.
    LocationsAdded {
        db: String,
        namespace: String,
        location: Location,
    },
    /// A metric info was registered.
    MetricInfoPut {
        db: String,
        namespace: String,
        info: MetricInfo,
    },
}
