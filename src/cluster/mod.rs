//! Cluster seams
//!
//! NSDb's core does not implement membership: node identity is an opaque
//! string handed in by the gossip layer, and write-node selection is an
//! injected policy. The metadata coordinator announces state changes on a
//! best-effort broadcast that tests can subscribe to as a probe.

use crate::metadata::MetadataEvent;
use tokio::sync::broadcast;
use tracing::debug;

/// Opaque cluster node identifier.
pub type NodeId = String;

/// Write-node selection policy.
///
/// Invoked by the metadata coordinator when a write targets a time bucket
/// with no assigned location. `from` is the aligned start of the bucket.
pub trait NodeSelector: Send + Sync {
    fn select_node(&self, metric: &str, from: i64) -> NodeId;
}

/// Selector that pins every bucket to a single node. The default for
/// single-node deployments and tests.
#[derive(Debug, Clone)]
pub struct FixedNodeSelector {
    node: NodeId,
}

impl FixedNodeSelector {
    pub fn new(node: impl Into<NodeId>) -> Self {
        Self { node: node.into() }
    }
}

impl NodeSelector for FixedNodeSelector {
    fn select_node(&self, _metric: &str, _from: i64) -> NodeId {
        self.node.clone()
    }
}

/// Broadcast channel for metadata state-change announcements.
///
/// Delivery is best-effort: subscribers may miss or reorder events, and
/// publishing with no subscribers is not an error.
#[derive(Debug)]
pub struct MetadataBroadcast {
    sender: broadcast::Sender<MetadataEvent>,
}

impl MetadataBroadcast {
    /// Create a new broadcast with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: MetadataEvent) {
        if let Err(e) = self.sender.send(event) {
            debug!("no metadata subscribers: {e}");
        }
    }

    /// Subscribe to receive future events.
    pub fn subscribe(&self) -> broadcast::Receiver<MetadataEvent> {
        self.sender.subscribe()
    }

    /// The current number of subscribers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Clone for MetadataBroadcast {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl Default for MetadataBroadcast {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Location;

    #[tokio::test]
    async fn test_broadcast_reaches_all_subscribers() {
        let broadcast = MetadataBroadcast::new(16);
        let mut rx1 = broadcast.subscribe();
        let mut rx2 = broadcast.subscribe();

        broadcast.publish(MetadataEvent::LocationsAdded {
            db: "db".to_string(),
            namespace: "ns".to_string(),
            location: Location::new("m", "node-1", 0, 60_000),
        });

        assert!(matches!(
            rx1.recv().await.unwrap(),
            MetadataEvent::LocationsAdded { .. }
        ));
        assert!(matches!(
            rx2.recv().await.unwrap(),
            MetadataEvent::LocationsAdded { .. }
        ));
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let broadcast = MetadataBroadcast::new(16);
        broadcast.publish(MetadataEvent::WarmedUp {
            locations: 0,
            metric_infos: 0,
        });
    }

    #[test]
    fn test_fixed_selector_always_picks_its_node() {
        let selector = FixedNodeSelector::new("node-1");
        assert_eq!(selector.select_node("cpu", 0), "node-1");
        assert_eq!(selector.select_node("mem", 120_000), "node-1");
    }
}
