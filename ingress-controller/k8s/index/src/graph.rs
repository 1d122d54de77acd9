use ingress_controller_core::{
    graph::{GraphSnapshot, VirtualHostTable},
    ResourceId,
};
use std::sync::Arc;
use tokio::sync::watch;

/// Publishes resolved graphs to readers.
#[derive(Debug)]
pub struct Publisher(watch::Sender<Arc<GraphSnapshot>>);

/// Observes the latest resolved graph.
///
/// Readers always see a complete graph: each publication atomically replaces
/// the previous one.
#[derive(Clone, Debug)]
pub struct Reader(watch::Receiver<Arc<GraphSnapshot>>);

pub fn channel() -> (Publisher, Reader) {
    let (tx, rx) = watch::channel(Arc::new(GraphSnapshot::default()));
    (Publisher(tx), Reader(rx))
}

// === impl Publisher ===

impl Publisher {
    /// Replaces the published graph, returning false if it was unchanged.
    pub fn publish(&self, graph: GraphSnapshot) -> bool {
        self.0.send_if_modified(|current| {
            if **current == graph {
                return false;
            }
            *current = Arc::new(graph);
            true
        })
    }

    pub fn subscribe(&self) -> Reader {
        Reader(self.0.subscribe())
    }
}

// === impl Reader ===

impl Reader {
    pub fn latest(&self) -> Arc<GraphSnapshot> {
        self.0.borrow().clone()
    }

    /// Waits for a graph that this reader has not yet observed.
    ///
    /// Returns `None` once the publisher has been dropped.
    pub async fn next(&mut self) -> Option<Arc<GraphSnapshot>> {
        self.0.changed().await.ok()?;
        Some(self.0.borrow_and_update().clone())
    }

    pub fn virtual_host(&self, root: &ResourceId) -> Option<VirtualHostTable> {
        self.0.borrow().virtual_host(root).cloned()
    }
}
