//! Read-only cluster handle map and topology capture.

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::client::NodeClient;
use crate::error::CheckError;
use crate::topology::{ClusterTopology, NodeId};

/// The set of node clients a protocol runs against.
///
/// The map is read-only for the lifetime of a run and is shared by
/// reference into every protocol call; node handles are long-lived and
/// never mutated by the engine.
pub struct Cluster {
    clients: BTreeMap<NodeId, Rc<dyn NodeClient>>,
}

impl Cluster {
    /// Create a cluster from a node-to-client map.
    pub fn new(clients: BTreeMap<NodeId, Rc<dyn NodeClient>>) -> Self {
        Self { clients }
    }

    /// Number of nodes.
    pub fn size(&self) -> usize {
        self.clients.len()
    }

    /// Whether the cluster has no nodes.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// The client for `node`, if known.
    pub fn client(&self, node: &NodeId) -> Option<&Rc<dyn NodeClient>> {
        self.clients.get(node)
    }

    /// Iterate clients in ascending [`NodeId`] order.
    pub fn clients(&self) -> impl Iterator<Item = (&NodeId, &Rc<dyn NodeClient>)> {
        self.clients.iter()
    }

    /// Node identifiers in ascending order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.clients.keys().cloned().collect()
    }

    /// Capture a topology snapshot by querying every node's overlay
    /// address. The snapshot is immutable; decisions within one protocol
    /// iteration all use the same capture.
    pub async fn snapshot(&self) -> Result<ClusterTopology, CheckError> {
        let mut overlays = BTreeMap::new();
        for (id, client) in &self.clients {
            let address = client
                .overlay_address()
                .await
                .map_err(|source| CheckError::Client {
                    node: id.clone(),
                    source,
                })?;
            overlays.insert(id.clone(), address);
        }
        Ok(ClusterTopology::new(overlays))
    }
}

impl FromIterator<(NodeId, Rc<dyn NodeClient>)> for Cluster {
    fn from_iter<I: IntoIterator<Item = (NodeId, Rc<dyn NodeClient>)>>(iter: I) -> Self {
        Self {
            clients: iter.into_iter().collect(),
        }
    }
}
