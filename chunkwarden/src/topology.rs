//! Cluster topology snapshots and proximity queries.
//!
//! A [`ClusterTopology`] is an immutable snapshot of node overlay
//! addresses, captured once per protocol iteration. All queries scan the
//! snapshot in ascending [`NodeId`] order, which makes every tie-break
//! deterministic: the earliest node (or pair) in that order wins. True
//! ties are exponentially unlikely with high-entropy addresses, but
//! reproducible runs require the order to be fixed regardless.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::{Address, AddressError, Distance};

/// Identifier of a node within the cluster, stable for the whole run.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    /// Create a node identifier.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// Errors from topology queries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    /// Every node in the snapshot was excluded from the candidate set.
    #[error("every candidate node is excluded")]
    EmptyCandidateSet,
    /// The snapshot holds fewer nodes than the query needs.
    #[error("topology has {available} nodes, {required} required")]
    NotEnoughNodes {
        /// Nodes the query needs.
        required: usize,
        /// Nodes in the snapshot.
        available: usize,
    },
    /// Addresses in the snapshot had mismatched lengths.
    #[error(transparent)]
    Address(#[from] AddressError),
}

/// An immutable snapshot of node overlay addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterTopology {
    overlays: BTreeMap<NodeId, Address>,
}

impl ClusterTopology {
    /// Create a snapshot from a node-to-address map.
    pub fn new(overlays: BTreeMap<NodeId, Address>) -> Self {
        Self { overlays }
    }

    /// Number of nodes in the snapshot.
    pub fn len(&self) -> usize {
        self.overlays.len()
    }

    /// Whether the snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.overlays.is_empty()
    }

    /// Overlay address of `node`, if present.
    pub fn address_of(&self, node: &NodeId) -> Option<&Address> {
        self.overlays.get(node)
    }

    /// Iterate nodes and addresses in ascending [`NodeId`] order.
    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &Address)> {
        self.overlays.iter()
    }

    /// Node identifiers in ascending order.
    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.overlays.keys()
    }

    /// The node closest to `target` by XOR distance, skipping `excluded`.
    ///
    /// Scans in ascending [`NodeId`] order; on a distance tie the earlier
    /// node is kept. Fails with [`TopologyError::EmptyCandidateSet`] when
    /// every node is excluded.
    pub fn closest(
        &self,
        target: &Address,
        excluded: &BTreeSet<NodeId>,
    ) -> Result<(&NodeId, &Address), TopologyError> {
        let mut best: Option<(&NodeId, &Address, Distance)> = None;
        for (id, addr) in &self.overlays {
            if excluded.contains(id) {
                continue;
            }
            let dist = addr.distance(target)?;
            let closer = match &best {
                Some((_, _, best_dist)) => dist < *best_dist,
                None => true,
            };
            if closer {
                best = Some((id, addr, dist));
            }
        }
        best.map(|(id, addr, _)| (id, addr))
            .ok_or(TopologyError::EmptyCandidateSet)
    }

    /// The two nodes with the greatest pairwise XOR distance, with their
    /// addresses.
    ///
    /// Full O(n²) pair scan; cluster sizes are tens of nodes, so the
    /// quadratic cost is irrelevant. Scans ordered pairs in ascending
    /// [`NodeId`] order and only a strictly greater distance replaces the
    /// incumbent, so ties keep the earliest pair.
    #[allow(clippy::type_complexity)]
    pub fn farthest_pair(
        &self,
    ) -> Result<((&NodeId, &Address), (&NodeId, &Address)), TopologyError> {
        if self.overlays.len() < 2 {
            return Err(TopologyError::NotEnoughNodes {
                required: 2,
                available: self.overlays.len(),
            });
        }
        let mut best: Option<((&NodeId, &Address), (&NodeId, &Address), Distance)> = None;
        for (i, a) in self.overlays.iter().enumerate() {
            for b in self.overlays.iter().skip(i + 1) {
                let dist = a.1.distance(b.1)?;
                let farther = match &best {
                    Some((_, _, best_dist)) => dist > *best_dist,
                    None => true,
                };
                if farther {
                    best = Some((a, b, dist));
                }
            }
        }
        best.map(|(a, b, _)| (a, b))
            .ok_or(TopologyError::EmptyCandidateSet)
    }
}

impl FromIterator<(NodeId, Address)> for ClusterTopology {
    fn from_iter<I: IntoIterator<Item = (NodeId, Address)>>(iter: I) -> Self {
        Self {
            overlays: iter.into_iter().collect(),
        }
    }
}
