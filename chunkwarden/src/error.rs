//! Error taxonomy for protocol runs.
//!
//! Every error that crosses a protocol boundary carries the node and
//! operation it came from. Continue-or-abort decisions are taken on
//! specific variants at specific points in each protocol; nothing is
//! silently discarded elsewhere. Cancellation is not an error: a
//! cancelled run returns `Ok(())`.

use thiserror::Error;

use crate::address::{Address, AddressError};
use crate::client::ClientError;
use crate::topology::{NodeId, TopologyError};

/// A type alias for `Result<T, CheckError>`.
pub type CheckResult<T> = Result<T, CheckError>;

/// Fatal outcomes of a protocol run.
#[derive(Debug, Error)]
pub enum CheckError {
    /// Invalid options, rejected at construction before any network call.
    #[error("invalid configuration: {reason}")]
    Configuration {
        /// What was wrong with the options.
        reason: String,
    },

    /// The cluster holds fewer nodes than the protocol needs.
    #[error("insufficient topology: {required} nodes required, {available} available")]
    InsufficientTopology {
        /// Nodes the protocol needs.
        required: usize,
        /// Nodes the cluster has.
        available: usize,
    },

    /// A network operation kept failing past its retry bound.
    #[error("{operation} on node {node} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// The node the operation was issued against.
        node: NodeId,
        /// What was being attempted.
        operation: &'static str,
        /// Attempts consumed.
        attempts: u32,
        /// The error from the final attempt.
        source: ClientError,
    },

    /// Downloaded bytes differ from the uploaded bytes.
    #[error("chunk {chunk} integrity mismatch after download from node {node}")]
    Integrity {
        /// The node the corrupt bytes came from.
        node: NodeId,
        /// The chunk address.
        chunk: Address,
    },

    /// A bounded wait loop exceeded its attempt limit.
    #[error("gave up waiting for {condition} on node {node} after {attempts} attempts")]
    PollExhausted {
        /// The node that was being polled.
        node: NodeId,
        /// The awaited condition.
        condition: &'static str,
        /// Probes consumed.
        attempts: u32,
    },

    /// The chunk never appeared on the node closest to its address.
    #[error("chunk {chunk} not found in closest node {node}")]
    NotFoundInClosest {
        /// The closest node.
        node: NodeId,
        /// The chunk address.
        chunk: Address,
    },

    /// No node beyond the closest one holds the chunk.
    #[error("chunk {chunk} uploaded via node {node} was not replicated")]
    NotReplicated {
        /// The uploading node.
        node: NodeId,
        /// The chunk address.
        chunk: Address,
    },

    /// The download meant to trigger recovery failed with something other
    /// than the expected pending signal.
    #[error("recovery not triggered for chunk {chunk}: {source}")]
    RecoveryNotTriggered {
        /// The chunk address.
        chunk: Address,
        /// The unexpected error.
        source: ClientError,
    },

    /// A node still reports the chunk after it was removed.
    #[error("chunk {chunk} still present on node {node} after removal")]
    RemovalNotConfirmed {
        /// The node that still holds the chunk.
        node: NodeId,
        /// The chunk address.
        chunk: Address,
    },

    /// A single client call failed where no retry applies.
    #[error("node {node}: {source}")]
    Client {
        /// The node the call was issued against.
        node: NodeId,
        /// The underlying failure.
        source: ClientError,
    },

    /// A node identifier had no client handle.
    #[error("no client for node {node}")]
    UnknownNode {
        /// The unknown identifier.
        node: NodeId,
    },

    /// Address-space failure, e.g. mixed address lengths in a snapshot.
    #[error(transparent)]
    Address(#[from] AddressError),

    /// Topology query failure.
    #[error(transparent)]
    Topology(#[from] TopologyError),
}
