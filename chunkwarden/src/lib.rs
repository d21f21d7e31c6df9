//! # chunkwarden
//!
//! Topology-aware verification engine for content-addressed storage
//! clusters.
//!
//! The engine drives multi-step protocols against a live cluster and
//! checks observable outcomes: data integrity, replication, and recovery
//! after loss. It models node proximity in an XOR-distance address space,
//! selects nodes for test roles deterministically from a seed, and runs
//! each protocol as a bounded state machine that tolerates the eventual
//! consistency of the network under test.
//!
//! ## Protocols
//!
//! - [`RoundTripCheck`]: uploads content through one node, downloads it
//!   through another, and compares bytes. Individual failures are
//!   diagnostic signal; the loop continues until its deadline.
//! - [`ReplicationCheck`]: verifies an uploaded chunk lands on the node
//!   closest to its address and is replicated to at least one more node.
//! - [`RecoveryCheck`]: deletes a chunk from every node and verifies the
//!   network reconstructs it from a pinned origin copy.
//!
//! ## Determinism
//!
//! Re-running a protocol with the same seed against the same topology
//! snapshot produces byte-identical chunk content and identical role
//! assignments: content and selections come from [`streams`]-derived
//! generators, every tie-break in [`topology`] is fixed, and time is
//! injected through the [`Clock`] seam so tests can run on a virtual
//! clock.
//!
//! ## Collaborators
//!
//! The engine is a pure orchestration layer. Node I/O goes through the
//! [`NodeClient`] trait, metrics through [`MetricsSink`], and diagnostics
//! through `tracing`; cluster provisioning, HTTP transport, and exporter
//! wiring live with the embedder.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

/// Overlay addresses and the XOR distance metric.
pub mod address;
/// Verification protocols and their options.
pub mod check;
/// Content-addressed chunks.
pub mod chunk;
/// Storage node client contract.
pub mod client;
/// Clock seam for real and virtual time.
pub mod clock;
/// Read-only cluster handle map and topology capture.
pub mod cluster;
/// Run context: seed, deadline, cancellation.
pub mod context;
/// Error taxonomy for protocol runs.
pub mod error;
/// Metrics sink contract.
pub mod metrics;
/// Bounded retry and poll execution.
pub mod retry;
/// Deterministic pseudorandom stream derivation.
pub mod streams;
/// Cluster topology snapshots and proximity queries.
pub mod topology;

pub use address::{Address, AddressError, Distance};
pub use check::{
    Check, RecoveryCheck, RecoveryOptions, ReplicationCheck, ReplicationOptions, RoundTripCheck,
    RoundTripOptions, RoundTripOutcome, RoundTripRecord,
};
pub use chunk::Chunk;
pub use client::{BatchId, ClientError, NodeClient};
pub use clock::{Clock, ManualClock, TokioClock};
pub use cluster::Cluster;
pub use context::RunContext;
pub use error::{CheckError, CheckResult};
pub use metrics::{MemoryMetricsSink, MetricsSink, NullMetricsSink};
pub use retry::{DelayMode, PollOutcome, RetryOutcome, RetryPolicy};
pub use streams::{pseudo_generator, pseudo_generators};
pub use topology::{ClusterTopology, NodeId, TopologyError};
