//! Verification protocols.
//!
//! Each protocol is a bounded state machine with a strongly-typed,
//! construction-validated options struct. [`Check`] tags the three kinds
//! so embedders can hold and dispatch a protocol without downcasting.

mod recovery;
mod replication;
mod round_trip;

pub use recovery::{RecoveryCheck, RecoveryOptions};
pub use replication::{ReplicationCheck, ReplicationOptions};
pub use round_trip::{RoundTripCheck, RoundTripOptions, RoundTripOutcome, RoundTripRecord};

use crate::clock::Clock;
use crate::cluster::Cluster;
use crate::context::RunContext;
use crate::error::CheckResult;

/// A verification protocol, tagged by kind.
pub enum Check {
    /// Round-trip integrity: upload through one node, download through
    /// another, compare bytes.
    RoundTrip(RoundTripCheck),
    /// Replication-on-write: confirm the closest node and at least one
    /// replica hold an uploaded chunk.
    Replication(ReplicationCheck),
    /// Recovery-after-loss: delete a chunk everywhere and verify the
    /// network reconstructs it.
    Recovery(RecoveryCheck),
}

impl Check {
    /// Protocol name for logs and reports.
    pub fn name(&self) -> &'static str {
        match self {
            Check::RoundTrip(_) => "round-trip",
            Check::Replication(_) => "replication",
            Check::Recovery(_) => "recovery",
        }
    }

    /// Run the protocol to completion against `cluster`. A returned error
    /// is the run's fatal outcome; the caller decides process exit
    /// behavior.
    pub async fn run<C: Clock>(
        &mut self,
        ctx: &RunContext<C>,
        cluster: &Cluster,
    ) -> CheckResult<()> {
        match self {
            Check::RoundTrip(check) => check.run(ctx, cluster).await,
            Check::Replication(check) => check.run(ctx, cluster).await,
            Check::Recovery(check) => check.run(ctx, cluster).await,
        }
    }
}
