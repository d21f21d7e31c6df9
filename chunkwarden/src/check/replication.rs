//! Replication-on-write check.
//!
//! For each designated uploading node, uploads seeded random chunks and
//! verifies two things against the topology snapshot: the chunk lands on
//! the node closest to its address, and at least one other node holds a
//! replica. Unlike the round-trip check, any unmet condition here is
//! fatal for the whole run.

use std::collections::BTreeSet;
use std::rc::Rc;
use std::time::Duration;

use crate::chunk::Chunk;
use crate::clock::Clock;
use crate::cluster::Cluster;
use crate::context::RunContext;
use crate::error::{CheckError, CheckResult};
use crate::metrics::MetricsSink;
use crate::retry::{sleep_cancellable, DelayMode, PollOutcome, RetryOutcome, RetryPolicy};
use crate::streams::pseudo_generators;
use crate::topology::TopologyError;

/// Options for [`ReplicationCheck`], validated at construction.
#[derive(Debug, Clone)]
pub struct ReplicationOptions {
    /// How many nodes act as uploaders, in snapshot order.
    pub upload_node_count: usize,
    /// Chunks uploaded and verified per uploader.
    pub chunks_per_node: usize,
    /// Size of each generated chunk, in bytes.
    pub chunk_size: usize,
    /// Delay between retries and possession probes.
    pub retry_delay: Duration,
    /// Funding batch amount for uploads.
    pub postage_amount: u64,
    /// Funding batch depth.
    pub postage_depth: u8,
    /// Per-unit batch price, forwarded verbatim when present.
    pub postage_price: Option<String>,
    /// Label attached to created batches.
    pub batch_label: String,
}

impl Default for ReplicationOptions {
    fn default() -> Self {
        Self {
            upload_node_count: 1,
            chunks_per_node: 1,
            chunk_size: 4096,
            retry_delay: Duration::from_secs(5),
            postage_amount: 1_000_000,
            postage_depth: 20,
            postage_price: None,
            batch_label: "replication".to_string(),
        }
    }
}

/// The replication-on-write protocol.
pub struct ReplicationCheck {
    options: ReplicationOptions,
    metrics: Rc<dyn MetricsSink>,
}

impl ReplicationCheck {
    /// Create a check, validating the options.
    pub fn new(options: ReplicationOptions, metrics: Rc<dyn MetricsSink>) -> CheckResult<Self> {
        if options.upload_node_count == 0 {
            return Err(CheckError::Configuration {
                reason: "upload_node_count must be positive".to_string(),
            });
        }
        if options.chunks_per_node == 0 {
            return Err(CheckError::Configuration {
                reason: "chunks_per_node must be positive".to_string(),
            });
        }
        if options.chunk_size == 0 {
            return Err(CheckError::Configuration {
                reason: "chunk_size must be positive".to_string(),
            });
        }
        Ok(Self { options, metrics })
    }

    /// Run the check to completion. The first unmet replication condition
    /// aborts the run; cancellation returns `Ok(())`.
    pub async fn run<C: Clock>(&self, ctx: &RunContext<C>, cluster: &Cluster) -> CheckResult<()> {
        if cluster.size() < 2 {
            return Err(CheckError::InsufficientTopology {
                required: 2,
                available: cluster.size(),
            });
        }

        let clock = ctx.clock().clone();
        let cancel = ctx.cancellation().clone();
        let topology = cluster.snapshot().await?;
        let mut rngs = pseudo_generators(ctx.seed(), self.options.upload_node_count);
        let retry = RetryPolicy::new(3, self.options.retry_delay, DelayMode::AfterFailure);

        tracing::info!(seed = ctx.seed(), "starting replication check");

        let uploaders: Vec<_> = cluster
            .node_ids()
            .into_iter()
            .take(self.options.upload_node_count)
            .collect();

        for (index, uploader_id) in uploaders.iter().enumerate() {
            if ctx.finished() {
                return Ok(());
            }
            let uploader = cluster
                .client(uploader_id)
                .ok_or_else(|| CheckError::UnknownNode {
                    node: uploader_id.clone(),
                })?;

            let batch = uploader
                .create_batch(
                    self.options.postage_amount,
                    self.options.postage_depth,
                    self.options.postage_price.as_deref(),
                    &self.options.batch_label,
                )
                .await
                .map_err(|source| CheckError::Client {
                    node: uploader_id.clone(),
                    source,
                })?;
            tracing::info!(node = %uploader_id, batch = %batch, "using batch");

            for _ in 0..self.options.chunks_per_node {
                if ctx.finished() {
                    return Ok(());
                }
                let chunk = Chunk::random(&mut rngs[index], self.options.chunk_size);

                let upload_op = {
                    let client = Rc::clone(uploader);
                    let data = chunk.data().clone();
                    let batch = batch.clone();
                    move || {
                        let client = Rc::clone(&client);
                        let data = data.clone();
                        let batch = batch.clone();
                        async move { client.upload_chunk(data, Some(&batch), false).await }
                    }
                };
                let reference = match retry.execute(&clock, &cancel, upload_op).await {
                    RetryOutcome::Success { value, .. } => value,
                    RetryOutcome::Cancelled => return Ok(()),
                    RetryOutcome::Exhausted {
                        last_error,
                        attempts,
                    } => {
                        return Err(CheckError::RetriesExhausted {
                            node: uploader_id.clone(),
                            operation: "upload chunk",
                            attempts,
                            source: last_error,
                        })
                    }
                };
                self.metrics
                    .incr_counter("replication_uploaded", &[("node", uploader_id.as_str())]);
                tracing::info!(node = %uploader_id, chunk = %reference, "uploaded chunk");

                // Let the write propagate before the first probe.
                if sleep_cancellable(&clock, &cancel, self.options.retry_delay).await {
                    return Ok(());
                }

                let (closest_id, closest_addr) =
                    topology.closest(chunk.address(), &BTreeSet::new())?;
                let closest_id = closest_id.clone();
                tracing::info!(node = %closest_id, overlay = %closest_addr, "closest node");

                let closest = cluster
                    .client(&closest_id)
                    .ok_or_else(|| CheckError::UnknownNode {
                        node: closest_id.clone(),
                    })?;
                let probe = {
                    let client = Rc::clone(closest);
                    let address = reference.clone();
                    let node = closest_id.clone();
                    move || {
                        let client = Rc::clone(&client);
                        let address = address.clone();
                        let node = node.clone();
                        async move {
                            match client.has_chunk(&address).await {
                                Ok(present) => present,
                                Err(error) => {
                                    tracing::debug!(node = %node, %error, "possession probe failed");
                                    false
                                }
                            }
                        }
                    }
                };
                match retry.poll_until(&clock, &cancel, probe).await {
                    PollOutcome::Satisfied { .. } => {
                        self.metrics.incr_counter(
                            "replication_confirmed",
                            &[("node", closest_id.as_str())],
                        );
                        tracing::info!(node = %closest_id, chunk = %reference, "chunk found in closest node");
                    }
                    PollOutcome::Cancelled => return Ok(()),
                    PollOutcome::Exhausted { .. } => {
                        return Err(CheckError::NotFoundInClosest {
                            node: closest_id,
                            chunk: reference,
                        })
                    }
                }

                // The chunk must live on at least one more node, found by
                // scanning candidates in ascending distance order.
                let mut excluded = BTreeSet::from([closest_id.clone()]);
                let mut replicated_to = None;
                let mut scanned: u64 = 0;
                loop {
                    if ctx.is_cancelled() {
                        return Ok(());
                    }
                    let candidate_id = match topology.closest(chunk.address(), &excluded) {
                        Ok((id, _)) => id.clone(),
                        Err(TopologyError::EmptyCandidateSet) => break,
                        Err(error) => return Err(error.into()),
                    };
                    excluded.insert(candidate_id.clone());
                    scanned += 1;
                    let candidate =
                        cluster
                            .client(&candidate_id)
                            .ok_or_else(|| CheckError::UnknownNode {
                                node: candidate_id.clone(),
                            })?;
                    match candidate.has_chunk(&reference).await {
                        Ok(true) => {
                            replicated_to = Some(candidate_id);
                            break;
                        }
                        Ok(false) => {}
                        Err(error) => {
                            tracing::debug!(node = %candidate_id, %error, "replica probe failed, skipping candidate");
                        }
                    }
                }
                self.metrics.incr_counter_by(
                    "replication_replicas_scanned",
                    &[("node", uploader_id.as_str())],
                    scanned,
                );

                match replicated_to {
                    Some(node) => {
                        tracing::info!(node = %node, chunk = %reference, "chunk was replicated");
                    }
                    None => {
                        return Err(CheckError::NotReplicated {
                            node: uploader_id.clone(),
                            chunk: reference,
                        })
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::NullMetricsSink;

    #[test]
    fn test_options_validated() {
        let sink = Rc::new(NullMetricsSink);

        let zero_uploaders = ReplicationOptions {
            upload_node_count: 0,
            ..ReplicationOptions::default()
        };
        assert!(matches!(
            ReplicationCheck::new(zero_uploaders, Rc::clone(&sink) as Rc<dyn MetricsSink>),
            Err(CheckError::Configuration { .. })
        ));

        let zero_chunks = ReplicationOptions {
            chunks_per_node: 0,
            ..ReplicationOptions::default()
        };
        assert!(matches!(
            ReplicationCheck::new(zero_chunks, Rc::clone(&sink) as Rc<dyn MetricsSink>),
            Err(CheckError::Configuration { .. })
        ));
    }
}
