//! Recovery-after-loss check.
//!
//! Verifies that the network can reconstruct a chunk that has vanished
//! from every node. Roles per iteration: A and C are the farthest pair in
//! the topology, so a chunk uploaded through A is unlikely to already sit
//! near C; B is the node closest to a freshly generated chunk, where the
//! network is expected to place it. The chunk is uploaded, confirmed on
//! B, downloaded from C, deleted everywhere, and then requested from C
//! again with an origin hint pointing at A's neighborhood; once A holds a
//! pinned copy again, C must eventually serve the original bytes.
//!
//! Every unexpected condition is fatal here. This protocol gives no
//! partial credit: a single integrity mismatch or exhausted poll aborts
//! the whole run.

use std::collections::BTreeSet;
use std::rc::Rc;
use std::time::Duration;

use crate::chunk::Chunk;
use crate::client::ClientError;
use crate::clock::Clock;
use crate::cluster::Cluster;
use crate::context::RunContext;
use crate::error::{CheckError, CheckResult};
use crate::metrics::MetricsSink;
use crate::retry::{DelayMode, PollOutcome, RetryOutcome, RetryPolicy};
use crate::streams::pseudo_generators;

const MIN_NODES_REQUIRED: usize = 3;
const MAX_POLL_ATTEMPTS: u32 = 10;
const PRESENCE_POLL_WAIT: Duration = Duration::from_millis(100);
const RECOVERY_POLL_WAIT: Duration = Duration::from_secs(1);

/// Options for [`RecoveryCheck`], validated at construction.
#[derive(Debug, Clone)]
pub struct RecoveryOptions {
    /// How many chunks to push through the recovery path.
    pub chunk_count: usize,
    /// Size of each generated chunk, in bytes.
    pub chunk_size: usize,
    /// Funding batch amount for the initial upload.
    pub postage_amount: u64,
    /// Funding batch depth.
    pub postage_depth: u8,
    /// Per-unit batch price, forwarded verbatim when present.
    pub postage_price: Option<String>,
    /// Label attached to created batches.
    pub batch_label: String,
}

impl Default for RecoveryOptions {
    fn default() -> Self {
        Self {
            chunk_count: 1,
            chunk_size: 4096,
            postage_amount: 1_000_000,
            postage_depth: 17,
            postage_price: None,
            batch_label: "recovery".to_string(),
        }
    }
}

/// The recovery-after-loss protocol.
pub struct RecoveryCheck {
    options: RecoveryOptions,
    metrics: Rc<dyn MetricsSink>,
}

impl RecoveryCheck {
    /// Create a check, validating the options.
    pub fn new(options: RecoveryOptions, metrics: Rc<dyn MetricsSink>) -> CheckResult<Self> {
        if options.chunk_count == 0 {
            return Err(CheckError::Configuration {
                reason: "chunk_count must be positive".to_string(),
            });
        }
        if options.chunk_size == 0 {
            return Err(CheckError::Configuration {
                reason: "chunk_size must be positive".to_string(),
            });
        }
        Ok(Self { options, metrics })
    }

    /// Run the check to completion. Any integrity mismatch, exhausted
    /// poll, or unexpected trigger response aborts the run; cancellation
    /// returns `Ok(())`.
    pub async fn run<C: Clock>(&self, ctx: &RunContext<C>, cluster: &Cluster) -> CheckResult<()> {
        if cluster.size() < MIN_NODES_REQUIRED {
            return Err(CheckError::InsufficientTopology {
                required: MIN_NODES_REQUIRED,
                available: cluster.size(),
            });
        }

        let clock = ctx.clock().clone();
        let cancel = ctx.cancellation().clone();
        let mut rngs = pseudo_generators(ctx.seed(), self.options.chunk_count);

        tracing::info!(seed = ctx.seed(), chunks = self.options.chunk_count, "starting recovery check");

        for index in 0..self.options.chunk_count {
            if ctx.finished() {
                return Ok(());
            }
            let topology = cluster.snapshot().await?;

            let (a_id, a_addr, c_id) = {
                let ((a_id, a_addr), (c_id, _)) = topology.farthest_pair()?;
                (a_id.clone(), a_addr.clone(), c_id.clone())
            };

            // B is where the network should place a fresh chunk. A draw
            // landing on A or C would conflate the roles, so the chunk is
            // regenerated until B is a third node.
            let (b_id, chunk) = loop {
                if ctx.is_cancelled() {
                    return Ok(());
                }
                let chunk = Chunk::random(&mut rngs[index], self.options.chunk_size);
                let (closest_id, _) = topology.closest(chunk.address(), &BTreeSet::new())?;
                if closest_id != &a_id && closest_id != &c_id {
                    break (closest_id.clone(), chunk);
                }
            };
            tracing::info!(
                a = %a_id,
                b = %b_id,
                c = %c_id,
                chunk = %chunk.address(),
                "roles selected"
            );

            let node_a = cluster.client(&a_id).ok_or_else(|| CheckError::UnknownNode {
                node: a_id.clone(),
            })?;
            let node_b = cluster.client(&b_id).ok_or_else(|| CheckError::UnknownNode {
                node: b_id.clone(),
            })?;
            let node_c = cluster.client(&c_id).ok_or_else(|| CheckError::UnknownNode {
                node: c_id.clone(),
            })?;

            let batch = node_a
                .create_batch(
                    self.options.postage_amount,
                    self.options.postage_depth,
                    self.options.postage_price.as_deref(),
                    &self.options.batch_label,
                )
                .await
                .map_err(|source| CheckError::Client {
                    node: a_id.clone(),
                    source,
                })?;
            tracing::info!(node = %a_id, batch = %batch, "created batch");

            let reference = node_a
                .upload_chunk(chunk.data().clone(), Some(&batch), false)
                .await
                .map_err(|source| CheckError::Client {
                    node: a_id.clone(),
                    source,
                })?;

            // The chunk has to reach its neighborhood before the loss can
            // be staged.
            let presence =
                RetryPolicy::new(MAX_POLL_ATTEMPTS, PRESENCE_POLL_WAIT, DelayMode::AfterFailure);
            let probe = {
                let client = Rc::clone(node_b);
                let address = reference.clone();
                let node = b_id.clone();
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
            match presence.poll_until(&clock, &cancel, probe).await {
                PollOutcome::Satisfied { .. } => {}
                PollOutcome::Cancelled => return Ok(()),
                PollOutcome::Exhausted { attempts } => {
                    return Err(CheckError::PollExhausted {
                        node: b_id,
                        condition: "chunk present on closest node",
                        attempts,
                    })
                }
            }

            let downloaded = node_c
                .download_chunk(&reference, None)
                .await
                .map_err(|source| CheckError::Client {
                    node: c_id.clone(),
                    source,
                })?;
            if downloaded != *chunk.data() {
                return Err(CheckError::Integrity {
                    node: c_id.clone(),
                    chunk: reference.clone(),
                });
            }

            // Remove the chunk from every node and confirm the removal.
            // A surviving copy on A would serve the trigger download
            // directly and mask the recovery path.
            for (node_id, client) in cluster.clients() {
                client
                    .remove_chunk(chunk.address())
                    .await
                    .map_err(|source| CheckError::Client {
                        node: node_id.clone(),
                        source,
                    })?;
                let still_present =
                    client
                        .has_chunk(chunk.address())
                        .await
                        .map_err(|source| CheckError::Client {
                            node: node_id.clone(),
                            source,
                        })?;
                if still_present {
                    return Err(CheckError::RemovalNotConfirmed {
                        node: node_id.clone(),
                        chunk: chunk.address().clone(),
                    });
                }
            }
            tracing::info!(chunk = %chunk.address(), "chunk removed from all nodes");

            // Ask C for the lost chunk, hinting at A's neighborhood. The
            // node either serves it immediately or acknowledges a pending
            // recovery; anything else means recovery never started.
            let hint: String = a_addr.to_string().chars().take(2).collect();
            match node_c.download_chunk(chunk.address(), Some(hint.as_str())).await {
                Ok(_) => {
                    tracing::debug!(chunk = %chunk.address(), "trigger download served immediately");
                }
                Err(ClientError::RecoveryPending(_)) => {
                    tracing::debug!(chunk = %chunk.address(), "recovery pending");
                }
                Err(source) => {
                    return Err(CheckError::RecoveryNotTriggered {
                        chunk: chunk.address().clone(),
                        source,
                    })
                }
            }

            // Restore the origin copy: upload to A again and pin it so
            // the recovery request finds something to deliver.
            let pinned = node_a
                .upload_chunk(chunk.data().clone(), None, false)
                .await
                .map_err(|source| CheckError::Client {
                    node: a_id.clone(),
                    source,
                })?;
            node_a
                .pin_root_hash(&pinned)
                .await
                .map_err(|source| CheckError::Client {
                    node: a_id.clone(),
                    source,
                })?;

            let recovery =
                RetryPolicy::new(MAX_POLL_ATTEMPTS, RECOVERY_POLL_WAIT, DelayMode::AfterFailure);
            let started = clock.now();
            let download_op = {
                let client = Rc::clone(node_c);
                let address = chunk.address().clone();
                move || {
                    let client = Rc::clone(&client);
                    let address = address.clone();
                    async move { client.download_chunk(&address, None).await }
                }
            };
            match recovery.execute(&clock, &cancel, download_op).await {
                RetryOutcome::Success { value, .. } => {
                    if value != *chunk.data() {
                        return Err(CheckError::Integrity {
                            node: c_id.clone(),
                            chunk: chunk.address().clone(),
                        });
                    }
                    let duration = clock.now() - started;
                    tracing::info!(
                        chunk = %chunk.address(),
                        duration = ?duration,
                        "chunk recovered"
                    );
                    let chunk_hex = chunk.address().to_string();
                    self.metrics
                        .incr_counter("recovered_chunks", &[("node", a_id.as_str())]);
                    self.metrics.set_gauge(
                        "recovery_duration_seconds",
                        &[("node", a_id.as_str()), ("chunk", chunk_hex.as_str())],
                        duration.as_secs_f64(),
                    );
                    self.metrics
                        .observe("recovery_duration_seconds", &[], duration.as_secs_f64());
                }
                RetryOutcome::Cancelled => return Ok(()),
                RetryOutcome::Exhausted { attempts, .. } => {
                    return Err(CheckError::PollExhausted {
                        node: c_id,
                        condition: "chunk recovered for download",
                        attempts,
                    })
                }
            }
        }

        Ok(())
    }
}
