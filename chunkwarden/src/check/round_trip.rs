//! Round-trip integrity check.
//!
//! Each iteration uploads freshly generated content through one node and
//! downloads it back through another, comparing bytes. Single failures
//! are diagnostic signal, not abort conditions: an exhausted retry or a
//! byte mismatch is logged and counted, and the loop moves on to the next
//! iteration until the run deadline elapses. The run self-heals by
//! retrying over many iterations.

use std::rc::Rc;
use std::time::Duration;

use bytes::Bytes;
use rand::seq::SliceRandom;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::client::ClientError;
use crate::clock::Clock;
use crate::cluster::Cluster;
use crate::context::RunContext;
use crate::error::{CheckError, CheckResult};
use crate::metrics::MetricsSink;
use crate::retry::{sleep_cancellable, DelayMode, RetryOutcome, RetryPolicy};
use crate::streams::pseudo_generator;
use crate::topology::NodeId;

/// Options for [`RoundTripCheck`], validated at construction.
#[derive(Debug, Clone)]
pub struct RoundTripOptions {
    /// Size of the generated payload per iteration, in bytes.
    pub content_size: usize,
    /// Funding batch amount for uploads.
    pub postage_amount: u64,
    /// Funding batch depth.
    pub postage_depth: u8,
    /// Per-unit batch price, forwarded verbatim when present.
    pub postage_price: Option<String>,
    /// Label attached to created batches.
    pub batch_label: String,
    /// Wait after a failed upload attempt.
    pub tx_on_err_wait: Duration,
    /// Wait before every download attempt, to allow propagation.
    pub rx_on_err_wait: Duration,
    /// Wait between upload and first download.
    pub nodes_sync_wait: Duration,
}

impl Default for RoundTripOptions {
    fn default() -> Self {
        Self {
            content_size: 5_000_000,
            postage_amount: 1_000_000,
            postage_depth: 20,
            postage_price: None,
            batch_label: "round-trip".to_string(),
            tx_on_err_wait: Duration::from_secs(10),
            rx_on_err_wait: Duration::from_secs(10),
            nodes_sync_wait: Duration::from_secs(60),
        }
    }
}

/// Outcome of a single round-trip iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundTripOutcome {
    /// Downloaded bytes matched the uploaded bytes.
    Success,
    /// Upload retries were exhausted; the iteration was skipped.
    UploadFailed,
    /// Download retries were exhausted; the iteration was skipped.
    DownloadFailed,
    /// Downloaded length differs from uploaded length.
    LengthMismatch {
        /// Uploaded payload length.
        uploaded: usize,
        /// Downloaded payload length.
        downloaded: usize,
    },
    /// Same length, differing content.
    DataMismatch {
        /// Number of differing bytes.
        differing: usize,
        /// Total payload length.
        total: usize,
    },
}

impl RoundTripOutcome {
    /// Differing bytes as a percentage of the payload, for
    /// [`DataMismatch`](RoundTripOutcome::DataMismatch) outcomes.
    pub fn mismatch_percent(&self) -> Option<f64> {
        match self {
            RoundTripOutcome::DataMismatch { differing, total } if *total > 0 => {
                Some(*differing as f64 / *total as f64 * 100.0)
            }
            _ => None,
        }
    }
}

/// Write-once record of one iteration, kept for the embedder and mirrored
/// into the metrics sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundTripRecord {
    /// Iteration number, starting at zero.
    pub iteration: u64,
    /// Node the payload was uploaded through.
    pub uploader: NodeId,
    /// Node the payload was downloaded through.
    pub downloader: NodeId,
    /// Duration of the successful upload attempt, if any.
    pub upload_duration: Option<Duration>,
    /// Duration of the successful download attempt, if any.
    pub download_duration: Option<Duration>,
    /// What the iteration concluded.
    pub outcome: RoundTripOutcome,
}

/// The round-trip integrity protocol.
pub struct RoundTripCheck {
    options: RoundTripOptions,
    metrics: Rc<dyn MetricsSink>,
    records: Vec<RoundTripRecord>,
}

impl RoundTripCheck {
    /// Create a check, validating the options.
    pub fn new(options: RoundTripOptions, metrics: Rc<dyn MetricsSink>) -> CheckResult<Self> {
        if options.content_size == 0 {
            return Err(CheckError::Configuration {
                reason: "content_size must be positive".to_string(),
            });
        }
        Ok(Self {
            options,
            metrics,
            records: Vec::new(),
        })
    }

    /// Records of all completed iterations, in order.
    pub fn records(&self) -> &[RoundTripRecord] {
        &self.records
    }

    /// Run iterations until the deadline elapses, the iteration limit is
    /// reached, or the run is cancelled. Never fails on a single bad
    /// iteration; only configuration and topology problems are fatal.
    pub async fn run<C: Clock>(
        &mut self,
        ctx: &RunContext<C>,
        cluster: &Cluster,
    ) -> CheckResult<()> {
        if cluster.size() < 2 {
            return Err(CheckError::InsufficientTopology {
                required: 2,
                available: cluster.size(),
            });
        }

        let clock = ctx.clock().clone();
        let cancel = ctx.cancellation().clone();
        let node_ids = cluster.node_ids();
        let mut rng = pseudo_generator(ctx.seed());

        tracing::info!(
            seed = ctx.seed(),
            content_size = self.options.content_size,
            "starting round-trip check"
        );

        let upload_retry = RetryPolicy::new(3, self.options.tx_on_err_wait, DelayMode::AfterFailure);
        let download_retry =
            RetryPolicy::new(3, self.options.rx_on_err_wait, DelayMode::BeforeAttempt);

        let mut iteration: u64 = 0;
        while !ctx.finished() && ctx.allows_iteration(iteration) {
            let current = iteration;
            iteration += 1;
            tracing::info!(iteration = current, "starting iteration");

            let mut indices: Vec<usize> = (0..node_ids.len()).collect();
            indices.shuffle(&mut rng);
            let (tx_idx, rx_idx) = (indices[0], indices[1]);
            if tx_idx == rx_idx {
                // Same node drawn for both roles: redraw on the next
                // iteration, not counted as a failure.
                continue;
            }
            let uploader_id = node_ids[tx_idx].clone();
            let downloader_id = node_ids[rx_idx].clone();
            tracing::info!(uploader = %uploader_id, downloader = %downloader_id, "roles selected");

            let mut payload = vec![0u8; self.options.content_size];
            rng.fill_bytes(&mut payload);
            let payload = Bytes::from(payload);

            let uploader =
                cluster
                    .client(&uploader_id)
                    .ok_or_else(|| CheckError::UnknownNode {
                        node: uploader_id.clone(),
                    })?;

            let upload_op = {
                let client = Rc::clone(uploader);
                let clock = clock.clone();
                let payload = payload.clone();
                let amount = self.options.postage_amount;
                let depth = self.options.postage_depth;
                let price = self.options.postage_price.clone();
                let label = self.options.batch_label.clone();
                move || {
                    let client = Rc::clone(&client);
                    let clock = clock.clone();
                    let payload = payload.clone();
                    let price = price.clone();
                    let label = label.clone();
                    async move {
                        let batch = client
                            .create_batch(amount, depth, price.as_deref(), &label)
                            .await?;
                        let started = clock.now();
                        let address = client.upload_chunk(payload, Some(&batch), false).await?;
                        Ok::<_, ClientError>((address, clock.now() - started))
                    }
                }
            };

            let uploader_label = [("node", uploader_id.as_str())];
            let (address, tx_duration, tx_attempts) =
                match upload_retry.execute(&clock, &cancel, upload_op).await {
                    RetryOutcome::Success {
                        value: (address, duration),
                        attempts,
                    } => (address, duration, attempts),
                    RetryOutcome::Cancelled => return Ok(()),
                    RetryOutcome::Exhausted {
                        last_error,
                        attempts,
                    } => {
                        self.metrics
                            .incr_counter_by("upload_attempts", &uploader_label, attempts.into());
                        self.metrics
                            .incr_counter_by("upload_errors", &uploader_label, attempts.into());
                        tracing::warn!(
                            node = %uploader_id,
                            attempts,
                            error = %last_error,
                            "upload failed, skipping iteration"
                        );
                        self.records.push(RoundTripRecord {
                            iteration: current,
                            uploader: uploader_id.clone(),
                            downloader: downloader_id.clone(),
                            upload_duration: None,
                            download_duration: None,
                            outcome: RoundTripOutcome::UploadFailed,
                        });
                        continue;
                    }
                };
            self.metrics
                .incr_counter_by("upload_attempts", &uploader_label, tx_attempts.into());
            self.metrics.incr_counter_by(
                "upload_errors",
                &uploader_label,
                u64::from(tx_attempts - 1),
            );
            self.metrics.observe(
                "upload_duration_seconds",
                &uploader_label,
                tx_duration.as_secs_f64(),
            );
            tracing::info!(node = %uploader_id, address = %address, duration = ?tx_duration, "upload done");

            // Give the network time to move the chunk toward its
            // neighborhood before asking another node for it.
            if sleep_cancellable(&clock, &cancel, self.options.nodes_sync_wait).await {
                return Ok(());
            }

            let downloader =
                cluster
                    .client(&downloader_id)
                    .ok_or_else(|| CheckError::UnknownNode {
                        node: downloader_id.clone(),
                    })?;

            let download_op = {
                let client = Rc::clone(downloader);
                let clock = clock.clone();
                let address = address.clone();
                move || {
                    let client = Rc::clone(&client);
                    let clock = clock.clone();
                    let address = address.clone();
                    async move {
                        let started = clock.now();
                        let data = client.download_chunk(&address, None).await?;
                        Ok::<_, ClientError>((data, clock.now() - started))
                    }
                }
            };

            let downloader_label = [("node", downloader_id.as_str())];
            match download_retry.execute(&clock, &cancel, download_op).await {
                RetryOutcome::Success {
                    value: (data, rx_duration),
                    attempts,
                } => {
                    self.metrics.incr_counter_by(
                        "download_attempts",
                        &downloader_label,
                        attempts.into(),
                    );
                    self.metrics.incr_counter_by(
                        "download_errors",
                        &downloader_label,
                        u64::from(attempts - 1),
                    );
                    let outcome = if data == payload {
                        self.metrics.observe(
                            "download_duration_seconds",
                            &downloader_label,
                            rx_duration.as_secs_f64(),
                        );
                        tracing::info!(node = %downloader_id, duration = ?rx_duration, "download done");
                        RoundTripOutcome::Success
                    } else {
                        self.metrics
                            .incr_counter("download_mismatch", &downloader_label);
                        diagnose_mismatch(&payload, &data)
                    };
                    self.records.push(RoundTripRecord {
                        iteration: current,
                        uploader: uploader_id.clone(),
                        downloader: downloader_id.clone(),
                        upload_duration: Some(tx_duration),
                        download_duration: Some(rx_duration),
                        outcome,
                    });
                }
                RetryOutcome::Cancelled => return Ok(()),
                RetryOutcome::Exhausted {
                    last_error,
                    attempts,
                } => {
                    self.metrics.incr_counter_by(
                        "download_attempts",
                        &downloader_label,
                        attempts.into(),
                    );
                    self.metrics.incr_counter_by(
                        "download_errors",
                        &downloader_label,
                        attempts.into(),
                    );
                    tracing::warn!(
                        node = %downloader_id,
                        attempts,
                        error = %last_error,
                        "download failed, skipping iteration"
                    );
                    self.records.push(RoundTripRecord {
                        iteration: current,
                        uploader: uploader_id.clone(),
                        downloader: downloader_id.clone(),
                        upload_duration: Some(tx_duration),
                        download_duration: None,
                        outcome: RoundTripOutcome::DownloadFailed,
                    });
                }
            }
        }

        Ok(())
    }
}

/// Classify a payload mismatch and log the diagnostic detail.
fn diagnose_mismatch(uploaded: &Bytes, downloaded: &Bytes) -> RoundTripOutcome {
    let tx_len = uploaded.len();
    let rx_len = downloaded.len();
    if rx_len != tx_len {
        tracing::warn!(rx_len, tx_len, "length mismatch between download and upload");
        if tx_len < rx_len {
            tracing::warn!("length mismatch: downloaded payload is longer than uploaded");
        }
        return RoundTripOutcome::LengthMismatch {
            uploaded: tx_len,
            downloaded: rx_len,
        };
    }
    let differing = uploaded
        .iter()
        .zip(downloaded.iter())
        .filter(|(a, b)| a != b)
        .count();
    let percent = differing as f64 / tx_len as f64 * 100.0;
    tracing::warn!(differing, percent = %format!("{percent:.2}"), "data mismatch");
    RoundTripOutcome::DataMismatch {
        differing,
        total: tx_len,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnose_single_flipped_bit() {
        let uploaded = Bytes::from(vec![0u8; 16]);
        let mut corrupted = vec![0u8; 16];
        corrupted[5] ^= 0x01;
        let downloaded = Bytes::from(corrupted);

        let outcome = diagnose_mismatch(&uploaded, &downloaded);
        assert_eq!(
            outcome,
            RoundTripOutcome::DataMismatch {
                differing: 1,
                total: 16
            }
        );
        let percent = outcome.mismatch_percent().expect("data mismatch");
        assert!((percent - 6.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_diagnose_length_mismatch() {
        let uploaded = Bytes::from(vec![0u8; 8]);
        let downloaded = Bytes::from(vec![0u8; 10]);

        let outcome = diagnose_mismatch(&uploaded, &downloaded);
        assert_eq!(
            outcome,
            RoundTripOutcome::LengthMismatch {
                uploaded: 8,
                downloaded: 10
            }
        );
        assert_eq!(outcome.mismatch_percent(), None);
    }

    #[test]
    fn test_options_validated() {
        let options = RoundTripOptions {
            content_size: 0,
            ..RoundTripOptions::default()
        };
        let result = RoundTripCheck::new(options, Rc::new(crate::metrics::NullMetricsSink));
        assert!(matches!(result, Err(CheckError::Configuration { .. })));
    }
}
