//! Storage node client contract.
//!
//! The verification engine never talks HTTP itself; it drives a
//! [`NodeClient`] per node and verifies the observable outcomes. Adapters
//! over a concrete node API implement this trait; tests implement it with
//! in-memory fakes.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::Address;

/// Opaque identifier of a funding batch.
///
/// A batch is a pre-paid allowance letting a node store data on other
/// nodes' behalf; the engine only passes it through to uploads.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(String);

impl BatchId {
    /// Wrap a batch identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors surfaced by a [`NodeClient`].
///
/// `RecoveryPending` is part of the protocol signal set, not transport
/// noise: a download that triggered recovery reports it explicitly so
/// callers never have to inspect error text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The node does not have the requested chunk.
    #[error("chunk {0} not found")]
    NotFound(Address),
    /// The node accepted a recovery request for the chunk but cannot
    /// serve the bytes yet.
    #[error("recovery pending for chunk {0}: try again later")]
    RecoveryPending(Address),
    /// Transport-level failure: connection, timeout, unexpected status.
    #[error("transport: {0}")]
    Transport(String),
    /// The node rejected a funding batch operation.
    #[error("batch: {0}")]
    Batch(String),
}

/// Client handle for a single storage node.
///
/// All methods are fallible and asynchronous; the engine wraps them in
/// bounded retries and polls, so implementations should not retry
/// internally.
#[async_trait(?Send)]
pub trait NodeClient {
    /// The node's overlay address in the XOR address space.
    async fn overlay_address(&self) -> Result<Address, ClientError>;

    /// Create, or reuse, a funding batch usable for uploads through this
    /// node. `price` is the per-unit price the caller is willing to pay,
    /// forwarded verbatim when present.
    async fn create_batch(
        &self,
        amount: u64,
        depth: u8,
        price: Option<&str>,
        label: &str,
    ) -> Result<BatchId, ClientError>;

    /// Upload a chunk, returning the address the node derived for it.
    async fn upload_chunk(
        &self,
        data: Bytes,
        batch: Option<&BatchId>,
        pin: bool,
    ) -> Result<Address, ClientError>;

    /// Whether the chunk is present in the node's local store.
    async fn has_chunk(&self, address: &Address) -> Result<bool, ClientError>;

    /// Download a chunk. `origin_hint` is an overlay prefix of the
    /// original uploader; when the chunk is missing locally it lets the
    /// node direct a recovery request toward that neighborhood.
    async fn download_chunk(
        &self,
        address: &Address,
        origin_hint: Option<&str>,
    ) -> Result<Bytes, ClientError>;

    /// Remove the chunk from the node's local store.
    async fn remove_chunk(&self, address: &Address) -> Result<(), ClientError>;

    /// Pin the chunk root so local garbage collection keeps it.
    async fn pin_root_hash(&self, address: &Address) -> Result<(), ClientError>;
}
