/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Concurrent fetching of missing ancestor blocks from peer replicas.
//!
//! When a replica receives a candidate block whose parent it does not know, it cannot vote until
//! the parent (and possibly further ancestors) arrive. The [`BlockFetchManager`] routes a fetch
//! request for the missing hash to a peer's [`ReplicaFetchQueue`], and carries the network events
//! that depend on the fetch, typically the deferred candidate itself, on a shared
//! [`RequestContext`]. When the block is delivered, the dependent events are released exactly
//! once, in the order they were queued, for the caller to re-enqueue.
//!
//! Requests for the same hash from different callers are coalesced onto one context, and a given
//! peer is never asked twice for the same hash. The manager tolerates redundant and late
//! deliveries: its environment (networking, Byzantine peers) is inherently noisy.

pub mod manager;

pub mod queue;

pub mod request;

pub use manager::BlockFetchManager;
pub use queue::ReplicaFetchQueue;
pub use request::RequestContext;

use crate::types::basic::{CryptoHash, ReplicaID};

/// The network seam for issuing block-fetch requests.
///
/// Each [`ReplicaFetchQueue`] hands its clone of the implementor to a background worker thread,
/// so calls may block on the wire without stalling consensus dispatch. Retries on network failure
/// are the implementor's concern; the manager keeps the request context alive until delivery
/// regardless.
pub trait FetchNetwork: Clone + Send + 'static {
    /// Ask `peer` for the block with the given hash.
    fn request_block(&mut self, peer: ReplicaID, hash: CryptoHash);
}
