/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{ReplicaInfo, ReplicaSetConfig};
use crate::messages::NetworkEvent;
use crate::types::basic::{CryptoHash, ReplicaID};
use crate::types::block::HashedBlock;

use super::queue::ReplicaFetchQueue;
use super::request::RequestContext;
use super::FetchNetwork;

/// Routes fetch requests for missing ancestor blocks to peer replicas, coalescing requests for
/// the same hash onto a single [`RequestContext`].
///
/// `outstanding_reqs` is the canonical home of each context: an entry is erased exactly once, on
/// delivery. Per-replica queues hold shared references and garbage-collect completed contexts
/// lazily. All mutation happens on the consensus dispatch thread.
pub struct BlockFetchManager<N: FetchNetwork> {
    queues: HashMap<ReplicaID, ReplicaFetchQueue>,
    outstanding_reqs: HashMap<CryptoHash, Arc<RequestContext>>,
    replica_set: ReplicaSetConfig,
    network: N,
}

impl<N: FetchNetwork> BlockFetchManager<N> {
    pub fn new(replica_set: ReplicaSetConfig, network: N) -> BlockFetchManager<N> {
        BlockFetchManager {
            queues: HashMap::new(),
            outstanding_reqs: HashMap::new(),
            replica_set,
            network,
        }
    }

    /// Create the fetch queue for a peer. The caller is responsible for not registering the same
    /// peer twice.
    pub fn add_replica(&mut self, info: &ReplicaInfo) {
        self.queues
            .insert(info.id, ReplicaFetchQueue::new(info, self.network.clone()));
    }

    /// Request `requested_block` from `request_target`, queueing `dependent_events` for release
    /// when the block arrives.
    ///
    /// Requests towards targets outside the configured replica set are dropped. If the hash is
    /// already being fetched, the events are appended to the existing context, and the target is
    /// asked only if it has not been asked before.
    pub fn add_fetch_request(
        &mut self,
        requested_block: CryptoHash,
        request_target: ReplicaID,
        dependent_events: Vec<NetworkEvent>,
    ) {
        if !self.replica_set.is_valid_replica(request_target) {
            log::warn!(
                "dropping fetch request targeted at unknown replica {}",
                request_target
            );
            return;
        }

        let ctx = self
            .outstanding_reqs
            .entry(requested_block)
            .or_insert_with(|| Arc::new(RequestContext::new(requested_block)))
            .clone();

        if !ctx.was_requested_from(request_target) {
            ctx.mark_requested_from(request_target);
            self.queues
                .get(&request_target)
                .expect("Programming error: valid replica has no fetch queue.")
                .add_request(ctx.clone());
        }

        ctx.add_network_events(dependent_events);
    }

    /// Hand a fetched block to the manager. Returns the dependent events released by the
    /// delivery, in the order they were queued, for the caller to re-enqueue.
    ///
    /// A delivery for a hash with no pending request (unknown, or already delivered) is a logged
    /// no-op.
    pub fn deliver_block(&mut self, block: &HashedBlock) -> Vec<NetworkEvent> {
        let ctx = match self.outstanding_reqs.get(&block.hash) {
            Some(ctx) => ctx.clone(),
            None => {
                log::info!("received block with no pending request");
                return Vec::new();
            }
        };

        ctx.mark_received();
        self.outstanding_reqs.remove(&block.hash);
        ctx.take_network_events()
    }

    /// Number of hashes currently being fetched.
    pub fn num_outstanding(&self) -> usize {
        self.outstanding_reqs.len()
    }

    /// Number of contexts referenced by a peer's queue, completed-but-uncollected ones included.
    pub fn queued_requests(&self, replica: ReplicaID) -> Option<usize> {
        self.queues.get(&replica).map(|queue| queue.num_outstanding())
    }
}
