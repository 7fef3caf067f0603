/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::messages::NetworkEvent;
use crate::types::basic::{CryptoHash, ReplicaID};

/// Tracks one in-flight ancestor fetch.
///
/// The manager's hash index and every per-replica queue the request was dispatched to share
/// ownership of the context (behind an `Arc`); its identity is the requested hash. The dependent
/// event list is append-only before delivery and drained once after it; the manager's dispatch
/// thread serializes both.
pub struct RequestContext {
    requested_hash: CryptoHash,
    block_is_received: AtomicBool,
    dependent_network_events: Mutex<Vec<NetworkEvent>>,
    /// Bitset over replica ids this request has already been dispatched to.
    requested_from: Mutex<u64>,
}

impl RequestContext {
    pub(crate) fn new(requested_hash: CryptoHash) -> RequestContext {
        RequestContext {
            requested_hash,
            block_is_received: AtomicBool::new(false),
            dependent_network_events: Mutex::new(Vec::new()),
            requested_from: Mutex::new(0),
        }
    }

    pub fn requested_hash(&self) -> CryptoHash {
        self.requested_hash
    }

    /// Release-on-set: events appended before this store are visible to any thread that observes
    /// [`is_received`](Self::is_received) return true.
    pub fn mark_received(&self) {
        self.block_is_received.store(true, Ordering::Release)
    }

    pub fn is_received(&self) -> bool {
        self.block_is_received.load(Ordering::Acquire)
    }

    pub fn add_network_events(&self, events: Vec<NetworkEvent>) {
        self.dependent_network_events.lock().unwrap().extend(events)
    }

    pub(crate) fn take_network_events(&self) -> Vec<NetworkEvent> {
        std::mem::take(&mut *self.dependent_network_events.lock().unwrap())
    }

    pub fn was_requested_from(&self, id: ReplicaID) -> bool {
        *self.requested_from.lock().unwrap() & Self::bit(id) != 0
    }

    pub fn mark_requested_from(&self, id: ReplicaID) {
        *self.requested_from.lock().unwrap() |= Self::bit(id)
    }

    // Replica ids index a 64-bit dispatch mask; replica sets are far smaller than that.
    fn bit(id: ReplicaID) -> u64 {
        1u64 << (id.int() & 63)
    }
}
