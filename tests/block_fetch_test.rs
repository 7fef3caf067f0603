/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Tests for the block fetch manager: request coalescing, exactly-once release of dependent
//! events, per-replica dispatch deduplication, and tolerance of redundant deliveries.

mod common;

use std::time::Duration;

use common::harness::{replica_set, test_hash, wait_until, RecordingNetwork};

use dex_replica_rs::block_fetch::BlockFetchManager;
use dex_replica_rs::messages::{NetworkEvent, Vote};
use dex_replica_rs::types::basic::{BlockNumber, CryptoHash, Data, ReplicaID};
use dex_replica_rs::types::block::{Block, HashedBlock};

/// A block carrying an arbitrary hash, for exercising delivery.
fn block_with_hash(hash: CryptoHash) -> HashedBlock {
    HashedBlock {
        block: Block::new(
            BlockNumber::new(1),
            CryptoHash::zero(),
            CryptoHash::zero(),
            Data::empty(),
        ),
        hash,
    }
}

/// A dependent event tagged with a number so tests can check release order.
fn tagged_event(tag: u64) -> NetworkEvent {
    NetworkEvent::Vote {
        origin: ReplicaID::new(0),
        vote: Vote {
            block_number: BlockNumber::new(tag),
            block_hash: CryptoHash::zero(),
        },
    }
}

fn tag_of(event: &NetworkEvent) -> u64 {
    match event {
        NetworkEvent::Vote { vote, .. } => vote.block_number.int(),
        NetworkEvent::Proposal { proposal, .. } => proposal.block.number().int(),
    }
}

fn manager(peers: &[u64]) -> (BlockFetchManager<RecordingNetwork>, RecordingNetwork) {
    let network = RecordingNetwork::new();
    let replica_set = replica_set(peers, 0);
    let mut manager = BlockFetchManager::new(replica_set.clone(), network.clone());
    for info in replica_set.iter() {
        if info.id != replica_set.self_id() {
            manager.add_replica(info);
        }
    }
    (manager, network)
}

#[test]
fn coalesced_requests_release_events_in_order() {
    let (mut manager, _network) = manager(&[0, 5, 7]);
    let requested = test_hash(0x42);

    manager.add_fetch_request(requested, ReplicaID::new(5), vec![tagged_event(1)]);
    manager.add_fetch_request(requested, ReplicaID::new(5), vec![tagged_event(2)]);
    manager.add_fetch_request(requested, ReplicaID::new(7), vec![tagged_event(3)]);
    assert_eq!(manager.num_outstanding(), 1);

    let released = manager.deliver_block(&block_with_hash(requested));
    let tags: Vec<u64> = released.iter().map(tag_of).collect();
    assert_eq!(tags, vec![1, 2, 3]);

    // A second delivery of the same hash is a no-op.
    let released_again = manager.deliver_block(&block_with_hash(requested));
    assert!(released_again.is_empty());
    assert_eq!(manager.num_outstanding(), 0);
}

#[test]
fn a_peer_is_never_asked_twice_for_the_same_hash() {
    let (mut manager, network) = manager(&[0, 5, 7]);
    let requested = test_hash(0x42);

    manager.add_fetch_request(requested, ReplicaID::new(5), vec![tagged_event(1)]);
    manager.add_fetch_request(requested, ReplicaID::new(5), vec![tagged_event(2)]);
    manager.add_fetch_request(requested, ReplicaID::new(7), vec![tagged_event(3)]);

    // One wire request per (hash, replica) pair, issued by the background workers.
    wait_until(Duration::from_secs(5), || network.num_requests() == 2);
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(network.num_requests(), 2);

    let peers: Vec<u64> = network
        .requests
        .lock()
        .unwrap()
        .iter()
        .map(|(peer, _)| peer.int())
        .collect();
    assert!(peers.contains(&5));
    assert!(peers.contains(&7));
}

#[test]
fn distinct_hashes_are_independent() {
    let (mut manager, _network) = manager(&[0, 5]);
    let first = test_hash(0x01);
    let second = test_hash(0x02);

    manager.add_fetch_request(first, ReplicaID::new(5), vec![tagged_event(1)]);
    manager.add_fetch_request(second, ReplicaID::new(5), vec![tagged_event(2)]);
    assert_eq!(manager.num_outstanding(), 2);

    let released = manager.deliver_block(&block_with_hash(second));
    assert_eq!(released.iter().map(tag_of).collect::<Vec<u64>>(), vec![2]);
    assert_eq!(manager.num_outstanding(), 1);

    let released = manager.deliver_block(&block_with_hash(first));
    assert_eq!(released.iter().map(tag_of).collect::<Vec<u64>>(), vec![1]);
}

#[test]
fn delivery_without_a_pending_request_is_ignored() {
    let (mut manager, _network) = manager(&[0, 5]);

    let released = manager.deliver_block(&block_with_hash(test_hash(0x99)));
    assert!(released.is_empty());
}

#[test]
fn requests_to_unknown_replicas_are_dropped() {
    let (mut manager, network) = manager(&[0, 5]);
    let requested = test_hash(0x42);

    manager.add_fetch_request(requested, ReplicaID::new(9), vec![tagged_event(1)]);

    assert_eq!(manager.num_outstanding(), 0);
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(network.num_requests(), 0);

    // No context was created, so a delivery for the hash releases nothing.
    let released = manager.deliver_block(&block_with_hash(requested));
    assert!(released.is_empty());
}

#[test]
fn a_request_renewed_after_delivery_gets_a_fresh_context() {
    let (mut manager, _network) = manager(&[0, 5]);
    let requested = test_hash(0x42);

    manager.add_fetch_request(requested, ReplicaID::new(5), vec![tagged_event(1)]);
    let released = manager.deliver_block(&block_with_hash(requested));
    assert_eq!(released.len(), 1);

    // The old context is gone; a new request for the same hash starts over.
    manager.add_fetch_request(requested, ReplicaID::new(5), vec![tagged_event(2)]);
    let released = manager.deliver_block(&block_with_hash(requested));
    assert_eq!(released.iter().map(tag_of).collect::<Vec<u64>>(), vec![2]);
}

#[test]
fn queues_collect_completed_contexts_lazily() {
    let (mut manager, _network) = manager(&[0, 5]);
    let target = ReplicaID::new(5);

    // Interleave requests and deliveries so completed contexts pile up in the queue until the GC
    // walk splices them out.
    for i in 0..150u64 {
        let mut bytes = [0u8; 32];
        bytes[..8].copy_from_slice(&i.to_be_bytes());
        let unique = CryptoHash::new(bytes);
        manager.add_fetch_request(unique, target, vec![tagged_event(i)]);
        manager.deliver_block(&block_with_hash(unique));
    }

    assert_eq!(manager.num_outstanding(), 0);
    // Everything delivered, so the GC walk keeps the queue bounded well below the number of
    // requests it saw.
    assert!(manager.queued_requests(target).unwrap() < 150);
}
