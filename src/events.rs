/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Notifications that are emitted when significant things happen in the local replica.
//!
//! Each significant occurence corresponds to a variant of the [event enum](Event), whose inner
//! struct stores a summary of the occurence, always including a timestamp taken when it
//! completed. Events are published over a channel to the [event bus](crate::event_bus) thread,
//! which calls the registered handlers; the default handlers log each event as a CSV line (see
//! [crate::logging]).

use std::sync::mpsc::Sender;
use std::time::SystemTime;

use crate::types::basic::{BlockNumber, CryptoHash, ReplicaID};

/// Enumerates all events defined for the replica core.
pub enum Event {
    // Events that change replica state.
    ProduceBlock(ProduceBlockEvent),
    CommitBlock(CommitBlockEvent),
    PersistHeaders(PersistHeadersEvent),
    Rewind(RewindEvent),

    // Progress events.
    ReceiveProposal(ReceiveProposalEvent),
    Vote(VoteEvent),

    // Block fetch events.
    StartFetch(StartFetchEvent),
    DeliverBlock(DeliverBlockEvent),
}

impl Event {
    /// Publishes this event on the event publisher channel (if the channel is defined).
    pub fn publish(self, event_publisher: &Option<Sender<Event>>) {
        if let Some(event_publisher) = event_publisher {
            let _ = event_publisher.send(self);
        }
    }
}

/// A new block was produced on a proposer turn and its parent's hash recorded in the header-hash
/// map.
pub struct ProduceBlockEvent {
    pub timestamp: SystemTime,
    pub number: BlockNumber,
    pub hash: CryptoHash,
}

/// A block was durably committed: the engine applied it and the header-hash map finalized it.
pub struct CommitBlockEvent {
    pub timestamp: SystemTime,
    pub number: BlockNumber,
    pub hash: CryptoHash,
}

/// The header-hash map was flushed to the durable store up to (but excluding) `round`.
pub struct PersistHeadersEvent {
    pub timestamp: SystemTime,
    pub round: u64,
}

/// The replica rewound to a committed round after a consensus rollback notification.
pub struct RewindEvent {
    pub timestamp: SystemTime,
    pub committed_round: BlockNumber,
}

/// A candidate block arrived from a leader.
pub struct ReceiveProposalEvent {
    pub timestamp: SystemTime,
    pub origin: ReplicaID,
    pub number: BlockNumber,
    pub hash: CryptoHash,
}

/// This replica decided to vote for a candidate block.
pub struct VoteEvent {
    pub timestamp: SystemTime,
    pub number: BlockNumber,
    pub hash: CryptoHash,
}

/// A fetch for a missing ancestor block was dispatched to a peer.
pub struct StartFetchEvent {
    pub timestamp: SystemTime,
    pub hash: CryptoHash,
    pub target: ReplicaID,
}

/// A fetched block arrived and its dependent network events were released.
pub struct DeliverBlockEvent {
    pub timestamp: SystemTime,
    pub hash: CryptoHash,
    pub released_events: usize,
}
