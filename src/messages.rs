/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Messages that cross the boundary between the core and the consensus layer.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::basic::{BlockNumber, CryptoHash, ReplicaID};
use crate::types::block::HashedBlock;

/// A leader's proposal: the block it wants the replica set to vote on.
#[derive(Clone, BorshSerialize, BorshDeserialize)]
pub struct Proposal {
    pub block: HashedBlock,
}

/// A validator's declaration that a candidate block passed validation. Signing and quorum
/// aggregation happen in the consensus layer.
#[derive(Clone, Copy, BorshSerialize, BorshDeserialize)]
pub struct Vote {
    pub block_number: BlockNumber,
    pub block_hash: CryptoHash,
}

/// A consensus action deferred until a missing ancestor block arrives. The fetch manager carries
/// these on the request context and releases them, in order, on delivery.
#[derive(Clone, BorshSerialize, BorshDeserialize)]
pub enum NetworkEvent {
    Proposal {
        origin: ReplicaID,
        proposal: Proposal,
    },
    Vote {
        origin: ReplicaID,
        vote: Vote,
    },
}
