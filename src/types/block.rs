/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the 'block' type and its methods.

use borsh::{BorshDeserialize, BorshSerialize};
pub use sha2::Sha256 as CryptoHasher;
use sha2::Digest;

use crate::types::basic::{BlockNumber, CryptoHash, Data};

/// A batch of exchange transactions positioned in the chain: the block's number, the hash of its
/// parent, and a commitment to its payload.
#[derive(Clone, BorshSerialize, BorshDeserialize)]
pub struct Block {
    pub number: BlockNumber,
    pub parent_hash: CryptoHash,
    pub data_hash: CryptoHash,
    pub data: Data,
}

impl Block {
    pub fn new(
        number: BlockNumber,
        parent_hash: CryptoHash,
        data_hash: CryptoHash,
        data: Data,
    ) -> Block {
        Block {
            number,
            parent_hash,
            data_hash,
            data,
        }
    }

    pub fn hash(
        number: BlockNumber,
        parent_hash: &CryptoHash,
        data_hash: &CryptoHash,
    ) -> CryptoHash {
        let mut hasher = CryptoHasher::new();
        hasher.update(&number.try_to_vec().unwrap());
        hasher.update(&parent_hash.try_to_vec().unwrap());
        hasher.update(&data_hash.try_to_vec().unwrap());
        CryptoHash::new(hasher.finalize().into())
    }
}

/// A block together with its header hash.
#[derive(Clone, BorshSerialize, BorshDeserialize)]
pub struct HashedBlock {
    pub block: Block,
    pub hash: CryptoHash,
}

impl HashedBlock {
    pub fn new(block: Block) -> HashedBlock {
        let hash = Block::hash(block.number, &block.parent_hash, &block.data_hash);
        HashedBlock { block, hash }
    }

    /// The block every replica starts from: number 0, the zero hash, no payload. It is a sentinel,
    /// never produced, validated or stored.
    pub fn genesis() -> HashedBlock {
        HashedBlock {
            block: Block::new(
                BlockNumber::new(0),
                CryptoHash::zero(),
                CryptoHash::zero(),
                Data::empty(),
            ),
            hash: CryptoHash::zero(),
        }
    }

    pub fn number(&self) -> BlockNumber {
        self.block.number
    }

    /// Checks if the hash is cryptographically correct.
    pub fn is_correct(&self) -> bool {
        self.hash == Block::hash(self.block.number, &self.block.parent_hash, &self.block.data_hash)
    }
}
