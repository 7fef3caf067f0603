/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Byte-prefixes that specify where the header-hash map's state lives in the durable ordered
//! store.
//!
//! # Storage layout
//!
//! The store holds two namespaces, each behind a constant one-byte prefix:
//!
//! 1. [`HEADER_HASHES`]: the mapping from block number to block-header hash. Each entry's key is
//!    the prefix followed by the block number as 8 big-endian bytes; the value is the raw 32-byte
//!    hash. Keys are contiguous starting from 1 and strictly below the persisted round counter.
//! 2. [`PERSISTED_ROUND`]: a single 8-byte big-endian counter naming the first round *not yet*
//!    persisted. It is updated atomically with the data puts of each commit.
//!
//! Big-endian keys make the store's lexicographic iteration order coincide with numeric block
//! order, which is what [`load`](super::header_map::BlockHeaderHashMap::load) relies on.

/// Name of the database directory holding the header-hash store.
pub const HEADER_HASH_DB: &str = "header_hash_lmdb";

// Namespaces
pub const HEADER_HASHES: [u8; 1] = [0];
pub const PERSISTED_ROUND: [u8; 1] = [1];

/// Length of a data-namespace key (after the namespace prefix).
pub const KEY_LEN: usize = 8;

/// Length of a stored block-header hash.
pub const VALUE_LEN: usize = 32;

/// Form the data-namespace key for a block number.
pub fn block_number_key(block_number: u64) -> [u8; KEY_LEN] {
    block_number.to_be_bytes()
}

/// Parse a data-namespace key back into a block number. Returns `None` if the key has the wrong
/// length.
pub fn read_block_number_key(key: &[u8]) -> Option<u64> {
    let bytes: [u8; KEY_LEN] = key.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

/// Concatenate two byteslices into one vector.
pub fn combine(a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut res = Vec::with_capacity(a.len() + b.len());
    res.extend_from_slice(a);
    res.extend_from_slice(b);
    res
}
