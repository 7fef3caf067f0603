/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! "Inert" types that are sent around and inspected but have no active behavior. These types follow
//! the newtype pattern, and the API for using them is defined in this module.

use borsh::{BorshDeserialize, BorshSerialize};
use std::fmt::{self, Debug, Display, Formatter};
use std::ops::{Add, Sub};

/// The hash of a block: a 32-byte commitment to the block's contents, used as its consensus
/// identity. The all-zero hash is reserved as the genesis sentinel.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, BorshDeserialize, BorshSerialize)]
pub struct CryptoHash([u8; 32]);

impl CryptoHash {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The all-zero hash.
    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl Display for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Debug for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Number of a block in the committed chain. 0 denotes the genesis sentinel, which is not a real
/// block.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct BlockNumber(u64);

impl BlockNumber {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }

    pub const fn is_genesis(&self) -> bool {
        self.0 == 0
    }

    pub fn to_be_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl Display for BlockNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl Add<u64> for BlockNumber {
    type Output = BlockNumber;
    fn add(self, rhs: u64) -> Self::Output {
        BlockNumber::new(self.0.add(rhs))
    }
}

impl Sub<u64> for BlockNumber {
    type Output = BlockNumber;
    fn sub(self, rhs: u64) -> Self::Output {
        BlockNumber::new(self.0.sub(rhs))
    }
}

/// Identifier of a peer replica. Replica IDs are small integers assigned by the operator's
/// configuration; they index per-replica fetch queues and the 64-bit dispatch mask of a fetch
/// request.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct ReplicaID(u64);

impl ReplicaID {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Display for ReplicaID {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

/// Transaction batch carried by a block. The core treats it as opaque: only the execution engine
/// interprets the contents.
#[derive(Clone, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct Data(Vec<Datum>);

impl Data {
    pub fn new(datum_vec: Vec<Datum>) -> Self {
        Self(datum_vec)
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub const fn vec(&self) -> &Vec<Datum> {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Datum> {
        self.0.iter()
    }
}

/// Single datum stored in a block's [`Data`].
#[derive(Clone, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct Datum(Vec<u8>);

impl Datum {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> &Vec<u8> {
        &self.0
    }
}
