/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The authenticated mapping from block number to block-header hash.
//!
//! [`BlockHeaderHashMap`] keeps the mapping in a [Merkle trie](super::merkle_trie::MerkleTrie)
//! whose root is the replica's *header-chain commitment*: two replicas that have processed the
//! same prefix of blocks hold the same root. The map is written through two protocols:
//!
//! - **Production** ([`insert_for_production`](BlockHeaderHashMap::insert_for_production)):
//!   the proposer records block `n`'s hash while building block `n + 1`. Advances
//!   `last_committed_block_number`.
//! - **Validation** ([`tentative_insert_for_validation`](BlockHeaderHashMap::tentative_insert_for_validation)):
//!   a validator records the candidate's parent hash before executing the candidate. The insert
//!   stays tentative until [`finalize_validation`](BlockHeaderHashMap::finalize_validation) or
//!   [`rollback_validation`](BlockHeaderHashMap::rollback_validation).
//!
//! Every [`persist`](BlockHeaderHashMap::persist) snapshot flushes the entries below the current
//! round to the [durable ordered store](super::kv_store::OrderedStore) in one transaction,
//! together with the new persisted round counter. [`load`](BlockHeaderHashMap::load) rebuilds the
//! trie from the store at startup.
//!
//! Violations of the map's invariants are returned as [`HeaderMapError`]s; callers treat every
//! one of them as fatal, because they indicate either adversarial input that should have been
//! filtered upstream or a bug.

use log;

use crate::types::basic::{BlockNumber, CryptoHash};

use super::kv_store::{OrderedStore, ReadTransaction, StoreError, WriteTransaction};
use super::merkle_trie::MerkleTrie;
use super::paths;

pub struct BlockHeaderHashMap<S: OrderedStore> {
    block_map: MerkleTrie,
    store: S,
    last_committed_block_number: u64,
}

impl<S: OrderedStore> BlockHeaderHashMap<S> {
    /// Construct an empty map on top of `store`. Call [`load`](Self::load) afterwards to adopt
    /// whatever the store already holds.
    pub fn new(store: S) -> BlockHeaderHashMap<S> {
        BlockHeaderHashMap {
            block_map: MerkleTrie::new(),
            store,
            last_committed_block_number: 0,
        }
    }

    /// The highest block number whose hash has been committed to the trie. Genesis = 0.
    pub fn last_committed_block_number(&self) -> BlockNumber {
        BlockNumber::new(self.last_committed_block_number)
    }

    /// The first round not yet reflected in the durable store.
    pub fn persisted_round(&self) -> u64 {
        self.store.persisted_round()
    }

    /// Number of entries currently in the trie.
    pub fn len(&self) -> usize {
        self.block_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.block_map.is_empty()
    }

    /// The hash stored for `block_number`, if any.
    pub fn hash_at(&self, block_number: BlockNumber) -> Option<CryptoHash> {
        self.block_map
            .get(paths::block_number_key(block_number.int()))
            .map(CryptoHash::new)
    }

    /// The header-chain commitment: the Merkle root over the current contents.
    pub fn root_hash(&mut self) -> CryptoHash {
        CryptoHash::new(self.block_map.root_hash())
    }

    /// Whether the backing store holds no entries at all.
    pub fn store_is_empty(&self) -> bool {
        self.store.begin_read().iterate().next().is_none()
    }

    /// Record the hash of newly produced block `block_number` while building its successor.
    ///
    /// `block_number` must be exactly `last_committed_block_number + 1`. The genesis sentinel
    /// (`block_number == 0`) is accepted only on a completely fresh map with the zero hash, and
    /// records nothing.
    pub fn insert_for_production(
        &mut self,
        block_number: BlockNumber,
        block_hash: CryptoHash,
    ) -> Result<(), HeaderMapError> {
        let n = block_number.int();
        if n == 0 {
            // The parent is the genesis sentinel: legal on a fresh map, nothing to record.
            return self.check_genesis_insert(&block_hash);
        }

        if n != self.last_committed_block_number + 1 {
            return Err(HeaderMapError::BlockOutOfOrder {
                expected: self.last_committed_block_number + 1,
                got: n,
            });
        }

        self.block_map
            .insert(paths::block_number_key(n), block_hash.bytes());

        // Difference between production and validation is here.
        self.last_committed_block_number = n;
        Ok(())
    }

    /// Record the candidate's parent hash while validating a received block.
    ///
    /// `block_number` names the candidate's *parent*; the insert succeeds only when that parent
    /// is the newest committed block, i.e. `block_number == last_committed_block_number`. Returns
    /// `Ok(false)` and leaves the map unchanged otherwise, in which case the caller should fetch
    /// the missing ancestor. Must be followed by either
    /// [`finalize_validation`](Self::finalize_validation) or
    /// [`rollback_validation`](Self::rollback_validation).
    pub fn tentative_insert_for_validation(
        &mut self,
        block_number: BlockNumber,
        block_hash: CryptoHash,
    ) -> Result<bool, HeaderMapError> {
        let n = block_number.int();
        if n == 0 {
            self.check_genesis_insert(&block_hash)?;
            return Ok(true);
        }

        if n != self.last_committed_block_number {
            return Ok(false);
        }

        self.block_map
            .insert(paths::block_number_key(n), block_hash.bytes());
        Ok(true)
    }

    /// Undo the last tentative insertion (i.e. if subsequent, unrelated validation checks
    /// failed). Removes the entry at `last_committed_block_number + 1` if present. Idempotent.
    pub fn rollback_validation(&mut self) {
        self.block_map
            .remove(paths::block_number_key(self.last_committed_block_number + 1));
    }

    /// Make the tentative insertion permanent: advance `last_committed_block_number` to the
    /// number of the block whose validation just committed.
    pub fn finalize_validation(
        &mut self,
        finalized_block_number: BlockNumber,
    ) -> Result<(), HeaderMapError> {
        if finalized_block_number.int() < self.last_committed_block_number {
            return Err(HeaderMapError::CannotFinalizePrior {
                last_committed: self.last_committed_block_number,
                got: finalized_block_number.int(),
            });
        }
        self.last_committed_block_number = finalized_block_number.int();
        Ok(())
    }

    /// Rewind in-memory state after a consensus rollback. `committed_block_number` is the first
    /// block number to remove: entries `[committed_block_number, last_committed_block_number]`
    /// are deleted from the trie and `last_committed_block_number` becomes
    /// `max(committed_block_number - 1, 0)`.
    ///
    /// Rewinding below the persisted round counter is refused: the durable store cannot move
    /// backwards.
    pub fn rollback_to_committed_round(
        &mut self,
        committed_block_number: BlockNumber,
    ) -> Result<(), HeaderMapError> {
        let c = committed_block_number.int();
        let persisted_round = self.store.persisted_round();
        if c < persisted_round {
            return Err(HeaderMapError::RollbackBelowDurable {
                persisted_round,
                target: c,
            });
        }

        for i in c..=self.last_committed_block_number {
            if i == 0 {
                continue;
            }
            if self.block_map.remove(paths::block_number_key(i)).is_none() {
                return Err(HeaderMapError::MissingHash { block_number: i });
            }
        }
        self.last_committed_block_number = c.saturating_sub(1);
        Ok(())
    }

    /// Snapshot the map to the durable store: write every entry in
    /// `[persisted_round, current_block_number)` and advance the round counter to
    /// `current_block_number`, all in one transaction.
    ///
    /// The hash of the current block is intentionally not written: higher levels treat only
    /// blocks strictly below the current round as durable.
    pub fn persist(&mut self, current_block_number: BlockNumber) -> Result<(), HeaderMapError> {
        let current = current_block_number.int();
        log::debug!("persisting header hash map at round {}", current);

        let persisted_round = self.store.persisted_round();
        let mut wtx = self.store.begin_write();
        for i in persisted_round..current {
            if i == 0 {
                continue;
            }
            let key = paths::block_number_key(i);
            let hash = self
                .block_map
                .get(key)
                .ok_or(HeaderMapError::MissingHash { block_number: i })?;
            wtx.put(&key, &hash);
        }
        self.store.commit(wtx, current)?;
        Ok(())
    }

    /// Rebuild the trie from the durable store at startup.
    ///
    /// Every persisted entry is reinserted; any key at or above the persisted round counter, or
    /// any malformed key or value, is corruption. `last_committed_block_number` is set to
    /// `persisted_round - 1` (saturating): the store holds entries `[1, persisted_round - 1]`,
    /// and replaying decided blocks above that is the caller's job.
    pub fn load(&mut self) -> Result<(), HeaderMapError> {
        let persisted_round = self.store.persisted_round();
        {
            let rtx = self.store.begin_read();
            for (key, value) in rtx.iterate() {
                let block_number = paths::read_block_number_key(&key).ok_or_else(|| {
                    HeaderMapError::CorruptStore {
                        detail: format!("malformed key of length {}", key.len()),
                    }
                })?;
                if block_number >= persisted_round {
                    return Err(HeaderMapError::CorruptStore {
                        detail: format!(
                            "key {} at or above persisted round {}",
                            block_number, persisted_round
                        ),
                    });
                }
                let hash: [u8; paths::VALUE_LEN] =
                    value
                        .as_slice()
                        .try_into()
                        .map_err(|_| HeaderMapError::CorruptStore {
                            detail: format!(
                                "value of length {} at key {}",
                                value.len(),
                                block_number
                            ),
                        })?;
                self.block_map
                    .insert(paths::block_number_key(block_number), hash);
            }
        }
        self.last_committed_block_number = persisted_round.saturating_sub(1);
        log::debug!(
            "loaded {} header hashes, persisted round {}",
            self.block_map.len(),
            persisted_round
        );
        Ok(())
    }

    /// Flush the backing store to stable storage.
    pub fn sync(&mut self) -> Result<(), HeaderMapError> {
        self.store.sync()?;
        Ok(())
    }

    fn check_genesis_insert(&self, block_hash: &CryptoHash) -> Result<(), HeaderMapError> {
        if self.last_committed_block_number != 0 || !self.block_map.is_empty() {
            return Err(HeaderMapError::InvalidGenesis);
        }
        if !block_hash.is_zero() {
            return Err(HeaderMapError::InvalidGenesis);
        }
        Ok(())
    }
}

/// Mock around [`BlockHeaderHashMap`] that makes inserts into no-ops when replaying a block whose
/// state changes are already reflected in the durable store.
pub struct LoadingHeaderMap<'a, S: OrderedStore> {
    inner: &'a mut BlockHeaderHashMap<S>,
    persisted_round: u64,
}

impl<'a, S: OrderedStore> LoadingHeaderMap<'a, S> {
    pub fn new(inner: &'a mut BlockHeaderHashMap<S>) -> LoadingHeaderMap<'a, S> {
        let persisted_round = inner.persisted_round();
        LoadingHeaderMap {
            inner,
            persisted_round,
        }
    }

    /// Insert a block hash when replaying trusted decided blocks: a no-op below the persisted
    /// round, a production insert at or above it.
    pub fn insert_for_loading(
        &mut self,
        block_number: BlockNumber,
        block_hash: CryptoHash,
    ) -> Result<(), HeaderMapError> {
        if block_number.int() < self.persisted_round {
            return Ok(());
        }
        self.inner.insert_for_production(block_number, block_hash)
    }
}

/// Violation of the header-hash map's invariants, or a failure of its durable store. All fatal.
#[derive(Debug)]
pub enum HeaderMapError {
    /// Genesis insert on a non-empty map, or with a nonzero hash.
    InvalidGenesis,
    /// Production insert whose block number does not extend the committed prefix.
    BlockOutOfOrder { expected: u64, got: u64 },
    /// `finalize_validation` with a block number below the committed prefix.
    CannotFinalizePrior { last_committed: u64, got: u64 },
    /// Attempt to rewind past the persisted round counter.
    RollbackBelowDurable { persisted_round: u64, target: u64 },
    /// An entry the map expected to hold in memory is missing.
    MissingHash { block_number: u64 },
    /// The durable store holds data its round counter says cannot exist.
    CorruptStore { detail: String },
    /// The durable store failed a commit or flush.
    Durability(StoreError),
}

impl From<StoreError> for HeaderMapError {
    fn from(err: StoreError) -> Self {
        HeaderMapError::Durability(err)
    }
}
