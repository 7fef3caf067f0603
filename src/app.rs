/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The seam between the replica core and the exchange's execution engine.
//!
//! The core treats a block as an opaque transaction batch; everything that interprets it
//! (auction price discovery, orderbook matching, account state) lives behind
//! [`ExecutionEngine`].

use std::path::Path;

use crate::types::basic::BlockNumber;
use crate::types::block::HashedBlock;

/// Besides implementing the functions specified in the trait, implementors are additionally
/// expected to be *deterministic*: [`propose`](Self::propose) and [`validate`](Self::validate)
/// must evaluate to the same result every time they are called with the same arguments against
/// the same local state.
///
/// Methods take `&self` because the engine is driven concurrently from the proposer loop and the
/// consensus dispatch thread; implementations synchronize internally.
pub trait ExecutionEngine: Send + Sync + 'static {
    /// Put the engine's speculative state behind the next proposal. Called on every proposer turn
    /// before [`propose`](Self::propose).
    fn enter_proposer_mode(&self);

    /// Assemble and speculatively execute the next block, extending `parent`.
    fn propose(&self, parent: &HashedBlock) -> HashedBlock;

    /// Execute a candidate block received from the leader. Side effects must stay invisible
    /// outside the engine until [`commit`](Self::commit).
    fn validate(&self, block: &HashedBlock) -> Result<(), ValidateError>;

    /// Make the side effects of every block up to and including `block_number` permanent.
    fn commit(&self, block_number: BlockNumber);

    /// Drop speculative state above `block_number`.
    fn rewind_to(&self, block_number: BlockNumber);

    /// One-shot latch: whether the experiment workload is exhausted.
    fn experiment_done(&self) -> bool;

    /// Flush collected measurements under the given folder.
    fn write_measurements(&self, folder: &Path);
}

/// Circumstances in which the engine could reject a candidate block, causing this replica to skip
/// the round without voting.
#[derive(Debug)]
pub enum ValidateError {
    /// The deadline was exceeded while executing the candidate.
    RanOutOfTime,

    /// The contents of the block, in the context of its proposed position in the chain, are
    /// invalid under the engine's validation rules.
    InvalidBlock,
}
