/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The replica state machine: the propose/validate/commit cycle and its reconciliation with
//! persisted state at startup.
//!
//! [`ReplicaStateMachine`] ties the three stateful subsystems together: the
//! [header-hash map](crate::state::header_map), the
//! [block fetch manager](crate::block_fetch), and the
//! [execution engine](crate::app::ExecutionEngine). The [algorithm thread](crate::algorithm)
//! drives the proposer side through [`propose_step`](ReplicaStateMachine::propose_step); the
//! consensus layer drives the validator side through the `on_*` callbacks.
//!
//! ## Locking
//!
//! Two mutexes serialize the two sides. `operation` guards the proposer's cursor
//! (`proposal_base_block`); `confirmation` guards validation and commit state, including the
//! fetch manager, which makes the consensus dispatch path the only mutator of the fetch index.
//! The header-hash map sits behind its own lock, always acquired after the side mutexes, never
//! across a call into the engine or the pacemaker.
//!
//! ## Roles
//!
//! A replica keeps a single role per run: either it proposes (the pacemaker names it leader and
//! [`propose_step`](ReplicaStateMachine::propose_step) records parent commitments through the
//! production protocol), or it validates
//! (candidates arrive through [`on_proposal`](ReplicaStateMachine::on_proposal) and commitments
//! are finalized on commit callbacks). The commit callback finalizes a validation only when the
//! committed number is at or ahead of the map's committed prefix, so a proposer's own commits,
//! already recorded by production inserts, pass through without touching the map.

use std::path::Path;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use crate::app::ExecutionEngine;
use crate::block_fetch::{BlockFetchManager, FetchNetwork};
use crate::config::Configuration;
use crate::events::*;
use crate::messages::{NetworkEvent, Proposal, Vote};
use crate::state::header_map::{BlockHeaderHashMap, HeaderMapError, LoadingHeaderMap};
use crate::state::kv_store::OrderedStore;
use crate::types::basic::{BlockNumber, ReplicaID};
use crate::types::block::HashedBlock;

/// Decided blocks kept by the consensus layer, replayed at startup to close the gap between the
/// durable round counter and the consensus log.
pub trait DecidedBlockCache {
    /// Decided blocks with numbers strictly above `from`, lowest first.
    fn blocks_above(&self, from: BlockNumber) -> Vec<HashedBlock>;
}

/// The empty cache: nothing to replay.
impl DecidedBlockCache for () {
    fn blocks_above(&self, _from: BlockNumber) -> Vec<HashedBlock> {
        Vec::new()
    }
}

pub struct ReplicaStateMachine<S: OrderedStore, E: ExecutionEngine, N: FetchNetwork> {
    engine: Arc<E>,
    header_map: Mutex<BlockHeaderHashMap<S>>,
    operation: Mutex<OperationState>,
    confirmation: Mutex<ConfirmationState<N>>,
    persist_batch: u64,
    event_publisher: Option<Sender<Event>>,
}

struct OperationState {
    /// Parent of the next proposal. Initially the genesis-pointing block.
    proposal_base_block: HashedBlock,
    /// Latched on the first proposer turn; a proposing replica ignores proposal echoes.
    proposer_mode: bool,
}

struct ConfirmationState<N: FetchNetwork> {
    /// The most recent block that has been durably committed.
    last_committed_block: HashedBlock,
    fetch_manager: BlockFetchManager<N>,
    commits_since_persist: u64,
}

impl<S: OrderedStore, E: ExecutionEngine, N: FetchNetwork> ReplicaStateMachine<S, E, N> {
    /// Construct the state machine. Exactly one of [`init_clean`](Self::init_clean) or
    /// [`init_from_disk`](Self::init_from_disk) must be called before any propose or validate.
    pub fn new(
        config: &Configuration,
        store: S,
        engine: Arc<E>,
        network: N,
        event_publisher: Option<Sender<Event>>,
    ) -> ReplicaStateMachine<S, E, N> {
        let mut fetch_manager = BlockFetchManager::new(config.replica_set.clone(), network);
        for info in config.replica_set.iter() {
            if info.id != config.replica_set.self_id() {
                fetch_manager.add_replica(info);
            }
        }

        ReplicaStateMachine {
            engine,
            header_map: Mutex::new(BlockHeaderHashMap::new(store)),
            operation: Mutex::new(OperationState {
                proposal_base_block: HashedBlock::genesis(),
                proposer_mode: false,
            }),
            confirmation: Mutex::new(ConfirmationState {
                last_committed_block: HashedBlock::genesis(),
                fetch_manager,
                commits_since_persist: 0,
            }),
            persist_batch: config.experiment.persist_batch,
            event_publisher,
        }
    }

    /// Start a fresh chain. The durable store must be empty; the genesis sentinel stays implicit
    /// (the trie holds no leaf for it).
    pub fn init_clean(&self) -> Result<(), StateMachineError> {
        let header_map = self.header_map.lock().unwrap();
        if header_map.persisted_round() != 0 || !header_map.store_is_empty() {
            return Err(StateMachineError::StoreNotEmpty);
        }
        Ok(())
    }

    /// Reconcile with persisted state: adopt the store's contents, then replay the decided blocks
    /// the consensus layer kept above the durable round.
    ///
    /// Replay records each decided block's *parent* commitment, exactly as live processing would;
    /// inserts already covered by the durable store are suppressed. Engine-side replay
    /// suppression is the engine's own concern; its durable state is opaque to the core.
    pub fn init_from_disk<C: DecidedBlockCache>(
        &self,
        decided_cache: &C,
    ) -> Result<(), StateMachineError> {
        let mut header_map = self.header_map.lock().unwrap();
        header_map.load()?;

        let decided = decided_cache.blocks_above(header_map.last_committed_block_number());
        {
            let mut loader = LoadingHeaderMap::new(&mut header_map);
            for block in &decided {
                if block.number().is_genesis() {
                    continue;
                }
                loader.insert_for_loading(block.number() - 1, block.block.parent_hash)?;
            }
        }

        if let Some(newest) = decided.last() {
            self.confirmation.lock().unwrap().last_committed_block = newest.clone();
            self.operation.lock().unwrap().proposal_base_block = newest.clone();
        }
        Ok(())
    }

    /// Build, execute and record the next proposal. Called on proposer turns by the algorithm
    /// thread.
    pub fn propose_step(&self) -> Result<Proposal, StateMachineError> {
        let mut operation = self.operation.lock().unwrap();
        operation.proposer_mode = true;

        self.engine.enter_proposer_mode();
        let block = self.engine.propose(&operation.proposal_base_block);

        {
            let mut header_map = self.header_map.lock().unwrap();
            header_map.insert_for_production(
                operation.proposal_base_block.number(),
                operation.proposal_base_block.hash,
            )?;
        }
        operation.proposal_base_block = block.clone();

        Event::ProduceBlock(ProduceBlockEvent {
            timestamp: SystemTime::now(),
            number: block.number(),
            hash: block.hash,
        })
        .publish(&self.event_publisher);

        Ok(Proposal { block })
    }

    /// Validate a candidate block received from a leader. Returns the vote to cast, or `None` if
    /// the candidate was rejected or its validation was deferred behind an ancestor fetch.
    pub fn on_proposal(
        &self,
        origin: ReplicaID,
        proposal: Proposal,
    ) -> Result<Option<Vote>, StateMachineError> {
        if self.operation.lock().unwrap().proposer_mode {
            // Our own proposal echoed back by the broadcast layer.
            return Ok(None);
        }

        let mut confirmation = self.confirmation.lock().unwrap();

        let number = proposal.block.number();
        if number.is_genesis() {
            log::warn!("ignoring proposal for the genesis sentinel");
            return Ok(None);
        }

        Event::ReceiveProposal(ReceiveProposalEvent {
            timestamp: SystemTime::now(),
            origin,
            number,
            hash: proposal.block.hash,
        })
        .publish(&self.event_publisher);

        let parent_number = number - 1;
        let parent_hash = proposal.block.block.parent_hash;
        let parent_known = self
            .header_map
            .lock()
            .unwrap()
            .tentative_insert_for_validation(parent_number, parent_hash)?;

        if !parent_known {
            // Ask the proposal's origin for the missing ancestor and revisit the candidate when
            // it arrives.
            Event::StartFetch(StartFetchEvent {
                timestamp: SystemTime::now(),
                hash: parent_hash,
                target: origin,
            })
            .publish(&self.event_publisher);
            confirmation.fetch_manager.add_fetch_request(
                parent_hash,
                origin,
                vec![NetworkEvent::Proposal { origin, proposal }],
            );
            return Ok(None);
        }

        match self.engine.validate(&proposal.block) {
            Ok(()) => {
                let vote = Vote {
                    block_number: number,
                    block_hash: proposal.block.hash,
                };
                Event::Vote(VoteEvent {
                    timestamp: SystemTime::now(),
                    number,
                    hash: proposal.block.hash,
                })
                .publish(&self.event_publisher);
                Ok(Some(vote))
            }
            Err(err) => {
                log::warn!("refusing to vote: engine rejected block {}: {:?}", number, err);
                self.header_map.lock().unwrap().rollback_validation();
                Ok(None)
            }
        }
    }

    /// Hand a fetched block to the fetch manager. Returns the network events released by the
    /// delivery, in order, for the consensus layer to re-enqueue on its dispatch queue.
    pub fn on_block_delivery(&self, block: &HashedBlock) -> Vec<NetworkEvent> {
        let released = self
            .confirmation
            .lock()
            .unwrap()
            .fetch_manager
            .deliver_block(block);

        Event::DeliverBlock(DeliverBlockEvent {
            timestamp: SystemTime::now(),
            hash: block.hash,
            released_events: released.len(),
        })
        .publish(&self.event_publisher);

        released
    }

    /// Record a consensus commit of `block`. Every
    /// [`persist_batch`](crate::config::ExperimentConfig::persist_batch)-th commit flushes the
    /// header-hash map to the durable store.
    pub fn on_commit(&self, block: HashedBlock) -> Result<(), StateMachineError> {
        let mut confirmation = self.confirmation.lock().unwrap();
        let number = block.number();

        {
            let mut header_map = self.header_map.lock().unwrap();
            // A proposer's own commits are already recorded by production inserts; finalize only
            // a validation in flight.
            if number >= header_map.last_committed_block_number() {
                header_map.finalize_validation(number)?;
            }
        }

        self.engine.commit(number);
        confirmation.last_committed_block = block.clone();

        Event::CommitBlock(CommitBlockEvent {
            timestamp: SystemTime::now(),
            number,
            hash: block.hash,
        })
        .publish(&self.event_publisher);

        confirmation.commits_since_persist += 1;
        if confirmation.commits_since_persist >= self.persist_batch {
            confirmation.commits_since_persist = 0;
            self.header_map.lock().unwrap().persist(number + 1)?;
            Event::PersistHeaders(PersistHeadersEvent {
                timestamp: SystemTime::now(),
                round: (number + 1).int(),
            })
            .publish(&self.event_publisher);
        }

        Ok(())
    }

    /// Rewind to `committed_round` on a pacemaker rollback notification. Fatal if the target is
    /// below the durable round counter.
    pub fn on_rollback(&self, committed_round: BlockNumber) -> Result<(), StateMachineError> {
        let mut operation = self.operation.lock().unwrap();
        let confirmation = self.confirmation.lock().unwrap();

        self.header_map
            .lock()
            .unwrap()
            .rollback_to_committed_round(committed_round)?;
        self.engine.rewind_to(committed_round);

        operation.proposal_base_block = confirmation.last_committed_block.clone();

        Event::Rewind(RewindEvent {
            timestamp: SystemTime::now(),
            committed_round,
        })
        .publish(&self.event_publisher);

        Ok(())
    }

    pub fn experiment_done(&self) -> bool {
        self.engine.experiment_done()
    }

    pub fn write_measurements(&self, folder: &Path) {
        self.engine.write_measurements(folder)
    }

    /// Flush the durable store. Called on replica shutdown.
    pub fn sync(&self) -> Result<(), StateMachineError> {
        self.header_map.lock().unwrap().sync()?;
        Ok(())
    }

    /* ↓↓↓ State inspection ↓↓↓ */

    /// The most recent durably committed block.
    pub fn last_committed_block(&self) -> HashedBlock {
        self.confirmation.lock().unwrap().last_committed_block.clone()
    }

    /// The Merkle root over the recorded header hashes.
    pub fn header_chain_commitment(&self) -> crate::types::basic::CryptoHash {
        self.header_map.lock().unwrap().root_hash()
    }

    /// The first round not yet reflected in the durable store.
    pub fn persisted_round(&self) -> u64 {
        self.header_map.lock().unwrap().persisted_round()
    }
}

/// Fatal failure of the replica state machine.
#[derive(Debug)]
pub enum StateMachineError {
    HeaderMap(HeaderMapError),
    /// `init_clean` found existing state in the durable store.
    StoreNotEmpty,
}

impl From<HeaderMapError> for StateMachineError {
    fn from(err: HeaderMapError) -> Self {
        StateMachineError::HeaderMap(err)
    }
}
