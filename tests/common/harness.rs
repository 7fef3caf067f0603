//! Mock collaborators for driving the replica core: a counting execution engine, a scripted
//! pacemaker, a fetch network that records requests instead of sending them, and helpers for
//! building replica sets and chains of test blocks.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use ed25519_dalek::SigningKey;
use rand_core::OsRng;
use sha2::{Digest, Sha256};

use dex_replica_rs::app::{ExecutionEngine, ValidateError};
use dex_replica_rs::block_fetch::FetchNetwork;
use dex_replica_rs::config::{Configuration, ExperimentConfig, ReplicaInfo, ReplicaSetConfig};
use dex_replica_rs::messages::Proposal;
use dex_replica_rs::pacemaker::Pacemaker;
use dex_replica_rs::state_machine::DecidedBlockCache;
use dex_replica_rs::types::basic::{BlockNumber, CryptoHash, Data, Datum, ReplicaID};
use dex_replica_rs::types::block::{Block, HashedBlock};

/* ↓↓↓ Blocks and hashes ↓↓↓ */

pub(crate) fn test_hash(seed: u8) -> CryptoHash {
    CryptoHash::new([seed; 32])
}

/// A block whose payload is derived deterministically from its number.
pub(crate) fn test_block(number: u64, parent_hash: CryptoHash) -> HashedBlock {
    let payload = number.to_be_bytes().to_vec();
    let data_hash = {
        let mut hasher = Sha256::new();
        hasher.update(&payload);
        CryptoHash::new(hasher.finalize().into())
    };
    let data = Data::new(vec![Datum::new(payload)]);
    HashedBlock::new(Block::new(
        BlockNumber::new(number),
        parent_hash,
        data_hash,
        data,
    ))
}

/// A chain of test blocks `1..=len` hanging off the genesis sentinel.
pub(crate) fn test_chain(len: u64) -> Vec<HashedBlock> {
    let mut chain = Vec::new();
    let mut parent_hash = CryptoHash::zero();
    for number in 1..=len {
        let block = test_block(number, parent_hash);
        parent_hash = block.hash;
        chain.push(block);
    }
    chain
}

/* ↓↓↓ Replica sets and configuration ↓↓↓ */

pub(crate) fn replica_set(ids: &[u64], self_id: u64) -> ReplicaSetConfig {
    let mut csprg = OsRng {};
    let replicas = ids
        .iter()
        .map(|id| ReplicaInfo {
            id: ReplicaID::new(*id),
            address: format!("127.0.0.1:{}", 9000 + id).parse().unwrap(),
            public_key: SigningKey::generate(&mut csprg).verifying_key(),
        })
        .collect();
    ReplicaSetConfig::new(replicas, ReplicaID::new(self_id))
}

pub(crate) fn configuration(ids: &[u64], self_id: u64, persist_batch: u64) -> Configuration {
    Configuration {
        replica_set: replica_set(ids, self_id),
        experiment: ExperimentConfig {
            persist_batch,
            proposer_tick: Duration::from_millis(10),
            measurement_output_folder: PathBuf::from("/tmp"),
        },
        log_events: false,
    }
}

/* ↓↓↓ Execution engine ↓↓↓ */

/// Engine that derives each block's payload from its number and records commits and rewinds for
/// assertions.
pub(crate) struct CountingEngine {
    pub(crate) committed: Mutex<Vec<u64>>,
    pub(crate) rewound_to: Mutex<Vec<u64>>,
    pub(crate) reject_validation: AtomicBool,
    pub(crate) done: AtomicBool,
    pub(crate) measurements_written: AtomicBool,
}

impl CountingEngine {
    pub(crate) fn new() -> Arc<CountingEngine> {
        Arc::new(CountingEngine {
            committed: Mutex::new(Vec::new()),
            rewound_to: Mutex::new(Vec::new()),
            reject_validation: AtomicBool::new(false),
            done: AtomicBool::new(false),
            measurements_written: AtomicBool::new(false),
        })
    }
}

impl ExecutionEngine for CountingEngine {
    fn enter_proposer_mode(&self) {}

    fn propose(&self, parent: &HashedBlock) -> HashedBlock {
        test_block(parent.number().int() + 1, parent.hash)
    }

    fn validate(&self, _block: &HashedBlock) -> Result<(), ValidateError> {
        if self.reject_validation.load(Ordering::Relaxed) {
            Err(ValidateError::InvalidBlock)
        } else {
            Ok(())
        }
    }

    fn commit(&self, block_number: BlockNumber) {
        self.committed.lock().unwrap().push(block_number.int());
    }

    fn rewind_to(&self, block_number: BlockNumber) {
        self.rewound_to.lock().unwrap().push(block_number.int());
    }

    fn experiment_done(&self) -> bool {
        self.done.load(Ordering::Relaxed)
    }

    fn write_measurements(&self, _folder: &Path) {
        self.measurements_written.store(true, Ordering::Relaxed);
    }
}

/* ↓↓↓ Fetch network ↓↓↓ */

/// Records every fetch request instead of putting it on a wire.
#[derive(Clone)]
pub(crate) struct RecordingNetwork {
    pub(crate) requests: Arc<Mutex<Vec<(ReplicaID, CryptoHash)>>>,
}

impl RecordingNetwork {
    pub(crate) fn new() -> RecordingNetwork {
        RecordingNetwork {
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn num_requests(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl FetchNetwork for RecordingNetwork {
    fn request_block(&mut self, peer: ReplicaID, hash: CryptoHash) {
        self.requests.lock().unwrap().push((peer, hash));
    }
}

/// Poll until `condition` holds, panicking after `timeout`. Fetch workers run on their own
/// threads, so tests observe their effects asynchronously.
pub(crate) fn wait_until(timeout: Duration, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + timeout;
    while !condition() {
        if Instant::now() > deadline {
            panic!("condition not reached within {:?}", timeout);
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

/* ↓↓↓ Pacemaker ↓↓↓ */

/// Pacemaker scripted from the test body through shared atomics.
pub(crate) struct ScriptedPacemaker {
    pub(crate) script: Arc<PacemakerScript>,
}

pub(crate) struct PacemakerScript {
    pub(crate) self_proposer: AtomicBool,
    pub(crate) buffer_empty: AtomicBool,
    pub(crate) leader_terminated: AtomicBool,
    pub(crate) stopped: AtomicBool,
    pub(crate) proposals: Mutex<Vec<Proposal>>,
    pub(crate) empty_proposals: AtomicUsize,
}

impl ScriptedPacemaker {
    pub(crate) fn new(self_proposer: bool) -> (ScriptedPacemaker, Arc<PacemakerScript>) {
        let script = Arc::new(PacemakerScript {
            self_proposer: AtomicBool::new(self_proposer),
            buffer_empty: AtomicBool::new(false),
            leader_terminated: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            proposals: Mutex::new(Vec::new()),
            empty_proposals: AtomicUsize::new(0),
        });
        (
            ScriptedPacemaker {
                script: script.clone(),
            },
            script,
        )
    }
}

impl Pacemaker for ScriptedPacemaker {
    fn is_self_proposer(&self) -> bool {
        self.script.self_proposer.load(Ordering::Relaxed)
    }

    fn propose(&self, proposal: Proposal) {
        self.script.proposals.lock().unwrap().push(proposal);
    }

    fn propose_empty(&self) {
        self.script.empty_proposals.fetch_add(1, Ordering::Relaxed);
    }

    fn await_qc(&self) {}

    fn proposal_buffer_empty(&self) -> bool {
        self.script.buffer_empty.load(Ordering::Relaxed)
    }

    fn leader_terminated(&self) -> bool {
        self.script.leader_terminated.load(Ordering::Relaxed)
    }

    fn stop_proposals(&self) {
        self.script.stopped.store(true, Ordering::Relaxed);
        // Once proposals stop, the buffer drains.
        self.script.self_proposer.store(false, Ordering::Relaxed);
        self.script.buffer_empty.store(true, Ordering::Relaxed);
    }
}

/* ↓↓↓ Decided block cache ↓↓↓ */

/// A decided-block cache backed by a vector.
pub(crate) struct VecCache(pub(crate) Vec<HashedBlock>);

impl DecidedBlockCache for VecCache {
    fn blocks_above(&self, from: BlockNumber) -> Vec<HashedBlock> {
        let mut blocks: Vec<HashedBlock> = self
            .0
            .iter()
            .filter(|block| block.number() > from)
            .cloned()
            .collect();
        blocks.sort_by_key(|block| block.number());
        blocks
    }
}
