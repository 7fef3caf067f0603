/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The replicated core of a decentralized exchange.
//!
//! A replica participates in a leader-based Byzantine-fault-tolerant consensus protocol, executes
//! batched order-book transactions through a pluggable [execution engine](crate::app), commits
//! blocks in sequence, and persists a Merkle-authenticated chain of block-header hashes. The
//! crate provides the three tightly coupled subsystems at the center of that:
//!
//! 1. The [header-hash map](crate::state::header_map): a persistent Merkle trie keyed by block
//!    number, with production/validation/rollback protocols and write-ahead durability through an
//!    embedded ordered key-value store.
//! 2. The [block fetch manager](crate::block_fetch): a request-coalescing subsystem that fetches
//!    missing ancestor blocks from peer replicas while pipelining the network events that depend
//!    on each fetch.
//! 3. The [replica state machine](crate::state_machine): the propose/validate/commit loop, its
//!    interaction with the consensus [pacemaker](crate::pacemaker), and startup reconciliation
//!    with persisted state.
//!
//! The consensus voting protocol itself (quorum certificate aggregation, signing, view
//! synchronization) and the exchange semantics are external collaborators, consumed through the
//! [`Pacemaker`] and [`ExecutionEngine`] traits.

pub mod app;

pub mod block_fetch;

pub mod config;

pub mod events;

pub mod logging;

pub mod messages;

pub mod pacemaker;

pub mod replica;

pub mod state;

pub mod state_machine;

pub mod types;

pub(crate) mod algorithm;

pub(crate) mod event_bus;

// Re-exports
pub use app::ExecutionEngine;
pub use pacemaker::Pacemaker;
pub use replica::Replica;
pub use state_machine::ReplicaStateMachine;
