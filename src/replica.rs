/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that [start](Replica::start) a replica, as well as [the type](Replica) which keeps
//! the replica alive.
//!
//! The crate works to safely replicate an exchange in multiple processes. In our terminology,
//! these processes are called 'replicas', each uniquely identified by a [replica
//! ID](crate::types::basic::ReplicaID) and an Ed25519 public key listed in the operator's
//! [configuration](crate::config).
//!
//! `start` wires the subsystems together and spawns the long-lived threads: the
//! [algorithm](crate::algorithm) thread that drives proposer turns and experiment shutdown, and,
//! when event logging is enabled, the [event bus](crate::event_bus) thread. The consensus layer
//! interacts with the running replica through the
//! [state machine handle](Replica::state_machine): proposals, block deliveries, commits and
//! rollback notifications all enter there.
//!
//! Dropping the `Replica` shuts the threads down and flushes the durable store.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::algorithm::start_algorithm;
use crate::app::ExecutionEngine;
use crate::block_fetch::FetchNetwork;
use crate::config::Configuration;
use crate::event_bus::{start_event_bus, HandlerPtr};
use crate::logging;
use crate::pacemaker::Pacemaker;
use crate::state::kv_store::OrderedStore;
use crate::state_machine::{DecidedBlockCache, ReplicaStateMachine, StateMachineError};

/// How the state machine reconciles with the durable store before the replica starts.
pub enum Startup<C: DecidedBlockCache> {
    /// Fresh chain: the store must be empty.
    Clean,
    /// Adopt the store's contents and replay the given decided blocks above the durable round.
    FromDisk(C),
}

pub struct Replica<S: OrderedStore, E: ExecutionEngine, N: FetchNetwork> {
    state_machine: Arc<ReplicaStateMachine<S, E, N>>,
    algorithm: Option<JoinHandle<()>>,
    algorithm_shutdown: Sender<()>,
    event_bus: Option<(JoinHandle<()>, Sender<()>)>,
}

impl<S: OrderedStore, E: ExecutionEngine, N: FetchNetwork> Replica<S, E, N> {
    pub fn start<P: Pacemaker, C: DecidedBlockCache>(
        config: Configuration,
        store: S,
        engine: Arc<E>,
        network: N,
        pacemaker: P,
        startup: Startup<C>,
        breakpoint_signal: Receiver<()>,
    ) -> Result<Replica<S, E, N>, StateMachineError> {
        let (event_publisher, event_bus) = if config.log_events {
            let (event_publisher, event_subscriber) = mpsc::channel();
            let (event_bus_shutdown, event_bus_shutdown_receiver) = mpsc::channel();
            let handlers: Vec<HandlerPtr> = vec![Box::new(logging::log_event)];
            let event_bus = start_event_bus(
                handlers,
                event_subscriber,
                event_bus_shutdown_receiver,
            );
            (Some(event_publisher), Some((event_bus, event_bus_shutdown)))
        } else {
            (None, None)
        };

        let state_machine = Arc::new(ReplicaStateMachine::new(
            &config,
            store,
            engine,
            network,
            event_publisher,
        ));
        match startup {
            Startup::Clean => state_machine.init_clean()?,
            Startup::FromDisk(decided_cache) => state_machine.init_from_disk(&decided_cache)?,
        }

        let (algorithm_shutdown, algorithm_shutdown_receiver) = mpsc::channel();
        let algorithm = start_algorithm(
            state_machine.clone(),
            pacemaker,
            config.experiment.proposer_tick,
            config.experiment.measurement_output_folder.clone(),
            breakpoint_signal,
            algorithm_shutdown_receiver,
        );

        Ok(Replica {
            state_machine,
            algorithm: Some(algorithm),
            algorithm_shutdown,
            event_bus,
        })
    }

    /// The handle the consensus layer calls back into: proposals, block deliveries, commits and
    /// rollback notifications.
    pub fn state_machine(&self) -> &Arc<ReplicaStateMachine<S, E, N>> {
        &self.state_machine
    }
}

impl<S: OrderedStore, E: ExecutionEngine, N: FetchNetwork> Drop for Replica<S, E, N> {
    fn drop(&mut self) {
        // Safety: the order of thread shutdown in this function is important. The algorithm
        // thread publishes events, so the event bus must outlive it; the store is flushed only
        // once nothing can write to it anymore.

        // The algorithm thread may have exited on its own at experiment end, in which case the
        // send fails harmlessly.
        let _ = self.algorithm_shutdown.send(());
        if let Some(algorithm) = self.algorithm.take() {
            let _ = algorithm.join();
        }

        if let Some((event_bus, event_bus_shutdown)) = self.event_bus.take() {
            let _ = event_bus_shutdown.send(());
            let _ = event_bus.join();
        }

        if let Err(err) = self.state_machine.sync() {
            log::error!("failed to flush the durable store on shutdown: {:?}", err);
        }
    }
}
