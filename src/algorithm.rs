/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The thread that drives the experiment: proposer turns, the shutdown drain, and measurement
//! output.
//!
//! On each iteration the loop asks the pacemaker whether this replica proposes. Proposer turns
//! run a [propose step](crate::state_machine::ReplicaStateMachine::propose_step), hand the
//! proposal to the pacemaker, and block until a quorum certificate forms; non-proposers sleep a
//! tick. The loop then evaluates the experiment-control conditions: latching the engine's
//! done-signal, draining the pipelined phases with empty proposals once the proposal buffer runs
//! dry, and terminating when the leader announces the end. Both termination paths wait on the
//! breakpoint signal before writing measurements, so that all replicas stop measuring at the same
//! barrier.

use std::path::PathBuf;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::app::ExecutionEngine;
use crate::block_fetch::FetchNetwork;
use crate::pacemaker::Pacemaker;
use crate::state::kv_store::OrderedStore;
use crate::state_machine::ReplicaStateMachine;

pub(crate) struct Algorithm<S: OrderedStore, E: ExecutionEngine, P: Pacemaker, N: FetchNetwork> {
    state_machine: Arc<ReplicaStateMachine<S, E, N>>,
    pacemaker: P,
    proposer_tick: Duration,
    measurement_output_folder: PathBuf,
    breakpoint_signal: Receiver<()>,
    shutdown_signal: Receiver<()>,
}

pub(crate) fn start_algorithm<S: OrderedStore, E: ExecutionEngine, P: Pacemaker, N: FetchNetwork>(
    state_machine: Arc<ReplicaStateMachine<S, E, N>>,
    pacemaker: P,
    proposer_tick: Duration,
    measurement_output_folder: PathBuf,
    breakpoint_signal: Receiver<()>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    let algorithm = Algorithm {
        state_machine,
        pacemaker,
        proposer_tick,
        measurement_output_folder,
        breakpoint_signal,
        shutdown_signal,
    };
    thread::spawn(move || algorithm.execute())
}

impl<S: OrderedStore, E: ExecutionEngine, P: Pacemaker, N: FetchNetwork> Algorithm<S, E, P, N> {
    fn execute(self) {
        let mut self_signalled_end = false;

        loop {
            match self.shutdown_signal.try_recv() {
                Ok(()) => return,
                Err(std::sync::mpsc::TryRecvError::Empty) => (),
                Err(std::sync::mpsc::TryRecvError::Disconnected) => {
                    panic!("Algorithm thread disconnected from main thread")
                }
            }

            if self.pacemaker.is_self_proposer() {
                let proposal = self
                    .state_machine
                    .propose_step()
                    .unwrap_or_else(|err| panic!("fatal error while proposing: {:?}", err));
                self.pacemaker.propose(proposal);
                self.pacemaker.await_qc();
            } else {
                thread::sleep(self.proposer_tick);
            }

            /* Experiment control conditions */

            if self.state_machine.experiment_done() {
                self.pacemaker.stop_proposals();
                self_signalled_end = true;
            }

            if self.pacemaker.proposal_buffer_empty() {
                log::info!("done with experiment, draining proposal pipeline");

                // Three empty proposals flush the three pipelined phases.
                for _ in 0..3 {
                    self.pacemaker.propose_empty();
                    self.pacemaker.await_qc();
                }

                self.wait_for_breakpoint();
                self.state_machine
                    .write_measurements(&self.measurement_output_folder);
                return;
            }

            if self.pacemaker.leader_terminated() && !self_signalled_end {
                log::info!("leader terminated experiment, waiting for breakpoint signal");
                self.wait_for_breakpoint();
                self.state_machine
                    .write_measurements(&self.measurement_output_folder);
                return;
            }
        }
    }

    fn wait_for_breakpoint(&self) {
        // A closed channel means the controller is gone; proceed rather than hang.
        let _ = self.breakpoint_signal.recv();
    }
}
