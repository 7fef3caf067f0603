/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The seam between the replica core and the consensus liveness driver.
//!
//! The pacemaker decides who proposes and when, collects votes into quorum certificates, and
//! times out stalled views. The core only consumes it: the [algorithm loop](crate::algorithm)
//! asks whether this replica should propose, hands proposals over, and blocks on quorum
//! formation.

use crate::messages::Proposal;

pub trait Pacemaker: Send + 'static {
    /// Whether this replica is the proposer for the current view.
    fn is_self_proposer(&self) -> bool;

    /// Hand a proposal to the voting protocol.
    fn propose(&self, proposal: Proposal);

    /// Broadcast an empty proposal. Used to flush the pipelined phases at experiment end.
    fn propose_empty(&self);

    /// Block until a quorum certificate for the latest proposal is formed, or the pacemaker's
    /// view timeout fires. Timeout handling is the pacemaker's own.
    fn await_qc(&self);

    /// Whether no further proposals are buffered.
    fn proposal_buffer_empty(&self) -> bool;

    /// Whether the leader has announced the end of the experiment.
    fn leader_terminated(&self) -> bool;

    /// Stop issuing proposals; peers observe this as the experiment winding down.
    fn stop_proposals(&self);
}
