/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

use std::sync::mpsc::{self, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::config::ReplicaInfo;
use crate::types::basic::{CryptoHash, ReplicaID};

use super::request::RequestContext;
use super::FetchNetwork;

/// How many outstanding contexts a queue accumulates before it walks its list and splices out
/// the completed ones. The walk is O(n), amortized O(1) per request.
const GC_FREQ: usize = 100;

/// Bound on the worker's inbound channel; `add_request` blocks briefly when the worker is
/// saturated.
const WORKER_QUEUE_CAPACITY: usize = 64;

/// The fetch requests outstanding towards one peer replica.
///
/// The queue holds shared references to [`RequestContext`]s and a background worker that puts the
/// actual fetch messages on the wire. The queue never erases a context on delivery (the manager
/// does that); it garbage-collects completed contexts lazily once enough have accumulated.
pub struct ReplicaFetchQueue {
    peer: ReplicaID,
    state: Mutex<QueueState>,
    work_sender: Option<SyncSender<CryptoHash>>,
    worker: Option<JoinHandle<()>>,
}

struct QueueState {
    outstanding_reqs: Vec<Arc<RequestContext>>,
}

impl ReplicaFetchQueue {
    pub(crate) fn new<N: FetchNetwork>(info: &ReplicaInfo, mut network: N) -> ReplicaFetchQueue {
        let (work_sender, work) = mpsc::sync_channel(WORKER_QUEUE_CAPACITY);
        let peer = info.id;
        let worker = thread::spawn(move || {
            // Exits when the queue drops its sender.
            for hash in work {
                network.request_block(peer, hash);
            }
        });
        ReplicaFetchQueue {
            peer,
            state: Mutex::new(QueueState {
                outstanding_reqs: Vec::new(),
            }),
            work_sender: Some(work_sender),
            worker: Some(worker),
        }
    }

    pub(crate) fn add_request(&self, req: Arc<RequestContext>) {
        let hash = req.requested_hash();
        {
            let mut state = self.state.lock().unwrap();
            state.outstanding_reqs.push(req);
            if state.outstanding_reqs.len() > GC_FREQ {
                state.do_gc();
            }
        }

        let sender = self
            .work_sender
            .as_ref()
            .expect("Safety: work_sender is only taken in Drop.");
        if sender.send(hash).is_err() {
            log::warn!(
                "fetch worker for replica {} exited; dropping request",
                self.peer
            );
        }
    }

    /// Number of contexts currently referenced by this queue (including completed ones awaiting
    /// GC).
    pub fn num_outstanding(&self) -> usize {
        self.state.lock().unwrap().outstanding_reqs.len()
    }
}

impl QueueState {
    fn do_gc(&mut self) {
        self.outstanding_reqs.retain(|req| !req.is_received());
    }
}

impl Drop for ReplicaFetchQueue {
    fn drop(&mut self) {
        // Closing the channel is what terminates the worker.
        drop(self.work_sender.take());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
