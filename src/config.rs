/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Configuration as specified by the operator. This is split up into smaller, subsystem-specific
//! config structs before being passed to components.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use ed25519_dalek::VerifyingKey;
use indexmap::IndexMap;

use crate::types::basic::ReplicaID;

#[derive(Clone)]
pub struct Configuration {
    pub replica_set: ReplicaSetConfig,
    pub experiment: ExperimentConfig,
    pub log_events: bool,
}

/// Identity of a single peer replica: where to reach it, and the Ed25519 key its messages are
/// signed with. Signature verification happens in the consensus layer; the core only carries the
/// key.
#[derive(Clone)]
pub struct ReplicaInfo {
    pub id: ReplicaID,
    pub address: SocketAddr,
    pub public_key: VerifyingKey,
}

/// The immutable set of replicas participating in consensus. Assembled once at startup and never
/// mutated afterwards.
#[derive(Clone)]
pub struct ReplicaSetConfig {
    replicas: IndexMap<ReplicaID, ReplicaInfo>,
    self_id: ReplicaID,
}

impl ReplicaSetConfig {
    pub fn new(replicas: Vec<ReplicaInfo>, self_id: ReplicaID) -> ReplicaSetConfig {
        ReplicaSetConfig {
            replicas: replicas.into_iter().map(|info| (info.id, info)).collect(),
            self_id,
        }
    }

    pub fn is_valid_replica(&self, id: ReplicaID) -> bool {
        self.replicas.contains_key(&id)
    }

    pub fn get(&self, id: ReplicaID) -> Option<&ReplicaInfo> {
        self.replicas.get(&id)
    }

    pub fn self_id(&self) -> ReplicaID {
        self.self_id
    }

    /// Iterate over the replica set in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = &ReplicaInfo> {
        self.replicas.values()
    }

    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }
}

#[derive(Clone)]
pub struct ExperimentConfig {
    /// How many commits happen between flushes of the header-hash map to the durable store.
    pub persist_batch: u64,
    /// How long a non-proposing replica sleeps between checks of the pacemaker.
    pub proposer_tick: Duration,
    /// Prefix under which measurement files are written when the experiment ends.
    pub measurement_output_folder: PathBuf,
}
