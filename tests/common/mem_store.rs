//! A simple, volatile, in-memory implementation of the durable ordered store.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use dex_replica_rs::state::kv_store::{
    OrderedStore, ReadTransaction, StoreError, WriteTransaction,
};

/// An in-memory [`OrderedStore`]: a `BTreeMap` gives ordered key iteration for free. The handle
/// is cheaply cloneable, so a test can "reopen" the store by building a second header-hash map on
/// a clone.
#[derive(Clone)]
pub(crate) struct MemStore(Arc<Mutex<MemStoreInner>>);

struct MemStoreInner {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    persisted_round: u64,
}

impl MemStore {
    pub(crate) fn new() -> MemStore {
        MemStore(Arc::new(Mutex::new(MemStoreInner {
            data: BTreeMap::new(),
            persisted_round: 0,
        })))
    }
}

impl OrderedStore for MemStore {
    type ReadTx<'a> = MemReadTx<'a> where Self: 'a;
    type WriteTx = MemWriteTx;

    fn begin_read(&self) -> MemReadTx<'_> {
        MemReadTx(self.0.lock().unwrap())
    }

    fn begin_write(&self) -> MemWriteTx {
        MemWriteTx { puts: Vec::new() }
    }

    fn commit(&mut self, wtx: MemWriteTx, new_persisted_round: u64) -> Result<(), StoreError> {
        let mut inner = self.0.lock().unwrap();
        for (key, value) in wtx.puts {
            inner.data.insert(key, value);
        }
        inner.persisted_round = new_persisted_round;
        Ok(())
    }

    fn persisted_round(&self) -> u64 {
        self.0.lock().unwrap().persisted_round
    }

    fn sync(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

pub(crate) struct MemReadTx<'a>(MutexGuard<'a, MemStoreInner>);

impl ReadTransaction for MemReadTx<'_> {
    fn iterate(&self) -> Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_> {
        Box::new(
            self.0
                .data
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        )
    }
}

pub(crate) struct MemWriteTx {
    puts: Vec<(Vec<u8>, Vec<u8>)>,
}

impl WriteTransaction for MemWriteTx {
    fn put(&mut self, key: &[u8], value: &[u8]) {
        self.puts.push((key.to_vec(), value.to_vec()));
    }
}
