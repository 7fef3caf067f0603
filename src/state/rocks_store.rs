/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A rocksdb-backed implementation of the [durable ordered store](super::kv_store::OrderedStore).
//!
//! Atomicity comes from `rocksdb::WriteBatch`: every commit writes its staged puts and the new
//! persisted round counter in one synchronous batch, so the counter can never run ahead of the
//! data it describes.

use std::path::Path;

use rocksdb::{Direction, IteratorMode, WriteBatch, WriteOptions, DB};

use super::kv_store::{OrderedStore, ReadTransaction, StoreError, WriteTransaction};
use super::paths;

pub struct RocksStore {
    db: DB,
    // In-memory mirror of the durable counter; kept in step by `commit`.
    persisted_round: u64,
}

impl RocksStore {
    /// Open (or create) the store under `dir`/[`HEADER_HASH_DB`](paths::HEADER_HASH_DB).
    pub fn open(dir: &Path) -> Result<RocksStore, StoreError> {
        let db = DB::open_default(dir.join(paths::HEADER_HASH_DB)).map_err(durability)?;
        let persisted_round = match db.get(paths::PERSISTED_ROUND).map_err(durability)? {
            Some(bytes) => {
                let bytes: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    StoreError::Durability {
                        detail: "malformed persisted round counter".to_string(),
                    }
                })?;
                u64::from_be_bytes(bytes)
            }
            None => 0,
        };
        Ok(RocksStore {
            db,
            persisted_round,
        })
    }
}

impl OrderedStore for RocksStore {
    type ReadTx<'a> = RocksReadTx<'a> where Self: 'a;
    type WriteTx = RocksWriteTx;

    fn begin_read(&self) -> RocksReadTx<'_> {
        RocksReadTx { db: &self.db }
    }

    fn begin_write(&self) -> RocksWriteTx {
        RocksWriteTx {
            batch: WriteBatch::default(),
        }
    }

    fn commit(&mut self, mut wtx: RocksWriteTx, new_persisted_round: u64) -> Result<(), StoreError> {
        wtx.batch
            .put(paths::PERSISTED_ROUND, new_persisted_round.to_be_bytes());
        let mut options = WriteOptions::default();
        options.set_sync(true);
        self.db.write_opt(wtx.batch, &options).map_err(durability)?;
        self.persisted_round = new_persisted_round;
        Ok(())
    }

    fn persisted_round(&self) -> u64 {
        self.persisted_round
    }

    fn sync(&mut self) -> Result<(), StoreError> {
        self.db.flush().map_err(durability)
    }
}

pub struct RocksReadTx<'a> {
    db: &'a DB,
}

impl ReadTransaction for RocksReadTx<'_> {
    fn iterate(&self) -> Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_> {
        let scan = self
            .db
            .iterator(IteratorMode::From(&paths::HEADER_HASHES, Direction::Forward))
            .filter_map(|entry| entry.ok())
            .take_while(|(key, _)| key.first() == Some(&paths::HEADER_HASHES[0]))
            .map(|(key, value)| (key[1..].to_vec(), value.to_vec()));
        Box::new(scan)
    }
}

pub struct RocksWriteTx {
    batch: WriteBatch,
}

impl WriteTransaction for RocksWriteTx {
    fn put(&mut self, key: &[u8], value: &[u8]) {
        self.batch
            .put(paths::combine(&paths::HEADER_HASHES, key), value);
    }
}

fn durability(err: rocksdb::Error) -> StoreError {
    StoreError::Durability {
        detail: err.to_string(),
    }
}
