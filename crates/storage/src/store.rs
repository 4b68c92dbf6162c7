// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The store: checkpoint + WAL replay on open, a single commit lock for
//! transactional writes, and periodic checkpointing.
//!
//! `transact` is the gateway's equivalent of a DB transaction: the caller
//! reads current state, decides, and returns record-write events, all
//! under one lock. Events are made durable before they are applied, so a
//! crash can lose an in-flight transaction but never half of one.

use crate::state::MaterializedState;
use crate::wal::{Wal, WalError};
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use sg_core::Event;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

const WAL_FILE: &str = "events.wal";
const CHECKPOINT_FILE: &str = "state.zst";
const CHECKPOINT_TMP: &str = "state.zst.tmp";
const ZSTD_LEVEL: i32 = 3;

/// Errors from store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Wal(#[from] WalError),
    #[error("checkpoint decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Serialize, Deserialize)]
struct Checkpoint {
    seq: u64,
    state: MaterializedState,
}

/// Durable runtime state with transactional commits.
pub struct Store {
    dir: PathBuf,
    state: Mutex<MaterializedState>,
    wal: Mutex<Wal>,
}

impl Store {
    /// Open the store in `dir`: load the checkpoint if present, then
    /// replay WAL entries past it.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir)?;

        let (mut state, checkpoint_seq) = match read_checkpoint(&dir.join(CHECKPOINT_FILE))? {
            Some(checkpoint) => (checkpoint.state, checkpoint.seq),
            None => (MaterializedState::default(), 0),
        };

        let wal = Wal::open(&dir.join(WAL_FILE))?;
        let replayed = wal.entries_after(checkpoint_seq)?;
        let replay_count = replayed.len();
        for entry in replayed {
            state.apply_event(&entry.event);
        }
        tracing::info!(
            dir = %dir.display(),
            checkpoint_seq,
            replayed = replay_count,
            commands = state.commands.len(),
            occurrences = state.occurrences.len(),
            "store opened"
        );

        Ok(Self { dir: dir.to_path_buf(), state: Mutex::new(state), wal: Mutex::new(wal) })
    }

    /// Read access to the materialized state.
    ///
    /// The guard blocks writers; hold it only for short queries.
    pub fn read(&self) -> MutexGuard<'_, MaterializedState> {
        self.state.lock()
    }

    /// Run a transaction: read state, decide, return events to commit.
    ///
    /// Events returned by the closure are appended to the WAL and flushed
    /// before they are applied to state, all under the state lock. If the
    /// closure returns no events the transaction is a pure read.
    pub fn transact<T>(
        &self,
        f: impl FnOnce(&mut MaterializedState) -> (Vec<Event>, T),
    ) -> Result<T, StoreError> {
        let mut state = self.state.lock();
        let (events, out) = f(&mut state);
        if events.is_empty() {
            return Ok(out);
        }

        {
            let mut wal = self.wal.lock();
            for event in &events {
                wal.append(event)?;
            }
            wal.flush()?;
        }
        for event in &events {
            state.apply_event(event);
        }
        Ok(out)
    }

    /// Write a checkpoint of the current state and truncate the WAL up to
    /// it. Replay after restart then starts from this point.
    pub fn checkpoint(&self) -> Result<(), StoreError> {
        let state = self.state.lock();
        let mut wal = self.wal.lock();
        wal.flush()?;
        let seq = wal.write_seq();

        let checkpoint = Checkpoint { seq, state: state.clone() };
        drop(state);

        let tmp = self.dir.join(CHECKPOINT_TMP);
        let path = self.dir.join(CHECKPOINT_FILE);
        {
            let file = std::fs::File::create(&tmp)?;
            let mut encoder = zstd::Encoder::new(file, ZSTD_LEVEL)?;
            let json = serde_json::to_vec(&checkpoint)?;
            encoder.write_all(&json)?;
            let file = encoder.finish()?;
            file.sync_data()?;
        }
        std::fs::rename(&tmp, &path)?;

        wal.truncate_before(seq + 1)?;
        tracing::debug!(seq, "checkpoint written");
        Ok(())
    }
}

fn read_checkpoint(path: &Path) -> Result<Option<Checkpoint>, StoreError> {
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut decoder = zstd::Decoder::new(file)?;
    let mut json = Vec::new();
    decoder.read_to_end(&mut json)?;
    Ok(Some(serde_json::from_slice(&json)?))
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
