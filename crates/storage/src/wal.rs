// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only JSONL write-ahead log.
//!
//! One JSON object per line: `{"seq": N, "event": {...}}`. Sequence
//! numbers are assigned on append and strictly increase. A corrupt tail
//! (partial write, binary garbage) is detected on open: valid entries are
//! preserved, the damaged file is rotated to `.bak`, and a clean log is
//! rewritten.

use serde::{Deserialize, Serialize};
use sg_core::Event;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from WAL operations
#[derive(Debug, Error)]
pub enum WalError {
    #[error("wal io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("wal encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One persisted log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalEntry {
    pub seq: u64,
    pub event: Event,
}

/// The write-ahead log for one store directory.
pub struct Wal {
    path: PathBuf,
    writer: BufWriter<File>,
    write_seq: u64,
}

impl Wal {
    /// Open (or create) the log at `path`, recovering from a corrupt tail.
    pub fn open(path: &Path) -> Result<Self, WalError> {
        let (entries, corrupt) = read_entries(path)?;
        let write_seq = entries.last().map(|e| e.seq).unwrap_or(0);

        if corrupt {
            tracing::warn!(
                path = %path.display(),
                recovered = entries.len(),
                "wal tail is corrupt, rotating to .bak"
            );
            rotate_to_bak(path)?;
            rewrite(path, &entries)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { path: path.to_path_buf(), writer: BufWriter::new(file), write_seq })
    }

    /// Highest sequence number written so far.
    pub fn write_seq(&self) -> u64 {
        self.write_seq
    }

    /// Append an event, assigning the next sequence number.
    ///
    /// The entry is buffered; call [`Wal::flush`] to make it durable.
    pub fn append(&mut self, event: &Event) -> Result<u64, WalError> {
        let seq = self.write_seq + 1;
        let entry = WalEntry { seq, event: event.clone() };
        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');
        self.writer.write_all(&line)?;
        self.write_seq = seq;
        Ok(seq)
    }

    /// Flush buffered entries to the OS and sync file contents.
    pub fn flush(&mut self) -> Result<(), WalError> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        Ok(())
    }

    /// All entries with `seq > after`, stopping at any corruption.
    pub fn entries_after(&self, after: u64) -> Result<Vec<WalEntry>, WalError> {
        let (entries, _) = read_entries(&self.path)?;
        Ok(entries.into_iter().filter(|e| e.seq > after).collect())
    }

    /// Drop entries with `seq < before` (after a checkpoint covers them).
    pub fn truncate_before(&mut self, before: u64) -> Result<(), WalError> {
        self.flush()?;
        let (entries, _) = read_entries(&self.path)?;
        let kept: Vec<WalEntry> = entries.into_iter().filter(|e| e.seq >= before).collect();
        rewrite(&self.path, &kept)?;
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        Ok(())
    }
}

/// Read entries until EOF or the first corrupt line. Returns the entries
/// plus whether corruption was seen.
fn read_entries(path: &Path) -> Result<(Vec<WalEntry>, bool), WalError> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((Vec::new(), false)),
        Err(e) => return Err(e.into()),
    };

    let mut entries = Vec::new();
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let n = reader.read_until(b'\n', &mut buf)?;
        if n == 0 {
            return Ok((entries, false));
        }
        let line = match std::str::from_utf8(&buf) {
            Ok(s) => s.trim(),
            Err(_) => return Ok((entries, true)),
        };
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<WalEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(_) => return Ok((entries, true)),
        }
    }
}

fn rotate_to_bak(path: &Path) -> Result<(), WalError> {
    let bak = path.with_extension("bak");
    match std::fs::rename(path, &bak) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn rewrite(path: &Path, entries: &[WalEntry]) -> Result<(), WalError> {
    let tmp = path.with_extension("tmp");
    {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        for entry in entries {
            let mut line = serde_json::to_vec(entry)?;
            line.push(b'\n');
            writer.write_all(&line)?;
        }
        writer.flush()?;
        writer.get_ref().sync_data()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod tests;
