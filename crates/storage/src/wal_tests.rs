// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use sg_core::{Command, CommandStatus, Event};
use tempfile::tempdir;

fn test_event(id: &str) -> Event {
    Event::CommandUpdated {
        command_id: id.into(),
        status: CommandStatus::Executing,
        attempts: 1,
        error: None,
        updated_at_ms: 1,
    }
}

fn event_command_id(event: &Event) -> &str {
    match event {
        Event::CommandUpdated { command_id, .. } => command_id.as_str(),
        _ => panic!("expected CommandUpdated"),
    }
}

#[test]
fn open_creates_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");

    let wal = Wal::open(&path).unwrap();

    assert!(path.exists());
    assert_eq!(wal.write_seq(), 0);
}

#[test]
fn append_assigns_increasing_seqs() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");

    let mut wal = Wal::open(&path).unwrap();
    let seq1 = wal.append(&test_event("cmd-1")).unwrap();
    let seq2 = wal.append(&test_event("cmd-2")).unwrap();

    assert_eq!(seq1, 1);
    assert_eq!(seq2, 2);

    wal.flush().unwrap();
    assert!(std::fs::metadata(&path).unwrap().len() > 0);
}

#[test]
fn entries_after_filters_by_seq() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");

    let mut wal = Wal::open(&path).unwrap();
    wal.append(&test_event("cmd-1")).unwrap();
    wal.append(&test_event("cmd-2")).unwrap();
    wal.append(&test_event("cmd-3")).unwrap();
    wal.flush().unwrap();

    let entries = wal.entries_after(1).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].seq, 2);
    assert_eq!(entries[1].seq, 3);
}

#[test]
fn reopen_resumes_the_sequence() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");

    {
        let mut wal = Wal::open(&path).unwrap();
        wal.append(&test_event("cmd-1")).unwrap();
        wal.append(&test_event("cmd-2")).unwrap();
        wal.flush().unwrap();
    }

    let mut wal = Wal::open(&path).unwrap();
    assert_eq!(wal.write_seq(), 2);
    let seq = wal.append(&test_event("cmd-3")).unwrap();
    assert_eq!(seq, 3);
}

#[test]
fn truncate_before_drops_old_entries() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");

    let mut wal = Wal::open(&path).unwrap();
    wal.append(&test_event("cmd-1")).unwrap();
    wal.append(&test_event("cmd-2")).unwrap();
    wal.append(&test_event("cmd-3")).unwrap();
    wal.truncate_before(2).unwrap();

    let entries = wal.entries_after(0).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].seq, 2);
    assert_eq!(entries[1].seq, 3);

    // Appending still continues the original sequence
    assert_eq!(wal.append(&test_event("cmd-4")).unwrap(), 4);
}

#[test]
fn corrupt_tail_rotates_to_bak_and_preserves_valid_entries() {
    use std::io::Write;

    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");

    {
        let mut wal = Wal::open(&path).unwrap();
        wal.append(&test_event("cmd-1")).unwrap();
        wal.append(&test_event("cmd-2")).unwrap();
        wal.flush().unwrap();
    }
    {
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"not-valid-json\n").unwrap();
    }

    let wal = Wal::open(&path).unwrap();
    assert_eq!(wal.write_seq(), 2);
    assert!(path.with_extension("bak").exists());

    let entries = wal.entries_after(0).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(event_command_id(&entries[0].event), "cmd-1");
    assert_eq!(event_command_id(&entries[1].event), "cmd-2");
}

#[test]
fn binary_garbage_is_treated_as_corruption() {
    use std::io::Write;

    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");

    {
        let mut wal = Wal::open(&path).unwrap();
        wal.append(&test_event("cmd-1")).unwrap();
        wal.flush().unwrap();
    }
    {
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"\x80\x81\x82\xff\xfe\n").unwrap();
    }

    let wal = Wal::open(&path).unwrap();
    assert_eq!(wal.write_seq(), 1);
    assert!(path.with_extension("bak").exists());
}

#[test]
fn fully_corrupt_file_opens_empty() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");
    std::fs::write(&path, b"\x80\x81\x82\xff\xfe\n").unwrap();

    let wal = Wal::open(&path).unwrap();
    assert_eq!(wal.write_seq(), 0);
    assert!(path.with_extension("bak").exists());
}

#[test]
fn full_command_rows_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.wal");

    let command = Command::builder().plc_name("P7").build();
    let mut wal = Wal::open(&path).unwrap();
    wal.append(&Event::CommandCreated { command: command.clone() }).unwrap();
    wal.flush().unwrap();

    let entries = wal.entries_after(0).unwrap();
    assert_eq!(entries.len(), 1);
    match &entries[0].event {
        Event::CommandCreated { command: read } => assert_eq!(read, &command),
        other => panic!("unexpected event {other:?}"),
    }
}
