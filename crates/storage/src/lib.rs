// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sg-storage: durable runtime state for the gateway core.
//!
//! Commands and alarm records are persisted event-sourced: an append-only
//! JSONL write-ahead log plus a materialized state derived by replay. A
//! periodic checkpoint (zstd-compressed state snapshot) bounds replay time
//! and lets the WAL be truncated.

pub mod state;
pub mod store;
pub mod wal;

pub use state::MaterializedState;
pub use store::{Store, StoreError};
pub use wal::{Wal, WalEntry, WalError};
