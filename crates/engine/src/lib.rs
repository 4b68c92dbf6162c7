// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sg-engine: the gateway's runtime services.
//!
//! Pollers read each PLC into the snapshot store and feed the alarm
//! engine; the command pipeline validates, persists, and executes write
//! commands per PLC in FIFO order; the broadcast hub fans events out to
//! subscribers; access filtering shapes every read that leaves the core.

pub mod alarms;
pub mod audit;
pub mod commands;
pub mod filter;
pub mod hub;
pub mod limiter;
pub mod poller;
pub mod snapshot;

pub use alarms::{
    AckTarget, AlarmEngine, AlarmError, CreateAlarmRequest, HistoryQuery, SetStateOutcome,
    SetStateParams,
};
pub use audit::{AuditSink, NoopAudit, TracingAudit};
pub use commands::executor::{CommandExecutor, CommandSettings};
pub use commands::service::{
    CommandError, CommandFilter, CommandPage, CommandService, CreateCommandRequest, CreateResult,
};
pub use filter::filtered_snapshot;
pub use hub::{BroadcastHub, Channel, SubscriberId, Subscription};
pub use limiter::{Limit, RateLimit, WindowLimiter};
pub use poller::{Poller, PollerSettings};
pub use snapshot::SnapshotStore;

#[cfg(any(test, feature = "test-support"))]
pub use audit::RecordingAudit;
