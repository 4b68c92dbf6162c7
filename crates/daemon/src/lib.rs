// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sg-daemon: the gateway composition root.
//!
//! Loads the TOML configuration, builds the four long-lived singletons
//! (device service, snapshot store, command executor, alarm engine)
//! without performing I/O, and exposes the operations external
//! transports call. All network and disk work starts in `start()`;
//! shutdown is bounded so supervisor restarts stay reliable.

pub mod config;
pub mod gateway;

pub use config::{ConfigFileError, GatewayConfig};
pub use gateway::{Gateway, GatewayError};
