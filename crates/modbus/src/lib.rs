// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sg-modbus: the Modbus/TCP device service.
//!
//! Holding-register I/O only (function codes 0x03 and 0x06): one
//! persistent connection per configured PLC, all I/O to a PLC serialized
//! behind its lock, lazy reconnect with throttled backoff, retry with
//! exponential backoff, and per-PLC health accounting.

pub mod device;
pub mod frame;
pub mod transport;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use device::{DeviceError, DeviceGuard, DeviceService, ModbusSettings, PlcEndpoint, PlcHealth};
pub use frame::FrameError;
pub use transport::{ModbusConn, ModbusTransport, TcpTransport, TransportError};

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeOp, FakeOpKind, FakeTransport};
