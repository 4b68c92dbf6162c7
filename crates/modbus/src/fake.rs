// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory Modbus transport for tests: a register bank per endpoint,
//! failure injection, and an ordered operation log.

use crate::transport::{ModbusConn, ModbusTransport, TransportError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Kind of a recorded operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeOpKind {
    Read,
    Write,
}

/// One recorded register operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeOp {
    pub endpoint: String,
    pub kind: FakeOpKind,
    pub address: u16,
    pub count: u16,
    pub value: Option<u16>,
}

#[derive(Default)]
struct FakeDevice {
    registers: HashMap<u16, u16>,
    refuse_connections: bool,
    fail_requests: u32,
    connect_count: u32,
}

#[derive(Default)]
struct FakeState {
    devices: HashMap<String, FakeDevice>,
    ops: Vec<FakeOp>,
}

/// Fake transport backed by shared in-memory register banks.
///
/// Endpoints are keyed by `host:port`; connections to unknown endpoints
/// succeed against an empty bank.
#[derive(Clone, Default)]
pub struct FakeTransport {
    state: Arc<Mutex<FakeState>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(host: &str, port: u16) -> String {
        format!("{host}:{port}")
    }

    pub fn set_register(&self, host: &str, port: u16, address: u16, value: u16) {
        let mut state = self.state.lock();
        state.devices.entry(Self::key(host, port)).or_default().registers.insert(address, value);
    }

    pub fn register(&self, host: &str, port: u16, address: u16) -> u16 {
        let state = self.state.lock();
        state
            .devices
            .get(&Self::key(host, port))
            .and_then(|d| d.registers.get(&address).copied())
            .unwrap_or(0)
    }

    /// Refuse (or stop refusing) new connections to an endpoint.
    pub fn refuse_connections(&self, host: &str, port: u16, refuse: bool) {
        let mut state = self.state.lock();
        state.devices.entry(Self::key(host, port)).or_default().refuse_connections = refuse;
    }

    /// Fail the next `n` requests on an endpoint with an I/O error.
    pub fn fail_requests(&self, host: &str, port: u16, n: u32) {
        let mut state = self.state.lock();
        state.devices.entry(Self::key(host, port)).or_default().fail_requests = n;
    }

    /// How many times an endpoint has been dialed.
    pub fn connect_count(&self, host: &str, port: u16) -> u32 {
        let state = self.state.lock();
        state.devices.get(&Self::key(host, port)).map(|d| d.connect_count).unwrap_or(0)
    }

    /// Every register operation performed, in global order.
    pub fn ops(&self) -> Vec<FakeOp> {
        self.state.lock().ops.clone()
    }

    /// Write operations performed against one endpoint, in order.
    pub fn writes_for(&self, host: &str, port: u16) -> Vec<FakeOp> {
        let key = Self::key(host, port);
        self.state
            .lock()
            .ops
            .iter()
            .filter(|op| op.kind == FakeOpKind::Write && op.endpoint == key)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ModbusTransport for FakeTransport {
    type Conn = FakeConn;

    async fn connect(&self, host: &str, port: u16) -> Result<FakeConn, TransportError> {
        let key = Self::key(host, port);
        let mut state = self.state.lock();
        let device = state.devices.entry(key.clone()).or_default();
        device.connect_count += 1;
        if device.refuse_connections {
            return Err(TransportError::Refused);
        }
        Ok(FakeConn { state: Arc::clone(&self.state), key })
    }
}

/// A connection handle into the shared fake state.
pub struct FakeConn {
    state: Arc<Mutex<FakeState>>,
    key: String,
}

impl FakeConn {
    fn take_failure(&self, state: &mut FakeState) -> bool {
        let device = state.devices.entry(self.key.clone()).or_default();
        if device.fail_requests > 0 {
            device.fail_requests -= 1;
            return true;
        }
        false
    }
}

#[async_trait]
impl ModbusConn for FakeConn {
    async fn read_holding_registers(
        &mut self,
        _unit_id: u8,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        let mut state = self.state.lock();
        if self.take_failure(&mut state) {
            return Err(TransportError::Io(std::io::Error::other("injected read failure")));
        }
        state.ops.push(FakeOp {
            endpoint: self.key.clone(),
            kind: FakeOpKind::Read,
            address,
            count,
            value: None,
        });
        let device = state.devices.entry(self.key.clone()).or_default();
        Ok((0..count)
            .map(|i| device.registers.get(&(address + i)).copied().unwrap_or(0))
            .collect())
    }

    async fn write_register(
        &mut self,
        _unit_id: u8,
        address: u16,
        value: u16,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if self.take_failure(&mut state) {
            return Err(TransportError::Io(std::io::Error::other("injected write failure")));
        }
        state.ops.push(FakeOp {
            endpoint: self.key.clone(),
            kind: FakeOpKind::Write,
            address,
            count: 1,
            value: Some(value),
        });
        let device = state.devices.entry(self.key.clone()).or_default();
        device.registers.insert(address, value);
        Ok(())
    }
}
