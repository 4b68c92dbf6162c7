// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The device service: per-PLC connection ownership, serialization,
//! reconnect, retry, and health accounting.
//!
//! All I/O to one PLC goes through its lock, so a read-modify-write bit
//! set can never tear against a concurrent polling read. Sockets are
//! owned here and nowhere else.

use crate::transport::{ModbusConn, ModbusTransport, TransportError};
use parking_lot::Mutex;
use serde::Serialize;
use sg_core::{Clock, Plc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Modbus service tuning.
#[derive(Debug, Clone)]
pub struct ModbusSettings {
    pub timeout: Duration,
    pub retries: u32,
    pub backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for ModbusSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3),
            retries: 2,
            backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
        }
    }
}

/// One configured Modbus/TCP endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlcEndpoint {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub unit_id: u8,
}

impl From<&Plc> for PlcEndpoint {
    fn from(plc: &Plc) -> Self {
        Self {
            name: plc.name.clone(),
            host: plc.host.clone(),
            port: plc.port,
            unit_id: plc.unit_id,
        }
    }
}

/// Read-only health state for one PLC.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlcHealth {
    pub connected: bool,
    pub last_ok_ms: Option<u64>,
    pub last_error: Option<String>,
    pub last_error_ms: Option<u64>,
    pub consecutive_failures: u32,
}

/// Errors from device operations
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("plc '{0}' is not registered")]
    UnknownPlc(String),
    #[error("failed to connect to plc '{plc}'")]
    Connect { plc: String },
    #[error("{op} failed for plc '{plc}': {source}")]
    Request { plc: String, op: &'static str, source: TransportError },
    #[error("write verify mismatch on plc '{plc}' at offset {address}")]
    VerifyMismatch { plc: String, address: u16, bit: Option<u8> },
    #[error("bit {0} is outside 0..=15")]
    InvalidBit(u8),
}

struct Device<T: ModbusTransport> {
    endpoint: PlcEndpoint,
    conn: tokio::sync::Mutex<Option<T::Conn>>,
    health: Mutex<PlcHealth>,
}

/// Central Modbus I/O service.
///
/// Construction performs no I/O; connections are dialed lazily on first
/// use and redialed (with a failure-count throttle) after errors.
pub struct DeviceService<T: ModbusTransport, C: Clock> {
    transport: T,
    clock: C,
    settings: ModbusSettings,
    devices: HashMap<String, Arc<Device<T>>>,
}

impl<T: ModbusTransport, C: Clock> DeviceService<T, C> {
    pub fn new(
        transport: T,
        clock: C,
        settings: ModbusSettings,
        endpoints: impl IntoIterator<Item = PlcEndpoint>,
    ) -> Self {
        let devices = endpoints
            .into_iter()
            .map(|endpoint| {
                let device = Arc::new(Device {
                    endpoint: endpoint.clone(),
                    conn: tokio::sync::Mutex::new(None),
                    health: Mutex::new(PlcHealth::default()),
                });
                (endpoint.name, device)
            })
            .collect::<HashMap<_, _>>();
        tracing::info!(plcs = devices.len(), "device service initialized");
        Self { transport, clock, settings, devices }
    }

    pub fn plc_names(&self) -> Vec<String> {
        self.devices.keys().cloned().collect()
    }

    pub fn settings(&self) -> &ModbusSettings {
        &self.settings
    }

    /// Health for every PLC, keyed by name.
    pub fn health_snapshot(&self) -> BTreeMap<String, PlcHealth> {
        self.devices
            .iter()
            .map(|(name, device)| (name.clone(), device.health.lock().clone()))
            .collect()
    }

    /// Acquire the per-PLC lock for a composed multi-step sequence.
    ///
    /// All single-shot operations below take this lock internally; hold
    /// it directly when a read-modify-write must be atomic.
    pub async fn lock(&self, plc: &str) -> Result<DeviceGuard<'_, T, C>, DeviceError> {
        let device =
            self.devices.get(plc).ok_or_else(|| DeviceError::UnknownPlc(plc.to_string()))?;
        let conn = device.conn.lock().await;
        Ok(DeviceGuard { service: self, device, conn })
    }

    pub async fn read_holding_registers(
        &self,
        plc: &str,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, DeviceError> {
        self.lock(plc).await?.read_holding_registers(address, count).await
    }

    pub async fn read_register(&self, plc: &str, address: u16) -> Result<u16, DeviceError> {
        self.lock(plc).await?.read_register(address).await
    }

    pub async fn read_bit_from_register(
        &self,
        plc: &str,
        address: u16,
        bit: u8,
    ) -> Result<bool, DeviceError> {
        self.lock(plc).await?.read_bit(address, bit).await
    }

    pub async fn write_register(
        &self,
        plc: &str,
        address: u16,
        value: u16,
        verify: bool,
    ) -> Result<(), DeviceError> {
        self.lock(plc).await?.write_register(address, value, verify).await
    }

    /// Atomic read-modify-write of one bit under the per-PLC lock.
    pub async fn write_bit_in_register(
        &self,
        plc: &str,
        address: u16,
        bit: u8,
        value: bool,
        verify: bool,
    ) -> Result<(), DeviceError> {
        self.lock(plc).await?.write_bit(address, bit, value, verify).await
    }

    /// Drop every connection; the next operation reconnects.
    pub async fn close_all(&self) {
        for device in self.devices.values() {
            device.conn.lock().await.take();
            device.health.lock().connected = false;
        }
        tracing::info!("device service connections closed");
    }
}

enum Op {
    Read { address: u16, count: u16 },
    Write { address: u16, value: u16 },
}

impl Op {
    fn name(&self) -> &'static str {
        match self {
            Op::Read { .. } => "read_holding_registers",
            Op::Write { .. } => "write_register",
        }
    }
}

/// Exclusive access to one PLC, holding its I/O lock.
pub struct DeviceGuard<'a, T: ModbusTransport, C: Clock> {
    service: &'a DeviceService<T, C>,
    device: &'a Device<T>,
    conn: tokio::sync::MutexGuard<'a, Option<T::Conn>>,
}

impl<T: ModbusTransport, C: Clock> DeviceGuard<'_, T, C> {
    pub async fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, DeviceError> {
        match self.execute(Op::Read { address, count }).await? {
            OpOutput::Registers(words) => Ok(words),
            OpOutput::Written => Err(self.request_error("read_holding_registers")),
        }
    }

    pub async fn read_register(&mut self, address: u16) -> Result<u16, DeviceError> {
        let words = self.read_holding_registers(address, 1).await?;
        words.first().copied().ok_or_else(|| self.request_error("read_register"))
    }

    pub async fn read_bit(&mut self, address: u16, bit: u8) -> Result<bool, DeviceError> {
        if bit > 15 {
            return Err(DeviceError::InvalidBit(bit));
        }
        let word = self.read_register(address).await?;
        Ok(word & (1 << bit) != 0)
    }

    pub async fn write_register(
        &mut self,
        address: u16,
        value: u16,
        verify: bool,
    ) -> Result<(), DeviceError> {
        match self.execute(Op::Write { address, value }).await? {
            OpOutput::Written => {}
            OpOutput::Registers(_) => return Err(self.request_error("write_register")),
        }
        if verify {
            let after = self.read_register(address).await?;
            if after != value {
                return Err(DeviceError::VerifyMismatch {
                    plc: self.device.endpoint.name.clone(),
                    address,
                    bit: None,
                });
            }
        }
        Ok(())
    }

    /// Read-modify-write one bit. The guard already serializes against
    /// concurrent polling, so the sequence cannot tear.
    pub async fn write_bit(
        &mut self,
        address: u16,
        bit: u8,
        value: bool,
        verify: bool,
    ) -> Result<(), DeviceError> {
        if bit > 15 {
            return Err(DeviceError::InvalidBit(bit));
        }

        let current = self.read_register(address).await?;
        let new_value = if value { current | (1 << bit) } else { current & !(1 << bit) };
        self.write_register(address, new_value, false).await?;

        if verify {
            let after = self.read_bit(address, bit).await?;
            if after != value {
                return Err(DeviceError::VerifyMismatch {
                    plc: self.device.endpoint.name.clone(),
                    address,
                    bit: Some(bit),
                });
            }
        }
        Ok(())
    }

    fn request_error(&self, op: &'static str) -> DeviceError {
        DeviceError::Request {
            plc: self.device.endpoint.name.clone(),
            op,
            source: TransportError::Frame(crate::frame::FrameError::Truncated),
        }
    }

    /// Run one operation with reconnect and retry-with-backoff.
    async fn execute(&mut self, op: Op) -> Result<OpOutput, DeviceError> {
        let retries = self.service.settings.retries;
        let plc = self.device.endpoint.name.clone();

        let mut attempt = 0u32;
        loop {
            if !self.ensure_connected().await {
                if attempt < retries {
                    self.sleep_backoff(attempt).await;
                    attempt += 1;
                    continue;
                }
                return Err(DeviceError::Connect { plc });
            }

            let Some(conn) = self.conn.as_mut() else {
                return Err(DeviceError::Connect { plc });
            };
            let unit_id = self.device.endpoint.unit_id;
            let result = match &op {
                Op::Read { address, count } => conn
                    .read_holding_registers(unit_id, *address, *count)
                    .await
                    .map(OpOutput::Registers),
                Op::Write { address, value } => {
                    conn.write_register(unit_id, *address, *value).await.map(|()| OpOutput::Written)
                }
            };

            match result {
                Ok(output) => {
                    self.mark_ok();
                    return Ok(output);
                }
                Err(source) => {
                    self.mark_error(op.name(), &source);
                    // Close the socket so the next attempt reconnects
                    self.conn.take();
                    if attempt < retries {
                        self.sleep_backoff(attempt).await;
                        attempt += 1;
                        continue;
                    }
                    tracing::warn!(plc = %plc, op = op.name(), error = %source, "device request failed");
                    return Err(DeviceError::Request { plc, op: op.name(), source });
                }
            }
        }
    }

    /// Lazily connect, throttled while the endpoint keeps failing.
    async fn ensure_connected(&mut self) -> bool {
        if self.conn.is_some() {
            return true;
        }

        {
            let health = self.device.health.lock();
            if health.consecutive_failures > 0 {
                if let Some(last_error_ms) = health.last_error_ms {
                    let exponent = health.consecutive_failures.min(5);
                    let wait = backoff_delay(&self.service.settings, exponent);
                    let since = self.service.clock.epoch_ms().saturating_sub(last_error_ms);
                    if since < wait.as_millis() as u64 {
                        return false;
                    }
                }
            }
        }

        match self
            .service
            .transport
            .connect(&self.device.endpoint.host, self.device.endpoint.port)
            .await
        {
            Ok(conn) => {
                *self.conn = Some(conn);
                self.device.health.lock().connected = true;
                tracing::debug!(plc = %self.device.endpoint.name, "connected");
                true
            }
            Err(e) => {
                self.mark_error("connect", &e);
                false
            }
        }
    }

    async fn sleep_backoff(&self, attempt: u32) {
        tokio::time::sleep(backoff_delay(&self.service.settings, attempt)).await;
    }

    fn mark_ok(&self) {
        let mut health = self.device.health.lock();
        health.connected = true;
        health.last_ok_ms = Some(self.service.clock.epoch_ms());
        health.last_error = None;
        health.last_error_ms = None;
        health.consecutive_failures = 0;
    }

    fn mark_error(&self, op: &str, error: &TransportError) {
        let mut health = self.device.health.lock();
        health.connected = false;
        health.last_error = Some(format!("{op}: {error}"));
        health.last_error_ms = Some(self.service.clock.epoch_ms());
        health.consecutive_failures += 1;
    }
}

enum OpOutput {
    Registers(Vec<u16>),
    Written,
}

/// `base · 2^attempt`, capped at `max_backoff`.
fn backoff_delay(settings: &ModbusSettings, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt);
    settings.backoff.saturating_mul(factor).min(settings.max_backoff)
}

#[cfg(test)]
#[path = "device_tests.rs"]
mod tests;
