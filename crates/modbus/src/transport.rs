// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transport abstraction over Modbus/TCP connections.
//!
//! The device service is generic over [`ModbusTransport`] so tests run
//! against an in-memory register bank while production dials real PLCs.

use crate::frame::{self, FrameError, MBAP_LEN};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Errors from transport operations
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("connection refused by fake device")]
    Refused,
}

impl TransportError {
    /// Protocol-level failures leave the socket usable; everything else
    /// forces a reconnect.
    pub fn is_protocol(&self) -> bool {
        matches!(self, TransportError::Frame(FrameError::Exception { .. }))
    }
}

/// One live connection to a PLC.
#[async_trait]
pub trait ModbusConn: Send + Sync {
    async fn read_holding_registers(
        &mut self,
        unit_id: u8,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError>;

    async fn write_register(
        &mut self,
        unit_id: u8,
        address: u16,
        value: u16,
    ) -> Result<(), TransportError>;
}

/// Dials connections to PLC endpoints.
#[async_trait]
pub trait ModbusTransport: Clone + Send + Sync + 'static {
    type Conn: ModbusConn;

    async fn connect(&self, host: &str, port: u16) -> Result<Self::Conn, TransportError>;
}

/// Production transport over TCP with a per-request deadline.
#[derive(Clone, Debug)]
pub struct TcpTransport {
    timeout: Duration,
}

impl TcpTransport {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ModbusTransport for TcpTransport {
    type Conn = TcpConn;

    async fn connect(&self, host: &str, port: u16) -> Result<TcpConn, TransportError> {
        let addr = format!("{host}:{port}");
        let stream = tokio::time::timeout(self.timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| TransportError::Timeout(self.timeout))?
            .map_err(|e| TransportError::Connect(format!("{addr}: {e}")))?;
        stream.set_nodelay(true)?;
        Ok(TcpConn { stream, timeout: self.timeout, txn_id: 0 })
    }
}

/// A TCP connection with MBAP framing.
pub struct TcpConn {
    stream: TcpStream,
    timeout: Duration,
    txn_id: u16,
}

impl TcpConn {
    async fn round_trip(&mut self, request: &[u8], txn_id: u16) -> Result<Vec<u8>, TransportError> {
        let deadline = tokio::time::Instant::now() + self.timeout;

        tokio::time::timeout_at(deadline, self.stream.write_all(request))
            .await
            .map_err(|_| TransportError::Timeout(self.timeout))??;

        loop {
            let mut header = [0u8; MBAP_LEN];
            tokio::time::timeout_at(deadline, self.stream.read_exact(&mut header))
                .await
                .map_err(|_| TransportError::Timeout(self.timeout))??;
            let parsed = frame::decode_mbap(&header)?;

            let mut pdu = vec![0u8; parsed.pdu_len];
            tokio::time::timeout_at(deadline, self.stream.read_exact(&mut pdu))
                .await
                .map_err(|_| TransportError::Timeout(self.timeout))??;

            // A stale response from an abandoned request is drained, not
            // matched against the current transaction.
            if parsed.txn_id == txn_id {
                return Ok(pdu);
            }
            tracing::debug!(got = parsed.txn_id, want = txn_id, "dropping stale modbus response");
        }
    }

    fn next_txn(&mut self) -> u16 {
        self.txn_id = self.txn_id.wrapping_add(1);
        self.txn_id
    }
}

#[async_trait]
impl ModbusConn for TcpConn {
    async fn read_holding_registers(
        &mut self,
        unit_id: u8,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        let txn_id = self.next_txn();
        let request = frame::encode_read_holding(txn_id, unit_id, address, count);
        let pdu = self.round_trip(&request, txn_id).await?;
        Ok(frame::decode_read_holding(&pdu, count)?)
    }

    async fn write_register(
        &mut self,
        unit_id: u8,
        address: u16,
        value: u16,
    ) -> Result<(), TransportError> {
        let txn_id = self.next_txn();
        let request = frame::encode_write_single(txn_id, unit_id, address, value);
        let pdu = self.round_trip(&request, txn_id).await?;
        Ok(frame::decode_write_single(&pdu, address, value)?)
    }
}
