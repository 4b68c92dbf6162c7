// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Modbus/TCP framing: MBAP header plus the two PDUs the gateway speaks,
//! Read Holding Registers (0x03) and Write Single Register (0x06).

use thiserror::Error;

/// Read Holding Registers.
pub const FC_READ_HOLDING: u8 = 0x03;
/// Write Single Register.
pub const FC_WRITE_SINGLE: u8 = 0x06;

/// MBAP header length on the wire.
pub const MBAP_LEN: usize = 7;
/// Protocol identifier for Modbus.
const PROTOCOL_ID: u16 = 0;
/// Upper bound on a response PDU we are willing to read (fc + byte count
/// + 125 registers).
pub const MAX_PDU_LEN: usize = 1 + 1 + 250;

/// Malformed or exceptional response frames.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("response truncated")]
    Truncated,
    #[error("bad protocol id {0}")]
    BadProtocol(u16),
    #[error("mismatched transaction id (sent {sent}, got {got})")]
    TransactionMismatch { sent: u16, got: u16 },
    #[error("unexpected function code {0:#04x}")]
    UnexpectedFunction(u8),
    #[error("device exception {code:#04x} ({name})")]
    Exception { code: u8, name: &'static str },
    #[error("response length {0} out of range")]
    BadLength(usize),
    #[error("register count {0} out of range")]
    BadCount(u16),
    #[error("write echo mismatch")]
    EchoMismatch,
}

/// Human name of a Modbus exception code.
pub fn exception_name(code: u8) -> &'static str {
    match code {
        0x01 => "illegal function",
        0x02 => "illegal data address",
        0x03 => "illegal data value",
        0x04 => "server device failure",
        0x05 => "acknowledge",
        0x06 => "server device busy",
        0x0A => "gateway path unavailable",
        0x0B => "gateway target failed to respond",
        _ => "unknown exception",
    }
}

fn mbap(txn_id: u16, unit_id: u8, pdu_len: usize) -> [u8; MBAP_LEN] {
    // Length field counts unit id + PDU.
    let len = (pdu_len + 1) as u16;
    let mut header = [0u8; MBAP_LEN];
    header[0..2].copy_from_slice(&txn_id.to_be_bytes());
    header[2..4].copy_from_slice(&PROTOCOL_ID.to_be_bytes());
    header[4..6].copy_from_slice(&len.to_be_bytes());
    header[6] = unit_id;
    header
}

/// Encode a Read Holding Registers request.
pub fn encode_read_holding(txn_id: u16, unit_id: u8, address: u16, count: u16) -> Vec<u8> {
    let mut frame = Vec::with_capacity(MBAP_LEN + 5);
    frame.extend_from_slice(&mbap(txn_id, unit_id, 5));
    frame.push(FC_READ_HOLDING);
    frame.extend_from_slice(&address.to_be_bytes());
    frame.extend_from_slice(&count.to_be_bytes());
    frame
}

/// Encode a Write Single Register request.
pub fn encode_write_single(txn_id: u16, unit_id: u8, address: u16, value: u16) -> Vec<u8> {
    let mut frame = Vec::with_capacity(MBAP_LEN + 5);
    frame.extend_from_slice(&mbap(txn_id, unit_id, 5));
    frame.push(FC_WRITE_SINGLE);
    frame.extend_from_slice(&address.to_be_bytes());
    frame.extend_from_slice(&value.to_be_bytes());
    frame
}

/// Parsed MBAP header of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub txn_id: u16,
    pub unit_id: u8,
    /// Bytes of PDU that follow the header.
    pub pdu_len: usize,
}

/// Decode the MBAP header of a response.
pub fn decode_mbap(header: &[u8; MBAP_LEN]) -> Result<ResponseHeader, FrameError> {
    let txn_id = u16::from_be_bytes([header[0], header[1]]);
    let protocol = u16::from_be_bytes([header[2], header[3]]);
    if protocol != PROTOCOL_ID {
        return Err(FrameError::BadProtocol(protocol));
    }
    let len = u16::from_be_bytes([header[4], header[5]]) as usize;
    if len < 2 || len - 1 > MAX_PDU_LEN {
        return Err(FrameError::BadLength(len));
    }
    Ok(ResponseHeader { txn_id, unit_id: header[6], pdu_len: len - 1 })
}

/// Check for an exception PDU (`fc | 0x80`).
fn check_function(pdu: &[u8], expected_fc: u8) -> Result<(), FrameError> {
    let fc = *pdu.first().ok_or(FrameError::Truncated)?;
    if fc == expected_fc | 0x80 {
        let code = *pdu.get(1).ok_or(FrameError::Truncated)?;
        return Err(FrameError::Exception { code, name: exception_name(code) });
    }
    if fc != expected_fc {
        return Err(FrameError::UnexpectedFunction(fc));
    }
    Ok(())
}

/// Decode a Read Holding Registers response PDU into register words.
pub fn decode_read_holding(pdu: &[u8], count: u16) -> Result<Vec<u16>, FrameError> {
    check_function(pdu, FC_READ_HOLDING)?;
    let byte_count = *pdu.get(1).ok_or(FrameError::Truncated)? as usize;
    if byte_count != usize::from(count) * 2 {
        return Err(FrameError::BadCount(count));
    }
    let data = pdu.get(2..2 + byte_count).ok_or(FrameError::Truncated)?;
    Ok(data.chunks_exact(2).map(|pair| u16::from_be_bytes([pair[0], pair[1]])).collect())
}

/// Decode a Write Single Register response (the request echoed back).
pub fn decode_write_single(pdu: &[u8], address: u16, value: u16) -> Result<(), FrameError> {
    check_function(pdu, FC_WRITE_SINGLE)?;
    let echoed_addr =
        u16::from_be_bytes([*pdu.get(1).ok_or(FrameError::Truncated)?, *pdu.get(2).ok_or(FrameError::Truncated)?]);
    let echoed_value =
        u16::from_be_bytes([*pdu.get(3).ok_or(FrameError::Truncated)?, *pdu.get(4).ok_or(FrameError::Truncated)?]);
    if echoed_addr != address || echoed_value != value {
        return Err(FrameError::EchoMismatch);
    }
    Ok(())
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
