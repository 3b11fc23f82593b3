// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// V1 packet framing header: 64 bytes, little-endian, no inter-field padding.

use crate::error::{IpcError, Result};

pub const HEADER_SIZE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgType {
    Request = 1,
    Response = 2,
    Error = 3,
}

impl MsgType {
    fn from_u8(v: u8) -> Result<Self> {
        match v {
            1 => Ok(MsgType::Request),
            2 => Ok(MsgType::Response),
            3 => Ok(MsgType::Error),
            other => Err(IpcError::MalformedFrame(format!("unknown msg_type {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PacketHeader {
    pub msg_type: MsgType,
    pub msg_id: u64,
    pub payload_size: u32,
    pub current_packet: u16,
    pub total_packets: u16,
    pub response_id: u64,
}

impl PacketHeader {
    pub fn encode(&self, out: &mut [u8; HEADER_SIZE]) {
        out.fill(0);
        out[0] = self.msg_type as u8;
        out[1..9].copy_from_slice(&self.msg_id.to_le_bytes());
        out[9..13].copy_from_slice(&self.payload_size.to_le_bytes());
        out[13..15].copy_from_slice(&self.current_packet.to_le_bytes());
        out[15..17].copy_from_slice(&self.total_packets.to_le_bytes());
        out[17..25].copy_from_slice(&self.response_id.to_le_bytes());
        // bytes 25..64 stay zero (reserved)
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(IpcError::MalformedFrame(format!(
                "packet shorter than header: {} bytes",
                buf.len()
            )));
        }
        let msg_type = MsgType::from_u8(buf[0])?;
        let msg_id = u64::from_le_bytes(buf[1..9].try_into().unwrap());
        let payload_size = u32::from_le_bytes(buf[9..13].try_into().unwrap());
        let current_packet = u16::from_le_bytes(buf[13..15].try_into().unwrap());
        let total_packets = u16::from_le_bytes(buf[15..17].try_into().unwrap());
        let response_id = u64::from_le_bytes(buf[17..25].try_into().unwrap());
        if total_packets == 0 || current_packet == 0 || current_packet > total_packets {
            return Err(IpcError::MalformedFrame(format!(
                "invalid packet indices {current_packet}/{total_packets}"
            )));
        }
        Ok(Self {
            msg_type,
            msg_id,
            payload_size,
            current_packet,
            total_packets,
            response_id,
        })
    }
}
