// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Construction options for an RpcChannel, validated at `build()` time
// instead of threading positional arguments through the constructor.

use crate::error::{IpcError, Result};

pub const MIN_BUFFER_CAPACITY: u32 = 256;
pub const MAX_BUFFER_CAPACITY: u32 = 1_048_576;

/// Only framing version this crate speaks. Kept as an explicit option (rather
/// than a hardcoded constant) so `ChannelOptions` has a place to reject a
/// future V2 peer instead of silently misparsing its frames.
pub const PROTOCOL_VERSION: u8 = 1;

#[derive(Debug, Clone)]
pub struct ChannelOptions {
    pub(crate) name: String,
    pub(crate) buffer_capacity: u32,
    pub(crate) buffer_node_count: u32,
    pub(crate) receive_threads: usize,
    pub(crate) protocol_version: u8,
}

impl ChannelOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            buffer_capacity: 4096,
            buffer_node_count: 16,
            receive_threads: 1,
            protocol_version: PROTOCOL_VERSION,
        }
    }

    pub fn with_buffer_capacity(mut self, capacity: u32) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    pub fn with_buffer_node_count(mut self, count: u32) -> Self {
        self.buffer_node_count = count;
        self
    }

    /// Number of background receive-worker threads. Must be at least 2 if
    /// the handler issues nested `remote_request` calls on this channel,
    /// or all workers can end up blocked waiting on each other's replies.
    pub fn with_receive_threads(mut self, count: usize) -> Self {
        self.receive_threads = count;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(IpcError::OutOfRange("channel name must be non-empty".into()));
        }
        if !(MIN_BUFFER_CAPACITY..=MAX_BUFFER_CAPACITY).contains(&self.buffer_capacity) {
            return Err(IpcError::OutOfRange(format!(
                "buffer_capacity must be in [{MIN_BUFFER_CAPACITY}, {MAX_BUFFER_CAPACITY}], got {}",
                self.buffer_capacity
            )));
        }
        if self.buffer_node_count < 2 {
            return Err(IpcError::OutOfRange(format!(
                "buffer_node_count must be >= 2, got {}",
                self.buffer_node_count
            )));
        }
        if self.receive_threads < 1 {
            return Err(IpcError::OutOfRange("receive_threads must be >= 1".into()));
        }
        if self.protocol_version != PROTOCOL_VERSION {
            return Err(IpcError::OutOfRange(format!(
                "unsupported protocol_version {}, only {PROTOCOL_VERSION} is implemented",
                self.protocol_version
            )));
        }
        Ok(())
    }
}
