// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Crate-wide error taxonomy. Construction-time and resource-lifecycle
// failures use this type; per-request outcomes (timeout, handler error) are
// data (`RemoteReply`), not errors — see rpc.rs.

use thiserror::Error;

/// Errors raised by shared-memory region, ring, and RPC channel construction
/// and lifecycle operations.
#[derive(Debug, Error)]
pub enum IpcError {
    #[error("name already in use: {0}")]
    NameInUse(String),

    #[error("name not found: {0}")]
    NameNotFound(String),

    #[error("value out of range: {0}")]
    OutOfRange(String),

    #[error("channel or region has shut down")]
    Shutdown,

    #[error("handle already disposed")]
    AlreadyDisposed,

    #[error("handler raised an error: {0}")]
    HandlerFailure(String),

    #[error("malformed packet frame: {0}")]
    MalformedFrame(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IpcError>;
