// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Cross-process IPC toolkit built on named OS shared memory: a named shared
// memory region, a lock-free multi-producer/multi-consumer ring of
// fixed-size nodes, and a bidirectional request/response RPC channel on top.
// POSIX backs shared memory with shm_open + mmap and synchronization with
// PTHREAD_PROCESS_SHARED pthread primitives; Windows uses CreateFileMapping
// and kernel mutex/semaphore objects. Same naming scheme and wire framing on
// both platforms, so a channel opened from one process can be read by a peer
// compiled for either.

pub mod shm_name;

mod platform;
#[cfg(windows)]
pub use platform::IpcSemaphore;

mod shm;
pub use shm::{ShmHandle, ShmOpenMode};

mod mutex;
pub use mutex::IpcMutex;

mod condition;
pub use condition::IpcCondition;

mod waiter;
pub use waiter::Waiter;

mod spin_lock;
pub use spin_lock::SpinLock;

mod buffer;
pub use buffer::IpcBuffer;

mod error;
pub use error::{IpcError, Result};

mod region;
pub use region::SharedRegion;

mod packet;
pub use packet::{MsgType, PacketHeader};

mod stats;
pub use stats::{ChannelStats, ChannelStatsSnapshot};

mod ring;
pub use ring::Ring;

mod options;
pub use options::{ChannelOptions, MAX_BUFFER_CAPACITY, MIN_BUFFER_CAPACITY, PROTOCOL_VERSION};

mod rpc;
pub use rpc::{Handler, RemoteReply, RpcChannel};
