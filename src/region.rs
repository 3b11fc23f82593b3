// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Named shared memory region with a small self-describing header:
// total size (8 bytes), a shutdown flag (4 bytes), and reserved padding
// (4 bytes). Everything past the header is handed to callers via
// `raw_base()` for their own layout (a Ring, in this crate's case).

use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{IpcError, Result};
use crate::shm::{ShmHandle, ShmOpenMode};

const HEADER_SIZE: usize = 16;

#[repr(C)]
struct Header {
    shared_memory_size: std::sync::atomic::AtomicU64,
    shutdown: AtomicU32,
    _padding: u32,
}

const _: () = assert!(std::mem::size_of::<Header>() == HEADER_SIZE);

/// A named cross-process memory region with a shutdown flag.
///
/// The owner creates it with [`SharedRegion::create`]; peers discover its
/// actual size and map it with [`SharedRegion::open`].
pub struct SharedRegion {
    shm: ShmHandle,
    payload_size: usize,
}

impl SharedRegion {
    pub fn create(name: &str, payload_size: usize) -> Result<Self> {
        let shm = ShmHandle::acquire(name, HEADER_SIZE + payload_size, ShmOpenMode::Create)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    IpcError::NameInUse(name.to_string())
                } else {
                    IpcError::Io(e)
                }
            })?;
        let region = Self { shm, payload_size };
        region.header().shared_memory_size.store(
            (HEADER_SIZE + payload_size) as u64,
            Ordering::Relaxed,
        );
        region.header().shutdown.store(0, Ordering::Relaxed);
        Ok(region)
    }

    pub fn open(name: &str) -> Result<Self> {
        let shm = ShmHandle::acquire(name, 0, ShmOpenMode::Open).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                IpcError::NameNotFound(name.to_string())
            } else {
                IpcError::Io(e)
            }
        })?;
        let total = shm.user_size();
        if total < HEADER_SIZE {
            return Err(IpcError::MalformedFrame(format!(
                "shared region {name} is smaller than the header"
            )));
        }
        Ok(Self {
            shm,
            payload_size: total - HEADER_SIZE,
        })
    }

    fn header(&self) -> &Header {
        unsafe { &*(self.shm.get() as *const Header) }
    }

    /// Pointer to the first byte past the header.
    pub fn raw_base(&self) -> *mut u8 {
        unsafe { self.shm.get().add(HEADER_SIZE) }
    }

    pub fn payload_size(&self) -> usize {
        self.payload_size
    }

    pub fn mark_shutdown(&self) {
        self.header().shutdown.store(1, Ordering::Release);
    }

    pub fn is_shutdown(&self) -> bool {
        self.header().shutdown.load(Ordering::Acquire) != 0
    }

    pub fn clear_storage(name: &str) {
        ShmHandle::clear_storage(name);
    }
}
