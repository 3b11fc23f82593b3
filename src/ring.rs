// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Lock-free multi-producer / multi-consumer ring of fixed-size nodes over a
// named shared memory region. Reservation order (who wins the write_start /
// read_start CAS) may differ from completion order; write_end / read_end
// only ever advance over contiguously-completed nodes. That two-phase
// publish is what lets readers observe writer reservation order even when
// writers finish filling their slots out of order.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{IpcError, Result};
use crate::region::SharedRegion;
use crate::spin_lock::adaptive_yield_pub;
use crate::waiter::Waiter;

const HEADER_SIZE: usize = 24;
const NODE_SIZE: usize = 32;

#[repr(C)]
struct RingHeader {
    read_end: AtomicU32,
    read_start: AtomicU32,
    write_end: AtomicU32,
    write_start: AtomicU32,
    node_count: u32,
    node_buffer_size: u32,
}

const _: () = assert!(std::mem::size_of::<RingHeader>() == HEADER_SIZE);

#[repr(C)]
struct Node {
    next: u32,
    prev: u32,
    done_read: AtomicU32,
    done_write: AtomicU32,
    offset: u64,
    index: u32,
    amount_written: AtomicU32,
}

const _: () = assert!(std::mem::size_of::<Node>() == NODE_SIZE);

/// A lock-free ring of `node_count` fixed `node_buffer_size`-byte slots.
pub struct Ring {
    region: SharedRegion,
    data_exists: Waiter,
    slot_available: Waiter,
    node_count: u32,
    node_buffer_size: u32,
}

impl Ring {
    pub fn create(name: &str, node_count: u32, node_buffer_size: u32) -> Result<Self> {
        if node_count < 2 {
            return Err(IpcError::OutOfRange(format!(
                "node_count must be >= 2, got {node_count}"
            )));
        }
        if node_buffer_size < 1 {
            return Err(IpcError::OutOfRange("node_buffer_size must be >= 1".into()));
        }
        let table_bytes = NODE_SIZE * node_count as usize;
        let payload_size = HEADER_SIZE + table_bytes + node_buffer_size as usize * node_count as usize;
        let region = SharedRegion::create(name, payload_size)?;

        let ring = Self {
            region,
            data_exists: Waiter::open(&format!("{name}_data_exists"))?,
            slot_available: Waiter::open(&format!("{name}_slot_available"))?,
            node_count,
            node_buffer_size,
        };

        let hdr = ring.header();
        hdr.read_end.store(0, Ordering::Relaxed);
        hdr.read_start.store(0, Ordering::Relaxed);
        hdr.write_end.store(0, Ordering::Relaxed);
        hdr.write_start.store(0, Ordering::Relaxed);
        // SAFETY: header fields node_count/node_buffer_size are const after
        // construction; writing through a shared &RingHeader here is sound
        // because we are the sole creator and no peer has opened this name yet.
        unsafe {
            let hdr_mut = ring.region.raw_base() as *mut RingHeader;
            (*hdr_mut).node_count = node_count;
            (*hdr_mut).node_buffer_size = node_buffer_size;
        }
        for i in 0..node_count {
            let n = ring.node_mut(i);
            n.next = (i + 1) % node_count;
            n.prev = (i + node_count - 1) % node_count;
            n.done_read.store(0, Ordering::Relaxed);
            n.done_write.store(0, Ordering::Relaxed);
            n.offset = (HEADER_SIZE + table_bytes + i as usize * node_buffer_size as usize) as u64;
            n.index = i;
            n.amount_written.store(0, Ordering::Relaxed);
        }
        tracing::debug!("ring '{name}' created: {node_count} nodes x {node_buffer_size} bytes");
        Ok(ring)
    }

    pub fn open(name: &str) -> Result<Self> {
        let region = SharedRegion::open(name)?;
        let node_count = unsafe { (*(region.raw_base() as *const RingHeader)).node_count };
        let node_buffer_size =
            unsafe { (*(region.raw_base() as *const RingHeader)).node_buffer_size };
        tracing::debug!("ring '{name}' opened: {node_count} nodes x {node_buffer_size} bytes");
        Ok(Self {
            region,
            data_exists: Waiter::open(&format!("{name}_data_exists"))?,
            slot_available: Waiter::open(&format!("{name}_slot_available"))?,
            node_count,
            node_buffer_size,
        })
    }

    pub fn node_count(&self) -> u32 {
        self.node_count
    }

    pub fn node_buffer_size(&self) -> u32 {
        self.node_buffer_size
    }

    pub fn is_shutdown(&self) -> bool {
        self.region.is_shutdown()
    }

    pub fn mark_shutdown(&self) {
        self.region.mark_shutdown();
        let _ = self.data_exists.broadcast();
        let _ = self.slot_available.broadcast();
    }

    pub fn clear_storage(name: &str) {
        SharedRegion::clear_storage(name);
        Waiter::clear_storage(&format!("{name}_data_exists"));
        Waiter::clear_storage(&format!("{name}_slot_available"));
    }

    fn header(&self) -> &RingHeader {
        unsafe { &*(self.region.raw_base() as *const RingHeader) }
    }

    fn node(&self, i: u32) -> &Node {
        unsafe { &*(self.region.raw_base().add(HEADER_SIZE + i as usize * NODE_SIZE) as *const Node) }
    }

    #[allow(clippy::mut_from_ref)]
    fn node_mut(&self, i: u32) -> &mut Node {
        unsafe { &mut *(self.region.raw_base().add(HEADER_SIZE + i as usize * NODE_SIZE) as *mut Node) }
    }

    fn node_buffer(&self, i: u32) -> *mut u8 {
        let off = self.node(i).offset as usize;
        unsafe { self.region.raw_base().add(off) }
    }

    // -- reservation / publication -----------------------------------------

    fn reserve_write(&self, timeout_ms: Option<u64>) -> Option<u32> {
        let hdr = self.header();
        let mut k = 0u32;
        loop {
            if self.is_shutdown() {
                return None;
            }
            let w = hdr.write_start.load(Ordering::Acquire);
            let next = self.node(w).next;
            if next == hdr.read_end.load(Ordering::Acquire) {
                match self.slot_available.wait_if(
                    || {
                        let w = hdr.write_start.load(Ordering::Acquire);
                        self.node(w).next == hdr.read_end.load(Ordering::Acquire)
                    },
                    timeout_ms,
                ) {
                    Ok(true) => continue,
                    Ok(false) => return None,
                    Err(e) => {
                        tracing::error!("ring slot_available wait failed: {e}");
                        return None;
                    }
                }
            }
            if hdr
                .write_start
                .compare_exchange_weak(w, next, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                #[cfg(feature = "trace_ring")]
                tracing::trace!("ring reserved write slot {w}");
                return Some(w);
            }
            adaptive_yield_pub(&mut k);
        }
    }

    fn publish(&self, idx: u32) {
        #[cfg(feature = "trace_ring")]
        tracing::trace!("ring publishing slot {idx}");
        let hdr = self.header();
        self.node(idx).done_write.store(1, Ordering::Release);
        loop {
            let e = hdr.write_end.load(Ordering::Acquire);
            let n = self.node(e);
            if n.done_write
                .compare_exchange(1, 0, Ordering::AcqRel, Ordering::Relaxed)
                .is_err()
            {
                return;
            }
            let was_empty = e == hdr.read_start.load(Ordering::Acquire);
            let _ = hdr.write_end.compare_exchange(
                e,
                n.next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            );
            if was_empty {
                if let Err(e) = self.data_exists.notify() {
                    tracing::error!("ring data_exists notify failed: {e}");
                }
            }
        }
    }

    fn reserve_read(&self, timeout_ms: Option<u64>) -> Option<u32> {
        let hdr = self.header();
        let mut k = 0u32;
        loop {
            if self.is_shutdown() {
                return None;
            }
            let r = hdr.read_start.load(Ordering::Acquire);
            if r == hdr.write_end.load(Ordering::Acquire) {
                match self.data_exists.wait_if(
                    || {
                        let r = hdr.read_start.load(Ordering::Acquire);
                        r == hdr.write_end.load(Ordering::Acquire)
                    },
                    timeout_ms,
                ) {
                    Ok(true) => continue,
                    Ok(false) => return None,
                    Err(e) => {
                        tracing::error!("ring data_exists wait failed: {e}");
                        return None;
                    }
                }
            }
            let next = self.node(r).next;
            if hdr
                .read_start
                .compare_exchange_weak(r, next, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                #[cfg(feature = "trace_ring")]
                tracing::trace!("ring reserved read slot {r}");
                return Some(r);
            }
            adaptive_yield_pub(&mut k);
        }
    }

    fn consume(&self, idx: u32) {
        #[cfg(feature = "trace_ring")]
        tracing::trace!("ring consuming slot {idx}");
        let hdr = self.header();
        let node = self.node(idx);
        node.amount_written.store(0, Ordering::Relaxed);
        node.done_read.store(1, Ordering::Release);
        loop {
            let e = hdr.read_end.load(Ordering::Acquire);
            let n = self.node(e);
            if n.done_read
                .compare_exchange(1, 0, Ordering::AcqRel, Ordering::Relaxed)
                .is_err()
            {
                return;
            }
            let was_full = n.prev == hdr.write_start.load(Ordering::Acquire);
            let _ =
                hdr.read_end
                    .compare_exchange(e, n.next, Ordering::AcqRel, Ordering::Relaxed);
            if was_full {
                if let Err(e) = self.slot_available.notify() {
                    tracing::error!("ring slot_available notify failed: {e}");
                }
            }
        }
    }

    // -- public byte-oriented API --------------------------------------------

    /// Reserve a slot, hand its buffer to `f`, and publish. `f` returns how
    /// many bytes of the (up to `node_buffer_size`) scratch space it used.
    /// Returns `None` on timeout or shutdown.
    pub fn write_with<F: FnOnce(&mut [u8]) -> usize>(
        &self,
        timeout_ms: Option<u64>,
        f: F,
    ) -> Option<usize> {
        let idx = self.reserve_write(timeout_ms)?;
        let buf = unsafe {
            std::slice::from_raw_parts_mut(self.node_buffer(idx), self.node_buffer_size as usize)
        };
        let n = f(buf).min(self.node_buffer_size as usize);
        self.node(idx).amount_written.store(n as u32, Ordering::Release);
        self.publish(idx);
        Some(n)
    }

    /// Reserve a readable slot, hand its filled bytes to `f`, and release it.
    /// Returns `None` on timeout or shutdown.
    pub fn read_with<R, F: FnOnce(&[u8]) -> R>(&self, timeout_ms: Option<u64>, f: F) -> Option<R> {
        let idx = self.reserve_read(timeout_ms)?;
        let amt = self.node(idx).amount_written.load(Ordering::Acquire) as usize;
        let buf = unsafe { std::slice::from_raw_parts(self.node_buffer(idx), amt) };
        let result = f(buf);
        self.consume(idx);
        Some(result)
    }

    pub fn write(&self, data: &[u8], timeout_ms: Option<u64>) -> usize {
        self.write_with(timeout_ms, |dst| {
            let n = data.len().min(dst.len());
            dst[..n].copy_from_slice(&data[..n]);
            n
        })
        .unwrap_or(0)
    }

    pub fn read(&self, dest: &mut [u8], timeout_ms: Option<u64>) -> usize {
        self.read_with(timeout_ms, |src| {
            let n = src.len().min(dest.len());
            dest[..n].copy_from_slice(&src[..n]);
            n
        })
        .unwrap_or(0)
    }

    pub fn try_write(&self, data: &[u8]) -> usize {
        self.write(data, Some(0))
    }

    pub fn try_read(&self, dest: &mut [u8]) -> usize {
        self.read(dest, Some(0))
    }

    pub fn write_blocking(&self, data: &[u8]) -> usize {
        self.write(data, None)
    }

    pub fn read_blocking(&self, dest: &mut [u8]) -> usize {
        self.read(dest, None)
    }

    /// Write a `Copy` value's raw bytes into one slot.
    pub fn write_value<T: Copy>(&self, value: &T, timeout_ms: Option<u64>) -> bool {
        let bytes =
            unsafe { std::slice::from_raw_parts(value as *const T as *const u8, std::mem::size_of::<T>()) };
        self.write(bytes, timeout_ms) == bytes.len()
    }

    /// Read one slot's bytes into a `Copy` value.
    pub fn read_value<T: Copy + Default>(&self, timeout_ms: Option<u64>) -> Option<T> {
        let mut value = T::default();
        let bytes = unsafe {
            std::slice::from_raw_parts_mut(&mut value as *mut T as *mut u8, std::mem::size_of::<T>())
        };
        let n = self.read(bytes, timeout_ms);
        if n == std::mem::size_of::<T>() {
            Some(value)
        } else {
            None
        }
    }
}
