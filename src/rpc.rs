// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Bidirectional request/response RPC channel: two Rings (one per
// direction), a named mutex for owner/peer role election, packet framing
// and reassembly, a pool of receive-worker threads, and correlation of
// outbound requests to their eventual responses.

use std::collections::HashMap;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::buffer::IpcBuffer;
use crate::error::{IpcError, Result};
use crate::mutex::IpcMutex;
use crate::options::ChannelOptions;
use crate::packet::{MsgType, PacketHeader, HEADER_SIZE};
use crate::ring::Ring;
use crate::stats::{ChannelStats, ChannelStatsSnapshot};

const RECV_POLL_TIMEOUT_MS: u64 = 500;
const SEND_TIMEOUT_MS: u64 = 1000;
const RING_OPEN_RETRY_TIMEOUT_MS: u64 = 5000;

/// Result of a `remote_request` call. Timeouts, peer-side handler failures,
/// and cancellation all surface here rather than as an `Err` — only
/// construction-time and lifecycle failures are `IpcError`.
#[derive(Debug, Clone, Default)]
pub struct RemoteReply {
    pub success: bool,
    pub data: IpcBuffer,
}

type SyncVoidHandler = Box<dyn Fn(u64, &[u8]) + Send + Sync>;
type SyncBytesHandler = Box<dyn Fn(u64, &[u8]) -> Vec<u8> + Send + Sync>;
type AsyncVoidHandler =
    Box<dyn Fn(u64, Vec<u8>) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;
type AsyncBytesHandler =
    Box<dyn Fn(u64, Vec<u8>) -> Pin<Box<dyn Future<Output = Vec<u8>> + Send>> + Send + Sync>;

/// The four inbound-request handler shapes a channel can be built with.
pub enum Handler {
    SyncVoid(SyncVoidHandler),
    SyncBytes(SyncBytesHandler),
    AsyncVoid(AsyncVoidHandler),
    AsyncBytes(AsyncBytesHandler),
    /// No handler installed; inbound requests get an error reply. Used by
    /// pure-caller endpoints that never serve requests themselves.
    None,
}

struct RequestState {
    done: bool,
    success: bool,
    data: Vec<u8>,
    assembly: Option<Vec<u8>>,
}

struct RequestRecord {
    mutex: Mutex<RequestState>,
    cv: Condvar,
}

impl RequestRecord {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            mutex: Mutex::new(RequestState {
                done: false,
                success: false,
                data: Vec::new(),
                assembly: None,
            }),
            cv: Condvar::new(),
        })
    }
}

struct IncomingAssembly {
    buffer: Vec<u8>,
    packets_received: u16,
    total_packets: u16,
}

/// A bidirectional request/response channel built on two [`Ring`]s.
pub struct RpcChannel {
    inbound: Arc<Ring>,
    outbound: Arc<Ring>,
    is_owner: bool,
    send_lock: Arc<Mutex<()>>,
    next_msg_id: AtomicU64,
    outstanding: Arc<Mutex<HashMap<u64, Arc<RequestRecord>>>>,
    incoming: Arc<Mutex<HashMap<u64, IncomingAssembly>>>,
    stats: Arc<ChannelStats>,
    disposed: Arc<AtomicBool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    name: String,
}

impl RpcChannel {
    pub fn new(handler: Handler, opts: ChannelOptions) -> Result<Self> {
        opts.validate()?;

        let mutex_name = format!("{}_owner_mutex", opts.name);
        let (mutex, created) = IpcMutex::open_reporting_creation(&mutex_name)?;
        let is_owner = created && mutex.try_lock().unwrap_or(false);

        let peer_to_owner = format!("{}_peer_to_owner", opts.name);
        let owner_to_peer = format!("{}_owner_to_peer", opts.name);

        let (inbound, outbound) = if is_owner {
            tracing::debug!("channel '{}' elected owner", opts.name);
            let inbound = Ring::create(&peer_to_owner, opts.buffer_node_count, opts.buffer_capacity)?;
            let outbound = Ring::create(&owner_to_peer, opts.buffer_node_count, opts.buffer_capacity)?;
            // The owner keeps holding the election mutex locked for the life
            // of the process, so any later opener reliably finds it taken
            // and falls back to the peer role without racing a second owner.
            std::mem::forget(mutex);
            (inbound, outbound)
        } else {
            tracing::debug!("channel '{}' elected peer", opts.name);
            // The peer never acquired the mutex; close its handle rather
            // than leaking the cached-shm reference for the process's life.
            drop(mutex);
            let inbound = open_ring_retrying(&owner_to_peer)?;
            let outbound = open_ring_retrying(&peer_to_owner)?;
            (inbound, outbound)
        };

        let channel = Self {
            inbound: Arc::new(inbound),
            outbound: Arc::new(outbound),
            is_owner,
            send_lock: Arc::new(Mutex::new(())),
            next_msg_id: AtomicU64::new(1),
            outstanding: Arc::new(Mutex::new(HashMap::new())),
            incoming: Arc::new(Mutex::new(HashMap::new())),
            stats: Arc::new(ChannelStats::new()),
            disposed: Arc::new(AtomicBool::new(false)),
            workers: Mutex::new(Vec::new()),
            name: opts.name.clone(),
        };

        let handler = Arc::new(handler);
        let mut workers = Vec::with_capacity(opts.receive_threads);
        for i in 0..opts.receive_threads {
            workers.push(channel.spawn_worker(i, Arc::clone(&handler)));
        }
        *channel.workers.lock().unwrap() = workers;

        Ok(channel)
    }

    pub fn is_owner(&self) -> bool {
        self.is_owner
    }

    pub fn stats(&self) -> ChannelStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    fn is_shutdown(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
            || self.inbound.is_shutdown()
            || self.outbound.is_shutdown()
    }

    fn body_per_packet(&self) -> usize {
        self.outbound.node_buffer_size() as usize - HEADER_SIZE
    }

    fn allocate_msg_id(&self) -> u64 {
        self.next_msg_id.fetch_add(1, Ordering::Relaxed)
    }

    fn send_framed(&self, msg_type: MsgType, msg_id: u64, payload: &[u8], response_id: u64) -> Result<()> {
        if self.is_shutdown() {
            return Err(IpcError::Shutdown);
        }
        let body_cap = self.body_per_packet();
        let total_packets = std::cmp::max(1, payload.len().div_ceil(body_cap)) as u16;
        let _guard = self.send_lock.lock().unwrap();
        for k in 1..=total_packets {
            let start = (k as usize - 1) * body_cap;
            let end = std::cmp::min(start + body_cap, payload.len());
            let body = &payload[start.min(payload.len())..end];
            let header = PacketHeader {
                msg_type,
                msg_id,
                payload_size: payload.len() as u32,
                current_packet: k,
                total_packets,
                response_id,
            };
            let mut frame = vec![0u8; HEADER_SIZE + body.len()];
            header.encode((&mut frame[..HEADER_SIZE]).try_into().unwrap());
            frame[HEADER_SIZE..].copy_from_slice(body);
            let wait_start = Instant::now();
            let written = self.outbound.write(&frame, Some(SEND_TIMEOUT_MS));
            self.stats
                .record_wait_ticks_sent(wait_start.elapsed().as_millis() as u64);
            if written != frame.len() {
                return Err(IpcError::Shutdown);
            }
            self.stats.record_sent_packet(frame.len());
        }
        Ok(())
    }

    /// Send a request and block until the response arrives, the timeout
    /// elapses, or `cancel` is observed set. `timeout_ms = Some(0)` sends
    /// the message but never waits — the caller always gets `success=false`.
    pub fn remote_request(
        &self,
        payload: &[u8],
        timeout_ms: Option<u64>,
        cancel: Option<&AtomicBool>,
    ) -> Result<RemoteReply> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(IpcError::AlreadyDisposed);
        }
        if self.is_shutdown() {
            return Err(IpcError::Shutdown);
        }

        let msg_id = self.allocate_msg_id();
        let fire_and_forget = timeout_ms == Some(0);

        let record = if fire_and_forget {
            None
        } else {
            let record = RequestRecord::new();
            self.outstanding.lock().unwrap().insert(msg_id, Arc::clone(&record));
            Some(record)
        };

        if let Err(e) = self.send_framed(MsgType::Request, msg_id, payload, 0) {
            if let Some(_r) = &record {
                self.outstanding.lock().unwrap().remove(&msg_id);
            }
            return Err(e);
        }
        self.stats.requests_sent.fetch_add(1, Ordering::Relaxed);
        self.stats
            .last_message_size_sent
            .store(payload.len() as u64, Ordering::Relaxed);

        let record = match record {
            None => return Ok(RemoteReply::default()),
            Some(r) => r,
        };

        let deadline = timeout_ms.map(|ms| Instant::now() + Duration::from_millis(ms));
        let mut shutdown_observed = false;
        let mut guard = record.mutex.lock().unwrap();
        loop {
            if guard.done {
                break;
            }
            // Peer teardown without this endpoint calling dispose() itself
            // must still unblock an indefinite (timeout_ms=None) wait.
            if self.is_shutdown() {
                shutdown_observed = true;
                break;
            }
            if let Some(c) = cancel {
                if c.load(Ordering::Relaxed) {
                    break;
                }
            }
            let wait_for = match deadline {
                None => Duration::from_millis(50),
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        break;
                    }
                    std::cmp::min(d - now, Duration::from_millis(50))
                }
            };
            let (g, _timeout_result) = record.cv.wait_timeout(guard, wait_for).unwrap();
            guard = g;
        }

        if !guard.done {
            self.outstanding.lock().unwrap().remove(&msg_id);
            if shutdown_observed {
                tracing::warn!("request {msg_id} on channel '{}' abandoned on shutdown", self.name);
                return Err(IpcError::Shutdown);
            }
            self.stats.record_timeout(0);
            tracing::warn!("request {msg_id} on channel '{}' timed out", self.name);
            return Ok(RemoteReply::default());
        }

        Ok(RemoteReply {
            success: guard.success,
            data: IpcBuffer::from_vec(std::mem::take(&mut guard.data)),
        })
    }

    /// Non-blocking variant of [`remote_request`](Self::remote_request): the
    /// send happens inline, and the returned handle resolves the same way
    /// `remote_request` would have blocked, driven from a dedicated thread.
    pub fn remote_request_async(
        self: &Arc<Self>,
        payload: Vec<u8>,
        timeout_ms: Option<u64>,
    ) -> JoinHandle<Result<RemoteReply>> {
        let channel = Arc::clone(self);
        std::thread::spawn(move || channel.remote_request(&payload, timeout_ms, None))
    }

    fn spawn_worker(&self, index: usize, handler: Arc<Handler>) -> JoinHandle<()> {
        let inbound = Arc::clone(&self.inbound);
        let disposed = Arc::clone(&self.disposed);
        let outstanding = Arc::clone(&self.outstanding);
        let incoming = Arc::clone(&self.incoming);
        let stats = Arc::clone(&self.stats);
        let name = self.name.clone();
        let shared = Arc::new(WorkerShared {
            inbound: Arc::clone(&self.inbound),
            outbound: Arc::clone(&self.outbound),
            outstanding,
            incoming,
            stats,
            name: name.clone(),
            send_lock: Arc::clone(&self.send_lock),
        });

        std::thread::Builder::new()
            .name(format!("ipc-rpc-{name}-{index}"))
            .spawn(move || loop {
                if disposed.load(Ordering::Acquire) || inbound.is_shutdown() {
                    return;
                }
                let wait_start = Instant::now();
                let frame = inbound.read_with(Some(RECV_POLL_TIMEOUT_MS), |buf| buf.to_vec());
                let Some(frame) = frame else { continue };
                shared
                    .stats
                    .record_wait_ticks_received(wait_start.elapsed().as_millis() as u64);
                shared.stats.record_received_packet(frame.len());
                let header = match PacketHeader::decode(&frame) {
                    Ok(h) => h,
                    Err(e) => {
                        tracing::warn!("channel '{}' dropped malformed frame: {e}", shared.name);
                        continue;
                    }
                };
                let body = &frame[HEADER_SIZE..];
                match header.msg_type {
                    MsgType::Response | MsgType::Error => shared.handle_response(header, body),
                    MsgType::Request => shared.handle_request(header, body, &handler),
                }
            })
            .expect("failed to spawn receive worker thread")
    }

    /// Tear down this endpoint: stop receive workers and, for the owner,
    /// signal shutdown to the peer. Safe to call more than once.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.is_owner {
            self.inbound.mark_shutdown();
            self.outbound.mark_shutdown();
        }
        let workers = std::mem::take(&mut *self.workers.lock().unwrap());
        for w in workers {
            let _ = w.join();
        }
        let mut pending = self.outstanding.lock().unwrap();
        for (_, record) in pending.drain() {
            let mut st = record.mutex.lock().unwrap();
            st.done = true;
            st.success = false;
            drop(st);
            record.cv.notify_all();
        }
    }
}

impl Drop for RpcChannel {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Worker-side mirror of the correlation/assembly state `RpcChannel` owns,
/// shared into the background receive threads without sharing `RpcChannel`
/// itself (which holds the `JoinHandle`s for those same threads).
struct WorkerShared {
    inbound: Arc<Ring>,
    outbound: Arc<Ring>,
    outstanding: Arc<Mutex<HashMap<u64, Arc<RequestRecord>>>>,
    incoming: Arc<Mutex<HashMap<u64, IncomingAssembly>>>,
    stats: Arc<ChannelStats>,
    name: String,
    send_lock: Arc<Mutex<()>>,
}

impl WorkerShared {
    fn body_per_packet(&self) -> usize {
        self.outbound.node_buffer_size() as usize - HEADER_SIZE
    }

    fn handle_response(&self, header: PacketHeader, body: &[u8]) {
        let record = { self.outstanding.lock().unwrap().get(&header.response_id).cloned() };
        let Some(record) = record else {
            self.stats.record_discarded_response(header.response_id);
            tracing::warn!(
                "channel '{}' discarded response for unknown request {}",
                self.name,
                header.response_id
            );
            return;
        };

        let mut st = record.mutex.lock().unwrap();
        if header.total_packets == 1 {
            st.data = body.to_vec();
        } else {
            let total = header.payload_size as usize;
            let buf = st.assembly.get_or_insert_with(|| vec![0u8; total]);
            let off = (header.current_packet as usize - 1) * self.body_per_packet();
            let end = std::cmp::min(off + body.len(), buf.len());
            if off < buf.len() {
                buf[off..end].copy_from_slice(&body[..end - off]);
            }
            if header.current_packet == header.total_packets {
                st.data = std::mem::take(buf);
            }
        }

        if header.current_packet == header.total_packets {
            st.success = header.msg_type == MsgType::Response;
            st.done = true;
            self.stats.record_message_received(st.data.len());
            drop(st);
            self.outstanding.lock().unwrap().remove(&header.response_id);
            record.cv.notify_all();
            match header.msg_type {
                MsgType::Response => self.stats.responses_received.fetch_add(1, Ordering::Relaxed),
                _ => self.stats.errors_received.fetch_add(1, Ordering::Relaxed),
            };
        }
    }

    fn handle_request(&self, header: PacketHeader, body: &[u8], handler: &Handler) {
        let complete_payload = {
            let mut map = self.incoming.lock().unwrap();
            let entry = map.entry(header.msg_id).or_insert_with(|| IncomingAssembly {
                buffer: vec![0u8; header.payload_size as usize],
                packets_received: 0,
                total_packets: header.total_packets,
            });
            let off = (header.current_packet as usize - 1) * self.body_per_packet();
            let end = std::cmp::min(off + body.len(), entry.buffer.len());
            if off < entry.buffer.len() {
                entry.buffer[off..end].copy_from_slice(&body[..end - off]);
            }
            entry.packets_received += 1;
            if entry.packets_received >= entry.total_packets {
                map.remove(&header.msg_id).map(|a| a.buffer)
            } else {
                None
            }
        };

        let Some(payload) = complete_payload else {
            return;
        };
        self.stats.requests_received.fetch_add(1, Ordering::Relaxed);
        self.stats.record_message_received(payload.len());
        self.dispatch(header.msg_id, payload, handler);
    }

    fn dispatch(&self, msg_id: u64, payload: Vec<u8>, handler: &Handler) {
        let outcome: std::result::Result<Vec<u8>, String> = match handler {
            Handler::None => Err("no handler installed".to_string()),
            Handler::SyncVoid(f) => panic::catch_unwind(AssertUnwindSafe(|| f(msg_id, &payload)))
                .map(|_| Vec::new())
                .map_err(|_| "handler panicked".to_string()),
            Handler::SyncBytes(f) => panic::catch_unwind(AssertUnwindSafe(|| f(msg_id, &payload)))
                .map_err(|_| "handler panicked".to_string()),
            Handler::AsyncVoid(f) => {
                let fut = f(msg_id, payload);
                panic::catch_unwind(AssertUnwindSafe(|| block_on(fut)))
                    .map(|_| Vec::new())
                    .map_err(|_| "handler panicked".to_string())
            }
            Handler::AsyncBytes(f) => {
                let fut = f(msg_id, payload);
                panic::catch_unwind(AssertUnwindSafe(|| block_on(fut)))
                    .map_err(|_| "handler panicked".to_string())
            }
        };

        let body_cap = self.body_per_packet();
        let send = |msg_type: MsgType, payload: &[u8]| -> Result<()> {
            if self.inbound.is_shutdown() || self.outbound.is_shutdown() {
                return Err(IpcError::Shutdown);
            }
            let total_packets = std::cmp::max(1, payload.len().div_ceil(body_cap)) as u16;
            let _guard = self.send_lock.lock().unwrap();
            for k in 1..=total_packets {
                let start = (k as usize - 1) * body_cap;
                let end = std::cmp::min(start + body_cap, payload.len());
                let body = &payload[start.min(payload.len())..end];
                let header = PacketHeader {
                    msg_type,
                    msg_id,
                    payload_size: payload.len() as u32,
                    current_packet: k,
                    total_packets,
                    response_id: msg_id,
                };
                let mut frame = vec![0u8; HEADER_SIZE + body.len()];
                header.encode((&mut frame[..HEADER_SIZE]).try_into().unwrap());
                frame[HEADER_SIZE..].copy_from_slice(body);
                let wait_start = Instant::now();
                let written = self.outbound.write(&frame, Some(SEND_TIMEOUT_MS));
                self.stats
                    .record_wait_ticks_sent(wait_start.elapsed().as_millis() as u64);
                if written != frame.len() {
                    return Err(IpcError::Shutdown);
                }
                self.stats.record_sent_packet(frame.len());
            }
            Ok(())
        };

        match outcome {
            Ok(bytes) => {
                if send(MsgType::Response, &bytes).is_ok() {
                    self.stats.responses_sent.fetch_add(1, Ordering::Relaxed);
                } else {
                    tracing::warn!("channel '{}' failed to send response for {msg_id}", self.name);
                }
            }
            Err(msg) => {
                tracing::warn!("channel '{}' handler failed for {msg_id}: {msg}", self.name);
                if send(MsgType::Error, &[]).is_ok() {
                    self.stats.errors_sent.fetch_add(1, Ordering::Relaxed);
                } else {
                    tracing::warn!("channel '{}' failed to send error reply for {msg_id}", self.name);
                }
            }
        }
    }
}

fn open_ring_retrying(name: &str) -> Result<Ring> {
    let deadline = Instant::now() + Duration::from_millis(RING_OPEN_RETRY_TIMEOUT_MS);
    loop {
        match Ring::open(name) {
            Ok(r) => return Ok(r),
            Err(IpcError::NameNotFound(_)) | Err(IpcError::Io(_)) => {
                if Instant::now() >= deadline {
                    return Err(IpcError::NameNotFound(name.to_string()));
                }
                std::thread::sleep(Duration::from_millis(5));
            }
            Err(e) => return Err(e),
        }
    }
}

/// Drive a boxed future to completion without an async runtime: the crate
/// otherwise depends only on OS threads and condition variables, so handler
/// futures are polled from the calling receive-worker thread with a no-op
/// waker and a yield between polls.
fn block_on<F: Future + ?Sized>(mut fut: Pin<Box<F>>) -> F::Output {
    fn noop_clone(_: *const ()) -> RawWaker {
        RawWaker::new(std::ptr::null(), &VTABLE)
    }
    fn noop(_: *const ()) {}
    static VTABLE: RawWakerVTable = RawWakerVTable::new(noop_clone, noop, noop, noop);
    let waker = unsafe { Waker::from_raw(RawWaker::new(std::ptr::null(), &VTABLE)) };
    let mut cx = Context::from_waker(&waker);
    loop {
        match fut.as_mut().poll(&mut cx) {
            Poll::Ready(v) => return v,
            Poll::Pending => std::thread::yield_now(),
        }
    }
}
