// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Exercises the lock-free MPMC ring: FIFO ordering, bounded occupancy,
// no-lost-slots under concurrent producers/consumers, and shutdown wakeup.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use natyamatsya_ipc::Ring;

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn unique_name(prefix: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_ring_{n}_{}", std::process::id())
}

#[test]
fn write_then_read_roundtrip() {
    let name = unique_name("roundtrip");
    let ring = Ring::create(&name, 4, 64).unwrap();
    let n = ring.write(b"hello", Some(0));
    assert_eq!(n, 5);
    let mut buf = [0u8; 64];
    let n = ring.read(&mut buf, Some(0));
    assert_eq!(&buf[..n], b"hello");
    Ring::clear_storage(&name);
}

#[test]
fn preserves_fifo_order() {
    let name = unique_name("fifo");
    let ring = Ring::create(&name, 8, 16).unwrap();
    for i in 0..20u32 {
        let n = ring.write(&i.to_le_bytes(), Some(1000));
        assert_eq!(n, 4);
    }
    for i in 0..20u32 {
        let mut buf = [0u8; 4];
        let n = ring.read(&mut buf, Some(1000));
        assert_eq!(n, 4);
        assert_eq!(u32::from_le_bytes(buf), i);
    }
    Ring::clear_storage(&name);
}

#[test]
fn try_write_fails_fast_when_full() {
    let name = unique_name("full");
    let ring = Ring::create(&name, 2, 8).unwrap();
    // node_count=2 means exactly one usable slot (one node is always the
    // empty sentinel between write_end and read_start).
    assert_eq!(ring.try_write(b"a"), 1);
    assert_eq!(ring.try_write(b"b"), 0, "ring should report full via timeout=0");
    Ring::clear_storage(&name);
}

#[test]
fn blocked_reader_wakes_on_write() {
    let name = unique_name("wake");
    let ring = Arc::new(Ring::create(&name, 4, 16).unwrap());
    let reader = {
        let ring = Arc::clone(&ring);
        thread::spawn(move || {
            let mut buf = [0u8; 16];
            let n = ring.read(&mut buf, Some(5000));
            (n, buf[0])
        })
    };
    thread::sleep(Duration::from_millis(100));
    assert_eq!(ring.write(&[42u8], Some(0)), 1);
    let (n, first_byte) = reader.join().unwrap();
    assert_eq!(n, 1);
    assert_eq!(first_byte, 42);
    Ring::clear_storage(&name);
}

#[test]
fn shutdown_wakes_blocked_reader_with_none() {
    let name = unique_name("shutdown");
    let ring = Arc::new(Ring::create(&name, 4, 16).unwrap());
    let reader = {
        let ring = Arc::clone(&ring);
        thread::spawn(move || {
            let mut buf = [0u8; 16];
            ring.read(&mut buf, None)
        })
    };
    thread::sleep(Duration::from_millis(100));
    ring.mark_shutdown();
    let n = reader.join().unwrap();
    assert_eq!(n, 0, "read on a shut-down ring returns 0, not a hang");
    Ring::clear_storage(&name);
}

#[test]
fn no_lost_slots_under_concurrent_producers_and_consumers() {
    let name = unique_name("mpmc");
    let ring = Arc::new(Ring::create(&name, 16, 8).unwrap());
    const PRODUCERS: u32 = 4;
    const PER_PRODUCER: u32 = 50;
    const TOTAL: u32 = PRODUCERS * PER_PRODUCER;

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let ring = Arc::clone(&ring);
            thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    let v = p * PER_PRODUCER + i;
                    assert_eq!(ring.write(&v.to_le_bytes(), Some(5000)), 4);
                }
            })
        })
        .collect();

    let received = Arc::new(std::sync::Mutex::new(Vec::new()));
    let consumers: Vec<_> = (0..PRODUCERS)
        .map(|_| {
            let ring = Arc::clone(&ring);
            let received = Arc::clone(&received);
            thread::spawn(move || loop {
                let mut buf = [0u8; 8];
                match ring.read_with(Some(200), |src| {
                    buf[..src.len()].copy_from_slice(src);
                    src.len()
                }) {
                    Some(4) => {
                        let v = u32::from_le_bytes(buf[..4].try_into().unwrap());
                        let mut g = received.lock().unwrap();
                        g.push(v);
                        if g.len() as u32 >= TOTAL {
                            return;
                        }
                    }
                    _ => {
                        if received.lock().unwrap().len() as u32 >= TOTAL {
                            return;
                        }
                    }
                }
            })
        })
        .collect();

    for p in producers {
        p.join().unwrap();
    }
    for c in consumers {
        c.join().unwrap();
    }

    let mut got = received.lock().unwrap().clone();
    got.sort_unstable();
    let expected: Vec<u32> = (0..TOTAL).collect();
    assert_eq!(got, expected, "every written value must be read exactly once");
    Ring::clear_storage(&name);
}

#[test]
fn typed_value_roundtrip() {
    let name = unique_name("typed");
    let ring = Ring::create(&name, 4, 32).unwrap();
    #[derive(Clone, Copy, Default, Debug, PartialEq)]
    struct Point {
        x: i32,
        y: i32,
    }
    assert!(ring.write_value(&Point { x: 3, y: -7 }, Some(0)));
    let got: Point = ring.read_value(Some(0)).unwrap();
    assert_eq!(got, Point { x: 3, y: -7 });
    Ring::clear_storage(&name);
}

/// Tiny xorshift32 generator. `rand`/`proptest` are out of scope for this
/// crate's test tooling, so randomized interleavings get a bespoke source.
struct Xorshift32(u32);

impl Xorshift32 {
    fn new(seed: u32) -> Self {
        Xorshift32(if seed == 0 { 0xDEAD_BEEF } else { seed })
    }

    fn next_u32(&mut self) -> u32 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.0 = x;
        x
    }

    fn range(&mut self, lo: u32, hi_inclusive: u32) -> u32 {
        lo + self.next_u32() % (hi_inclusive - lo + 1)
    }
}

/// Drives `producers` writer threads and `consumers` reader threads over one
/// randomly-sized ring and checks the multiset of item ids consumed equals
/// the multiset produced, regardless of how the schedule interleaved them.
/// Each item encodes a globally unique id in its first 4 bytes, so
/// `node_buffer_size` must be at least 4.
fn run_mpmc_trial(trial: u32, node_count: u32, node_buffer_size: u32, producers: u32, consumers: u32, per_producer: u32) {
    let name = unique_name(&format!("prop{trial}"));
    let ring = Arc::new(Ring::create(&name, node_count, node_buffer_size).unwrap());
    let total = producers * per_producer;
    let buf_len = node_buffer_size as usize;

    let writers: Vec<_> = (0..producers)
        .map(|p| {
            let ring = Arc::clone(&ring);
            thread::spawn(move || {
                for i in 0..per_producer {
                    let id = p * per_producer + i;
                    let mut item = vec![0u8; buf_len];
                    item[0..4].copy_from_slice(&id.to_le_bytes());
                    assert_eq!(ring.write(&item, Some(10_000)), buf_len);
                }
            })
        })
        .collect();

    let received = Arc::new(std::sync::Mutex::new(Vec::new()));
    let readers: Vec<_> = (0..consumers)
        .map(|_| {
            let ring = Arc::clone(&ring);
            let received = Arc::clone(&received);
            thread::spawn(move || loop {
                if received.lock().unwrap().len() as u32 >= total {
                    return;
                }
                let mut id_bytes = [0u8; 4];
                let got = ring.read_with(Some(200), |src| {
                    id_bytes.copy_from_slice(&src[0..4]);
                    src.len()
                });
                if got == Some(buf_len) {
                    let id = u32::from_le_bytes(id_bytes);
                    let mut g = received.lock().unwrap();
                    g.push(id);
                    if g.len() as u32 >= total {
                        return;
                    }
                }
            })
        })
        .collect();

    for w in writers {
        w.join().unwrap();
    }
    for r in readers {
        r.join().unwrap();
    }

    let mut got = received.lock().unwrap().clone();
    got.sort_unstable();
    let expected: Vec<u32> = (0..total).collect();
    assert_eq!(
        got, expected,
        "trial {trial}: N={node_count} B={node_buffer_size} P={producers} C={consumers} lost or duplicated an item"
    );
    Ring::clear_storage(&name);
}

#[test]
fn property_random_interleavings_preserve_multiset() {
    let mut rng = Xorshift32::new(0xC0FF_EE42);
    for trial in 0..6u32 {
        let node_count = rng.range(2, 16);
        let node_buffer_size = rng.range(4, 1024);
        let producers = rng.range(1, 8);
        let consumers = rng.range(1, 8);
        let per_producer = rng.range(5, 25);
        run_mpmc_trial(trial, node_count, node_buffer_size, producers, consumers, per_producer);
    }
}

#[test]
fn peer_discovers_geometry_via_open() {
    let name = unique_name("geometry");
    let owner = Ring::create(&name, 6, 128).unwrap();
    let peer = Ring::open(&name).unwrap();
    assert_eq!(peer.node_count(), owner.node_count());
    assert_eq!(peer.node_buffer_size(), owner.node_buffer_size());
    Ring::clear_storage(&name);
}
