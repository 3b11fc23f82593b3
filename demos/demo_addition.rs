// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Rust port of the send_recv demo's spirit, retargeted at RpcChannel.
//
// Usage:
//   demo_addition owner
//   demo_addition peer <a> <b>
//
// The owner process serves an "add two little-endian i64s" handler on a
// channel named "addition". The peer process sends one request per pair of
// command-line arguments and prints the sum it gets back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use natyamatsya_ipc::{ChannelOptions, Handler, RpcChannel};

fn do_owner() {
    let handler = Handler::SyncBytes(Box::new(|_msg_id, payload| {
        let a = i64::from_le_bytes(payload[0..8].try_into().unwrap());
        let b = i64::from_le_bytes(payload[8..16].try_into().unwrap());
        println!("owner: {a} + {b} = {}", a + b);
        (a + b).to_le_bytes().to_vec()
    }));
    let opts = ChannelOptions::new("addition");
    let channel = RpcChannel::new(handler, opts).expect("create channel");
    println!("owner: serving, ctrl-c to quit");

    let quit = Arc::new(AtomicBool::new(false));
    {
        let q = Arc::clone(&quit);
        ctrlc_or_sigterm(move || q.store(true, Ordering::Release));
    }
    while !quit.load(Ordering::Acquire) {
        std::thread::sleep(std::time::Duration::from_millis(200));
    }
    channel.dispose();
}

fn do_peer(a: i64, b: i64) {
    let opts = ChannelOptions::new("addition");
    let channel = RpcChannel::new(Handler::None, opts).expect("open channel");
    let mut payload = Vec::with_capacity(16);
    payload.extend_from_slice(&a.to_le_bytes());
    payload.extend_from_slice(&b.to_le_bytes());
    let reply = channel
        .remote_request(&payload, Some(5000), None)
        .expect("remote_request");
    if !reply.success {
        eprintln!("peer: request failed or timed out");
        std::process::exit(1);
    }
    let sum = i64::from_le_bytes(reply.data.data()[0..8].try_into().unwrap());
    println!("peer: {a} + {b} = {sum}");
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("usage: demo_addition owner");
        eprintln!("       demo_addition peer <a> <b>");
        std::process::exit(1);
    }
    match args[1].as_str() {
        "owner" => do_owner(),
        "peer" => {
            if args.len() < 4 {
                eprintln!("usage: demo_addition peer <a> <b>");
                std::process::exit(1);
            }
            let a: i64 = args[2].parse().expect("a");
            let b: i64 = args[3].parse().expect("b");
            do_peer(a, b);
        }
        other => {
            eprintln!("unknown mode: {other}");
            std::process::exit(1);
        }
    }
}

// Minimal cross-platform signal hook: sets the flag on SIGINT / SIGTERM.
fn ctrlc_or_sigterm(f: impl Fn() + Send + 'static) {
    #[cfg(unix)]
    {
        use std::sync::Mutex;
        static CB: std::sync::OnceLock<Mutex<Box<dyn Fn() + Send>>> = std::sync::OnceLock::new();
        CB.get_or_init(|| Mutex::new(Box::new(f)));
        extern "C" fn handler(_: libc::c_int) {
            if let Some(cb) = CB.get() {
                if let Ok(g) = cb.lock() {
                    g();
                }
            }
        }
        unsafe {
            libc::signal(libc::SIGINT, handler as *const () as libc::sighandler_t);
            libc::signal(libc::SIGTERM, handler as *const () as libc::sighandler_t);
        }
    }
    #[cfg(not(unix))]
    {
        let _ = f;
    }
}
