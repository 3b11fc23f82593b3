// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Per-channel counters, updated outside the ring's hot CAS paths with
// relaxed atomics. Snapshot with `ChannelStats::snapshot`.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

#[derive(Default)]
pub struct ChannelStats {
    pub requests_sent: AtomicU64,
    pub requests_received: AtomicU64,
    pub responses_sent: AtomicU64,
    pub responses_received: AtomicU64,
    pub errors_sent: AtomicU64,
    pub errors_received: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub bytes_received: AtomicU64,
    pub packets_sent: AtomicU64,
    pub packets_received: AtomicU64,
    pub largest_packet_sent: AtomicU64,
    pub largest_packet_received: AtomicU64,
    pub last_message_size_sent: AtomicU64,
    pub last_message_size_received: AtomicU64,
    pub max_wait_ticks_sent: AtomicU64,
    pub max_wait_ticks_received: AtomicU64,
    pub discarded_responses: AtomicU64,
    pub last_discarded_id: AtomicU64,
    pub timeouts: AtomicU64,
    pub last_timeout_millis: AtomicI64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelStatsSnapshot {
    pub requests_sent: u64,
    pub requests_received: u64,
    pub responses_sent: u64,
    pub responses_received: u64,
    pub errors_sent: u64,
    pub errors_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub packets_sent: u64,
    pub packets_received: u64,
    pub largest_packet_sent: u64,
    pub largest_packet_received: u64,
    pub last_message_size_sent: u64,
    pub last_message_size_received: u64,
    pub max_wait_ticks_sent: u64,
    pub max_wait_ticks_received: u64,
    pub discarded_responses: u64,
    pub last_discarded_id: u64,
    pub timeouts: u64,
    pub last_timeout_millis: i64,
}

impl ChannelStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sent_packet(&self, bytes: usize) {
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.largest_packet_sent.fetch_max(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_received_packet(&self, bytes: usize) {
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
        self.packets_received.fetch_add(1, Ordering::Relaxed);
        self.largest_packet_received.fetch_max(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_discarded_response(&self, msg_id: u64) {
        self.discarded_responses.fetch_add(1, Ordering::Relaxed);
        self.last_discarded_id.store(msg_id, Ordering::Relaxed);
    }

    pub fn record_message_received(&self, bytes: usize) {
        self.last_message_size_received.store(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_wait_ticks_sent(&self, millis: u64) {
        self.max_wait_ticks_sent.fetch_max(millis, Ordering::Relaxed);
    }

    pub fn record_wait_ticks_received(&self, millis: u64) {
        self.max_wait_ticks_received.fetch_max(millis, Ordering::Relaxed);
    }

    pub fn record_timeout(&self, now_millis: i64) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
        self.last_timeout_millis.store(now_millis, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.requests_sent.store(0, Ordering::Relaxed);
        self.requests_received.store(0, Ordering::Relaxed);
        self.responses_sent.store(0, Ordering::Relaxed);
        self.responses_received.store(0, Ordering::Relaxed);
        self.errors_sent.store(0, Ordering::Relaxed);
        self.errors_received.store(0, Ordering::Relaxed);
        self.bytes_sent.store(0, Ordering::Relaxed);
        self.bytes_received.store(0, Ordering::Relaxed);
        self.packets_sent.store(0, Ordering::Relaxed);
        self.packets_received.store(0, Ordering::Relaxed);
        self.largest_packet_sent.store(0, Ordering::Relaxed);
        self.largest_packet_received.store(0, Ordering::Relaxed);
        self.last_message_size_sent.store(0, Ordering::Relaxed);
        self.last_message_size_received.store(0, Ordering::Relaxed);
        self.max_wait_ticks_sent.store(0, Ordering::Relaxed);
        self.max_wait_ticks_received.store(0, Ordering::Relaxed);
        self.discarded_responses.store(0, Ordering::Relaxed);
        self.last_discarded_id.store(0, Ordering::Relaxed);
        self.timeouts.store(0, Ordering::Relaxed);
        self.last_timeout_millis.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ChannelStatsSnapshot {
        ChannelStatsSnapshot {
            requests_sent: self.requests_sent.load(Ordering::Relaxed),
            requests_received: self.requests_received.load(Ordering::Relaxed),
            responses_sent: self.responses_sent.load(Ordering::Relaxed),
            responses_received: self.responses_received.load(Ordering::Relaxed),
            errors_sent: self.errors_sent.load(Ordering::Relaxed),
            errors_received: self.errors_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            largest_packet_sent: self.largest_packet_sent.load(Ordering::Relaxed),
            largest_packet_received: self.largest_packet_received.load(Ordering::Relaxed),
            last_message_size_sent: self.last_message_size_sent.load(Ordering::Relaxed),
            last_message_size_received: self.last_message_size_received.load(Ordering::Relaxed),
            max_wait_ticks_sent: self.max_wait_ticks_sent.load(Ordering::Relaxed),
            max_wait_ticks_received: self.max_wait_ticks_received.load(Ordering::Relaxed),
            discarded_responses: self.discarded_responses.load(Ordering::Relaxed),
            last_discarded_id: self.last_discarded_id.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            last_timeout_millis: self.last_timeout_millis.load(Ordering::Relaxed),
        }
    }
}
