//! Cache Statistics Module
//!
//! Tracks hits, misses and rolling get/set latency for one client instance.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

/// Latency samples kept per operation for the rolling average.
const LATENCY_WINDOW: usize = 100;

// == Cache Stats ==
/// Point-in-time snapshot returned by `CacheClient::stats`.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    /// Number of lookups that found a value
    pub hits: u64,
    /// Number of lookups that found nothing (or an unreadable payload)
    pub misses: u64,
    /// hits / (hits + misses), 0 when there are no samples
    pub hit_ratio: f64,
    /// Rolling average `get` latency in milliseconds
    pub avg_get_latency_ms: f64,
    /// Rolling average `set` latency in milliseconds
    pub avg_set_latency_ms: f64,
    /// Entries under the namespace, from a full prefix scan
    pub size: usize,
    /// When the snapshot was taken
    pub timestamp: DateTime<Utc>,
}

/// hits / (hits + misses), or 0.0 if no requests have been made.
pub fn hit_ratio(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

// == Latency Window ==
#[derive(Debug, Default)]
struct LatencyWindow {
    samples: VecDeque<f64>,
    sum: f64,
}

impl LatencyWindow {
    fn record(&mut self, millis: f64) {
        if self.samples.len() == LATENCY_WINDOW {
            if let Some(oldest) = self.samples.pop_front() {
                self.sum -= oldest;
            }
        }
        self.samples.push_back(millis);
        self.sum += millis;
    }

    fn average(&self) -> f64 {
        if self.samples.is_empty() {
            0.0
        } else {
            self.sum / self.samples.len() as f64
        }
    }

    fn clear(&mut self) {
        self.samples.clear();
        self.sum = 0.0;
    }
}

// == Stats Collector ==
/// Counters shared by every clone of a client.
#[derive(Debug, Default)]
pub struct StatsCollector {
    hits: AtomicU64,
    misses: AtomicU64,
    get_latency: Mutex<LatencyWindow>,
    set_latency: Mutex<LatencyWindow>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_get_latency(&self, elapsed: Duration) {
        self.get_latency.lock().record(elapsed.as_secs_f64() * 1000.0);
    }

    pub fn record_set_latency(&self, elapsed: Duration) {
        self.set_latency.lock().record(elapsed.as_secs_f64() * 1000.0);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Builds a snapshot; `size` comes from the caller's scan.
    pub fn snapshot(&self, size: usize) -> CacheStats {
        let hits = self.hits();
        let misses = self.misses();
        CacheStats {
            hits,
            misses,
            hit_ratio: hit_ratio(hits, misses),
            avg_get_latency_ms: self.get_latency.lock().average(),
            avg_set_latency_ms: self.set_latency.lock().average(),
            size,
            timestamp: Utc::now(),
        }
    }

    /// Zeroes counters and latency windows.
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.get_latency.lock().clear();
        self.set_latency.lock().clear();
    }
}
