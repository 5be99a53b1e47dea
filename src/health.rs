//! Health aggregator: ring buffers of latency/fee samples and derived server state (C8).

use std::collections::VecDeque;
use std::time::Instant;

const LATENCY_RING_CAP: usize = 10;
const FEE_RING_CAP: usize = 5;

/// A single latency sample.
#[derive(Debug, Clone, Copy)]
pub struct LatencySample {
    pub at: Instant,
    pub ms: i64,
}

/// A single fee sample, in drops.
#[derive(Debug, Clone, Copy)]
pub struct FeeSample {
    pub at: Instant,
    pub drops: f64,
}

/// A bounded ring buffer: pushing past capacity drops the oldest sample.
#[derive(Debug, Clone, Default)]
pub struct Ring<T> {
    cap: usize,
    buf: VecDeque<T>,
}

impl<T> Ring<T> {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            cap,
            buf: VecDeque::with_capacity(cap),
        }
    }

    pub fn push(&mut self, item: T) {
        if self.buf.len() >= self.cap {
            self.buf.pop_front();
        }
        self.buf.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buf.iter()
    }

    pub fn last(&self) -> Option<&T> {
        self.buf.back()
    }
}

/// Server-side state maintained across the connection's lifetime.
#[derive(Debug, Clone)]
pub struct ServerState {
    pub validated_ledgers: String,
    pub reserve_base: Option<f64>,
    pub reserve_inc: Option<f64>,
    pub latency: Ring<LatencySample>,
    pub fee: Ring<FeeSample>,
    /// -1 sentinel pre-first-connect.
    pub connect_attempts: i64,
    pub pubkey_node: Option<String>,
    pub build_version: Option<String>,
    pub uptime: Option<u64>,
}

impl Default for ServerState {
    fn default() -> Self {
        Self {
            validated_ledgers: String::new(),
            reserve_base: None,
            reserve_inc: None,
            latency: Ring::with_capacity(LATENCY_RING_CAP),
            fee: Ring::with_capacity(FEE_RING_CAP),
            connect_attempts: -1,
            pubkey_node: None,
            build_version: None,
            uptime: None,
        }
    }
}

impl ServerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a round-trip latency sample for a resolved `server_info` probe.
    pub fn record_latency(&mut self, ms: i64) {
        self.latency.push(LatencySample {
            at: Instant::now(),
            ms,
        });
    }

    /// Record a fee sample derived from `server_info`. Dropped if zero/NaN.
    ///
    /// `drops = load_factor * base_fee_xrp * 1e6 * 1.2` (fee cushion).
    pub fn record_fee(&mut self, load_factor: f64, base_fee_xrp: f64) {
        let drops = load_factor * base_fee_xrp * 1e6 * 1.2;
        if drops == 0.0 || drops.is_nan() {
            return;
        }
        self.fee.push(FeeSample {
            at: Instant::now(),
            drops,
        });
    }

    pub fn last_latency_ms(&self) -> Option<i64> {
        self.latency.last().map(|s| s.ms)
    }

    pub fn avg_latency_ms(&self) -> Option<f64> {
        if self.latency.is_empty() {
            return None;
        }
        let sum: i64 = self.latency.iter().map(|s| s.ms).sum();
        Some(sum as f64 / self.latency.len() as f64)
    }

    pub fn last_fee_drops(&self) -> Option<f64> {
        self.fee.last().map(|s| s.drops)
    }

    pub fn avg_fee_drops(&self) -> Option<f64> {
        if self.fee.is_empty() {
            return None;
        }
        let sum: f64 = self.fee.iter().map(|s| s.drops).sum();
        Some(sum / self.fee.len() as f64)
    }

    /// Sum of `b - a` for every comma-separated `a-b` range (single values count as 1).
    pub fn ledger_count(&self) -> u64 {
        ledger_range_count(&self.validated_ledgers)
    }
}

fn ledger_range_count(ranges: &str) -> u64 {
    if ranges.is_empty() {
        return 0;
    }
    ranges
        .split(',')
        .map(|part| {
            let part = part.trim();
            match part.split_once('-') {
                Some((a, b)) => {
                    let a: i64 = a.trim().parse().unwrap_or(0);
                    let b: i64 = b.trim().parse().unwrap_or(0);
                    (b - a).max(0) as u64
                }
                None => {
                    if part.is_empty() {
                        0
                    } else {
                        1
                    }
                }
            }
        })
        .sum()
}
