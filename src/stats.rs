//! Transfer statistics (`TransferStats`): a monotonic byte counter plus a
//! derived, externally-sampled speed string. Reset only by process restart
//! — there is deliberately no `reset` method.
//!
//! Grounded on the teacher's per-connection `rx_bytes`/`tx_bytes` counters in
//! `balancer/endpoint.rs::State`, generalized here into one instance-owned
//! atomic counter (the spec's "global mutable `bytesTransfer`" note: global
//! in the original host process, but instance-owned here, never a real Rust
//! `static`).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

pub struct TransferStats {
    bytes_transfer: AtomicU64,
    last_sample: Mutex<(Instant, u64)>,
}

impl TransferStats {
    pub fn new() -> TransferStats {
        TransferStats {
            bytes_transfer: AtomicU64::new(0),
            last_sample: Mutex::new((Instant::now(), 0)),
        }
    }

    /// Accumulates `bytes_read + bytes_written` for one closed relay
    /// session.
    pub fn record_session(&self, bytes_read: u64, bytes_written: u64) {
        self.bytes_transfer.fetch_add(bytes_read + bytes_written, Ordering::Relaxed);
    }

    pub fn bytes_transfer(&self) -> u64 {
        self.bytes_transfer.load(Ordering::Relaxed)
    }

    /// A human-readable rate sampled since the previous call to `speed`.
    pub fn speed(&self) -> String {
        let now = Instant::now();
        let total = self.bytes_transfer();
        let mut last = self.last_sample.lock().expect("stats lock poisoned");
        let (prev_at, prev_total) = *last;
        let elapsed = now.saturating_duration_since(prev_at).as_secs_f64();
        let delta = total.saturating_sub(prev_total);
        *last = (now, total);
        if elapsed <= 0.0 {
            return "0 B/s".to_string();
        }
        format_rate(delta as f64 / elapsed)
    }
}

impl Default for TransferStats {
    fn default() -> TransferStats {
        TransferStats::new()
    }
}

fn format_rate(bytes_per_sec: f64) -> String {
    const UNITS: [&str; 5] = ["B/s", "KB/s", "MB/s", "GB/s", "TB/s"];
    let mut value = bytes_per_sec;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_session_accumulates_exactly() {
        let stats = TransferStats::new();
        stats.record_session(4, 4);
        assert_eq!(stats.bytes_transfer(), 8);
        stats.record_session(10, 0);
        assert_eq!(stats.bytes_transfer(), 18);
    }

    #[test]
    fn format_rate_scales_units() {
        assert_eq!(format_rate(0.0), "0.00 B/s");
        assert_eq!(format_rate(2048.0), "2.00 KB/s");
    }
}
