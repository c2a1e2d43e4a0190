// Per-tick transfer deltas from cumulative connection counters

use std::time::Duration;

/// Cumulative byte counters reported for one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Counters {
    pub upload: u64,
    pub download: u64,
}

/// Bytes transferred since the previous tick.
///
/// Signed on purpose: when the proxy resets a counter the delta goes negative
/// and is passed through unchanged so the view can show the reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rates {
    pub upload: i64,
    pub download: i64,
}

impl Rates {
    pub fn is_reset(&self) -> bool {
        self.upload < 0 || self.download < 0
    }
}

/// Compute deltas against the previous tick, or against zero on first sight
pub fn compute_rates(current: Counters, previous: Option<Counters>) -> Rates {
    let previous = previous.unwrap_or_default();
    Rates {
        upload: delta(current.upload, previous.upload),
        download: delta(current.download, previous.download),
    }
}

fn delta(current: u64, previous: u64) -> i64 {
    (current as i128 - previous as i128).clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

/// Normalize a per-tick delta to bytes per second for a known tick interval
pub fn per_second(rates: Rates, interval: Duration) -> (f64, f64) {
    let secs = interval.as_secs_f64();
    if secs <= 0.0 {
        return (0.0, 0.0);
    }
    (rates.upload as f64 / secs, rates.download as f64 / secs)
}
