//! Sliding-window throughput floor for a single transfer.

use hoard_core::MinimumTransferRate;
use std::collections::VecDeque;
use tokio::time::Instant;

/// Tracks bytes received within the last `period` of a transfer
#[derive(Debug)]
pub struct RateMonitor {
    rate: MinimumTransferRate,
    started: Instant,
    samples: VecDeque<(Instant, u64)>,
    window_bytes: u64,
}

impl RateMonitor {
    pub fn new(rate: MinimumTransferRate, now: Instant) -> Self {
        Self {
            rate,
            started: now,
            samples: VecDeque::new(),
            window_bytes: 0,
        }
    }

    pub fn record(&mut self, now: Instant, bytes: u64) {
        self.samples.push_back((now, bytes));
        self.window_bytes += bytes;
        self.expire(now);
    }

    fn expire(&mut self, now: Instant) {
        while let Some(&(at, bytes)) = self.samples.front() {
            if at + self.rate.period > now {
                break;
            }
            self.samples.pop_front();
            self.window_bytes -= bytes;
        }
    }

    /// Bytes received within the window ending at `now`
    pub fn window_bytes(&mut self, now: Instant) -> u64 {
        self.expire(now);
        self.window_bytes
    }

    /// `Err(observed)` once a full period has elapsed and the window holds
    /// fewer than the required bytes
    pub fn check(&mut self, now: Instant) -> Result<(), u64> {
        if now.saturating_duration_since(self.started) < self.rate.period {
            return Ok(());
        }
        let observed = self.window_bytes(now);
        if observed < self.rate.required_bytes() {
            Err(observed)
        } else {
            Ok(())
        }
    }

    pub fn rate(&self) -> &MinimumTransferRate {
        &self.rate
    }
}
