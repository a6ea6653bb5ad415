//! Fetch policy options.

use std::time::Duration;

use crate::error::{HoardError, HoardResult};

/// A rolling average below `bytes_per_second` over `period` aborts a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinimumTransferRate {
    pub bytes_per_second: u64,
    pub period: Duration,
}

impl MinimumTransferRate {
    pub fn new(bytes_per_second: u64, period_in_seconds: u64) -> Self {
        Self {
            bytes_per_second,
            period: Duration::from_secs(period_in_seconds),
        }
    }

    /// Bytes that must arrive within one full window
    pub fn required_bytes(&self) -> u64 {
        (self.bytes_per_second as f64 * self.period.as_secs_f64()).ceil() as u64
    }
}

/// Exponential backoff between attempts of the same asset
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Retry immediately; used by tests and local transports
    pub fn immediate() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(32) as i32;
        let millis = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        std::cmp::min(Duration::from_millis(millis as u64), self.max_delay)
    }
}

/// Options for a fetch run
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOptions {
    /// Minimum spacing between progress events of one asset
    pub progress_interval: Duration,
    /// Attempts allowed per asset beyond the first
    pub file_retry_count: u32,
    /// Throughput floor; `None` disables rate enforcement
    pub minimum_transfer_rate: Option<MinimumTransferRate>,
    /// Transfers allowed in flight at once
    pub max_concurrent_transfers: usize,
    pub retry: RetryPolicy,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            progress_interval: Duration::from_secs(1),
            file_retry_count: 3,
            minimum_transfer_rate: None,
            max_concurrent_transfers: 4,
            retry: RetryPolicy::default(),
        }
    }
}

impl FetchOptions {
    pub fn validate(&self) -> HoardResult<()> {
        if self.max_concurrent_transfers == 0 {
            return Err(HoardError::ConfigValidation {
                field: "max_concurrent_transfers".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if let Some(rate) = &self.minimum_transfer_rate {
            if rate.bytes_per_second == 0 {
                return Err(HoardError::ConfigValidation {
                    field: "minimum_transfer_rate.bytes_per_second".to_string(),
                    reason: "must be greater than 0".to_string(),
                });
            }
            if rate.period.is_zero() {
                return Err(HoardError::ConfigValidation {
                    field: "minimum_transfer_rate.period_in_seconds".to_string(),
                    reason: "must be greater than 0".to_string(),
                });
            }
        }
        if self.retry.multiplier < 1.0 {
            return Err(HoardError::ConfigValidation {
                field: "retry.multiplier".to_string(),
                reason: "must be at least 1.0".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(20), Duration::from_secs(30));
    }

    #[test]
    fn test_immediate_retry() {
        assert_eq!(RetryPolicy::immediate().delay_for(5), Duration::ZERO);
    }

    #[test]
    fn test_required_bytes() {
        let rate = MinimumTransferRate::new(1024, 10);
        assert_eq!(rate.required_bytes(), 10 * 1024);
    }

    #[test]
    fn test_validate_rejects_zero_rate() {
        let mut options = FetchOptions::default();
        assert!(options.validate().is_ok());

        options.minimum_transfer_rate = Some(MinimumTransferRate::new(0, 10));
        assert!(options.validate().is_err());

        options.minimum_transfer_rate = Some(MinimumTransferRate::new(10, 0));
        assert!(options.validate().is_err());

        options.minimum_transfer_rate = None;
        options.max_concurrent_transfers = 0;
        assert!(options.validate().is_err());
    }
}
