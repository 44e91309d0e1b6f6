// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Retry delays applied when the store throttles a group.

use std::time::Duration;

/// Delay applied between retries of a throttled request.
pub const DEFAULT_THROTTLE_BACKOFF: Duration = Duration::from_secs(2);

/// Configuration parameters for throttling backoff.
///
/// The default is a fixed two second delay retried forever: the store is available, just busy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub base: Duration,
    /// Growth factor applied per consecutive throttle. `1.0` keeps the delay fixed.
    pub factor: f64,
    /// Upper bound for any single delay.
    pub max_backoff: Duration,
    /// Fraction of each delay, in `[0, 1]`, that may be randomly shaved off.
    pub jitter: f64,
    /// Consecutive throttles tolerated before the group gives up. `None` retries forever.
    pub max_retries: Option<u32>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::fixed(DEFAULT_THROTTLE_BACKOFF)
    }
}

impl BackoffConfig {
    /// A constant delay between retries.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            base: delay,
            factor: 1.0,
            max_backoff: delay,
            jitter: 0.0,
            max_retries: None,
        }
    }

    /// A delay doubling on each consecutive throttle, capped at `max_backoff`.
    pub fn exponential(base: Duration, max_backoff: Duration) -> Self {
        Self {
            base,
            factor: 2.0,
            max_backoff,
            jitter: 0.0,
            max_retries: None,
        }
    }

    #[must_use]
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// Tracks consecutive throttles for one group.
#[derive(Debug)]
pub struct BackoffState {
    config: BackoffConfig,
    attempts: u32,
}

impl BackoffState {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    /// Registers a throttled request and returns the delay before retrying it, or `None`
    /// once the retry budget is spent.
    pub fn register_throttle(&mut self) -> Option<Duration> {
        if let Some(max_retries) = self.config.max_retries {
            if self.attempts >= max_retries {
                return None;
            }
        }
        self.attempts = self.attempts.saturating_add(1);

        // Cap the exponent so powi cannot overflow; the max_backoff cap is reached long before.
        let exponent = self.attempts.saturating_sub(1).min(100) as i32;
        let mut delay_secs = (self.config.base.as_secs_f64() * self.config.factor.powi(exponent))
            .min(self.config.max_backoff.as_secs_f64());
        if self.config.jitter > 0.0 {
            let jitter = self.config.jitter.min(1.0);
            delay_secs *= 1.0 - jitter * rand::random::<f64>();
        }
        Some(Duration::try_from_secs_f64(delay_secs.max(0.0)).unwrap_or(self.config.max_backoff))
    }

    /// Registers a successful request, resetting the consecutive throttle count.
    pub fn register_success(&mut self) {
        self.attempts = 0;
    }

    /// Consecutive throttles registered since the last success.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
