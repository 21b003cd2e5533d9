//! Bounded exponential backoff
//!
//! Shared by queue reconnects and delivery retries.

use std::time::Duration;

use contracts::RetryConfig;

/// Exponential backoff that gives up after `max_retries` consecutive delays.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: RetryConfig,
    attempt: u32,
    current_delay: Duration,
}

impl Backoff {
    pub fn new(config: RetryConfig) -> Self {
        let current_delay = config.initial_delay();
        Self {
            config,
            attempt: 0,
            current_delay,
        }
    }

    /// Same curve, different retry budget
    pub fn with_max_retries(config: &RetryConfig, max_retries: u32) -> Self {
        Self::new(RetryConfig {
            max_retries,
            ..config.clone()
        })
    }

    /// Delays handed out since the last reset
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn exhausted(&self) -> bool {
        self.attempt >= self.config.max_retries
    }

    /// Called after a success
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.current_delay = self.config.initial_delay();
    }

    /// Next delay, or `None` once the retry budget is spent
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.exhausted() {
            return None;
        }
        self.attempt += 1;

        let delay = self.current_delay;
        let max_delay = self.config.max_delay();
        // saturate instead of panicking on huge multipliers
        let next = Duration::try_from_secs_f64(delay.as_secs_f64() * self.config.multiplier)
            .unwrap_or(max_delay);
        self.current_delay = next.min(max_delay);

        Some(delay)
    }
}
