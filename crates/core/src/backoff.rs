// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Reconnect backoff policy.
//!
//! Delay for attempt `k` (1-indexed) is `min(base * factor^(k-1), cap)`,
//! without jitter. Attempts past `max_attempts` are never scheduled.

use std::time::Duration;

use crate::constants::{
    RECONNECT_BASE_MS, RECONNECT_CAP_MS, RECONNECT_FACTOR, RECONNECT_MAX_ATTEMPTS,
};

/// Exponential backoff with a cap and a bounded attempt count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base_ms: u64,
    factor: u32,
    cap_ms: u64,
    max_attempts: u32,
}

impl Backoff {
    pub fn new(base_ms: u64, factor: u32, cap_ms: u64, max_attempts: u32) -> Self {
        Backoff {
            base_ms,
            factor,
            cap_ms,
            max_attempts,
        }
    }

    /// Maximum number of automatic attempts.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the delay before `attempt`, or `None` if that attempt must
    /// not be scheduled.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        let growth = u64::from(self.factor).saturating_pow(attempt - 1);
        let ms = self.base_ms.saturating_mul(growth).min(self.cap_ms);
        Some(Duration::from_millis(ms))
    }

    /// The full schedule, attempt 1 first.
    pub fn schedule(&self) -> impl Iterator<Item = Duration> + '_ {
        (1..=self.max_attempts).filter_map(|attempt| self.delay(attempt))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::new(
            RECONNECT_BASE_MS,
            RECONNECT_FACTOR,
            RECONNECT_CAP_MS,
            RECONNECT_MAX_ATTEMPTS,
        )
    }
}

#[cfg(test)]
#[path = "backoff_tests.rs"]
mod tests;
