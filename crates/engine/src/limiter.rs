// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-local rate limiting.
//!
//! Window state lives in this process only; deployments that need
//! cross-instance enforcement plug in a different [`RateLimit`] backed by
//! a shared store.

use parking_lot::Mutex;
use sg_core::Clock;
use std::collections::HashMap;
use std::time::Duration;

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limit {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_after: Duration,
}

/// Pluggable limiter interface.
pub trait RateLimit: Send + Sync {
    fn allow(&self, key: &str, limit: u32, window: Duration) -> Limit;
}

/// In-memory fixed-window limiter.
pub struct WindowLimiter<C: Clock> {
    clock: C,
    // key → (window_start_ms, count)
    state: Mutex<HashMap<String, (u64, u32)>>,
}

impl<C: Clock> WindowLimiter<C> {
    pub fn new(clock: C) -> Self {
        Self { clock, state: Mutex::new(HashMap::new()) }
    }
}

impl<C: Clock> RateLimit for WindowLimiter<C> {
    fn allow(&self, key: &str, limit: u32, window: Duration) -> Limit {
        let now = self.clock.epoch_ms();
        let window_ms = window.as_millis().max(1) as u64;
        let limit = limit.max(1);

        let mut state = self.state.lock();
        let (start, count) = state.get(key).copied().unwrap_or((now, 0));
        let (start, count) =
            if now.saturating_sub(start) >= window_ms { (now, 0) } else { (start, count) };

        let reset_after = Duration::from_millis((start + window_ms).saturating_sub(now));
        if count >= limit {
            return Limit { allowed: false, remaining: 0, reset_after };
        }

        let count = count + 1;
        state.insert(key.to_string(), (start, count));
        Limit { allowed: true, remaining: limit - count, reset_after }
    }
}

#[cfg(test)]
#[path = "limiter_tests.rs"]
mod tests;
