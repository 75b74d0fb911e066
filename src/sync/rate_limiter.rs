//! Sliding-window rate limiter
//!
//! Admits at most `max_calls` grants in any window of length `window`. Grant
//! timestamps are kept in FIFO order so the oldest slot is always the first
//! to free up. Waiters are not queued; after sleeping they re-check under the
//! lock, since another caller may have taken the slot in the meantime.

use crate::config::RateLimitConfig;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Shared limiter for every outbound request of a run
#[derive(Debug)]
pub struct RateLimiter {
    max_calls: usize,
    window: Duration,
    grants: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter; a `max_calls` of zero is treated as one
    pub fn new(max_calls: u32, window: Duration) -> Self {
        let max_calls = max_calls.max(1) as usize;
        Self {
            max_calls,
            window,
            grants: Mutex::new(VecDeque::with_capacity(max_calls)),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_calls, Duration::from_millis(config.window_ms))
    }

    /// Waits until a request may be sent
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut grants = self.grants.lock().await;
                let now = Instant::now();

                while let Some(oldest) = grants.front() {
                    if now.duration_since(*oldest) >= self.window {
                        grants.pop_front();
                    } else {
                        break;
                    }
                }

                if grants.len() < self.max_calls {
                    grants.push_back(now);
                    return;
                }

                match grants.front() {
                    Some(oldest) => self.window.saturating_sub(now.duration_since(*oldest)),
                    None => continue,
                }
            };

            tracing::trace!("Rate limit reached, waiting {:?}", wait);
            tokio::time::sleep(wait).await;
        }
    }

    /// Number of grants inside the current window
    pub async fn in_window(&self) -> usize {
        let grants = self.grants.lock().await;
        let now = Instant::now();
        grants
            .iter()
            .filter(|t| now.duration_since(**t) < self.window)
            .count()
    }
}
