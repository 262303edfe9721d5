//! Fixed-window rate limiting for mutating endpoints

use crate::scheduler::SweepHandle;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Identifier used when the client address cannot be determined
pub const FALLBACK_IDENTIFIER: &str = "unknown";

/// Limit applied to one route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRule {
    /// Maximum requests per window
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    /// Window length in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

fn default_max_requests() -> u32 { 10 }
fn default_window_ms() -> u64 { 60_000 }

impl RateLimitRule {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window_ms: window.as_millis() as u64,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Default for RateLimitRule {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_ms: default_window_ms(),
        }
    }
}

/// Counter for one identifier
#[derive(Debug, Clone)]
struct RateLimitEntry {
    count: u32,
    window_reset_at: Instant,
}

/// Outcome of a single rate-limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    /// When the current window rolls over
    pub reset_at: Instant,
}

impl RateLimitDecision {
    /// Time until the window resets
    pub fn retry_after(&self, now: Instant) -> Duration {
        self.reset_at.saturating_duration_since(now)
    }

    /// `Retry-After` value: whole seconds, rounded up
    pub fn retry_after_secs(&self, now: Instant) -> u64 {
        let millis = self.retry_after(now).as_millis() as u64;
        millis.div_ceil(1000)
    }
}

/// Fixed-window rate limiter keyed by an identifier string.
///
/// Each identifier's read-modify-write runs under its DashMap shard lock, so
/// concurrent requests for the same identifier never lose an increment.
pub struct RateLimiter {
    entries: Arc<DashMap<String, RateLimitEntry>>,
    sweeper: Mutex<Option<SweepHandle>>,
}

impl RateLimiter {
    /// Create a rate limiter that sweeps expired windows every `sweep_interval`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(sweep_interval: Duration) -> Self {
        let entries: Arc<DashMap<String, RateLimitEntry>> = Arc::new(DashMap::new());
        let swept = entries.clone();

        let sweeper = SweepHandle::spawn("rate_limit", sweep_interval, move || {
            let removed = sweep_expired(&swept, Instant::now());
            if removed > 0 {
                debug!("Swept {} expired rate limit windows", removed);
            }
        });

        Self {
            entries,
            sweeper: Mutex::new(Some(sweeper)),
        }
    }

    /// Create a rate limiter with no background sweep
    pub fn unscheduled() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            sweeper: Mutex::new(None),
        }
    }

    /// Count a request against `identifier`.
    ///
    /// Never fails; an empty identifier is folded into [`FALLBACK_IDENTIFIER`].
    pub fn check_rate_limit(
        &self,
        identifier: &str,
        max_requests: u32,
        window: Duration,
    ) -> RateLimitDecision {
        let key = if identifier.is_empty() {
            FALLBACK_IDENTIFIER
        } else {
            identifier
        };
        let now = Instant::now();

        let mut entry = self.entries.entry(key.to_string()).or_insert(RateLimitEntry {
            count: 0,
            window_reset_at: now + window,
        });
        let record = entry.value_mut();

        if record.count == 0 || now >= record.window_reset_at {
            record.count = 1;
            record.window_reset_at = now + window;
            debug!("Rate limit window opened for {} (1/{})", key, max_requests);

            return RateLimitDecision {
                allowed: true,
                remaining: max_requests.saturating_sub(1),
                reset_at: record.window_reset_at,
            };
        }

        if record.count < max_requests {
            record.count += 1;
            debug!("Request allowed for {} ({}/{})", key, record.count, max_requests);

            return RateLimitDecision {
                allowed: true,
                remaining: max_requests - record.count,
                reset_at: record.window_reset_at,
            };
        }

        warn!(
            "Rate limit exceeded for {} ({} requests in window)",
            key, record.count
        );

        RateLimitDecision {
            allowed: false,
            remaining: 0,
            reset_at: record.window_reset_at,
        }
    }

    /// Current count and time left in the window for an identifier
    pub fn usage(&self, identifier: &str) -> Option<(u32, Duration)> {
        self.entries.get(identifier).map(|record| {
            (
                record.count,
                record.window_reset_at.saturating_duration_since(Instant::now()),
            )
        })
    }

    /// Remove every entry whose window has elapsed; returns how many went
    pub fn cleanup_expired(&self) -> usize {
        sweep_expired(&self.entries, Instant::now())
    }

    /// Number of tracked identifiers
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the background sweep is active
    pub fn is_sweeping(&self) -> bool {
        self.sweeper
            .lock()
            .map(|guard| guard.as_ref().is_some_and(SweepHandle::is_running))
            .unwrap_or(false)
    }

    /// Stop the background sweep. Counters stay usable.
    pub fn dispose(&self) {
        if let Ok(mut guard) = self.sweeper.lock() {
            if let Some(mut handle) = guard.take() {
                handle.cancel();
            }
        }
    }
}

fn sweep_expired(entries: &DashMap<String, RateLimitEntry>, now: Instant) -> usize {
    let before = entries.len();
    // retain holds each shard's write lock, so an entry mid-update is never dropped
    entries.retain(|_, record| now < record.window_reset_at);
    before.saturating_sub(entries.len())
}
