//! Guard outcome counters and Prometheus export

use crate::cache::CacheStats;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Point-in-time copy of the counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardSnapshot {
    pub allowed: u64,
    pub unauthorized: u64,
    pub rate_limited: u64,
    pub invalid_csrf: u64,
    pub invalid_uploads: u64,
    pub storage_failures: u64,
    pub uptime_secs: u64,
}

impl GuardSnapshot {
    /// All guard rejections, uploads included
    pub fn total_rejected(&self) -> u64 {
        self.unauthorized + self.rate_limited + self.invalid_csrf + self.invalid_uploads
    }
}

/// Metrics collector
pub struct GuardMetrics {
    start_time: Instant,
    allowed: AtomicU64,
    unauthorized: AtomicU64,
    rate_limited: AtomicU64,
    invalid_csrf: AtomicU64,
    invalid_uploads: AtomicU64,
    storage_failures: AtomicU64,
}

impl GuardMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            allowed: AtomicU64::new(0),
            unauthorized: AtomicU64::new(0),
            rate_limited: AtomicU64::new(0),
            invalid_csrf: AtomicU64::new(0),
            invalid_uploads: AtomicU64::new(0),
            storage_failures: AtomicU64::new(0),
        }
    }

    pub fn record_allowed(&self) {
        self.allowed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unauthorized(&self) {
        self.unauthorized.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalid_csrf(&self) {
        self.invalid_csrf.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalid_upload(&self) {
        self.invalid_uploads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_storage_failure(&self) {
        self.storage_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> GuardSnapshot {
        GuardSnapshot {
            allowed: self.allowed.load(Ordering::Relaxed),
            unauthorized: self.unauthorized.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            invalid_csrf: self.invalid_csrf.load(Ordering::Relaxed),
            invalid_uploads: self.invalid_uploads.load(Ordering::Relaxed),
            storage_failures: self.storage_failures.load(Ordering::Relaxed),
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    /// Export metrics in Prometheus format
    pub fn export_prometheus(&self, cache: &CacheStats, tracked_identifiers: usize) -> String {
        let m = self.snapshot();

        format!(
            "# HELP site_guard_requests_allowed_total Requests that passed the guard\n\
             # TYPE site_guard_requests_allowed_total counter\n\
             site_guard_requests_allowed_total {}\n\
             \n\
             # HELP site_guard_requests_rejected_total Requests rejected by the guard\n\
             # TYPE site_guard_requests_rejected_total counter\n\
             site_guard_requests_rejected_total{{reason=\"unauthorized\"}} {}\n\
             site_guard_requests_rejected_total{{reason=\"rate_limited\"}} {}\n\
             site_guard_requests_rejected_total{{reason=\"invalid_csrf\"}} {}\n\
             site_guard_requests_rejected_total{{reason=\"invalid_upload\"}} {}\n\
             \n\
             # HELP site_guard_storage_failures_total Storage errors surfaced as 500\n\
             # TYPE site_guard_storage_failures_total counter\n\
             site_guard_storage_failures_total {}\n\
             \n\
             # HELP site_guard_rate_limit_identifiers Identifiers with an open window\n\
             # TYPE site_guard_rate_limit_identifiers gauge\n\
             site_guard_rate_limit_identifiers {}\n\
             \n\
             # HELP site_guard_cache_entries Entries held by the read cache\n\
             # TYPE site_guard_cache_entries gauge\n\
             site_guard_cache_entries {}\n\
             \n\
             # HELP site_guard_cache_hit_rate Cache hit rate\n\
             # TYPE site_guard_cache_hit_rate gauge\n\
             site_guard_cache_hit_rate {:.4}\n\
             \n\
             # HELP site_guard_uptime_seconds Uptime in seconds\n\
             # TYPE site_guard_uptime_seconds counter\n\
             site_guard_uptime_seconds {}\n",
            m.allowed,
            m.unauthorized,
            m.rate_limited,
            m.invalid_csrf,
            m.invalid_uploads,
            m.storage_failures,
            tracked_identifiers,
            cache.size,
            cache.hit_rate,
            m.uptime_secs,
        )
    }
}

impl Default for GuardMetrics {
    fn default() -> Self {
        Self::new()
    }
}
